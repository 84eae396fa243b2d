use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use super::{record, Extraction, Link, Unresolved};
use crate::error::Error;
use crate::parser::query::{clean_text, find, resolve, selector};
use crate::parser::ParsedTree;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Python (?P<version>\d\.\d+) \((?P<status>.*)\)").unwrap());

static SIDEBAR: LazyLock<Selector> = LazyLock::new(|| selector("div.sphinxsidebarwrapper"));
static UL: LazyLock<Selector> = LazyLock::new(|| selector("ul"));
static A: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// The sidebar's version switcher: one entry per link, in listed order.
/// A link that doesn't read "Python X.Y (status)" is kept as an unresolved
/// entry under its own text.
pub fn extract(tree: &ParsedTree) -> Result<Vec<Extraction>, Error> {
    let sidebar = find(tree.root(), &SIDEBAR, "sphinxsidebarwrapper")?;
    let list = sidebar
        .select(&UL)
        .find(|ul| ul.text().any(|t| t.contains("All versions")))
        .ok_or_else(|| Error::missing("All versions"))?;

    let rows: Vec<Extraction> = list
        .select(&A)
        .map(|a| {
            let text = clean_text(a);
            let href = a.value().attr("href").unwrap_or_default();
            let url = resolve(&tree.url, href)
                .map(|u| u.to_string())
                .unwrap_or_else(|| href.to_string());

            let Some(caps) = VERSION_RE.captures(&text) else {
                return Err(Unresolved {
                    identifier: text.clone(),
                    error: Error::missing("status"),
                });
            };
            let version = caps["version"].to_string();
            let status = caps["status"].trim().to_string();

            record(
                &version,
                url.clone(),
                text.clone(),
                status,
                vec![Link { text: text.clone(), url }],
                BTreeMap::new(),
            )
            .map_err(|error| Unresolved {
                identifier: version.clone(),
                error,
            })
        })
        .collect();

    Ok(rows)
}

// ── Tests ──
