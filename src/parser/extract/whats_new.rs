use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::Selector;

use super::{record, Record};
use crate::error::Error;
use crate::fetcher::Target;
use crate::parser::query::{anchors, clean_text, field_list, find, resolve, selector};
use crate::parser::ParsedTree;

static WHATS_NEW_SECTION: LazyLock<Selector> =
    LazyLock::new(|| selector("section#what-s-new-in-python"));
static TOCTREE: LazyLock<Selector> = LazyLock::new(|| selector("div.toctree-wrapper"));
static TOP_LEVEL_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li.toctree-l1"));
static A: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| selector(r#"div[role="main"], div.body"#));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static DL: LazyLock<Selector> = LazyLock::new(|| selector("dl"));

/// A "What's New In Python X.Y" article. Its status line is the field list
/// directly under the heading (editor and author).
pub fn extract(tree: &ParsedTree) -> Result<Record, Error> {
    let root = tree.root();
    let body = root.select(&MAIN).next().unwrap_or(root);

    let title = clean_text(find(body, &H1, "title")?);
    let dl = find(body, &DL, "editor")?;
    let status = clean_text(dl);

    let extra: BTreeMap<String, String> = field_list(dl)
        .iter()
        .map(|f| (f.label.clone(), f.text()))
        .collect();

    record(
        &tree.identifier,
        tree.url.to_string(),
        title,
        status,
        anchors(dl, &tree.url),
        extra,
    )
}

/// Links to each release's article from the what's-new index, in listed order.
/// The identifier is the article's file stem (`3.12`, `changelog`).
pub fn version_links(tree: &ParsedTree) -> Result<Vec<Target>, Error> {
    let section = find(tree.root(), &WHATS_NEW_SECTION, "what-s-new-in-python")?;
    let toctree = find(section, &TOCTREE, "toctree-wrapper")?;

    let targets: Vec<Target> = toctree
        .select(&TOP_LEVEL_ITEM)
        .filter_map(|li| {
            let a = li.select(&A).next()?;
            let url = resolve(&tree.url, a.value().attr("href")?)?;
            let stem = url
                .path_segments()?
                .next_back()?
                .trim_end_matches(".html")
                .to_string();
            Some(Target::new(stem, url))
        })
        .collect();

    if targets.is_empty() {
        return Err(Error::missing("toctree-l1"));
    }
    Ok(targets)
}

// ── Tests ──
