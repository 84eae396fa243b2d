use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use url::Url;

use super::{record, Record};
use crate::error::Error;
use crate::parser::query::{
    self, anchors, clean_text, field, field_list, find, next_element, selector,
};
use crate::parser::ParsedTree;

static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h1.page-title"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static HEADER_DL: LazyLock<Selector> = LazyLock::new(|| selector("dl.rfc2822"));
static FIELD_LIST: LazyLock<Selector> = LazyLock::new(|| selector("dl.field-list"));

static CATEGORY_INDEX: LazyLock<Selector> =
    LazyLock::new(|| selector("section#index-by-category"));
static TBODY: LazyLock<Selector> = LazyLock::new(|| selector("tbody"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static ABBR: LazyLock<Selector> = LazyLock::new(|| selector("abbr"));
static PEP_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.pep.reference.internal"));

/// A single PEP page: the status is the value following the `Status` label
/// in the page's header field list.
pub fn extract(tree: &ParsedTree) -> Result<Record, Error> {
    let root = tree.root();

    let heading = root
        .select(&PAGE_TITLE)
        .next()
        .or_else(|| root.select(&H1).next())
        .ok_or_else(|| Error::missing("title"))?;
    let title = clean_text(heading);

    let header = header_fields(root, heading)?;
    let fields = field_list(header);
    let status = field(&fields, "Status")?.text();

    let mut extra = BTreeMap::new();
    let mut links = Vec::new();
    for f in fields.iter().filter(|f| f.label != "Status") {
        extra.insert(f.label.clone(), f.text());
        links.extend(anchors(f.value, &tree.url));
    }

    record(&tree.identifier, tree.url.to_string(), title, status, links, extra)
}

/// The header is a field list, or failing that a table placed directly
/// after the heading. Tables further down belong to the body.
fn header_fields<'a>(
    root: ElementRef<'a>,
    heading: ElementRef<'a>,
) -> Result<ElementRef<'a>, Error> {
    root.select(&HEADER_DL)
        .next()
        .or_else(|| root.select(&FIELD_LIST).next())
        .or_else(|| next_element(heading).filter(|el| el.value().name() == "table"))
        .ok_or_else(|| Error::missing("Status"))
}

/// One row of the PEP index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub number: String,
    pub title: String,
    pub url: Url,
    /// Type letter followed by an optional status letter, e.g. `SF`.
    pub type_status: String,
}

impl IndexEntry {
    /// The status letter (`""` for drafts, which carry only a type letter).
    pub fn status_letter(&self) -> &str {
        let mut chars = self.type_status.char_indices();
        match chars.nth(1) {
            Some((i, _)) => &self.type_status[i..],
            None => "",
        }
    }
}

/// Rows of every table under the "index by category" section, in page order.
/// A PEP listed in several categories is kept once, at its first row.
pub fn index_entries(tree: &ParsedTree) -> Result<Vec<IndexEntry>, Error> {
    let section = find(tree.root(), &CATEGORY_INDEX, "index-by-category")?;
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for tbody in section.select(&TBODY) {
        for row in tbody.select(&ROW) {
            let Some(entry) = index_row(row, &tree.url) else {
                continue;
            };
            if seen.insert(entry.number.clone()) {
                entries.push(entry);
            }
        }
    }

    if entries.is_empty() {
        return Err(Error::missing("PEP index rows"));
    }
    Ok(entries)
}

fn index_row(row: ElementRef<'_>, base: &Url) -> Option<IndexEntry> {
    let cells: Vec<_> = row.select(&CELL).collect();
    let type_status = cells.first()?.select(&ABBR).next().map(clean_text)?;

    let link = cells
        .iter()
        .skip(1)
        .flat_map(|c| c.select(&PEP_LINK))
        .find(|a| {
            let text = clean_text(*a);
            !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
        })?;
    let url = query::resolve(base, link.value().attr("href")?)?;

    let title = cells.get(2).map(|c| clean_text(*c)).unwrap_or_default();

    Some(IndexEntry {
        number: clean_text(link),
        title,
        url,
        type_status,
    })
}

// ── Tests ──
