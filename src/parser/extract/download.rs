use std::sync::LazyLock;

use scraper::Selector;
use url::Url;

use crate::error::Error;
use crate::parser::query::{find, resolve, selector};
use crate::parser::ParsedTree;

static MAIN: LazyLock<Selector> = LazyLock::new(|| selector(r#"div[role="main"]"#));
static DOCS_TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table.docutils"));
static PDF_A4: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href$="pdf-a4.zip"]"#));

/// The A4 PDF archive link in the downloads table.
pub fn archive_link(tree: &ParsedTree) -> Result<Url, Error> {
    let main = find(tree.root(), &MAIN, "main")?;
    let table = find(main, &DOCS_TABLE, "docutils table")?;
    let link = find(table, &PDF_A4, "pdf-a4 archive")?;
    link.value()
        .attr("href")
        .and_then(|href| resolve(&tree.url, href))
        .ok_or_else(|| Error::missing("pdf-a4 archive"))
}

/// Last path segment of the archive URL.
pub fn file_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
