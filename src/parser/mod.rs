pub mod extract;
pub mod query;

use scraper::{ElementRef, Html};
use url::Url;

use crate::error::Error;
use crate::fetcher::RawDocument;
use extract::{Extraction, PageType, Unresolved};

/// A fetched page as a DOM, with the identifier and URL it was fetched for.
pub struct ParsedTree {
    pub identifier: String,
    pub url: Url,
    pub html: Html,
}

impl ParsedTree {
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }
}

/// Decode and parse a raw page. Tolerates sloppy markup, rejects content that
/// is not markup at all.
pub fn parse(raw: &RawDocument) -> Result<ParsedTree, Error> {
    let url = raw.url.as_str();

    if raw.body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::malformed(url, "empty document"));
    }
    if raw.body.contains(&0) {
        return Err(Error::malformed(url, "binary content"));
    }

    // The site serves UTF-8; invalid sequences are replaced rather than fatal.
    let text = String::from_utf8_lossy(&raw.body);
    if !text.contains('<') {
        return Err(Error::malformed(url, "no markup"));
    }

    let html = Html::parse_document(&text);
    let has_content = html
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| !matches!(el.value().name(), "html" | "head" | "body"));
    if !has_content {
        return Err(Error::malformed(url, "no elements"));
    }

    Ok(ParsedTree {
        identifier: raw.identifier.clone(),
        url: raw.url.clone(),
        html,
    })
}

/// Two-pass pipeline: raw page → tree → records. Parse failures become a
/// single unresolved entry for the page's identifier.
pub fn process_page(raw: &RawDocument, page_type: PageType) -> Vec<Extraction> {
    match parse(raw) {
        Ok(tree) => page_type.extract(&tree),
        Err(error) => vec![Err(Unresolved {
            identifier: raw.identifier.clone(),
            error,
        })],
    }
}

#[cfg(test)]
pub(crate) fn raw(identifier: &str, url: &str, body: &str) -> RawDocument {
    RawDocument {
        identifier: identifier.to_string(),
        url: Url::parse(url).unwrap(),
        body: body.as_bytes().to_vec(),
        fetched_at: chrono::Utc::now(),
        from_cache: false,
    }
}
