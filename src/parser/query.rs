//! Structural queries over a parsed page: locate by tag, attribute and sibling
//! position, never by searching the page's text.

use scraper::{ElementRef, Selector};
use url::Url;

use super::extract::Link;
use crate::error::Error;

/// Parse a selector literal. Only used for compile-time constant selectors.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// First element under `scope` matching `sel`, or `FieldNotFound(field)`.
pub fn find<'a>(scope: ElementRef<'a>, sel: &Selector, field: &str) -> Result<ElementRef<'a>, Error> {
    scope.select(sel).next().ok_or_else(|| Error::missing(field))
}

/// Collapse runs of whitespace and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Element text, whitespace-normalized, without Sphinx's `¶` header links.
pub fn clean_text(el: ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    normalize_ws(text.trim_end().trim_end_matches('¶'))
}

pub fn next_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

pub fn child_elements(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    el.children().filter_map(ElementRef::wrap)
}

pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// A labelled value in a field list, e.g. `<dt>Status:</dt><dd>Final</dd>`.
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub label: String,
    pub value: ElementRef<'a>,
}

impl Field<'_> {
    pub fn text(&self) -> String {
        clean_text(self.value)
    }
}

/// Label/value pairs of a `dl` (each `dt` with the `dd` that follows it) or of
/// a table (each row's first cell with the cell after it), in document order.
pub fn field_list(container: ElementRef<'_>) -> Vec<Field<'_>> {
    match container.value().name() {
        "dl" => child_elements(container)
            .filter(|el| el.value().name() == "dt")
            .filter_map(|dt| {
                let value = next_element(dt).filter(|dd| dd.value().name() == "dd")?;
                Some(Field {
                    label: field_label(dt),
                    value,
                })
            })
            .collect(),
        _ => {
            let rows = selector("tr");
            container
                .select(&rows)
                .filter_map(|tr| {
                    let mut cells =
                        child_elements(tr).filter(|c| matches!(c.value().name(), "th" | "td"));
                    let label = cells.next()?;
                    let value = cells.next()?;
                    Some(Field {
                        label: field_label(label),
                        value,
                    })
                })
                .collect()
        }
    }
}

fn field_label(el: ElementRef<'_>) -> String {
    clean_text(el).trim_end_matches(':').trim_end().to_string()
}

/// The field whose label equals `label`, or `FieldNotFound(label)`.
pub fn field<'a, 'f>(fields: &'f [Field<'a>], label: &str) -> Result<&'f Field<'a>, Error> {
    fields
        .iter()
        .find(|f| f.label == label)
        .ok_or_else(|| Error::missing(label))
}

/// Join `href` against the page URL.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    base.join(href.trim()).ok()
}

/// Anchors under `el` with an `href`, resolved against `base`, in document order.
pub fn anchors(el: ElementRef<'_>, base: &Url) -> Vec<Link> {
    let a = selector("a[href]");
    el.select(&a)
        .filter_map(|anchor| {
            let url = resolve(base, anchor.value().attr("href")?)?;
            Some(Link {
                text: clean_text(anchor),
                url: url.to_string(),
            })
        })
        .collect()
}
