pub mod download;
pub mod pep;
pub mod versions;
pub mod whats_new;

use std::collections::BTreeMap;
use std::fmt;

use super::ParsedTree;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub url: String,
}

/// One extracted page (or listing row). `identifier` and `observed_status`
/// are never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub identifier: String,
    /// The page (or, for listing rows, the linked page) the record describes.
    pub url: String,
    pub title: String,
    pub observed_status: String,
    pub links: Vec<Link>,
    pub extra: BTreeMap<String, String>,
}

/// An identifier whose record could not be built.
#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
    pub identifier: String,
    pub error: Error,
}

pub type Extraction = Result<Record, Unresolved>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Pep,
    WhatsNew,
    VersionList,
}

impl PageType {
    /// Apply this page type's structural rules. Pep and WhatsNew pages yield
    /// exactly one entry; a version list yields one per row.
    pub fn extract(self, tree: &ParsedTree) -> Vec<Extraction> {
        let unresolved = |error| Unresolved {
            identifier: tree.identifier.clone(),
            error,
        };
        match self {
            PageType::Pep => vec![pep::extract(tree).map_err(unresolved)],
            PageType::WhatsNew => vec![whats_new::extract(tree).map_err(unresolved)],
            PageType::VersionList => match versions::extract(tree) {
                Ok(rows) => rows,
                Err(error) => vec![Err(unresolved(error))],
            },
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageType::Pep => "pep",
            PageType::WhatsNew => "whats-new",
            PageType::VersionList => "latest-versions",
        })
    }
}

/// Build a record, enforcing the non-empty identifier and status rule.
pub(crate) fn record(
    identifier: &str,
    url: String,
    title: String,
    status: String,
    links: Vec<Link>,
    extra: BTreeMap<String, String>,
) -> Result<Record, Error> {
    if identifier.trim().is_empty() {
        return Err(Error::missing("identifier"));
    }
    if status.trim().is_empty() {
        return Err(Error::missing("status"));
    }
    Ok(Record {
        identifier: identifier.to_string(),
        url,
        title,
        observed_status: status,
        links,
        extra,
    })
}

// ── Tests ──
