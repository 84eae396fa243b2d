use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::Error;
use crate::parser::extract::pep::IndexEntry;
use crate::parser::extract::Record;
use crate::parser::query::normalize_ws;
use crate::settings::expected_for_letter;

/// One or more acceptable statuses for an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpectedStatus {
    One(String),
    AnyOf(Vec<String>),
}

impl ExpectedStatus {
    pub fn alternatives(&self) -> &[String] {
        match self {
            ExpectedStatus::One(s) => std::slice::from_ref(s),
            ExpectedStatus::AnyOf(v) => v.as_slice(),
        }
    }

    /// Case-sensitive equality after whitespace normalization.
    pub fn accepts(&self, observed: &str) -> bool {
        let observed = normalize_ws(observed);
        self.alternatives()
            .iter()
            .any(|expected| normalize_ws(expected) == observed)
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alternatives().join(" | "))
    }
}

/// Identifier → expected status, read once before extraction starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedStatusTable {
    entries: HashMap<String, ExpectedStatus>,
}

impl ExpectedStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON object of identifier → status string or array of strings.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: HashMap<String, ExpectedStatus> =
            serde_json::from_str(text).context("expected-status table must be a JSON object")?;
        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read expected-status table {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Expectations implied by the status letters of the PEP index.
    pub fn from_pep_index(entries: &[IndexEntry]) -> Self {
        let entries = entries
            .iter()
            .filter_map(|e| {
                let statuses = expected_for_letter(e.status_letter())?;
                let statuses = statuses.iter().map(|s| s.to_string()).collect();
                Some((e.number.clone(), ExpectedStatus::AnyOf(statuses)))
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, identifier: impl Into<String>, expected: ExpectedStatus) {
        self.entries.insert(identifier.into(), expected);
    }

    /// Entries of `other` replace ours.
    pub fn merge(&mut self, other: ExpectedStatusTable) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, identifier: &str) -> Option<&ExpectedStatus> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I, K> FromIterator<(K, I)> for ExpectedStatusTable
where
    K: Into<String>,
    I: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), ExpectedStatus::One(v.into())))
            .collect();
        Self { entries }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match,
    Mismatch,
    NoExpectation,
    /// The page could not be fetched, parsed or read.
    Unverified(Error),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Match => "match",
            Verdict::Mismatch => "mismatch",
            Verdict::NoExpectation => "no expectation",
            Verdict::Unverified(_) => "could not verify",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unverified(e) => write!(f, "{}: {}", self.label(), e),
            _ => f.write_str(self.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscrepancyResult {
    pub identifier: String,
    pub url: String,
    pub record: Option<Record>,
    pub expected: Option<ExpectedStatus>,
    pub verdict: Verdict,
}

impl DiscrepancyResult {
    pub fn observed(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.observed_status.as_str())
    }
}

/// Classify one record against the table.
pub fn compare(record: &Record, table: &ExpectedStatusTable) -> DiscrepancyResult {
    let expected = table.get(&record.identifier).cloned();
    let verdict = match &expected {
        None => Verdict::NoExpectation,
        Some(e) if e.accepts(&record.observed_status) => Verdict::Match,
        Some(_) => Verdict::Mismatch,
    };
    DiscrepancyResult {
        identifier: record.identifier.clone(),
        url: record.url.clone(),
        record: Some(record.clone()),
        expected,
        verdict,
    }
}

/// Entry for an identifier whose record could not be produced.
pub fn unverified(
    identifier: impl Into<String>,
    url: impl Into<String>,
    error: Error,
    table: &ExpectedStatusTable,
) -> DiscrepancyResult {
    let identifier = identifier.into();
    DiscrepancyResult {
        expected: table.get(&identifier).cloned(),
        identifier,
        url: url.into(),
        record: None,
        verdict: Verdict::Unverified(error),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn rec(id: &str, status: &str) -> Record {
        Record {
            identifier: id.to_string(),
            url: format!("https://peps.python.org/pep-{:0>4}/", id),
            title: format!("PEP {}", id),
            observed_status: status.to_string(),
            links: vec![],
            extra: BTreeMap::new(),
        }
    }

    fn table() -> ExpectedStatusTable {
        [("101", "Final"), ("102", "Draft")].into_iter().collect()
    }

    #[test]
    fn three_verdicts() {
        let t = table();
        let verdicts: Vec<_> = [rec("101", "Final"), rec("102", "Active"), rec("103", "Draft")]
            .iter()
            .map(|r| compare(r, &t).verdict)
            .collect();
        assert_eq!(
            verdicts,
            [Verdict::Match, Verdict::Mismatch, Verdict::NoExpectation]
        );
    }

    #[test]
    fn mismatch_carries_both_values() {
        let r = compare(&rec("102", "Active"), &table());
        assert_eq!(r.expected, Some(ExpectedStatus::One("Draft".into())));
        assert_eq!(r.observed(), Some("Active"));
        assert_eq!(r.url, "https://peps.python.org/pep-0102/");
    }

    #[test]
    fn whitespace_normalized_case_sensitive() {
        let t: ExpectedStatusTable = [("1", "Active")].into_iter().collect();
        assert_eq!(compare(&rec("1", "  Active \n"), &t).verdict, Verdict::Match);
        assert_eq!(compare(&rec("1", "active"), &t).verdict, Verdict::Mismatch);

        let t: ExpectedStatusTable = [("2", "Standards  Track")].into_iter().collect();
        assert_eq!(compare(&rec("2", "Standards\tTrack"), &t).verdict, Verdict::Match);
    }

    #[test]
    fn compare_is_idempotent() {
        let t = table();
        let r = rec("102", "Active");
        assert_eq!(compare(&r, &t), compare(&r, &t));
    }

    #[test]
    fn any_of_alternatives() {
        let mut t = ExpectedStatusTable::new();
        t.insert(
            "1",
            ExpectedStatus::AnyOf(vec!["Active".into(), "Accepted".into()]),
        );
        assert_eq!(compare(&rec("1", "Accepted"), &t).verdict, Verdict::Match);
        assert_eq!(compare(&rec("1", "Final"), &t).verdict, Verdict::Mismatch);
        assert_eq!(t.get("1").unwrap().to_string(), "Active | Accepted");
    }

    #[test]
    fn json_table_accepts_strings_and_arrays() {
        let t = ExpectedStatusTable::from_json(r#"{"8": "Active", "1": ["Active", "Accepted"]}"#)
            .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("8"), Some(&ExpectedStatus::One("Active".into())));
        assert!(ExpectedStatusTable::from_json("[1, 2]").is_err());
    }

    #[test]
    fn missing_table_file_is_an_error() {
        let err = ExpectedStatusTable::from_json_file(Path::new("does/not/exist.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read expected-status table"));
    }

    #[test]
    fn merge_overrides() {
        let mut base = table();
        base.merge([("101", "Withdrawn")].into_iter().collect());
        assert_eq!(base.get("101"), Some(&ExpectedStatus::One("Withdrawn".into())));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn unverified_keeps_expectation() {
        let r = unverified(
            "101",
            "https://peps.python.org/pep-0101/",
            Error::missing("Status"),
            &table(),
        );
        assert_eq!(r.record, None);
        assert_eq!(r.url, "https://peps.python.org/pep-0101/");
        assert_eq!(r.expected, Some(ExpectedStatus::One("Final".into())));
        assert_eq!(r.verdict.label(), "could not verify");
        assert_eq!(
            r.verdict.to_string(),
            "could not verify: required field `Status` not found"
        );
    }
}
