use crate::compare::{DiscrepancyResult, Verdict};
use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub matched: usize,
    pub mismatched: usize,
    pub no_expectation: usize,
    pub unverified: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.matched + self.mismatched + self.no_expectation + self.unverified
    }
}

/// Whether a run may end with nothing to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    Allow,
    Reject,
}

/// Comparison results in input order, with counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    entries: Vec<DiscrepancyResult>,
    summary: Summary,
    /// Observed statuses with their counts, in first-seen order.
    status_counts: Vec<(String, usize)>,
}

impl Report {
    pub fn entries(&self) -> &[DiscrepancyResult] {
        &self.entries
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn status_counts(&self) -> &[(String, usize)] {
        &self.status_counts
    }

    /// Records whose status was read, i.e. the total of `status_counts`.
    pub fn observed_total(&self) -> usize {
        self.status_counts.iter().map(|(_, n)| n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assemble the report in a single pass. Every result is kept, in the order given.
pub fn build(results: Vec<DiscrepancyResult>, policy: EmptyPolicy) -> Result<Report, Error> {
    if results.is_empty() && policy == EmptyPolicy::Reject {
        return Err(Error::EmptyReport);
    }

    let mut summary = Summary::default();
    let mut status_counts: Vec<(String, usize)> = Vec::new();

    for result in &results {
        match result.verdict {
            Verdict::Match => summary.matched += 1,
            Verdict::Mismatch => summary.mismatched += 1,
            Verdict::NoExpectation => summary.no_expectation += 1,
            Verdict::Unverified(_) => summary.unverified += 1,
        }
        if let Some(status) = result.observed() {
            match status_counts.iter_mut().find(|(s, _)| s == status) {
                Some((_, n)) => *n += 1,
                None => status_counts.push((status.to_string(), 1)),
            }
        }
    }

    Ok(Report {
        entries: results,
        summary,
        status_counts,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::compare::{compare, unverified, ExpectedStatusTable};
    use crate::parser::extract::Record;

    fn rec(id: &str, status: &str) -> Record {
        Record {
            identifier: id.to_string(),
            url: String::new(),
            title: String::new(),
            observed_status: status.to_string(),
            links: vec![],
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn counts_and_order() {
        let table: ExpectedStatusTable = [("101", "Final"), ("102", "Draft")].into_iter().collect();
        let results = vec![
            compare(&rec("101", "Final"), &table),
            compare(&rec("102", "Active"), &table),
            compare(&rec("103", "Draft"), &table),
        ];
        let report = build(results, EmptyPolicy::Reject).unwrap();

        let ids: Vec<_> = report.entries().iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, ["101", "102", "103"]);
        assert_eq!(
            report.summary(),
            Summary {
                matched: 1,
                mismatched: 1,
                no_expectation: 1,
                unverified: 0
            }
        );
    }

    #[test]
    fn unverified_entries_are_kept_but_not_tallied() {
        let table = ExpectedStatusTable::new();
        let results = vec![
            compare(&rec("1", "Final"), &table),
            unverified("2", "", Error::missing("Status"), &table),
            compare(&rec("3", "Final"), &table),
            compare(&rec("4", "Draft"), &table),
        ];
        let report = build(results, EmptyPolicy::Reject).unwrap();
        assert_eq!(report.entries().len(), 4);
        assert_eq!(report.summary().unverified, 1);
        assert_eq!(report.summary().total(), 4);
        assert_eq!(
            report.status_counts(),
            [("Final".to_string(), 2), ("Draft".to_string(), 1)]
        );
        assert_eq!(report.observed_total(), 3);
    }

    #[test]
    fn empty_report_policy() {
        assert_eq!(build(vec![], EmptyPolicy::Reject), Err(Error::EmptyReport));
        let report = build(vec![], EmptyPolicy::Allow).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.summary().total(), 0);
    }
}
