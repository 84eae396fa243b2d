use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::compare::{compare, unverified, DiscrepancyResult, ExpectedStatusTable, Verdict};
use crate::error::Error;
use crate::fetcher::{Fetcher, RawDocument, Target, Transport};
use crate::parser::extract::{download, pep, whats_new, Extraction, PageType, Unresolved};
use crate::parser::{parse, process_page, ParsedTree};
use crate::report::{self, EmptyPolicy, Report};
use crate::settings::Settings;

/// Fetch every target, extract its records and compare them. The output
/// follows `targets` order; a target that fails at any stage still gets
/// exactly one entry.
pub async fn check_pages<T: Transport>(
    fetcher: &Fetcher<T>,
    targets: &[Target],
    page_type: PageType,
    table: &ExpectedStatusTable,
) -> Vec<DiscrepancyResult> {
    let fetched = fetcher.fetch_all(targets).await;

    // Trees are built and dropped inside each worker; only records cross threads.
    let outcomes: Vec<Vec<Extraction>> = fetched
        .into_par_iter()
        .zip(targets.par_iter())
        .map(|(fetched, target)| match fetched {
            Ok(raw) => process_page(&raw, page_type),
            Err(error) => vec![Err(Unresolved {
                identifier: target.identifier.clone(),
                error,
            })],
        })
        .collect();

    let mut results = Vec::with_capacity(targets.len());
    for (extractions, target) in outcomes.into_iter().zip(targets) {
        for extraction in extractions {
            let result = match extraction {
                Ok(record) => compare(&record, table),
                Err(Unresolved { identifier, error }) => {
                    warn!("Could not verify {} ({}): {}", identifier, target.url, error);
                    unverified(identifier, target.url.as_str(), error, table)
                }
            };
            if result.verdict == Verdict::Mismatch {
                info!(
                    "Mismatched statuses: {} Status in page: {} Expected statuses: {}",
                    target.url,
                    result.observed().unwrap_or_default(),
                    result.expected.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                );
            }
            results.push(result);
        }
    }
    results
}

/// Every PEP listed in the index, checked against the index's own status letters.
/// Entries in `overrides` replace the index-derived expectations.
pub async fn peps<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
    overrides: Option<ExpectedStatusTable>,
    limit: Option<usize>,
) -> Result<Report> {
    let index = Target::new("index", settings.pep_url()?);
    let raw = fetcher.fetch(&index).await?;
    let mut entries = listing(&raw, pep::index_entries)?;
    info!("PEP index lists {} PEPs", entries.len());
    if let Some(n) = limit {
        entries.truncate(n);
    }

    let mut table = ExpectedStatusTable::from_pep_index(&entries);
    if let Some(overrides) = overrides {
        table.merge(overrides);
    }

    let targets: Vec<Target> = entries
        .into_iter()
        .map(|e| Target::new(e.number, e.url))
        .collect();
    let results = check_pages(fetcher, &targets, PageType::Pep, &table).await;
    finish(results, EmptyPolicy::Reject)
}

/// One entry per release article linked from the what's-new index.
pub async fn whats_new<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
    table: ExpectedStatusTable,
    limit: Option<usize>,
) -> Result<Report> {
    let index_url = settings
        .main_url()?
        .join("whatsnew/")
        .context("invalid what's-new index URL")?;
    let raw = fetcher.fetch(&Target::new("whatsnew", index_url)).await?;
    let mut targets = listing(&raw, whats_new::version_links)?;
    info!("What's-new index links {} articles", targets.len());
    if let Some(n) = limit {
        targets.truncate(n);
    }

    let results = check_pages(fetcher, &targets, PageType::WhatsNew, &table).await;
    finish(results, EmptyPolicy::Reject)
}

/// One entry per version in the documentation's version switcher.
pub async fn latest_versions<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
    table: ExpectedStatusTable,
) -> Result<Report> {
    let target = Target::new("versions", settings.main_url()?);
    let results = check_pages(fetcher, &[target], PageType::VersionList, &table).await;
    finish(results, EmptyPolicy::Allow)
}

/// Save the A4 PDF documentation archive, returning where it was written.
pub async fn download_archive<T: Transport>(
    fetcher: &Fetcher<T>,
    settings: &Settings,
) -> Result<PathBuf> {
    let page_url = settings
        .main_url()?
        .join("download.html")
        .context("invalid download page URL")?;
    let raw = fetcher.fetch(&Target::new("download", page_url)).await?;
    let archive_url = listing(&raw, download::archive_link)?;
    let file_name = download::file_name(&archive_url)
        .with_context(|| format!("archive URL has no file name: {}", archive_url))?;

    info!("Downloading {}", archive_url);
    let archive = fetcher
        .fetch_uncached(&Target::new(file_name.clone(), archive_url))
        .await?;

    tokio::fs::create_dir_all(&settings.downloads_dir)
        .await
        .with_context(|| format!("cannot create {}", settings.downloads_dir.display()))?;
    let path = settings.downloads_dir.join(&file_name);
    tokio::fs::write(&path, &archive.body)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("Archive downloaded and saved: {}", path.display());
    Ok(path)
}

/// Parse a listing page and read it. The tree never outlives this call.
fn listing<R>(raw: &RawDocument, read: impl FnOnce(&ParsedTree) -> Result<R, Error>) -> Result<R> {
    let tree = parse(raw)?;
    read(&tree).with_context(|| format!("cannot read listing at {}", raw.url))
}

fn finish(results: Vec<DiscrepancyResult>, policy: EmptyPolicy) -> Result<Report> {
    let report = report::build(results, policy)?;
    let s = report.summary();
    info!(
        matched = s.matched,
        mismatched = s.mismatched,
        no_expectation = s.no_expectation,
        unverified = s.unverified,
        "Report built"
    );
    if s.no_expectation > 0 {
        warn!(
            "{} entries have no expected status on file; the expectation table may be stale",
            s.no_expectation
        );
    }
    Ok(report)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::compare::ExpectedStatus;
    use crate::output::tables;
    use crate::testing::{fixture, test_fetcher, FakeSite, Reply};

    fn pep_page(number: &str, status: &str) -> String {
        format!(
            r#"<html><body><h1 class="page-title">PEP {number} – Example</h1>
            <dl class="rfc2822 field-list simple">
            <dt>Status<span class="colon">:</span></dt><dd><abbr title="x">{status}</abbr></dd>
            </dl></body></html>"#
        )
    }

    fn pep_site() -> FakeSite {
        let site = FakeSite::new();
        site.route("https://peps.python.org/", Reply::html(&fixture("pep_index.html")));
        site.route(
            "https://peps.python.org/pep-0001/",
            Reply::html(&pep_page("1", "Active")).after(Duration::from_millis(30)),
        );
        site.route(
            "https://peps.python.org/pep-0008/",
            Reply::html(&fixture("pep_0008.html")),
        );
        site.route(
            "https://peps.python.org/pep-3000/",
            Reply::html(&pep_page("3000", "Withdrawn")).after(Duration::from_millis(10)),
        );
        site.route("https://peps.python.org/pep-0484/", Reply::status(404));
        site.route(
            "https://peps.python.org/pep-9001/",
            Reply::html(&fixture("pep_missing_status.html")),
        );
        site
    }

    fn settings() -> Settings {
        Settings::defaults().unwrap()
    }

    #[tokio::test]
    async fn pep_run_reports_every_identifier_in_index_order() {
        let fetcher = test_fetcher(pep_site(), Arc::new(MemoryCache::new()));
        let report = peps(&fetcher, &settings(), None, None).await.unwrap();

        let ids: Vec<_> = report.entries().iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, ["1", "8", "3000", "484", "9001"]);

        let labels: Vec<_> = report.entries().iter().map(|e| e.verdict.label()).collect();
        assert_eq!(
            labels,
            ["match", "match", "mismatch", "could not verify", "could not verify"]
        );

        let s = report.summary();
        assert_eq!((s.matched, s.mismatched, s.no_expectation, s.unverified), (2, 1, 0, 2));
        assert_eq!(
            report.status_counts(),
            [("Active".to_string(), 2), ("Withdrawn".to_string(), 1)]
        );

        assert!(matches!(
            &report.entries()[3].verdict,
            Verdict::Unverified(Error::FetchFailure { .. })
        ));
        assert_eq!(
            report.entries()[4].verdict,
            Verdict::Unverified(Error::FieldNotFound("Status".into()))
        );
    }

    #[tokio::test]
    async fn overrides_replace_index_expectations() {
        let fetcher = test_fetcher(pep_site(), Arc::new(MemoryCache::new()));
        let mut overrides = ExpectedStatusTable::new();
        overrides.insert("3000", ExpectedStatus::One("Withdrawn".into()));
        let report = peps(&fetcher, &settings(), Some(overrides), Some(3))
            .await
            .unwrap();
        assert_eq!(report.entries().len(), 3);
        assert_eq!(report.summary().matched, 3);
    }

    #[tokio::test]
    async fn clearing_cache_forces_fresh_fetches() {
        let site = pep_site();
        let fetcher = test_fetcher(site.clone(), Arc::new(MemoryCache::new()));

        peps(&fetcher, &settings(), None, None).await.unwrap();
        peps(&fetcher, &settings(), None, None).await.unwrap();
        assert_eq!(site.hits("https://peps.python.org/"), 1);
        assert_eq!(site.hits("https://peps.python.org/pep-0008/"), 1);

        fetcher.clear_cache().unwrap();
        peps(&fetcher, &settings(), None, None).await.unwrap();
        assert_eq!(site.hits("https://peps.python.org/"), 2);
        assert_eq!(site.hits("https://peps.python.org/pep-0008/"), 2);
    }

    #[tokio::test]
    async fn unreachable_index_is_fatal() {
        let fetcher = test_fetcher(FakeSite::new(), Arc::new(MemoryCache::new()));
        assert!(peps(&fetcher, &settings(), None, None).await.is_err());
    }

    #[tokio::test]
    async fn whats_new_run() {
        let site = FakeSite::new();
        site.route(
            "https://docs.python.org/3/whatsnew/",
            Reply::html(&fixture("whatsnew_index.html")),
        );
        site.route(
            "https://docs.python.org/3/whatsnew/3.12.html",
            Reply::html(&fixture("whatsnew_3_12.html")),
        );
        site.route("https://docs.python.org/3/whatsnew/3.11.html", Reply::status(500));
        site.route(
            "https://docs.python.org/3/whatsnew/changelog.html",
            Reply::html(r#"<div role="main"><h1>Changelog</h1></div>"#),
        );
        let fetcher = test_fetcher(site.clone(), Arc::new(MemoryCache::new()));

        let table: ExpectedStatusTable = [("3.12", "Editor: Adam Turner")].into_iter().collect();
        let report = whats_new(&fetcher, &settings(), table, None).await.unwrap();

        let labels: Vec<_> = report.entries().iter().map(|e| e.verdict.label()).collect();
        assert_eq!(labels, ["match", "could not verify", "could not verify"]);

        let entries = &tables(&report, PageType::WhatsNew)[0];
        assert_eq!(entries.headers[..2], ["Link", "Version"]);
        let links: Vec<_> = entries.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(
            links,
            [
                "https://docs.python.org/3/whatsnew/3.12.html",
                "https://docs.python.org/3/whatsnew/3.11.html",
                "https://docs.python.org/3/whatsnew/changelog.html",
            ]
        );
        // 500 is transient: first attempt plus three retries.
        assert_eq!(site.hits("https://docs.python.org/3/whatsnew/3.11.html"), 4);
    }

    #[tokio::test]
    async fn latest_versions_run() {
        let site = FakeSite::new();
        site.route("https://docs.python.org/3/", Reply::html(&fixture("docs_index.html")));
        let fetcher = test_fetcher(site, Arc::new(MemoryCache::new()));

        let table: ExpectedStatusTable = [("3.12", "stable"), ("3.13", "stable")].into_iter().collect();
        let report = latest_versions(&fetcher, &settings(), table).await.unwrap();

        let rows: Vec<_> = report
            .entries()
            .iter()
            .map(|e| (e.identifier.as_str(), e.verdict.label()))
            .collect();
        assert_eq!(
            rows,
            [
                ("3.13", "mismatch"),
                ("3.12", "match"),
                ("3.11", "could not verify"),
                ("All versions", "could not verify"),
            ]
        );

        let entries = &tables(&report, PageType::VersionList)[0];
        assert_eq!(entries.headers[..2], ["Link", "Version"]);
        assert_eq!(entries.rows[0][0], "https://docs.python.org/3.13/");
        assert_eq!(entries.rows[1][0], "https://docs.python.org/3.12/");
    }

    #[tokio::test]
    async fn latest_versions_unreachable_is_one_unverified_entry() {
        let fetcher = test_fetcher(FakeSite::new(), Arc::new(MemoryCache::new()));
        let report = latest_versions(&fetcher, &settings(), ExpectedStatusTable::new())
            .await
            .unwrap();
        assert_eq!(report.entries().len(), 1);
        assert_eq!(report.entries()[0].identifier, "versions");
        assert_eq!(report.summary().unverified, 1);
    }

    #[tokio::test]
    async fn download_saves_archive() {
        let site = FakeSite::new();
        site.route(
            "https://docs.python.org/3/download.html",
            Reply::html(&fixture("download.html")),
        );
        site.route(
            "https://docs.python.org/3/archives/python-3.12.0-docs-pdf-a4.zip",
            Reply::ok(b"PK\x03\x04zip"),
        );
        let cache = Arc::new(MemoryCache::new());
        let fetcher = test_fetcher(site, cache.clone());

        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.downloads_dir = dir.path().join("downloads");

        let path = download_archive(&fetcher, &settings).await.unwrap();
        assert_eq!(path, dir.path().join("downloads/python-3.12.0-docs-pdf-a4.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04zip");
        // Only the HTML page is cached, not the archive.
        assert_eq!(cache.len(), 1);
    }
}
