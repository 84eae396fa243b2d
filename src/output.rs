use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;
use tracing::info;

use crate::parser::extract::PageType;
use crate::report::Report;

const DATETIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const MAX_CELL: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Aligned table on stdout
    Pretty,
    /// CSV file under the results directory
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// The report as tables: one row per entry led by its link, then for PEPs
/// the status tally.
pub fn tables(report: &Report, page_type: PageType) -> Vec<Table> {
    let id_header = match page_type {
        PageType::Pep => "PEP",
        PageType::WhatsNew | PageType::VersionList => "Version",
    };
    let mut entries = Table::new(&["Link", id_header, "Title", "Status", "Expected", "Verdict"]);
    for e in report.entries() {
        entries.rows.push(vec![
            e.url.clone(),
            e.identifier.clone(),
            e.record.as_ref().map(|r| r.title.clone()).unwrap_or_default(),
            e.observed().unwrap_or_default().to_string(),
            e.expected.as_ref().map(|x| x.to_string()).unwrap_or_default(),
            e.verdict.to_string(),
        ]);
    }

    let mut out = vec![entries];
    if page_type == PageType::Pep {
        let mut tally = Table::new(&["Status", "Count"]);
        for (status, n) in report.status_counts() {
            tally.rows.push(vec![status.clone(), n.to_string()]);
        }
        tally
            .rows
            .push(vec!["Total".to_string(), report.observed_total().to_string()]);
        out.push(tally);
    }
    out
}

/// Print or save the report according to `mode` (plain lines when `None`).
pub fn control_output(
    report: &Report,
    page_type: PageType,
    mode: Option<OutputMode>,
    results_dir: &Path,
) -> Result<()> {
    let tables = tables(report, page_type);
    match mode {
        None => tables.iter().for_each(|t| println!("{}", render_plain(t))),
        Some(OutputMode::Pretty) => tables.iter().for_each(|t| println!("{}", render_pretty(t))),
        Some(OutputMode::File) => {
            let path = file_output(&tables, &page_type.to_string(), results_dir)?;
            info!("Results saved to {}", path.display());
        }
    }
    Ok(())
}

/// One line per row, cells separated by spaces.
pub fn render_plain(table: &Table) -> String {
    std::iter::once(&table.headers)
        .chain(&table.rows)
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Left-aligned columns under a header rule.
pub fn render_pretty(table: &Table) -> String {
    let cells = |row: &[String]| -> Vec<String> { row.iter().map(|c| truncate(c, MAX_CELL)).collect() };
    let header = cells(&table.headers);
    let rows: Vec<Vec<String>> = table.rows.iter().map(|r| cells(r)).collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |row: &[String]| -> String {
        row.iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let rule_len = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    let mut out = vec![line(&header), "-".repeat(rule_len)];
    out.extend(rows.iter().map(|r| line(r)));
    out.join("\n")
}

/// Write all tables to `<dir>/<mode>_<timestamp>.csv`, blank line between tables.
pub fn file_output(tables: &[Table], mode: &str, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let file_name = format!("{}_{}.csv", mode, Local::now().format(DATETIME_FORMAT));
    let path = dir.join(file_name);

    let mut buf = Vec::new();
    for (i, table) in tables.iter().enumerate() {
        if i > 0 {
            buf.push(b'\n');
        }
        write_row(&mut buf, &table.headers)?;
        for row in &table.rows {
            write_row(&mut buf, row)?;
        }
    }
    std::fs::write(&path, buf).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single CSV row to any writer.
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

// ── Tests ──
