// Reporting records for EthioScan
// Flat finding records exported as JSON or CSV

use crate::errors::ScanError;
use crate::models::Finding;
use crate::orchestrator::ScanReport;
use chrono::Local;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "id,category,severity,param,url,payload,evidence,status,response_time,timestamp";

/// Escape CSV field to prevent formula injection attacks
/// Cells starting with =, +, -, @, tab or CR are prefixed with single quote
pub fn escape_csv_field(field: &str) -> String {
    let Some(first_char) = field.chars().next() else {
        return String::new();
    };
    let needs_escaping = matches!(first_char, '=' | '+' | '-' | '@' | '\t' | '\r');

    if needs_escaping {
        format!("\"'{}\"", field.replace('"', "\"\""))
    } else if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(f: &Finding) -> String {
    let status = f.status.map(|s| s.to_string()).unwrap_or_default();
    [
        f.id.to_string(),
        f.category.to_string(),
        f.severity.to_string(),
        f.param.clone(),
        f.url.clone(),
        f.payload.clone(),
        f.evidence.clone(),
        status,
        format!("{:.3}", f.response_time),
        f.timestamp.to_rfc3339(),
    ]
    .iter()
    .map(|cell| escape_csv_field(cell))
    .collect::<Vec<_>>()
    .join(",")
}

pub fn write_csv<W: Write>(findings: &[Finding], mut out: W) -> std::io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for finding in findings {
        writeln!(out, "{}", csv_row(finding))?;
    }
    out.flush()
}

pub fn export_csv(findings: &[Finding], path: &Path) -> Result<(), ScanError> {
    let file = File::create(path)?;
    write_csv(findings, BufWriter::new(file))?;
    Ok(())
}

/// `scan_info` header plus the flat finding records
pub fn report_json(report: &ScanReport) -> Result<Value, ScanError> {
    Ok(json!({
        "scan_info": {
            "target": report.target,
            "started_at": report.started_at.to_rfc3339(),
            "finished_at": report.finished_at.to_rfc3339(),
            "duration_secs": report.duration_secs(),
            "cancelled": report.cancelled,
            "pages_crawled": report.crawl.pages.len(),
            "forms_found": report.crawl.forms.len(),
            "params_found": report.crawl.params.len(),
            "failed_pages": report.crawl.failed.len(),
            "tests_generated": report.summary.total,
            "tests_executed": report.executed,
            "tests_errored": report.errored,
            "total_findings": report.findings.len(),
            "tests_by_category": report.summary.by_category,
        },
        "findings": serde_json::to_value(&report.findings)?,
    }))
}

pub fn export_json(report: &ScanReport, path: &Path) -> Result<(), ScanError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &report_json(report)?)?;
    out.flush()?;
    Ok(())
}

/// Timestamped default file name, e.g. `ethioscan_report_20240101_120000.json`
pub fn default_report_name(extension: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("ethioscan_report_{}.{}", timestamp, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_cells_are_neutralized() {
        assert_eq!(escape_csv_field("=cmd|' /C calc'!A0"), "\"'=cmd|' /C calc'!A0\"");
        assert_eq!(escape_csv_field("+1"), "\"'+1\"");
        assert_eq!(escape_csv_field("-1"), "\"'-1\"");
        assert_eq!(escape_csv_field("@SUM(A1)"), "\"'@SUM(A1)\"");
        assert_eq!(escape_csv_field("\tx"), "\"'\tx\"");
    }

    #[test]
    fn ordinary_cells_follow_csv_quoting() {
        assert_eq!(escape_csv_field(""), "");
        assert_eq!(escape_csv_field("plain"), "plain");
        assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn default_name_has_extension() {
        let name = default_report_name("csv");
        let name = name.to_string_lossy();
        assert!(name.starts_with("ethioscan_report_"));
        assert!(name.ends_with(".csv"));
    }
}
