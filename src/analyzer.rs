// Response analysis for EthioScan
// Heuristic detection rules over one (test case, execution result) pair
//
// Every rule is evaluated independently, so one response can raise several
// findings. Evidence is always a bounded excerpt, never the whole body.

use crate::models::{Category, ExecutionResult, Finding, RuleSet, Severity, TestCase};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Responses slower than this are flagged as anomalies
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_secs(10);

/// Maximum evidence length in characters
pub const EVIDENCE_MAX: usize = 200;
const EVIDENCE_CONTEXT: usize = 80;

/// Database error fingerprints (matched case-insensitively)
const SQL_FINGERPRINTS: &[&str] = &[
    "you have an error in your sql syntax",
    "sql syntax",
    "syntax error",
    "query failed",
    "ora-00933",
    "ora-01756",
    "sqlstate",
    "mysql_fetch",
    "mysqli",
    "pg_query",
    "postgresql",
    "sqlite3",
    "sqlite_error",
    "unclosed quotation mark",
    "microsoft ole db provider",
    "mssql",
    "odbc",
];

/// Generic error tokens, only consulted when no SQL fingerprint matched
const ERROR_KEYWORDS: &[&str] = &[
    "exception",
    "fatal error",
    "stack trace",
    "traceback (most recent call last)",
    "internal server error",
    "warning:",
    "unhandled",
];

const ANOMALY_STATUSES: &[u16] = &[500, 502, 503, 504];

fn keyword_pattern(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i){}", alternation)).unwrap()
}

lazy_static! {
    static ref SQL_ERROR: Regex = keyword_pattern(SQL_FINGERPRINTS);
    static ref GENERIC_ERROR: Regex = keyword_pattern(ERROR_KEYWORDS);

    // Tag opener, script scheme or inline event handler
    static ref SCRIPT_INDICATORS: Vec<Regex> = vec![
        Regex::new(r"<[a-zA-Z!/]").unwrap(),
        Regex::new(r"(?i)javascript\s*:").unwrap(),
        Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap(),
    ];
}

/// Whether a payload could execute as script if reflected unescaped.
pub fn has_script_indicator(payload: &str) -> bool {
    SCRIPT_INDICATORS.iter().any(|re| re.is_match(payload))
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Window around `body[start..end]`, capped at `EVIDENCE_MAX` characters.
pub fn excerpt(body: &str, start: usize, end: usize) -> String {
    let from = floor_boundary(body, start.saturating_sub(EVIDENCE_CONTEXT));
    let to = ceil_boundary(body, end.saturating_add(EVIDENCE_CONTEXT));
    body[from..to]
        .chars()
        .take(EVIDENCE_MAX)
        .collect::<String>()
        .trim()
        .to_string()
}

fn head_excerpt(body: &str) -> String {
    excerpt(body, 0, 0)
}

fn finding(case: &TestCase, result: &ExecutionResult, category: Category, severity: Severity, evidence: String) -> Finding {
    Finding {
        id: Uuid::new_v4(),
        category,
        severity,
        param: case.target.clone(),
        url: case.url.clone(),
        payload: case.payload.payload.clone(),
        evidence,
        status: result.status(),
        response_time: result.elapsed.as_secs_f64(),
        timestamp: Utc::now(),
    }
}

fn sql_rule(case: &TestCase, result: &ExecutionResult) -> Option<Finding> {
    let m = SQL_ERROR.find(&result.body)?;
    Some(finding(case, result, Category::Sqli, Severity::High, excerpt(&result.body, m.start(), m.end())))
}

/// Fires only when the payload itself could script AND comes back verbatim.
/// An escaped reflection (`&lt;script&gt;`) does not contain the raw payload,
/// so it never matches.
fn reflected_script_rule(case: &TestCase, result: &ExecutionResult) -> Option<Finding> {
    let payload = case.payload.payload.as_str();
    if payload.is_empty() || !has_script_indicator(payload) {
        return None;
    }
    let start = result.body.find(payload)?;
    Some(finding(
        case,
        result,
        Category::Xss,
        Severity::High,
        excerpt(&result.body, start, start + payload.len()),
    ))
}

fn generic_error_rule(case: &TestCase, result: &ExecutionResult) -> Option<Finding> {
    let m = GENERIC_ERROR.find(&result.body)?;
    Some(finding(case, result, Category::Error, Severity::Medium, excerpt(&result.body, m.start(), m.end())))
}

/// One finding per anomalous sub-condition
fn anomaly_rule(case: &TestCase, result: &ExecutionResult) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(status) = result.status() {
        if ANOMALY_STATUSES.contains(&status) {
            let mut evidence = format!("HTTP {}", status);
            let head = head_excerpt(&result.body);
            if !head.is_empty() {
                evidence.push_str(": ");
                evidence.push_str(&head);
            }
            findings.push(finding(case, result, Category::Anomaly, Severity::Medium, evidence));
        }
    }

    if result.is_timeout() {
        findings.push(finding(
            case,
            result,
            Category::Anomaly,
            Severity::Low,
            format!("request timed out after {:.2}s", result.elapsed.as_secs_f64()),
        ));
    } else if result.elapsed > SLOW_RESPONSE_THRESHOLD {
        findings.push(finding(
            case,
            result,
            Category::Anomaly,
            Severity::Low,
            format!("slow response: {:.2}s", result.elapsed.as_secs_f64()),
        ));
    }

    let debug_header = result.headers.iter().find(|(name, value)| {
        name.starts_with("x-debug") || {
            let v = value.to_ascii_lowercase();
            name == "server" && (v.contains("debug") || v.contains("test"))
        }
    });
    if let Some((name, value)) = debug_header {
        let evidence: String = format!("{}: {}", name, value).chars().take(EVIDENCE_MAX).collect();
        findings.push(finding(case, result, Category::Anomaly, Severity::Low, evidence));
    }

    findings
}

/// Evaluate the active rules against one executed test case.
///
/// IDOR cases have no dedicated oracle here; they surface only through the
/// generic error and anomaly rules.
pub fn analyze(case: &TestCase, result: &ExecutionResult, rules: RuleSet) -> Vec<Finding> {
    if result.is_cancelled() {
        return Vec::new();
    }

    let mut findings = Vec::new();
    let mut sql_fired = false;
    if case.category != Category::Idor {
        let sql = sql_rule(case, result);
        sql_fired = sql.is_some();
        findings.extend(sql);
        findings.extend(reflected_script_rule(case, result));
    }

    match rules {
        RuleSet::Fast => {}
        RuleSet::Full => {
            if !sql_fired {
                findings.extend(generic_error_rule(case, result));
            }
            findings.extend(anomaly_rule(case, result));
        }
    }
    findings
}

/// Size of each rule's vocabulary, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub sql_fingerprints: usize,
    pub script_indicators: usize,
    pub error_keywords: usize,
    pub rule_set: RuleSet,
}

pub fn detection_stats(rules: RuleSet) -> DetectionStats {
    DetectionStats {
        sql_fingerprints: SQL_FINGERPRINTS.len(),
        script_indicators: SCRIPT_INDICATORS.len(),
        error_keywords: ERROR_KEYWORDS.len(),
        rule_set: rules,
    }
}
