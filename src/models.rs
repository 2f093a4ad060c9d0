// Core data models for EthioScan

use crate::urls::NormalizedUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// HTTP methods the scanner submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    /// Form `method` attribute; anything other than POST falls back to GET.
    pub fn from_form_attr(raw: Option<&str>) -> Self {
        match raw.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == "post" => Method::POST,
            _ => Method::GET,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
        }
    }
}

/// Vulnerability class of a payload or a finding.
///
/// `Error` and `Anomaly` only ever appear on findings; the rest are payload
/// categories from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "sqli")]
    Sqli,
    #[serde(rename = "xss")]
    Xss,
    #[serde(rename = "traversal")]
    Traversal,
    #[serde(rename = "idor", alias = "idor_numeric")]
    Idor,
    #[serde(rename = "command_injection")]
    CommandInjection,
    #[serde(rename = "ldap", alias = "ldap_injection")]
    Ldap,
    #[serde(rename = "nosql", alias = "nosql_injection")]
    NoSql,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "anomaly")]
    Anomaly,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sqli => "sqli",
            Category::Xss => "xss",
            Category::Traversal => "traversal",
            Category::Idor => "idor",
            Category::CommandInjection => "command_injection",
            Category::Ldap => "ldap",
            Category::NoSql => "nosql",
            Category::Error => "error",
            Category::Anomaly => "anomaly",
        }
    }

    /// Whether the catalog may carry entries of this category.
    pub fn is_payload_category(&self) -> bool {
        !matches!(self, Category::Error | Category::Anomaly)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqli" => Ok(Category::Sqli),
            "xss" => Ok(Category::Xss),
            "traversal" => Ok(Category::Traversal),
            "idor" | "idor_numeric" => Ok(Category::Idor),
            "command_injection" | "command-injection" => Ok(Category::CommandInjection),
            "ldap" | "ldap_injection" => Ok(Category::Ldap),
            "nosql" | "nosql_injection" => Ok(Category::NoSql),
            "error" => Ok(Category::Error),
            "anomaly" => Ok(Category::Anomaly),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Payload profile. `Safe` never yields lab-only entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Safe,
    Lab,
    All,
}

impl Profile {
    pub fn allows(&self, entry: &PayloadEntry) -> bool {
        match self {
            Profile::Safe => !entry.lab_only,
            Profile::Lab | Profile::All => true,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Safe => write!(f, "safe"),
            Profile::Lab => write!(f, "lab"),
            Profile::All => write!(f, "all"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Profile::Safe),
            "lab" => Ok(Profile::Lab),
            "all" => Ok(Profile::All),
            other => Err(format!("unknown profile '{}' (use safe, lab or all)", other)),
        }
    }
}

/// Which analyzer rules are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSet {
    /// SQL error fingerprints and reflected scripting only
    Fast,
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// A form discovered on a page. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Form {
    pub page: NormalizedUrl,
    pub action: NormalizedUrl,
    pub method: Method,
    pub fields: Vec<String>,
}

impl Form {
    /// Identity used to drop the same form rediscovered later in the crawl.
    pub fn key(&self) -> (NormalizedUrl, NormalizedUrl, Method) {
        (self.page.clone(), self.action.clone(), self.method)
    }
}

/// Query parameter names present on a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamBinding {
    pub url: NormalizedUrl,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
    pub url: NormalizedUrl,
    pub reason: String,
}

/// Surface discovered by the crawler
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlResult {
    pub pages: BTreeSet<NormalizedUrl>,
    pub forms: Vec<Form>,
    pub params: Vec<ParamBinding>,
    pub failed: Vec<FailedPage>,
}

/// One entry of the payload catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub category: Category,
    pub payload: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub lab_only: bool,
}

impl PayloadEntry {
    pub fn new(category: Category, payload: &str, note: &str, lab_only: bool) -> Self {
        Self {
            category,
            payload: payload.to_string(),
            note: note.to_string(),
            lab_only,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Param,
    Form,
}

/// A concrete probe. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub id: Uuid,
    pub method: Method,
    /// Request URL; for parameter and GET-form cases the payload is already in the query
    pub url: String,
    /// Parameter or form field under test
    pub target: String,
    pub payload: PayloadEntry,
    pub origin: Origin,
    pub category: Category,
    pub lab_only: bool,
    /// Full field map for form cases (target field carries the payload)
    pub fields: Vec<(String, String)>,
}

/// Why a test case produced no HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecErrorKind {
    Timeout,
    Connect(String),
    Cancelled,
    Other(String),
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecErrorKind::Timeout => write!(f, "timeout"),
            ExecErrorKind::Connect(msg) => write!(f, "connection error: {}", msg),
            ExecErrorKind::Cancelled => write!(f, "cancelled"),
            ExecErrorKind::Other(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Outcome of one executed test case
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub test_case_id: Uuid,
    pub outcome: Result<u16, ExecErrorKind>,
    /// Bounded prefix of the response body
    pub body: String,
    pub elapsed: Duration,
    /// Diagnostic subset of the response headers, names lowercased
    pub headers: Vec<(String, String)>,
}

impl ExecutionResult {
    pub fn status(&self) -> Option<u16> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, Err(ExecErrorKind::Timeout))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(ExecErrorKind::Cancelled))
    }
}

/// Evidence that a test case's response exhibited a vulnerability class.
///
/// Serializes to the flat record shape the reporting and storage layers read:
/// `id, category, severity, param, url, payload, evidence, status,
/// response_time, timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub category: Category,
    pub severity: Severity,
    pub param: String,
    pub url: String,
    pub payload: String,
    pub evidence: String,
    pub status: Option<u16>,
    /// Seconds
    pub response_time: f64,
    pub timestamp: DateTime<Utc>,
}
