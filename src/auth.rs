// Authorization gate for EthioScan
// A scan only starts against a domain the operator has been cleared to test

use crate::errors::ScanError;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// Exact phrase an operator must supply to bypass the allowlist
pub const OVERRIDE_PHRASE: &str = "I_HAVE_PERMISSION";

pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, domain: &str) -> bool;
}

/// Lowercase and strip any port: "Lab.Local:8080" -> "lab.local"
fn canonical_domain(raw: &str) -> String {
    let host = raw.trim().trim_end_matches('.');
    let host = match host.rsplit_once(':') {
        Some((h, port)) if !h.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    host.to_ascii_lowercase()
}

/// Domains listed one per line; `#` starts a comment
#[derive(Debug, Clone, Default)]
pub struct AllowlistAuthorizer {
    domains: BTreeSet<String>,
}

impl AllowlistAuthorizer {
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path)?;
        let allowlist = Self::parse(&text);
        info!("loaded {} allowlisted domains from {}", allowlist.len(), path.display());
        Ok(allowlist)
    }

    pub fn parse(text: &str) -> Self {
        let domains = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .map(canonical_domain)
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| canonical_domain(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Authorizer for AllowlistAuthorizer {
    fn is_authorized(&self, domain: &str) -> bool {
        self.domains.contains(&canonical_domain(domain))
    }
}

/// Fixed answer, for embedding and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthorizer(pub bool);

impl Authorizer for StaticAuthorizer {
    fn is_authorized(&self, _domain: &str) -> bool {
        self.0
    }
}

/// An authorizer plus the operator's explicit override
pub struct AuthorizationGate {
    authorizer: Box<dyn Authorizer>,
    override_granted: bool,
}

impl AuthorizationGate {
    pub fn new(authorizer: Box<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            override_granted: false,
        }
    }

    /// Only the exact override phrase is accepted.
    pub fn with_override(mut self, phrase: Option<&str>) -> Self {
        self.override_granted = phrase == Some(OVERRIDE_PHRASE);
        self
    }

    pub fn override_granted(&self) -> bool {
        self.override_granted
    }

    pub fn check(&self, domain: &str) -> Result<(), ScanError> {
        if self.authorizer.is_authorized(domain) {
            return Ok(());
        }
        if self.override_granted {
            warn!("'{}' is not allowlisted; proceeding on operator override", domain);
            return Ok(());
        }
        Err(ScanError::Unauthorized {
            domain: domain.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_ignores_comments_case_and_ports() {
        let list = AllowlistAuthorizer::parse(
            "# lab targets\n\nLab.Local\ntestphp.vulnweb.com:8080  # public demo\n   \n",
        );
        assert_eq!(list.len(), 2);
        assert!(list.is_authorized("lab.local"));
        assert!(list.is_authorized("LAB.LOCAL:443"));
        assert!(list.is_authorized("testphp.vulnweb.com"));
        assert!(!list.is_authorized("example.com"));
        assert!(!list.is_authorized("sub.lab.local"));
    }

    #[test]
    fn canonical_domain_forms() {
        assert_eq!(canonical_domain(" Example.COM. "), "example.com");
        assert_eq!(canonical_domain("localhost:3000"), "localhost");
        assert_eq!(canonical_domain("host:notaport"), "host:notaport");
    }

    #[test]
    fn gate_rejects_unlisted_domain() {
        let gate = AuthorizationGate::new(Box::new(AllowlistAuthorizer::from_domains(["lab.local"])));
        assert!(gate.check("lab.local").is_ok());
        let err = gate.check("prod.example.com").unwrap_err();
        assert!(matches!(err, ScanError::Unauthorized { ref domain } if domain == "prod.example.com"));
    }

    #[test]
    fn override_requires_exact_phrase() {
        let deny = || Box::new(StaticAuthorizer(false));
        assert!(AuthorizationGate::new(deny()).with_override(Some("yes")).check("x").is_err());
        assert!(AuthorizationGate::new(deny())
            .with_override(Some("i_have_permission"))
            .check("x")
            .is_err());
        let gate = AuthorizationGate::new(deny()).with_override(Some(OVERRIDE_PHRASE));
        assert!(gate.override_granted());
        assert!(gate.check("x").is_ok());
    }
}
