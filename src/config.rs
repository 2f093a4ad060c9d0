// Scan configuration, immutable for the duration of one scan

use crate::errors::ScanError;
use crate::models::{Profile, RuleSet};
use crate::urls::NormalizedUrl;
use std::time::Duration;

pub const DEFAULT_MAX_DEPTH: usize = 2;
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_TESTS: usize = 200;
pub const DEFAULT_MAX_PER_PARAM: usize = 2;
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target: String,
    pub max_depth: usize,
    pub concurrency: usize,
    /// Per-request timeout
    pub timeout: Duration,
    /// Polite delay before every crawl fetch
    pub delay: Duration,
    pub max_tests: usize,
    pub max_per_param: usize,
    pub profile: Profile,
    pub rule_set: RuleSet,
    pub retries: u32,
    pub backoff_base: Duration,
}

impl ScanConfig {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Self::default()
        }
    }

    /// The normalized seed URL, or a configuration error.
    pub fn seed_url(&self) -> Result<NormalizedUrl, ScanError> {
        NormalizedUrl::parse(&self.target).ok_or_else(|| {
            ScanError::Config(format!(
                "target '{}' is not an absolute http(s) URL",
                self.target
            ))
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        self.seed_url()?;
        if self.concurrency == 0 {
            return Err(ScanError::Config("concurrency must be at least 1".into()));
        }
        if self.max_tests == 0 {
            return Err(ScanError::Config("max tests must be at least 1".into()));
        }
        if self.max_per_param == 0 {
            return Err(ScanError::Config(
                "max payloads per parameter must be at least 1".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::Config("timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            max_tests: DEFAULT_MAX_TESTS,
            max_per_param: DEFAULT_MAX_PER_PARAM,
            profile: Profile::Safe,
            rule_set: RuleSet::Full,
            retries: DEFAULT_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}
