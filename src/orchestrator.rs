// Scan orchestration for EthioScan
// gate -> crawl -> generate -> execute -> analyze, with progress and cancellation

use crate::analyzer::analyze;
use crate::auth::AuthorizationGate;
use crate::config::ScanConfig;
use crate::control::{emit, Progress, ProgressSender, ScanControl};
use crate::crawler::{Crawler, CrawlerConfig};
use crate::errors::ScanError;
use crate::executor::ExecutionEngine;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::generator::{generate, summarize, GenerationSummary};
use crate::models::{CrawlResult, Finding, TestCase};
use crate::payloads::PayloadCatalog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything one scan produced. Partial when `cancelled` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: String,
    pub crawl: CrawlResult,
    pub findings: Vec<Finding>,
    pub summary: GenerationSummary,
    /// Cases that reached the target and reported back (including failures)
    pub executed: usize,
    /// Cases that ended in a timeout or transport error
    pub errored: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    fn new(target: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            target: target.to_string(),
            crawl: CrawlResult::default(),
            findings: Vec::new(),
            summary: GenerationSummary::default(),
            executed: 0,
            errored: 0,
            cancelled: false,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub struct Scanner {
    fetcher: Arc<dyn Fetcher>,
    control: ScanControl,
    progress: Option<ProgressSender>,
}

impl Scanner {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            control: ScanControl::new(),
            progress: None,
        }
    }

    /// Scanner backed by the real HTTP client.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        let fetcher = HttpFetcher::from_config(config)?;
        Ok(Self::new(Arc::new(fetcher)))
    }

    pub fn with_control(mut self, control: ScanControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn control(&self) -> &ScanControl {
        &self.control
    }

    /// Run one full scan.
    ///
    /// Fails only on configuration or authorization problems; per-page and
    /// per-case failures are counted in the report instead.
    pub async fn run(
        &self,
        config: &ScanConfig,
        gate: &AuthorizationGate,
        catalog: &dyn PayloadCatalog,
    ) -> Result<ScanReport, ScanError> {
        config.validate()?;
        let seed = config.seed_url()?;
        let domain = seed
            .domain()
            .ok_or_else(|| ScanError::Config(format!("target '{}' has no host", config.target)))?;
        gate.check(&domain)?;

        let mut report = ScanReport::new(seed.as_str(), Utc::now());
        info!(
            "scan of {} started (profile {}, {:?} rules)",
            seed, config.profile, config.rule_set
        );

        // Crawl
        emit(&self.progress, Progress::CrawlStarted { target: seed.to_string() });
        let crawler = Crawler::new(Arc::clone(&self.fetcher), CrawlerConfig::from(config))
            .with_control(self.control.clone())
            .with_progress(self.progress.clone());
        report.crawl = crawler.crawl(seed).await;
        emit(
            &self.progress,
            Progress::CrawlFinished {
                pages: report.crawl.pages.len(),
                forms: report.crawl.forms.len(),
                params: report.crawl.params.len(),
            },
        );

        if self.control.is_cancelled() {
            return Ok(self.finish(report, true));
        }

        // Generate
        let payloads = catalog.get_payloads(config.profile);
        let cases = generate(
            &report.crawl,
            &payloads,
            config.profile,
            config.max_per_param,
            config.max_tests,
        );
        report.summary = summarize(&cases);
        let total = cases.len();
        emit(&self.progress, Progress::TestsGenerated { total });

        if total == 0 {
            info!("no injection points discovered; nothing to test");
            return Ok(self.finish(report, false));
        }

        // Execute and analyze as results stream in
        let by_id: HashMap<Uuid, TestCase> = cases.iter().map(|c| (c.id, c.clone())).collect();
        let engine = ExecutionEngine::new(Arc::clone(&self.fetcher), config.concurrency, config.timeout)
            .with_control(self.control.clone());
        let mut results = engine.execute(cases);

        let mut completed = 0usize;
        while let Some(result) = results.recv().await {
            if result.is_cancelled() {
                continue;
            }
            let Some(case) = by_id.get(&result.test_case_id) else {
                warn!("result for unknown test case {}", result.test_case_id);
                continue;
            };

            completed += 1;
            report.executed += 1;
            if result.is_error() {
                report.errored += 1;
            }

            for finding in analyze(case, &result, config.rule_set) {
                debug!(
                    "{} finding ({}) on '{}' at {}",
                    finding.category, finding.severity, finding.param, finding.url
                );
                emit(
                    &self.progress,
                    Progress::FindingRaised {
                        category: finding.category,
                        severity: finding.severity,
                    },
                );
                report.findings.push(finding);
            }
            emit(&self.progress, Progress::TestCompleted { completed, total });
        }

        let cancelled = self.control.is_cancelled();
        Ok(self.finish(report, cancelled))
    }

    fn finish(&self, mut report: ScanReport, cancelled: bool) -> ScanReport {
        report.cancelled = cancelled;
        report.finished_at = Utc::now();
        // Most severe first; ties keep arrival order
        report.findings.sort_by_key(|f| f.severity);
        info!(
            "scan {}: {} findings from {} executed cases ({} errored) in {:.1}s",
            if cancelled { "cancelled" } else { "complete" },
            report.findings.len(),
            report.executed,
            report.errored,
            report.duration_secs()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthorizer;
    use crate::errors::FetchError;
    use crate::fetcher::{FetchResponse, ProbeRequest};
    use crate::payloads::BuiltinCatalog;
    use crate::urls::NormalizedUrl;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and serves one page with a parameterized link
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    fn page(url: &str, body: &str) -> FetchResponse {
        FetchResponse {
            status: 200,
            headers: vec![],
            body: body.to_string(),
            elapsed: Duration::from_millis(5),
            final_url: url.to_string(),
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &NormalizedUrl, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(page(url.as_str(), r#"<a href="/item?id=3">item</a>"#))
        }

        async fn send(&self, request: &ProbeRequest, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(page(&request.url, "nothing to see"))
        }
    }

    fn config() -> ScanConfig {
        let mut config = ScanConfig::new("http://lab.local/");
        config.max_depth = 1;
        config.max_tests = 10;
        config
    }

    #[tokio::test]
    async fn unauthorized_target_makes_zero_requests() {
        let fetcher = Arc::new(CountingFetcher::default());
        let scanner = Scanner::new(fetcher.clone());
        let gate = AuthorizationGate::new(Box::new(StaticAuthorizer(false)));

        let err = scanner.run(&config(), &gate, &BuiltinCatalog::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::Unauthorized { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_request() {
        let fetcher = Arc::new(CountingFetcher::default());
        let scanner = Scanner::new(fetcher.clone());
        let gate = AuthorizationGate::new(Box::new(StaticAuthorizer(true)));
        let mut bad = config();
        bad.concurrency = 0;

        let err = scanner.run(&bad, &gate, &BuiltinCatalog::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_run_respects_test_budget() {
        let fetcher = Arc::new(CountingFetcher::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let scanner = Scanner::new(fetcher.clone()).with_progress(tx);
        let gate = AuthorizationGate::new(Box::new(StaticAuthorizer(true)));

        let report = scanner.run(&config(), &gate, &BuiltinCatalog::new()).await.unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.summary.total, 10);
        assert_eq!(report.executed, 10);
        assert_eq!(report.errored, 0);
        assert!(report.findings.is_empty());
        // 2 crawl fetches + 10 probes
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 12);

        drop(scanner);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(Progress::CrawlStarted { .. })));
        assert!(events.contains(&Progress::TestsGenerated { total: 10 }));
        assert!(events.contains(&Progress::TestCompleted { completed: 10, total: 10 }));
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_partial_report() {
        let fetcher = Arc::new(CountingFetcher::default());
        let control = ScanControl::new();
        control.cancel();
        let scanner = Scanner::new(fetcher.clone()).with_control(control);
        let gate = AuthorizationGate::new(Box::new(StaticAuthorizer(true)));

        let report = scanner.run(&config(), &gate, &BuiltinCatalog::new()).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.executed, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
