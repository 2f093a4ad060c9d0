// Breadth-first crawl controller
//
// The coordinator owns the frontier (visited set, next level, merged result).
// Workers only fetch and parse, then report back over a channel, so no frontier
// state is ever shared between tasks.

use crate::config::ScanConfig;
use crate::control::{emit, Progress, ProgressSender, ScanControl};
use crate::fetcher::Fetcher;
use crate::models::{CrawlResult, FailedPage, Form, Method};
use crate::parser::{self, ParsedPage};
use crate::urls::{normalize, NormalizedUrl};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_depth: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    /// Only follow links on the seed's host
    pub same_host_only: bool,
}

impl From<&ScanConfig> for CrawlerConfig {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            concurrency: config.concurrency,
            timeout: config.timeout,
            same_host_only: true,
        }
    }
}

enum PageOutcome {
    Parsed(ParsedPage),
    Failed(String),
}

/// Sent by a worker once its page is done
struct CrawlReport {
    url: NormalizedUrl,
    depth: usize,
    outcome: PageOutcome,
}

/// Mutable crawl state, touched only by the coordinator
struct Frontier {
    result: CrawlResult,
    visited: HashSet<NormalizedUrl>,
    seen_forms: HashSet<(NormalizedUrl, NormalizedUrl, Method)>,
    seen_params: HashSet<NormalizedUrl>,
    next: Vec<NormalizedUrl>,
    scope: Option<String>,
}

impl Frontier {
    fn new(seed: &NormalizedUrl, same_host_only: bool) -> Self {
        let mut visited = HashSet::new();
        visited.insert(seed.clone());
        Self {
            result: CrawlResult::default(),
            visited,
            seen_forms: HashSet::new(),
            seen_params: HashSet::new(),
            next: Vec::new(),
            scope: if same_host_only { seed.domain() } else { None },
        }
    }

    fn in_scope(&self, url: &NormalizedUrl) -> bool {
        match &self.scope {
            Some(host) => url.domain().as_deref() == Some(host.as_str()),
            None => true,
        }
    }

    fn merge(&mut self, report: CrawlReport, max_depth: usize) {
        match report.outcome {
            PageOutcome::Failed(reason) => {
                warn!("giving up on {}: {}", report.url, reason);
                self.result.failed.push(FailedPage {
                    url: report.url,
                    reason,
                });
            }
            PageOutcome::Parsed(page) => {
                debug!(
                    "{} (depth {}): {} links, {} forms, {} bindings",
                    report.url,
                    report.depth,
                    page.links.len(),
                    page.forms.len(),
                    page.params.len()
                );
                self.result.pages.insert(report.url);

                // First discovery wins
                for form in page.forms {
                    self.add_form(form);
                }
                for binding in page.params {
                    if self.seen_params.insert(binding.url.clone()) {
                        self.result.params.push(binding);
                    }
                }

                if report.depth < max_depth {
                    for link in page.links {
                        // Marked visited at enqueue time so no later report schedules it again
                        if self.in_scope(&link) && self.visited.insert(link.clone()) {
                            self.next.push(link);
                        }
                    }
                }
            }
        }
    }

    fn add_form(&mut self, form: Form) {
        if self.seen_forms.insert(form.key()) {
            self.result.forms.push(form);
        }
    }
}

pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    config: CrawlerConfig,
    control: ScanControl,
    progress: Option<ProgressSender>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: CrawlerConfig) -> Self {
        Self {
            fetcher,
            config,
            control: ScanControl::new(),
            progress: None,
        }
    }

    pub fn with_control(mut self, control: ScanControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressSender>) -> Self {
        self.progress = progress;
        self
    }

    /// Crawl from `seed` until the frontier is exhausted, the depth bound is hit,
    /// or the scan is cancelled. Always returns what was collected.
    pub async fn crawl(&self, seed: NormalizedUrl) -> CrawlResult {
        info!(
            "crawling {} (depth {}, concurrency {})",
            seed, self.config.max_depth, self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut frontier = Frontier::new(&seed, self.config.same_host_only);
        let mut level = vec![seed];
        let mut depth = 0;

        while !level.is_empty() {
            if self.control.is_cancelled() {
                break;
            }

            let (tx, mut rx) = mpsc::channel::<CrawlReport>(level.len());
            let mut workers = JoinSet::new();

            // Dispatch in insertion order; completion order is whatever the network gives us
            for url in level.drain(..) {
                let tx = tx.clone();
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let timeout = self.config.timeout;
                workers.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    let outcome = match fetcher.fetch(&url, timeout).await {
                        Ok(resp) if !resp.is_success() => PageOutcome::Failed(format!("HTTP {}", resp.status)),
                        Ok(resp) => {
                            let base = normalize(&resp.final_url, None).unwrap_or_else(|| url.clone());
                            PageOutcome::Parsed(parser::parse(&base, &resp.body))
                        }
                        Err(e) => PageOutcome::Failed(e.to_string()),
                    };
                    let _ = tx.send(CrawlReport { url, depth, outcome }).await;
                });
            }
            drop(tx);

            let cancelled = loop {
                tokio::select! {
                    biased;
                    _ = self.control.cancelled() => break true,
                    report = rx.recv() => match report {
                        Some(report) => {
                            frontier.merge(report, self.config.max_depth);
                            emit(&self.progress, Progress::PageCrawled {
                                pages_crawled: frontier.result.pages.len(),
                                queued: frontier.next.len(),
                            });
                        }
                        None => break false,
                    },
                }
            };

            if cancelled {
                workers.abort_all();
                info!("crawl cancelled at depth {}", depth);
                break;
            }
            while workers.join_next().await.is_some() {}

            level = std::mem::take(&mut frontier.next);
            depth += 1;
        }

        let result = frontier.result;
        info!(
            "crawl finished: {} pages, {} forms, {} parameterized URLs, {} failed",
            result.pages.len(),
            result.forms.len(),
            result.params.len(),
            result.failed.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamBinding;

    fn url(s: &str) -> NormalizedUrl {
        NormalizedUrl::parse(s).unwrap()
    }

    #[test]
    fn merge_keeps_first_form_and_binding() {
        let seed = url("http://a.local/");
        let mut frontier = Frontier::new(&seed, true);
        let form = Form {
            page: seed.clone(),
            action: url("http://a.local/login"),
            method: Method::POST,
            fields: vec!["user".into()],
        };
        let mut later = form.clone();
        later.fields.push("extra".into());
        let binding = ParamBinding {
            url: url("http://a.local/?id=1"),
            params: vec!["id".into()],
        };

        for f in [form.clone(), later] {
            frontier.merge(
                CrawlReport {
                    url: seed.clone(),
                    depth: 0,
                    outcome: PageOutcome::Parsed(ParsedPage {
                        links: vec![],
                        forms: vec![f],
                        params: vec![binding.clone()],
                    }),
                },
                2,
            );
        }

        assert_eq!(frontier.result.forms, vec![form]);
        assert_eq!(frontier.result.params, vec![binding]);
        assert_eq!(frontier.result.pages.len(), 1);
    }

    #[test]
    fn merge_respects_depth_and_scope() {
        let seed = url("http://a.local/");
        let mut frontier = Frontier::new(&seed, true);
        let links = vec![
            url("http://a.local/x"),
            url("http://other.local/y"),
            seed.clone(),
        ];

        frontier.merge(
            CrawlReport {
                url: seed.clone(),
                depth: 0,
                outcome: PageOutcome::Parsed(ParsedPage {
                    links: links.clone(),
                    ..Default::default()
                }),
            },
            1,
        );
        assert_eq!(frontier.next, vec![url("http://a.local/x")]);

        frontier.next.clear();
        frontier.merge(
            CrawlReport {
                url: url("http://a.local/x"),
                depth: 1,
                outcome: PageOutcome::Parsed(ParsedPage {
                    links: vec![url("http://a.local/z")],
                    ..Default::default()
                }),
            },
            1,
        );
        assert!(frontier.next.is_empty(), "depth 2 must not be scheduled");
    }

    #[test]
    fn failed_pages_are_recorded_not_visited() {
        let seed = url("http://a.local/");
        let mut frontier = Frontier::new(&seed, true);
        frontier.merge(
            CrawlReport {
                url: seed.clone(),
                depth: 0,
                outcome: PageOutcome::Failed("connection refused".into()),
            },
            2,
        );
        assert!(frontier.result.pages.is_empty());
        assert_eq!(frontier.result.failed.len(), 1);
        assert_eq!(frontier.result.failed[0].url, seed);
    }
}
