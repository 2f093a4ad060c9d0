// Execution engine: bounded concurrent submission of test cases
// Results stream out as they complete; one failing case never stops the others

use crate::control::ScanControl;
use crate::errors::FetchError;
use crate::fetcher::{FetchResponse, Fetcher, ProbeRequest};
use crate::models::{ExecErrorKind, ExecutionResult, Method, TestCase};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Upper bound on the body prefix kept per result
pub const MAX_BODY_SNIPPET: usize = 64 * 1024;

impl From<&TestCase> for ProbeRequest {
    fn from(case: &TestCase) -> Self {
        Self {
            method: case.method,
            url: case.url.clone(),
            form: match case.method {
                Method::POST => case.fields.clone(),
                Method::GET => Vec::new(),
            },
        }
    }
}

/// Headers that can betray debug builds or server internals
fn is_diagnostic_header(name: &str) -> bool {
    matches!(name, "server" | "x-powered-by" | "x-aspnet-version" | "x-aspnetmvc-version")
        || name.starts_with("x-debug")
}

fn truncate_at_char_boundary(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn to_result(case_id: uuid::Uuid, outcome: Result<FetchResponse, ExecErrorKind>, elapsed: Duration) -> ExecutionResult {
    match outcome {
        Ok(resp) => ExecutionResult {
            test_case_id: case_id,
            outcome: Ok(resp.status),
            body: truncate_at_char_boundary(&resp.body, MAX_BODY_SNIPPET),
            elapsed: resp.elapsed,
            headers: resp
                .headers
                .into_iter()
                .filter(|(name, _)| is_diagnostic_header(name))
                .collect(),
        },
        Err(kind) => ExecutionResult {
            test_case_id: case_id,
            outcome: Err(kind),
            body: String::new(),
            elapsed,
            headers: Vec::new(),
        },
    }
}

async fn run_case(
    fetcher: &dyn Fetcher,
    case: &TestCase,
    timeout: Duration,
    control: &ScanControl,
) -> ExecutionResult {
    let request = ProbeRequest::from(case);
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = control.cancelled() => Err(ExecErrorKind::Cancelled),
        res = tokio::time::timeout(timeout, fetcher.send(&request, timeout)) => match res {
            Err(_) | Ok(Err(FetchError::Timeout(_))) => Err(ExecErrorKind::Timeout),
            Ok(Err(FetchError::Connect(msg))) => Err(ExecErrorKind::Connect(msg)),
            Ok(Err(e)) => Err(ExecErrorKind::Other(e.to_string())),
            Ok(Ok(resp)) => Ok(resp),
        },
    };

    if let Err(kind) = &outcome {
        debug!("test case {} ({} {}) failed: {}", case.id, case.method, case.url, kind);
    }
    to_result(case.id, outcome, started.elapsed())
}

pub struct ExecutionEngine {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    timeout: Duration,
    control: ScanControl,
}

impl ExecutionEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            timeout,
            control: ScanControl::new(),
        }
    }

    pub fn with_control(mut self, control: ScanControl) -> Self {
        self.control = control;
        self
    }

    /// Dispatch every case and stream results back as they complete.
    ///
    /// The channel closes once all dispatched cases have reported. After
    /// cancellation no new case is dispatched; in-flight cases report
    /// `Cancelled` unless they finish first.
    pub fn execute(&self, cases: Vec<TestCase>) -> mpsc::Receiver<ExecutionResult> {
        let (tx, rx) = mpsc::channel(self.concurrency * 2);
        let fetcher = Arc::clone(&self.fetcher);
        let control = self.control.clone();
        let timeout = self.timeout;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            "executing {} test cases (concurrency {}, timeout {:?})",
            cases.len(),
            self.concurrency,
            timeout
        );

        tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            let mut dispatched = 0usize;

            for case in cases {
                let permit = tokio::select! {
                    biased;
                    _ = control.cancelled() => break,
                    _ = tx.closed() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                if tx.is_closed() {
                    break;
                }

                let fetcher = Arc::clone(&fetcher);
                let control = control.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    let result = run_case(fetcher.as_ref(), &case, timeout, &control).await;
                    let _ = tx.send(result).await;
                });
                dispatched += 1;
            }

            if control.is_cancelled() {
                info!("dispatch stopped by cancellation after {} cases", dispatched);
            } else if tx.is_closed() {
                info!("result receiver dropped, dispatch stopped after {} cases", dispatched);
            }
            while in_flight.join_next().await.is_some() {}
        });

        rx
    }
}
