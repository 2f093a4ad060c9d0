// Operator cancellation and progress events shared by the pipeline stages

use crate::models::{Category, Severity};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Cloneable stop signal. Every clone observes the same cancellation.
#[derive(Debug, Clone)]
pub struct ScanControl {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ScanControl {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request a graceful stop. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called; pending forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives in every clone, so this only happens at teardown.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ScanControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Advisory progress events for a UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    CrawlStarted { target: String },
    PageCrawled { pages_crawled: usize, queued: usize },
    CrawlFinished { pages: usize, forms: usize, params: usize },
    TestsGenerated { total: usize },
    TestCompleted { completed: usize, total: usize },
    FindingRaised { category: Category, severity: Severity },
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// Send an event if anyone is listening. A dropped receiver is not an error.
pub(crate) fn emit(progress: &Option<ProgressSender>, event: Progress) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}
