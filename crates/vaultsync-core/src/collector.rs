//! Quiet-period coalescing of raw change hints.
//!
//! Editors and build tools touch many files in quick succession. The
//! collector waits until no new path has arrived for the quiet period and
//! then hands the accumulated unique set downstream as one batch.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

pub struct ChangeCollector {
    quiet_period: Duration,
    input: mpsc::UnboundedReceiver<PathBuf>,
    output: mpsc::Sender<Vec<PathBuf>>,
}

impl ChangeCollector {
    pub fn new(
        quiet_period: Duration,
        input: mpsc::UnboundedReceiver<PathBuf>,
        output: mpsc::Sender<Vec<PathBuf>>,
    ) -> Self {
        Self {
            quiet_period,
            input,
            output,
        }
    }

    /// Run until the input closes, flushing whatever is still pending.
    pub async fn run(mut self) {
        let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                received = self.input.recv() => match received {
                    Some(path) => {
                        pending.insert(path);
                        deadline = Some(Instant::now() + self.quiet_period);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if !self.flush(&mut pending).await {
                        return;
                    }
                }
            }
        }

        self.flush(&mut pending).await;
        debug!("Change collector stopped");
    }

    /// Returns false once nobody listens for batches anymore.
    async fn flush(&self, pending: &mut BTreeSet<PathBuf>) -> bool {
        if pending.is_empty() {
            return true;
        }

        let batch: Vec<PathBuf> = std::mem::take(pending).into_iter().collect();
        debug!("Flushing {} changed path(s)", batch.len());
        if self.output.send(batch).await.is_err() {
            warn!("Batch receiver closed, dropping changes");
            return false;
        }
        true
    }
}
