//! One push cycle: classify, package, build, deliver.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::{Archive, ArchiveBuilder, BuildOutcome};
use crate::classify::PathClassifier;
use crate::config::RetryConfig;
use crate::error::AssemblyError;
use crate::escape::NameEscaping;
use crate::package::{ContentItem, Package};
use crate::sender::{Deliver, PushResult, Target};

use super::state::PipelineEvent;

/// Hook run between packaging and archive writing.
pub type Disruption = Arc<dyn Fn() + Send + Sync>;

/// What happened to one batch of paths.
#[derive(Debug)]
pub struct CycleReport {
    /// Paths the cycle was started with.
    pub paths: Vec<PathBuf>,
    /// Package entries of the last assembly attempt.
    pub items: Vec<ContentItem>,
    pub outcome: CycleOutcome,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No path survived classification.
    Empty,
    /// Archive assembly kept failing; the paths go back to the queue.
    Failed(AssemblyError),
    /// The cycle task stopped without reporting, e.g. a delivery panicked.
    Aborted(String),
    Delivered {
        archive: Archive,
        results: Vec<PushResult>,
    },
}

impl CycleReport {
    /// True unless assembly failed or any target reported an error.
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            CycleOutcome::Empty => true,
            CycleOutcome::Failed(_) | CycleOutcome::Aborted(_) => false,
            CycleOutcome::Delivered { results, .. } => results.iter().all(PushResult::is_ok),
        }
    }

    /// Whether the paths of this cycle belong back in the queue.
    pub fn should_retry(&self) -> bool {
        matches!(
            self.outcome,
            CycleOutcome::Failed(_) | CycleOutcome::Aborted(_)
        )
    }

    pub fn results(&self) -> &[PushResult] {
        match &self.outcome {
            CycleOutcome::Delivered { results, .. } => results,
            _ => &[],
        }
    }
}

pub struct Cycle<D> {
    pub(super) classifier: PathClassifier,
    escaping: Arc<dyn NameEscaping>,
    builder: ArchiveBuilder,
    deliver: D,
    targets: Vec<Target>,
    retry: RetryConfig,
    pub(super) disruption: Option<Disruption>,
}

impl<D: Deliver> Cycle<D> {
    pub(super) fn new(
        classifier: PathClassifier,
        escaping: Arc<dyn NameEscaping>,
        builder: ArchiveBuilder,
        deliver: D,
        targets: Vec<Target>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            classifier,
            escaping,
            builder,
            deliver,
            targets,
            retry,
            disruption: None,
        }
    }

    /// Run the cycle, reporting each state-changing event as it happens.
    pub async fn execute<F>(&self, paths: Vec<PathBuf>, mut on_event: F) -> CycleReport
    where
        F: FnMut(PipelineEvent),
    {
        let (package, built) = self.build(&paths).await;
        let items = package.items().to_vec();

        let archive = match built {
            Ok(BuildOutcome::Built(archive)) => archive,
            Ok(BuildOutcome::Empty) => {
                on_event(PipelineEvent::NothingToPush);
                return CycleReport {
                    paths,
                    items,
                    outcome: CycleOutcome::Empty,
                };
            }
            Err(e) => {
                warn!("Failed to create archive: {e}");
                on_event(PipelineEvent::AssemblyFailed);
                return CycleReport {
                    paths,
                    items,
                    outcome: CycleOutcome::Failed(e),
                };
            }
        };

        on_event(PipelineEvent::ArchiveBuilt);
        let results = self.deliver_all(&archive).await;
        on_event(PipelineEvent::TargetsReported);

        CycleReport {
            paths,
            items,
            outcome: CycleOutcome::Delivered { archive, results },
        }
    }

    fn assemble(&self, paths: &[PathBuf]) -> Package {
        let mut package = Package::new(self.escaping.clone());
        for raw in paths {
            let Some(canonical) = self.classifier.classify(raw) else {
                continue;
            };
            if let Some(item) = package.add(&canonical) {
                info!("{} {}", if item.exists { "+" } else { "-" }, item.zip_path);
            }
        }
        package
    }

    async fn build(&self, paths: &[PathBuf]) -> (Package, Result<BuildOutcome, AssemblyError>) {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            let package = self.assemble(paths);

            if let Some(hook) = &self.disruption {
                hook();
            }

            match self.builder.build(&package) {
                Ok(outcome) => return (package, Ok(outcome)),
                Err(e) if attempt < attempts => {
                    warn!("Failed to create archive, retrying ({attempt}/{attempts}): {e}");
                    tokio::time::sleep(self.retry.delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    let exhausted = AssemblyError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    };
                    return (package, Err(exhausted));
                }
            }
        }
    }

    async fn deliver_all(&self, archive: &Archive) -> Vec<PushResult> {
        let mut results = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let result = self.deliver.deliver(&archive.path, target).await;
            let millis = result.elapsed.as_millis();
            match &result.outcome {
                Ok(()) => info!("Deploying to [{}] in {} ms: OK", result.target, millis),
                Err(e) => warn!("Deploying to [{}] in {} ms: {}", result.target, millis, e),
            }
            results.push(result);
        }

        results
    }
}
