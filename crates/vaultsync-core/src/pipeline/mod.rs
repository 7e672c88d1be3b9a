//! Single-flight push pipeline
//!
//! Paths are queued as canonical content paths. A cycle takes the whole
//! queue, and while it runs new paths only grow the queue for the next one.
//! At most one archive is ever being assembled or sent.

pub mod cycle;
pub mod state;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveBuilder;
use crate::classify::{PathClassifier, normalize};
use crate::config::SyncConfig;
use crate::error::ConfigError;
use crate::escape::NameEscaping;
use crate::sender::Deliver;

pub use cycle::{Cycle, CycleOutcome, CycleReport, Disruption};
pub use state::{PipelineEvent, PipelineState, TransitionError};

pub struct Pipeline<D> {
    cycle: Cycle<D>,
    state: watch::Sender<PipelineState>,
    queue: BTreeSet<PathBuf>,
    quiet_period: Duration,
}

impl<D: Deliver> Pipeline<D> {
    pub fn new(config: &SyncConfig, deliver: D) -> Result<Self, ConfigError> {
        config.validate()?;

        let rules = config.exclusion_rules()?;
        let targets = config.parse_targets()?;
        let escaping: Arc<dyn NameEscaping> = Arc::from(config.namespace_escaping.build());

        let classifier = PathClassifier::new(&config.workdir, rules.clone());
        let builder = ArchiveBuilder::new(config.archive_path(), rules);
        let cycle = Cycle::new(
            classifier,
            escaping,
            builder,
            deliver,
            targets,
            config.retry.clone(),
        );

        let (state, _) = watch::channel(PipelineState::Idle);
        Ok(Self {
            cycle,
            state,
            queue: BTreeSet::new(),
            quiet_period: config.delay(),
        })
    }

    /// Run `hook` after packaging and before each archive write.
    pub fn with_disruption(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.cycle.disruption = Some(Arc::new(hook));
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue a raw path. Returns false if it was filtered out.
    pub fn enqueue(&mut self, raw: impl AsRef<Path>) -> bool {
        enqueue(&self.cycle.classifier, &mut self.queue, raw.as_ref())
    }

    /// Queue `paths` and run one cycle over the queue.
    ///
    /// Relative paths are taken from the current directory, like command
    /// line arguments, not from the workdir.
    pub async fn push<I, P>(&mut self, paths: I) -> Result<Option<CycleReport>, TransitionError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let cwd = std::env::current_dir().ok();
        for path in paths {
            match &cwd {
                Some(cwd) => self.enqueue(normalize(path.as_ref(), cwd)),
                None => self.enqueue(path),
            };
        }
        self.flush().await
    }

    /// Run one cycle over everything queued. `None` if the queue was empty.
    ///
    /// Paths of a cycle whose assembly failed are queued again.
    pub async fn flush(&mut self) -> Result<Option<CycleReport>, TransitionError> {
        if self.queue.is_empty() {
            return Ok(None);
        }

        advance(&self.state, PipelineEvent::BatchReady)?;
        let paths: Vec<PathBuf> = std::mem::take(&mut self.queue).into_iter().collect();

        let state = &self.state;
        let mut failure = None;
        let report = self
            .cycle
            .execute(paths, |event| {
                if failure.is_none() {
                    failure = advance(state, event).err();
                }
            })
            .await;

        if let Some(e) = failure {
            return Err(e);
        }
        if report.should_retry() {
            self.queue.extend(report.paths.iter().cloned());
        }
        Ok(Some(report))
    }

    /// Watch mode: consume batches until the channel closes and the last
    /// cycle has finished.
    ///
    /// A new cycle starts only once the previous one has been joined, so a
    /// failed or crashed cycle always has its paths requeued first.
    pub async fn run(
        self,
        mut batches: mpsc::Receiver<Vec<PathBuf>>,
        reports: mpsc::UnboundedSender<CycleReport>,
    ) {
        let Pipeline {
            cycle,
            state,
            mut queue,
            quiet_period,
        } = self;
        let cycle = Arc::new(cycle);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut running: Option<JoinHandle<CycleReport>> = None;
        let mut in_flight: Vec<PathBuf> = Vec::new();
        let mut retry_at: Option<Instant> = None;
        let mut batches_open = true;

        loop {
            if running.is_none() && retry_at.is_none() && !queue.is_empty() {
                if let Err(e) = advance(&state, PipelineEvent::BatchReady) {
                    error!("{e}");
                    break;
                }

                let paths: Vec<PathBuf> = std::mem::take(&mut queue).into_iter().collect();
                debug!("Starting cycle with {} path(s)", paths.len());
                in_flight = paths.clone();

                let cycle = Arc::clone(&cycle);
                let events = events_tx.clone();
                running = Some(tokio::spawn(async move {
                    cycle
                        .execute(paths, |event| {
                            let _ = events.send(event);
                        })
                        .await
                }));
            }

            if !batches_open && running.is_none() {
                if !queue.is_empty() {
                    warn!("Stopping with {} path(s) not pushed", queue.len());
                }
                break;
            }

            tokio::select! {
                batch = batches.recv(), if batches_open => match batch {
                    Some(paths) => {
                        for raw in paths {
                            enqueue(&cycle.classifier, &mut queue, &raw);
                        }
                    }
                    None => batches_open = false,
                },
                Some(event) = events_rx.recv() => {
                    if let Err(e) = advance(&state, event) {
                        error!("{e}");
                    }
                },
                joined = join(&mut running), if running.is_some() => {
                    running = None;
                    // Events the cycle sent before it ended.
                    while let Ok(event) = events_rx.try_recv() {
                        if let Err(e) = advance(&state, event) {
                            error!("{e}");
                        }
                    }

                    let paths = std::mem::take(&mut in_flight);
                    let report = match joined {
                        Ok(report) => report,
                        Err(e) => {
                            error!("Push cycle aborted: {e}");
                            if !state.borrow().is_idle() {
                                if let Err(e) = advance(&state, PipelineEvent::CycleAborted) {
                                    error!("{e}");
                                }
                            }
                            CycleReport {
                                paths,
                                items: Vec::new(),
                                outcome: CycleOutcome::Aborted(e.to_string()),
                            }
                        }
                    };

                    if report.should_retry() {
                        info!("Retrying in {} ms", quiet_period.as_millis());
                        queue.extend(report.paths.iter().cloned());
                        retry_at = Some(Instant::now() + quiet_period);
                    }
                    let _ = reports.send(report);
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                }
            }
        }

        debug!("Pipeline stopped");
    }
}

async fn join(running: &mut Option<JoinHandle<CycleReport>>) -> Result<CycleReport, JoinError> {
    match running {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn enqueue(classifier: &PathClassifier, queue: &mut BTreeSet<PathBuf>, raw: &Path) -> bool {
    match classifier.classify(raw) {
        Some(canonical) => {
            queue.insert(canonical);
            true
        }
        None => false,
    }
}

fn advance(
    state: &watch::Sender<PipelineState>,
    event: PipelineEvent,
) -> Result<PipelineState, TransitionError> {
    let next = state.borrow().on(event)?;
    state.send_replace(next);
    debug!("Pipeline {}", next);
    Ok(next)
}
