// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — chains steps over one input and reports progress.
//
// `execute` checks the request, then spawns a driver task per run.  The
// driver walks the descriptors in order, hands each step to the executor, and
// pushes events into a bounded channel owned by the run's `RunHandle`.  A
// slow consumer therefore slows its own run down instead of growing a buffer.
//
// Event protocol for n steps:
//
//   step_start(0) step_complete(0) ... step_start(n-1) step_complete(n-1) complete
//
// A failure at step k ends the stream with a single `error` event right after
// `step_start(k)`, so k complete pairs precede it.  The run's input file is removed on every exit path:
// success, failure, timeout, and a consumer that walks away.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use forge_core::config::ForgeConfig;
use forge_core::error::{ForgeError, Result};
use forge_core::human_errors::{humanize_error, step_failure_detail};
use forge_core::types::{
    Artifact, ProgressEvent, RunId, RunStatus, StepConfig, StepDescriptor, StepKind,
};

use crate::executor::StepExecutor;
use crate::steps::StepRegistry;
use crate::store::ArtifactStore;

/// Entry point for pipeline runs.  Cheap to clone; clones share the worker
/// pool, the store, and the shared engines.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ForgeConfig>,
    store: Arc<ArtifactStore>,
    registry: Arc<StepRegistry>,
    executor: StepExecutor,
}

/// One descriptor after request checking.
#[derive(Debug)]
struct PlannedStep {
    label: String,
    /// `Err` holds the raw name of a kind nobody knows.
    kind: std::result::Result<StepKind, String>,
    config: StepConfig,
}

/// How the step loop of a run ended.
enum Outcome {
    Completed(Artifact),
    Failed(String),
    /// The consumer dropped its handle.
    Abandoned,
}

impl Orchestrator {
    /// Open the store under `config.data_dir` and install the default steps.
    pub fn new(config: ForgeConfig) -> Result<Self> {
        let store = Arc::new(ArtifactStore::open(&config.data_dir)?);
        let registry = Arc::new(StepRegistry::with_defaults(&config));
        Ok(Self::from_parts(config, store, registry))
    }

    pub fn from_parts(
        config: ForgeConfig,
        store: Arc<ArtifactStore>,
        registry: Arc<StepRegistry>,
    ) -> Self {
        let config = Arc::new(config);
        let executor = StepExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&config),
        );
        Self {
            config,
            store,
            registry,
            executor,
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Build the shared recovery engine ahead of the first run that needs it.
    ///
    /// A failure here is not sticky: the next run that needs the engine tries
    /// again.
    pub async fn warm_up(&self) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.warm_up())
            .await
            .map_err(|err| ForgeError::Internal(format!("warm-up task failed: {err}")))?
    }

    /// Start a run of `descriptors` over `input`.
    ///
    /// The orchestrator takes ownership of `input`'s file: it is deleted when
    /// the run ends, and also when the request is rejected here.  An empty
    /// step list, or a bad configuration for a known kind, is rejected with
    /// [`ForgeError::Validation`] before anything runs.  An unknown kind is
    /// reported in the event stream at its own position.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(input = %input.name(), steps = descriptors.len()))]
    pub fn execute(&self, input: Artifact, descriptors: Vec<StepDescriptor>) -> Result<RunHandle> {
        let guard = InputGuard::new(Arc::clone(&self.store), input.path().to_path_buf());

        let runtime = Handle::try_current()
            .map_err(|_| ForgeError::Internal("pipeline runs need a Tokio runtime".into()))?;
        let plan = self.plan(descriptors)?;

        let run_id = RunId::new();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(RunStatus::Running);

        let run = Run {
            id: run_id,
            plan,
            input,
            executor: self.executor.clone(),
            config: Arc::clone(&self.config),
            events: events_tx,
            status: status_tx,
            guard,
        };
        let span = info_span!("run", %run_id);
        let driver = runtime.spawn(run.drive().instrument(span));
        info!(%run_id, "run started");

        Ok(RunHandle {
            run_id,
            events: events_rx,
            status: status_rx,
            driver,
        })
    }

    fn plan(&self, descriptors: Vec<StepDescriptor>) -> Result<Vec<PlannedStep>> {
        if descriptors.is_empty() {
            return Err(ForgeError::Validation(
                "a run needs at least one step".into(),
            ));
        }
        descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| -> Result<PlannedStep> {
                let label = descriptor.display_label();
                let kind = descriptor.resolve_kind().ok_or_else(|| descriptor.kind.clone());
                if let Ok(known) = &kind {
                    self.executor
                        .validate(*known, &descriptor.config)
                        .map_err(|err| match err.source {
                            ForgeError::Validation(msg) => {
                                ForgeError::Validation(format!("step {index} ({label}): {msg}"))
                            }
                            other => other,
                        })?;
                }
                Ok(PlannedStep {
                    label,
                    kind,
                    config: descriptor.config,
                })
            })
            .collect()
    }
}

/// Deletes a run's input file when dropped.
struct InputGuard {
    store: Arc<ArtifactStore>,
    path: PathBuf,
}

impl InputGuard {
    fn new(store: Arc<ArtifactStore>, path: PathBuf) -> Self {
        Self { store, path }
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        match self.store.remove(&self.path) {
            Ok(()) => debug!("run input removed"),
            Err(err) => warn!(error = %err, "failed to remove run input"),
        }
    }
}

/// Everything the driver task owns.
struct Run {
    id: RunId,
    plan: Vec<PlannedStep>,
    input: Artifact,
    executor: StepExecutor,
    config: Arc<ForgeConfig>,
    events: mpsc::Sender<ProgressEvent>,
    status: watch::Sender<RunStatus>,
    guard: InputGuard,
}

impl Run {
    async fn drive(self) {
        let Run {
            id,
            plan,
            input,
            executor,
            config,
            events,
            status,
            guard,
        } = self;
        let total = plan.len();

        let outcome = match tokio::time::timeout(
            config.run_timeout(),
            run_steps(&plan, input, &executor, &events),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(%id, timeout_secs = config.run_timeout_secs, "run timed out");
                Outcome::Failed(
                    humanize_error(&ForgeError::Timeout(config.run_timeout_secs)).detail(),
                )
            }
        };

        // The input goes before the terminal event so a consumer that has
        // seen the end of the stream never finds it still on disk.
        drop(guard);

        let (final_status, terminal) = match outcome {
            Outcome::Completed(artifact) => {
                info!(%id, output = %artifact.name(), "run succeeded");
                (
                    RunStatus::Succeeded,
                    Some(ProgressEvent::Complete {
                        message: format!("Workflow completed ({total} steps)"),
                        filename: artifact.name(),
                    }),
                )
            }
            Outcome::Failed(detail) => {
                info!(%id, "run failed");
                (RunStatus::Failed, Some(ProgressEvent::Error { detail }))
            }
            Outcome::Abandoned => {
                warn!(%id, "consumer went away; run stopped");
                (RunStatus::Failed, None)
            }
        };
        status.send_replace(final_status);

        if let Some(event) = terminal {
            if events.send(event).await.is_err() {
                debug!(%id, "terminal event not delivered");
            }
        }
    }
}

async fn run_steps(
    plan: &[PlannedStep],
    input: Artifact,
    executor: &StepExecutor,
    events: &mpsc::Sender<ProgressEvent>,
) -> Outcome {
    let total = plan.len();
    let mut current = input;

    for (step, planned) in plan.iter().enumerate() {
        let label = planned.label.clone();
        let start = ProgressEvent::StepStart {
            step,
            total,
            label: label.clone(),
        };
        if events.send(start).await.is_err() {
            return Outcome::Abandoned;
        }

        let kind = match &planned.kind {
            Ok(kind) => *kind,
            Err(raw) => {
                let err = ForgeError::UnknownStep(raw.clone());
                warn!(step, kind = %raw, "unknown step type");
                return Outcome::Failed(format!(
                    "Step '{label}' failed: {}",
                    humanize_error(&err).detail()
                ));
            }
        };

        debug!(step, %kind, input = %current.name(), "step starting");
        match executor.run(kind, planned.config.clone(), current.clone()).await {
            Ok(next) => {
                info!(step, %kind, output = %next.name(), "step complete");
                current = next;
            }
            Err(err) => {
                warn!(step, %kind, error = %err, "step failed");
                return Outcome::Failed(step_failure_detail(&label, &err));
            }
        }

        let done = ProgressEvent::StepComplete { step, total, label };
        if events.send(done).await.is_err() {
            return Outcome::Abandoned;
        }
    }

    Outcome::Completed(current)
}

/// The consumer side of one run.
///
/// Events arrive in protocol order and each exactly once.  Dropping the
/// handle abandons the run: the step in flight finishes, nothing after it
/// starts, and the input is still cleaned up.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    events: mpsc::Receiver<ProgressEvent>,
    status: watch::Receiver<RunStatus>,
    driver: JoinHandle<()>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Next event, or `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Drain the run to its end.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// A receiver that sees every status change.
    pub fn status_watch(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Stop consuming.  The returned handle resolves once the run has
    /// wound down and its input is gone.
    pub fn abandon(mut self) -> JoinHandle<()> {
        self.events.close();
        self.driver
    }
}
