// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Step executor — runs one transformation off the async runtime.
//
// Every transformation is CPU- or disk-heavy, so it runs inside
// `spawn_blocking`, gated by a semaphore sized to `max_workers`.  The task
// that emits progress events only awaits the join handle, which keeps it (and
// every other run on the runtime) responsive while a step grinds.  An error
// or a panic inside the step comes back as a typed `StepError`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, instrument};

use forge_core::config::ForgeConfig;
use forge_core::error::{ForgeError, StepError};
use forge_core::types::{Artifact, StepConfig, StepKind};

use crate::steps::{StepContext, StepRegistry};
use crate::store::ArtifactStore;

/// Bounded pool that executes steps for every run of one orchestrator.
#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<StepRegistry>,
    store: Arc<ArtifactStore>,
    config: Arc<ForgeConfig>,
    workers: Arc<Semaphore>,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<StepRegistry>,
        store: Arc<ArtifactStore>,
        config: Arc<ForgeConfig>,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            registry,
            store,
            config,
            workers,
        }
    }

    /// Worker slots currently free.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Check `config` against `kind` without running anything.
    pub fn validate(&self, kind: StepKind, config: &StepConfig) -> Result<(), StepError> {
        let step = self.registry.get(kind).ok_or_else(|| {
            StepError::new(kind, ForgeError::UnknownStep(kind.as_str().to_owned()))
        })?;
        step.validate(config)
            .map_err(|err| StepError::new(kind, err))
    }

    /// Run `kind` on `input` and return the new artifact.
    ///
    /// Waits for a free worker first.  `input` is only read.
    #[instrument(skip(self, config, input), fields(input = %input.name()))]
    pub async fn run(
        &self,
        kind: StepKind,
        config: StepConfig,
        input: Artifact,
    ) -> Result<Artifact, StepError> {
        let step = self.registry.get(kind).ok_or_else(|| {
            StepError::new(kind, ForgeError::UnknownStep(kind.as_str().to_owned()))
        })?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| StepError::new(kind, ForgeError::Internal("worker pool closed".into())))?;
        debug!(available = self.workers.available_permits(), "worker acquired");

        let ctx = StepContext::new(Arc::clone(&self.store), Arc::clone(&self.config));
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            // `ctx` drops here on every path, removing unkept outputs.
            step.transform(&input, &config, &ctx)
        });

        match task.await {
            Ok(Ok(artifact)) => Ok(artifact),
            Ok(Err(err)) => Err(StepError::new(kind, err)),
            Err(join) => {
                let message = if join.is_panic() {
                    panic_message(join.into_panic())
                } else {
                    "step was cancelled".to_owned()
                };
                error!(%kind, %message, "step aborted");
                Err(StepError::new(kind, ForgeError::Internal(message)))
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("step panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("step panicked: {s}")
    } else {
        "step panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Workspace;
    use crate::steps::StepImpl;
    use forge_core::error::Result;

    struct Panicking;

    impl StepImpl for Panicking {
        fn kind(&self) -> StepKind {
            StepKind::CropImage
        }

        fn validate(&self, _config: &StepConfig) -> Result<()> {
            Ok(())
        }

        fn transform(&self, _: &Artifact, _: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
            ctx.reserve_output("half", "_written", "bin")?;
            panic!("decoder blew up");
        }
    }

    fn executor(ws: &Workspace, registry: StepRegistry) -> StepExecutor {
        StepExecutor::new(
            Arc::new(registry),
            Arc::clone(&ws.store),
            Arc::clone(&ws.config),
        )
    }

    #[tokio::test]
    async fn panics_become_step_errors() {
        let ws = Workspace::new();
        let mut registry = StepRegistry::with_defaults(&ws.config);
        registry.register(Arc::new(Panicking));
        let exec = executor(&ws, registry);
        let input = ws.input("a.png", b"x");

        let err = exec
            .run(StepKind::CropImage, StepConfig::new(), input)
            .await
            .unwrap_err();

        assert_eq!(err.kind, StepKind::CropImage);
        assert!(matches!(&err.source, ForgeError::Internal(m) if m.contains("decoder blew up")));
        assert_eq!(ws.output_count(), 0, "partial output is removed");
        assert_eq!(exec.available_workers(), ws.config.max_workers);
    }

    #[tokio::test]
    async fn step_failures_keep_their_cause() {
        let ws = Workspace::new();
        let exec = executor(&ws, StepRegistry::with_defaults(&ws.config));
        let input = ws.input("notes.txt", b"plain text");

        let err = exec
            .run(StepKind::ReflowStandard, StepConfig::new(), input)
            .await
            .unwrap_err();
        assert!(matches!(err.source, ForgeError::UnsupportedFormat(_)));
    }

    #[test]
    fn validation_is_scoped_to_the_kind() {
        let ws = Workspace::new();
        let exec = executor(&ws, StepRegistry::with_defaults(&ws.config));
        let err = exec
            .validate(StepKind::Decrypt, &StepConfig::new())
            .unwrap_err();
        assert_eq!(err.kind, StepKind::Decrypt);
        assert!(matches!(err.source, ForgeError::Validation(_)));
    }
}
