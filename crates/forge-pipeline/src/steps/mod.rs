// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Step implementations and the registry the executor dispatches through.

pub mod decrypt;
pub mod image;
pub mod reflow;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use forge_core::config::ForgeConfig;
use forge_core::error::Result;
use forge_core::types::{Artifact, StepConfig, StepKind};
use forge_document::RecoveryEngine;
use tracing::{debug, warn};

use crate::engine_cache::SharedEngine;
use crate::store::ArtifactStore;

pub use decrypt::DecryptStep;
pub use image::{CropStep, ResizeStep, TranscodeStep};
pub use reflow::{RecoveryReflowStep, StandardReflowStep};

/// One transformation kind.
///
/// `transform` runs on a blocking worker thread. It reads `input`, writes
/// exactly one new file reserved through the [`StepContext`], and returns
/// it. It never modifies `input`.
pub trait StepImpl: Send + Sync {
    fn kind(&self) -> StepKind;

    /// Check the configuration before any run starts.
    fn validate(&self, config: &StepConfig) -> Result<()>;

    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext)
    -> Result<Artifact>;
}

/// What a step may touch while it runs.
///
/// Every output path reserved through the context is removed when the
/// context is dropped, except the one passed to [`keep`](Self::keep). A
/// failing or panicking step therefore never leaves a partial file behind.
pub struct StepContext {
    store: Arc<ArtifactStore>,
    config: Arc<ForgeConfig>,
    reserved: Mutex<Vec<PathBuf>>,
    kept: Mutex<Option<PathBuf>>,
}

impl StepContext {
    pub fn new(store: Arc<ArtifactStore>, config: Arc<ForgeConfig>) -> Self {
        Self {
            store,
            config,
            reserved: Mutex::new(Vec::new()),
            kept: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn scratch_dir(&self) -> &Path {
        self.store.scratch_dir()
    }

    /// Reserve `<stem><suffix>.<ext>` in the outputs directory.
    pub fn reserve_output(&self, stem: &str, suffix: &str, ext: &str) -> Result<PathBuf> {
        let path = self.store.reserve_output(stem, suffix, ext)?;
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());
        Ok(path)
    }

    /// Mark `path` as the step's result so it survives the context.
    pub fn keep(&self, path: &Path) {
        *self.kept.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
    }
}

impl Drop for StepContext {
    fn drop(&mut self) {
        let kept = self
            .kept
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let reserved = std::mem::take(
            self.reserved
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for path in reserved {
            if kept.as_deref() == Some(path.as_path()) {
                continue;
            }
            match self.store.remove(&path) {
                Ok(()) => debug!(path = %path.display(), "unused output removed"),
                Err(err) => warn!(error = %err, "failed to remove unused output"),
            }
        }
    }
}

/// Kind-to-implementation table.
pub struct StepRegistry {
    steps: HashMap<StepKind, Arc<dyn StepImpl>>,
    recovery: Arc<SharedEngine<RecoveryEngine>>,
}

impl StepRegistry {
    /// All built-in steps, with a recovery engine that is built from
    /// `config.recovery` on first use.
    pub fn with_defaults(config: &ForgeConfig) -> Self {
        let recovery_config = config.recovery.clone();
        let engine = Arc::new(SharedEngine::new(move || {
            RecoveryEngine::new(&recovery_config)
        }));
        Self::with_engine(engine)
    }

    /// All built-in steps sharing an existing recovery engine handle.
    pub fn with_engine(recovery: Arc<SharedEngine<RecoveryEngine>>) -> Self {
        let mut registry = Self {
            steps: HashMap::new(),
            recovery: Arc::clone(&recovery),
        };
        registry.register(Arc::new(DecryptStep));
        registry.register(Arc::new(StandardReflowStep));
        registry.register(Arc::new(RecoveryReflowStep::new(recovery)));
        registry.register(Arc::new(TranscodeStep));
        registry.register(Arc::new(ResizeStep));
        registry.register(Arc::new(CropStep));
        registry
    }

    /// Install `step`, replacing any implementation of the same kind.
    pub fn register(&mut self, step: Arc<dyn StepImpl>) {
        self.steps.insert(step.kind(), step);
    }

    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepImpl>> {
        self.steps.get(&kind).cloned()
    }

    pub fn recovery_engine(&self) -> &Arc<SharedEngine<RecoveryEngine>> {
        &self.recovery
    }

    /// Build the recovery engine now instead of on first use.
    pub fn warm_up(&self) -> Result<()> {
        self.recovery.get().map(|_| ())
    }
}

/// JPEG quality from `quality`, falling back to the configured default.
pub(crate) fn quality_setting(config: &StepConfig, default: u8) -> Result<u8> {
    match config.u32("quality")? {
        None => Ok(default),
        Some(q @ 1..=100) => Ok(q as u8),
        Some(_) => Err(forge_core::ForgeError::Validation(
            "config key `quality` must be between 1 and 100".into(),
        )),
    }
}
