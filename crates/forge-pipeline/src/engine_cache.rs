// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared engine cache — a lazily built, process-wide handle to one expensive
// engine, passed around explicitly rather than held in a global.
//
// Acquisition is double-checked: a read lock serves the common "already
// built" case; otherwise the construction mutex is taken, the slot is checked
// again, and only then is the factory run. A failed construction leaves the
// slot empty, so the next caller tries again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use forge_core::error::{ForgeError, Result};
use tracing::{info, instrument, warn};

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Lifecycle of a [`SharedEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Lazily constructed shared instance of `T`.
pub struct SharedEngine<T> {
    slot: RwLock<Option<Arc<T>>>,
    construction: Mutex<()>,
    initializing: AtomicBool,
    attempts: AtomicUsize,
    factory: Factory<T>,
}

impl<T: Send + Sync> SharedEngine<T> {
    /// Wrap `factory`; nothing is built until the first [`get`](Self::get).
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            slot: RwLock::new(None),
            construction: Mutex::new(()),
            initializing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            factory: Box::new(factory),
        }
    }

    /// An engine that is already built.
    pub fn ready(engine: T) -> Self {
        let shared = Self::new(|| {
            Err(ForgeError::Internal(
                "pre-built engine has no factory".into(),
            ))
        });
        *shared.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(engine));
        shared
    }

    /// The shared instance, building it if this is the first successful call.
    ///
    /// Blocks while another caller is constructing. Must not be called while
    /// holding any other lock. Construction failures come back as
    /// [`ForgeError::ResourceInit`] and are not remembered.
    #[instrument(skip(self))]
    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(engine) = self.peek() {
            return Ok(engine);
        }

        let _construction = self
            .construction
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Someone may have finished while we waited for the lock.
        if let Some(engine) = self.peek() {
            return Ok(engine);
        }

        self.initializing.store(true, Ordering::Release);
        let _reset = InitializingFlag(&self.initializing);
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        info!(attempt, "constructing shared engine");

        match (self.factory)() {
            Ok(engine) => {
                let engine = Arc::new(engine);
                *self.slot.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&engine));
                info!(attempt, "shared engine ready");
                Ok(engine)
            }
            Err(err) => {
                warn!(attempt, error = %err, "shared engine construction failed");
                Err(match err {
                    init @ ForgeError::ResourceInit(_) => init,
                    other => ForgeError::ResourceInit(other.to_string()),
                })
            }
        }
    }

    /// The instance if it is already built; never constructs.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    pub fn state(&self) -> EngineState {
        if self.peek().is_some() {
            EngineState::Ready
        } else if self.initializing.load(Ordering::Acquire) {
            EngineState::Initializing
        } else {
            EngineState::Uninitialized
        }
    }

    /// Number of times the factory has been invoked.
    pub fn construction_attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

/// Clears the initializing flag however construction ends, panics included.
struct InitializingFlag<'a>(&'a AtomicBool);

impl Drop for InitializingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
