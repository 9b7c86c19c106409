// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// forge-pipeline — Step-chained conversion runs for File Forge.
//
// An `Orchestrator` takes one input artifact and an ordered list of step
// descriptors, runs each step on a bounded blocking worker pool through the
// `StepExecutor`, and streams ordered progress events over a bounded channel.
// Heavy engines live in a `SharedEngine` built at most once per process;
// every file a run touches lives in the `ArtifactStore`.

pub mod engine_cache;
pub mod executor;
pub mod orchestrator;
pub mod steps;
pub mod store;
pub mod transport;

pub use engine_cache::{EngineState, SharedEngine};
pub use executor::StepExecutor;
pub use orchestrator::{Orchestrator, RunHandle};
pub use steps::{StepContext, StepImpl, StepRegistry};
pub use store::{ArtifactStore, sanitize_file_name};
pub use transport::{Framing, stream_events};

#[cfg(test)]
pub(crate) mod fixtures;
