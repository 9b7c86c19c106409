// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — resize, crop, transcode, and size-constrained encoding.

pub mod processor;
pub mod size_search;

pub use processor::{ImageProcessor, OutputFormat};
pub use size_search::{QualityEncoder, SearchOutcome, SizeSearch};
