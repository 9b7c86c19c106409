// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// forge-document — Document processing for File Forge.
//
// Provides image operations (resize, crop, transcode), the adaptive size
// search that drives an encoding under a byte ceiling, PDF text-layer
// reading, DOCX writing, and layout recovery for PDF-to-Word reflow.

pub mod docx;
pub mod image;
pub mod layout;
pub mod pdf;

#[cfg(feature = "ocr")]
pub mod ocr;

// Re-export the primary structs so callers can use `forge_document::PdfReader` etc.
pub use crate::docx::{Block, DocxWriter};
pub use crate::image::processor::ImageProcessor;
pub use crate::image::size_search::{QualityEncoder, SearchOutcome, SizeSearch};
pub use crate::layout::recovery::RecoveryEngine;
pub use crate::pdf::reader::PdfReader;

#[cfg(feature = "ocr")]
pub use crate::ocr::OcrEngine;
