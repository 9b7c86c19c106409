// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for File Forge.

use thiserror::Error;

use crate::types::StepKind;

/// Top-level error type for all File Forge operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    // -- Request errors (detected before a run starts) --
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown step type: {0}")]
    UnknownStep(String),

    // -- Credential errors --
    #[error("document is encrypted and no password was supplied")]
    CredentialRequired,

    #[error("the supplied password was rejected")]
    CredentialInvalid,

    // -- Step errors --
    #[error("{kind} step failed: {message}")]
    Step { kind: StepKind, message: String },

    #[error("shared engine initialisation failed: {0}")]
    ResourceInit(String),

    #[error("run timed out after {0}s")]
    Timeout(u64),

    // -- Document errors --
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("DOCX generation failed: {0}")]
    DocxError(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    // -- Security errors --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// A step failure as seen by the orchestrator: which kind failed, and why.
#[derive(Debug, Error)]
#[error("{kind} step failed: {source}")]
pub struct StepError {
    pub kind: StepKind,
    #[source]
    pub source: ForgeError,
}

impl StepError {
    pub fn new(kind: StepKind, source: ForgeError) -> Self {
        Self { kind, source }
    }
}

impl From<StepError> for ForgeError {
    fn from(err: StepError) -> Self {
        match err.source {
            // Already step-scoped; don't wrap twice.
            step @ ForgeError::Step { .. } => step,
            other => ForgeError::Step {
                kind: err.kind,
                message: other.to_string(),
            },
        }
    }
}
