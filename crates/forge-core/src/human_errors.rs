// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error details for terminal `error` progress events.
//
// Every technical error is mapped to plain English with a suggestion. Raw
// error text is never copied into the detail because it can carry file-system
// paths; only request-level messages (key names, kind names) pass through.

use crate::error::{ForgeError, StepError};

/// Severity of an error from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Timeout or engine warm-up trouble; re-submitting may work.
    Transient,
    /// The caller must change the request (password, config value).
    ActionRequired,
    /// The input cannot be processed as requested.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the caller should try.
    pub suggestion: String,
    /// Whether re-submitting the same run may succeed. Nothing is retried
    /// automatically.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    /// Single-line detail: message followed by suggestion.
    pub fn detail(&self) -> String {
        format!("{} {}", self.message, self.suggestion)
    }
}

/// Convert a `ForgeError` into a `HumanError`.
pub fn humanize_error(err: &ForgeError) -> HumanError {
    match err {
        ForgeError::Validation(detail) => HumanError {
            message: "The conversion request is not valid.".into(),
            suggestion: format!("Check the step settings and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::UnknownStep(kind) => HumanError {
            message: format!("Unknown step type: {kind}."),
            suggestion: "Use one of decrypt, reflow-standard, reflow-recovery, transcode-image, resize-image, crop-image.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::CredentialRequired => HumanError {
            message: "This document is password protected.".into(),
            suggestion: "Supply the document's password and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::CredentialInvalid => HumanError {
            message: "The password for this document is incorrect.".into(),
            suggestion: "Check the password and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::Step { kind, .. } => HumanError {
            message: format!("The {kind} step could not finish."),
            suggestion: "Try again. If this keeps happening, try a different file.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::ResourceInit(_) => HumanError {
            message: "The layout recovery engine is not available.".into(),
            suggestion: "Try again in a moment, or use the standard conversion instead.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::Timeout(secs) => HumanError {
            message: format!("The conversion timed out after {secs} seconds."),
            suggestion: "Try a smaller file or fewer steps.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::UnsupportedFormat(format) => HumanError {
            message: format!("Unsupported source format: {format}."),
            suggestion: "Convert the file to a supported format (PDF, JPEG, PNG, WebP) first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged. Try opening it on a computer first to check it works.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::ImageError(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged, or the requested settings don't fit it. Check the settings or try a JPEG or PNG.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::DocxError(_) => HumanError {
            message: "The Word document could not be written.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::OcrError(_) => HumanError {
            message: "Text recognition didn't work on this document.".into(),
            suggestion: "Try the standard conversion, or a clearer scan.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::Encryption(_) | ForgeError::Decryption(_) => HumanError {
            message: "The encrypted document could not be read.".into(),
            suggestion: "The file may be damaged or use an unsupported protection scheme.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "A working file went missing.".into(),
                    suggestion: "Upload the file again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the server's storage may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        ForgeError::Serialization(_) | ForgeError::Internal(_) => HumanError {
            message: "An internal error occurred.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

/// Detail line for a failed step: the step label plus the humanised cause.
pub fn step_failure_detail(label: &str, err: &StepError) -> String {
    format!("Step '{label}' failed: {}", humanize_error(&err.source).detail())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepKind;

    #[test]
    fn credential_failures_are_distinct() {
        let required = humanize_error(&ForgeError::CredentialRequired).detail();
        let invalid = humanize_error(&ForgeError::CredentialInvalid).detail();
        let format = humanize_error(&ForgeError::UnsupportedFormat("heic".into())).detail();
        assert_ne!(required, invalid);
        assert_ne!(invalid, format);
        assert!(invalid.contains("incorrect"));
    }

    #[test]
    fn details_never_carry_paths() {
        let err = ForgeError::ImageError("failed to open /srv/forge/uploads/cat.png: eof".into());
        let detail = humanize_error(&err).detail();
        assert!(!detail.contains("/srv"));

        let io = ForgeError::Io(std::io::Error::other("/var/tmp/x denied"));
        assert!(!humanize_error(&io).detail().contains("/var"));
    }

    #[test]
    fn step_detail_names_the_label() {
        let err = StepError::new(StepKind::Decrypt, ForgeError::CredentialInvalid);
        let detail = step_failure_detail("Unlock", &err);
        assert!(detail.starts_with("Step 'Unlock' failed:"));
        assert!(!detail.is_empty());
    }

    #[test]
    fn unsupported_format_is_permanent() {
        let human = humanize_error(&ForgeError::UnsupportedFormat("heic".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }
}
