// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `decrypt` — write an unencrypted copy of a password-protected document.

use forge_core::error::{ForgeError, Result};
use forge_core::types::{Artifact, StepConfig, StepKind};
use forge_security::unseal_bytes;
use tracing::{info, instrument};

use super::{StepContext, StepImpl};

/// Removes PDF password protection, or the passphrase envelope, from a
/// document.
///
/// Config: `password` (required, non-empty; user or owner password for a
/// PDF). Output `<stem>_unlocked.<ext>`; the logical stem is carried forward
/// so later steps name their output after the original document. A document
/// that isn't encrypted is copied through unchanged.
pub struct DecryptStep;

impl StepImpl for DecryptStep {
    fn kind(&self) -> StepKind {
        StepKind::Decrypt
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        config.require_str(StepKind::Decrypt, "password").map(|_| ())
    }

    #[instrument(skip_all, fields(input = %input.name(), password = "***"))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        let password = config.require_str(StepKind::Decrypt, "password")?;
        let bytes = std::fs::read(input.path())?;
        let plaintext = unseal_bytes(&bytes, Some(password))?;

        let ext = input
            .extension()
            .ok_or_else(|| ForgeError::UnsupportedFormat("file without extension".into()))?;
        let out = ctx.reserve_output(input.stem(), "_unlocked", &ext)?;
        std::fs::write(&out, &plaintext)?;
        ctx.keep(&out);

        info!(bytes = plaintext.len(), "document unlocked");
        Artifact::from_path(out, input.stem())
    }
}
