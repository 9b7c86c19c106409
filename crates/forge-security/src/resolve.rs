// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted-input resolution.
//
// An operation that needs to read a possibly-encrypted document asks
// `resolve` for a usable file. Clear documents come back untouched; sealed
// envelopes and password-protected PDFs are decrypted into a scratch copy
// whose lifetime is bound to the returned guard. The scratch copy is never a
// pipeline artifact.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use forge_core::error::{ForgeError, Result};
use forge_core::types::Artifact;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::envelope::{DocumentEnvelope, is_sealed};
use crate::protected_pdf::{is_protected_pdf, unlock_pdf};

/// A readable version of an input, possibly a scratch copy.
///
/// When `needs_cleanup()` is true the file is deleted when the guard is
/// dropped, on every exit path of the operation holding it.
#[derive(Debug)]
pub struct ResolvedInput {
    artifact: Artifact,
    needs_cleanup: bool,
}

impl ResolvedInput {
    /// The usable artifact. Borrowed so it cannot outlive the guard.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }

    /// True when this is a scratch copy owned by the guard.
    pub fn needs_cleanup(&self) -> bool {
        self.needs_cleanup
    }
}

impl Drop for ResolvedInput {
    fn drop(&mut self) {
        if !self.needs_cleanup {
            return;
        }
        match std::fs::remove_file(self.artifact.path()) {
            Ok(()) => debug!("scratch copy removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(error = %err, "failed to remove scratch copy"),
        }
    }
}

/// Whether opening `bytes` needs a credential: an envelope or a
/// password-protected PDF.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    is_sealed(bytes) || is_protected_pdf(bytes)
}

/// Decrypt `bytes` if they are sealed or a password-protected PDF.
///
/// Clear bytes are returned borrowed and the credential is ignored.
/// Encrypted bytes without a credential fail with
/// [`ForgeError::CredentialRequired`].
pub fn unseal_bytes<'a>(bytes: &'a [u8], credential: Option<&str>) -> Result<Cow<'a, [u8]>> {
    let sealed = is_sealed(bytes);
    if !sealed && !is_protected_pdf(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }
    let credential = credential
        .filter(|c| !c.is_empty())
        .ok_or(ForgeError::CredentialRequired)?;
    let plaintext = if sealed {
        DocumentEnvelope::new(credential).open(bytes)?
    } else {
        unlock_pdf(bytes, credential)?
    };
    Ok(Cow::Owned(plaintext))
}

/// Resolve `input` into a file that can be read without a credential.
#[instrument(skip_all, fields(input = %input.name(), credential = credential.is_some()))]
pub fn resolve(
    input: &Artifact,
    credential: Option<&str>,
    scratch_dir: &Path,
) -> Result<ResolvedInput> {
    let bytes = std::fs::read(input.path())?;
    let plaintext = match unseal_bytes(&bytes, credential)? {
        Cow::Borrowed(_) => {
            debug!("input is not encrypted");
            return Ok(ResolvedInput {
                artifact: input.clone(),
                needs_cleanup: false,
            });
        }
        Cow::Owned(plaintext) => plaintext,
    };

    let scratch_path = scratch_path(scratch_dir, input);
    std::fs::create_dir_all(scratch_dir)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&scratch_path)?;
    // Guard first so a failed write still removes the partial copy.
    let mut guard = ResolvedInput {
        artifact: placeholder(&scratch_path, input),
        needs_cleanup: true,
    };
    file.write_all(&plaintext)?;
    file.sync_all()?;
    drop(file);

    guard.artifact = Artifact::from_path(&scratch_path, input.stem())?;
    info!(bytes = plaintext.len(), "input unsealed into scratch copy");
    Ok(guard)
}

fn scratch_path(scratch_dir: &Path, input: &Artifact) -> PathBuf {
    let ext = input.extension().unwrap_or_else(|| "bin".to_owned());
    scratch_dir.join(format!("{}_{}.{}", Uuid::new_v4().simple(), input.stem(), ext))
}

// The scratch file exists (empty) once create_new succeeds, so this cannot
// fail on the metadata read; fall back to the input's shape if it somehow does.
fn placeholder(scratch_path: &Path, input: &Artifact) -> Artifact {
    Artifact::from_path(scratch_path, input.stem()).unwrap_or_else(|_| input.clone())
}
