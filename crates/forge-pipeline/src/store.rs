// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact store — the on-disk home of every file a run touches.
//
// Layout under the data directory:
//
//   uploads/   run inputs, deleted when their run ends
//   outputs/   step outputs, kept until reaped by age
//   scratch/   operation-scoped decrypted copies
//
// Deletion is idempotent everywhere: a file that is already gone is not an
// error, because cleanup, reaping and downloads race.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use forge_core::error::{ForgeError, Result};
use forge_core::types::Artifact;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const UPLOADS_DIR: &str = "uploads";
const OUTPUTS_DIR: &str = "outputs";
const SCRATCH_DIR: &str = "scratch";

/// Collision suffixes tried before giving up on a reservation.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// File storage for inputs, outputs and scratch copies.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    uploads: PathBuf,
    outputs: PathBuf,
    scratch: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) the store rooted at `data_dir`.
    #[instrument(skip_all, fields(root = %data_dir.as_ref().display()))]
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let root = data_dir.as_ref().to_path_buf();
        let store = Self {
            uploads: root.join(UPLOADS_DIR),
            outputs: root.join(OUTPUTS_DIR),
            scratch: root.join(SCRATCH_DIR),
            root,
        };
        for dir in [&store.uploads, &store.outputs, &store.scratch] {
            std::fs::create_dir_all(dir)?;
        }
        info!("artifact store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    // -- Inputs ---------------------------------------------------------------

    /// Store caller-supplied bytes as a run input.
    ///
    /// `name` is untrusted: it is sanitised, and only its stem survives as the
    /// artifact's logical stem. The file itself gets a unique prefix so
    /// concurrent uploads of the same name never collide.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub fn ingest(&self, name: &str, bytes: &[u8]) -> Result<Artifact> {
        let clean = sanitize_file_name(name);
        let path = self
            .uploads
            .join(format!("{}_{}", Uuid::new_v4().simple(), clean));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        if let Err(err) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            self.remove(&path)?;
            return Err(err.into());
        }

        debug!(name = %clean, "input ingested");
        Artifact::from_path(path, logical_stem(&clean))
    }

    /// Copy a local file into the store as a run input.
    pub fn ingest_file(&self, source: &Path) -> Result<Artifact> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = std::fs::read(source)?;
        self.ingest(&name, &bytes)
    }

    // -- Outputs --------------------------------------------------------------

    /// Reserve a fresh output path named `<stem><suffix>.<ext>`.
    ///
    /// The file is created empty so that two steps racing for the same name
    /// can't both get it; on collision `-2`, `-3`, ... is appended to the
    /// base name. The caller owns the reserved file and must either fill it
    /// or remove it.
    pub fn reserve_output(&self, stem: &str, suffix: &str, ext: &str) -> Result<PathBuf> {
        let base = format!("{}{}", sanitize_file_name(stem), suffix);
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                format!("{base}.{ext}")
            } else {
                format!("{base}-{attempt}.{ext}")
            };
            let path = self.outputs.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(path = %path.display(), "output reserved");
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ForgeError::Internal(format!(
            "no free output name for `{base}.{ext}`"
        )))
    }

    /// Outputs are addressed by file name only. Anything that could escape
    /// the outputs directory is rejected.
    pub fn resolve_download(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
            && sanitize_file_name(name) == name;
        if !plain {
            return Err(ForgeError::Validation("invalid artifact name".into()));
        }
        let path = self.outputs.join(name);
        if !path.is_file() {
            return Err(ForgeError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                "artifact not found",
            )));
        }
        Ok(path)
    }

    // -- Deletion -------------------------------------------------------------

    /// Delete a file. Already-missing files are fine.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "file removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete outputs, scratch copies and orphaned uploads older than
    /// `retention`. Returns how many files were removed.
    #[instrument(skip(self))]
    pub fn reap_expired(&self, retention: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for dir in [&self.outputs, &self.scratch, &self.uploads] {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            for entry in entries {
                let entry = entry?;
                let metadata = match entry.metadata() {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => continue,
                    // Raced with another remover.
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(err.into()),
                };
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age < retention {
                    continue;
                }
                match self.remove(&entry.path()) {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(error = %err, "failed to reap expired file"),
                }
            }
        }
        info!(removed, "expired artifacts reaped");
        Ok(removed)
    }
}

/// Make an untrusted file name safe to use as a single path component.
///
/// Directory components (either separator) are dropped, non-printable
/// characters are removed, and names that end up empty or special become
/// `unnamed_file`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let clean: String = base.chars().filter(|c| !c.is_control()).collect();
    let clean = clean.trim();
    if clean.is_empty() || clean == "." || clean == ".." {
        "unnamed_file".to_owned()
    } else {
        clean.to_owned()
    }
}

fn logical_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unnamed_file".to_owned())
}
