// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test fixtures shared by the pipeline's unit tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ::image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use forge_core::config::ForgeConfig;
use forge_core::types::Artifact;
use forge_document::pdf::PdfWriter;
use lopdf::{Document, EncryptionState, EncryptionVersion, Object, Permissions, StringFormat};
use tempfile::TempDir;

use crate::orchestrator::Orchestrator;
use crate::steps::{StepContext, StepRegistry};
use crate::store::ArtifactStore;

/// A throwaway data directory with a store and config rooted in it.
pub(crate) struct Workspace {
    dir: TempDir,
    pub(crate) store: Arc<ArtifactStore>,
    pub(crate) config: Arc<ForgeConfig>,
}

impl Workspace {
    pub(crate) fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub(crate) fn with_config(tweak: impl FnOnce(&mut ForgeConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ForgeConfig::with_data_dir(dir.path());
        tweak(&mut config);
        let store = Arc::new(ArtifactStore::open(dir.path()).unwrap());
        Self {
            dir,
            store,
            config: Arc::new(config),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn input(&self, name: &str, bytes: &[u8]) -> Artifact {
        self.store.ingest(name, bytes).unwrap()
    }

    pub(crate) fn context(&self) -> StepContext {
        StepContext::new(Arc::clone(&self.store), Arc::clone(&self.config))
    }

    /// Orchestrator over this workspace with the default steps.
    pub(crate) fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(StepRegistry::with_defaults(&self.config))
    }

    pub(crate) fn orchestrator_with(&self, registry: StepRegistry) -> Orchestrator {
        Orchestrator::from_parts(
            (*self.config).clone(),
            Arc::clone(&self.store),
            Arc::new(registry),
        )
    }

    pub(crate) fn output_count(&self) -> usize {
        count(self.store.outputs_dir())
    }

    pub(crate) fn upload_count(&self) -> usize {
        count(self.store.uploads_dir())
    }

    pub(crate) fn scratch_count(&self) -> usize {
        count(self.store.scratch_dir())
    }
}

fn count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// A PDF with one text page per entry in `pages`.
pub(crate) fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let mut writer = PdfWriter::new();
    for page in pages {
        writer.add_text_page(page.lines());
    }
    writer.to_bytes().unwrap()
}

/// [`text_pdf`] encrypted with RC4-128 under the standard security handler.
pub(crate) fn protected_pdf(pages: &[&str], user_password: &str) -> Vec<u8> {
    let mut doc = Document::load_mem(&text_pdf(pages)).unwrap();
    // Key derivation needs a file identifier.
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(vec![3u8; 16], StringFormat::Literal),
            Object::String(vec![5u8; 16], StringFormat::Literal),
        ]),
    );
    let version = EncryptionVersion::V2 {
        document: &doc,
        owner_password: "owner",
        user_password,
        key_length: 128,
        permissions: Permissions::all(),
    };
    let state = EncryptionState::try_from(version).unwrap();
    doc.encrypt(&state).unwrap();

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn png_bytes(image: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Flat mid-grey PNG.
pub(crate) fn solid_png(width: u32, height: u32) -> Vec<u8> {
    png_bytes(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
}

/// PNG of deterministic pseudo-random noise; compresses badly in any format.
pub(crate) fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    });
    png_bytes(image)
}
