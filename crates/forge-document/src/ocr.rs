// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR for image-only PDF pages, using the pure-Rust `ocrs` engine on `rten`
// models.
//
// Only compiled with the `ocr` feature:
//
// ```toml
// forge-document = { path = "crates/forge-document", features = ["ocr"] }
// ```
//
// The model directory must contain `text-detection.rten` and
// `text-recognition.rten` (the files `ocrs-cli` downloads on first use).

use std::path::{Path, PathBuf};

use ::image::DynamicImage;
use forge_core::error::ForgeError;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Locations of the two model files.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl OcrConfig {
    /// Both models inside `dir`, under their well-known file names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Fail early, without touching `rten`, when a model file is missing.
    pub fn validate(&self) -> Result<(), ForgeError> {
        for (what, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.is_file() {
                return Err(ForgeError::OcrError(format!(
                    "{what} model not found at {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Loaded OCR models. Expensive to build, cheap to call; share one instance.
pub struct OcrEngine {
    engine: OcrsEngine,
}

impl OcrEngine {
    /// Load both models.
    ///
    /// `ocrs` and `rten` are 10-100x slower in debug builds.
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self, ForgeError> {
        config.validate()?;

        info!("Loading OCR detection model");
        let detection_model = Model::load_file(&config.detection_model_path).map_err(|err| {
            ForgeError::OcrError(format!("failed to load detection model: {err}"))
        })?;

        info!("Loading OCR recognition model");
        let recognition_model =
            Model::load_file(&config.recognition_model_path).map_err(|err| {
                ForgeError::OcrError(format!("failed to load recognition model: {err}"))
            })?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| ForgeError::OcrError(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR engine ready");
        Ok(Self { engine })
    }

    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self, ForgeError> {
        Self::new(OcrConfig::from_dir(dir))
    }

    /// Recognise all text in `image`, one line of output per detected line.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn recognize_text(&self, image: &DynamicImage) -> Result<String, ForgeError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            ForgeError::OcrError(format!("failed to create image source ({width}x{height}): {err}"))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| ForgeError::OcrError(format!("OCR preprocessing failed: {err}")))?;
        let text = self
            .engine
            .get_text(&input)
            .map_err(|err| ForgeError::OcrError(format!("OCR text recognition failed: {err}")))?;

        debug!(lines = text.lines().count(), "OCR recognition complete");
        Ok(text)
    }
}
