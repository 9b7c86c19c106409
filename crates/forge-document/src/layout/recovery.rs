// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout recovery engine — paragraph and heading reconstruction over the PDF
// text layer, with OCR for image-only pages when built with the `ocr`
// feature and given a model directory.

use forge_core::config::RecoveryConfig;
use forge_core::error::ForgeError;
use tracing::{debug, info, instrument, warn};

use super::reflow_paragraphs;
use crate::docx::Block;
use crate::pdf::PdfReader;

#[cfg(feature = "ocr")]
use crate::ocr::OcrEngine;

/// Heavy, shareable layout recovery engine.
///
/// Construction loads the OCR models when they're configured, which can take
/// seconds; build one and share it. Recovery itself only reads `self`.
pub struct RecoveryEngine {
    #[cfg(feature = "ocr")]
    ocr: Option<OcrEngine>,
}

impl RecoveryEngine {
    /// Build the engine.
    ///
    /// Without a model directory the engine works from the text layer alone.
    /// A configured directory that doesn't exist, or whose models fail to
    /// load, is a [`ForgeError::ResourceInit`].
    #[instrument(skip_all, fields(model_dir = ?config.model_dir))]
    pub fn new(config: &RecoveryConfig) -> Result<Self, ForgeError> {
        if let Some(dir) = &config.model_dir {
            if !dir.is_dir() {
                return Err(ForgeError::ResourceInit(
                    "layout recovery model directory is missing".into(),
                ));
            }
        }

        #[cfg(feature = "ocr")]
        {
            let ocr = match &config.model_dir {
                Some(dir) => Some(
                    OcrEngine::from_model_dir(dir)
                        .map_err(|err| ForgeError::ResourceInit(err.to_string()))?,
                ),
                None => None,
            };
            info!(ocr = ocr.is_some(), "layout recovery engine ready");
            Ok(Self { ocr })
        }

        #[cfg(not(feature = "ocr"))]
        {
            if config.model_dir.is_some() {
                warn!("built without the `ocr` feature; model directory ignored");
            }
            info!(ocr = false, "layout recovery engine ready");
            Ok(Self {})
        }
    }

    /// Whether image-only pages can be recognised.
    pub fn has_ocr(&self) -> bool {
        #[cfg(feature = "ocr")]
        {
            self.ocr.is_some()
        }
        #[cfg(not(feature = "ocr"))]
        {
            false
        }
    }

    /// Recover the document's flow, page by page.
    #[instrument(skip_all, fields(pages = reader.page_count()))]
    pub fn recover(&self, reader: &PdfReader) -> Result<Vec<Block>, ForgeError> {
        let mut blocks = Vec::new();
        for (index, page) in reader.page_numbers().into_iter().enumerate() {
            if index > 0 {
                blocks.push(Block::PageBreak);
            }
            let mut text = reader.page_text(page)?;
            if text.trim().is_empty() {
                text = self.recognise_page(reader, page)?;
            }
            let page_blocks = reflow_paragraphs(&text);
            debug!(page, blocks = page_blocks.len(), "page recovered");
            blocks.extend(page_blocks);
        }
        Ok(blocks)
    }

    #[cfg(feature = "ocr")]
    fn recognise_page(&self, reader: &PdfReader, page: u32) -> Result<String, ForgeError> {
        let Some(ocr) = &self.ocr else {
            warn!(page, "image-only page skipped; no OCR models configured");
            return Ok(String::new());
        };
        let mut text = String::new();
        for jpeg in reader.page_jpeg_images(page)? {
            let image = ::image::load_from_memory(&jpeg)
                .map_err(|err| ForgeError::ImageError(format!("bad page image: {err}")))?;
            text.push_str(&ocr.recognize_text(&image)?);
            text.push('\n');
        }
        Ok(text)
    }

    #[cfg(not(feature = "ocr"))]
    fn recognise_page(&self, reader: &PdfReader, page: u32) -> Result<String, ForgeError> {
        let images = reader.page_jpeg_images(page)?.len();
        if images > 0 {
            warn!(page, images, "image-only page skipped; OCR not available");
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfWriter;

    #[test]
    fn missing_model_dir_is_resource_init() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecoveryConfig {
            model_dir: Some(dir.path().join("absent")),
        };
        assert!(matches!(
            RecoveryEngine::new(&config),
            Err(ForgeError::ResourceInit(_))
        ));
    }

    #[test]
    fn text_layer_only_engine() {
        let engine = RecoveryEngine::new(&RecoveryConfig::default()).unwrap();
        assert!(!engine.has_ocr());

        let mut writer = PdfWriter::new();
        writer
            .add_text_page(["Hello recovery"])
            .add_text_page(["Second page"]);
        let reader = PdfReader::from_bytes(&writer.to_bytes().unwrap()).unwrap();

        let blocks = engine.recover(&reader).unwrap();
        assert_eq!(blocks.iter().filter(|b| **b == Block::PageBreak).count(), 1);
        assert!(blocks.len() >= 3);
    }

    #[test]
    fn image_only_page_without_ocr_yields_no_text() {
        let engine = RecoveryEngine::new(&RecoveryConfig::default()).unwrap();
        let jpeg = crate::ImageProcessor::from_dynamic(::image::DynamicImage::new_rgb8(8, 8))
            .to_jpeg_bytes(80)
            .unwrap();
        let mut writer = PdfWriter::new();
        writer.add_jpeg_page(jpeg, 8, 8);
        let reader = PdfReader::from_bytes(&writer.to_bytes().unwrap()).unwrap();

        assert!(engine.recover(&reader).unwrap().is_empty());
    }
}
