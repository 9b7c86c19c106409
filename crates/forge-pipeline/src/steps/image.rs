// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image steps — `transcode-image`, `resize-image`, `crop-image`.

use std::path::Path;

use forge_core::error::{ForgeError, Result};
use forge_core::types::{Artifact, StepConfig, StepKind};
use forge_document::SizeSearch;
use forge_document::image::OutputFormat;
use forge_document::image::processor::check_output_size;
use forge_document::ImageProcessor;
use tracing::{info, instrument, warn};

use super::{StepContext, StepImpl, quality_setting};

const MAX_PERCENTAGE: u32 = 1000;
const DEFAULT_PERCENTAGE: u32 = 50;

/// Re-encode an image (HEIC→JPEG in the original workflow).
///
/// Config: `quality` (1-100, default from settings), `format` (`jpeg`
/// default, `png`, `webp`). Output `<stem>.<ext>`.
pub struct TranscodeStep;

/// Scale an image by percentage, to explicit dimensions, or down to a byte
/// budget.
///
/// Config: `mode` = `percentage` (default; `percentage` 1-1000, default 50),
/// `dimensions` (`width` and/or `height`), or `target_size`
/// (`target_size_kb`, always JPEG). Output `<stem>_resized.<ext>`.
pub struct ResizeStep;

/// Cut out a rectangle.
///
/// Config: `width`, `height` (required, > 0), `x`, `y` (default 0). Output
/// `<stem>_cropped.<ext>`.
pub struct CropStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResizeMode {
    Percentage(u32),
    Dimensions(Option<u32>, Option<u32>),
    TargetSize { kilobytes: u32 },
}

impl ResizeMode {
    fn from_config(config: &StepConfig) -> Result<Self> {
        match config.str("mode")?.unwrap_or("percentage") {
            "percentage" => {
                let percent = config.u32("percentage")?.unwrap_or(DEFAULT_PERCENTAGE);
                if !(1..=MAX_PERCENTAGE).contains(&percent) {
                    return Err(ForgeError::Validation(format!(
                        "config key `percentage` must be between 1 and {MAX_PERCENTAGE}"
                    )));
                }
                Ok(Self::Percentage(percent))
            }
            "dimensions" => {
                let width = positive(config, "width")?;
                let height = positive(config, "height")?;
                if width.is_none() && height.is_none() {
                    return Err(ForgeError::Validation(
                        "resize by dimensions needs `width` or `height`".into(),
                    ));
                }
                // A missing side is at least one pixel; the rest is checked
                // against the source once it is decoded.
                check_output_size(width.unwrap_or(1), height.unwrap_or(1))?;
                Ok(Self::Dimensions(width, height))
            }
            "target_size" => {
                let kilobytes = config.require_u32(StepKind::ResizeImage, "target_size_kb")?;
                if kilobytes == 0 {
                    return Err(ForgeError::Validation(
                        "config key `target_size_kb` must be greater than zero".into(),
                    ));
                }
                Ok(Self::TargetSize { kilobytes })
            }
            other => Err(ForgeError::Validation(format!(
                "unknown resize mode `{other}` (expected percentage, dimensions or target_size)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRect {
    fn from_config(config: &StepConfig) -> Result<Self> {
        let width = config.require_u32(StepKind::CropImage, "width")?;
        let height = config.require_u32(StepKind::CropImage, "height")?;
        if width == 0 || height == 0 {
            return Err(ForgeError::Validation(
                "crop `width` and `height` must be greater than zero".into(),
            ));
        }
        Ok(Self {
            x: config.u32("x")?.unwrap_or(0),
            y: config.u32("y")?.unwrap_or(0),
            width,
            height,
        })
    }
}

fn positive(config: &StepConfig, key: &str) -> Result<Option<u32>> {
    match config.u32(key)? {
        Some(0) => Err(ForgeError::Validation(format!(
            "config key `{key}` must be greater than zero"
        ))),
        other => Ok(other),
    }
}

/// Format to re-encode in when the step doesn't ask for one: the source
/// format when we can write it, PNG otherwise (lossless for BMP, GIF, TIFF).
fn natural_format(input: &Artifact) -> OutputFormat {
    input
        .document_type()
        .and_then(OutputFormat::from_document_type)
        .unwrap_or(OutputFormat::Png)
}

fn open_image(input: &Artifact) -> Result<ImageProcessor> {
    ImageProcessor::open(input.path())
}

fn write_output(
    ctx: &StepContext,
    input: &Artifact,
    suffix: &str,
    ext: &str,
    bytes: &[u8],
) -> Result<Artifact> {
    let out = ctx.reserve_output(input.stem(), suffix, ext)?;
    std::fs::write(&out, bytes)?;
    ctx.keep(&out);
    info!(output = %display_name(&out), bytes = bytes.len(), "image written");
    Artifact::from_path(out, input.stem())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl StepImpl for TranscodeStep {
    fn kind(&self) -> StepKind {
        StepKind::TranscodeImage
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        quality_setting(config, 95)?;
        if let Some(format) = config.str("format")? {
            OutputFormat::parse(format)?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(input = %input.name()))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        let quality = quality_setting(config, ctx.config().default_jpeg_quality)?;
        let format = match config.str("format")? {
            Some(name) => OutputFormat::parse(name)?,
            None => OutputFormat::Jpeg,
        };
        let bytes = open_image(input)?.encode(format, quality)?;
        write_output(ctx, input, "", format.extension(), &bytes)
    }
}

impl StepImpl for ResizeStep {
    fn kind(&self) -> StepKind {
        StepKind::ResizeImage
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        ResizeMode::from_config(config)?;
        quality_setting(config, 95).map(|_| ())
    }

    #[instrument(skip_all, fields(input = %input.name()))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        let mode = ResizeMode::from_config(config)?;
        let quality = quality_setting(config, ctx.config().default_jpeg_quality)?;
        let image = open_image(input)?;
        let (src_w, src_h) = (image.width(), image.height());

        match mode {
            ResizeMode::Percentage(percent) => {
                let format = natural_format(input);
                let resized = image.scale_percent(percent)?;
                info!(src_w, src_h, w = resized.width(), h = resized.height(), "resized by percentage");
                let bytes = resized.encode(format, quality)?;
                write_output(ctx, input, "_resized", format.extension(), &bytes)
            }
            ResizeMode::Dimensions(width, height) => {
                let format = natural_format(input);
                let resized = image.fit(width, height)?;
                info!(src_w, src_h, w = resized.width(), h = resized.height(), "resized to dimensions");
                let bytes = resized.encode(format, quality)?;
                write_output(ctx, input, "_resized", format.extension(), &bytes)
            }
            ResizeMode::TargetSize { kilobytes } => {
                let budget = u64::from(kilobytes) * 1024;
                let outcome = SizeSearch::new(ctx.config().search).search(&image, budget)?;
                if !outcome.met_target {
                    warn!(
                        budget,
                        size = outcome.bytes.len(),
                        "target size not reachable; keeping smallest encoding"
                    );
                }
                info!(
                    quality = outcome.quality,
                    w = outcome.width,
                    h = outcome.height,
                    probes = outcome.probes,
                    "resized to target size"
                );
                write_output(
                    ctx,
                    input,
                    "_resized",
                    OutputFormat::Jpeg.extension(),
                    &outcome.bytes,
                )
            }
        }
    }
}

impl StepImpl for CropStep {
    fn kind(&self) -> StepKind {
        StepKind::CropImage
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        CropRect::from_config(config).map(|_| ())
    }

    #[instrument(skip_all, fields(input = %input.name()))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        let rect = CropRect::from_config(config)?;
        let quality = quality_setting(config, ctx.config().default_jpeg_quality)?;
        let format = natural_format(input);
        let cropped = open_image(input)?.crop(rect.x, rect.y, rect.width, rect.height)?;
        let bytes = cropped.encode(format, quality)?;
        write_output(ctx, input, "_cropped", format.extension(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Workspace, noisy_png, solid_png};

    fn dimensions(artifact: &Artifact) -> (u32, u32) {
        let image = ImageProcessor::open(artifact.path()).unwrap();
        (image.width(), image.height())
    }

    #[test]
    fn percentage_resize_halves_dimensions() {
        let ws = Workspace::new();
        let input = ws.input("photo.png", &solid_png(500, 500));
        let config = StepConfig::new()
            .with("mode", "percentage")
            .with("percentage", 50);

        let ctx = ws.context();
        let out = ResizeStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.name(), "photo_resized.png");
        assert_eq!(dimensions(&out), (250, 250));
    }

    #[test]
    fn dimensions_resize_keeps_aspect_with_one_side() {
        let ws = Workspace::new();
        let input = ws.input("wide.png", &solid_png(400, 200));
        let config = StepConfig::new().with("mode", "dimensions").with("width", 100);

        let ctx = ws.context();
        let out = ResizeStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(dimensions(&out), (100, 50));
    }

    #[test]
    fn target_size_resize_fits_budget() {
        let ws = Workspace::new();
        let source = noisy_png(320, 320);
        let input = ws.input("noise.png", &source);
        let kilobytes: u32 = 20;
        let config = StepConfig::new()
            .with("mode", "target_size")
            .with("target_size_kb", kilobytes);

        let ctx = ws.context();
        let out = ResizeStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.extension().as_deref(), Some("jpg"));
        assert!(out.size_bytes() <= u64::from(kilobytes) * 1024 * 12 / 10);
        assert!(out.size_bytes() < input.size_bytes());
    }

    #[test]
    fn crop_clips_to_image_bounds() {
        let ws = Workspace::new();
        let input = ws.input("square.png", &solid_png(100, 100));
        let config = StepConfig::new()
            .with("x", 50)
            .with("y", 50)
            .with("width", 200)
            .with("height", 200);

        let ctx = ws.context();
        let out = CropStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.name(), "square_cropped.png");
        assert_eq!(dimensions(&out), (50, 50));
    }

    #[test]
    fn crop_outside_image_fails_cleanly() {
        let ws = Workspace::new();
        let input = ws.input("square.png", &solid_png(100, 100));
        let config = StepConfig::new()
            .with("x", 150)
            .with("width", 10)
            .with("height", 10);

        let ctx = ws.context();
        let err = CropStep.transform(&input, &config, &ctx).unwrap_err();
        drop(ctx);

        assert!(matches!(err, ForgeError::ImageError(_)));
        assert_eq!(ws.output_count(), 0);
    }

    #[test]
    fn transcode_defaults_to_jpeg() {
        let ws = Workspace::new();
        let input = ws.input("shot.png", &solid_png(20, 10));

        let ctx = ws.context();
        let out = TranscodeStep
            .transform(&input, &StepConfig::new().with("quality", 80), &ctx)
            .unwrap();
        drop(ctx);

        assert_eq!(out.name(), "shot.jpg");
        assert_eq!(dimensions(&out), (20, 10));
    }

    #[test]
    fn heic_is_reported_as_unsupported() {
        let ws = Workspace::new();
        let input = ws.input("IMG_0001.heic", b"\0\0\0\x18ftypheic\0\0\0\0mif1heic");

        let ctx = ws.context();
        let err = TranscodeStep
            .transform(&input, &StepConfig::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedFormat(_)));
    }

    #[test]
    fn huge_dimensions_are_rejected_up_front() {
        let config = StepConfig::new()
            .with("mode", "dimensions")
            .with("width", 100_000)
            .with("height", 100_000);
        assert!(matches!(
            ResizeStep.validate(&config),
            Err(ForgeError::Validation(_))
        ));
    }

    #[test]
    fn oversized_result_fails_without_output() {
        let ws = Workspace::new();
        let ctx = ws.context();

        // One side given: the other follows the aspect ratio to 10^7 pixels.
        let tall = ws.input("tall.png", &solid_png(10, 1000));
        let config = StepConfig::new().with("mode", "dimensions").with("width", 100_000);
        assert!(ResizeStep.validate(&config).is_ok());
        let err = ResizeStep.transform(&tall, &config, &ctx).unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));

        // 1001x1000 at 1000% is just over the limit.
        let big = ws.input("big.png", &solid_png(1001, 1000));
        let config = StepConfig::new().with("percentage", 1000);
        let err = ResizeStep.transform(&big, &config, &ctx).unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));

        drop(ctx);
        assert_eq!(ws.output_count(), 0);
    }

    #[test]
    fn validation_catches_bad_configs() {
        assert!(ResizeStep.validate(&StepConfig::new()).is_ok());
        assert!(
            ResizeStep
                .validate(&StepConfig::new().with("percentage", 0))
                .is_err()
        );
        assert!(
            ResizeStep
                .validate(&StepConfig::new().with("mode", "dimensions"))
                .is_err()
        );
        assert!(
            ResizeStep
                .validate(&StepConfig::new().with("mode", "target_size"))
                .is_err()
        );
        assert!(
            ResizeStep
                .validate(&StepConfig::new().with("mode", "stretch"))
                .is_err()
        );
        assert!(CropStep.validate(&StepConfig::new().with("width", 10)).is_err());
        assert!(
            CropStep
                .validate(&StepConfig::new().with("width", 10).with("height", 0))
                .is_err()
        );
        assert!(
            TranscodeStep
                .validate(&StepConfig::new().with("format", "bmp"))
                .is_err()
        );
    }
}
