// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — resize, crop, and re-encode in-memory images using the
// `image` crate.

use std::path::Path;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, ImageFormat, ImageReader};
use forge_core::error::ForgeError;
use forge_core::types::DocumentType;
use tracing::{debug, info, instrument};

/// Largest image a resize may produce. A resize buffer past this would run
/// to gigabytes, and a failed allocation aborts the process.
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Reject output dimensions above [`MAX_OUTPUT_PIXELS`].
pub fn check_output_size(width: u32, height: u32) -> Result<(), ForgeError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_OUTPUT_PIXELS {
        return Err(ForgeError::Validation(format!(
            "output of {width}x{height} pixels exceeds the limit of {MAX_OUTPUT_PIXELS} pixels"
        )));
    }
    Ok(())
}

/// Encodings an image step can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// Parse a step's `format` value.
    pub fn parse(name: &str) -> Result<Self, ForgeError> {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(ForgeError::Validation(format!(
                "unsupported output format `{other}` (expected jpeg, png or webp)"
            ))),
        }
    }

    /// Output format matching a document type, if it is one we can write.
    pub fn from_document_type(doc: DocumentType) -> Option<Self> {
        match doc {
            DocumentType::Jpeg => Some(Self::Jpeg),
            DocumentType::Png => Some(Self::Png),
            DocumentType::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }
}

/// A single decoded image.
///
/// Transformations consume `self` and return a new `ImageProcessor`, so
/// steps chain naturally:
///
/// ```ignore
/// let bytes = ImageProcessor::open("photo.png")?
///     .scale_percent(50)?
///     .crop(0, 0, 100, 100)?
///     .encode(OutputFormat::Jpeg, 85)?;
/// ```
#[derive(Clone)]
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file, sniffing the format from its content.
    ///
    /// Formats the decoder doesn't know (HEIC, for one) fail with
    /// [`ForgeError::UnsupportedFormat`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref();
        let label = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_owned());

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let img = reader.decode().map_err(|err| match err {
            ::image::ImageError::Unsupported(_) => ForgeError::UnsupportedFormat(label.clone()),
            other => ForgeError::ImageError(format!("failed to decode {label} image: {other}")),
        })?;
        info!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ForgeError> {
        let img = ::image::load_from_memory(data).map_err(|err| match err {
            ::image::ImageError::Unsupported(_) => {
                ForgeError::UnsupportedFormat("unrecognised image data".into())
            }
            other => ForgeError::ImageError(format!("failed to decode image: {other}")),
        })?;
        debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Resize to exactly `width` x `height`, ignoring aspect ratio.
    ///
    /// Fails with [`ForgeError::Validation`] past [`MAX_OUTPUT_PIXELS`].
    #[instrument(skip(self))]
    pub fn resize_exact(self, width: u32, height: u32) -> Result<Self, ForgeError> {
        let (width, height) = (width.max(1), height.max(1));
        check_output_size(width, height)?;
        info!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            width,
            height,
            "Resizing image"
        );
        let resized = self
            .image
            .resize_exact(width, height, FilterType::Lanczos3);
        Ok(Self { image: resized })
    }

    /// Scale both dimensions by `percent` / 100, flooring fractional pixels.
    pub fn scale_percent(self, percent: u32) -> Result<Self, ForgeError> {
        let (w, h) = scaled_dimensions(self.width(), self.height(), percent);
        self.resize_exact(w, h)
    }

    /// Resize to the requested dimensions. With only one of them given, the
    /// other follows the source aspect ratio.
    pub fn fit(self, width: Option<u32>, height: Option<u32>) -> Result<Self, ForgeError> {
        let (w, h) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, proportional(self.height(), w, self.width())),
            (None, Some(h)) => (proportional(self.width(), h, self.height()), h),
            (None, None) => {
                return Err(ForgeError::Validation(
                    "resize by dimensions needs a width or a height".into(),
                ));
            }
        };
        if w == 0 || h == 0 {
            return Err(ForgeError::Validation(
                "resize dimensions must be greater than zero".into(),
            ));
        }
        self.resize_exact(w, h)
    }

    /// Crop a rectangle with its top-left corner at (`x`, `y`).
    ///
    /// A rectangle running past the right or bottom edge is clipped to the
    /// image. An origin outside the image, or an empty rectangle, is an error.
    #[instrument(skip(self))]
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, ForgeError> {
        let img_w = self.image.width();
        let img_h = self.image.height();

        if width == 0 || height == 0 || x >= img_w || y >= img_h {
            return Err(ForgeError::ImageError(format!(
                "invalid crop bounds: {width}x{height} at ({x}, {y}) on a {img_w}x{img_h} image"
            )));
        }

        let safe_w = width.min(img_w - x);
        let safe_h = height.min(img_h - y);
        info!(x, y, safe_w, safe_h, "Cropping image");

        Ok(Self {
            image: self.image.crop_imm(x, y, safe_w, safe_h),
        })
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as JPEG with the given quality (1-100). Alpha is dropped.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, ForgeError> {
        encode_jpeg(&self.image, quality)
    }

    /// Encode in `format`. `quality` only affects JPEG.
    pub fn encode(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>, ForgeError> {
        match format {
            OutputFormat::Jpeg => encode_jpeg(&self.image, quality),
            OutputFormat::Png => encode_to_format(&self.image, ImageFormat::Png),
            // The WebP encoder only takes 8-bit RGB(A).
            OutputFormat::WebP => encode_to_format(
                &DynamicImage::ImageRgba8(self.image.to_rgba8()),
                ImageFormat::WebP,
            ),
        }
    }
}

/// `dim * percent / 100`, floored, never below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, percent: u32) -> (u32, u32) {
    let scale = |d: u32| {
        let scaled = (u64::from(d) * u64::from(percent) / 100).clamp(1, u64::from(u32::MAX));
        scaled as u32
    };
    (scale(width), scale(height))
}

/// `other * target / reference`, rounded, never below one pixel.
fn proportional(other: u32, target: u32, reference: u32) -> u32 {
    if reference == 0 {
        return target.max(1);
    }
    let scaled = (f64::from(other) * f64::from(target) / f64::from(reference)).round();
    (scaled as u32).max(1)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ForgeError> {
    let mut buffer = Vec::new();
    let rgb = image.to_rgb8();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|err| ForgeError::ImageError(format!("JPEG encoding failed: {err}")))?;
    Ok(buffer)
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ForgeError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| ForgeError::ImageError(format!("image encoding failed: {err}")))?;
    Ok(buffer)
}
