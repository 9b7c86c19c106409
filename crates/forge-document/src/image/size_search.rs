// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive target-size search — find the largest JPEG quality whose encoding
// fits a byte budget, then shrink dimensions if no quality does.

use forge_core::config::SizeSearchConfig;
use forge_core::error::ForgeError;
use tracing::{debug, info, instrument, warn};

use super::processor::ImageProcessor;

/// Anything that can be encoded at a given quality and size.
pub trait QualityEncoder {
    /// Source dimensions, the starting point of the search.
    fn dimensions(&self) -> (u32, u32);

    /// Encode at `quality`, scaled to `width` x `height`.
    fn encode_at(&self, quality: u8, width: u32, height: u32) -> Result<Vec<u8>, ForgeError>;
}

impl QualityEncoder for ImageProcessor {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn encode_at(&self, quality: u8, width: u32, height: u32) -> Result<Vec<u8>, ForgeError> {
        if (width, height) == (self.width(), self.height()) {
            return self.to_jpeg_bytes(quality);
        }
        self.clone()
            .resize_exact(width, height)?
            .to_jpeg_bytes(quality)
    }
}

/// Result of a size search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// Number of encodings performed.
    pub probes: u32,
    /// False when the minimum dimension was reached without fitting the
    /// budget; `bytes` is then the smallest encoding found.
    pub met_target: bool,
}

/// Quality-then-dimension search over a [`QualityEncoder`].
#[derive(Debug, Clone)]
pub struct SizeSearch {
    config: SizeSearchConfig,
}

impl SizeSearch {
    pub fn new(config: SizeSearchConfig) -> Self {
        Self { config }
    }

    fn scale_factor(&self) -> f64 {
        let factor = f64::from(self.config.scale_factor);
        if factor > 0.0 && factor < 1.0 { factor } else { 0.9 }
    }

    fn quality_bounds(&self) -> (u8, u8) {
        let lo = self.config.quality_min.clamp(1, 100);
        let hi = self.config.quality_max.clamp(lo, 100);
        (lo, hi)
    }

    /// Search for an encoding of at most `max_bytes`.
    ///
    /// Phase one binary-searches quality at full size and keeps the highest
    /// quality that fits. When even the minimum quality is too large, phase
    /// two shrinks both dimensions by the scale factor at minimum quality
    /// until the result fits or the minimum dimension stops any further
    /// shrinking.
    #[instrument(skip(self, source))]
    pub fn search<E: QualityEncoder>(
        &self,
        source: &E,
        max_bytes: u64,
    ) -> Result<SearchOutcome, ForgeError> {
        let (width, height) = source.dimensions();
        let (q_min, q_max) = self.quality_bounds();
        let mut probes = 0u32;

        let (mut lo, mut hi) = (q_min, q_max);
        let mut best: Option<(u8, Vec<u8>)> = None;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let bytes = source.encode_at(mid, width, height)?;
            probes += 1;
            debug!(quality = mid, size = bytes.len(), "quality probe");
            if bytes.len() as u64 <= max_bytes {
                best = Some((mid, bytes));
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
        }

        if let Some((quality, bytes)) = best {
            info!(quality, size = bytes.len(), probes, "target met by quality");
            return Ok(SearchOutcome {
                bytes,
                quality,
                width,
                height,
                probes,
                met_target: true,
            });
        }

        let factor = self.scale_factor();
        let floor = self.config.min_dimension.max(1);
        let (mut w, mut h) = (width, height);
        let mut last = source.encode_at(q_min, w, h)?;
        probes += 1;

        loop {
            let next_w = shrink(w, factor, floor);
            let next_h = shrink(h, factor, floor);
            if (next_w, next_h) == (w, h) {
                warn!(
                    width = w,
                    height = h,
                    size = last.len(),
                    max_bytes,
                    "minimum dimension reached without meeting target"
                );
                return Ok(SearchOutcome {
                    bytes: last,
                    quality: q_min,
                    width: w,
                    height: h,
                    probes,
                    met_target: false,
                });
            }
            w = next_w;
            h = next_h;
            last = source.encode_at(q_min, w, h)?;
            probes += 1;
            debug!(width = w, height = h, size = last.len(), "dimension probe");
            if last.len() as u64 <= max_bytes {
                info!(width = w, height = h, probes, "target met by shrinking");
                return Ok(SearchOutcome {
                    bytes: last,
                    quality: q_min,
                    width: w,
                    height: h,
                    probes,
                    met_target: true,
                });
            }
        }
    }
}

/// One shrink round: `max(floor, cur * factor)`, never growing.
fn shrink(current: u32, factor: f64, floor: u32) -> u32 {
    let scaled = (f64::from(current) * factor).floor() as u32;
    scaled.max(floor).min(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Size grows linearly with quality and pixel count.
    struct Synthetic {
        dims: (u32, u32),
        per_quality: usize,
        calls: RefCell<Vec<(u8, u32, u32)>>,
    }

    impl Synthetic {
        fn new(dims: (u32, u32), per_quality: usize) -> Self {
            Self {
                dims,
                per_quality,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl QualityEncoder for Synthetic {
        fn dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn encode_at(&self, quality: u8, width: u32, height: u32) -> Result<Vec<u8>, ForgeError> {
            self.calls.borrow_mut().push((quality, width, height));
            let area = (width as usize * height as usize).max(1);
            let full = (self.dims.0 as usize * self.dims.1 as usize).max(1);
            let len = usize::from(quality) * self.per_quality * area / full;
            Ok(vec![0u8; len])
        }
    }

    #[test]
    fn picks_highest_quality_that_fits() {
        let source = Synthetic::new((100, 100), 100);
        let outcome = SizeSearch::new(SizeSearchConfig::default())
            .search(&source, 5000)
            .unwrap();
        assert!(outcome.met_target);
        assert_eq!(outcome.quality, 50);
        assert_eq!((outcome.width, outcome.height), (100, 100));
        assert_eq!(outcome.bytes.len(), 5000);
        // Binary search over 30..=95 needs at most 7 probes.
        assert!(outcome.probes <= 7);
    }

    #[test]
    fn generous_target_keeps_max_quality() {
        let source = Synthetic::new((100, 100), 100);
        let outcome = SizeSearch::new(SizeSearchConfig::default())
            .search(&source, 1_000_000)
            .unwrap();
        assert_eq!(outcome.quality, 95);
    }

    #[test]
    fn shrinks_when_quality_alone_is_not_enough() {
        let source = Synthetic::new((100, 100), 100);
        // At q=30 full size is 3000 bytes; 1500 needs roughly half the area.
        let outcome = SizeSearch::new(SizeSearchConfig::default())
            .search(&source, 1500)
            .unwrap();
        assert!(outcome.met_target);
        assert_eq!(outcome.quality, 30);
        assert!(outcome.width < 100 && outcome.height < 100);
        assert!(outcome.bytes.len() <= 1500);
    }

    #[test]
    fn unreachable_target_terminates_at_floor() {
        let source = Synthetic::new((100, 80), 100);
        let outcome = SizeSearch::new(SizeSearchConfig::default())
            .search(&source, 0)
            .unwrap();
        // Area-proportional sizes only reach zero bytes below one pixel.
        assert!(!outcome.met_target || outcome.bytes.is_empty());
        assert!(outcome.width >= 10 && outcome.height >= 10);

        let calls = source.calls.borrow();
        let shrink_calls: Vec<_> = calls.iter().filter(|c| c.0 == 30).collect();
        for pair in shrink_calls.windows(2) {
            assert!(pair[1].1 <= pair[0].1 && pair[1].2 <= pair[0].2);
        }
    }

    #[test]
    fn invalid_scale_factor_falls_back() {
        let config = SizeSearchConfig {
            scale_factor: 1.5,
            ..SizeSearchConfig::default()
        };
        let source = Synthetic::new((50, 50), 100);
        let outcome = SizeSearch::new(config).search(&source, 1).unwrap();
        assert!(outcome.width <= 50);
        assert!(outcome.probes < 200);
    }

    #[test]
    fn shrink_respects_floor() {
        assert_eq!(shrink(100, 0.9, 10), 90);
        assert_eq!(shrink(10, 0.9, 10), 10);
        assert_eq!(shrink(5, 0.9, 10), 5);
    }
}
