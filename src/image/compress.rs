//! JPEG re-encoding toward a target size
//!
//! The compressor decodes whatever format the source bytes are in, then
//! binary-searches JPEG quality until the output lands near half the original
//! size. Quality never drops below the configured floor, so heavily
//! compressible images stay recognizable.

use super::ImageError;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const MAX_ITERATIONS: u32 = 10;
const SIZE_TOLERANCE: f64 = 0.05;

/// Outcome of compressing one image
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub compressed_size: u64,
    pub path: PathBuf,
}

/// Re-encodes images as JPEG at a searched quality level
#[derive(Debug, Clone)]
pub struct Compressor {
    min_quality: f32,
}

impl Compressor {
    pub fn new(min_quality: f32) -> Self {
        Self { min_quality }
    }

    /// Compresses the image toward half its original size and writes it out
    ///
    /// The output file gets a random name under `output_dir`; the caller is
    /// responsible for recording which source URL it came from.
    pub fn compress_and_save(
        &self,
        bytes: &[u8],
        output_dir: &Path,
    ) -> Result<CompressionResult, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("empty image data".to_string()));
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(e.to_string()))?
            .to_rgb8();

        let target_size = bytes.len() / 2;
        let quality = self.find_quality(&decoded, target_size)?;
        let encoded = encode_jpeg(&decoded, quality)?;

        let filename = format!("{}.jpg", Uuid::new_v4());
        let path = output_dir.join(filename);
        std::fs::write(&path, &encoded)?;

        debug!(
            path = %path.display(),
            original = bytes.len(),
            compressed = encoded.len(),
            quality,
            "Compressed image"
        );

        Ok(CompressionResult {
            compressed_size: encoded.len() as u64,
            path,
        })
    }

    /// Binary-searches JPEG quality for an output near the target size
    ///
    /// Stops early when the result is within tolerance of the target, and
    /// gives up after a fixed number of iterations; the search interval
    /// halves each round so that is plenty of precision.
    fn find_quality(&self, img: &RgbImage, target_size: usize) -> Result<f32, ImageError> {
        // Even maximum quality may undershoot the target when the source was
        // a poorly compressed format.
        if encode_jpeg(img, 1.0)?.len() <= target_size {
            return Ok(1.0);
        }
        // And minimum quality may still overshoot for tiny targets.
        if encode_jpeg(img, self.min_quality)?.len() > target_size {
            return Ok(self.min_quality);
        }

        let mut low = self.min_quality;
        let mut high = 1.0_f32;
        let mut quality = (low + high) / 2.0;

        for _ in 0..MAX_ITERATIONS {
            let size = encode_jpeg(img, quality)?.len();
            let ratio = size as f64 / target_size as f64;
            if (ratio - 1.0).abs() <= SIZE_TOLERANCE {
                break;
            }
            if size > target_size {
                high = quality;
            } else {
                low = quality;
            }
            quality = (low + high) / 2.0;
        }

        Ok(quality.clamp(self.min_quality, 1.0))
    }
}

/// Encodes an RGB image as JPEG at the given quality in [0, 1]
fn encode_jpeg(img: &RgbImage, quality: f32) -> Result<Vec<u8>, ImageError> {
    let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, q);
    encoder
        .encode_image(img)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// A noisy image compresses poorly as PNG, giving plenty of headroom for
    /// the JPEG target.
    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(42);
        let img = RgbImage::from_fn(width, height, |_, _| {
            image::Rgb([rng.gen(), rng.gen(), rng.gen()])
        });
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_compress_hits_half_size_within_tolerance() {
        let original = noisy_png(400, 400);
        assert!(original.len() > 200 * 1024);
        let dir = tempfile::tempdir().unwrap();

        let compressor = Compressor::new(0.1);
        let result = compressor.compress_and_save(&original, dir.path()).unwrap();

        assert!(result.compressed_size > 0);
        // Output lands at or below half the input, within the search's 5%
        // tolerance band.
        let target = original.len() as u64 / 2;
        assert!(
            result.compressed_size <= target * 105 / 100,
            "compressed {} exceeds target {} by more than 5%",
            result.compressed_size,
            target
        );
        assert!(result.path.exists());
        assert_eq!(result.path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(
            std::fs::metadata(&result.path).unwrap().len(),
            result.compressed_size
        );
    }

    #[test]
    fn test_empty_input_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::new(0.1);
        assert!(matches!(
            compressor.compress_and_save(&[], dir.path()),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn test_undecodable_input_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::new(0.1);
        assert!(matches!(
            compressor.compress_and_save(b"not an image", dir.path()),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn test_quality_stays_in_bounds() {
        let original = noisy_png(200, 200);
        let decoded = image::load_from_memory(&original).unwrap().to_rgb8();
        let compressor = Compressor::new(0.3);

        let quality = compressor
            .find_quality(&decoded, original.len() / 2)
            .unwrap();
        assert!((0.3..=1.0).contains(&quality));
    }
}
