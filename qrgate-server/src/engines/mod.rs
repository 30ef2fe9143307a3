//! Image collaborators
//!
//! QR rendering, QR scanning and text recognition sit behind small
//! synchronous traits so the orchestrator can run them on the blocking pool
//! and tests can swap in stubs.
//!
//! - [`QrEncoder`]: payload bytes to a PNG ([`qr::QrCodeEncoder`])
//! - [`QrDecoder`]: an image to payload bytes ([`qr::RqrrDecoder`])
//! - [`OcrEngine`]: an image to text ([`ocr::default_engine`])

pub mod ocr;
pub mod qr;

use std::sync::Arc;
use thiserror::Error;

pub use ocr::{OcrLanguage, UnavailableOcr, parse_languages};
pub use qr::{QrCodeEncoder, QrStyle, RqrrDecoder, parse_color};

#[cfg(feature = "tesseract")]
pub use ocr::TesseractOcr;

/// Failure reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The caller supplied something the collaborator cannot work with
    #[error("{0}")]
    InvalidInput(String),

    /// The collaborator ran and failed
    #[error("{0}")]
    Failed(String),

    /// The collaborator is not installed or configured
    #[error("{0}")]
    Unavailable(String),
}

/// Renders a payload into a QR code image
pub trait QrEncoder: Send + Sync {
    /// Returns PNG bytes
    fn encode(&self, payload: &[u8], style: &QrStyle) -> Result<Vec<u8>, EngineError>;
}

/// Finds and reads one QR code in an image
pub trait QrDecoder: Send + Sync {
    /// Returns the raw payload bytes
    fn decode(&self, image: &[u8]) -> Result<Vec<u8>, EngineError>;
}

/// Extracts printed text from an image
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8], languages: &[OcrLanguage]) -> Result<String, EngineError>;

    fn is_available(&self) -> bool;
}

/// The set of collaborators used by the orchestrator
#[derive(Clone)]
pub struct Engines {
    pub encoder: Arc<dyn QrEncoder>,
    pub decoder: Arc<dyn QrDecoder>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Engines {
    /// Production collaborators; OCR degrades to unavailable when missing
    pub fn detect() -> Self {
        Engines {
            encoder: Arc::new(QrCodeEncoder::default()),
            decoder: Arc::new(RqrrDecoder),
            ocr: ocr::default_engine(),
        }
    }
}

/// Decode any supported image format
pub(crate) fn load_image(bytes: &[u8]) -> Result<image::DynamicImage, EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::InvalidInput("image is empty".to_string()));
    }
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::InvalidInput(format!("failed to read image: {e}")))?
        .decode()
        .map_err(|e| EngineError::InvalidInput(format!("failed to decode image: {e}")))
}

/// Stretch a grayscale image so its darkest pixel is 0 and its lightest 255
pub(crate) fn stretch_contrast(gray: &image::GrayImage) -> image::GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return gray.clone();
    }

    let range = f32::from(max - min);
    image::GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        image::Luma([(f32::from(v - min) / range * 255.0).round() as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_load_image_rejects_garbage() {
        assert!(matches!(
            load_image(b""),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            load_image(b"definitely not an image"),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stretch_contrast() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 10]));
        let stretched = stretch_contrast(&gray);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_stretch_contrast_flat_image() {
        let gray = GrayImage::from_pixel(3, 3, Luma([42]));
        assert_eq!(stretch_contrast(&gray), gray);
    }
}
