//! QR rendering with `qrcode` and scanning with `rqrr`

use super::{EngineError, QrDecoder, QrEncoder, load_image, stretch_contrast};
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage, imageops};
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;

/// Colors and optional center logo of a rendered code
#[derive(Debug, Clone, PartialEq)]
pub struct QrStyle {
    pub foreground: Rgba<u8>,
    pub background: Rgba<u8>,
    /// Encoded image placed over the center of the code
    pub logo: Option<Vec<u8>>,
}

impl Default for QrStyle {
    fn default() -> Self {
        QrStyle {
            foreground: Rgba([0, 0, 0, 255]),
            background: Rgba([255, 255, 255, 255]),
            logo: None,
        }
    }
}

/// Parse `#RGB`, `#RRGGBB`, `#RRGGBBAA` or a basic CSS color name
pub fn parse_color(value: &str) -> Result<Rgba<u8>, EngineError> {
    let value = value.trim();
    let invalid = || EngineError::InvalidInput(format!("invalid color: {value:?}"));

    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        return match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16).ok_or_else(invalid)? as u8;
                    rgb[i] = v * 17;
                }
                Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
            }
            6 => Ok(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            8 => Ok(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            ])),
            _ => Err(invalid()),
        };
    }

    let rgb = match value.to_ascii_lowercase().as_str() {
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "purple" => [128, 0, 128],
        "navy" => [0, 0, 128],
        "gray" | "grey" => [128, 128, 128],
        _ => return Err(invalid()),
    };
    Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

/// Renders codes at the lowest error correction level that fits
#[derive(Debug, Clone, Copy)]
pub struct QrCodeEncoder {
    /// Pixels per module
    pub box_size: u32,
    /// Quiet zone width in modules
    pub border: u32,
}

impl Default for QrCodeEncoder {
    fn default() -> Self {
        QrCodeEncoder {
            box_size: 10,
            border: 4,
        }
    }
}

impl QrCodeEncoder {
    fn build(&self, payload: &[u8]) -> Result<QrCode, EngineError> {
        let mut last = QrError::DataTooLong;
        for level in [EcLevel::L, EcLevel::M] {
            match QrCode::with_error_correction_level(payload, level) {
                Ok(code) => return Ok(code),
                Err(e) => last = e,
            }
        }
        match last {
            QrError::DataTooLong => Err(EngineError::InvalidInput(
                "text exceeds QR code capacity; shorten it or enable compression".to_string(),
            )),
            other => Err(EngineError::Failed(format!("failed to build QR code: {other}"))),
        }
    }

    fn render(&self, code: &QrCode, style: &QrStyle) -> RgbaImage {
        let modules = code.width() as u32;
        let side = (modules + 2 * self.border) * self.box_size;
        let colors = code.to_colors();

        RgbaImage::from_fn(side, side, |x, y| {
            let mx = (x / self.box_size).checked_sub(self.border);
            let my = (y / self.box_size).checked_sub(self.border);
            match (mx, my) {
                (Some(mx), Some(my)) if mx < modules && my < modules => {
                    match colors[(my * modules + mx) as usize] {
                        Color::Dark => style.foreground,
                        Color::Light => style.background,
                    }
                }
                _ => style.background,
            }
        })
    }
}

fn overlay_logo(canvas: &mut RgbaImage, logo: &[u8]) -> Result<(), EngineError> {
    let logo = load_image(logo)
        .map_err(|e| EngineError::InvalidInput(format!("logo could not be processed: {e}")))?;
    let size = canvas.width().min(canvas.height()) / 4;
    if size == 0 {
        return Ok(());
    }
    let logo = logo
        .resize_exact(size, size, imageops::FilterType::Lanczos3)
        .to_rgba8();
    let x = (canvas.width() - size) / 2;
    let y = (canvas.height() - size) / 2;
    imageops::overlay(canvas, &logo, i64::from(x), i64::from(y));
    Ok(())
}

impl QrEncoder for QrCodeEncoder {
    fn encode(&self, payload: &[u8], style: &QrStyle) -> Result<Vec<u8>, EngineError> {
        let code = self.build(payload)?;
        let mut canvas = self.render(&code, style);

        if let Some(logo) = &style.logo {
            overlay_logo(&mut canvas, logo)?;
        }

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| EngineError::Failed(format!("failed to encode PNG: {e}")))?;
        Ok(png)
    }
}

/// Scans with `rqrr`, retrying once on a contrast-stretched copy
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

fn scan(gray: &GrayImage) -> Result<Option<Vec<u8>>, String> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        gray.width() as usize,
        gray.height() as usize,
        |x, y| gray.get_pixel(x as u32, y as u32)[0],
    );

    let mut last_error = None;
    for grid in prepared.detect_grids() {
        let mut payload = Vec::new();
        match grid.decode_to(&mut payload) {
            Ok(_) => return Ok(Some(payload)),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image: &[u8]) -> Result<Vec<u8>, EngineError> {
        let gray = load_image(image)?.to_luma8();

        let first = scan(&gray);
        if let Ok(Some(payload)) = first {
            return Ok(payload);
        }

        match scan(&stretch_contrast(&gray)) {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => match first {
                Err(e) => Err(EngineError::Failed(format!("QR code could not be read: {e}"))),
                _ => Err(EngineError::Failed("no QR code detected".to_string())),
            },
            Err(e) => Err(EngineError::Failed(format!("QR code could not be read: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(img: RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#000000").unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_color("#fff").unwrap(), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#1A2b3C").unwrap(), Rgba([0x1a, 0x2b, 0x3c, 255]));
        assert_eq!(parse_color("#11223380").unwrap(), Rgba([0x11, 0x22, 0x33, 0x80]));
        assert_eq!(parse_color("Navy").unwrap(), Rgba([0, 0, 128, 255]));
        assert_eq!(parse_color(" grey ").unwrap(), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_parse_color_invalid() {
        for bad in ["", "#", "#12", "#12345", "#gggggg", "#ééé", "chartreuse-ish"] {
            assert!(
                matches!(parse_color(bad), Err(EngineError::InvalidInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_render_dimensions() {
        let encoder = QrCodeEncoder::default();
        let code = encoder.build(b"hello").unwrap();
        let img = encoder.render(&code, &QrStyle::default());
        // Version 1 is 21 modules wide, plus a 4 module border on each side
        assert_eq!(img.width(), (21 + 8) * 10);
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        // Top-left finder pattern starts right after the border
        assert_eq!(*img.get_pixel(40, 40), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_encode_then_scan() {
        let encoder = QrCodeEncoder::default();
        let image = encoder
            .encode(b"https://example.com/qr", &QrStyle::default())
            .unwrap();
        assert_eq!(&image[1..4], b"PNG");

        let payload = RqrrDecoder.decode(&image).unwrap();
        assert_eq!(payload, b"https://example.com/qr");
    }

    #[test]
    fn test_codec_payload_survives_scan() {
        let text = "重复的文本 repeated text ".repeat(20);
        let payload = qrgate::codec::compress(&text).unwrap();
        let image = QrCodeEncoder::default()
            .encode(&payload, &QrStyle::default())
            .unwrap();

        let scanned = RqrrDecoder.decode(&image).unwrap();
        let decoded = qrgate::codec::decode_payload(&scanned).unwrap();
        assert_eq!(decoded.text, text);
        assert!(decoded.was_compressed());
    }

    #[test]
    fn test_payload_too_long() {
        let payload = vec![b'x'; 4000];
        let err = QrCodeEncoder::default()
            .encode(&payload, &QrStyle::default())
            .unwrap_err();
        match err {
            EngineError::InvalidInput(msg) => assert!(msg.contains("compression")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_logo_overlay() {
        let logo = png(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
        let style = QrStyle {
            logo: Some(logo),
            ..QrStyle::default()
        };
        let encoder = QrCodeEncoder::default();
        let image = encoder.encode(b"logo", &style).unwrap();

        let decoded = image::load_from_memory(&image).unwrap().to_rgba8();
        let center = decoded.width() / 2;
        assert_eq!(*decoded.get_pixel(center, center), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_bad_logo_is_invalid_input() {
        let style = QrStyle {
            logo: Some(b"not an image".to_vec()),
            ..QrStyle::default()
        };
        assert!(matches!(
            QrCodeEncoder::default().encode(b"x", &style),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_blank_image_has_no_code() {
        let blank = png(RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255])));
        assert_eq!(
            RqrrDecoder.decode(&blank),
            Err(EngineError::Failed("no QR code detected".to_string()))
        );
    }
}
