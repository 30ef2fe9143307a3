//! Text recognition
//!
//! Tesseract is used through `leptess` when the `tesseract` feature is
//! enabled and its language data is installed. Otherwise OCR degrades to
//! [`UnavailableOcr`]: the server still starts and OCR calls fail with a
//! library error.

use super::{EngineError, OcrEngine, load_image, stretch_contrast};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

/// Languages OCR accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrLanguage {
    En,
    ChSim,
    ChTra,
    Ja,
    Ko,
}

impl OcrLanguage {
    pub const ALL: [OcrLanguage; 5] = [
        OcrLanguage::En,
        OcrLanguage::ChSim,
        OcrLanguage::ChTra,
        OcrLanguage::Ja,
        OcrLanguage::Ko,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrLanguage::En => "en",
            OcrLanguage::ChSim => "ch_sim",
            OcrLanguage::ChTra => "ch_tra",
            OcrLanguage::Ja => "ja",
            OcrLanguage::Ko => "ko",
        }
    }

    /// Name of the tesseract traineddata file
    pub fn tesseract_code(&self) -> &'static str {
        match self {
            OcrLanguage::En => "eng",
            OcrLanguage::ChSim => "chi_sim",
            OcrLanguage::ChTra => "chi_tra",
            OcrLanguage::Ja => "jpn",
            OcrLanguage::Ko => "kor",
        }
    }
}

impl fmt::Display for OcrLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrLanguage {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        OcrLanguage::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "unsupported OCR language: {s} (supported: en, ch_sim, ch_tra, ja, ko)"
                ))
            })
    }
}

/// Parse a comma separated language list, dropping duplicates
pub fn parse_languages(list: &str) -> Result<Vec<OcrLanguage>, EngineError> {
    let mut languages = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let lang: OcrLanguage = part.parse()?;
        if !languages.contains(&lang) {
            languages.push(lang);
        }
    }

    if languages.is_empty() {
        return Err(EngineError::InvalidInput(
            "at least one OCR language is required".to_string(),
        ));
    }
    Ok(languages)
}

/// Grayscale and contrast-stretch an image, returned as PNG
pub fn preprocess(image: &[u8]) -> Result<Vec<u8>, EngineError> {
    let gray = stretch_contrast(&load_image(image)?.to_luma8());

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(gray)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| EngineError::Failed(format!("failed to encode image: {e}")))?;
    Ok(png)
}

/// Trim every recognized line and drop the empty ones
pub fn join_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Joined lines, or a failure when nothing was recognized
pub fn finish(raw: &str) -> Result<String, EngineError> {
    let text = join_lines(raw);
    if text.is_empty() {
        return Err(EngineError::Failed("no text detected".to_string()));
    }
    Ok(text)
}

/// Stand-in used when no OCR backend can run
#[derive(Debug, Clone)]
pub struct UnavailableOcr {
    reason: String,
}

impl UnavailableOcr {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableOcr {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableOcr {
    fn recognize(&self, _image: &[u8], _languages: &[OcrLanguage]) -> Result<String, EngineError> {
        Err(EngineError::Unavailable(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Tesseract through `leptess`
///
/// A fresh instance is created per call since the loaded models depend on
/// the requested languages.
#[cfg(feature = "tesseract")]
#[derive(Debug, Clone, Default)]
pub struct TesseractOcr {
    datapath: Option<String>,
}

#[cfg(feature = "tesseract")]
impl TesseractOcr {
    /// Probe that tesseract and its English data can be loaded
    pub fn probe(datapath: Option<String>) -> Result<Self, EngineError> {
        leptess::LepTess::new(datapath.as_deref(), OcrLanguage::En.tesseract_code())
            .map_err(|e| EngineError::Unavailable(format!("tesseract not available: {e}")))?;
        Ok(TesseractOcr { datapath })
    }
}

#[cfg(feature = "tesseract")]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8], languages: &[OcrLanguage]) -> Result<String, EngineError> {
        let prepared = preprocess(image)?;
        let codes = languages
            .iter()
            .map(OcrLanguage::tesseract_code)
            .collect::<Vec<_>>()
            .join("+");

        let mut lt = leptess::LepTess::new(self.datapath.as_deref(), &codes)
            .map_err(|e| EngineError::Unavailable(format!("tesseract could not load {codes}: {e}")))?;
        lt.set_image_from_mem(&prepared)
            .map_err(|e| EngineError::Failed(format!("failed to set image: {e}")))?;
        let raw = lt
            .get_utf8_text()
            .map_err(|e| EngineError::Failed(format!("failed to extract text: {e}")))?;

        finish(&raw)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// The best OCR backend this build can offer
#[cfg(feature = "tesseract")]
pub fn default_engine() -> Arc<dyn OcrEngine> {
    match TesseractOcr::probe(None) {
        Ok(engine) => {
            tracing::info!("Tesseract OCR initialized");
            Arc::new(engine)
        }
        Err(e) => {
            tracing::warn!("{}", e);
            Arc::new(UnavailableOcr::new(e.to_string()))
        }
    }
}

/// The best OCR backend this build can offer
#[cfg(not(feature = "tesseract"))]
pub fn default_engine() -> Arc<dyn OcrEngine> {
    tracing::warn!("OCR disabled: built without the tesseract feature");
    Arc::new(UnavailableOcr::new(
        "OCR is not available: built without the tesseract feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_parse_languages() {
        assert_eq!(
            parse_languages("en,ch_sim").unwrap(),
            vec![OcrLanguage::En, OcrLanguage::ChSim]
        );
        assert_eq!(
            parse_languages(" JA , ko ,ja,").unwrap(),
            vec![OcrLanguage::Ja, OcrLanguage::Ko]
        );
    }

    #[test]
    fn test_parse_languages_rejects() {
        assert!(matches!(
            parse_languages("en,fr"),
            Err(EngineError::InvalidInput(msg)) if msg.contains("fr")
        ));
        assert!(parse_languages("").is_err());
        assert!(parse_languages(" , ").is_err());
    }

    #[test]
    fn test_tesseract_codes() {
        let codes: Vec<_> = OcrLanguage::ALL
            .iter()
            .map(OcrLanguage::tesseract_code)
            .collect();
        assert_eq!(codes, ["eng", "chi_sim", "chi_tra", "jpn", "kor"]);
    }

    #[test]
    fn test_join_lines() {
        assert_eq!(join_lines("  hello \n\n world\t\n"), "hello\nworld");
        assert_eq!(join_lines(" \n \n"), "");
        assert_eq!(
            finish("\n  \n"),
            Err(EngineError::Failed("no text detected".to_string()))
        );
    }

    #[test]
    fn test_preprocess_outputs_grayscale_png() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([100 + x as u8]));
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let out = image::load_from_memory(&preprocess(&png).unwrap())
            .unwrap()
            .to_luma8();
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn test_unavailable_engine() {
        let engine = UnavailableOcr::new("no models");
        assert!(!engine.is_available());
        assert_eq!(
            engine.recognize(b"img", &[OcrLanguage::En]),
            Err(EngineError::Unavailable("no models".to_string()))
        );
    }
}
