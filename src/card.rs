use base64::Engine;

use crate::error::SportCardError;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Raster format of a stamp image, decided by the leading bytes alone.
/// Declared MIME types and file extensions are not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn detect(bytes: &[u8]) -> Option<ImageKind> {
        if bytes.starts_with(&JPEG_MAGIC) {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(&PNG_MAGIC) {
            Some(ImageKind::Png)
        } else {
            None
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// An uploaded stamp image: clinic stamp or per-examination stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StampImage {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl StampImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<StampImage, SportCardError> {
        match ImageKind::detect(&bytes) {
            Some(kind) => Ok(StampImage { bytes, kind }),
            None => Err(SportCardError::InvalidImage(
                "unrecognized image data, expected JPEG or PNG".to_string(),
            )),
        }
    }

    /// Accepts the `data:<mime>;base64,<payload>` form produced by browser
    /// file readers. The mime portion is ignored in favor of magic bytes.
    pub fn from_data_uri(uri: &str) -> Result<StampImage, SportCardError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| SportCardError::InvalidImage("not a data URI".to_string()))?;
        let (_mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| SportCardError::InvalidImage("data URI is not base64".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| SportCardError::InvalidImage(format!("base64 decode: {}", err)))?;
        StampImage::from_bytes(bytes)
    }

    pub fn to_data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.kind.mime(), payload)
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Person and clinic identification for one card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonRecord {
    pub surname: String,
    pub given_names: String,
    pub birth_date: String,
    /// PESEL number, carried verbatim.
    pub national_id: String,
    pub organization: String,
    pub registration_number: String,
    /// Free-form clinic identification placed under the stamp area.
    pub clinic_stamp_text: String,
    /// REGON number, carried verbatim.
    pub clinic_registry_number: String,
    pub clinic_stamp_image: Option<StampImage>,
    pub instructor_notes: Option<String>,
    pub instructor_recommendations: Option<String>,
}

/// One row of the examination table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExaminationRecord {
    pub date: String,
    pub height: String,
    pub weight: String,
    pub result: String,
    pub stamp_text: Option<String>,
    pub stamp_image: Option<StampImage>,
    pub next_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub person: PersonRecord,
    pub examinations: Vec<ExaminationRecord>,
}

impl Card {
    /// A fresh card starts with one empty examination row, matching the
    /// blank printed form.
    pub fn new() -> Card {
        Card {
            person: PersonRecord::default(),
            examinations: vec![ExaminationRecord::default()],
        }
    }
}

impl Default for Card {
    fn default() -> Self {
        Card::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_fixture() -> Vec<u8> {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png fixture");
        bytes
    }

    fn jpeg_fixture() -> Vec<u8> {
        let mut bytes = Vec::new();
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .expect("encode jpeg fixture");
        bytes
    }

    #[test]
    fn detect_uses_magic_bytes() {
        assert_eq!(ImageKind::detect(&png_fixture()), Some(ImageKind::Png));
        assert_eq!(ImageKind::detect(&jpeg_fixture()), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::detect(b"GIF89a"), None);
        assert_eq!(ImageKind::detect(&[]), None);
    }

    #[test]
    fn from_bytes_rejects_unknown_formats() {
        let err = StampImage::from_bytes(b"not an image".to_vec()).unwrap_err();
        assert!(err.to_string().contains("invalid image"));
    }

    #[test]
    fn data_uri_round_trip_keeps_bytes_and_kind() {
        let original = StampImage::from_bytes(jpeg_fixture()).expect("jpeg stamp");
        let uri = original.to_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        let parsed = StampImage::from_data_uri(&uri).expect("parse data uri");
        assert_eq!(parsed, original);
    }

    #[test]
    fn data_uri_mime_is_ignored_in_favor_of_magic() {
        // A PNG payload mislabeled as JPEG still classifies as PNG.
        let png = png_fixture();
        let payload = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(&png)
        };
        let uri = format!("data:image/jpeg;base64,{}", payload);
        let parsed = StampImage::from_data_uri(&uri).expect("parse data uri");
        assert_eq!(parsed.kind(), ImageKind::Png);
    }

    #[test]
    fn malformed_data_uris_are_errors() {
        assert!(StampImage::from_data_uri("image/png;base64,AAAA").is_err());
        assert!(StampImage::from_data_uri("data:image/png;base64,!!!").is_err());
        assert!(StampImage::from_data_uri("data:image/png,rawbytes").is_err());
    }

    #[test]
    fn new_card_has_one_blank_examination() {
        let card = Card::new();
        assert_eq!(card.examinations.len(), 1);
        assert_eq!(card.examinations[0], ExaminationRecord::default());
    }
}
