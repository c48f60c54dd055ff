//! Structural checks over generated card PDFs, built on `lopdf`. Used by
//! render tests and by callers that want to validate output before archiving.

use lopdf::{Document as LoDocument, Object as LoObject};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfEmptyOrNoPages,
    PdfIoError,
}

impl InspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            InspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            InspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
            InspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectError {
    pub code: InspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for InspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for InspectError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPdfReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// Top-level font dictionaries (Type1 and Type0; descendant CID fonts
    /// are not counted separately).
    pub font_count: usize,
    pub image_count: usize,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<CardPdfReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    // Streams referenced as soft masks are alpha channels, not images.
    let mut smask_ids = std::collections::HashSet::new();
    for object in pdf.objects.values() {
        if let LoObject::Stream(stream) = object {
            if let Ok(LoObject::Reference(id)) = stream.dict.get(b"SMask") {
                smask_ids.insert(*id);
            }
        }
    }

    let mut font_count = 0usize;
    let mut image_count = 0usize;
    for (id, object) in &pdf.objects {
        match object {
            LoObject::Dictionary(dict) => {
                let is_font = dict
                    .get(b"Type")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| name == b"Font")
                    .unwrap_or(false);
                let is_top_level = dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| name == b"Type1" || name == b"Type0")
                    .unwrap_or(false);
                if is_font && is_top_level {
                    font_count += 1;
                }
            }
            LoObject::Stream(stream) => {
                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| name == b"Image")
                    .unwrap_or(false);
                if is_image && !smask_ids.contains(id) {
                    image_count += 1;
                }
            }
            _ => {}
        }
    }

    Ok(CardPdfReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        font_count,
        image_count,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<CardPdfReport, InspectError> {
    let data = std::fs::read(path).map_err(|err| InspectError {
        code: InspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

/// Extracts the text of one page (1-based). WinAnsi-encoded text comes back
/// verbatim; Identity-H text relies on the embedded ToUnicode map.
pub fn extract_page_text(bytes: &[u8], page_number: u32) -> Result<String, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;
    pdf.extract_text(&[page_number]).map_err(|err| InspectError {
        code: InspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })
}

pub fn archival_compatibility_issues(report: &CardPdfReport) -> Vec<InspectErrorCode> {
    let mut issues = Vec::new();
    if report.encrypted {
        issues.push(InspectErrorCode::PdfEncryptedUnsupported);
    }
    if report.page_count == 0 {
        issues.push(InspectErrorCode::PdfEmptyOrNoPages);
    }
    issues
}

pub fn require_archival_compatibility(report: &CardPdfReport) -> Result<(), InspectError> {
    for issue in archival_compatibility_issues(report) {
        match issue {
            InspectErrorCode::PdfEncryptedUnsupported => {
                return Err(InspectError {
                    code: InspectErrorCode::PdfEncryptedUnsupported,
                    message: "encrypted pdf output is not supported".to_string(),
                });
            }
            InspectErrorCode::PdfEmptyOrNoPages => {
                return Err(InspectError {
                    code: InspectErrorCode::PdfEmptyOrNoPages,
                    message: "pdf has no pages".to_string(),
                });
            }
            InspectErrorCode::PdfParseFailed | InspectErrorCode::PdfIoError => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream as LoStream, dictionary};
    use std::io::Write;

    fn make_single_page_pdf_bytes(text: &str) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    #[test]
    fn inspect_pdf_bytes_reads_version_pages_and_fonts() {
        let bytes = make_single_page_pdf_bytes("HELLO");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert_eq!(report.font_count, 1);
        assert_eq!(report.image_count, 0);
        assert!(!report.pdf_version.is_empty());
    }

    #[test]
    fn inspect_pdf_bytes_rejects_malformed_data() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid");
        assert_eq!(err.code, InspectErrorCode::PdfParseFailed);
    }

    #[test]
    fn inspect_pdf_path_reports_io_error_for_missing_file() {
        let missing = std::env::temp_dir().join(format!(
            "sportcard_inspect_missing_{}_{}.pdf",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let err = inspect_pdf_path(&missing).expect_err("missing");
        assert_eq!(err.code, InspectErrorCode::PdfIoError);
    }

    #[test]
    fn extract_page_text_returns_page_content() {
        let bytes = make_single_page_pdf_bytes("BADANIE");
        let text = extract_page_text(&bytes, 1).expect("extract");
        assert!(text.contains("BADANIE"));
    }

    #[test]
    fn archival_compatibility_rejects_encrypted() {
        let report = CardPdfReport {
            pdf_version: "1.7".to_string(),
            page_count: 1,
            encrypted: true,
            file_size_bytes: 0,
            font_count: 0,
            image_count: 0,
        };
        let issues = archival_compatibility_issues(&report);
        assert!(issues.contains(&InspectErrorCode::PdfEncryptedUnsupported));

        let err = require_archival_compatibility(&report).expect_err("must fail");
        assert_eq!(err.code, InspectErrorCode::PdfEncryptedUnsupported);
    }

    #[test]
    fn archival_compatibility_rejects_empty_page_count() {
        let report = CardPdfReport {
            pdf_version: "1.7".to_string(),
            page_count: 0,
            encrypted: false,
            file_size_bytes: 0,
            font_count: 0,
            image_count: 0,
        };
        let issues = archival_compatibility_issues(&report);
        assert_eq!(issues, vec![InspectErrorCode::PdfEmptyOrNoPages]);
        let err = require_archival_compatibility(&report).expect_err("must fail");
        assert_eq!(err.code, InspectErrorCode::PdfEmptyOrNoPages);
    }

    #[test]
    fn inspect_pdf_path_matches_bytes_report() {
        let bytes = make_single_page_pdf_bytes("PATH");
        let temp_dir = std::env::temp_dir().join(format!(
            "sportcard_inspect_path_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&temp_dir).expect("mkdir");
        let path = temp_dir.join("one.pdf");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(&bytes).expect("write");

        let from_path = inspect_pdf_path(&path).expect("inspect path");
        let from_bytes = inspect_pdf_bytes(&bytes).expect("inspect bytes");
        assert_eq!(from_path.page_count, from_bytes.page_count);
        assert_eq!(from_path.encrypted, from_bytes.encrypted);
        assert_eq!(from_path.pdf_version, from_bytes.pdf_version);
    }
}
