//! Deterministic PDF generation for Polish athlete health cards ("Karta
//! Zdrowia Sportowca").
//!
//! The crate renders [`Card`] records onto paginated A4 pages through a
//! flowable layout engine: a story of flowables is poured into page frames,
//! split across pages where needed, and serialized into a self-contained
//! PDF with embedded fonts and images.
//!
//! ```no_run
//! use sportcard::{Card, SportCard};
//!
//! let engine = SportCard::builder().build()?;
//! let mut card = Card::new();
//! card.person.surname = "Kowalska".to_string();
//! let bytes = engine.render(&[card])?;
//! # Ok::<(), sportcard::SportCardError>(())
//! ```

mod canvas;
mod card;
mod debug;
mod doc_template;
mod error;
mod flowable;
mod font;
mod frame;
mod inspect;
mod metrics;
mod page_template;
mod pdf;
mod session;
mod template;
mod types;

pub use canvas::{Canvas, Command, Document, Page};
pub use card::{Card, ExaminationRecord, ImageKind, PersonRecord, StampImage};
use debug::DebugLogger;
pub use doc_template::DocTemplate;
pub use error::SportCardError;
pub use flowable::{
    BreakAfter, BreakBefore, BreakInside, CardBreakRule, Flowable, ImageFlowable, Pagination,
    Paragraph, Spacer, TextAlign, TextStyle,
};
use font::FontRegistry;
pub use frame::{AddResult, Frame};
pub use inspect::{
    CardPdfReport, InspectError, InspectErrorCode, archival_compatibility_issues,
    extract_page_text, inspect_pdf_bytes, inspect_pdf_path, require_archival_compatibility,
};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use page_template::{FrameSpec, PageTemplate};
use pdf::PdfOptions;
pub use session::{CardSession, Confirmation, ExamField, PersonField};
pub use template::TemplateConfig;
pub use types::{Color, Pt, Rect, Size};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name the original card form is saved under.
pub const DOWNLOAD_FILE_NAME: &str = "karta-zdrowia-sportowca.pdf";

/// The rendering engine. Configure once through [`SportCard::builder`],
/// then render any number of card sets.
pub struct SportCard {
    page_size: Size,
    template_config: TemplateConfig,
    font_registry: Arc<FontRegistry>,
    body_font: Arc<str>,
    pdf_options: PdfOptions,
    debug: Option<Arc<DebugLogger>>,
}

#[derive(Clone)]
pub struct SportCardBuilder {
    page_size: Size,
    template_config: TemplateConfig,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(String, Vec<u8>)>,
    body_font: Option<String>,
    document_title: Option<String>,
    reuse_xobjects: bool,
    debug_path: Option<PathBuf>,
}

impl SportCard {
    pub fn builder() -> SportCardBuilder {
        SportCardBuilder::new()
    }

    /// Lays the cards out without serializing. Useful for asserting on the
    /// recorded command stream.
    pub fn render_to_document(&self, cards: &[Card]) -> Result<Document, SportCardError> {
        if cards.is_empty() {
            return Err(SportCardError::EmptyCardSet);
        }
        Ok(self.build_document(cards)?.0)
    }

    pub fn render(&self, cards: &[Card]) -> Result<Vec<u8>, SportCardError> {
        if cards.is_empty() {
            return Err(SportCardError::EmptyCardSet);
        }
        let (document, _) = self.build_document(cards)?;
        let bytes = pdf::document_to_pdf_with_metrics(
            &document,
            None,
            Some(self.font_registry.as_ref()),
            &self.pdf_options,
            self.debug.clone(),
        )?;
        self.emit_debug_summary("render");
        Ok(bytes)
    }

    pub fn render_with_metrics(
        &self,
        cards: &[Card],
    ) -> Result<(Vec<u8>, DocumentMetrics), SportCardError> {
        if cards.is_empty() {
            return Err(SportCardError::EmptyCardSet);
        }
        let (document, mut metrics) = self.build_document(cards)?;
        let bytes = pdf::document_to_pdf_with_metrics(
            &document,
            Some(&mut metrics),
            Some(self.font_registry.as_ref()),
            &self.pdf_options,
            self.debug.clone(),
        )?;
        self.emit_debug_summary("render_with_metrics");
        Ok((bytes, metrics))
    }

    pub fn render_to_file(
        &self,
        cards: &[Card],
        path: impl AsRef<Path>,
    ) -> Result<(), SportCardError> {
        let bytes = self.render(cards)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Renders the current state of an editing session.
    pub fn render_session(&self, session: &CardSession) -> Result<Vec<u8>, SportCardError> {
        self.render(session.cards())
    }

    fn build_document(
        &self,
        cards: &[Card],
    ) -> Result<(Document, DocumentMetrics), SportCardError> {
        let template = PageTemplate::new("card", self.page_size).with_frame(Rect {
            x: Pt::ZERO,
            y: Pt::ZERO,
            width: self.page_size.width,
            height: self.page_size.height,
        });
        let mut doc_template = DocTemplate::new(vec![template]);
        if let Some(debug) = &self.debug {
            doc_template = doc_template.with_debug(debug.clone());
        }
        for flowable in template::build_story(
            cards,
            self.template_config,
            self.font_registry.clone(),
            self.body_font.clone(),
        ) {
            doc_template.add_flowable(flowable);
        }
        doc_template.build_with_metrics()
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(debug) = &self.debug {
            debug.emit_summary(context);
            debug.flush();
        }
    }
}

impl SportCardBuilder {
    pub fn new() -> Self {
        Self {
            page_size: Size::a4(),
            template_config: TemplateConfig::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            body_font: None,
            document_title: None,
            reuse_xobjects: true,
            debug_path: None,
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn template_config(mut self, config: TemplateConfig) -> Self {
        self.template_config = config;
        self
    }

    /// Toggles the "Nr. REGON" line under the clinic stamp.
    pub fn regon_line(mut self, enabled: bool) -> Self {
        self.template_config.regon_line = enabled;
        self
    }

    /// Enables the instructor notes and recommendations sections. The
    /// examination table then starts on its own page.
    pub fn instructor_sections(mut self, enabled: bool) -> Self {
        self.template_config.instructor_sections = enabled;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.font_bytes.push((name.into(), data));
        self
    }

    /// Font used for all card text. Must resolve to a registered font, or
    /// to a base-14 name such as "Helvetica".
    pub fn body_font(mut self, name: impl Into<String>) -> Self {
        self.body_font = Some(name.into());
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.document_title = Some(title.into());
        self
    }

    pub fn reuse_xobjects(mut self, enabled: bool) -> Self {
        self.reuse_xobjects = enabled;
        self
    }

    /// Enable structured debug logging to a JSONL file.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<SportCard, SportCardError> {
        if self.page_size.width <= Pt::ZERO || self.page_size.height <= Pt::ZERO {
            return Err(SportCardError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            registry.register_file(file);
        }
        let mut first_registered: Option<String> = None;
        for (name, data) in self.font_bytes {
            let registered = registry.register_bytes(data, Some(&name))?;
            if first_registered.is_none() {
                first_registered = Some(registered);
            }
        }

        let body_font = match self.body_font {
            Some(name) => {
                let is_base14 = name.eq_ignore_ascii_case("helvetica")
                    || name.eq_ignore_ascii_case("times-roman")
                    || name.eq_ignore_ascii_case("courier");
                if !is_base14 && registry.resolve(&name).is_none() {
                    return Err(SportCardError::InvalidConfiguration(format!(
                        "body font {name:?} is not registered"
                    )));
                }
                name
            }
            None => first_registered.unwrap_or_else(|| "Helvetica".to_string()),
        };

        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };

        Ok(SportCard {
            page_size: self.page_size,
            template_config: self.template_config,
            font_registry: Arc::new(registry),
            body_font: Arc::from(body_font),
            pdf_options: PdfOptions {
                reuse_xobjects: self.reuse_xobjects,
                document_title: self.document_title,
            },
            debug,
        })
    }
}

impl Default for SportCardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "sportcard_{}_{}_{}.{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos(),
            ext
        ))
    }

    fn png_stamp() -> StampImage {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([120, 30, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png fixture");
        StampImage::from_bytes(bytes).expect("stamp fixture")
    }

    fn sample_card() -> Card {
        let mut card = Card::new();
        card.person.given_names = "Jan".to_string();
        card.person.surname = "Nowak".to_string();
        card.person.birth_date = "1999-11-02".to_string();
        card.person.national_id = "99110212345".to_string();
        card.person.organization = "KS Cracovia".to_string();
        card.person.registration_number = "R-77".to_string();
        card.person.clinic_stamp_text = "Poradnia Sportowo-Lekarska".to_string();
        card.person.clinic_registry_number = "123456789".to_string();
        card.examinations[0].date = "2026-05-01".to_string();
        card.examinations[0].height = "181 cm".to_string();
        card.examinations[0].weight = "75 kg".to_string();
        card.examinations[0].result = "zdolny".to_string();
        card.examinations[0].next_date = "2026-11-01".to_string();
        card
    }

    #[test]
    fn empty_card_set_is_rejected() {
        let engine = SportCard::builder().build().expect("engine");
        let err = engine.render(&[]).expect_err("must fail");
        assert!(matches!(err, SportCardError::EmptyCardSet));
        assert_eq!(err.to_string(), "no cards provided to render");
    }

    #[test]
    fn renders_a_parseable_single_page_pdf() {
        let engine = SportCard::builder().build().expect("engine");
        let bytes = engine.render(&[sample_card()]).expect("render");

        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
        assert_eq!(report.font_count, 1);
        assert_eq!(report.image_count, 0);
        require_archival_compatibility(&report).expect("compatible");

        let text = extract_page_text(&bytes, 1).expect("text");
        assert!(text.contains("KARTA"));
        assert!(text.contains("Nowak"));
        assert!(text.contains("zdolny"));
    }

    #[test]
    fn clinic_stamp_image_is_embedded_once() {
        let mut card = sample_card();
        card.person.clinic_stamp_image = Some(png_stamp());
        card.examinations[0].stamp_image = Some(png_stamp());
        let engine = SportCard::builder().build().expect("engine");
        let bytes = engine.render(&[card]).expect("render");

        // Both stamps carry identical pixels, so they share one XObject.
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.image_count, 1);
    }

    #[test]
    fn distinct_stamps_become_distinct_xobjects() {
        let mut card = sample_card();
        card.person.clinic_stamp_image = Some(png_stamp());
        let mut jpeg_bytes = Vec::new();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 200]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut jpeg_bytes),
                image::ImageFormat::Jpeg,
            )
            .expect("encode jpeg fixture");
        card.examinations[0].stamp_image =
            Some(StampImage::from_bytes(jpeg_bytes).expect("jpeg stamp"));

        let engine = SportCard::builder().build().expect("engine");
        let bytes = engine.render(&[card]).expect("render");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.image_count, 2);
    }

    #[test]
    fn render_with_metrics_fills_page_entries() {
        let engine = SportCard::builder().build().expect("engine");
        let (bytes, metrics) = engine
            .render_with_metrics(&[sample_card()])
            .expect("render");
        assert_eq!(metrics.pages.len(), 1);
        assert_eq!(metrics.pages[0].page_number, 1);
        assert!(metrics.pages[0].command_count > 0);
        assert!(metrics.pages[0].content_bytes > 0);
        assert_eq!(metrics.total_bytes, bytes.len());
    }

    #[test]
    fn overflowing_card_set_spills_to_a_second_page() {
        let mut first = sample_card();
        for _ in 0..11 {
            first.examinations.push(ExaminationRecord::default());
        }
        let engine = SportCard::builder().build().expect("engine");
        let bytes = engine.render(&[first, sample_card()]).expect("render");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 2);
    }

    #[test]
    fn render_to_file_writes_an_inspectable_pdf() {
        let path = temp_path("render", "pdf");
        let engine = SportCard::builder().build().expect("engine");
        engine
            .render_to_file(&[sample_card()], &path)
            .expect("write");
        let report = inspect_pdf_path(&path).expect("inspect");
        assert_eq!(report.page_count, 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn render_session_uses_the_session_cards() {
        let mut session = CardSession::new();
        session
            .set_person_field(0, PersonField::Surname, "Zawadzka")
            .expect("set field");
        let engine = SportCard::builder().build().expect("engine");
        let bytes = engine.render_session(&session).expect("render");
        let text = extract_page_text(&bytes, 1).expect("text");
        assert!(text.contains("Zawadzka"));
    }

    #[test]
    fn debug_log_records_layout_events_and_summary() {
        let path = temp_path("debug", "log");
        let mut first = sample_card();
        for _ in 0..11 {
            first.examinations.push(ExaminationRecord::default());
        }
        let engine = SportCard::builder()
            .debug_log(&path)
            .build()
            .expect("engine");
        engine.render(&[first, sample_card()]).expect("render");

        let log = std::fs::read_to_string(&path).expect("read log");
        assert!(log.lines().all(|line| line.starts_with('{')));
        assert!(log.contains("layout.page_break"));
        assert!(log.contains("debug.summary"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_body_font_fails_configuration() {
        let result = SportCard::builder().body_font("No Such Font").build();
        assert!(matches!(
            result,
            Err(SportCardError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn instructor_variant_renders_two_pages() {
        let engine = SportCard::builder()
            .instructor_sections(true)
            .build()
            .expect("engine");
        let bytes = engine.render(&[sample_card()]).expect("render");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 2);
    }

    #[test]
    fn download_file_name_matches_the_printed_form() {
        assert_eq!(DOWNLOAD_FILE_NAME, "karta-zdrowia-sportowca.pdf");
    }
}
