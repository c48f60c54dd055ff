use crate::canvas::Canvas;
use crate::card::{Card, PersonRecord};
use crate::flowable::{
    BreakBefore, CardBreakRule, Flowable, Pagination, Paragraph, Spacer, TextStyle,
};
use crate::font::FontRegistry;
use crate::types::{Pt, Size};
use std::sync::Arc;

pub const CARD_TITLE_LINE_1: &str = "KARTA";
pub const CARD_TITLE_LINE_2: &str = "ZDROWIA SPORTOWCA";
pub const CLINIC_STAMP_CAPTION: &str = "(pieczątka poradni)";
pub const REGON_LABEL: &str = "Nr. REGON: ";
pub const INSTRUCTOR_NOTES_LABEL: &str = "Uwagi instruktora:";
pub const INSTRUCTOR_RECOMMENDATIONS_LABEL: &str = "Zalecenia instruktora:";

pub const FIELD_LABELS: [&str; 6] = [
    "Imię/Imiona:",
    "Nazwisko:",
    "Data urodzenia:",
    "PESEL:",
    "Numer rejestru:",
    "Organizacja sportowa:",
];

pub const TABLE_HEADERS: [&str; 6] = [
    "Data badania",
    "Wzrost",
    "Waga",
    "Wynik badania",
    "Pieczatka i podpis",
    "Data nastepnego badania",
];

// All template geometry is millimetres on an A4 portrait page.
const TITLE_CENTER_X_MM: f32 = 105.0;
const TITLE_BASELINE_1_MM: f32 = 10.0;
const TITLE_BASELINE_2_MM: f32 = 20.0;
const TITLE_FONT_PT: f32 = 16.0;
const BODY_FONT_PT: f32 = 10.0;
const CAPTION_FONT_PT: f32 = 8.0;

const LEFT_X_MM: f32 = 20.0;
const LEFT_START_MM: f32 = 30.0;
const LEFT_ROW_SPACING_MM: f32 = 14.0;
const RULE_DROP_MM: f32 = 4.0;
const LEFT_RULE_END_MM: f32 = 110.0;
const ORG_MAX_WIDTH_MM: f32 = 150.0;
const ORG_RULE_END_MM: f32 = 180.0;
const ORG_LINE_SPACING_MM: f32 = 6.0;
const ORG_ROW_PAD_MM: f32 = 8.0;
const RULE_WIDTH_MM: f32 = 0.2;

const RIGHT_X_MM: f32 = 140.0;
const RIGHT_START_MM: f32 = 45.0;
const CLINIC_IMAGE_RAISE_MM: f32 = 8.0;
const CLINIC_IMAGE_W_MM: f32 = 50.0;
const CLINIC_IMAGE_H_MM: f32 = 30.0;
const CLINIC_IMAGE_ADVANCE_MM: f32 = 24.0;
const CAPTION_ADVANCE_MM: f32 = 8.0;
const CLINIC_TEXT_WIDTH_MM: f32 = 50.0;
const CLINIC_LINE_SPACING_MM: f32 = 5.0;
const REGON_RULE_END_MM: f32 = 190.0;
const RIGHT_COLUMN_GAP_MM: f32 = 15.0;

const TABLE_X_MM: f32 = 20.0;
const TABLE_COLUMN_WIDTHS_MM: [f32; 6] = [27.0, 18.0, 18.0, 40.0, 45.0, 22.0];
const TABLE_FONT_PT: f32 = 9.0;
const CELL_PADDING_MM: f32 = 4.0;
const GRID_LINE_WIDTH_MM: f32 = 0.3;
const STAMP_CELL_INDEX: usize = 4;
const STAMP_IMAGE_W_MM: f32 = 36.5;
const STAMP_IMAGE_H_MM: f32 = 12.0;
const STAMP_ROW_MIN_H_MM: f32 = 14.0;

const NOTES_X_MM: f32 = 20.0;
const NOTES_RULE_END_MM: f32 = 190.0;
const NOTES_LABEL_BASELINE_MM: f32 = 5.0;
const NOTES_LABEL_HEIGHT_MM: f32 = 7.0;
const NOTES_LINE_SPACING_MM: f32 = 7.0;
const NOTES_LINE_COUNT: usize = 4;
const NOTES_TEXT_RAISE_MM: f32 = 1.5;
const NOTES_BOTTOM_PAD_MM: f32 = 3.0;

const CARD_GAP_MM: f32 = 10.0;
const CARD_BREAK_THRESHOLD_MM: f32 = 260.0;
const CARD_BREAK_PULL_BACK_MM: f32 = 2.0;

fn mm(value: f32) -> Pt {
    Pt::from_mm(value)
}

/// Which optional sections of the card template are rendered. The default
/// matches the shipped card: REGON line on, instructor sections off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateConfig {
    pub regon_line: bool,
    pub instructor_sections: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            regon_line: true,
            instructor_sections: false,
        }
    }
}

/// Greedy word wrap against registry metrics, mirroring how paragraph
/// layout breaks lines. Always yields at least one line.
fn wrap_to_width(
    registry: &FontRegistry,
    font_name: &str,
    font_size: Pt,
    text: &str,
    max_width: Pt,
) -> Vec<String> {
    let mut lines = Vec::new();
    let space_width = registry.measure_text_width(font_name, font_size, " ");
    for segment in text.split('\n') {
        let mut current = String::new();
        let mut current_width = Pt::ZERO;
        for word in segment.split_whitespace() {
            let word_width = registry.measure_text_width(font_name, font_size, word);
            if current.is_empty() {
                if word_width > max_width {
                    lines.push(word.to_string());
                } else {
                    current.push_str(word);
                    current_width = word_width;
                }
            } else {
                let next_width = current_width + space_width + word_width;
                if next_width <= max_width {
                    current.push(' ');
                    current.push_str(word);
                    current_width = next_width;
                } else {
                    lines.push(current);
                    current = String::new();
                    if word_width > max_width {
                        lines.push(word.to_string());
                    } else {
                        current.push_str(word);
                        current_width = word_width;
                    }
                }
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Marker between two cards; carries the threshold rule for the driver and
/// renders nothing itself.
#[derive(Debug, Clone)]
struct CardBreak;

impl Flowable for CardBreak {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: Pt::ZERO,
            height: Pt::ZERO,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn card_break(&self) -> Option<CardBreakRule> {
        Some(CardBreakRule {
            threshold: mm(CARD_BREAK_THRESHOLD_MM),
            pull_back: mm(CARD_BREAK_PULL_BACK_MM),
        })
    }
}

struct HeaderLayout {
    org_lines: Vec<String>,
    clinic_lines: Vec<String>,
    /// Cursor below the last left-column row, relative to the card top.
    left_end: Pt,
    /// REGON baseline, relative to the card top.
    regon_baseline: Pt,
    height: Pt,
}

/// Title, the six ruled field rows, and the clinic column. Drawn as one
/// unsplittable block; the merge rule makes whatever follows start at the
/// taller of the two columns.
#[derive(Clone)]
struct CardHeader {
    person: PersonRecord,
    clinic_image: Option<String>,
    config: TemplateConfig,
    registry: Arc<FontRegistry>,
    font_name: Arc<str>,
}

impl CardHeader {
    fn new(
        person: &PersonRecord,
        config: TemplateConfig,
        registry: Arc<FontRegistry>,
        font_name: Arc<str>,
    ) -> Self {
        let clinic_image = person
            .clinic_stamp_image
            .as_ref()
            .map(|image| image.to_data_uri());
        Self {
            person: person.clone(),
            clinic_image,
            config,
            registry,
            font_name,
        }
    }

    fn field_values(&self) -> [&str; 6] {
        [
            &self.person.given_names,
            &self.person.surname,
            &self.person.birth_date,
            &self.person.national_id,
            &self.person.registration_number,
            &self.person.organization,
        ]
    }

    fn layout(&self) -> HeaderLayout {
        let body_size = Pt::from_f32(BODY_FONT_PT);

        let values = self.field_values();
        let org_text = format!("{} {}", FIELD_LABELS[5], values[5]);
        let org_lines = wrap_to_width(
            &self.registry,
            &self.font_name,
            body_size,
            &org_text,
            mm(ORG_MAX_WIDTH_MM),
        );

        // Five plain rows, then the wrapped organization row.
        let mut left_end = mm(LEFT_START_MM) + mm(LEFT_ROW_SPACING_MM) * 5;
        left_end += mm(ORG_LINE_SPACING_MM) * (org_lines.len() as i32) + mm(ORG_ROW_PAD_MM);

        let mut right = mm(RIGHT_START_MM);
        if self.clinic_image.is_some() {
            right += mm(CLINIC_IMAGE_ADVANCE_MM);
        }
        right += mm(CAPTION_ADVANCE_MM);
        let clinic_lines = wrap_to_width(
            &self.registry,
            &self.font_name,
            body_size,
            &self.person.clinic_stamp_text,
            mm(CLINIC_TEXT_WIDTH_MM),
        );
        right += mm(CLINIC_LINE_SPACING_MM) * (clinic_lines.len() as i32);
        let regon_baseline = right;

        let height = left_end.max(regon_baseline + mm(RIGHT_COLUMN_GAP_MM));
        HeaderLayout {
            org_lines,
            clinic_lines,
            left_end,
            regon_baseline,
            height,
        }
    }

    fn draw_baseline_text(&self, canvas: &mut Canvas, x: Pt, baseline: Pt, size: Pt, text: &str) {
        if text.is_empty() {
            return;
        }
        canvas.draw_string(x, baseline - size, text);
    }
}

impl Flowable for CardHeader {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.layout().height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, _x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        let layout = self.layout();
        let title_size = Pt::from_f32(TITLE_FONT_PT);
        let body_size = Pt::from_f32(BODY_FONT_PT);
        let caption_size = Pt::from_f32(CAPTION_FONT_PT);

        canvas.set_font_name(self.font_name.as_ref());
        canvas.set_line_width(mm(RULE_WIDTH_MM));

        // Title, centered on the page axis.
        canvas.set_font_size(title_size);
        for (line, baseline) in [
            (CARD_TITLE_LINE_1, TITLE_BASELINE_1_MM),
            (CARD_TITLE_LINE_2, TITLE_BASELINE_2_MM),
        ] {
            let width = self
                .registry
                .measure_text_width(&self.font_name, title_size, line);
            let x = mm(TITLE_CENTER_X_MM) - width.mul_ratio(1, 2);
            self.draw_baseline_text(canvas, x, y + mm(baseline), title_size, line);
        }

        // Left column: label/value rows with a rule beneath each.
        canvas.set_font_size(body_size);
        let values = self.field_values();
        let mut baseline = y + mm(LEFT_START_MM);
        for index in 0..5 {
            let text = format!("{} {}", FIELD_LABELS[index], values[index]);
            self.draw_baseline_text(canvas, mm(LEFT_X_MM), baseline, body_size, &text);
            canvas.rule(
                mm(LEFT_X_MM),
                mm(LEFT_RULE_END_MM),
                baseline + mm(RULE_DROP_MM),
            );
            baseline += mm(LEFT_ROW_SPACING_MM);
        }
        // Organization row: wrapped text, rule beneath the last line.
        for (index, line) in layout.org_lines.iter().enumerate() {
            self.draw_baseline_text(
                canvas,
                mm(LEFT_X_MM),
                baseline + mm(ORG_LINE_SPACING_MM) * (index as i32),
                body_size,
                line,
            );
        }
        let org_rule_y = baseline
            + mm(ORG_LINE_SPACING_MM) * ((layout.org_lines.len() - 1) as i32)
            + mm(RULE_DROP_MM);
        canvas.rule(mm(LEFT_X_MM), mm(ORG_RULE_END_MM), org_rule_y);

        // Right column: clinic stamp image, caption, clinic text, REGON.
        let mut right = y + mm(RIGHT_START_MM);
        if let Some(resource) = &self.clinic_image {
            canvas.draw_image(
                mm(RIGHT_X_MM),
                right - mm(CLINIC_IMAGE_RAISE_MM),
                mm(CLINIC_IMAGE_W_MM),
                mm(CLINIC_IMAGE_H_MM),
                resource.clone(),
            );
            right += mm(CLINIC_IMAGE_ADVANCE_MM);
        }
        canvas.set_font_size(caption_size);
        self.draw_baseline_text(
            canvas,
            mm(RIGHT_X_MM),
            right,
            caption_size,
            CLINIC_STAMP_CAPTION,
        );
        right += mm(CAPTION_ADVANCE_MM);
        canvas.set_font_size(body_size);
        for (index, line) in layout.clinic_lines.iter().enumerate() {
            self.draw_baseline_text(
                canvas,
                mm(RIGHT_X_MM),
                right + mm(CLINIC_LINE_SPACING_MM) * (index as i32),
                body_size,
                line,
            );
        }
        if self.config.regon_line {
            let regon_baseline = y + layout.regon_baseline;
            let text = format!("{}{}", REGON_LABEL, self.person.clinic_registry_number);
            self.draw_baseline_text(canvas, mm(RIGHT_X_MM), regon_baseline, body_size, &text);
            canvas.rule(
                mm(RIGHT_X_MM),
                mm(REGON_RULE_END_MM),
                regon_baseline + mm(RULE_DROP_MM),
            );
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination::keep_together()
    }
}

/// Fixed ruled grid with a label, filled with clipped text. The grid is
/// always drawn in full; overflowing text ends in an ellipsis.
#[derive(Clone)]
struct NotesBlock {
    label: &'static str,
    paragraph: Paragraph,
    font_name: Arc<str>,
}

impl NotesBlock {
    fn new(
        label: &'static str,
        text: &str,
        registry: Arc<FontRegistry>,
        font_name: Arc<str>,
    ) -> Self {
        let style = TextStyle::sized(font_name.clone(), Pt::from_f32(BODY_FONT_PT))
            .with_line_height(mm(NOTES_LINE_SPACING_MM));
        let paragraph = Paragraph::new(text)
            .with_style(style)
            .with_max_lines(NOTES_LINE_COUNT)
            .with_font_registry(Some(registry));
        Self {
            label,
            paragraph,
            font_name,
        }
    }

    fn block_height() -> Pt {
        mm(NOTES_LABEL_HEIGHT_MM)
            + mm(NOTES_LINE_SPACING_MM) * (NOTES_LINE_COUNT as i32)
            + mm(NOTES_BOTTOM_PAD_MM)
    }
}

impl Flowable for NotesBlock {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: Self::block_height(),
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, _x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        let body_size = Pt::from_f32(BODY_FONT_PT);
        canvas.set_font_name(self.font_name.as_ref());
        canvas.set_font_size(body_size);
        canvas.draw_string(
            mm(NOTES_X_MM),
            y + mm(NOTES_LABEL_BASELINE_MM) - body_size,
            self.label,
        );

        let grid_top = y + mm(NOTES_LABEL_HEIGHT_MM);
        canvas.set_line_width(mm(RULE_WIDTH_MM));
        for line in 1..=NOTES_LINE_COUNT {
            canvas.rule(
                mm(NOTES_X_MM),
                mm(NOTES_RULE_END_MM),
                grid_top + mm(NOTES_LINE_SPACING_MM) * (line as i32),
            );
        }

        self.paragraph.draw(
            canvas,
            mm(NOTES_X_MM),
            grid_top + mm(NOTES_TEXT_RAISE_MM),
            mm(NOTES_RULE_END_MM - NOTES_X_MM),
            Self::block_height(),
        );
    }

    fn pagination(&self) -> Pagination {
        Pagination::keep_together()
    }
}

#[derive(Clone)]
struct ExamRow {
    cells: [String; 6],
    stamp_image: Option<String>,
}

/// The six-column examination table. Splits at row boundaries and repeats
/// its header after a split.
#[derive(Clone)]
struct ExamTable {
    rows: Vec<ExamRow>,
    registry: Arc<FontRegistry>,
    font_name: Arc<str>,
    pagination: Pagination,
}

impl ExamTable {
    fn new(card: &Card, registry: Arc<FontRegistry>, font_name: Arc<str>) -> Self {
        let rows = card
            .examinations
            .iter()
            .map(|exam| ExamRow {
                cells: [
                    exam.date.clone(),
                    exam.height.clone(),
                    exam.weight.clone(),
                    exam.result.clone(),
                    exam.stamp_text.clone().unwrap_or_default(),
                    exam.next_date.clone(),
                ],
                stamp_image: exam.stamp_image.as_ref().map(|image| image.to_data_uri()),
            })
            .collect();
        Self {
            rows,
            registry,
            font_name,
            pagination: Pagination::default(),
        }
    }

    fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    fn font_size(&self) -> Pt {
        Pt::from_f32(TABLE_FONT_PT)
    }

    fn line_height(&self) -> Pt {
        let size = self.font_size();
        self.registry
            .line_height(&self.font_name, size, size.mul_ratio(6, 5))
    }

    fn cell_lines(&self, text: &str, column: usize) -> Vec<String> {
        let usable = mm(TABLE_COLUMN_WIDTHS_MM[column]) - mm(CELL_PADDING_MM) * 2;
        wrap_to_width(
            &self.registry,
            &self.font_name,
            self.font_size(),
            text,
            usable,
        )
    }

    fn cells_height(&self, cells: &[String; 6]) -> Pt {
        let mut max_lines = 1usize;
        for (column, text) in cells.iter().enumerate() {
            if column == STAMP_CELL_INDEX {
                continue;
            }
            max_lines = max_lines.max(self.cell_lines(text, column).len());
        }
        self.line_height() * (max_lines as i32) + mm(CELL_PADDING_MM) * 2
    }

    fn head_height(&self) -> Pt {
        let mut max_lines = 1usize;
        for (column, text) in TABLE_HEADERS.iter().enumerate() {
            max_lines = max_lines.max(self.cell_lines(text, column).len());
        }
        self.line_height() * (max_lines as i32) + mm(CELL_PADDING_MM) * 2
    }

    fn row_height(&self, row: &ExamRow) -> Pt {
        let mut height = self.cells_height(&row.cells);
        if row.stamp_image.is_some() {
            height = height.max(mm(STAMP_ROW_MIN_H_MM));
        }
        height
    }

    fn column_x(&self, column: usize) -> Pt {
        let mut x = mm(TABLE_X_MM);
        for width in TABLE_COLUMN_WIDTHS_MM.iter().take(column) {
            x += mm(*width);
        }
        x
    }

    fn draw_cell_border(&self, canvas: &mut Canvas, x: Pt, y: Pt, width: Pt, height: Pt) {
        canvas.rule(x, x + width, y);
        canvas.rule(x, x + width, y + height);
        canvas.move_to(x, y);
        canvas.line_to(x, y + height);
        canvas.stroke();
        canvas.move_to(x + width, y);
        canvas.line_to(x + width, y + height);
        canvas.stroke();
    }

    fn draw_cell_text(
        &self,
        canvas: &mut Canvas,
        text: &str,
        column: usize,
        cell_x: Pt,
        cell_y: Pt,
        cell_h: Pt,
    ) {
        if text.is_empty() {
            return;
        }
        let lines = self.cell_lines(text, column);
        let line_height = self.line_height();
        let text_height = line_height * (lines.len() as i32);
        let cell_w = mm(TABLE_COLUMN_WIDTHS_MM[column]);
        let mut line_y = cell_y + (cell_h - text_height).max(Pt::ZERO).mul_ratio(1, 2);
        for line in lines {
            let width = self
                .registry
                .measure_text_width(&self.font_name, self.font_size(), &line);
            let line_x = cell_x + (cell_w - width).max(Pt::ZERO).mul_ratio(1, 2);
            canvas.draw_string(line_x, line_y, line);
            line_y += line_height;
        }
    }

    fn draw_row(
        &self,
        canvas: &mut Canvas,
        cells: &[String; 6],
        stamp_image: Option<&String>,
        y: Pt,
        height: Pt,
    ) {
        for column in 0..TABLE_COLUMN_WIDTHS_MM.len() {
            let cell_x = self.column_x(column);
            let cell_w = mm(TABLE_COLUMN_WIDTHS_MM[column]);
            self.draw_cell_border(canvas, cell_x, y, cell_w, height);
            if column == STAMP_CELL_INDEX {
                if let Some(resource) = stamp_image {
                    let image_x = cell_x + (cell_w - mm(STAMP_IMAGE_W_MM)).mul_ratio(1, 2);
                    let image_y = y + (height - mm(STAMP_IMAGE_H_MM)).mul_ratio(1, 2);
                    canvas.draw_image(
                        image_x,
                        image_y,
                        mm(STAMP_IMAGE_W_MM),
                        mm(STAMP_IMAGE_H_MM),
                        resource.clone(),
                    );
                    continue;
                }
            }
            self.draw_cell_text(canvas, &cells[column], column, cell_x, y, height);
        }
    }
}

impl Flowable for ExamTable {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let mut height = self.head_height();
        for row in &self.rows {
            height += self.row_height(row);
        }
        Size {
            width: avail_width,
            height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let mut used = self.head_height();
        let mut fitting = 0usize;
        for row in &self.rows {
            let row_height = self.row_height(row);
            if used + row_height > avail_height {
                break;
            }
            used += row_height;
            fitting += 1;
        }
        if fitting == 0 || fitting >= self.rows.len() {
            return None;
        }
        let first = ExamTable {
            rows: self.rows[..fitting].to_vec(),
            registry: self.registry.clone(),
            font_name: self.font_name.clone(),
            pagination: Pagination::default(),
        };
        let second = ExamTable {
            rows: self.rows[fitting..].to_vec(),
            registry: self.registry.clone(),
            font_name: self.font_name.clone(),
            pagination: Pagination::default(),
        };
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, _x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        canvas.set_font_name(self.font_name.as_ref());
        canvas.set_font_size(self.font_size());
        canvas.set_line_width(mm(GRID_LINE_WIDTH_MM));

        let head_cells: [String; 6] =
            std::array::from_fn(|index| TABLE_HEADERS[index].to_string());
        let mut cursor = y;
        let head_height = self.head_height();
        self.draw_row(canvas, &head_cells, None, cursor, head_height);
        cursor += head_height;
        for row in &self.rows {
            let height = self.row_height(row);
            self.draw_row(canvas, &row.cells, row.stamp_image.as_ref(), cursor, height);
            cursor += height;
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

/// Builds the flowable story for a card set: header, optional instructor
/// blocks, examination table per card, with threshold breaks between cards.
pub(crate) fn build_story(
    cards: &[Card],
    config: TemplateConfig,
    registry: Arc<FontRegistry>,
    font_name: Arc<str>,
) -> Vec<Box<dyn Flowable>> {
    let mut story: Vec<Box<dyn Flowable>> = Vec::new();
    for (index, card) in cards.iter().enumerate() {
        if index > 0 {
            story.push(Box::new(CardBreak));
            story.push(Box::new(Spacer::new_pt(mm(CARD_GAP_MM))));
        }
        story.push(Box::new(CardHeader::new(
            &card.person,
            config,
            registry.clone(),
            font_name.clone(),
        )));
        if config.instructor_sections {
            story.push(Box::new(NotesBlock::new(
                INSTRUCTOR_NOTES_LABEL,
                card.person.instructor_notes.as_deref().unwrap_or(""),
                registry.clone(),
                font_name.clone(),
            )));
            story.push(Box::new(NotesBlock::new(
                INSTRUCTOR_RECOMMENDATIONS_LABEL,
                card.person
                    .instructor_recommendations
                    .as_deref()
                    .unwrap_or(""),
                registry.clone(),
                font_name.clone(),
            )));
        }
        let mut table = ExamTable::new(card, registry.clone(), font_name.clone());
        if config.instructor_sections {
            table = table.with_pagination(Pagination {
                break_before: BreakBefore::Page,
                ..Pagination::default()
            });
        }
        story.push(Box::new(table));
    }
    story
}
