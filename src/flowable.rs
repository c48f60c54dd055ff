use crate::canvas::Canvas;
use crate::font::FontRegistry;
use crate::types::{Color, Pt, Size};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakBefore {
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakAfter {
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakInside {
    Auto,
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub break_before: BreakBefore,
    pub break_after: BreakAfter,
    pub break_inside: BreakInside,
    pub orphans: usize,
    pub widows: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            break_before: BreakBefore::Auto,
            break_after: BreakAfter::Auto,
            break_inside: BreakInside::Auto,
            orphans: 2,
            widows: 2,
        }
    }
}

impl Pagination {
    pub fn keep_together() -> Self {
        Self {
            break_inside: BreakInside::Avoid,
            ..Self::default()
        }
    }

    fn resolved_orphans(self) -> usize {
        self.orphans.max(1)
    }

    fn resolved_widows(self) -> usize {
        self.widows.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Page-break rule applied at a card boundary: pull the cursor back by
/// `pull_back`, then start a new page if it still sits past `threshold` and
/// more content follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardBreakRule {
    pub threshold: Pt,
    pub pull_back: Pt,
}

pub trait Flowable: FlowableClone + Send + Sync {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size;
    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)>;
    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt);

    fn pagination(&self) -> Pagination {
        Pagination::default()
    }

    /// Boundary marker between cards. `None` for ordinary content.
    fn card_break(&self) -> Option<CardBreakRule> {
        None
    }

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait FlowableClone {
    fn clone_box(&self) -> Box<dyn Flowable>;
}

impl<T> FlowableClone for T
where
    T: 'static + Flowable + Clone,
{
    fn clone_box(&self) -> Box<dyn Flowable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Flowable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font_size: Pt,
    pub line_height: Pt,
    pub line_height_is_auto: bool,
    pub color: Color,
    pub font_name: Arc<str>,
}

impl Default for TextStyle {
    fn default() -> Self {
        let font_size = Pt::from_f32(12.0);
        Self {
            font_size,
            line_height: font_size.mul_ratio(6, 5),
            line_height_is_auto: true,
            color: Color::BLACK,
            font_name: Arc::<str>::from("Helvetica"),
        }
    }
}

impl TextStyle {
    pub fn sized(font_name: Arc<str>, font_size: Pt) -> Self {
        Self {
            font_size,
            line_height: font_size.mul_ratio(6, 5),
            line_height_is_auto: true,
            color: Color::BLACK,
            font_name,
        }
    }

    pub fn with_line_height(mut self, line_height: Pt) -> Self {
        self.line_height = line_height;
        self.line_height_is_auto = false;
        self
    }
}

#[derive(Debug, Clone)]
struct LineLayout {
    text: String,
    width: Pt,
}

#[derive(Debug, Default)]
struct TextLayoutCache {
    map: HashMap<i64, Arc<Vec<LineLayout>>>,
}

impl TextLayoutCache {
    fn get(&self, key: i64) -> Option<Arc<Vec<LineLayout>>> {
        self.map.get(&key).cloned()
    }

    fn insert(&mut self, key: i64, lines: Arc<Vec<LineLayout>>) {
        self.map.insert(key, lines);
    }
}

#[derive(Debug, Default)]
struct TextWidthCache {
    map: HashMap<String, Pt>,
}

impl TextWidthCache {
    fn get(&self, text: &str) -> Option<Pt> {
        self.map.get(text).copied()
    }

    fn insert(&mut self, text: &str, value: Pt) {
        self.map.insert(text.to_string(), value);
    }
}

/// Word-wrapped text block. With `max_lines` set it clips instead of
/// growing, ellipsizing the last visible line.
#[derive(Clone)]
pub struct Paragraph {
    text: String,
    style: TextStyle,
    align: TextAlign,
    pagination: Pagination,
    max_lines: Option<usize>,
    font_registry: Option<Arc<FontRegistry>>,
    layout_cache: Arc<Mutex<TextLayoutCache>>,
    width_cache: Arc<Mutex<TextWidthCache>>,
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
            align: TextAlign::Left,
            pagination: Pagination::default(),
            max_lines: None,
            font_registry: None,
            layout_cache: Arc::new(Mutex::new(TextLayoutCache::default())),
            width_cache: Arc::new(Mutex::new(TextWidthCache::default())),
        }
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines.max(1));
        self
    }

    pub(crate) fn with_font_registry(mut self, registry: Option<Arc<FontRegistry>>) -> Self {
        self.font_registry = registry;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn line_count(&self, avail_width: Pt) -> usize {
        self.layout_lines(avail_width).len()
    }

    fn measure_text_width(&self, text: &str) -> Pt {
        if let Ok(cache) = self.width_cache.lock() {
            if let Some(value) = cache.get(text) {
                return value;
            }
        }
        let value = if let Some(registry) = &self.font_registry {
            registry.measure_text_width(&self.style.font_name, self.style.font_size, text)
        } else {
            let char_width = (self.style.font_size * 0.6).max(Pt::from_f32(1.0));
            char_width * (text.chars().count() as i32)
        };
        if let Ok(mut cache) = self.width_cache.lock() {
            cache.insert(text, value);
        }
        value
    }

    pub(crate) fn effective_line_height(&self) -> Pt {
        if self.style.line_height_is_auto {
            if let Some(registry) = &self.font_registry {
                return registry.line_height(
                    &self.style.font_name,
                    self.style.font_size,
                    self.style.line_height,
                );
            }
            return self.style.font_size.mul_ratio(6, 5);
        }
        self.style.line_height
    }

    fn layout_lines(&self, avail_width: Pt) -> Arc<Vec<LineLayout>> {
        let max_width = avail_width.max(Pt::from_f32(1.0));
        let key = max_width.to_milli_i64();
        if let Ok(cache) = self.layout_cache.lock() {
            if let Some(lines) = cache.get(key) {
                return lines;
            }
        }

        let mut lines = Vec::new();
        let mut word_widths: HashMap<&str, Pt> = HashMap::new();
        let space_width = self.measure_text_width(" ");
        for segment in self.text.split('\n') {
            if segment.is_empty() {
                lines.push(String::new());
                continue;
            }
            let mut current = String::new();
            let mut current_width = Pt::ZERO;
            let words: Vec<(&str, Pt)> = segment
                .split_whitespace()
                .map(|word| {
                    let width = if let Some(value) = word_widths.get(word) {
                        *value
                    } else {
                        let value = self.measure_text_width(word);
                        word_widths.insert(word, value);
                        value
                    };
                    (word, width)
                })
                .collect();
            for (word, word_width) in words {
                if current.is_empty() {
                    // An overlong word occupies a line of its own.
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

        if let Some(max_lines) = self.max_lines {
            if lines.len() > max_lines {
                lines.truncate(max_lines);
                if let Some(last) = lines.last_mut() {
                    let mut clipped = last.clone();
                    clipped.push('\u{2026}');
                    if self.measure_text_width(&clipped) > max_width {
                        clipped = truncate_text_with_ellipsis(self, last, max_width);
                    }
                    *last = clipped;
                }
            }
        }

        let mut line_layouts = Vec::with_capacity(lines.len());
        for line in lines {
            let width = if line.is_empty() {
                Pt::ZERO
            } else {
                self.measure_text_width(&line)
            };
            line_layouts.push(LineLayout { text: line, width });
        }
        let lines = Arc::new(line_layouts);
        if let Ok(mut cache) = self.layout_cache.lock() {
            cache.insert(key, lines.clone());
        }
        lines
    }

    fn derive(&self, text: String, pagination: Pagination) -> Paragraph {
        Paragraph {
            text,
            style: self.style.clone(),
            align: self.align,
            pagination,
            max_lines: self.max_lines,
            font_registry: self.font_registry.clone(),
            layout_cache: Arc::new(Mutex::new(TextLayoutCache::default())),
            width_cache: Arc::new(Mutex::new(TextWidthCache::default())),
        }
    }
}

fn truncate_text_with_ellipsis(paragraph: &Paragraph, text: &str, max_width: Pt) -> String {
    if text.is_empty() {
        return String::new();
    }

    let ellipsis = "\u{2026}";
    if max_width <= Pt::ZERO {
        return String::new();
    }
    let ellipsis_width = paragraph.measure_text_width(ellipsis);
    if ellipsis_width >= max_width {
        return ellipsis.to_string();
    }

    let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    boundaries.push(text.len());
    if boundaries.len() <= 1 {
        return ellipsis.to_string();
    }

    let mut lo = 0usize;
    let mut hi = boundaries.len() - 1;
    let mut best = 0usize;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        let end = boundaries[mid];
        let candidate = &text[..end];
        let mut candidate_text = String::with_capacity(end + ellipsis.len());
        candidate_text.push_str(candidate);
        candidate_text.push_str(ellipsis);
        let width = paragraph.measure_text_width(&candidate_text);
        if width <= max_width {
            best = mid;
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }

    let end = boundaries[best];
    let mut out = String::new();
    out.push_str(&text[..end]);
    out.push_str(ellipsis);
    out
}

impl Flowable for Paragraph {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.layout_lines(avail_width);
        let line_height = self.effective_line_height();
        let height = line_height * (lines.len() as i32);
        let width = lines
            .iter()
            .fold(Pt::ZERO, |acc, line| acc.max(line.width))
            .min(avail_width);
        Size { width, height }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        // A clipped paragraph has a fixed visible extent and never splits.
        if self.max_lines.is_some() {
            return None;
        }
        let lines = self.layout_lines(avail_width);
        let line_height = self.effective_line_height();
        let lh = line_height.to_milli_i64();
        let ah = avail_height.to_milli_i64();
        if lh <= 0 || ah <= 0 {
            return None;
        }
        let max_lines = (ah / lh) as usize;
        if max_lines == 0 || max_lines >= lines.len() {
            return None;
        }

        let mut split_at = max_lines;
        let total_lines = lines.len();
        let orphans = self.pagination.resolved_orphans();
        let widows = self.pagination.resolved_widows();

        if split_at < orphans {
            split_at = 0;
        }

        if total_lines - split_at < widows {
            let adjusted = total_lines.saturating_sub(widows);
            if adjusted >= orphans {
                split_at = adjusted;
            } else if max_lines >= orphans {
                split_at = max_lines.min(adjusted.max(orphans));
            } else {
                split_at = 0;
            }
        }

        if split_at == 0 || split_at >= total_lines {
            if max_lines >= 1 {
                split_at = max_lines.min(total_lines - 1);
            } else {
                return None;
            }
        }

        if total_lines - split_at < widows && split_at > 1 {
            split_at = (total_lines - widows).max(1);
        }

        if split_at == 0 || split_at >= total_lines {
            return None;
        }

        let first_text = lines[..split_at]
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let second_text = lines[split_at..]
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let first = self.derive(
            first_text,
            Pagination {
                break_before: BreakBefore::Auto,
                break_after: BreakAfter::Auto,
                ..self.pagination
            },
        );
        let second = self.derive(
            second_text,
            Pagination {
                break_before: BreakBefore::Auto,
                ..self.pagination
            },
        );
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.layout_lines(avail_width);
        canvas.set_fill_color(self.style.color);
        canvas.set_font_name(self.style.font_name.as_ref());
        canvas.set_font_size(self.style.font_size);

        let mut cursor_y = y;
        let line_height = self.effective_line_height();
        for line in lines.iter() {
            let offset = match self.align {
                TextAlign::Left => Pt::ZERO,
                TextAlign::Center => ((avail_width - line.width).max(Pt::ZERO)).mul_ratio(1, 2),
                TextAlign::Right => (avail_width - line.width).max(Pt::ZERO),
            };
            if !line.text.is_empty() {
                canvas.draw_string(x + offset, cursor_y, line.text.clone());
            }
            cursor_y = cursor_y + line_height;
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

#[derive(Debug, Clone)]
pub struct Spacer {
    height: Pt,
    pagination: Pagination,
}

impl Spacer {
    pub fn new(height: f32) -> Self {
        Self::new_pt(Pt::from_f32(height))
    }

    pub fn new_pt(height: Pt) -> Self {
        Self {
            height,
            pagination: Pagination::default(),
        }
    }
}

impl Flowable for Spacer {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.height.max(Pt::ZERO),
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

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

#[derive(Debug, Clone)]
pub struct ImageFlowable {
    pub width: Pt,
    pub height: Pt,
    pub resource_id: String,
    pagination: Pagination,
}

impl ImageFlowable {
    pub fn new_pt(width: Pt, height: Pt, resource_id: impl Into<String>) -> Self {
        Self {
            width,
            height,
            resource_id: resource_id.into(),
            pagination: Pagination::default(),
        }
    }
}

impl Flowable for ImageFlowable {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        canvas.draw_image(x, y, self.width, self.height, self.resource_id.clone());
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, Command};
    use crate::types::Size as PageSize;

    fn drawn_strings(paragraph: &Paragraph, avail_width: Pt) -> Vec<String> {
        let mut canvas = Canvas::new(PageSize::a4());
        paragraph.draw(
            &mut canvas,
            Pt::ZERO,
            Pt::ZERO,
            avail_width,
            Pt::from_f32(800.0),
        );
        canvas
            .finish()
            .pages
            .remove(0)
            .commands
            .into_iter()
            .filter_map(|command| match command {
                Command::DrawString { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn words_wrap_at_available_width() {
        // Default fallback metrics: 7.2pt per char at 12pt.
        let paragraph = Paragraph::new("aa bb cc");
        assert_eq!(paragraph.line_count(Pt::from_f32(200.0)), 1);
        assert_eq!(paragraph.line_count(Pt::from_f32(40.0)), 2);
        assert_eq!(paragraph.line_count(Pt::from_f32(15.0)), 3);
    }

    #[test]
    fn wrap_height_is_line_count_times_line_height() {
        let paragraph = Paragraph::new("aa bb");
        let size = paragraph.wrap(Pt::from_f32(30.0), Pt::from_f32(500.0));
        // Two lines at the 1.2em auto line height.
        assert_eq!(size.height.to_milli_i64(), 28_800);
    }

    #[test]
    fn max_lines_clips_with_ellipsis() {
        let paragraph = Paragraph::new("aa bb cc dd").with_max_lines(1);
        let size = paragraph.wrap(Pt::from_f32(30.0), Pt::from_f32(500.0));
        assert_eq!(size.height.to_milli_i64(), 14_400);
        let strings = drawn_strings(&paragraph, Pt::from_f32(30.0));
        assert_eq!(strings.len(), 1);
        assert!(strings[0].ends_with('\u{2026}'));
    }

    #[test]
    fn clipped_paragraphs_do_not_split() {
        let paragraph = Paragraph::new("aa bb cc dd ee ff").with_max_lines(2);
        assert!(paragraph
            .split(Pt::from_f32(30.0), Pt::from_f32(15.0))
            .is_none());
    }

    #[test]
    fn split_honors_orphans_and_widows() {
        let paragraph = Paragraph::new("aa bb cc dd ee ff gg hh");
        // Eight single-word lines at width 30; room for two.
        let (first, second) = paragraph
            .split(Pt::from_f32(30.0), Pt::from_f32(30.0))
            .expect("splits");
        let first_size = first.wrap(Pt::from_f32(30.0), Pt::from_f32(30.0));
        let second_size = second.wrap(Pt::from_f32(30.0), Pt::from_f32(500.0));
        assert_eq!(first_size.height.to_milli_i64(), 28_800);
        assert_eq!(second_size.height.to_milli_i64(), 86_400);
    }

    #[test]
    fn centered_lines_are_offset_by_half_the_slack() {
        let paragraph = Paragraph::new("aa").with_align(TextAlign::Center);
        let mut canvas = Canvas::new(PageSize::a4());
        paragraph.draw(
            &mut canvas,
            Pt::ZERO,
            Pt::ZERO,
            Pt::from_f32(100.0),
            Pt::from_f32(100.0),
        );
        let doc = canvas.finish();
        let x = doc.pages[0]
            .commands
            .iter()
            .find_map(|command| match command {
                Command::DrawString { x, .. } => Some(*x),
                _ => None,
            })
            .expect("draw string");
        // (100 - 14.4) / 2
        assert_eq!(x.to_milli_i64(), 42_800);
    }

    #[test]
    fn empty_lines_advance_without_drawing() {
        let paragraph = Paragraph::new("aa\n\nbb");
        assert_eq!(paragraph.line_count(Pt::from_f32(200.0)), 3);
        let strings = drawn_strings(&paragraph, Pt::from_f32(200.0));
        assert_eq!(strings, vec!["aa".to_string(), "bb".to_string()]);
    }

    #[test]
    fn spacer_occupies_height_and_draws_nothing() {
        let spacer = Spacer::new(24.0);
        let size = spacer.wrap(Pt::from_f32(100.0), Pt::from_f32(100.0));
        assert_eq!(size.height.to_milli_i64(), 24_000);
        let mut canvas = Canvas::new(PageSize::a4());
        spacer.draw(
            &mut canvas,
            Pt::ZERO,
            Pt::ZERO,
            Pt::from_f32(100.0),
            Pt::from_f32(100.0),
        );
        assert!(canvas.is_current_empty());
    }
}
