use crate::canvas::{Command, Document, Page};
use crate::debug::DebugLogger;
use crate::font::{FontRegistry, RegisteredFont};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::types::{Color, Pt};
use base64::Engine;
use fixed::types::I32F32;
use image::GenericImageView;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct PdfOptions {
    // When true, identical image bytes (even if referenced via different
    // data URIs) are embedded once and reused via a single XObject resource.
    pub reuse_xobjects: bool,
    pub document_title: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            reuse_xobjects: true,
            document_title: None,
        }
    }
}

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;

pub(crate) fn document_to_pdf(
    document: &Document,
    registry: Option<&FontRegistry>,
    options: &PdfOptions,
) -> io::Result<Vec<u8>> {
    document_to_pdf_with_metrics(document, None, registry, options, None)
}

pub(crate) fn document_to_pdf_with_metrics(
    document: &Document,
    mut metrics: Option<&mut DocumentMetrics>,
    registry: Option<&FontRegistry>,
    options: &PdfOptions,
    debug: Option<Arc<DebugLogger>>,
) -> io::Result<Vec<u8>> {
    let page_count = document.pages.len();
    let content_start = PDF_RESOURCES_ID + 1;
    let page_start = content_start + page_count;
    let mut next_id = page_start + page_count;

    let font_names: Vec<String> = collect_used_font_names(document).into_iter().collect();
    let mut font_map = build_font_map(&font_names);
    let font_usage = collect_font_usage(document, registry);
    let (font_objects, font_resources_list, new_next) = build_font_objects(
        &font_names,
        &mut font_map,
        registry,
        next_id,
        &font_usage,
    );
    next_id = new_next;

    let image_sources = collect_image_sources(document);
    let (image_objects, image_resources_list, image_map, new_next) = build_image_objects(
        &image_sources,
        next_id,
        options.reuse_xobjects,
        debug.as_deref(),
    );
    next_id = new_next;
    let info_id = next_id;

    let mut objects: Vec<String> = Vec::new();
    objects.push(format!(
        "<< /Type /Catalog /Pages {} 0 R >>",
        PDF_PAGES_ID
    ));
    let kids = (0..page_count)
        .map(|index| format!("{} 0 R", page_start + index))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids, page_count
    ));
    let mut resources = String::from("<< ");
    if !font_resources_list.is_empty() {
        resources.push_str(&format!(
            "/Font {} ",
            resource_dict(&font_resources_list)
        ));
    }
    if !image_resources_list.is_empty() {
        resources.push_str(&format!(
            "/XObject {} ",
            resource_dict(&image_resources_list)
        ));
    }
    resources.push_str(">>");
    objects.push(resources);

    let mut replaced_total = 0usize;
    let mut content_bytes: Vec<usize> = Vec::with_capacity(page_count);
    for page in &document.pages {
        let content = render_page(
            page,
            document.page_size.height,
            &font_map,
            &font_usage,
            &image_map,
            &mut replaced_total,
        );
        content_bytes.push(content.len());
        objects.push(stream_object(&content));
    }
    if replaced_total > 0 {
        if let Some(debug) = debug.as_deref() {
            debug.log_event(
                "pdf.text_fallback",
                &[("replaced_chars", &replaced_total.to_string())],
            );
            debug.increment("pdf.text_fallback.char", replaced_total as u64);
        }
    }

    for index in 0..page_count {
        objects.push(format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PDF_PAGES_ID,
            fmt_pt(document.page_size.width),
            fmt_pt(document.page_size.height),
            PDF_RESOURCES_ID,
            content_start + index
        ));
    }
    objects.extend(font_objects);
    objects.extend(image_objects);
    objects.push(info_object(options.document_title.as_deref()));
    debug_assert_eq!(objects.len(), info_id);

    let bytes = build_pdf(objects, PDF_CATALOG_ID, Some(info_id));

    if let Some(metrics) = metrics.as_deref_mut() {
        metrics.total_bytes = bytes.len();
        for (page_index, size) in content_bytes.iter().enumerate() {
            if metrics.pages.len() <= page_index {
                metrics
                    .pages
                    .resize_with(page_index + 1, PageMetrics::default);
            }
            let entry = &mut metrics.pages[page_index];
            if entry.page_number == 0 {
                entry.page_number = page_index + 1;
            }
            entry.content_bytes = *size;
        }
    }

    Ok(bytes)
}

fn collect_used_font_names(document: &Document) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for page in &document.pages {
        let mut current_font = "Helvetica".to_string();
        for cmd in &page.commands {
            match cmd {
                Command::SetFontName(name) => current_font = name.clone(),
                Command::DrawString { .. } => {
                    names.insert(current_font.clone());
                }
                _ => {}
            }
        }
    }
    names
}

fn collect_image_sources(document: &Document) -> Vec<String> {
    let mut sources = BTreeSet::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::DrawImage { resource_id, .. } = cmd {
                sources.insert(resource_id.clone());
            }
        }
    }
    sources.into_iter().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontEncoding {
    WinAnsi,
    IdentityH,
}

#[derive(Debug, Clone)]
struct FontResource {
    resource: String,
    encoding: FontEncoding,
}

#[derive(Default)]
struct FontUsage {
    glyph_map: BTreeMap<u16, String>,
    char_map: HashMap<char, u16>,
}

fn build_font_map(fonts: &[String]) -> BTreeMap<String, FontResource> {
    let mut map = BTreeMap::new();
    for (index, name) in fonts.iter().enumerate() {
        map.insert(
            name.clone(),
            FontResource {
                resource: format!("F{}", index + 1),
                encoding: FontEncoding::WinAnsi,
            },
        );
    }
    map
}

fn collect_font_usage(
    document: &Document,
    registry: Option<&FontRegistry>,
) -> HashMap<String, FontUsage> {
    let mut map: HashMap<String, FontUsage> = HashMap::new();
    let Some(registry) = registry else {
        return map;
    };

    for page in &document.pages {
        let mut current_font = "Helvetica".to_string();
        for cmd in &page.commands {
            match cmd {
                Command::SetFontName(name) => current_font = name.clone(),
                Command::DrawString { text, .. } => {
                    if registry.resolve(&current_font).is_none() {
                        continue;
                    }
                    let usage = map.entry(current_font.clone()).or_default();
                    for ch in text.chars() {
                        let gid = registry.map_glyph_id_for_char(&current_font, ch);
                        usage.char_map.entry(ch).or_insert(gid);
                        if gid != 0 {
                            usage.glyph_map.entry(gid).or_insert_with(|| ch.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    map
}

fn build_font_objects(
    font_names: &[String],
    font_map: &mut BTreeMap<String, FontResource>,
    registry: Option<&FontRegistry>,
    start_id: usize,
    font_usage: &HashMap<String, FontUsage>,
) -> (Vec<String>, Vec<(String, usize)>, usize) {
    let mut objects = Vec::new();
    let mut resources = Vec::new();
    let mut next_id = start_id;

    for name in font_names {
        let resource = font_map
            .get(name)
            .map(|entry| entry.resource.clone())
            .unwrap_or_else(|| "F1".to_string());
        if let Some((reg, font)) =
            registry.and_then(|reg| reg.resolve(name).map(|font| (reg, font)))
        {
            let usage = font_usage.get(name);
            let (font_objects, font_id, new_next) =
                build_cidfont_objects(font, reg, usage, next_id);
            objects.extend(font_objects);
            resources.push((resource, font_id));
            if let Some(entry) = font_map.get_mut(name) {
                entry.encoding = FontEncoding::IdentityH;
            }
            next_id = new_next;
        } else {
            let font_id = next_id;
            objects.push(base14_font_object(name));
            resources.push((resource, font_id));
            next_id += 1;
        }
    }

    (objects, resources, next_id)
}

fn build_cidfont_objects(
    font: &RegisteredFont,
    registry: &FontRegistry,
    usage: Option<&FontUsage>,
    start_id: usize,
) -> (Vec<String>, usize, usize) {
    let font_file_id = start_id;
    let descriptor_id = start_id + 1;
    let cid_font_id = start_id + 2;
    let to_unicode_id = start_id + 3;
    let type0_font_id = start_id + 4;

    let mut objects = Vec::new();
    objects.push(font_file_object(&font.data));
    objects.push(font_descriptor_object(font, font_file_id));

    let mut glyph_map: BTreeMap<u16, String> =
        usage.map(|u| u.glyph_map.clone()).unwrap_or_default();
    if glyph_map.is_empty() {
        // Fallback: at least include space.
        let gid = registry.map_glyph_id_for_char(&font.name, ' ');
        if gid != 0 {
            glyph_map.insert(gid, " ".to_string());
        }
    }

    let mut w_entries: Vec<String> = Vec::new();
    for gid in glyph_map.keys() {
        let adv = registry.glyph_advance(&font.name, *gid);
        let width = if adv > 0 {
            adv
        } else {
            font.metrics.missing_width
        };
        w_entries.push(format!("{} [{}]", gid, width));
    }
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!("/W [{}]", w_entries.join(" "))
    };

    objects.push(format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R {} /CIDToGIDMap /Identity >>",
        sanitize_font_name(&font.name),
        descriptor_id,
        w_array
    ));
    objects.push(stream_object(&to_unicode_cmap(&glyph_map)));
    objects.push(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        sanitize_font_name(&font.name),
        cid_font_id,
        to_unicode_id
    ));

    (objects, type0_font_id, start_id + 5)
}

fn build_image_objects(
    sources: &[String],
    start_id: usize,
    reuse_xobjects: bool,
    debug: Option<&DebugLogger>,
) -> (
    Vec<String>,
    Vec<(String, usize)>,
    HashMap<String, String>,
    usize,
) {
    let mut objects = Vec::new();
    let mut resources = Vec::new();
    let mut name_map = HashMap::new();
    let mut content_map: HashMap<u64, String> = HashMap::new();
    let mut next_id = start_id;
    let mut image_index = 1usize;

    for source in sources {
        let Some(image) = load_image(source) else {
            if let Some(debug) = debug {
                debug.log_event(
                    "pdf.image_skipped",
                    &[("source", &truncate_preview(source, 64))],
                );
                debug.increment("pdf.image_skipped", 1);
            }
            continue;
        };
        let hash = hash_image(&image);
        if reuse_xobjects {
            if let Some(name) = content_map.get(&hash) {
                name_map.insert(source.clone(), name.clone());
                continue;
            }
        }

        let smask_id = image.alpha.as_ref().map(|_| {
            let id = next_id;
            next_id += 1;
            id
        });
        let obj_id = next_id;
        next_id += 1;
        let name = format!("Im{}", image_index);
        image_index += 1;

        if let (Some(alpha), Some(mask_id)) = (image.alpha.as_ref(), smask_id) {
            objects.push(image_smask_object(alpha));
            objects.push(image_object(&image, Some(mask_id)));
        } else {
            objects.push(image_object(&image, None));
        }
        resources.push((name.clone(), obj_id));
        name_map.insert(source.clone(), name.clone());
        if reuse_xobjects {
            content_map.insert(hash, name);
        }
    }

    (objects, resources, name_map, next_id)
}

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<AlphaData>,
}

struct AlphaData {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

fn load_image(source: &str) -> Option<ImageData> {
    if let Some((_, data)) = parse_data_uri(source) {
        return decode_image_bytes(&data);
    }
    let bytes = std::fs::read(Path::new(source)).ok()?;
    decode_image_bytes(&bytes)
}

fn decode_image_bytes(data: &[u8]) -> Option<ImageData> {
    // The declared MIME type is ignored; the leading bytes decide the format.
    let format = image::guess_format(data).ok();
    let decoded = image::load_from_memory(data).ok()?;
    let (width, height) = decoded.dimensions();

    // JPEG passes through untouched as a DCT stream.
    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return Some(ImageData {
            width,
            height,
            color_space,
            filter: "/DCTDecode",
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let alpha = if has_alpha {
        Some(AlphaData {
            width,
            height,
            data: flate_compress(&alpha),
        })
    } else {
        None
    };
    Some(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb),
        alpha,
    })
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, data_part) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn hash_image(image: &ImageData) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    image.data.hash(&mut hasher);
    if let Some(alpha) = &image.alpha {
        alpha.data.hash(&mut hasher);
    }
    hasher.finish()
}

fn image_object(image: &ImageData, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.data);
    let filters = match image.filter {
        "/DCTDecode" => "[/ASCIIHexDecode /DCTDecode]",
        _ => "[/ASCIIHexDecode /FlateDecode]",
    };
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Length {} /Filter {}{} >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        image.color_space,
        stream_data.as_bytes().len(),
        filters,
        smask,
        stream_data
    )
}

fn image_smask_object(alpha: &AlphaData) -> String {
    let stream_data = encode_stream_data(&alpha.data);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        alpha.width,
        alpha.height,
        stream_data.as_bytes().len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    let mut flags = if metrics.is_symbolic() { 4 } else { 32 };
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /FontFile2 {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_id
    )
}

fn font_file_object(data: &[u8]) -> String {
    let mut stream_data = ascii_hex_encode(data);
    stream_data.push('>');
    stream_data.push('\n');
    format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode >>\nstream\n{}endstream",
        stream_data.as_bytes().len(),
        data.len(),
        stream_data
    )
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for (index, byte) in data.iter().enumerate() {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn base14_font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        sanitize_font_name(name)
    )
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let body = entries
        .iter()
        .map(|(resource, id)| format!("/{} {} 0 R", resource, id))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<< {} >>", body)
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Helvetica".to_string()
    } else {
        out
    }
}

fn render_page(
    page: &Page,
    page_height: Pt,
    font_map: &BTreeMap<String, FontResource>,
    font_usage: &HashMap<String, FontUsage>,
    image_map: &HashMap<String, String>,
    replaced_total: &mut usize,
) -> String {
    let mut out = String::new();
    let mut current_font_size = Pt::from_f32(12.0);
    let mut current_font_name = "Helvetica".to_string();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => {
                out.push_str(&color_to_pdf_fill(*color));
            }
            Command::SetStrokeColor(color) => {
                out.push_str(&color_to_pdf_stroke(*color));
            }
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFontName(name) => {
                current_font_name = name.clone();
            }
            Command::SetFontSize(size) => {
                current_font_size = *size;
            }
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                out.push_str("BT\n");
                let font_res = font_map.get(&current_font_name);
                let resource = font_res.map(|v| v.resource.as_str()).unwrap_or("F1");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(current_font_size)));
                // Canvas y is the top of the line; PDF places the baseline.
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - current_font_size)
                ));
                match font_res
                    .map(|v| v.encoding)
                    .unwrap_or(FontEncoding::WinAnsi)
                {
                    FontEncoding::WinAnsi => {
                        let encoded = encode_winansi_pdf_string(text);
                        *replaced_total += encoded.replaced;
                        out.push_str(&format!("({}) Tj\n", encoded.text));
                    }
                    FontEncoding::IdentityH => {
                        let char_map = font_usage
                            .get(&current_font_name)
                            .map(|usage| &usage.char_map);
                        out.push_str(&format!("{} Tj\n", encode_cid_hex(text, char_map)));
                    }
                }
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_map.get(resource_id) {
                    let draw_y = page_height - *y - *height;
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(draw_y)
                    ));
                    out.push_str(&format!("/{} Do\n", name));
                    out.push_str("Q\n");
                }
            }
        }
    }

    out
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.as_bytes().len(),
        content
    )
}

fn info_object(title: Option<&str>) -> String {
    let mut entries: Vec<String> = Vec::new();
    if let Some(title) = title {
        entries.push(format!("/Title ({})", escape_pdf_string(title)));
    }
    entries.push("/Producer (sportcard)".to_string());
    format!("<< {} >>", entries.join(" "))
}

fn build_pdf(objects: Vec<String>, catalog_id: usize, info_id: Option<usize>) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        let obj_id = index + 1;
        out.extend_from_slice(format!("{} 0 obj\n", obj_id).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }

    let mut trailer = format!(
        "trailer\n<< /Size {} /Root {} 0 R",
        objects.len() + 1,
        catalog_id
    );
    if let Some(info_id) = info_id {
        trailer.push_str(&format!(" /Info {} 0 R", info_id));
    }
    trailer.push_str(&format!(" >>\nstartxref\n{}\n%%EOF", xref_start));
    out.extend_from_slice(trailer.as_bytes());

    out
}

fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            // ASCII
            '\u{0000}'..='\u{007F}' => ch as u8,
            // Latin-1
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // WinAnsi extensions (cp1252)
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn truncate_preview(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(u16, String)> = glyph_map.iter().map(|(g, s)| (*g, s.clone())).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let mut idx = 0usize;
    while idx < entries.len() {
        let end = (idx + 100).min(entries.len());
        out.push_str(&format!("{} beginbfchar\n", end - idx));
        for (gid, s) in &entries[idx..end] {
            let mut uni = String::new();
            for ch in s.chars() {
                let code = ch as u32;
                if code <= 0xFFFF {
                    uni.push_str(&format!("{:04X}", code));
                } else {
                    let code = code - 0x1_0000;
                    let high = 0xD800 | (code >> 10);
                    let low = 0xDC00 | (code & 0x3FF);
                    uni.push_str(&format!("{:04X}{:04X}", high, low));
                }
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
        idx = end;
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn encode_cid_hex(text: &str, char_map: Option<&HashMap<char, u16>>) -> String {
    let mut out = String::new();
    out.push('<');
    for ch in text.chars() {
        let gid = char_map
            .and_then(|map| map.get(&ch).copied())
            .unwrap_or(0);
        out.push_str(&format!("{:04X}", gid));
    }
    out.push('>');
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle)
    }

    fn png_data_uri(alpha: u8) -> String {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(3, 3, image::Rgba([10, 20, 30, alpha]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png fixture");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    fn jpeg_data_uri() -> String {
        let mut bytes = Vec::new();
        let img = image::RgbImage::from_pixel(3, 3, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Jpeg,
            )
            .expect("encode jpeg fixture");
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    #[test]
    fn to_unicode_cmap_handles_surrogates() {
        let mut map = BTreeMap::new();
        map.insert(3u16, "A".to_string());
        map.insert(4u16, "\u{1F600}".to_string());
        let cmap = to_unicode_cmap(&map);
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0004> <D83DDE00>"));
    }

    #[test]
    fn winansi_replaces_unmapped_characters_with_question_marks() {
        let encoded = encode_winansi_pdf_string("za\u{15B}wiadczenie");
        assert_eq!(encoded.text, "za?wiadczenie");
        assert_eq!(encoded.replaced, 1);

        let ellipsis = encode_winansi_pdf_string("dalej\u{2026}");
        assert_eq!(ellipsis.text, "dalej\\205");
        assert_eq!(ellipsis.replaced, 0);
    }

    #[test]
    fn format_milli_trims_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(595_280), "595.28");
        assert_eq!(format_milli(-1500), "-1.5");
        assert_eq!(format_milli(12_000), "12");
    }

    #[test]
    fn parse_data_uri_decodes_base64_payloads() {
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"abc")
        );
        let (mime, data) = parse_data_uri(&uri).expect("parse");
        assert_eq!(mime, "image/png");
        assert_eq!(data, b"abc");
        assert!(parse_data_uri("not-a-uri").is_none());
    }

    #[test]
    fn serializes_text_pages_with_winansi_fallback() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_font_size(Pt::from_f32(16.0));
        canvas.draw_string(Pt::from_f32(100.0), Pt::from_f32(50.0), "KARTA");
        let document = canvas.finish();

        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(contains(&bytes, b"(KARTA) Tj"));
        assert!(contains(&bytes, b"/Encoding /WinAnsiEncoding"));
        assert!(contains(&bytes, b"/MediaBox [0 0 595.28 841.89]"));
        assert!(contains(&bytes, b"%%EOF"));
    }

    #[test]
    fn opaque_png_embeds_without_a_soft_mask() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            png_data_uri(255),
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(contains(&bytes, b"/Subtype /Image"));
        assert!(contains(&bytes, b"/FlateDecode"));
        assert!(!contains(&bytes, b"/SMask"));
        assert!(contains(&bytes, b"/Im1 Do"));
    }

    #[test]
    fn translucent_png_gains_a_soft_mask() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            png_data_uri(128),
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(contains(&bytes, b"/SMask"));
        assert!(contains(&bytes, b"/DeviceGray"));
    }

    #[test]
    fn jpeg_passes_through_as_a_dct_stream() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            jpeg_data_uri(),
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(contains(&bytes, b"/DCTDecode"));
        assert!(!contains(&bytes, b"/SMask"));
    }

    #[test]
    fn mislabeled_png_is_classified_by_its_bytes() {
        // PNG payload under a jpeg MIME label must still embed as Flate,
        // not pass through as a DCT stream.
        let uri = png_data_uri(255).replacen("image/png", "image/jpeg", 1);
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            uri,
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(contains(&bytes, b"/FlateDecode"));
        assert!(!contains(&bytes, b"/DCTDecode"));
        assert!(contains(&bytes, b"/Im1 Do"));
    }

    #[test]
    fn identical_images_share_one_xobject() {
        let uri = png_data_uri(255);
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            uri.clone(),
        );
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(60.0),
            Pt::from_f32(20.0),
            Pt::from_f32(12.0),
            uri,
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(contains(&bytes, b"/Im1 Do"));
        assert!(!contains(&bytes, b"/Im2"));
    }

    #[test]
    fn undecodable_image_is_skipped() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(30.0),
            "data:image/png;base64,AAAA",
        );
        let document = canvas.finish();
        let bytes =
            document_to_pdf(&document, None, &PdfOptions::default()).expect("serialize");
        assert!(!contains(&bytes, b"/Subtype /Image"));
        assert!(!contains(&bytes, b"Do\n"));
    }

    #[test]
    fn title_lands_in_the_info_dictionary() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_string(Pt::from_f32(10.0), Pt::from_f32(10.0), "x");
        let document = canvas.finish();
        let options = PdfOptions {
            document_title: Some("Karta Zdrowia".to_string()),
            ..PdfOptions::default()
        };
        let bytes = document_to_pdf(&document, None, &options).expect("serialize");
        assert!(contains(&bytes, b"/Title (Karta Zdrowia)"));
        assert!(contains(&bytes, b"/Producer (sportcard)"));
    }
}
