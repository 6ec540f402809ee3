//! Extraction of text, images, fonts and links from parsed files.
//!
//! The text extractor walks the content-stream operators of a page and
//! tracks the text and transformation matrices; strings decode through
//! the font's ToUnicode CMap when present, then WinAnsi, then raw
//! Latin-1 bytes. Unknown operators are skipped, never fatal.

use std::collections::HashMap;

use log::debug;

use crate::cmap::ToUnicodeCMap;
use crate::deserialize::{Lexer, ParsedPage, ParsedPdf};
use crate::errors::{PdfError, Result};
use crate::object::{Dict, Obj};

/// One positioned text run
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font: String,
    pub size: f32,
}

/// An image XObject found in the file
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub object_no: u32,
    pub width: i64,
    pub height: i64,
    pub filter: String,
    /// stored (still encoded) payload
    pub data: Vec<u8>,
}

/// A font dictionary found in the file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFont {
    pub object_no: u32,
    pub base_font: String,
    pub subtype: String,
    pub embedded: bool,
}

/// A link annotation found on a page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedLink {
    /// 0-based page
    pub page: usize,
    /// `[llx lly urx ury]`
    pub rect: [f32; 4],
    /// URI for external links, empty for internal destinations
    pub uri: String,
}

/// Plain text of one page (0-based index), runs joined in stream order
pub fn extract_text_from_page(data: &[u8], page_index: usize) -> Result<String> {
    let runs = extract_page_text(data, page_index)?;
    let mut out = String::new();
    let mut last_y: Option<f32> = None;
    for run in runs {
        match last_y {
            Some(y) if (y - run.y).abs() > 0.1 => out.push('\n'),
            Some(_) => {
                if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            None => {}
        }
        out.push_str(&run.text);
        last_y = Some(run.y);
    }
    Ok(out)
}

/// Positioned text runs of one page (0-based index)
pub fn extract_page_text(data: &[u8], page_index: usize) -> Result<Vec<TextRun>> {
    let parsed = ParsedPdf::parse(data)?;
    let pages = parsed.pages()?;
    let page = pages
        .get(page_index)
        .ok_or(PdfError::PageOutOfRange(page_index + 1, pages.len()))?;
    let content = parsed.page_content(page)?;
    let fonts = page_fonts(&parsed, page);
    Ok(walk_content(&content, &fonts))
}

struct ExtFont {
    base_font: String,
    to_unicode: Option<ToUnicodeCMap>,
    win_ansi: bool,
}

impl ExtFont {
    fn decode(&self, bytes: &[u8]) -> String {
        if let Some(cmap) = &self.to_unicode {
            let s = cmap.decode_bytes(bytes);
            if !s.is_empty() {
                return s;
            }
        }
        if self.win_ansi {
            return bytes.iter().map(|b| win_ansi_char(*b)).collect();
        }
        bytes.iter().map(|b| *b as char).collect()
    }
}

/// Resolves the page's `/Font` resources into decode helpers
fn page_fonts(parsed: &ParsedPdf, page: &ParsedPage) -> HashMap<String, ExtFont> {
    let mut out = HashMap::new();
    let Some(font_dict) = page
        .resources
        .get("Font")
        .map(|f| parsed.resolve(f))
        .and_then(Obj::as_dict)
    else {
        return out;
    };
    for (name, font_ref) in font_dict.iter() {
        let Some(dict) = parsed.resolve(font_ref).as_dict() else {
            continue;
        };
        let base_font = dict
            .get("BaseFont")
            .and_then(Obj::as_name)
            .unwrap_or("")
            .to_string();
        let to_unicode = dict
            .get("ToUnicode")
            .map(|o| parsed.resolve(o))
            .and_then(Obj::as_stream)
            .and_then(|s| parsed.decode_stream(s).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map(|src| ToUnicodeCMap::parse(&src));
        let win_ansi = dict
            .get("Encoding")
            .map(|o| parsed.resolve(o))
            .and_then(Obj::as_name)
            == Some("WinAnsiEncoding");
        out.insert(
            name.to_string(),
            ExtFont {
                base_font,
                to_unicode,
                win_ansi,
            },
        );
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Mat([f32; 6]);

impl Mat {
    const IDENTITY: Mat = Mat([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn mul(self, other: Mat) -> Mat {
        let a = self.0;
        let b = other.0;
        Mat([
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
            a[4] * b[0] + a[5] * b[2] + b[4],
            a[4] * b[1] + a[5] * b[3] + b[5],
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let m = self.0;
        (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
    }

    fn translate(tx: f32, ty: f32) -> Mat {
        Mat([1.0, 0.0, 0.0, 1.0, tx, ty])
    }
}

/// Interpreter state over one content stream
struct TextState {
    ctm: Mat,
    ctm_stack: Vec<Mat>,
    text_matrix: Mat,
    line_matrix: Mat,
    leading: f32,
    font_name: String,
    font_size: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Mat::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Mat::IDENTITY,
            line_matrix: Mat::IDENTITY,
            leading: 0.0,
            font_name: String::new(),
            font_size: 0.0,
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Mat::translate(tx, ty).mul(self.line_matrix);
        self.text_matrix = self.line_matrix;
    }
}

fn walk_content(content: &[u8], fonts: &HashMap<String, ExtFont>) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut lexer = Lexer::new(content, 0);
    let mut operands: Vec<Obj> = Vec::new();
    let mut state = TextState::new();

    loop {
        lexer.skip_ws();
        if lexer.at_end() {
            break;
        }
        let b = lexer.peek().unwrap_or(0);
        let is_operand_start = b.is_ascii_digit()
            || matches!(b, b'+' | b'-' | b'.' | b'(' | b'<' | b'[' | b'/');
        if is_operand_start {
            match lexer.parse_object() {
                Ok(obj) => operands.push(obj),
                Err(_) => {
                    // resynchronize on garbage
                    lexer.next_byte();
                    operands.clear();
                }
            }
            continue;
        }

        // operator keyword
        let mut op = String::new();
        while let Some(b) = lexer.peek() {
            if b.is_ascii_whitespace()
                || matches!(b, b'(' | b'<' | b'[' | b'/' | b']' | b'>' | b')' | b'%')
            {
                break;
            }
            op.push(b as char);
            lexer.next_byte();
        }
        if op.is_empty() {
            lexer.next_byte();
            continue;
        }

        apply_operator(&op, &operands, &mut state, fonts, &mut runs);
        operands.clear();
    }
    runs
}

fn apply_operator(
    op: &str,
    operands: &[Obj],
    state: &mut TextState,
    fonts: &HashMap<String, ExtFont>,
    runs: &mut Vec<TextRun>,
) {
    let num = |i: usize| operands.get(i).and_then(Obj::as_f32).unwrap_or(0.0);
    match op {
        "q" => state.ctm_stack.push(state.ctm),
        "Q" => {
            if let Some(m) = state.ctm_stack.pop() {
                state.ctm = m;
            }
        }
        "cm" => {
            if operands.len() == 6 {
                let m = Mat([num(0), num(1), num(2), num(3), num(4), num(5)]);
                state.ctm = m.mul(state.ctm);
            }
        }
        "BT" => {
            state.text_matrix = Mat::IDENTITY;
            state.line_matrix = Mat::IDENTITY;
        }
        "ET" => {}
        "Tf" => {
            if operands.len() == 2 {
                if let Some(name) = operands[0].as_name() {
                    state.font_name = name.to_string();
                }
                state.font_size = num(1);
            }
        }
        "TL" => state.leading = num(0),
        "Td" => state.next_line(num(0), num(1)),
        "TD" => {
            state.leading = -num(1);
            state.next_line(num(0), num(1));
        }
        "T*" => state.next_line(0.0, -state.leading),
        "Tm" => {
            if operands.len() == 6 {
                let m = Mat([num(0), num(1), num(2), num(3), num(4), num(5)]);
                state.text_matrix = m;
                state.line_matrix = m;
            }
        }
        "Tj" => {
            if let Some(Obj::String(bytes, _)) = operands.first() {
                push_run(bytes, state, fonts, runs);
            }
        }
        "'" => {
            state.next_line(0.0, -state.leading);
            if let Some(Obj::String(bytes, _)) = operands.first() {
                push_run(bytes, state, fonts, runs);
            }
        }
        "\"" => {
            // word spacing and char spacing operands are ignored here
            state.next_line(0.0, -state.leading);
            if let Some(Obj::String(bytes, _)) = operands.get(2) {
                push_run(bytes, state, fonts, runs);
            }
        }
        "TJ" => {
            if let Some(Obj::Array(items)) = operands.first() {
                let mut bytes = Vec::new();
                for item in items {
                    if let Obj::String(s, _) = item {
                        bytes.extend_from_slice(s);
                    }
                }
                push_run(&bytes, state, fonts, runs);
            }
        }
        other => {
            debug!("extract: skipping operator {}", other);
        }
    }
}

fn push_run(
    bytes: &[u8],
    state: &mut TextState,
    fonts: &HashMap<String, ExtFont>,
    runs: &mut Vec<TextRun>,
) {
    let font = fonts.get(&state.font_name);
    let text = match font {
        Some(f) => f.decode(bytes),
        None => bytes.iter().map(|b| *b as char).collect(),
    };
    if text.is_empty() {
        return;
    }
    let device = state.text_matrix.mul(state.ctm);
    let (x, y) = device.apply(0.0, 0.0);
    // crude advance estimate for fonts whose widths we do not track
    let width = text.chars().count() as f32 * state.font_size * 0.5;
    runs.push(TextRun {
        text,
        x,
        y,
        width,
        height: state.font_size,
        font: font.map(|f| f.base_font.clone()).unwrap_or_default(),
        size: state.font_size,
    });
    state.text_matrix = Mat::translate(width, 0.0).mul(state.text_matrix);
}

/// Every image XObject in the file
pub fn extract_images(data: &[u8]) -> Result<Vec<ExtractedImage>> {
    let parsed = ParsedPdf::parse(data)?;
    let mut out = Vec::new();
    for (no, _) in parsed.object_numbers() {
        let Some(stream) = parsed.object(no).and_then(Obj::as_stream) else {
            continue;
        };
        if stream.dict.get("Subtype").and_then(Obj::as_name) != Some("Image") {
            continue;
        }
        let filter = match stream.dict.get("Filter").map(|f| parsed.resolve(f)) {
            Some(Obj::Name(n)) => n.clone(),
            Some(Obj::Array(items)) => items
                .iter()
                .filter_map(Obj::as_name)
                .collect::<Vec<_>>()
                .join(","),
            _ => String::new(),
        };
        out.push(ExtractedImage {
            object_no: no,
            width: stream.dict.get("Width").and_then(Obj::as_int).unwrap_or(0),
            height: stream.dict.get("Height").and_then(Obj::as_int).unwrap_or(0),
            filter,
            data: stream.content.clone(),
        });
    }
    Ok(out)
}

/// Every font dictionary in the file
pub fn extract_fonts(data: &[u8]) -> Result<Vec<ExtractedFont>> {
    let parsed = ParsedPdf::parse(data)?;
    let mut out = Vec::new();
    for (no, _) in parsed.object_numbers() {
        let Some(dict) = parsed.object(no).and_then(Obj::as_dict) else {
            continue;
        };
        if dict.get("Type").and_then(Obj::as_name) != Some("Font") {
            continue;
        }
        let subtype = dict
            .get("Subtype")
            .and_then(Obj::as_name)
            .unwrap_or("")
            .to_string();
        let embedded = font_is_embedded(&parsed, dict);
        out.push(ExtractedFont {
            object_no: no,
            base_font: dict
                .get("BaseFont")
                .and_then(Obj::as_name)
                .unwrap_or("")
                .to_string(),
            subtype,
            embedded,
        });
    }
    Ok(out)
}

fn font_is_embedded(parsed: &ParsedPdf, font: &Dict) -> bool {
    let descriptor = |d: &Dict| -> bool {
        d.contains_key("FontFile")
            || d.contains_key("FontFile2")
            || d.contains_key("FontFile3")
    };
    if let Some(d) = font
        .get("FontDescriptor")
        .map(|o| parsed.resolve(o))
        .and_then(Obj::as_dict)
    {
        return descriptor(d);
    }
    // Type0: look into the descendant
    if let Some(desc) = font
        .get("DescendantFonts")
        .map(|o| parsed.resolve(o))
        .and_then(Obj::as_array)
        .and_then(|a| a.first())
        .map(|o| parsed.resolve(o))
        .and_then(Obj::as_dict)
    {
        if let Some(d) = desc
            .get("FontDescriptor")
            .map(|o| parsed.resolve(o))
            .and_then(Obj::as_dict)
        {
            return descriptor(d);
        }
    }
    false
}

/// Every link annotation, across all pages
pub fn extract_links(data: &[u8]) -> Result<Vec<ExtractedLink>> {
    let parsed = ParsedPdf::parse(data)?;
    let mut out = Vec::new();
    for (page_idx, page) in parsed.pages()?.iter().enumerate() {
        let Some(annots) = page
            .dict
            .get("Annots")
            .map(|a| parsed.resolve(a))
            .and_then(Obj::as_array)
        else {
            continue;
        };
        for annot in annots {
            let Some(dict) = parsed.resolve(annot).as_dict() else {
                continue;
            };
            if dict.get("Subtype").and_then(Obj::as_name) != Some("Link") {
                continue;
            }
            let rect = dict
                .get("Rect")
                .and_then(crate::deserialize::parse_rect)
                .unwrap_or([0.0; 4]);
            let uri = dict
                .get("A")
                .map(|a| parsed.resolve(a))
                .and_then(Obj::as_dict)
                .and_then(|a| a.get("URI"))
                .and_then(Obj::as_string)
                .map(|s| String::from_utf8_lossy(s).to_string())
                .unwrap_or_default();
            out.push(ExtractedLink {
                page: page_idx,
                rect,
                uri,
            });
        }
    }
    Ok(out)
}

/// WinAnsi (CP-1252) byte to char; the 0x80–0x9F window differs from
/// Latin-1
fn win_ansi_char(b: u8) -> char {
    match b {
        0x80 => '€',
        0x82 => '‚',
        0x83 => 'ƒ',
        0x84 => '„',
        0x85 => '…',
        0x86 => '†',
        0x87 => '‡',
        0x88 => 'ˆ',
        0x89 => '‰',
        0x8A => 'Š',
        0x8B => '‹',
        0x8C => 'Œ',
        0x8E => 'Ž',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x98 => '˜',
        0x99 => '™',
        0x9A => 'š',
        0x9B => '›',
        0x9C => 'œ',
        0x9E => 'ž',
        0x9F => 'Ÿ',
        other => other as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_ansi_specials() {
        assert_eq!(win_ansi_char(0x80), '€');
        assert_eq!(win_ansi_char(0x99), '™');
        assert_eq!(win_ansi_char(b'A'), 'A');
        assert_eq!(win_ansi_char(0xE9), 'é');
    }

    #[test]
    fn walk_content_tracks_positions() {
        let content = b"BT\n/F0 12 Tf\n1 0 0 1 100 700 Tm\n(AB) Tj\nET\n";
        let mut fonts = HashMap::new();
        fonts.insert(
            "F0".to_string(),
            ExtFont {
                base_font: "Test".to_string(),
                to_unicode: None,
                win_ansi: false,
            },
        );
        let runs = walk_content(content, &fonts);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "AB");
        assert_eq!(runs[0].x, 100.0);
        assert_eq!(runs[0].y, 700.0);
        assert_eq!(runs[0].size, 12.0);
    }

    #[test]
    fn walk_content_td_and_tstar() {
        let content = b"BT /F0 10 Tf 14 TL 10 100 Td (one) Tj T* (two) Tj ET";
        let fonts = HashMap::new();
        let runs = walk_content(content, &fonts);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].y, 100.0);
        assert_eq!(runs[1].y, 100.0 - 14.0);
    }

    #[test]
    fn walk_content_cm_transforms() {
        let content = b"q 2 0 0 2 0 0 cm BT /F0 10 Tf 5 5 Td (x) Tj ET Q";
        let runs = walk_content(&content[..], &HashMap::new());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].x, 10.0);
        assert_eq!(runs[0].y, 10.0);
    }

    #[test]
    fn tj_array_concatenates() {
        let content = b"BT /F0 10 Tf [(a) -120 (b)] TJ ET";
        let runs = walk_content(&content[..], &HashMap::new());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "ab");
    }

    #[test]
    fn unknown_operators_are_skipped() {
        let content = b"BT /F0 10 Tf 1 2 3 bogus (ok) Tj ET";
        let runs = walk_content(&content[..], &HashMap::new());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "ok");
    }
}
