//! Revise operations over raw file bytes: read or rewrite a single
//! object, patch stream bodies, duplicate objects, rebuild the xref.
//!
//! Every mutating operation parses the file, edits the object table and
//! re-emits the whole body with a fresh cross-reference table.

use crate::deserialize::ParsedPdf;
use crate::errors::{PdfError, Result};
use crate::object::{Dict, Obj, StreamObj};
use crate::serialize::compress_flate;

fn object_or_err(parsed: &ParsedPdf, no: u32) -> Result<&Obj> {
    parsed
        .object(no)
        .ok_or_else(|| PdfError::PdfParse(format!("object {} not found", no)))
}

/// Reads one indirect object
pub fn read_object(data: &[u8], no: u32) -> Result<Obj> {
    let parsed = ParsedPdf::parse(data)?;
    object_or_err(&parsed, no).cloned()
}

/// Replaces the object's dictionary; a stream body is preserved
pub fn update_object(data: &[u8], no: u32, dict: Dict) -> Result<Vec<u8>> {
    let mut parsed = ParsedPdf::parse(data)?;
    let obj = parsed
        .object_mut(no)
        .ok_or_else(|| PdfError::PdfParse(format!("object {} not found", no)))?;
    match obj {
        Obj::Stream(stream) => {
            let mut dict = dict;
            // keep the envelope keys consistent with the body we keep
            if let Some(len) = stream.dict.get("Length") {
                dict.set("Length", len.clone());
            }
            if let Some(filter) = stream.dict.get("Filter") {
                if !dict.contains_key("Filter") {
                    dict.set("Filter", filter.clone());
                }
            }
            stream.dict = dict;
        }
        other => *other = Obj::Dictionary(dict),
    }
    Ok(parsed.write())
}

/// Reads one entry of the object's dictionary
pub fn get_dict_key(data: &[u8], no: u32, key: &str) -> Result<Obj> {
    let parsed = ParsedPdf::parse(data)?;
    let obj = object_or_err(&parsed, no)?;
    obj.as_dict()
        .and_then(|d| d.get(key))
        .cloned()
        .ok_or_else(|| PdfError::PdfParse(format!("object {} has no key /{}", no, key)))
}

/// Sets one entry of the object's dictionary and rewrites the file
pub fn set_dict_key(data: &[u8], no: u32, key: &str, value: Obj) -> Result<Vec<u8>> {
    let mut parsed = ParsedPdf::parse(data)?;
    let obj = parsed
        .object_mut(no)
        .ok_or_else(|| PdfError::PdfParse(format!("object {} not found", no)))?;
    let dict = obj
        .as_dict_mut()
        .ok_or_else(|| PdfError::PdfParse(format!("object {} is not a dictionary", no)))?;
    dict.set(key, value);
    Ok(parsed.write())
}

/// Returns the decoded stream body of an object
pub fn get_stream(data: &[u8], no: u32) -> Result<Vec<u8>> {
    let parsed = ParsedPdf::parse(data)?;
    let stream = object_or_err(&parsed, no)?
        .as_stream()
        .ok_or_else(|| PdfError::PdfParse(format!("object {} is not a stream", no)))?;
    parsed.decode_stream(stream)
}

/// Replaces the stream body. The new body is deflated and `/Filter`,
/// `/Length` updated accordingly.
pub fn set_stream(data: &[u8], no: u32, body: &[u8]) -> Result<Vec<u8>> {
    let mut parsed = ParsedPdf::parse(data)?;
    let obj = parsed
        .object_mut(no)
        .ok_or_else(|| PdfError::PdfParse(format!("object {} not found", no)))?;
    match obj {
        Obj::Stream(stream) => {
            stream.content = compress_flate(body);
            stream.filters.clear();
            stream.dict.set("Filter", Obj::name("FlateDecode"));
            stream.dict.remove("DecodeParms");
            stream.dict.set("Length", stream.content.len() as i64);
        }
        other => {
            let mut dict = other.as_dict().cloned().unwrap_or_default();
            let content = compress_flate(body);
            dict.set("Filter", Obj::name("FlateDecode"));
            dict.set("Length", content.len() as i64);
            *other = Obj::Stream(StreamObj::new(dict, content));
        }
    }
    Ok(parsed.write())
}

/// Appends a duplicate of the object; returns the new bytes and the
/// fresh object number
pub fn copy_object(data: &[u8], no: u32) -> Result<(Vec<u8>, u32)> {
    let mut parsed = ParsedPdf::parse(data)?;
    let copy = object_or_err(&parsed, no)?.clone();
    let new_no = parsed.push_object(copy);
    Ok((parsed.write(), new_no))
}

/// Re-derives the cross-reference table by scanning for `N G obj`
/// headers, then re-emits the file with a correct `startxref`
pub fn rebuild_xref(data: &[u8]) -> Result<Vec<u8>> {
    let parsed = ParsedPdf::parse_tolerant(data)?;
    Ok(parsed.write())
}

/// Target space of [`convert_color_operators`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorTarget {
    Gray,
    Cmyk,
}

/// Rewrites the color operators of every page content stream into the
/// target space (`rg`/`RG`/`k`/`K` → `g`/`G`, or `rg`/`RG`/`g`/`G` →
/// `k`/`K`). Everything else passes through untouched.
pub fn convert_color_operators(data: &[u8], target: ColorTarget) -> Result<Vec<u8>> {
    let mut parsed = ParsedPdf::parse(data)?;
    let mut content_refs = Vec::new();
    for page in parsed.pages()? {
        content_refs.extend(page.content_refs);
    }
    content_refs.sort_unstable();
    content_refs.dedup();

    for no in content_refs {
        let decoded = {
            let stream = parsed
                .object(no)
                .and_then(Obj::as_stream)
                .ok_or(PdfError::ContentObjNotFound(no as usize))?;
            parsed.decode_stream(stream)?
        };
        let rewritten = rewrite_colors(&decoded, target);
        let Some(Obj::Stream(stream)) = parsed.object_mut(no) else {
            continue;
        };
        stream.content = compress_flate(&rewritten);
        stream.filters.clear();
        stream.dict.set("Filter", Obj::name("FlateDecode"));
        stream.dict.remove("DecodeParms");
        stream.dict.set("Length", stream.content.len() as i64);
    }
    Ok(parsed.write())
}

fn rewrite_colors(content: &[u8], target: ColorTarget) -> Vec<u8> {
    use crate::color::fmt_f32;
    use crate::deserialize::Lexer;

    let mut out = Vec::with_capacity(content.len());
    let mut lexer = Lexer::new(content, 0);
    let mut operands: Vec<Obj> = Vec::new();

    let flush = |out: &mut Vec<u8>, operands: &mut Vec<Obj>| {
        for op in operands.drain(..) {
            op.write(out);
            out.push(b' ');
        }
    };

    loop {
        lexer.skip_ws();
        if lexer.at_end() {
            break;
        }
        let b = lexer.peek().unwrap_or(0);
        if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'(' | b'<' | b'[' | b'/') {
            match lexer.parse_object() {
                Ok(obj) => operands.push(obj),
                Err(_) => {
                    lexer.next_byte();
                }
            }
            continue;
        }
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

        let nums: Vec<f32> = operands.iter().filter_map(Obj::as_f32).collect();
        let stroke = op.chars().all(|c| c.is_ascii_uppercase());
        let converted = match (op.as_str(), target) {
            ("rg" | "RG", ColorTarget::Gray) if nums.len() == 3 => {
                Some(format!(
                    "{} {}",
                    fmt_f32(luminance(nums[0], nums[1], nums[2])),
                    if stroke { "G" } else { "g" }
                ))
            }
            ("k" | "K", ColorTarget::Gray) if nums.len() == 4 => {
                let (r, g, b) = cmyk_to_rgb(nums[0], nums[1], nums[2], nums[3]);
                Some(format!(
                    "{} {}",
                    fmt_f32(luminance(r, g, b)),
                    if stroke { "G" } else { "g" }
                ))
            }
            ("rg" | "RG", ColorTarget::Cmyk) if nums.len() == 3 => {
                let (c, m, y, k) = rgb_to_cmyk(nums[0], nums[1], nums[2]);
                Some(format!(
                    "{} {} {} {} {}",
                    fmt_f32(c),
                    fmt_f32(m),
                    fmt_f32(y),
                    fmt_f32(k),
                    if stroke { "K" } else { "k" }
                ))
            }
            ("g" | "G", ColorTarget::Cmyk) if nums.len() == 1 => {
                Some(format!(
                    "0 0 0 {} {}",
                    fmt_f32(1.0 - nums[0]),
                    if stroke { "K" } else { "k" }
                ))
            }
            _ => None,
        };
        match converted {
            Some(text) => {
                operands.clear();
                out.extend_from_slice(text.as_bytes());
                out.push(b'\n');
            }
            None => {
                flush(&mut out, &mut operands);
                out.extend_from_slice(op.as_bytes());
                out.push(b'\n');
            }
        }
    }
    flush(&mut out, &mut operands);
    out
}

fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

fn rgb_to_cmyk(r: f32, g: f32, b: f32) -> (f32, f32, f32, f32) {
    let k = 1.0 - r.max(g).max(b);
    if k >= 1.0 {
        return (0.0, 0.0, 0.0, 1.0);
    }
    (
        (1.0 - r - k) / (1.0 - k),
        (1.0 - g - k) / (1.0 - k),
        (1.0 - b - k) / (1.0 - k),
        k,
    )
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> (f32, f32, f32) {
    (
        (1.0 - c) * (1.0 - k),
        (1.0 - m) * (1.0 - k),
        (1.0 - y) * (1.0 - k),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocConfig, Document};
    use crate::object::StringFormat;

    fn sample_pdf() -> Vec<u8> {
        let mut doc = Document::new();
        doc.start(DocConfig {
            compress: false,
            ..DocConfig::default()
        });
        doc.add_page().unwrap();
        doc.line(10.0, 10.0, 100.0, 10.0).unwrap();
        doc.save().unwrap()
    }

    #[test]
    fn read_and_update_object() {
        let bytes = sample_pdf();
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let pages = parsed.pages().unwrap();
        let page_no = pages[0].object_no;

        let obj = read_object(&bytes, page_no).unwrap();
        assert_eq!(
            obj.as_dict().unwrap().get("Type").and_then(Obj::as_name),
            Some("Page")
        );

        let updated = set_dict_key(
            &bytes,
            page_no,
            "Rotate",
            Obj::Integer(90),
        )
        .unwrap();
        let rotated = read_object(&updated, page_no).unwrap();
        assert_eq!(
            rotated.as_dict().unwrap().get("Rotate").and_then(Obj::as_int),
            Some(90)
        );
        // file must stay parseable after the rewrite
        assert_eq!(ParsedPdf::parse(&updated).unwrap().pages().unwrap().len(), 1);
    }

    #[test]
    fn stream_round_trip() {
        let bytes = sample_pdf();
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let content_no = parsed.pages().unwrap()[0].content_refs[0];

        let original = get_stream(&bytes, content_no).unwrap();
        assert!(String::from_utf8_lossy(&original).contains(" m\n"));

        let patched = set_stream(&bytes, content_no, b"0 0 m\n10 10 l\nS\n").unwrap();
        let back = get_stream(&patched, content_no).unwrap();
        assert_eq!(back, b"0 0 m\n10 10 l\nS\n");
    }

    #[test]
    fn copy_object_appends() {
        let bytes = sample_pdf();
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let page_no = parsed.pages().unwrap()[0].object_no;
        let before_max = parsed.max_object_number();

        let (out, new_no) = copy_object(&bytes, page_no).unwrap();
        assert_eq!(new_no, before_max + 1);
        let copy = read_object(&out, new_no).unwrap();
        assert_eq!(
            copy.as_dict().unwrap().get("Type").and_then(Obj::as_name),
            Some("Page")
        );
    }

    #[test]
    fn rebuild_xref_from_broken_table() {
        let mut bytes = sample_pdf();
        // corrupt the startxref offset
        let pos = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
        for b in &mut bytes[pos + 10..pos + 12] {
            *b = b'9';
        }
        let rebuilt = rebuild_xref(&bytes).unwrap();
        let parsed = ParsedPdf::parse(&rebuilt).unwrap();
        assert_eq!(parsed.pages().unwrap().len(), 1);
    }

    #[test]
    fn update_object_preserves_stream_body() {
        let bytes = sample_pdf();
        let parsed = ParsedPdf::parse(&bytes).unwrap();
        let content_no = parsed.pages().unwrap()[0].content_refs[0];
        let body_before = get_stream(&bytes, content_no).unwrap();

        let mut dict = Dict::new();
        dict.set(
            "Note",
            Obj::String(b"patched".to_vec(), StringFormat::Literal),
        );
        let updated = update_object(&bytes, content_no, dict).unwrap();
        assert_eq!(get_stream(&updated, content_no).unwrap(), body_before);
        let note = get_dict_key(&updated, content_no, "Note").unwrap();
        assert_eq!(note.as_string(), Some(b"patched".as_slice()));
    }
}
