mod common;

use craftpdf::{
    extract_text_from_page, DocConfig, Document, Obj, ParsedPdf, TtfFont, ToUnicodeCMap,
};
use pretty_assertions::assert_eq;

use common::ttf::minimal_ttf;

fn doc_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
    doc.set_font("Test", "", 14.0).unwrap();
    doc.set_xy(50.0, 50.0);
    doc.cell(None, text).unwrap();
    doc.save().unwrap()
}

#[test]
fn embedded_font_chain_is_complete() {
    let bytes = doc_with_text("AB");
    let parsed = ParsedPdf::parse(&bytes).unwrap();

    let mut type0 = None;
    let mut cid = None;
    let mut descriptor = None;
    for (no, _) in parsed.object_numbers() {
        let Some(dict) = parsed.object(no).and_then(Obj::as_dict) else {
            continue;
        };
        match dict.get("Subtype").and_then(Obj::as_name) {
            Some("Type0") => type0 = Some(dict.clone()),
            Some("CIDFontType2") => cid = Some(dict.clone()),
            _ => {}
        }
        if dict.get("Type").and_then(Obj::as_name) == Some("FontDescriptor") {
            descriptor = Some(dict.clone());
        }
    }

    let type0 = type0.expect("no Type0 font emitted");
    assert_eq!(
        type0.get("Encoding").and_then(Obj::as_name),
        Some("Identity-H")
    );
    assert!(type0.get("ToUnicode").is_some());

    let cid = cid.expect("no CIDFontType2 emitted");
    assert_eq!(
        cid.get("CIDToGIDMap").and_then(Obj::as_name),
        Some("Identity")
    );
    let base_font = cid.get("BaseFont").and_then(Obj::as_name).unwrap();
    // six uppercase letters, a plus, then the PostScript name
    assert_eq!(&base_font[6..7], "+");
    assert!(base_font[..6].chars().all(|c| c.is_ascii_uppercase()));
    assert!(base_font.ends_with("TestFont"));
    let sysinfo = cid.get("CIDSystemInfo").unwrap().as_dict().unwrap();
    assert_eq!(
        sysinfo.get("Registry").and_then(Obj::as_string),
        Some(b"Adobe".as_slice())
    );

    let descriptor = descriptor.expect("no FontDescriptor emitted");
    assert!(descriptor.get("FontFile2").is_some());
    assert_eq!(descriptor.get("Ascent").and_then(Obj::as_int), Some(800));
    assert_eq!(descriptor.get("Descent").and_then(Obj::as_int), Some(-200));
}

#[test]
fn font_file_is_a_valid_subset() {
    let bytes = doc_with_text("A");
    let parsed = ParsedPdf::parse(&bytes).unwrap();

    for (no, _) in parsed.object_numbers() {
        let Some(stream) = parsed.object(no).and_then(Obj::as_stream) else {
            continue;
        };
        if !stream.dict.contains_key("Length1") {
            continue;
        }
        let font_bytes = parsed.decode_stream(stream).unwrap();
        assert_eq!(
            stream.dict.get("Length1").and_then(Obj::as_int),
            Some(font_bytes.len() as i64)
        );
        let subset = TtfFont::parse(font_bytes).unwrap();
        assert_eq!(subset.num_glyphs, 3);
        // glyph 1 ('A') kept, glyph 2 ('B') unused and empty
        assert!(subset.glyph_data(1).is_some());
        assert!(subset.glyph_data(2).is_none());
        return;
    }
    panic!("no FontFile2 stream found");
}

#[test]
fn tj_string_decodes_through_tounicode() {
    let bytes = doc_with_text("AB");
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();

    // glyphs 1 and 2 as 2-byte big-endian GIDs
    assert!(content.contains("<00010002> Tj"));

    // and the ToUnicode CMap maps them back to the original text
    let font_res = pages[0].resources.get("Font").unwrap().as_dict().unwrap();
    let (_, font_ref) = font_res.iter().next().unwrap();
    let font = parsed.resolve(font_ref).as_dict().unwrap();
    let cmap_stream = parsed
        .resolve(font.get("ToUnicode").unwrap())
        .as_stream()
        .unwrap();
    let cmap_src = String::from_utf8(parsed.decode_stream(cmap_stream).unwrap()).unwrap();
    let cmap = ToUnicodeCMap::parse(&cmap_src);
    assert_eq!(cmap.decode_bytes(&[0, 1, 0, 2]), "AB");
}

#[test]
fn extracted_text_matches_input() {
    let bytes = doc_with_text("ABBA");
    assert_eq!(extract_text_from_page(&bytes, 0).unwrap(), "ABBA");
}

#[test]
fn positioned_extraction_reports_font_and_size() {
    let bytes = doc_with_text("AB");
    let runs = craftpdf::extract_page_text(&bytes, 0).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].text, "AB");
    assert_eq!(runs[0].size, 14.0);
    assert!(runs[0].font.ends_with("TestFont"));
    // x as placed, y flipped to PDF space below the top margin
    assert_eq!(runs[0].x, 50.0);
    assert!(runs[0].y < 842.0 - 50.0);
}

#[test]
fn kerning_pairs_emit_tj_adjustments() {
    let mut doc = Document::new();
    doc.start(DocConfig {
        use_kerning: true,
        ..DocConfig::default()
    });
    doc.add_page().unwrap();
    doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
    doc.set_font("Test", "", 10.0).unwrap();
    doc.cell(None, "AB").unwrap();
    let bytes = doc.save().unwrap();

    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    // the (1, 2) pair kerns -50/1000 em, negated per TJ convention
    assert!(content.contains("[<0001> 50 <0002>] TJ"));
}

#[test]
fn fonts_are_deduplicated_by_family_and_style() {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let a = doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
    let b = doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
    let c = doc.add_ttf_font("Test", "B", minimal_ttf()).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn extract_fonts_reports_embedding() {
    let bytes = doc_with_text("A");
    let fonts = craftpdf::extract_fonts(&bytes).unwrap();
    // Type0 + CIDFontType2 both carry /Type /Font
    assert_eq!(fonts.len(), 2);
    assert!(fonts.iter().any(|f| f.subtype == "Type0"));
    assert!(fonts
        .iter()
        .all(|f| f.embedded && f.base_font.ends_with("TestFont")));
}
