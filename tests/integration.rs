mod common;

use craftpdf::{
    DocConfig, Document, GcLevel, Obj, ObjId, PageOption, PageSize, ParsedPdf, PdfError,
    SeededRng,
};
use pretty_assertions::assert_eq;

use common::ttf::minimal_ttf;

fn basic_doc() -> Document {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc
}

#[test]
fn empty_document_structure() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    let bytes = doc.save().unwrap();

    assert!(bytes.starts_with(b"%PDF-1.7\n"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let parsed = ParsedPdf::parse(&bytes).unwrap();
    // trailer /Size is one more than the number of emitted objects
    let size = parsed.trailer.get("Size").and_then(Obj::as_int).unwrap();
    assert_eq!(size as usize, parsed.object_count() + 1);
    assert!(parsed.trailer.get("Encrypt").is_none());
    assert!(parsed.trailer.get("Root").is_some());
    assert!(parsed.trailer.get("ID").is_some());

    let pages = parsed.pages().unwrap();
    assert_eq!(pages.len(), 1);
    assert!((pages[0].width() - PageSize::A4.width).abs() < 0.01);
}

#[test]
fn chosen_version_lands_in_header() {
    let mut doc = Document::new();
    doc.start(DocConfig {
        version: "1.4".to_string(),
        ..DocConfig::default()
    });
    doc.add_page().unwrap();
    let bytes = doc.save().unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4\n"));
}

#[test]
fn seeded_rng_gives_identical_bytes() {
    let build = || {
        let mut doc = basic_doc();
        doc.set_rng(Box::new(SeededRng::new(99)));
        doc.add_page().unwrap();
        doc.add_ttf_font("Test", "", minimal_ttf()).unwrap();
        doc.set_font("Test", "", 12.0).unwrap();
        doc.cell(None, "AB").unwrap();
        doc.save().unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn round_trip_preserves_page_count_and_shapes() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    doc.line(10.0, 10.0, 200.0, 10.0).unwrap();
    doc.rectangle(20.0, 30.0, 120.0, 80.0, "FD", 0.0, 0).unwrap();
    doc.oval(10.0, 100.0, 60.0, 150.0, "D").unwrap();
    doc.add_page_with_option(PageOption {
        page_size: Some(PageSize::LETTER),
        ..PageOption::default()
    })
    .unwrap();
    doc.polygon(&[(10.0, 10.0), (50.0, 10.0), (30.0, 40.0)], "F")
        .unwrap();

    let bytes = doc.save().unwrap();
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let pages = parsed.pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert!((pages[1].width() - PageSize::LETTER.width).abs() < 0.01);

    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    assert!(content.contains(" re\nB\n"));
    assert!(content.contains(" m\n"));
    // the oval approximates with four cubics
    assert_eq!(content.matches(" c\n").count(), 4);

    let content2 = String::from_utf8(parsed.page_content(&pages[1]).unwrap()).unwrap();
    assert!(content2.contains("h\nf\n"));
}

#[test]
fn page_rotation_serialized() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    doc.set_page_rotation(1, 90).unwrap();
    assert!(matches!(
        doc.set_page_rotation(1, 45),
        Err(PdfError::UnsupportedRotation(45))
    ));
    let bytes = doc.save().unwrap();
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let page = &parsed.pages().unwrap()[0];
    assert_eq!(page.rotation, 90);
    assert_eq!(page.dict.get("Rotate").and_then(Obj::as_int), Some(90));
}

#[test]
fn delete_page_then_compact() {
    let mut doc = basic_doc();
    for _ in 0..3 {
        doc.add_page().unwrap();
    }
    doc.delete_page(2).unwrap();
    assert_eq!(doc.page_count(), 2);

    // the old page's two slots are typed Null placeholders
    let nulls = (0..6)
        .filter(|i| matches!(doc.get_obj(ObjId::from_index(*i)), Some(Obj::Null)))
        .count();
    assert_eq!(nulls, 2);

    let removed = doc.garbage_collect(GcLevel::Compact).unwrap();
    assert_eq!(removed, 2);

    let bytes = doc.save().unwrap();
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    assert_eq!(parsed.pages().unwrap().len(), 2);
}

#[test]
fn incremental_save_appends() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    let extra = doc.add_obj(Obj::Integer(41));
    let original = doc.save().unwrap();

    doc.replace_obj(extra, Obj::Integer(42)).unwrap();
    let updated = doc.save_incremental(&original, &[extra]).unwrap();

    assert!(updated.starts_with(&original[..original.len() - 1]));
    let tail = &updated[original.len()..];
    let tail_str = String::from_utf8_lossy(tail);
    assert!(tail_str.contains("obj"));
    assert!(tail_str.contains("42"));
    assert!(tail_str.contains("/Prev"));
    assert!(tail_str.trim_end().ends_with("%%EOF"));

    // the last-version view of the object is the mutated state
    let parsed = ParsedPdf::parse(&updated).unwrap();
    assert_eq!(
        parsed.object(extra.ref_no() as u32).and_then(Obj::as_int),
        Some(42)
    );
}

#[test]
fn incremental_save_requires_valid_original() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    let id = doc.add_obj(Obj::Integer(1));
    let _ = doc.save().unwrap();
    let err = doc.save_incremental(b"not a pdf at all", &[id]);
    assert!(matches!(err, Err(PdfError::IncrementalInvalid(_))));
}

#[test]
fn stream_objects_round_trip_plaintext() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    let id = doc.add_obj(Obj::Null);
    doc.set_stream(id, craftpdf::Dict::new(), b"payload bytes".to_vec())
        .unwrap();
    assert_eq!(doc.get_stream(id), Some(b"payload bytes".as_slice()));
}

#[test]
fn transparency_emits_extgstate() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    doc.set_transparency(0.5, craftpdf::BlendMode::Multiply)
        .unwrap();
    doc.rectangle(0.0, 0.0, 10.0, 10.0, "F", 0.0, 0).unwrap();
    let bytes = doc.save().unwrap();
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    assert!(content.contains("/GS0 gs"));
    let res = pages[0].resources.get("ExtGState").unwrap();
    assert!(res.as_dict().unwrap().contains_key("GS0"));
}

#[test]
fn links_survive_serialization() {
    let mut doc = basic_doc();
    doc.add_page().unwrap();
    doc.add_link(10.0, 10.0, 100.0, 20.0, "https://example.com")
        .unwrap();
    let bytes = doc.save().unwrap();
    let links = craftpdf::extract_links(&bytes).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].uri, "https://example.com");
    assert_eq!(links[0].page, 0);
}
