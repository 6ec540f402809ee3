use craftpdf::{
    convert_color_operators, recompress_images, ColorTarget, DocConfig, Document, Obj,
    ParsedPdf, RecompressFormat, RecompressOptions,
};
use pretty_assertions::assert_eq;

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90);
    encoder.encode_image(&img).unwrap();
    out
}

fn pdf_with_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let img = doc.add_image_from_bytes(&jpeg_bytes(width, height)).unwrap();
    doc.image(img, 10.0, 10.0, Some((100.0, 50.0))).unwrap();
    doc.save().unwrap()
}

#[test]
fn jpeg_passes_through_as_dct() {
    let bytes = pdf_with_jpeg(200, 100);
    let images = craftpdf::extract_images(&bytes).unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].width, 200);
    assert_eq!(images[0].height, 100);
    assert_eq!(images[0].filter, "DCTDecode");
    // stored payload is the original JPEG
    assert!(images[0].data.starts_with(&[0xFF, 0xD8]));
}

#[test]
fn image_dedup_reuses_the_xobject() {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let jpg = jpeg_bytes(20, 20);
    let a = doc.add_image_from_bytes(&jpg).unwrap();
    let b = doc.add_image_from_bytes(&jpg).unwrap();
    assert_eq!(a, b);
    doc.image(a, 0.0, 0.0, None).unwrap();
    doc.image(b, 30.0, 0.0, None).unwrap();
    let bytes = doc.save().unwrap();
    assert_eq!(craftpdf::extract_images(&bytes).unwrap().len(), 1);
}

#[test]
fn recompress_downscales_to_bounds() {
    let bytes = pdf_with_jpeg(200, 100);
    let (out, modified) = recompress_images(
        &bytes,
        &RecompressOptions {
            jpeg_quality: 50,
            max_width: Some(50),
            max_height: Some(50),
            format: RecompressFormat::Jpeg,
        },
    )
    .unwrap();
    assert_eq!(modified, 1);

    let parsed = ParsedPdf::parse(&out).unwrap();
    assert_eq!(parsed.pages().unwrap().len(), 1);
    let images = craftpdf::extract_images(&out).unwrap();
    assert_eq!(images.len(), 1);
    assert!(images[0].width <= 50);
    assert!(images[0].height <= 50);

    // every reference in the rewritten file must still resolve
    for (no, _) in parsed.object_numbers() {
        if let Some(Obj::Dictionary(dict)) = parsed.object(no) {
            for (_, v) in dict.iter() {
                if let Obj::Reference(id) = v {
                    assert!(parsed.object(id.ref_no() as u32).is_some());
                }
            }
        }
    }
}

#[test]
fn recompress_to_flate_keeps_page_count() {
    let bytes = pdf_with_jpeg(64, 64);
    let (out, modified) = recompress_images(
        &bytes,
        &RecompressOptions {
            format: RecompressFormat::Flate,
            ..RecompressOptions::default()
        },
    )
    .unwrap();
    assert_eq!(modified, 1);
    let parsed = ParsedPdf::parse(&out).unwrap();
    assert_eq!(parsed.pages().unwrap().len(), 1);
    let images = craftpdf::extract_images(&out).unwrap();
    assert_eq!(images[0].filter, "FlateDecode");
}

#[test]
fn parse_recovers_from_corrupt_startxref() {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    doc.line(0.0, 0.0, 10.0, 10.0).unwrap();
    let mut bytes = doc.save().unwrap();

    let pos = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    for b in &mut bytes[pos + 10..pos + 13] {
        *b = b'8';
    }

    // tolerant mode rebuilds the table by scanning
    let parsed = ParsedPdf::parse(&bytes).unwrap();
    assert!(!parsed.warnings.is_empty());
    assert_eq!(parsed.pages().unwrap().len(), 1);
}

#[test]
fn garbage_input_is_rejected() {
    assert!(ParsedPdf::parse(b"this is not a pdf").is_err());
    assert!(ParsedPdf::parse(&[]).is_err());
}

#[test]
fn color_operators_convert_to_gray() {
    let mut doc = Document::new();
    doc.start(DocConfig {
        compress: false,
        ..DocConfig::default()
    });
    doc.add_page().unwrap();
    doc.set_fill_color_rgb(255, 0, 0).unwrap();
    doc.set_stroke_color_cmyk(0.0, 0.0, 0.0, 1.0).unwrap();
    doc.rectangle(0.0, 0.0, 10.0, 10.0, "FD", 0.0, 0).unwrap();
    let bytes = doc.save().unwrap();

    let gray = convert_color_operators(&bytes, ColorTarget::Gray).unwrap();
    let parsed = ParsedPdf::parse(&gray).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    assert!(!content.contains("rg"));
    assert!(!content.contains(" K"));
    assert!(content.contains("0.299 g"));
    assert!(content.contains("0 G"));
    // geometry is untouched
    assert!(content.contains(" re"));
}

#[test]
fn color_operators_convert_to_cmyk() {
    let mut doc = Document::new();
    doc.start(DocConfig {
        compress: false,
        ..DocConfig::default()
    });
    doc.add_page().unwrap();
    doc.set_fill_color_rgb(0, 0, 255).unwrap();
    doc.rectangle(0.0, 0.0, 10.0, 10.0, "F", 0.0, 0).unwrap();
    let bytes = doc.save().unwrap();

    let cmyk = convert_color_operators(&bytes, ColorTarget::Cmyk).unwrap();
    let parsed = ParsedPdf::parse(&cmyk).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    assert!(content.contains("1 1 0 0 k"));
}

#[test]
fn imported_template_is_a_form_xobject() {
    // source document with one line
    let mut src = Document::new();
    src.start(DocConfig::default());
    src.add_page().unwrap();
    src.line(10.0, 10.0, 100.0, 100.0).unwrap();
    let src_bytes = src.save().unwrap();

    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let tpl = doc.import_page_as_template(&src_bytes, 0).unwrap();
    doc.use_imported_template(tpl, 0.0, 0.0, 297.64, 420.94).unwrap();
    let bytes = doc.save().unwrap();

    let parsed = ParsedPdf::parse(&bytes).unwrap();
    let pages = parsed.pages().unwrap();
    let content = String::from_utf8(parsed.page_content(&pages[0]).unwrap()).unwrap();
    assert!(content.contains("/TPL0 Do"));
    assert!(content.contains("0.5 0 0 0.5")); // scaled to half size

    // the form XObject itself resolves and carries a BBox
    let xobj = pages[0]
        .resources
        .get("XObject")
        .and_then(Obj::as_dict)
        .and_then(|d| d.get("TPL0"))
        .map(|o| parsed.resolve(o))
        .and_then(Obj::as_stream)
        .expect("template stream missing");
    assert_eq!(
        xobj.dict.get("Subtype").and_then(Obj::as_name),
        Some("Form")
    );
    assert!(xobj.dict.get("BBox").is_some());
}

#[test]
fn prev_chain_is_merged() {
    let mut doc = Document::new();
    doc.start(DocConfig::default());
    doc.add_page().unwrap();
    let marker = doc.add_obj(Obj::Integer(1));
    let original = doc.save().unwrap();
    doc.replace_obj(marker, Obj::Integer(2)).unwrap();
    let updated = doc.save_incremental(&original, &[marker]).unwrap();

    let parsed = ParsedPdf::parse(&updated).unwrap();
    // objects from the base revision resolve too
    assert_eq!(parsed.pages().unwrap().len(), 1);
    assert_eq!(
        parsed.object(marker.ref_no() as u32).and_then(Obj::as_int),
        Some(2)
    );
}
