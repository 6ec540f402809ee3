//! Builds a tiny but complete TrueType font in memory, so font tests
//! do not depend on binary fixtures.
//!
//! Layout: three glyphs (.notdef, a triangle mapped to 'A', and a
//! composite mapped to 'B' that references glyph 1), cmap format 4,
//! 1000 units per em, every advance 500, one kerning pair (1, 2) → -50.

fn be16(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

fn be32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn head_table() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&be32(0x0001_0000)); // version
    t.extend_from_slice(&be32(0x0001_0000)); // fontRevision
    t.extend_from_slice(&be32(0)); // checkSumAdjustment
    t.extend_from_slice(&be32(0x5F0F_3CF5)); // magicNumber
    t.extend_from_slice(&be16(0)); // flags
    t.extend_from_slice(&be16(1000)); // unitsPerEm
    t.extend_from_slice(&[0u8; 16]); // created + modified
    t.extend_from_slice(&be16(0)); // xMin
    t.extend_from_slice(&(-200i16).to_be_bytes()); // yMin
    t.extend_from_slice(&be16(500)); // xMax
    t.extend_from_slice(&be16(800)); // yMax
    t.extend_from_slice(&be16(0)); // macStyle
    t.extend_from_slice(&be16(8)); // lowestRecPPEM
    t.extend_from_slice(&be16(2)); // fontDirectionHint
    t.extend_from_slice(&be16(0)); // indexToLocFormat = short
    t.extend_from_slice(&be16(0)); // glyphDataFormat
    t
}

fn hhea_table() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&be32(0x0001_0000));
    t.extend_from_slice(&800i16.to_be_bytes()); // ascent
    t.extend_from_slice(&(-200i16).to_be_bytes()); // descent
    t.extend_from_slice(&200i16.to_be_bytes()); // lineGap
    t.extend_from_slice(&be16(500)); // advanceWidthMax
    t.extend_from_slice(&[0u8; 6]); // min side bearings, xMaxExtent
    t.extend_from_slice(&1i16.to_be_bytes()); // caretSlopeRise
    t.extend_from_slice(&[0u8; 12]); // slope run, offset, reserved
    t.extend_from_slice(&be16(0)); // metricDataFormat
    t.extend_from_slice(&be16(3)); // numberOfHMetrics
    t
}

fn maxp_table() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&be32(0x0001_0000));
    t.extend_from_slice(&be16(3)); // numGlyphs
    t.extend_from_slice(&[0u8; 26]);
    t
}

fn hmtx_table() -> Vec<u8> {
    let mut t = Vec::new();
    for _ in 0..3 {
        t.extend_from_slice(&be16(500)); // advance
        t.extend_from_slice(&be16(0)); // lsb
    }
    t
}

fn cmap_table() -> Vec<u8> {
    let mut sub = Vec::new();
    sub.extend_from_slice(&be16(4)); // format
    sub.extend_from_slice(&be16(32)); // length
    sub.extend_from_slice(&be16(0)); // language
    sub.extend_from_slice(&be16(4)); // segCountX2
    sub.extend_from_slice(&be16(4)); // searchRange
    sub.extend_from_slice(&be16(1)); // entrySelector
    sub.extend_from_slice(&be16(0)); // rangeShift
    sub.extend_from_slice(&be16(0x42)); // endCode seg 0 ('B')
    sub.extend_from_slice(&be16(0xFFFF)); // endCode seg 1
    sub.extend_from_slice(&be16(0)); // reservedPad
    sub.extend_from_slice(&be16(0x41)); // startCode seg 0 ('A')
    sub.extend_from_slice(&be16(0xFFFF)); // startCode seg 1
    sub.extend_from_slice(&be16(0xFFC0)); // idDelta: 0x41 + 0xFFC0 ≡ 1
    sub.extend_from_slice(&be16(1)); // idDelta seg 1
    sub.extend_from_slice(&be16(0)); // idRangeOffset seg 0
    sub.extend_from_slice(&be16(0)); // idRangeOffset seg 1

    let mut t = Vec::new();
    t.extend_from_slice(&be16(0)); // version
    t.extend_from_slice(&be16(1)); // numSubtables
    t.extend_from_slice(&be16(3)); // platform: Microsoft
    t.extend_from_slice(&be16(1)); // encoding: Unicode BMP
    t.extend_from_slice(&be32(12)); // offset
    t.extend_from_slice(&sub);
    t
}

fn glyf_and_loca() -> (Vec<u8>, Vec<u8>) {
    // glyph 1: one triangle contour
    let mut g1 = Vec::new();
    g1.extend_from_slice(&1i16.to_be_bytes()); // numberOfContours
    g1.extend_from_slice(&0i16.to_be_bytes()); // xMin
    g1.extend_from_slice(&0i16.to_be_bytes()); // yMin
    g1.extend_from_slice(&500i16.to_be_bytes()); // xMax
    g1.extend_from_slice(&700i16.to_be_bytes()); // yMax
    g1.extend_from_slice(&be16(2)); // endPtsOfContours
    g1.extend_from_slice(&be16(0)); // instructionLength
    g1.extend_from_slice(&[0x01, 0x01, 0x01]); // flags: on-curve
    for dx in [0i16, 250, 250] {
        g1.extend_from_slice(&dx.to_be_bytes());
    }
    for dy in [0i16, 700, -700] {
        g1.extend_from_slice(&dy.to_be_bytes());
    }
    if g1.len() % 2 == 1 {
        g1.push(0);
    }

    // glyph 2: composite referencing glyph 1, args are 16-bit xy offsets
    let mut g2 = Vec::new();
    g2.extend_from_slice(&(-1i16).to_be_bytes()); // numberOfContours
    g2.extend_from_slice(&0i16.to_be_bytes());
    g2.extend_from_slice(&0i16.to_be_bytes());
    g2.extend_from_slice(&500i16.to_be_bytes());
    g2.extend_from_slice(&700i16.to_be_bytes());
    g2.extend_from_slice(&be16(0x0003)); // ARG_1_AND_2_ARE_WORDS | XY_VALUES
    g2.extend_from_slice(&be16(1)); // component glyph index
    g2.extend_from_slice(&0i16.to_be_bytes()); // dx
    g2.extend_from_slice(&0i16.to_be_bytes()); // dy

    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    loca.extend_from_slice(&be16(0)); // glyph 0 start (empty)
    loca.extend_from_slice(&be16(0)); // glyph 1 start
    glyf.extend_from_slice(&g1);
    loca.extend_from_slice(&be16((glyf.len() / 2) as u16)); // glyph 2 start
    glyf.extend_from_slice(&g2);
    if glyf.len() % 2 == 1 {
        glyf.push(0);
    }
    loca.extend_from_slice(&be16((glyf.len() / 2) as u16)); // end
    (glyf, loca)
}

fn name_table() -> Vec<u8> {
    let ps_name = b"TestFont";
    let mut t = Vec::new();
    t.extend_from_slice(&be16(0)); // format
    t.extend_from_slice(&be16(1)); // count
    t.extend_from_slice(&be16(18)); // stringOffset
    t.extend_from_slice(&be16(1)); // platform: Macintosh
    t.extend_from_slice(&be16(0)); // encoding
    t.extend_from_slice(&be16(0)); // language
    t.extend_from_slice(&be16(6)); // nameID: PostScript name
    t.extend_from_slice(&be16(ps_name.len() as u16));
    t.extend_from_slice(&be16(0)); // offset
    t.extend_from_slice(ps_name);
    t
}

fn post_table() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&be32(0x0003_0000)); // version 3: no glyph names
    t.extend_from_slice(&be32(0)); // italicAngle
    t.extend_from_slice(&[0u8; 24]);
    t
}

fn kern_table() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&be16(0)); // version
    t.extend_from_slice(&be16(1)); // nTables
    t.extend_from_slice(&be16(0)); // subtable version
    t.extend_from_slice(&be16(20)); // length
    t.extend_from_slice(&be16(0x0001)); // coverage: horizontal, format 0
    t.extend_from_slice(&be16(1)); // nPairs
    t.extend_from_slice(&be16(6)); // searchRange
    t.extend_from_slice(&be16(0)); // entrySelector
    t.extend_from_slice(&be16(0)); // rangeShift
    t.extend_from_slice(&be16(1)); // left
    t.extend_from_slice(&be16(2)); // right
    t.extend_from_slice(&(-50i16).to_be_bytes()); // value
    t
}

/// A complete three-glyph TrueType font
pub fn minimal_ttf() -> Vec<u8> {
    let (glyf, loca) = glyf_and_loca();
    let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap_table()),
        (*b"glyf", glyf),
        (*b"head", head_table()),
        (*b"hhea", hhea_table()),
        (*b"hmtx", hmtx_table()),
        (*b"kern", kern_table()),
        (*b"loca", loca),
        (*b"maxp", maxp_table()),
        (*b"name", name_table()),
        (*b"post", post_table()),
    ];
    tables.sort_by_key(|(tag, _)| *tag);

    let n = tables.len() as u16;
    let entry_selector = 15 - n.leading_zeros() as u16;
    let search_range = 16u16 * (1 << entry_selector);

    let mut out = Vec::new();
    out.extend_from_slice(&be32(0x0001_0000));
    out.extend_from_slice(&be16(n));
    out.extend_from_slice(&be16(search_range));
    out.extend_from_slice(&be16(entry_selector));
    out.extend_from_slice(&be16(16 * n - search_range));

    let mut offset = 12 + tables.len() * 16;
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&be32(0)); // checksum unchecked by the parser
        out.extend_from_slice(&be32(offset as u32));
        out.extend_from_slice(&be32(data.len() as u32));
        offset += (data.len() + 3) & !3;
    }
    for (_, data) in &tables {
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    out
}
