//! Glyph subsetting for embedded TrueType fonts.
//!
//! The subset keeps the original glyph numbering: unused GIDs become
//! zero-length `glyf` entries, which lets the CIDFontType2 use the
//! Identity CID→GID mapping without a remap table. Composite glyphs
//! pull their components into the subset transitively.

use std::collections::BTreeSet;

use crate::errors::{PdfError, Result};
use crate::font::{be_i16, be_u16, TtfFont};

// component glyph flags
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

/// Expands `gids` with all composite dependencies
pub(crate) fn close_over_composites(ttf: &TtfFont, gids: &BTreeSet<u16>) -> Result<BTreeSet<u16>> {
    let mut closed = gids.clone();
    closed.insert(0);
    let mut worklist: Vec<u16> = closed.iter().copied().collect();
    while let Some(gid) = worklist.pop() {
        let Some(data) = ttf.glyph_data(gid) else {
            continue;
        };
        let contours = be_i16(data, 0)?;
        if contours >= 0 {
            continue;
        }
        // composite: walk component records
        let mut offset = 10;
        loop {
            let flags = be_u16(data, offset)?;
            let component = be_u16(data, offset + 2)?;
            if closed.insert(component) {
                worklist.push(component);
            }
            offset += 4;
            offset += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
            if flags & WE_HAVE_A_SCALE != 0 {
                offset += 2;
            } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
                offset += 4;
            } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
                offset += 8;
            }
            if flags & MORE_COMPONENTS == 0 {
                break;
            }
        }
    }
    Ok(closed)
}

/// Builds a complete TrueType file containing only the glyphs in
/// `used_gids` (plus composite dependencies), with original numbering.
pub(crate) fn subset_font(ttf: &TtfFont, used_gids: &BTreeSet<u16>) -> Result<Vec<u8>> {
    if ttf.table(b"glyf").is_none() || ttf.loca.is_empty() {
        return Err(PdfError::FontParse(
            "font has no glyf/loca tables, cannot subset".to_string(),
        ));
    }
    let keep = close_over_composites(ttf, used_gids)?;

    // sparse glyf + loca (always long format in the subset)
    let mut glyf = Vec::new();
    let mut loca: Vec<u32> = Vec::with_capacity(ttf.num_glyphs as usize + 1);
    loca.push(0);
    for gid in 0..ttf.num_glyphs {
        if keep.contains(&gid) {
            if let Some(data) = ttf.glyph_data(gid) {
                glyf.extend_from_slice(data);
                if glyf.len() % 2 == 1 {
                    glyf.push(0);
                }
            }
        }
        loca.push(glyf.len() as u32);
    }
    let mut loca_bytes = Vec::with_capacity(loca.len() * 4);
    for v in &loca {
        loca_bytes.extend_from_slice(&v.to_be_bytes());
    }

    let mut head = ttf
        .table(b"head")
        .ok_or_else(|| PdfError::FontParse("missing head".to_string()))?
        .to_vec();
    // zero checksumAdjustment, force long loca
    head[8..12].fill(0);
    head[50] = 0;
    head[51] = 1;

    let mut tables: Vec<([u8; 4], Vec<u8>)> = Vec::new();
    tables.push((*b"head", head));
    for tag in [b"hhea", b"maxp"] {
        tables.push((
            *tag,
            ttf.table(tag)
                .ok_or_else(|| {
                    PdfError::FontParse(format!(
                        "missing table {}",
                        String::from_utf8_lossy(tag)
                    ))
                })?
                .to_vec(),
        ));
    }
    for tag in [b"cvt ", b"prep", b"fpgm"] {
        if let Some(data) = ttf.table(tag) {
            tables.push((*tag, data.to_vec()));
        }
    }
    tables.push((
        *b"hmtx",
        ttf.table(b"hmtx")
            .ok_or_else(|| PdfError::FontParse("missing hmtx".to_string()))?
            .to_vec(),
    ));
    tables.push((*b"loca", loca_bytes));
    tables.push((*b"glyf", glyf));
    // keep the kerning pairs the content stream's TJ adjustments use
    if let Some(data) = ttf.table(b"kern") {
        tables.push((*b"kern", data.to_vec()));
    }

    Ok(assemble(tables))
}

/// Writes the offset subtable, directory and table data with correct
/// checksums and the recomputed `head.checksumAdjustment`
fn assemble(mut tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    // directory entries must be sorted by tag
    tables.sort_by_key(|(tag, _)| *tag);
    let n = tables.len() as u16;
    let entry_selector = 15 - n.leading_zeros() as u16; // floor(log2 n)
    let search_range = 16 * (1 << entry_selector);
    let range_shift = 16 * n - search_range;

    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&n.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for (tag, data) in &tables {
        let mut padded = data.clone();
        while padded.len() % 4 != 0 {
            padded.push(0);
        }
        out.extend_from_slice(tag);
        out.extend_from_slice(&table_checksum(&padded).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        if tag == b"head" {
            head_offset = Some(offset);
        }
        offset += padded.len();
    }
    for (_, data) in &tables {
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    if let Some(head_offset) = head_offset {
        let file_sum = table_checksum(&out);
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(file_sum);
        out[head_offset + 8..head_offset + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}

fn table_checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_be_bytes(word));
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::minimal_ttf;

    #[test]
    fn composite_closure_pulls_components() {
        let ttf = TtfFont::parse(minimal_ttf()).unwrap();
        // glyph 2 is a composite referencing glyph 1
        let mut gids = BTreeSet::new();
        gids.insert(2u16);
        let closed = close_over_composites(&ttf, &gids).unwrap();
        assert!(closed.contains(&0));
        assert!(closed.contains(&1));
        assert!(closed.contains(&2));
    }

    #[test]
    fn subset_is_reparsable() {
        let ttf = TtfFont::parse(minimal_ttf()).unwrap();
        let mut gids = BTreeSet::new();
        gids.insert(1u16);
        let bytes = subset_font(&ttf, &gids).unwrap();
        let reparsed = TtfFont::parse(bytes).unwrap();
        assert_eq!(reparsed.num_glyphs, ttf.num_glyphs);
        assert_eq!(reparsed.units_per_em, 1000);
        // kept glyph still has outline data, and the advance table survives
        assert!(reparsed.glyph_data(1).is_some());
        assert_eq!(reparsed.advance(1), 500);
    }

    #[test]
    fn unused_glyphs_are_empty_in_subset() {
        let ttf = TtfFont::parse(minimal_ttf()).unwrap();
        let mut gids = BTreeSet::new();
        gids.insert(1u16);
        let bytes = subset_font(&ttf, &gids).unwrap();
        let reparsed = TtfFont::parse(bytes).unwrap();
        // glyph 2 was not requested and is not a dependency of glyph 1
        assert!(reparsed.glyph_data(2).is_none());
    }

    #[test]
    fn subset_carries_kerning_pairs() {
        let ttf = TtfFont::parse(minimal_ttf()).unwrap();
        let mut gids = BTreeSet::new();
        gids.insert(1u16);
        gids.insert(2u16);
        let bytes = subset_font(&ttf, &gids).unwrap();
        let reparsed = TtfFont::parse(bytes).unwrap();
        assert_eq!(reparsed.kern.get(&(1, 2)), Some(&-50));
    }

    #[test]
    fn subset_keeps_composite_dependencies() {
        let ttf = TtfFont::parse(minimal_ttf()).unwrap();
        let mut gids = BTreeSet::new();
        gids.insert(2u16);
        let bytes = subset_font(&ttf, &gids).unwrap();
        let reparsed = TtfFont::parse(bytes).unwrap();
        assert!(reparsed.glyph_data(1).is_some());
        assert!(reparsed.glyph_data(2).is_some());
    }

    #[test]
    fn checksum_padding() {
        assert_eq!(table_checksum(&[0, 0, 0, 1]), 1);
        assert_eq!(table_checksum(&[0, 0, 0, 1, 0, 0, 0, 2]), 3);
        // short chunk is zero-padded on the right
        assert_eq!(table_checksum(&[1]), 0x0100_0000);
    }
}
