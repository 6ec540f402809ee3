//! TrueType font loading.
//!
//! Parses the tables needed for embedding (head, hhea, maxp, hmtx, cmap,
//! loca, glyf, name, post, OS/2, kern) directly from the font bytes.
//! Glyph selection is a plain codepoint → GID lookup through the cmap;
//! there is no shaping. Fonts accumulate the set of codepoints used by
//! the document so only referenced glyphs are embedded at save time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::warn;

use crate::errors::{PdfError, Result};

/// All fonts registered on a document, indexed by position. The index
/// doubles as the `/Fn` resource name in content streams.
#[derive(Debug, Default, Clone)]
pub struct FontList {
    entries: Vec<FontEntry>,
}

impl FontList {
    pub fn get(&self, idx: usize) -> Option<&FontEntry> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut FontEntry> {
        self.entries.get_mut(idx)
    }

    pub fn push(&mut self, entry: FontEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FontEntry)> {
        self.entries.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, family: &str, style: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.family == family && e.style == style)
    }
}

/// One embedded font family+style with its usage tracking
#[derive(Debug, Clone)]
pub struct FontEntry {
    pub family: String,
    pub style: String,
    pub(crate) ttf: TtfFont,
    /// every codepoint that appeared in a text item using this font
    pub(crate) used: BTreeSet<char>,
    pub kerning: bool,
}

impl FontEntry {
    pub fn new(family: impl Into<String>, style: impl Into<String>, ttf: TtfFont) -> Self {
        Self {
            family: family.into(),
            style: style.into(),
            ttf,
            used: BTreeSet::new(),
            kerning: false,
        }
    }

    /// Records the codepoints of `text` for subsetting
    pub(crate) fn track(&mut self, text: &str) {
        for c in text.chars() {
            self.used.insert(c);
        }
    }

    pub fn units_per_em(&self) -> u16 {
        self.ttf.units_per_em
    }

    /// Baseline offset from the top of the line, in font units
    pub fn ascent(&self) -> i16 {
        self.ttf.ascent
    }

    pub fn descent(&self) -> i16 {
        self.ttf.descent
    }

    /// Maps every char to a GID; unmapped codepoints become GID 0
    pub fn encode_str(&self, text: &str) -> Vec<u16> {
        text.chars()
            .map(|c| self.ttf.gid_for(c as u32).unwrap_or(0))
            .collect()
    }

    pub fn kern_between(&self, left: u16, right: u16) -> i16 {
        if !self.kerning {
            return 0;
        }
        self.ttf.kern.get(&(left, right)).copied().unwrap_or(0)
    }

    /// Width of `text` at `size` points, including char spacing and
    /// (when enabled) kerning
    pub fn text_width(&self, text: &str, size: f32, char_spacing: f32, kerning: bool) -> f32 {
        let upem = self.ttf.units_per_em as f32;
        let mut units = 0i64;
        let mut prev: Option<u16> = None;
        let mut count = 0usize;
        for c in text.chars() {
            let gid = self.ttf.gid_for(c as u32).unwrap_or(0);
            units += self.ttf.advance(gid) as i64;
            if kerning && self.kerning {
                if let Some(p) = prev {
                    units += self.ttf.kern.get(&(p, gid)).copied().unwrap_or(0) as i64;
                }
            }
            prev = Some(gid);
            count += 1;
        }
        units as f32 / upem * size + char_spacing * count.saturating_sub(1) as f32
    }

    /// GIDs needed for the used codepoints (without composite closure)
    pub(crate) fn used_gids(&self) -> BTreeSet<u16> {
        let mut gids: BTreeSet<u16> = self
            .used
            .iter()
            .filter_map(|c| self.ttf.gid_for(*c as u32))
            .collect();
        gids.insert(0);
        gids
    }

    /// True when the used text leaves the standard Roman repertoire;
    /// the FontDescriptor then carries the Symbolic flag instead of
    /// Nonsymbolic
    pub(crate) fn is_symbolic(&self) -> bool {
        self.used.iter().any(|c| !is_standard_roman(*c))
    }

    /// gid → codepoint mapping over the used set, for the ToUnicode CMap
    pub(crate) fn gid_to_unicode(&self) -> BTreeMap<u16, char> {
        let mut map = BTreeMap::new();
        for c in &self.used {
            if let Some(gid) = self.ttf.gid_for(*c as u32) {
                map.entry(gid).or_insert(*c);
            }
        }
        map
    }
}

/// Parsed TrueType tables. The raw bytes are kept alive for subsetting.
#[derive(Debug, Clone)]
pub struct TtfFont {
    pub(crate) data: Vec<u8>,
    tables: HashMap<[u8; 4], (usize, usize)>,
    pub units_per_em: u16,
    pub num_glyphs: u16,
    pub ascent: i16,
    pub descent: i16,
    pub line_gap: i16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    pub italic_angle: f32,
    pub cap_height: Option<i16>,
    pub post_script_name: String,
    advances: Vec<u16>,
    cmap: BTreeMap<u32, u16>,
    pub(crate) loca: Vec<u32>,
    pub(crate) kern: HashMap<(u16, u16), i16>,
}

impl TtfFont {
    pub fn parse(data: Vec<u8>) -> Result<TtfFont> {
        let sfnt = be_u32(&data, 0)?;
        if sfnt != 0x0001_0000 && sfnt != u32::from_be_bytes(*b"true") {
            if sfnt == u32::from_be_bytes(*b"OTTO") {
                return Err(PdfError::FontParse(
                    "CFF-flavoured OpenType is not supported".to_string(),
                ));
            }
            return Err(PdfError::FontParse(format!(
                "not a TrueType font (sfnt 0x{:08X})",
                sfnt
            )));
        }
        let num_tables = be_u16(&data, 4)? as usize;
        let mut tables = HashMap::with_capacity(num_tables);
        for i in 0..num_tables {
            let rec = 12 + i * 16;
            let tag: [u8; 4] = data
                .get(rec..rec + 4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| PdfError::FontParse("table record out of bounds".to_string()))?;
            let offset = be_u32(&data, rec + 8)? as usize;
            let len = be_u32(&data, rec + 12)? as usize;
            if offset.checked_add(len).map_or(true, |end| end > data.len()) {
                return Err(PdfError::FontParse(format!(
                    "table {} exceeds file",
                    String::from_utf8_lossy(&tag)
                )));
            }
            tables.insert(tag, (offset, len));
        }

        let head = table_slice(&data, &tables, b"head")?;
        let units_per_em = be_u16(head, 18)?;
        let x_min = be_i16(head, 36)?;
        let y_min = be_i16(head, 38)?;
        let x_max = be_i16(head, 40)?;
        let y_max = be_i16(head, 42)?;
        let index_to_loc_long = be_i16(head, 50)? == 1;

        let maxp = table_slice(&data, &tables, b"maxp")?;
        let num_glyphs = be_u16(maxp, 4)?;

        let hhea = table_slice(&data, &tables, b"hhea")?;
        let ascent = be_i16(hhea, 4)?;
        let descent = be_i16(hhea, 6)?;
        let line_gap = be_i16(hhea, 8)?;
        let num_h_metrics = be_u16(hhea, 34)?;

        let hmtx = table_slice(&data, &tables, b"hmtx")?;
        let mut advances = Vec::with_capacity(num_glyphs as usize);
        let mut last = 0u16;
        for gid in 0..num_glyphs {
            if gid < num_h_metrics {
                last = be_u16(hmtx, gid as usize * 4)?;
            }
            advances.push(last);
        }

        // subsets we re-read have no cmap; a present but unusable one
        // is still an error
        let cmap = match tables.get(b"cmap") {
            Some(_) => parse_cmap(table_slice(&data, &tables, b"cmap")?)?,
            None => BTreeMap::new(),
        };

        let loca = match tables.get(b"loca") {
            Some(_) => {
                let loca_data = table_slice(&data, &tables, b"loca")?;
                let mut loca = Vec::with_capacity(num_glyphs as usize + 1);
                for i in 0..=num_glyphs as usize {
                    let v = if index_to_loc_long {
                        be_u32(loca_data, i * 4)?
                    } else {
                        be_u16(loca_data, i * 2)? as u32 * 2
                    };
                    loca.push(v);
                }
                loca
            }
            None => Vec::new(),
        };

        // post: italic angle (16.16 fixed), and the version-2 glyph names
        // we never need
        let italic_angle = match tables.get(b"post") {
            Some(_) => {
                let post = table_slice(&data, &tables, b"post")?;
                be_u32(post, 4)? as i32 as f32 / 65536.0
            }
            None => 0.0,
        };

        let cap_height = tables
            .get(b"OS/2")
            .and_then(|_| table_slice(&data, &tables, b"OS/2").ok())
            .and_then(|os2| {
                let version = be_u16(os2, 0).ok()?;
                if version >= 2 {
                    be_i16(os2, 88).ok()
                } else {
                    None
                }
            });

        let post_script_name = parse_ps_name(&data, &tables).unwrap_or_else(|| {
            warn!("font has no PostScript name entry, using fallback");
            "Unknown".to_string()
        });

        let kern = match tables.get(b"kern") {
            Some(_) => parse_kern(table_slice(&data, &tables, b"kern")?),
            None => HashMap::new(),
        };

        Ok(TtfFont {
            data,
            tables,
            units_per_em: if units_per_em == 0 { 1000 } else { units_per_em },
            num_glyphs,
            ascent,
            descent,
            line_gap,
            x_min,
            y_min,
            x_max,
            y_max,
            italic_angle,
            cap_height,
            post_script_name,
            advances,
            cmap,
            loca,
            kern,
        })
    }

    pub(crate) fn table(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        let (offset, len) = *self.tables.get(tag)?;
        self.data.get(offset..offset + len)
    }

    pub fn gid_for(&self, codepoint: u32) -> Option<u16> {
        self.cmap.get(&codepoint).copied()
    }

    pub fn advance(&self, gid: u16) -> u16 {
        self.advances.get(gid as usize).copied().unwrap_or(0)
    }

    /// Raw glyf bytes of one glyph; `None` for empty glyphs
    pub fn glyph_data(&self, gid: u16) -> Option<&[u8]> {
        let glyf = self.table(b"glyf")?;
        let start = *self.loca.get(gid as usize)? as usize;
        let end = *self.loca.get(gid as usize + 1)? as usize;
        if start >= end {
            return None;
        }
        glyf.get(start..end)
    }
}

fn table_slice<'a>(
    data: &'a [u8],
    tables: &HashMap<[u8; 4], (usize, usize)>,
    tag: &[u8; 4],
) -> Result<&'a [u8]> {
    let (offset, len) = *tables.get(tag).ok_or_else(|| {
        PdfError::FontParse(format!("missing table {}", String::from_utf8_lossy(tag)))
    })?;
    data.get(offset..offset + len)
        .ok_or_else(|| PdfError::FontParse("table out of bounds".to_string()))
}

fn parse_cmap(cmap: &[u8]) -> Result<BTreeMap<u32, u16>> {
    let num_subtables = be_u16(cmap, 2)? as usize;
    // (platform, encoding, offset) triples; prefer Microsoft Unicode BMP,
    // then Microsoft UCS-4, then Unicode-platform, then Macintosh
    let mut best: Option<(u8, usize)> = None;
    for i in 0..num_subtables {
        let rec = 4 + i * 8;
        let platform = be_u16(cmap, rec)?;
        let encoding = be_u16(cmap, rec + 2)?;
        let offset = be_u32(cmap, rec + 4)? as usize;
        let rank = match (platform, encoding) {
            (3, 1) => 4,
            (3, 10) => 3,
            (0, _) => 2,
            (1, 0) => 1,
            _ => 0,
        };
        if rank > 0 && best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, offset));
        }
    }
    let (_, offset) = best.ok_or_else(|| {
        PdfError::FontParse("no usable cmap subtable (need platform 0, 1 or 3)".to_string())
    })?;
    let sub = cmap
        .get(offset..)
        .ok_or_else(|| PdfError::FontParse("cmap subtable offset out of bounds".to_string()))?;
    match be_u16(sub, 0)? {
        0 => parse_cmap_format0(sub),
        4 => parse_cmap_format4(sub),
        12 => parse_cmap_format12(sub),
        f => Err(PdfError::FontParse(format!("unsupported cmap format {}", f))),
    }
}

fn parse_cmap_format0(sub: &[u8]) -> Result<BTreeMap<u32, u16>> {
    let mut map = BTreeMap::new();
    for code in 0u32..256 {
        let gid = *sub
            .get(6 + code as usize)
            .ok_or_else(|| PdfError::FontParse("cmap format 0 truncated".to_string()))?;
        if gid != 0 {
            map.insert(code, gid as u16);
        }
    }
    Ok(map)
}

fn parse_cmap_format4(sub: &[u8]) -> Result<BTreeMap<u32, u16>> {
    let seg_count = be_u16(sub, 6)? as usize / 2;
    let end_codes = 14;
    let start_codes = end_codes + seg_count * 2 + 2;
    let deltas = start_codes + seg_count * 2;
    let range_offsets = deltas + seg_count * 2;
    let mut map = BTreeMap::new();
    for seg in 0..seg_count {
        let end = be_u16(sub, end_codes + seg * 2)?;
        let start = be_u16(sub, start_codes + seg * 2)?;
        let delta = be_u16(sub, deltas + seg * 2)?;
        let range_offset = be_u16(sub, range_offsets + seg * 2)?;
        if start == 0xFFFF {
            continue;
        }
        for code in start..=end {
            let gid = if range_offset == 0 {
                code.wrapping_add(delta)
            } else {
                let idx =
                    range_offsets + seg * 2 + range_offset as usize + (code - start) as usize * 2;
                let g = be_u16(sub, idx)?;
                if g == 0 {
                    continue;
                }
                g.wrapping_add(delta)
            };
            if gid != 0 {
                map.insert(code as u32, gid);
            }
            if code == 0xFFFF {
                break;
            }
        }
    }
    Ok(map)
}

fn parse_cmap_format12(sub: &[u8]) -> Result<BTreeMap<u32, u16>> {
    let n_groups = be_u32(sub, 12)? as usize;
    let mut map = BTreeMap::new();
    for g in 0..n_groups {
        let rec = 16 + g * 12;
        let start = be_u32(sub, rec)?;
        let end = be_u32(sub, rec + 4)?;
        let start_gid = be_u32(sub, rec + 8)?;
        for (i, code) in (start..=end).enumerate() {
            let gid = start_gid as usize + i;
            if gid <= u16::MAX as usize && gid != 0 {
                map.insert(code, gid as u16);
            }
        }
    }
    Ok(map)
}

fn parse_ps_name(data: &[u8], tables: &HashMap<[u8; 4], (usize, usize)>) -> Option<String> {
    let name = table_slice(data, tables, b"name").ok()?;
    let count = be_u16(name, 2).ok()? as usize;
    let string_offset = be_u16(name, 4).ok()? as usize;
    for i in 0..count {
        let rec = 6 + i * 12;
        let platform = be_u16(name, rec).ok()?;
        let name_id = be_u16(name, rec + 6).ok()?;
        if name_id != 6 {
            continue;
        }
        let len = be_u16(name, rec + 8).ok()? as usize;
        let offset = be_u16(name, rec + 10).ok()? as usize;
        let bytes = name.get(string_offset + offset..string_offset + offset + len)?;
        let s = if platform == 3 {
            // UTF-16BE
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).ok()?
        } else {
            bytes.iter().map(|b| *b as char).collect()
        };
        // PostScript names must be plain ASCII without spaces
        let cleaned: String = s.chars().filter(|c| c.is_ascii_graphic()).collect();
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }
    None
}

fn parse_kern(kern: &[u8]) -> HashMap<(u16, u16), i16> {
    let mut pairs = HashMap::new();
    let Ok(n_tables) = be_u16(kern, 2) else {
        return pairs;
    };
    let mut offset = 4;
    for _ in 0..n_tables {
        let Ok(length) = be_u16(kern, offset + 2) else {
            break;
        };
        let Ok(coverage) = be_u16(kern, offset + 4) else {
            break;
        };
        // format 0, horizontal data only
        if coverage & 0xFF00 == 0 && coverage & 0x0001 != 0 {
            if let Ok(n_pairs) = be_u16(kern, offset + 6) {
                for p in 0..n_pairs as usize {
                    let rec = offset + 14 + p * 6;
                    let (Ok(left), Ok(right), Ok(value)) = (
                        be_u16(kern, rec),
                        be_u16(kern, rec + 2),
                        be_i16(kern, rec + 4),
                    ) else {
                        break;
                    };
                    pairs.insert((left, right), value);
                }
            }
        }
        offset += length.max(6) as usize;
    }
    pairs
}

/// ASCII, the Latin-1 supplement, and the CP-1252 specials: the set a
/// nonsymbolic Roman font is expected to cover
fn is_standard_roman(c: char) -> bool {
    matches!(c as u32, 0x20..=0x7E | 0xA0..=0xFF)
        || matches!(
            c,
            '€' | '‚' | 'ƒ' | '„' | '…' | '†' | '‡' | 'ˆ' | '‰' | 'Š' | '‹' | 'Œ' | 'Ž'
                | '‘' | '’' | '“' | '”' | '•' | '–' | '—' | '˜' | '™' | 'š' | '›' | 'œ'
                | 'ž' | 'Ÿ'
        )
}

pub(crate) fn be_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
        .ok_or_else(|| PdfError::FontParse(format!("read past end at offset {}", offset)))
}

pub(crate) fn be_i16(data: &[u8], offset: usize) -> Result<i16> {
    be_u16(data, offset).map(|v| v as i16)
}

pub(crate) fn be_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| PdfError::FontParse(format!("read past end at offset {}", offset)))
}
