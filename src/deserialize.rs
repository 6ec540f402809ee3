//! Parsing existing PDF files back into an object table.
//!
//! This is the reader half of the revise operations: it locates the
//! cross-reference table (rebuilding it by a linear scan when corrupt),
//! loads every used object, and exposes the page tree with inherited
//! attributes. It is deliberately tolerant: unknown constructs become
//! warnings, not errors, wherever the file stays usable.

use std::collections::BTreeMap;

use log::warn;

use crate::errors::{PdfError, Result};
use crate::image::png_predictor_inverse;
use crate::object::{Dict, Obj, StreamObj, StringFormat};
use crate::serialize::{decompress_flate, find_last_startxref, FileWriter};

/// A non-fatal problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfWarnMsg {
    pub severity: &'static str,
    pub msg: String,
}

impl PdfWarnMsg {
    pub const ERROR: &'static str = "error";
    pub const WARNING: &'static str = "warning";

    pub fn error(msg: String) -> Self {
        PdfWarnMsg {
            severity: Self::ERROR,
            msg,
        }
    }

    pub fn warning(msg: String) -> Self {
        PdfWarnMsg {
            severity: Self::WARNING,
            msg,
        }
    }
}

/// One page of a parsed file, with tree-inherited attributes resolved
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub object_no: u32,
    pub dict: Dict,
    /// `[llx lly urx ury]`
    pub media_box: [f32; 4],
    pub resources: Dict,
    pub rotation: i32,
    /// content stream objects in order
    pub content_refs: Vec<u32>,
}

impl ParsedPage {
    pub fn width(&self) -> f32 {
        self.media_box[2] - self.media_box[0]
    }

    pub fn height(&self) -> f32 {
        self.media_box[3] - self.media_box[1]
    }
}

/// An existing PDF loaded into memory as an object table
#[derive(Debug)]
pub struct ParsedPdf {
    pub version: String,
    objects: BTreeMap<u32, (u16, Obj)>,
    pub trailer: Dict,
    pub warnings: Vec<PdfWarnMsg>,
}

impl ParsedPdf {
    /// Parses via the cross-reference table; on a corrupt table, one
    /// rebuild attempt by linear scan is made before giving up.
    pub fn parse(data: &[u8]) -> Result<ParsedPdf> {
        match Self::parse_with_xref(data) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!("xref parse failed ({}), rebuilding by linear scan", e);
                let mut parsed = Self::parse_tolerant(data)?;
                parsed
                    .warnings
                    .push(PdfWarnMsg::warning(format!("xref rebuilt: {}", e)));
                Ok(parsed)
            }
        }
    }

    fn parse_with_xref(data: &[u8]) -> Result<ParsedPdf> {
        let version = parse_version(data);
        let start = find_last_startxref(data)
            .ok_or_else(|| PdfError::PdfParse("no startxref found".to_string()))?;

        let (mut entries, trailer) = parse_xref_at(data, start as usize)?;
        // merge one older section (incremental updates); the newer
        // entries win
        if let Some(prev) = trailer.get("Prev").and_then(Obj::as_int) {
            match parse_xref_at(data, prev as usize) {
                Ok((old_entries, _)) => {
                    for (no, entry) in old_entries {
                        entries.entry(no).or_insert(entry);
                    }
                }
                Err(e) => warn!("could not read /Prev xref section: {}", e),
            }
        }

        let mut objects = BTreeMap::new();
        let mut warnings = Vec::new();
        for (no, (_gen, offset, used)) in entries {
            if !used {
                continue;
            }
            match parse_indirect_at(data, offset as usize) {
                Ok((got_no, got_gen, obj)) => {
                    if got_no != no {
                        warnings.push(PdfWarnMsg::warning(format!(
                            "xref points object {} at an object numbered {}",
                            no, got_no
                        )));
                    }
                    objects.insert(got_no, (got_gen, obj));
                }
                Err(e) => {
                    return Err(PdfError::PdfParse(format!(
                        "object {} at offset {}: {}",
                        no, offset, e
                    )));
                }
            }
        }

        if !trailer.contains_key("Root") {
            return Err(PdfError::PdfParse("trailer has no /Root".to_string()));
        }

        Ok(ParsedPdf {
            version,
            objects,
            trailer,
            warnings,
        })
    }

    /// Rebuild mode: scans the whole file for `N G obj` headers. Later
    /// definitions of the same number win, matching incremental-update
    /// semantics. The trailer is taken from the last `trailer` keyword.
    pub fn parse_tolerant(data: &[u8]) -> Result<ParsedPdf> {
        let version = parse_version(data);
        let mut objects = BTreeMap::new();
        let mut pos = 0;
        while let Some(found) = find_from(data, pos, b" obj") {
            // backtrack over "N G" before " obj"
            let header_start = line_backtrack(data, found);
            if let Ok((no, gen, obj)) = parse_indirect_at(data, header_start) {
                objects.insert(no, (gen, obj));
            }
            pos = found + 4;
        }
        if objects.is_empty() {
            return Err(PdfError::PdfParse(
                "no indirect objects found in file".to_string(),
            ));
        }

        // last trailer dictionary, if any
        let mut trailer = Dict::new();
        if let Some(tpos) = crate::serialize::find_last(data, b"trailer") {
            let mut lexer = Lexer::new(data, tpos + b"trailer".len());
            if let Ok(Obj::Dictionary(d)) = lexer.parse_object() {
                trailer = d;
            }
        }
        if !trailer.contains_key("Root") {
            // hunt for a /Type /Catalog object
            let catalog = objects.iter().find(|(_, (_, obj))| {
                obj.as_dict()
                    .and_then(|d| d.get("Type"))
                    .and_then(Obj::as_name)
                    == Some("Catalog")
            });
            match catalog {
                Some((no, _)) => trailer.set("Root", Obj::Reference(crate::object::ObjId((*no as usize) - 1))),
                None => {
                    return Err(PdfError::PdfParse(
                        "rebuild found no trailer and no catalog".to_string(),
                    ))
                }
            }
        }

        Ok(ParsedPdf {
            version,
            objects,
            trailer,
            warnings: Vec::new(),
        })
    }

    pub fn object(&self, no: u32) -> Option<&Obj> {
        self.objects.get(&no).map(|(_, obj)| obj)
    }

    pub fn object_mut(&mut self, no: u32) -> Option<&mut Obj> {
        self.objects.get_mut(&no).map(|(_, obj)| obj)
    }

    pub fn insert_object(&mut self, no: u32, obj: Obj) {
        self.objects.insert(no, (0, obj));
    }

    /// Appends with a fresh number and returns it
    pub fn push_object(&mut self, obj: Obj) -> u32 {
        let no = self.max_object_number() + 1;
        self.objects.insert(no, (0, obj));
        no
    }

    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().next_back().copied().unwrap_or(0)
    }

    pub fn object_numbers(&self) -> Vec<(u32, u16)> {
        self.objects.iter().map(|(no, (gen, _))| (*no, *gen)).collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Follows a reference chain (depth-capped) to the target object
    pub fn resolve<'a>(&'a self, obj: &'a Obj) -> &'a Obj {
        static NULL_OBJ: Obj = Obj::Null;
        let mut current = obj;
        for _ in 0..32 {
            match current {
                Obj::Reference(id) => {
                    match self.object(id.ref_no() as u32) {
                        Some(target) => current = target,
                        None => return &NULL_OBJ,
                    }
                }
                other => return other,
            }
        }
        &NULL_OBJ
    }

    pub fn encrypt_ref(&self) -> Option<u32> {
        self.trailer
            .get("Encrypt")
            .and_then(Obj::as_reference)
            .map(|id| id.ref_no() as u32)
    }

    pub fn encrypt_dict(&self) -> Option<&Dict> {
        self.resolve(self.trailer.get("Encrypt")?).as_dict()
    }

    /// First element of the trailer `/ID` array
    pub fn file_id(&self) -> Option<Vec<u8>> {
        self.trailer
            .get("ID")?
            .as_array()?
            .first()?
            .as_string()
            .map(|s| s.to_vec())
    }

    pub fn root_dict(&self) -> Result<&Dict> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| PdfError::PdfParse("trailer has no /Root".to_string()))?;
        self.resolve(root)
            .as_dict()
            .ok_or_else(|| PdfError::PdfParse("/Root is not a dictionary".to_string()))
    }

    /// Leaf pages in document order, with MediaBox / Resources / Rotate
    /// inherited down the tree
    pub fn pages(&self) -> Result<Vec<ParsedPage>> {
        let root = self.root_dict()?;
        let pages_obj = root
            .get("Pages")
            .ok_or_else(|| PdfError::PdfParse("catalog has no /Pages".to_string()))?;
        let pages_no = pages_obj
            .as_reference()
            .map(|id| id.ref_no() as u32)
            .ok_or_else(|| PdfError::PdfParse("/Pages is not a reference".to_string()))?;

        let mut out = Vec::new();
        let inherited = Inherited::default();
        self.collect_pages(pages_no, &inherited, &mut out, 0)?;
        Ok(out)
    }

    fn collect_pages(
        &self,
        node_no: u32,
        inherited: &Inherited,
        out: &mut Vec<ParsedPage>,
        depth: usize,
    ) -> Result<()> {
        if depth > 64 {
            return Err(PdfError::PdfParse("page tree too deep".to_string()));
        }
        let node = self
            .object(node_no)
            .and_then(Obj::as_dict)
            .ok_or_else(|| {
                PdfError::PdfParse(format!("page tree node {} missing", node_no))
            })?;

        let mut inherited = inherited.clone();
        if let Some(mb) = node.get("MediaBox").map(|o| self.resolve(o)) {
            if let Some(rect) = parse_rect(mb) {
                inherited.media_box = Some(rect);
            }
        }
        if let Some(res) = node.get("Resources").map(|o| self.resolve(o)) {
            if let Some(d) = res.as_dict() {
                inherited.resources = Some(d.clone());
            }
        }
        if let Some(rot) = node.get("Rotate").and_then(Obj::as_int) {
            inherited.rotation = Some(rot as i32);
        }

        match node.get("Type").and_then(Obj::as_name) {
            Some("Pages") | None => {
                let kids = node
                    .get("Kids")
                    .map(|o| self.resolve(o))
                    .and_then(Obj::as_array)
                    .ok_or_else(|| PdfError::PdfParse("Pages node has no /Kids".to_string()))?;
                for kid in kids {
                    let kid_no = kid
                        .as_reference()
                        .map(|id| id.ref_no() as u32)
                        .ok_or_else(|| {
                            PdfError::PdfParse("page tree kid is not a reference".to_string())
                        })?;
                    self.collect_pages(kid_no, &inherited, out, depth + 1)?;
                }
            }
            Some("Page") => {
                let mut content_refs = Vec::new();
                match node.get("Contents") {
                    Some(Obj::Reference(id)) => content_refs.push(id.ref_no() as u32),
                    Some(Obj::Array(items)) => {
                        for item in items {
                            if let Some(id) = item.as_reference() {
                                content_refs.push(id.ref_no() as u32);
                            }
                        }
                    }
                    _ => {}
                }
                out.push(ParsedPage {
                    object_no: node_no,
                    dict: node.clone(),
                    media_box: inherited.media_box.unwrap_or([0.0, 0.0, 595.0, 842.0]),
                    resources: inherited.resources.clone().unwrap_or_default(),
                    rotation: inherited.rotation.unwrap_or(0),
                    content_refs,
                })
            }
            Some(other) => {
                return Err(PdfError::PdfParse(format!(
                    "unexpected page tree node type {}",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Concatenated, decoded content of one page
    pub fn page_content(&self, page: &ParsedPage) -> Result<Vec<u8>> {
        if page.content_refs.is_empty() {
            return Err(PdfError::ContentObjNotFound(page.object_no as usize));
        }
        let mut out = Vec::new();
        for no in &page.content_refs {
            let stream = self
                .object(*no)
                .and_then(Obj::as_stream)
                .ok_or_else(|| PdfError::ContentObjNotFound(*no as usize))?;
            out.extend_from_slice(&self.decode_stream(stream)?);
            out.push(b'\n');
        }
        Ok(out)
    }

    /// Runs the stream through its declared filter chain
    pub fn decode_stream(&self, stream: &StreamObj) -> Result<Vec<u8>> {
        let filters: Vec<String> = match stream.dict.get("Filter").map(|f| self.resolve(f)) {
            None => Vec::new(),
            Some(Obj::Name(n)) => vec![n.clone()],
            Some(Obj::Array(items)) => items
                .iter()
                .filter_map(|o| o.as_name().map(str::to_string))
                .collect(),
            Some(_) => Vec::new(),
        };
        let parms: Vec<Option<Dict>> = match stream.dict.get("DecodeParms").map(|p| self.resolve(p)) {
            None => vec![None; filters.len()],
            Some(Obj::Dictionary(d)) => vec![Some(d.clone())],
            Some(Obj::Array(items)) => items
                .iter()
                .map(|o| self.resolve(o).as_dict().cloned())
                .collect(),
            Some(_) => vec![None; filters.len()],
        };

        let mut data = stream.content.clone();
        for (i, filter) in filters.iter().enumerate() {
            let parm = parms.get(i).cloned().flatten();
            data = match filter.as_str() {
                "FlateDecode" | "Fl" => {
                    let inflated = decompress_flate(&data)?;
                    apply_predictor(inflated, parm.as_ref())?
                }
                "LZWDecode" | "LZW" => {
                    let decoded = weezl::decode::Decoder::with_tiff_size_switch(
                        weezl::BitOrder::Msb,
                        8,
                    )
                    .decode(&data)
                    .map_err(|e| PdfError::PdfParse(format!("LZW decode: {}", e)))?;
                    apply_predictor(decoded, parm.as_ref())?
                }
                "ASCIIHexDecode" | "AHx" => decode_ascii_hex(&data)?,
                "DCTDecode" | "DCT" => {
                    // image data stays compressed; consumers decode it
                    data
                }
                other => {
                    return Err(PdfError::PdfParse(format!("unsupported filter {}", other)));
                }
            };
        }
        Ok(data)
    }

    /// Re-emits the whole object table as a fresh file. Used after
    /// revise operations; the xref is always rebuilt.
    pub fn write(&self) -> Vec<u8> {
        let max = self.max_object_number();
        let mut writer = FileWriter::new(&self.version);
        for no in 1..=max {
            match self.objects.get(&no) {
                Some((_, obj)) => writer.write_object(obj, false, None),
                None => writer.write_object(&Obj::Null, false, None),
            }
        }
        let mut trailer = Dict::new();
        for key in ["Root", "Info", "ID", "Encrypt"] {
            if let Some(v) = self.trailer.get(key) {
                trailer.set(key, v.clone());
            }
        }
        writer.finish(trailer)
    }
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    media_box: Option<[f32; 4]>,
    resources: Option<Dict>,
    rotation: Option<i32>,
}

fn parse_version(data: &[u8]) -> String {
    if data.starts_with(b"%PDF-") {
        data[5..]
            .iter()
            .take_while(|b| !b.is_ascii_whitespace())
            .map(|b| *b as char)
            .collect()
    } else {
        "1.4".to_string()
    }
}

pub(crate) fn parse_rect(obj: &Obj) -> Option<[f32; 4]> {
    let arr = obj.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (i, v) in arr.iter().enumerate() {
        out[i] = v.as_f32()?;
    }
    Some(out)
}

/// Classic `xref` table section at `offset`, plus its trailer
fn parse_xref_at(
    data: &[u8],
    offset: usize,
) -> Result<(BTreeMap<u32, (u16, u64, bool)>, Dict)> {
    let mut lexer = Lexer::new(data, offset);
    lexer.skip_ws();
    if !lexer.try_keyword(b"xref") {
        // an indirect object here means an xref stream
        return Err(PdfError::PdfParse(
            "cross-reference streams are not supported".to_string(),
        ));
    }
    let mut entries = BTreeMap::new();
    loop {
        lexer.skip_ws();
        if lexer.try_keyword(b"trailer") {
            break;
        }
        let start = lexer
            .parse_integer()
            .map_err(|_| PdfError::PdfParse("bad xref subsection header".to_string()))?;
        lexer.skip_ws();
        let count = lexer
            .parse_integer()
            .map_err(|_| PdfError::PdfParse("bad xref subsection count".to_string()))?;
        for i in 0..count {
            lexer.skip_ws();
            let entry_offset = lexer.parse_integer()? as u64;
            lexer.skip_ws();
            let gen = lexer.parse_integer()? as u16;
            lexer.skip_ws();
            let kind = lexer.next_byte().ok_or_else(|| {
                PdfError::PdfParse("truncated xref entry".to_string())
            })?;
            let used = match kind {
                b'n' => true,
                b'f' => false,
                other => {
                    return Err(PdfError::PdfParse(format!(
                        "bad xref entry type '{}'",
                        other as char
                    )));
                }
            };
            let no = (start + i) as u32;
            if no > 0 {
                entries.insert(no, (gen, entry_offset, used));
            }
        }
    }
    lexer.skip_ws();
    let trailer = match lexer.parse_object()? {
        Obj::Dictionary(d) => d,
        _ => return Err(PdfError::PdfParse("trailer is not a dictionary".to_string())),
    };
    Ok((entries, trailer))
}

/// `N G obj <object> endobj` at a byte offset
pub(crate) fn parse_indirect_at(data: &[u8], offset: usize) -> Result<(u32, u16, Obj)> {
    let mut lexer = Lexer::new(data, offset);
    lexer.skip_ws();
    let no = lexer.parse_integer()? as u32;
    lexer.skip_ws();
    let gen = lexer.parse_integer()? as u16;
    lexer.skip_ws();
    if !lexer.try_keyword(b"obj") {
        return Err(PdfError::PdfParse(format!(
            "expected 'obj' at offset {}",
            lexer.pos
        )));
    }
    let obj = lexer.parse_object()?;

    // streams: the dict we just read is followed by the payload
    lexer.skip_ws();
    if lexer.try_keyword(b"stream") {
        let dict = match obj {
            Obj::Dictionary(d) => d,
            _ => {
                return Err(PdfError::PdfParse(
                    "stream keyword after non-dictionary".to_string(),
                ))
            }
        };
        // single EOL after the keyword
        if lexer.peek() == Some(b'\r') {
            lexer.next_byte();
        }
        if lexer.peek() == Some(b'\n') {
            lexer.next_byte();
        }
        let body_start = lexer.pos;
        let content = match dict.get("Length").and_then(Obj::as_int) {
            Some(len) if body_start + len as usize <= data.len() => {
                let end = body_start + len as usize;
                let mut lx = Lexer::new(data, end);
                lx.skip_ws();
                if lx.try_keyword(b"endstream") {
                    lexer.pos = lx.pos;
                    data[body_start..end].to_vec()
                } else {
                    // /Length was wrong; scan instead
                    scan_to_endstream(data, body_start, &mut lexer)?
                }
            }
            // /Length may be an indirect reference we cannot chase here
            _ => scan_to_endstream(data, body_start, &mut lexer)?,
        };
        return Ok((no, gen, Obj::Stream(StreamObj::new(dict, content))));
    }

    Ok((no, gen, obj))
}

fn scan_to_endstream(data: &[u8], body_start: usize, lexer: &mut Lexer) -> Result<Vec<u8>> {
    let rest = &data[body_start..];
    let end = find_from(rest, 0, b"endstream")
        .ok_or_else(|| PdfError::PdfParse("unterminated stream".to_string()))?;
    let mut content_end = body_start + end;
    // drop the EOL that belongs to the keyword, not the data
    if content_end > body_start && data[content_end - 1] == b'\n' {
        content_end -= 1;
    }
    if content_end > body_start && data[content_end - 1] == b'\r' {
        content_end -= 1;
    }
    lexer.pos = body_start + end + b"endstream".len();
    Ok(data[body_start..content_end].to_vec())
}

fn decode_ascii_hex(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut hi: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        let v = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            other => {
                return Err(PdfError::PdfParse(format!(
                    "bad hex digit '{}'",
                    other as char
                )));
            }
        };
        match hi.take() {
            Some(h) => out.push(h << 4 | v),
            None => hi = Some(v),
        }
    }
    if let Some(h) = hi {
        out.push(h << 4);
    }
    Ok(out)
}

/// PNG-predictor inverse for Flate/LZW `/DecodeParms`
fn apply_predictor(data: Vec<u8>, parms: Option<&Dict>) -> Result<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let predictor = parms.get("Predictor").and_then(Obj::as_int).unwrap_or(1);
    if predictor < 10 {
        if predictor == 2 {
            return Err(PdfError::PdfParse(
                "TIFF predictor 2 is not supported".to_string(),
            ));
        }
        return Ok(data);
    }
    let colors = parms.get("Colors").and_then(Obj::as_int).unwrap_or(1) as usize;
    let bpc = parms
        .get("BitsPerComponent")
        .and_then(Obj::as_int)
        .unwrap_or(8) as usize;
    let columns = parms.get("Columns").and_then(Obj::as_int).unwrap_or(1) as usize;
    let bpp = (colors * bpc).div_ceil(8);
    let row_len = (columns * colors * bpc).div_ceil(8);
    png_predictor_inverse(&data, row_len, bpp)
        .map_err(|e| PdfError::PdfParse(format!("predictor: {}", e)))
}

fn find_from(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= data.len() || needle.is_empty() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Walks backwards from ` obj` over generation and object number
fn line_backtrack(data: &[u8], obj_kw_pos: usize) -> usize {
    let mut pos = obj_kw_pos;
    // gen digits
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    while pos > 0 && (data[pos - 1] == b' ' || data[pos - 1] == b'\r' || data[pos - 1] == b'\n') {
        pos -= 1;
    }
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    pos
}

// ---------------------------------------------------------------------
// token-level scanner
// ---------------------------------------------------------------------

pub(crate) struct Lexer<'a> {
    data: &'a [u8],
    pub pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skips whitespace and `%` comments (but not the `%PDF` header we
    /// would never encounter mid-file)
    pub fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == 0 {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(b) = self.next_byte() {
                    if b == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    pub fn try_keyword(&mut self, kw: &[u8]) -> bool {
        match self.data.get(self.pos..) {
            Some(rest) if rest.starts_with(kw) => {
                self.pos += kw.len();
                true
            }
            _ => false,
        }
    }

    pub fn parse_integer(&mut self) -> Result<i64> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(PdfError::PdfParse(format!(
                "expected integer at offset {}",
                start
            )));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PdfError::PdfParse(format!("bad integer at offset {}", start)))
    }

    /// One object, starting at the current position
    pub fn parse_object(&mut self) -> Result<Obj> {
        self.skip_ws();
        match self.peek() {
            None => Err(PdfError::PdfParse("unexpected end of data".to_string())),
            Some(b'<') => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.parse_dict()
                } else {
                    self.parse_hex_string()
                }
            }
            Some(b'[') => self.parse_array(),
            Some(b'(') => self.parse_literal_string(),
            Some(b'/') => self.parse_name().map(Obj::Name),
            Some(b't') if self.try_keyword(b"true") => Ok(Obj::Boolean(true)),
            Some(b'f') if self.try_keyword(b"false") => Ok(Obj::Boolean(false)),
            Some(b'n') if self.try_keyword(b"null") => Ok(Obj::Null),
            Some(b) if b.is_ascii_digit() || b == b'+' || b == b'-' || b == b'.' => {
                self.parse_number_or_ref()
            }
            Some(other) => Err(PdfError::PdfParse(format!(
                "unexpected byte '{}' at offset {}",
                other as char, self.pos
            ))),
        }
    }

    fn parse_dict(&mut self) -> Result<Obj> {
        self.pos += 2; // <<
        let mut dict = Dict::new();
        loop {
            self.skip_ws();
            if self.try_keyword(b">>") {
                break;
            }
            let key = self.parse_name()?;
            let value = self.parse_object()?;
            dict.set(key, value);
        }
        Ok(Obj::Dictionary(dict))
    }

    fn parse_array(&mut self) -> Result<Obj> {
        self.pos += 1; // [
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.pos += 1;
                break;
            }
            if self.at_end() {
                return Err(PdfError::PdfParse("unterminated array".to_string()));
            }
            items.push(self.parse_object()?);
        }
        Ok(Obj::Array(items))
    }

    fn parse_name(&mut self) -> Result<String> {
        if self.peek() != Some(b'/') {
            return Err(PdfError::PdfParse(format!(
                "expected name at offset {}",
                self.pos
            )));
        }
        self.pos += 1;
        let mut name = String::new();
        while let Some(b) = self.peek() {
            match b {
                b'\x00'..=b' ' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{'
                | b'}' | b'%' => break,
                b'#' => {
                    // two-digit hex escape
                    let hi = self.data.get(self.pos + 1).copied();
                    let lo = self.data.get(self.pos + 2).copied();
                    match (hi.and_then(hex_val), lo.and_then(hex_val)) {
                        (Some(h), Some(l)) => {
                            name.push((h << 4 | l) as char);
                            self.pos += 3;
                        }
                        _ => {
                            name.push('#');
                            self.pos += 1;
                        }
                    }
                }
                _ => {
                    name.push(b as char);
                    self.pos += 1;
                }
            }
        }
        Ok(name)
    }

    fn parse_hex_string(&mut self) -> Result<Obj> {
        self.pos += 1; // <
        let mut bytes = Vec::new();
        let mut hi: Option<u8> = None;
        loop {
            match self.next_byte() {
                None => return Err(PdfError::PdfParse("unterminated hex string".to_string())),
                Some(b'>') => break,
                Some(b) if b.is_ascii_whitespace() => {}
                Some(b) => match hex_val(b) {
                    Some(v) => match hi.take() {
                        Some(h) => bytes.push(h << 4 | v),
                        None => hi = Some(v),
                    },
                    None => {
                        return Err(PdfError::PdfParse(format!(
                            "bad hex digit '{}'",
                            b as char
                        )));
                    }
                },
            }
        }
        if let Some(h) = hi {
            bytes.push(h << 4);
        }
        Ok(Obj::String(bytes, StringFormat::Hexadecimal))
    }

    fn parse_literal_string(&mut self) -> Result<Obj> {
        self.pos += 1; // (
        let mut bytes = Vec::new();
        let mut depth = 1;
        loop {
            match self.next_byte() {
                None => {
                    return Err(PdfError::PdfParse("unterminated string".to_string()));
                }
                Some(b'\\') => match self.next_byte() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b'r') => bytes.push(b'\r'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'b') => bytes.push(0x08),
                    Some(b'f') => bytes.push(0x0C),
                    Some(b'(') => bytes.push(b'('),
                    Some(b')') => bytes.push(b')'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(b'\n') => {} // line continuation
                    Some(d @ b'0'..=b'7') => {
                        // up to three octal digits
                        let mut v = (d - b'0') as u16;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    v = v * 8 + (d - b'0') as u16;
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                        bytes.push(v as u8);
                    }
                    Some(other) => bytes.push(other),
                    None => {
                        return Err(PdfError::PdfParse("unterminated escape".to_string()));
                    }
                },
                Some(b'(') => {
                    depth += 1;
                    bytes.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(b')');
                }
                Some(b) => bytes.push(b),
            }
        }
        Ok(Obj::String(bytes, StringFormat::Literal))
    }

    /// Distinguishes `12`, `-3.5` and `12 0 R` by lookahead
    fn parse_number_or_ref(&mut self) -> Result<Obj> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut is_real = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' {
                is_real = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| PdfError::PdfParse("bad number".to_string()))?;
        if is_real {
            return text
                .parse::<f32>()
                .map(Obj::Real)
                .map_err(|_| PdfError::PdfParse(format!("bad real '{}'", text)));
        }
        let int: i64 = text
            .parse()
            .map_err(|_| PdfError::PdfParse(format!("bad integer '{}'", text)))?;

        // lookahead for "G R"
        let save = self.pos;
        self.skip_ws();
        let gen_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos > gen_start {
            self.skip_ws();
            if self.peek() == Some(b'R')
                && self
                    .data
                    .get(self.pos + 1)
                    .map_or(true, |b| !b.is_ascii_alphanumeric())
            {
                self.pos += 1;
                if int > 0 {
                    return Ok(Obj::Reference(crate::object::ObjId(int as usize - 1)));
                }
            }
        }
        self.pos = save;
        Ok(Obj::Integer(int))
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
