//! Byte-level document assembly: header, body objects, cross-reference
//! table, trailer. Everything that turns an object table into a file.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::debug;

use crate::encryption::EncryptionState;
use crate::errors::{PdfError, Result};
use crate::object::{Dict, Obj, StreamObj};

/// Options for [`crate::Document::save_with_options`]
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Deflate stream bodies that carry no filter yet
    pub compress: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

pub(crate) fn compress_flate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // writing to a Vec cannot fail
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

pub(crate) fn decompress_flate(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PdfError::PdfParse(format!("flate decode: {}", e)))?;
    Ok(out)
}

/// Applies compression and encryption to a stream and patches
/// `/Length` + `/Filter`. Returns the stream as stored in the file.
pub(crate) fn prepare_stream(
    stream: &StreamObj,
    compress: bool,
    crypt: Option<(&EncryptionState, usize)>,
) -> StreamObj {
    let mut filters = stream.filters.clone();
    let mut content = stream.content.clone();

    if compress && filters.is_empty() && !content.is_empty() {
        content = compress_flate(&content);
        filters.push("FlateDecode".to_string());
    }

    if let Some((state, obj_no)) = crypt {
        if !state.skip_stream(&stream.dict) {
            content = state.encrypt_object_bytes(obj_no, 0, &content);
        }
    }

    let mut dict = stream.dict.clone();
    dict.set("Length", content.len() as i64);
    // a parsed stream keeps its encoded body and its own /Filter entry;
    // only streams we encoded ourselves get the entry patched
    match filters.len() {
        0 => {}
        1 => dict.set("Filter", Obj::name(filters[0].clone())),
        _ => dict.set(
            "Filter",
            Obj::Array(filters.iter().map(|f| Obj::name(f.clone())).collect()),
        ),
    }

    StreamObj {
        dict,
        content,
        filters,
    }
}

/// Recursively encrypts every string in an object with the per-object key
fn encrypt_strings(obj: &mut Obj, state: &EncryptionState, obj_no: usize) {
    match obj {
        Obj::String(bytes, _) => {
            *bytes = state.encrypt_object_bytes(obj_no, 0, bytes);
        }
        Obj::Array(items) => {
            for item in items.iter_mut() {
                encrypt_strings(item, state, obj_no);
            }
        }
        Obj::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                encrypt_strings(v, state, obj_no);
            }
        }
        Obj::Stream(stream) => {
            for (_, v) in stream.dict.iter_mut() {
                encrypt_strings(v, state, obj_no);
            }
        }
        _ => {}
    }
}

/// Writes a whole file from an object table. `objects[i]` becomes object
/// `i + 1`; `Obj::Null` slots keep their number and are marked free in
/// the xref. The trailer receives `/Size` and `startxref` automatically.
pub(crate) struct FileWriter {
    out: Vec<u8>,
    offsets: Vec<Option<u64>>,
}

impl FileWriter {
    pub fn new(version: &str) -> Self {
        let mut out = Vec::with_capacity(16 * 1024);
        out.extend_from_slice(format!("%PDF-{}\n", version).as_bytes());
        // binary marker so transports treat the file as 8-bit data
        out.extend_from_slice(b"%\x80\x80\x80\x80\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    /// Appends `N 0 obj … endobj`, recording the offset for the xref.
    /// The object number is the 1-based position of this call.
    pub fn write_object(
        &mut self,
        obj: &Obj,
        compress: bool,
        crypt: Option<(&EncryptionState, usize)>,
    ) {
        if matches!(obj, Obj::Null) {
            // freed slot, keeps its number
            self.offsets.push(None);
            return;
        }
        let obj_no = self.offsets.len() + 1;
        self.offsets.push(Some(self.out.len() as u64));
        self.out
            .extend_from_slice(format!("{} 0 obj\n", obj_no).as_bytes());
        match obj {
            Obj::Stream(stream) => {
                let prepared = prepare_stream(stream, compress, crypt);
                let mut with_strings = Obj::Stream(prepared);
                if let Some((state, no)) = crypt {
                    if let Obj::Stream(s) = &mut with_strings {
                        let mut d = Obj::Dictionary(s.dict.clone());
                        encrypt_strings(&mut d, state, no);
                        if let Obj::Dictionary(d) = d {
                            s.dict = d;
                        }
                    }
                }
                with_strings.write(&mut self.out);
            }
            other => {
                let mut cloned;
                let to_write = if let Some((state, no)) = crypt {
                    cloned = other.clone();
                    encrypt_strings(&mut cloned, state, no);
                    &cloned
                } else {
                    other
                };
                to_write.write(&mut self.out);
            }
        }
        self.out.extend_from_slice(b"\nendobj\n");
    }

    /// Emits xref + trailer + startxref + EOF and returns the file bytes
    pub fn finish(mut self, mut trailer: Dict) -> Vec<u8> {
        let xref_offset = self.out.len() as u64;
        let size = self.offsets.len() + 1;

        self.out.extend_from_slice(b"xref\n");
        self.out
            .extend_from_slice(format!("0 {}\n", size).as_bytes());
        self.out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &self.offsets {
            match offset {
                Some(ofs) => self
                    .out
                    .extend_from_slice(format!("{:010} 00000 n \n", ofs).as_bytes()),
                None => self.out.extend_from_slice(b"0000000000 00001 f \n"),
            }
        }

        trailer.set("Size", size as i64);
        self.out.extend_from_slice(b"trailer\n");
        Obj::Dictionary(trailer).write(&mut self.out);
        self.out
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

        debug!(
            "serialized {} objects, {} bytes",
            self.offsets.len(),
            self.out.len()
        );
        self.out
    }
}

/// Finds the offset given by the last `startxref` in `data`
pub(crate) fn find_last_startxref(data: &[u8]) -> Option<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let pos = find_last(tail, b"startxref")?;
    let rest = &tail[pos + b"startxref".len()..];
    let num: String = rest
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|b| b as char)
        .collect();
    num.parse().ok()
}

pub(crate) fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Appends an incremental update section: the modified objects, a
/// partial xref, and a trailer chaining to the original via `/Prev`.
pub(crate) fn incremental_update(
    original: &[u8],
    objects: &[(usize, &Obj)],
    root: Obj,
    prev_trailer_id: Option<Obj>,
    size: usize,
    compress: bool,
) -> Result<Vec<u8>> {
    let prev = find_last_startxref(original).ok_or_else(|| {
        PdfError::IncrementalInvalid("original has no startxref".to_string())
    })?;

    let mut out = original.to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let mut entries: Vec<(usize, u64)> = Vec::with_capacity(objects.len());
    for (obj_no, obj) in objects {
        let offset = out.len() as u64;
        out.extend_from_slice(format!("{} 0 obj\n", obj_no).as_bytes());
        match obj {
            Obj::Stream(stream) => {
                let prepared = prepare_stream(stream, compress, None);
                Obj::Stream(prepared).write(&mut out);
            }
            other => other.write(&mut out),
        }
        out.extend_from_slice(b"\nendobj\n");
        entries.push((*obj_no, offset));
    }

    entries.sort_by_key(|(no, _)| *no);

    let xref_offset = out.len() as u64;
    out.extend_from_slice(b"xref\n");
    // contiguous runs become one subsection each
    let mut i = 0;
    while i < entries.len() {
        let start = entries[i].0;
        let mut run = 1;
        while i + run < entries.len() && entries[i + run].0 == start + run {
            run += 1;
        }
        out.extend_from_slice(format!("{} {}\n", start, run).as_bytes());
        for (_, offset) in &entries[i..i + run] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        i += run;
    }

    let mut trailer = Dict::new();
    trailer.set("Size", size as i64);
    trailer.set("Root", root);
    trailer.set("Prev", prev as i64);
    if let Some(id) = prev_trailer_id {
        trailer.set("ID", id);
    }
    out.extend_from_slice(b"trailer\n");
    Obj::Dictionary(trailer).write(&mut out);
    out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjId;

    #[test]
    fn flate_round_trip() {
        let data = b"stream content stream content stream content".to_vec();
        let packed = compress_flate(&data);
        assert!(packed.len() < data.len());
        assert_eq!(decompress_flate(&packed).unwrap(), data);
    }

    #[test]
    fn writer_emits_header_and_eof() {
        let mut w = FileWriter::new("1.7");
        w.write_object(&Obj::Dictionary(Dict::new()), false, None);
        let mut trailer = Dict::new();
        trailer.set("Root", ObjId(0));
        let bytes = w.finish(trailer);
        assert!(bytes.starts_with(b"%PDF-1.7\n"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("1 0 obj"));
        assert!(text.contains("/Size 2"));
        assert!(text.contains("startxref"));
    }

    #[test]
    fn null_slots_marked_free() {
        let mut w = FileWriter::new("1.7");
        w.write_object(&Obj::Integer(1), false, None);
        w.write_object(&Obj::Null, false, None);
        w.write_object(&Obj::Integer(3), false, None);
        let bytes = w.finish(Dict::new());
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("0000000000 00001 f "));
        assert!(text.contains("3 0 obj"));
    }

    #[test]
    fn startxref_scan() {
        let mut w = FileWriter::new("1.4");
        w.write_object(&Obj::Integer(1), false, None);
        let bytes = w.finish(Dict::new());
        let ofs = find_last_startxref(&bytes).unwrap();
        assert!(&bytes[ofs as usize..].starts_with(b"xref"));
    }

    #[test]
    fn stream_compression_sets_filter() {
        let stream = StreamObj::new(Dict::new(), b"hello hello hello hello".to_vec());
        let prepared = prepare_stream(&stream, true, None);
        assert_eq!(
            prepared.dict.get("Filter").and_then(Obj::as_name),
            Some("FlateDecode")
        );
        assert_eq!(
            prepared.dict.get("Length").and_then(Obj::as_int),
            Some(prepared.content.len() as i64)
        );
    }
}
