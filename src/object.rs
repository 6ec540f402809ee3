//! The PDF object model: every value a body object can hold, plus the
//! byte-level serialization rules for each variant.

use std::fmt;

/// Identifier of an indirect object. Stored 0-based, serialized 1-based.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub(crate) usize);

impl ObjId {
    /// Identifier for the slot at a 0-based index
    pub fn from_index(index: usize) -> ObjId {
        ObjId(index)
    }

    /// 0-based slot index in the object table
    pub fn index(self) -> usize {
        self.0
    }

    /// 1-based object number as written in the file
    pub fn ref_no(self) -> usize {
        self.0 + 1
    }

    /// `"N 0 R"`
    pub fn ref_str(self) -> String {
        format!("{} 0 R", self.ref_no())
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 0 R", self.ref_no())
    }
}

/// Whether a string object is written as `(literal)` or `<hex>`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hexadecimal,
}

/// A PDF dictionary. Keys keep insertion order so that output stays
/// byte-deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(String, Obj)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Obj>) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value.into();
        } else {
            self.entries.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Obj> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Obj> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Obj> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Obj)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Obj)> {
        self.entries.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Obj>> FromIterator<(K, V)> for Dict {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut d = Dict::new();
        for (k, v) in iter {
            d.set(k, v);
        }
        d
    }
}

/// A stream: dictionary plus binary payload. `filters` lists the
/// encodings already applied to `content`, outermost first; `/Filter`
/// and `/Length` are patched in at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamObj {
    pub dict: Dict,
    pub content: Vec<u8>,
    pub filters: Vec<String>,
}

impl StreamObj {
    pub fn new(dict: Dict, content: Vec<u8>) -> Self {
        Self {
            dict,
            content,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(dict: Dict, content: Vec<u8>, filter: &str) -> Self {
        Self {
            dict,
            content,
            filters: vec![filter.to_string()],
        }
    }
}

/// One PDF value. Indirect objects are `Obj`s stored in the document's
/// object table; nested values are `Obj`s inside arrays and dictionaries.
#[derive(Debug, Clone, PartialEq)]
pub enum Obj {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f32),
    Name(String),
    String(Vec<u8>, StringFormat),
    Array(Vec<Obj>),
    Dictionary(Dict),
    Stream(StreamObj),
    Reference(ObjId),
}

impl Obj {
    pub fn name(s: impl Into<String>) -> Obj {
        Obj::Name(s.into())
    }

    pub fn string_literal(s: impl Into<Vec<u8>>) -> Obj {
        Obj::String(s.into(), StringFormat::Literal)
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Obj::Dictionary(d) => Some(d),
            Obj::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Obj::Dictionary(d) => Some(d),
            Obj::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamObj> {
        match self {
            Obj::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Obj]> {
        match self {
            Obj::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Obj::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Obj::Integer(i) => Some(*i as f32),
            Obj::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Obj::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Obj::String(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjId> {
        match self {
            Obj::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Serializes this object (without the `N 0 obj` wrapper) into `out`
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Obj::Null => out.extend_from_slice(b"null"),
            Obj::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Obj::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Obj::Real(r) => out.extend_from_slice(crate::color::fmt_f32(*r).as_bytes()),
            Obj::Name(n) => write_name(n, out),
            Obj::String(s, StringFormat::Literal) => write_string_literal(s, out),
            Obj::String(s, StringFormat::Hexadecimal) => write_string_hex(s, out),
            Obj::Array(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write(out);
                }
                out.push(b']');
            }
            Obj::Dictionary(dict) => write_dict(dict, out),
            Obj::Stream(stream) => {
                // /Length and /Filter are expected to be patched already
                write_dict(&stream.dict, out);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(&stream.content);
                out.extend_from_slice(b"\nendstream");
            }
            Obj::Reference(id) => out.extend_from_slice(id.ref_str().as_bytes()),
        }
    }
}

impl From<bool> for Obj {
    fn from(v: bool) -> Obj {
        Obj::Boolean(v)
    }
}
impl From<i64> for Obj {
    fn from(v: i64) -> Obj {
        Obj::Integer(v)
    }
}
impl From<i32> for Obj {
    fn from(v: i32) -> Obj {
        Obj::Integer(v as i64)
    }
}
impl From<usize> for Obj {
    fn from(v: usize) -> Obj {
        Obj::Integer(v as i64)
    }
}
impl From<f32> for Obj {
    fn from(v: f32) -> Obj {
        Obj::Real(v)
    }
}
impl From<ObjId> for Obj {
    fn from(v: ObjId) -> Obj {
        Obj::Reference(v)
    }
}
impl From<Vec<Obj>> for Obj {
    fn from(v: Vec<Obj>) -> Obj {
        Obj::Array(v)
    }
}
impl From<Dict> for Obj {
    fn from(v: Dict) -> Obj {
        Obj::Dictionary(v)
    }
}
impl From<&str> for Obj {
    fn from(v: &str) -> Obj {
        Obj::Name(v.to_string())
    }
}

fn write_dict(dict: &Dict, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<< ");
    for (key, value) in dict.iter() {
        write_name(key, out);
        out.push(b' ');
        value.write(out);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    out.push(b'/');
    for b in name.bytes() {
        // delimiters and whitespace must be #-escaped inside names
        match b {
            b'\x00'..=b' ' | b'#' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{'
            | b'}' | b'%' => {
                out.push(b'#');
                out.extend_from_slice(format!("{:02X}", b).as_bytes());
            }
            _ => out.push(b),
        }
    }
}

fn write_string_literal(s: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn write_string_hex(s: &[u8], out: &mut Vec<u8>) {
    out.push(b'<');
    for b in s {
        out.extend_from_slice(format!("{:02X}", b).as_bytes());
    }
    out.push(b'>');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_bytes(obj: &Obj) -> Vec<u8> {
        let mut out = Vec::new();
        obj.write(&mut out);
        out
    }

    #[test]
    fn atoms() {
        assert_eq!(to_bytes(&Obj::Null), b"null");
        assert_eq!(to_bytes(&Obj::Boolean(true)), b"true");
        assert_eq!(to_bytes(&Obj::Integer(-12)), b"-12");
        assert_eq!(to_bytes(&Obj::Real(0.5)), b"0.5");
        assert_eq!(to_bytes(&Obj::name("Type")), b"/Type");
        assert_eq!(to_bytes(&Obj::Reference(ObjId(0))), b"1 0 R");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(
            to_bytes(&Obj::string_literal("a(b)c\\".as_bytes())),
            b"(a\\(b\\)c\\\\)"
        );
        assert_eq!(
            to_bytes(&Obj::String(vec![0xDE, 0xAD], StringFormat::Hexadecimal)),
            b"<DEAD>"
        );
    }

    #[test]
    fn name_escaping() {
        assert_eq!(to_bytes(&Obj::name("A B")), b"/A#20B");
    }

    #[test]
    fn dict_preserves_insertion_order() {
        let mut d = Dict::new();
        d.set("Zebra", 1i64);
        d.set("Apple", 2i64);
        assert_eq!(to_bytes(&Obj::Dictionary(d)), b"<< /Zebra 1 /Apple 2 >>");
    }

    #[test]
    fn dict_set_overwrites() {
        let mut d = Dict::new();
        d.set("K", 1i64);
        d.set("K", 2i64);
        assert_eq!(d.len(), 1);
        assert_eq!(d.get("K").and_then(Obj::as_int), Some(2));
    }

    #[test]
    fn obj_id_refs() {
        let id = ObjId(4);
        assert_eq!(id.index(), 4);
        assert_eq!(id.ref_no(), 5);
        assert_eq!(id.ref_str(), "5 0 R");
    }
}
