//! # craftpdf
//!
//! craftpdf writes, revises and reads PDF files (1.4–2.0) without
//! depending on an existing PDF engine: the object model, the
//! cross-reference assembly, the content-stream generation, TrueType
//! subsetting, image embedding and the standard security handler are
//! all part of the crate.
//!
//! # Writing
//!
//! Drawing happens through a cursor-style API with the origin at the
//! upper left corner of the page; everything is recorded as content
//! items that stay editable until the document is saved.
//!
//! ```no_run
//! use craftpdf::{DocConfig, Document};
//!
//! let mut doc = Document::new();
//! doc.start(DocConfig::default());
//! doc.add_page()?;
//!
//! let font = std::fs::read("assets/Roboto.ttf")?;
//! doc.add_ttf_font("Roboto", "", font)?;
//! doc.set_font("Roboto", "", 14.0)?;
//! doc.set_xy(40.0, 40.0);
//! doc.cell(None, "Hello world, Unicode too: стуфх")?;
//!
//! doc.line(40.0, 60.0, 200.0, 60.0)?;
//! doc.rectangle(40.0, 80.0, 200.0, 140.0, "FD", 6.0, 4)?;
//!
//! std::fs::write("out.pdf", doc.save()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Revising
//!
//! Existing files parse into an object table that supports object and
//! stream-level edits, text/image/font/link extraction, image
//! recompression, decryption and incremental saves:
//!
//! ```no_run
//! use craftpdf::{extract_text_from_page, rebuild_xref};
//!
//! let data = std::fs::read("in.pdf")?;
//! let text = extract_text_from_page(&data, 0)?;
//! let repaired = rebuild_xref(&data)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Encryption
//!
//! The standard security handler covers RC4 40/128, AES-128 and
//! AES-256 (revision 6). See [`Protection`] and [`authenticate_bytes`].

pub mod annotation;
pub mod cmap;
pub mod color;
pub mod date;
pub mod deserialize;
pub mod document;
pub mod encryption;
pub mod errors;
pub mod extract;
pub mod font;
pub mod image;
pub mod matrix;
pub mod object;
pub mod ops;
pub mod page;
pub mod revise;
pub mod serialize;
pub mod subsetting;
pub mod text;
pub mod units;
pub mod utils;
pub mod xmp;
pub mod xobject;

#[cfg(test)]
#[path = "../tests/common/ttf.rs"]
mod testutil;

pub use annotation::Annotation;
pub use cmap::ToUnicodeCMap;
pub use color::{Cmyk, Color, ColorSpace, Rgb};
pub use deserialize::{ParsedPage, ParsedPdf, PdfWarnMsg};
pub use document::{
    BlendMode, DocConfig, Document, DocumentInfo, GcLevel, PageLabel, PageLabelStyle,
};
pub use encryption::{
    authenticate, authenticate_bytes, decrypt_document, DecryptContext, EncryptionMethod,
    Permissions, Protection,
};
pub use errors::{PdfError, Result};
pub use extract::{
    extract_fonts, extract_images, extract_links, extract_page_text, extract_text_from_page,
    ExtractedFont, ExtractedImage, ExtractedLink, TextRun,
};
pub use font::{FontEntry, TtfFont};
pub use image::{recompress_images, RawImage, RecompressFormat, RecompressOptions};
pub use matrix::CurTransMat;
pub use object::{Dict, Obj, ObjId, StreamObj, StringFormat};
pub use ops::{ContentItem, ImageItem, LineType, PaintStyle, TextItem};
pub use page::{Page, PageOption, PageSize};
pub use revise::{
    convert_color_operators, copy_object, get_dict_key, get_stream, read_object, rebuild_xref,
    set_dict_key, set_stream, update_object, ColorTarget,
};
pub use serialize::SaveOptions;
pub use text::{Border, BreakMode, CellOption, Float, HAlign, VAlign};
pub use units::{Mm, Pt, Px, Unit};
pub use utils::{OsRng, Rng, SeededRng};
pub use xmp::xmp_packet;
