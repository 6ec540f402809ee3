//! The document: object table, pages, fonts, images, cursor state and
//! the save pipeline that turns all of it into file bytes.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use log::debug;
use time::OffsetDateTime;

use crate::annotation::Annotation;
use crate::cmap::generate_to_unicode;
use crate::color::{Cmyk, Color, Rgb};
use crate::encryption::{EncryptionState, Protection};
use crate::errors::{PdfError, Result};
use crate::font::{FontEntry, FontList, TtfFont};
use crate::image::RawImage;
use crate::matrix::CurTransMat;
use crate::object::{Dict, Obj, ObjId, StreamObj, StringFormat};
use crate::ops::{ContentItem, EmitCtx, ImageItem, LineType, PaintStyle, TextItem};
use crate::page::{Page, PageOption, PageSize, PdfRect};
use crate::serialize::{incremental_update, FileWriter, SaveOptions};
use crate::text::{CellOption, Float, HAlign, VAlign};
use crate::units::Unit;
use crate::utils::{rng_bytes, subset_tag, OsRng, Rng};
use crate::xobject::{image_to_stream, smask_to_stream, XObjectList};

/// Transparency blend modes for `set_transparency`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    fn pdf_name(self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
        }
    }
}

/// An `/ExtGState` definition shared by all items referencing it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExtGStateDef {
    pub fill_alpha: f32,
    pub stroke_alpha: f32,
    pub blend: BlendMode,
}

/// Garbage-collection levels of [`Document::garbage_collect`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GcLevel {
    None,
    /// drop `Null` slots and renumber
    Compact,
    /// additionally merge byte-identical objects, then compact
    Dedup,
}

/// Document-wide configuration, applied by [`Document::start`]
#[derive(Debug, Clone)]
pub struct DocConfig {
    pub page_size: PageSize,
    pub unit: Unit,
    /// written into the `%PDF-x.y` header
    pub version: String,
    pub compress: bool,
    pub protection: Option<Protection>,
    pub use_kerning: bool,
}

impl Default for DocConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            unit: Unit::Pt,
            version: "1.7".to_string(),
            compress: true,
            protection: None,
            use_kerning: false,
        }
    }
}

/// Document metadata written to the `/Info` dictionary
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub creator: String,
    pub producer: String,
    pub keywords: Vec<String>,
    pub creation_date: Option<OffsetDateTime>,
    pub mod_date: Option<OffsetDateTime>,
}

/// Styles of a `/PageLabels` number tree entry
#[derive(Debug, Clone, PartialEq)]
pub enum PageLabelStyle {
    Decimal,
    RomanUpper,
    RomanLower,
    LetterUpper,
    LetterLower,
}

#[derive(Debug, Clone)]
pub struct PageLabel {
    /// 0-based first page this label range applies to
    pub from_page: usize,
    pub style: PageLabelStyle,
    pub prefix: String,
    pub start_at: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DocState {
    Fresh,
    Started,
    PageOpen,
    Closed,
}

#[derive(Debug, Clone)]
struct Cursor {
    page: usize,
    /// points, top-down
    x: f32,
    y: f32,
    font: Option<usize>,
    font_size: f32,
    underline: bool,
    text_color: Color,
    char_spacing: f32,
    transparency: Option<usize>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            page: 0,
            x: 0.0,
            y: 0.0,
            font: None,
            font_size: 12.0,
            underline: false,
            text_color: Color::BLACK,
            char_spacing: 0.0,
            transparency: None,
        }
    }
}

type PageHook = Rc<dyn Fn(&mut Document)>;
type SharedRng = Rc<RefCell<Box<dyn Rng>>>;

/// A PDF document under construction (or under revision after import)
pub struct Document {
    objects: Vec<Obj>,
    pages: Vec<Page>,
    catalog_id: Option<ObjId>,
    pages_root_id: Option<ObjId>,
    pub(crate) fonts: FontList,
    xobjects: XObjectList,
    extgstates: Vec<ExtGStateDef>,
    /// imported Form XObjects: (object, native width, native height)
    templates: Vec<(ObjId, f32, f32)>,
    cursor: Cursor,
    config: DocConfig,
    pub info: DocumentInfo,
    pub page_labels: Vec<PageLabel>,
    xmp_metadata: Option<String>,
    state: DocState,
    rng: SharedRng,
    header_hook: Option<PageHook>,
    footer_hook: Option<PageHook>,
    in_hook: bool,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("objects", &self.objects.len())
            .field("pages", &self.pages.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            pages: Vec::new(),
            catalog_id: None,
            pages_root_id: None,
            fonts: FontList::default(),
            xobjects: XObjectList::default(),
            extgstates: Vec::new(),
            templates: Vec::new(),
            cursor: Cursor::default(),
            config: DocConfig::default(),
            info: DocumentInfo::default(),
            page_labels: Vec::new(),
            xmp_metadata: None,
            state: DocState::Fresh,
            rng: Rc::new(RefCell::new(Box::new(OsRng) as Box<dyn Rng>)),
            header_hook: None,
            footer_hook: None,
            in_hook: false,
        }
    }

    /// Applies the configuration; must be called before drawing
    pub fn start(&mut self, config: DocConfig) {
        self.config = config;
        if self.state == DocState::Fresh {
            self.state = DocState::Started;
        }
    }

    /// Replaces the randomness source (file ID, salts, IVs, font tags).
    /// With a seeded source the output bytes are fully deterministic.
    pub fn set_rng(&mut self, rng: Box<dyn Rng>) {
        self.rng = Rc::new(RefCell::new(rng));
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == DocState::Closed {
            return Err(PdfError::DocumentClosed);
        }
        Ok(())
    }

    /// points per configured unit
    fn u(&self, v: f32) -> f32 {
        v * self.config.unit.to_pt()
    }

    // -----------------------------------------------------------------
    // object table
    // -----------------------------------------------------------------

    /// Appends a new indirect object and returns its identifier
    pub fn add_obj(&mut self, obj: Obj) -> ObjId {
        self.objects.push(obj);
        ObjId(self.objects.len() - 1)
    }

    fn alloc_slot(&mut self) -> ObjId {
        self.add_obj(Obj::Null)
    }

    pub fn get_obj(&self, id: ObjId) -> Option<&Obj> {
        self.objects.get(id.0)
    }

    pub fn replace_obj(&mut self, id: ObjId, obj: Obj) -> Result<()> {
        let slot = self
            .objects
            .get_mut(id.0)
            .ok_or(PdfError::ElementOutOfRange(id.0, 0))?;
        *slot = obj;
        Ok(())
    }

    /// Turns the slot into a typed `Null` placeholder. The number stays
    /// reserved until a compaction pass renumbers.
    pub fn null_obj(&mut self, id: ObjId) -> Result<()> {
        self.replace_obj(id, Obj::Null)
    }

    /// Stores a stream object. The body is kept as plaintext; filters
    /// and encryption apply at write time, and reading back through
    /// [`Document::get_stream`] yields the plaintext again.
    pub fn set_stream(&mut self, id: ObjId, dict: Dict, body: Vec<u8>) -> Result<()> {
        self.replace_obj(id, Obj::Stream(StreamObj::new(dict, body)))
    }

    pub fn get_stream(&self, id: ObjId) -> Option<&[u8]> {
        match self.objects.get(id.0)? {
            Obj::Stream(s) => Some(&s.content),
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // pages
    // -----------------------------------------------------------------

    pub fn add_page(&mut self) -> Result<usize> {
        self.add_page_with_option(PageOption::default())
    }

    pub fn add_page_with_option(&mut self, option: PageOption) -> Result<usize> {
        self.ensure_open()?;
        if !self.in_hook {
            if let (Some(hook), true) = (self.footer_hook.clone(), !self.pages.is_empty()) {
                self.in_hook = true;
                hook(self);
                self.in_hook = false;
            }
        }

        let size = option.page_size.unwrap_or(self.config.page_size);
        let obj_id = self.alloc_slot();
        let content_id = self.alloc_slot();
        let mut page = Page::new(obj_id, content_id, size);
        page.trim_box = option.trim_box;
        page.crop_box = option.crop_box;
        self.pages.push(page);
        self.cursor.page = self.pages.len() - 1;
        self.cursor.x = 0.0;
        self.cursor.y = 0.0;
        self.state = DocState::PageOpen;

        if !self.in_hook {
            if let Some(hook) = self.header_hook.clone() {
                self.in_hook = true;
                hook(self);
                self.in_hook = false;
            }
        }
        Ok(self.pages.len())
    }

    /// Runs at every page open, after the page exists
    pub fn set_header(&mut self, hook: impl Fn(&mut Document) + 'static) {
        self.header_hook = Some(Rc::new(hook));
    }

    /// Runs when the next page is opened, before the switch
    pub fn set_footer(&mut self, hook: impl Fn(&mut Document) + 'static) {
        self.footer_hook = Some(Rc::new(hook));
    }

    fn page_index(&self, page_no: usize) -> Result<usize> {
        if page_no == 0 || page_no > self.pages.len() {
            return Err(PdfError::PageOutOfRange(page_no, self.pages.len()));
        }
        Ok(page_no - 1)
    }

    fn current_page_mut(&mut self) -> Result<&mut Page> {
        if self.pages.is_empty() {
            return Err(PdfError::NoPages);
        }
        let idx = self.cursor.page.min(self.pages.len() - 1);
        Ok(&mut self.pages[idx])
    }

    fn push_item(&mut self, item: ContentItem) -> Result<()> {
        self.ensure_open()?;
        self.current_page_mut()?.items.push(item);
        Ok(())
    }

    /// `deg` must be a multiple of 90; stored on the page dictionary
    pub fn set_page_rotation(&mut self, page_no: usize, deg: i32) -> Result<()> {
        if deg % 90 != 0 {
            return Err(PdfError::UnsupportedRotation(deg));
        }
        let idx = self.page_index(page_no)?;
        self.pages[idx].rotation = deg.rem_euclid(360);
        Ok(())
    }

    pub fn set_page_crop_box(&mut self, page_no: usize, rect: PdfRect) -> Result<()> {
        let idx = self.page_index(page_no)?;
        self.pages[idx].crop_box = Some(rect);
        Ok(())
    }

    pub fn clear_page_crop_box(&mut self, page_no: usize) -> Result<()> {
        let idx = self.page_index(page_no)?;
        self.pages[idx].crop_box = None;
        Ok(())
    }

    /// Removes the page and nulls its object slots
    pub fn delete_page(&mut self, page_no: usize) -> Result<()> {
        let idx = self.page_index(page_no)?;
        let page = self.pages.remove(idx);
        self.null_obj(page.obj_id)?;
        self.null_obj(page.content_id)?;
        if self.cursor.page >= self.pages.len() && !self.pages.is_empty() {
            self.cursor.page = self.pages.len() - 1;
        }
        Ok(())
    }

    /// Batch delete; duplicates are ignored, deletion runs descending.
    /// Refuses to remove every page.
    pub fn delete_pages(&mut self, page_nos: &[usize]) -> Result<()> {
        let mut unique: BTreeSet<usize> = BTreeSet::new();
        for &no in page_nos {
            self.page_index(no)?;
            unique.insert(no);
        }
        if unique.len() >= self.pages.len() {
            return Err(PdfError::WouldEmpty);
        }
        for no in unique.into_iter().rev() {
            self.delete_page(no)?;
        }
        Ok(())
    }

    /// Appends a duplicate of the page, returns the new page number
    pub fn copy_page(&mut self, page_no: usize) -> Result<usize> {
        let idx = self.page_index(page_no)?;
        let obj_id = self.alloc_slot();
        let content_id = self.alloc_slot();
        let copy = self.pages[idx].duplicate(obj_id, content_id);
        self.pages.push(copy);
        Ok(self.pages.len())
    }

    pub fn move_page(&mut self, src_no: usize, dst_no: usize) -> Result<()> {
        let src = self.page_index(src_no)?;
        let dst = self.page_index(dst_no)?;
        let page = self.pages.remove(src);
        self.pages.insert(dst, page);
        Ok(())
    }

    /// Builds a new document containing only the selected pages (in the
    /// given order). Fonts, images and graphics states carry over.
    pub fn select_pages(&mut self, page_nos: &[usize]) -> Result<Document> {
        for &no in page_nos {
            self.page_index(no)?;
        }
        let mut doc = Document::new();
        doc.start(self.config.clone());
        doc.info = self.info.clone();
        doc.fonts = self.fonts.clone();
        doc.xobjects = self.xobjects.clone();
        doc.extgstates = self.extgstates.clone();
        // templates live in the object table, copy their subgraphs over
        let mut cache: HashMap<usize, ObjId> = HashMap::new();
        for (id, w, h) in self.templates.clone() {
            let copied = copy_subgraph(&self.objects, id, &mut doc, &mut cache);
            doc.templates.push((copied, w, h));
        }
        for &no in page_nos {
            let idx = no - 1;
            let obj_id = doc.alloc_slot();
            let content_id = doc.alloc_slot();
            let copy = self.pages[idx].duplicate(obj_id, content_id);
            doc.pages.push(copy);
        }
        doc.state = if doc.pages.is_empty() {
            DocState::Started
        } else {
            DocState::PageOpen
        };
        Ok(doc)
    }

    // -----------------------------------------------------------------
    // fonts
    // -----------------------------------------------------------------

    /// Registers a TrueType font under a family name and style
    /// (`""`, `"B"`, `"I"`, `"BI"`)
    pub fn add_ttf_font(
        &mut self,
        family: &str,
        style: &str,
        bytes: Vec<u8>,
    ) -> Result<usize> {
        if family.is_empty() {
            return Err(PdfError::MissingFontFamily);
        }
        let style = normalize_style(style);
        if let Some(idx) = self.fonts.find(family, &style) {
            return Ok(idx);
        }
        let ttf = TtfFont::parse(bytes)?;
        let mut entry = FontEntry::new(family, style, ttf);
        entry.kerning = self.config.use_kerning;
        Ok(self.fonts.push(entry))
    }

    pub fn add_ttf_font_from_file(
        &mut self,
        family: &str,
        style: &str,
        path: &std::path::Path,
    ) -> Result<usize> {
        let bytes = std::fs::read(path)?;
        self.add_ttf_font(family, style, bytes)
    }

    /// Selects the current font. The style may additionally contain
    /// `U` for underline.
    pub fn set_font(&mut self, family: &str, style: &str, size: f32) -> Result<()> {
        if family.is_empty() {
            return Err(PdfError::MissingFontFamily);
        }
        let underline = style.contains('U') || style.contains('u');
        let lookup_style = normalize_style(style);
        let idx = self
            .fonts
            .find(family, &lookup_style)
            .ok_or_else(|| PdfError::FontNotFound(family.to_string(), lookup_style.clone()))?;
        self.cursor.font = Some(idx);
        self.cursor.font_size = size;
        self.cursor.underline = underline;
        Ok(())
    }

    pub fn set_font_size(&mut self, size: f32) {
        self.cursor.font_size = size;
    }

    // -----------------------------------------------------------------
    // cursor + state setters
    // -----------------------------------------------------------------

    pub fn set_x(&mut self, x: f32) {
        self.cursor.x = self.u(x);
    }

    pub fn set_y(&mut self, y: f32) {
        self.cursor.y = self.u(y);
    }

    pub fn set_xy(&mut self, x: f32, y: f32) {
        self.set_x(x);
        self.set_y(y);
    }

    pub fn get_x(&self) -> f32 {
        self.cursor.x / self.config.unit.to_pt()
    }

    pub fn get_y(&self) -> f32 {
        self.cursor.y / self.config.unit.to_pt()
    }

    pub fn set_text_color_rgb(&mut self, r: u8, g: u8, b: u8) {
        self.cursor.text_color = Color::Rgb(Rgb::from_u8(r, g, b));
    }

    pub fn set_text_color_cmyk(&mut self, c: f32, m: f32, y: f32, k: f32) {
        self.cursor.text_color = Color::Cmyk(Cmyk::new(c, m, y, k));
    }

    pub fn set_fill_color_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.push_item(ContentItem::RgbFill(Rgb::from_u8(r, g, b)))
    }

    pub fn set_stroke_color_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.push_item(ContentItem::RgbStroke(Rgb::from_u8(r, g, b)))
    }

    pub fn set_fill_color_cmyk(&mut self, c: f32, m: f32, y: f32, k: f32) -> Result<()> {
        self.push_item(ContentItem::CmykFill(Cmyk::new(c, m, y, k)))
    }

    pub fn set_stroke_color_cmyk(&mut self, c: f32, m: f32, y: f32, k: f32) -> Result<()> {
        self.push_item(ContentItem::CmykStroke(Cmyk::new(c, m, y, k)))
    }

    pub fn set_gray_fill(&mut self, g: f32) -> Result<()> {
        self.push_item(ContentItem::GrayFill(g))
    }

    pub fn set_gray_stroke(&mut self, g: f32) -> Result<()> {
        self.push_item(ContentItem::GrayStroke(g))
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<()> {
        let w = self.u(width);
        self.push_item(ContentItem::LineWidth(w))
    }

    pub fn set_line_type(&mut self, kind: LineType) -> Result<()> {
        self.push_item(ContentItem::LineType(kind))
    }

    pub fn set_custom_line_type(&mut self, dashes: &[f32], phase: f32) -> Result<()> {
        let dashes = dashes.iter().map(|d| self.u(*d)).collect();
        self.push_item(ContentItem::LineType(LineType::Custom(dashes, phase)))
    }

    pub fn set_char_spacing(&mut self, spacing: f32) {
        self.cursor.char_spacing = self.u(spacing);
    }

    /// Enables kerning adjustments for subsequently drawn text
    pub fn use_kerning(&mut self, enabled: bool) {
        self.config.use_kerning = enabled;
        for idx in 0..self.fonts.len() {
            if let Some(f) = self.fonts.get_mut(idx) {
                f.kerning = enabled;
            }
        }
    }

    /// Applies alpha + blend mode through a shared `/ExtGState`
    pub fn set_transparency(&mut self, alpha: f32, blend: BlendMode) -> Result<()> {
        let def = ExtGStateDef {
            fill_alpha: alpha,
            stroke_alpha: alpha,
            blend,
        };
        let index = match self.extgstates.iter().position(|d| *d == def) {
            Some(i) => i,
            None => {
                self.extgstates.push(def);
                self.extgstates.len() - 1
            }
        };
        self.cursor.transparency = Some(index);
        self.push_item(ContentItem::ExtGState { index })
    }

    pub fn clear_transparency(&mut self) -> Result<()> {
        self.cursor.transparency = None;
        self.set_transparency(1.0, BlendMode::Normal)?;
        self.cursor.transparency = None;
        Ok(())
    }

    // -----------------------------------------------------------------
    // drawing
    // -----------------------------------------------------------------

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<()> {
        let item = ContentItem::Line {
            x1: self.u(x1),
            y1: self.u(y1),
            x2: self.u(x2),
            y2: self.u(y2),
        };
        self.push_item(item)
    }

    /// `style` is `"D"`, `"F"` or `"FD"`; `radius > 0` rounds the
    /// corners with `segments` Bézier arcs per quarter
    pub fn rectangle(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        style: &str,
        radius: f32,
        segments: usize,
    ) -> Result<()> {
        let item = ContentItem::Rectangle {
            x1: self.u(x1),
            y1: self.u(y1),
            x2: self.u(x2),
            y2: self.u(y2),
            style: PaintStyle::parse(style),
            radius: self.u(radius),
            segments,
        };
        self.push_item(item)
    }

    pub fn oval(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, style: &str) -> Result<()> {
        let item = ContentItem::Oval {
            x1: self.u(x1),
            y1: self.u(y1),
            x2: self.u(x2),
            y2: self.u(y2),
            style: PaintStyle::parse(style),
        };
        self.push_item(item)
    }

    pub fn polygon(&mut self, points: &[(f32, f32)], style: &str) -> Result<()> {
        let points = points.iter().map(|(x, y)| (self.u(*x), self.u(*y))).collect();
        self.push_item(ContentItem::Polygon {
            points,
            style: PaintStyle::parse(style),
        })
    }

    pub fn polyline(&mut self, points: &[(f32, f32)]) -> Result<()> {
        let points = points.iter().map(|(x, y)| (self.u(*x), self.u(*y))).collect();
        self.push_item(ContentItem::Polyline { points })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn curve(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
        style: &str,
    ) -> Result<()> {
        let item = ContentItem::Curve {
            x0: self.u(x0),
            y0: self.u(y0),
            x1: self.u(x1),
            y1: self.u(y1),
            x2: self.u(x2),
            y2: self.u(y2),
            x3: self.u(x3),
            y3: self.u(y3),
            style: PaintStyle::parse(style),
        };
        self.push_item(item)
    }

    pub fn sector(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        start_deg: f32,
        end_deg: f32,
        style: &str,
    ) -> Result<()> {
        let item = ContentItem::Sector {
            cx: self.u(cx),
            cy: self.u(cy),
            radius: self.u(radius),
            start_deg,
            end_deg,
            style: PaintStyle::parse(style),
        };
        self.push_item(item)
    }

    pub fn clip_polygon(&mut self, points: &[(f32, f32)]) -> Result<()> {
        let points = points.iter().map(|(x, y)| (self.u(*x), self.u(*y))).collect();
        self.push_item(ContentItem::ClipPolygon { points })
    }

    /// Rotates subsequent drawing about a point; close with
    /// [`Document::rotate_reset`]
    pub fn rotate(&mut self, angle_deg: f32, cx: f32, cy: f32) -> Result<()> {
        let item = ContentItem::Rotate {
            angle_deg,
            cx: self.u(cx),
            cy: self.u(cy),
        };
        self.push_item(item)
    }

    pub fn rotate_reset(&mut self) -> Result<()> {
        self.push_item(ContentItem::RotateReset)
    }

    pub fn save_graphics_state(&mut self) -> Result<()> {
        self.push_item(ContentItem::SaveGraphicsState)
    }

    pub fn restore_graphics_state(&mut self) -> Result<()> {
        self.push_item(ContentItem::RestoreGraphicsState)
    }

    pub fn set_page_transform_matrix(
        &mut self,
        a: f32,
        b: f32,
        c: f32,
        d: f32,
        e: f32,
        f: f32,
    ) -> Result<()> {
        self.push_item(ContentItem::ConcatMatrix(CurTransMat::Raw([
            a, b, c, d, e, f,
        ])))
    }

    // -----------------------------------------------------------------
    // images
    // -----------------------------------------------------------------

    /// Decodes and registers an image; identical bytes return the same
    /// handle
    pub fn add_image_from_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let image = RawImage::decode(bytes)?;
        Ok(self.xobjects.add(image))
    }

    /// Places a registered image. Without a size the natural size at
    /// 72 dpi applies.
    pub fn image(
        &mut self,
        handle: usize,
        x: f32,
        y: f32,
        size: Option<(f32, f32)>,
    ) -> Result<()> {
        let (iw, ih) = {
            let img = self
                .xobjects
                .get(handle)
                .ok_or_else(|| PdfError::ImageParse(format!("unknown image handle {}", handle)))?;
            (img.width as f32, img.height as f32)
        };
        let (width, height) = match size {
            Some((w, h)) => (self.u(w), self.u(h)),
            None => (iw, ih),
        };
        let item = ContentItem::Image(ImageItem {
            xobject: handle,
            x: self.u(x),
            y: self.u(y),
            width,
            height,
            transform: None,
        });
        self.push_item(item)
    }

    /// Selects a named fill color space (`DeviceGray`, `DeviceRGB`,
    /// `DeviceCMYK` or a resource name)
    pub fn set_color_space(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PdfError::EmptyString);
        }
        self.push_item(ContentItem::ColorSpace(name.to_string()))
    }

    /// Imports one page of a foreign file as a reusable template
    /// (Form XObject), deep-copying the objects it references.
    /// Returns a handle for [`Document::use_imported_template`].
    pub fn import_page_as_template(&mut self, data: &[u8], page_index: usize) -> Result<usize> {
        let parsed = crate::deserialize::ParsedPdf::parse(data)?;
        let pages = parsed.pages()?;
        let page = pages
            .get(page_index)
            .ok_or(PdfError::PageOutOfRange(page_index + 1, pages.len()))?;
        let content = parsed.page_content(page)?;
        let (width, height) = (page.width(), page.height());

        let mut cache: HashMap<usize, ObjId> = HashMap::new();
        let resources = self.import_foreign(&parsed, &Obj::Dictionary(page.resources.clone()), &mut cache);

        let mut dict = Dict::new();
        dict.set("Type", Obj::name("XObject"));
        dict.set("Subtype", Obj::name("Form"));
        dict.set(
            "BBox",
            Obj::Array(vec![
                Obj::Integer(0),
                Obj::Integer(0),
                Obj::Real(width),
                Obj::Real(height),
            ]),
        );
        dict.set("Resources", resources);
        let id = self.add_obj(Obj::Stream(StreamObj::new(dict, content)));
        self.templates.push((id, width, height));
        Ok(self.templates.len() - 1)
    }

    /// Places an imported template, scaled into `width` × `height`
    pub fn use_imported_template(
        &mut self,
        handle: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<()> {
        let (_, nw, nh) = *self
            .templates
            .get(handle)
            .ok_or(PdfError::ElementOutOfRange(handle, 0))?;
        let item = ContentItem::ImportedTemplate {
            template: handle,
            x: self.u(x),
            y: self.u(y),
            width: self.u(width),
            height: self.u(height),
            native_width: nw,
            native_height: nh,
        };
        self.push_item(item)
    }

    /// Deep copy of a foreign object graph into this document's table
    fn import_foreign(
        &mut self,
        parsed: &crate::deserialize::ParsedPdf,
        obj: &Obj,
        cache: &mut HashMap<usize, ObjId>,
    ) -> Obj {
        match obj {
            Obj::Reference(foreign_id) => {
                let foreign_no = foreign_id.ref_no();
                if let Some(&local) = cache.get(&foreign_no) {
                    return Obj::Reference(local);
                }
                let slot = self.alloc_slot();
                cache.insert(foreign_no, slot);
                let target = parsed.object(foreign_no as u32).cloned().unwrap_or(Obj::Null);
                let imported = self.import_foreign(parsed, &target, cache);
                self.objects[slot.0] = imported;
                Obj::Reference(slot)
            }
            Obj::Array(items) => Obj::Array(
                items
                    .iter()
                    .map(|i| self.import_foreign(parsed, i, cache))
                    .collect(),
            ),
            Obj::Dictionary(dict) => {
                let mut out = Dict::new();
                for (k, v) in dict.iter() {
                    out.set(k, self.import_foreign(parsed, v, cache));
                }
                Obj::Dictionary(out)
            }
            Obj::Stream(stream) => {
                let mut out = Dict::new();
                for (k, v) in stream.dict.iter() {
                    out.set(k, self.import_foreign(parsed, v, cache));
                }
                // content stays in its stored encoding; the dict keeps
                // the matching /Filter entry
                Obj::Stream(StreamObj::new(out, stream.content.clone()))
            }
            other => other.clone(),
        }
    }

    // -----------------------------------------------------------------
    // annotations
    // -----------------------------------------------------------------

    pub fn add_link(&mut self, x: f32, y: f32, width: f32, height: f32, uri: &str) -> Result<()> {
        if uri.is_empty() {
            return Err(PdfError::EmptyString);
        }
        let annot = Annotation::Link {
            x: self.u(x),
            y: self.u(y),
            width: self.u(width),
            height: self.u(height),
            uri: uri.to_string(),
        };
        self.current_page_mut()?.annotations.push(annot);
        Ok(())
    }

    /// `target_page` is 1-based
    pub fn add_internal_link(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        target_page: usize,
        target_top: f32,
    ) -> Result<()> {
        let target = self.page_index(target_page)?;
        let annot = Annotation::InternalLink {
            x: self.u(x),
            y: self.u(y),
            width: self.u(width),
            height: self.u(height),
            page: target,
            top: self.u(target_top),
        };
        self.current_page_mut()?.annotations.push(annot);
        Ok(())
    }

    // -----------------------------------------------------------------
    // text
    // -----------------------------------------------------------------

    fn current_font(&self) -> Result<(usize, &FontEntry)> {
        let idx = self.cursor.font.ok_or(PdfError::MissingFontFamily)?;
        let entry = self
            .fonts
            .get(idx)
            .ok_or(PdfError::MissingFontFamily)?;
        Ok((idx, entry))
    }

    /// Writes text at the current position and advances x
    pub fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(PdfError::EmptyString);
        }
        self.ensure_open()?;
        let (font_idx, entry) = self.current_font()?;
        let size = self.cursor.font_size;
        let baseline =
            self.cursor.y + entry.ascent() as f32 / entry.units_per_em() as f32 * size;
        let width = entry.text_width(text, size, self.cursor.char_spacing, entry.kerning);
        let opt = CellOption::default();
        let item = TextItem {
            x: self.cursor.x,
            y: baseline,
            font: font_idx,
            size,
            color: self.cursor.text_color,
            char_spacing: self.cursor.char_spacing,
            underline: self
                .cursor
                .underline
                .then_some((opt.underline_position, opt.underline_thickness)),
            kerning: entry.kerning,
            text: text.to_string(),
        };
        if let Some(f) = self.fonts.get_mut(font_idx) {
            f.track(text);
        }
        self.current_page_mut()?.items.push(ContentItem::Text(item));
        self.cursor.x += width;
        Ok(())
    }

    /// One cell of text. `rect` is `(w, h)` starting at the cursor;
    /// `None` sizes the cell to its content.
    pub fn cell(&mut self, rect: Option<(f32, f32)>, text: &str) -> Result<()> {
        self.cell_with_option(rect, text, &CellOption::default())
    }

    pub fn cell_with_option(
        &mut self,
        rect: Option<(f32, f32)>,
        text: &str,
        opt: &CellOption,
    ) -> Result<()> {
        self.ensure_open()?;
        let (font_idx, entry) = self.current_font()?;
        let size = self.cursor.font_size;
        let upem = entry.units_per_em() as f32;
        let ascent_pt = entry.ascent() as f32 / upem * size;
        let descent_pt = entry.descent() as f32 / upem * size;
        let text_w = entry.text_width(text, size, self.cursor.char_spacing, entry.kerning);

        let (w, h) = match rect {
            Some((w, h)) => (self.u(w), self.u(h)),
            None => (text_w, size * opt.line_height),
        };
        let (x, y) = (self.cursor.x, self.cursor.y);

        let text_x = match opt.h_align {
            HAlign::Left => x,
            HAlign::Center => x + (w - text_w) / 2.0,
            HAlign::Right => x + w - text_w,
        };
        let text_h = ascent_pt - descent_pt;
        let baseline = match opt.v_align {
            VAlign::Top => y + ascent_pt,
            VAlign::Middle => y + (h - text_h) / 2.0 + ascent_pt,
            VAlign::Bottom => y + h + descent_pt,
        };

        self.push_cell_borders(x, y, w, h, opt.border)?;

        let item = TextItem {
            x: text_x,
            y: baseline,
            font: font_idx,
            size,
            color: self.cursor.text_color,
            char_spacing: self.cursor.char_spacing,
            underline: self
                .cursor
                .underline
                .then_some((opt.underline_position, opt.underline_thickness)),
            kerning: self.fonts.get(font_idx).map(|f| f.kerning).unwrap_or(false),
            text: text.to_string(),
        };
        if let Some(f) = self.fonts.get_mut(font_idx) {
            f.track(text);
        }
        self.current_page_mut()?.items.push(ContentItem::Text(item));

        match opt.float {
            Float::Right => self.cursor.x = x + w,
            Float::Bottom => {
                self.cursor.x = x;
                self.cursor.y = y + h;
            }
        }
        Ok(())
    }

    /// Text wrapped into a fixed-width cell over as many lines as
    /// needed
    pub fn multi_cell(&mut self, rect: (f32, f32), text: &str) -> Result<()> {
        self.multi_cell_with_option(rect, text, &CellOption::default())
    }

    pub fn multi_cell_with_option(
        &mut self,
        rect: (f32, f32),
        text: &str,
        opt: &CellOption,
    ) -> Result<()> {
        self.ensure_open()?;
        let (_, entry) = self.current_font()?;
        let size = self.cursor.font_size;
        let w = self.u(rect.0);
        let h = self.u(rect.1);
        let lines = crate::text::break_text(
            text,
            entry,
            size,
            self.cursor.char_spacing,
            entry.kerning,
            w,
            &opt.break_mode,
        );
        let line_h = size * opt.line_height;
        let (x0, y0) = (self.cursor.x, self.cursor.y);

        self.push_cell_borders(x0, y0, w, h, opt.border)?;

        let mut line_opt = opt.clone();
        line_opt.border = crate::text::Border::NONE;
        line_opt.float = Float::Bottom;
        for line in &lines {
            if self.cursor.y + line_h > y0 + h + 0.01 {
                break;
            }
            if line.is_empty() {
                self.cursor.y += line_h;
                continue;
            }
            self.cell_with_option(
                Some((w / self.config.unit.to_pt(), line_h / self.config.unit.to_pt())),
                line,
                &line_opt,
            )?;
        }
        self.cursor.x = x0;
        self.cursor.y = y0 + h;
        Ok(())
    }

    fn push_cell_borders(&mut self, x: f32, y: f32, w: f32, h: f32, border: u8) -> Result<()> {
        use crate::text::Border;
        if border == Border::NONE {
            return Ok(());
        }
        if border & Border::ALL == Border::ALL {
            return self.current_page_mut().map(|p| {
                p.items.push(ContentItem::Rectangle {
                    x1: x,
                    y1: y,
                    x2: x + w,
                    y2: y + h,
                    style: PaintStyle::Draw,
                    radius: 0.0,
                    segments: 0,
                })
            });
        }
        let page = self.current_page_mut()?;
        if border & Border::LEFT != 0 {
            page.items.push(ContentItem::Line { x1: x, y1: y, x2: x, y2: y + h });
        }
        if border & Border::TOP != 0 {
            page.items.push(ContentItem::Line { x1: x, y1: y, x2: x + w, y2: y });
        }
        if border & Border::RIGHT != 0 {
            page.items.push(ContentItem::Line { x1: x + w, y1: y, x2: x + w, y2: y + h });
        }
        if border & Border::BOTTOM != 0 {
            page.items.push(ContentItem::Line { x1: x, y1: y + h, x2: x + w, y2: y + h });
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // placeholders
    // -----------------------------------------------------------------

    /// Reserves a named text slot at the current position, resolved
    /// later by [`Document::fill_in_placeholder`]
    pub fn placeholder(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PdfError::EmptyString);
        }
        self.ensure_open()?;
        let (font_idx, entry) = self.current_font()?;
        let size = self.cursor.font_size;
        let baseline =
            self.cursor.y + entry.ascent() as f32 / entry.units_per_em() as f32 * size;
        let item = TextItem {
            x: self.cursor.x,
            y: baseline,
            font: font_idx,
            size,
            color: self.cursor.text_color,
            char_spacing: self.cursor.char_spacing,
            underline: None,
            kerning: entry.kerning,
            text: String::new(),
        };
        self.current_page_mut()?.items.push(ContentItem::Placeholder {
            name: name.to_string(),
            item,
        });
        Ok(())
    }

    pub fn fill_in_placeholder(&mut self, name: &str, text: &str) -> Result<()> {
        let mut font_idx = None;
        let mut found = false;
        for page in &mut self.pages {
            for item in &mut page.items {
                if let ContentItem::Placeholder { name: n, item } = item {
                    if n == name {
                        item.text = text.to_string();
                        font_idx = Some(item.font);
                        found = true;
                    }
                }
            }
        }
        if !found {
            return Err(PdfError::PlaceholderNotFound(name.to_string()));
        }
        if let Some(idx) = font_idx {
            if let Some(f) = self.fonts.get_mut(idx) {
                f.track(text);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // element access
    // -----------------------------------------------------------------

    pub fn get_page_elements(&self, page_no: usize) -> Result<&[ContentItem]> {
        let idx = self.page_index(page_no)?;
        Ok(&self.pages[idx].items)
    }

    pub fn delete_element(&mut self, page_no: usize, index: usize) -> Result<()> {
        let idx = self.page_index(page_no)?;
        let items = &mut self.pages[idx].items;
        if index >= items.len() {
            return Err(PdfError::ElementOutOfRange(index, items.len()));
        }
        items.remove(index);
        Ok(())
    }

    /// Removes every item of the named kind, returns how many
    pub fn delete_elements_by_type(&mut self, page_no: usize, kind: &str) -> Result<usize> {
        let idx = self.page_index(page_no)?;
        let items = &mut self.pages[idx].items;
        let before = items.len();
        items.retain(|i| i.kind() != kind);
        Ok(before - items.len())
    }

    /// Removes every positionable item whose bounds intersect the rect
    /// (upper-left origin, configured units)
    pub fn delete_elements_in_rect(
        &mut self,
        page_no: usize,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<usize> {
        let idx = self.page_index(page_no)?;
        let (rx1, ry1) = (self.u(x), self.u(y));
        let (rx2, ry2) = (rx1 + self.u(w), ry1 + self.u(h));
        let items = &mut self.pages[idx].items;
        let before = items.len();
        items.retain(|item| match item.bounds() {
            Some((x1, y1, x2, y2)) => !(x1 < rx2 && x2 > rx1 && y1 < ry2 && y2 > ry1),
            None => true,
        });
        Ok(before - items.len())
    }

    pub fn clear_page(&mut self, page_no: usize) -> Result<()> {
        let idx = self.page_index(page_no)?;
        self.pages[idx].items.clear();
        Ok(())
    }

    pub fn modify_text_element(
        &mut self,
        page_no: usize,
        index: usize,
        new_text: &str,
    ) -> Result<()> {
        let idx = self.page_index(page_no)?;
        let len = self.pages[idx].items.len();
        let item = self.pages[idx]
            .items
            .get_mut(index)
            .ok_or(PdfError::ElementOutOfRange(index, len))?;
        let font_idx = match item {
            ContentItem::Text(t) | ContentItem::Placeholder { item: t, .. } => {
                t.text = new_text.to_string();
                t.font
            }
            other => return Err(PdfError::UnsupportedElementOp(other.kind())),
        };
        if let Some(f) = self.fonts.get_mut(font_idx) {
            f.track(new_text);
        }
        Ok(())
    }

    /// Repositions a shape, text or image item. State setters fail
    /// with `UnsupportedElementOp`.
    pub fn modify_element_position(
        &mut self,
        page_no: usize,
        index: usize,
        x: f32,
        y: f32,
    ) -> Result<()> {
        let (x, y) = (self.u(x), self.u(y));
        let idx = self.page_index(page_no)?;
        let len = self.pages[idx].items.len();
        let item = self.pages[idx]
            .items
            .get_mut(index)
            .ok_or(PdfError::ElementOutOfRange(index, len))?;
        if !item.set_position(x, y) {
            return Err(PdfError::UnsupportedElementOp(item.kind()));
        }
        Ok(())
    }

    pub fn replace_element(
        &mut self,
        page_no: usize,
        index: usize,
        new_item: ContentItem,
    ) -> Result<()> {
        let idx = self.page_index(page_no)?;
        let len = self.pages[idx].items.len();
        let slot = self.pages[idx]
            .items
            .get_mut(index)
            .ok_or(PdfError::ElementOutOfRange(index, len))?;
        *slot = new_item;
        Ok(())
    }

    pub fn insert_element_at(
        &mut self,
        page_no: usize,
        index: usize,
        new_item: ContentItem,
    ) -> Result<()> {
        let idx = self.page_index(page_no)?;
        let items = &mut self.pages[idx].items;
        if index > items.len() {
            return Err(PdfError::ElementOutOfRange(index, items.len()));
        }
        items.insert(index, new_item);
        Ok(())
    }

    /// Collapses consecutive identical state-setter items and removes
    /// empty save/restore pairs. Rendered output is unchanged; returns
    /// the number of removed items.
    pub fn clean_content_streams(&mut self) -> usize {
        let mut removed = 0;
        for page in &mut self.pages {
            let before = page.items.len();
            let mut cleaned: Vec<ContentItem> = Vec::with_capacity(before);
            for item in page.items.drain(..) {
                if item.is_state_setter() && cleaned.last() == Some(&item) {
                    continue;
                }
                let empty_pair = matches!(
                    (cleaned.last(), &item),
                    (Some(ContentItem::SaveGraphicsState), ContentItem::RestoreGraphicsState)
                        | (Some(ContentItem::Rotate { .. }), ContentItem::RotateReset)
                );
                if empty_pair {
                    cleaned.pop();
                    continue;
                }
                cleaned.push(item);
            }
            removed += before - cleaned.len();
            page.items = cleaned;
        }
        removed
    }

    // -----------------------------------------------------------------
    // metadata
    // -----------------------------------------------------------------

    /// Attaches an XMP metadata packet to the catalog
    pub fn set_xmp_metadata(&mut self, xmp: String) {
        self.xmp_metadata = Some(xmp);
    }

    pub fn add_page_label(&mut self, label: PageLabel) {
        self.page_labels.push(label);
    }

    pub fn set_protection(&mut self, protection: Protection) {
        self.config.protection = Some(protection);
    }

    // -----------------------------------------------------------------
    // compaction
    // -----------------------------------------------------------------

    /// Removes `Null` slots (`Compact`) and merges byte-identical
    /// objects first (`Dedup`). Returns the number of removed slots.
    pub fn garbage_collect(&mut self, level: GcLevel) -> Result<usize> {
        if level == GcLevel::None {
            return Ok(0);
        }
        if level == GcLevel::Dedup {
            let mut seen: HashMap<Vec<u8>, usize> = HashMap::new();
            let mut redirect: HashMap<usize, usize> = HashMap::new();
            for (i, obj) in self.objects.iter().enumerate() {
                if matches!(obj, Obj::Null) {
                    continue;
                }
                let mut bytes = Vec::new();
                obj.write(&mut bytes);
                match seen.get(&bytes) {
                    Some(&first) => {
                        redirect.insert(i, first);
                    }
                    None => {
                        seen.insert(bytes, i);
                    }
                }
            }
            // protect page + content slots: their identity matters
            for page in &self.pages {
                redirect.remove(&page.obj_id.0);
                redirect.remove(&page.content_id.0);
            }
            if !redirect.is_empty() {
                for obj in &mut self.objects {
                    remap_refs(obj, &redirect);
                }
                for (dup, _) in redirect {
                    self.objects[dup] = Obj::Null;
                }
            }
        }

        // compaction: drop Null slots, renumber everything. Slots that
        // are placeholders for live pages (filled at save time) stay.
        let mut protected: BTreeSet<usize> = BTreeSet::new();
        for page in &self.pages {
            protected.insert(page.obj_id.0);
            protected.insert(page.content_id.0);
        }
        for (id, _, _) in &self.templates {
            protected.insert(id.0);
        }
        let original_len = self.objects.len();
        let mut old_to_new: HashMap<usize, usize> = HashMap::new();
        let mut new_objects = Vec::with_capacity(original_len);
        for (i, obj) in self.objects.drain(..).enumerate() {
            if matches!(obj, Obj::Null) && !protected.contains(&i) {
                continue;
            }
            old_to_new.insert(i, new_objects.len());
            new_objects.push(obj);
        }
        let removed = original_len - new_objects.len();
        self.objects = new_objects;
        for obj in &mut self.objects {
            remap_refs(obj, &old_to_new);
        }
        for page in &mut self.pages {
            if let Some(&n) = old_to_new.get(&page.obj_id.0) {
                page.obj_id = ObjId(n);
            }
            if let Some(&n) = old_to_new.get(&page.content_id.0) {
                page.content_id = ObjId(n);
            }
        }
        if let Some(id) = self.catalog_id {
            self.catalog_id = old_to_new.get(&id.0).map(|&n| ObjId(n));
        }
        if let Some(id) = self.pages_root_id {
            self.pages_root_id = old_to_new.get(&id.0).map(|&n| ObjId(n));
        }
        for (id, _, _) in &mut self.templates {
            if let Some(&n) = old_to_new.get(&id.0) {
                *id = ObjId(n);
            }
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------
    // saving
    // -----------------------------------------------------------------

    pub fn save(&mut self) -> Result<Vec<u8>> {
        let compress = self.config.compress;
        self.save_with_options(&SaveOptions { compress })
    }

    /// Serializes into any writer (file, socket, buffer)
    pub fn save_to<W: std::io::Write>(&mut self, sink: &mut W) -> Result<()> {
        let bytes = self.save()?;
        sink.write_all(&bytes)?;
        Ok(())
    }

    pub fn save_with_options(&mut self, opts: &SaveOptions) -> Result<Vec<u8>> {
        self.ensure_open()?;
        for (i, page) in self.pages.iter().enumerate() {
            let depth = page.graphics_depth();
            if depth != 0 {
                return Err(PdfError::UnbalancedGraphicsState(i + 1, depth));
            }
        }

        let font_ids = self.build_font_objects()?;
        let image_ids = self.build_image_objects();
        let gs_ids = self.build_extgstate_objects();

        // content streams + page dictionaries
        let pages_root_id = self.alloc_slot();
        self.pages_root_id = Some(pages_root_id);
        let page_obj_ids: Vec<ObjId> = self.pages.iter().map(|p| p.obj_id).collect();

        let mut page_updates: Vec<(ObjId, Obj, ObjId, Obj)> = Vec::new();
        let mut annot_objs: Vec<(ObjId, Vec<Dict>)> = Vec::new();
        for page in &self.pages {
            let mut content = Vec::new();
            let ctx = EmitCtx {
                page_height: page.height(),
                fonts: &self.fonts,
            };
            for item in &page.items {
                item.emit(&mut content, &ctx);
            }
            let content_obj = Obj::Stream(StreamObj::new(Dict::new(), content));

            let mut dict = Dict::new();
            dict.set("Type", Obj::name("Page"));
            dict.set("Parent", pages_root_id);
            dict.set(
                "MediaBox",
                Obj::Array(vec![
                    Obj::Integer(0),
                    Obj::Integer(0),
                    Obj::Real(page.width()),
                    Obj::Real(page.height()),
                ]),
            );
            for (key, rect) in [
                ("CropBox", page.crop_box),
                ("TrimBox", page.trim_box),
                ("BleedBox", page.bleed_box),
                ("ArtBox", page.art_box),
            ] {
                if let Some(r) = rect {
                    dict.set(
                        key,
                        Obj::Array(r.iter().map(|v| Obj::Real(*v)).collect()),
                    );
                }
            }
            if page.rotation != 0 {
                dict.set("Rotate", page.rotation as i64);
            }
            dict.set("Contents", page.content_id);
            dict.set(
                "Resources",
                self.page_resources(page, &font_ids, &image_ids, &gs_ids),
            );
            if !page.annotations.is_empty() {
                let dicts: Vec<Dict> = page
                    .annotations
                    .iter()
                    .map(|a| a.to_dict(page.height(), &page_obj_ids))
                    .collect();
                annot_objs.push((page.obj_id, dicts));
            }
            page_updates.push((page.obj_id, Obj::Dictionary(dict), page.content_id, content_obj));
        }
        for (page_id, page_dict, content_id, content_obj) in page_updates {
            self.objects[page_id.0] = page_dict;
            self.objects[content_id.0] = content_obj;
        }
        for (page_id, dicts) in annot_objs {
            let refs: Vec<Obj> = dicts
                .into_iter()
                .map(|d| Obj::Reference(self.add_obj(Obj::Dictionary(d))))
                .collect();
            if let Some(d) = self.objects[page_id.0].as_dict_mut() {
                d.set("Annots", Obj::Array(refs));
            }
        }

        // pages root
        let mut pages_dict = Dict::new();
        pages_dict.set("Type", Obj::name("Pages"));
        pages_dict.set("Count", self.pages.len() as i64);
        pages_dict.set(
            "Kids",
            Obj::Array(
                self.pages
                    .iter()
                    .map(|p| Obj::Reference(p.obj_id))
                    .collect(),
            ),
        );
        self.objects[pages_root_id.0] = Obj::Dictionary(pages_dict);

        // catalog
        let mut catalog = Dict::new();
        catalog.set("Type", Obj::name("Catalog"));
        catalog.set("Pages", pages_root_id);
        if let Some(xmp) = self.xmp_metadata.clone() {
            let mut md = Dict::new();
            md.set("Type", Obj::name("Metadata"));
            md.set("Subtype", Obj::name("XML"));
            let id = self.add_obj(Obj::Stream(StreamObj::new(md, xmp.into_bytes())));
            catalog.set("Metadata", id);
        }
        if !self.page_labels.is_empty() {
            catalog.set("PageLabels", self.page_labels_dict());
        }
        let catalog_id = self.add_obj(Obj::Dictionary(catalog));
        self.catalog_id = Some(catalog_id);

        let info_id = self.add_obj(Obj::Dictionary(docinfo_to_dict(&self.info)));

        // file ID, required when encryption is on
        let file_id: [u8; 16] = rng_bytes(&mut **self.rng.borrow_mut());

        let encryption = match self.config.protection.clone() {
            Some(protection) => {
                let rng = Rc::clone(&self.rng);
                Some(EncryptionState::new(
                    &protection,
                    &file_id,
                    Box::new(SharedRngHandle(rng)),
                )?)
            }
            None => None,
        };
        let encrypt_id = encryption
            .as_ref()
            .map(|state| self.add_obj(Obj::Dictionary(state.dict())));

        // body + xref + trailer
        let mut writer = FileWriter::new(&self.config.version);
        for (i, obj) in self.objects.iter().enumerate() {
            let crypt = match (&encryption, encrypt_id) {
                (Some(state), Some(eid)) if eid.0 != i => Some((state, i + 1)),
                _ => None,
            };
            writer.write_object(obj, opts.compress, crypt);
        }

        let mut trailer = Dict::new();
        trailer.set("Root", catalog_id);
        trailer.set("Info", info_id);
        trailer.set(
            "ID",
            Obj::Array(vec![
                Obj::String(file_id.to_vec(), StringFormat::Hexadecimal),
                Obj::String(file_id.to_vec(), StringFormat::Hexadecimal),
            ]),
        );
        if let Some(eid) = encrypt_id {
            trailer.set("Encrypt", eid);
        }

        self.state = DocState::Closed;
        debug!("document closed with {} objects", self.objects.len());
        Ok(writer.finish(trailer))
    }

    /// Appends only `modified_ids` to `original` as an incremental
    /// update section
    pub fn save_incremental(&mut self, original: &[u8], modified_ids: &[ObjId]) -> Result<Vec<u8>> {
        let root = self.catalog_id.ok_or_else(|| {
            PdfError::IncrementalInvalid("document has no catalog yet".to_string())
        })?;
        let objects: Vec<(usize, &Obj)> = modified_ids
            .iter()
            .filter_map(|id| self.objects.get(id.0).map(|obj| (id.ref_no(), obj)))
            .collect();
        incremental_update(
            original,
            &objects,
            Obj::Reference(root),
            None,
            self.objects.len() + 1,
            self.config.compress,
        )
    }

    // -----------------------------------------------------------------
    // save helpers
    // -----------------------------------------------------------------

    /// Type0 + CIDFontType2 + descriptor + FontFile2 + ToUnicode per
    /// used font; unused fonts are skipped
    fn build_font_objects(&mut self) -> Result<Vec<Option<ObjId>>> {
        struct Built {
            idx: usize,
            subset: Vec<u8>,
            base_font: String,
            descriptor: Dict,
            widths: Vec<Obj>,
            to_unicode: String,
        }

        let mut built = Vec::new();
        {
            let mut rng = self.rng.borrow_mut();
            for (idx, entry) in self.fonts.iter() {
                if entry.used.is_empty() {
                    continue;
                }
                let gids = crate::subsetting::close_over_composites(
                    &entry.ttf,
                    &entry.used_gids(),
                )?;
                let subset = crate::subsetting::subset_font(&entry.ttf, &gids)?;
                let tag = subset_tag(&mut **rng);
                let base_font = format!("{}+{}", tag, entry.ttf.post_script_name);
                let scale = 1000.0 / entry.ttf.units_per_em as f32;

                let mut descriptor = Dict::new();
                descriptor.set("Type", Obj::name("FontDescriptor"));
                descriptor.set("FontName", Obj::name(base_font.clone()));
                // bit 3 symbolic when the text leaves the standard
                // Roman set, bit 6 nonsymbolic otherwise
                descriptor.set("Flags", if entry.is_symbolic() { 4i64 } else { 32i64 });
                descriptor.set(
                    "FontBBox",
                    Obj::Array(vec![
                        Obj::Integer((entry.ttf.x_min as f32 * scale) as i64),
                        Obj::Integer((entry.ttf.y_min as f32 * scale) as i64),
                        Obj::Integer((entry.ttf.x_max as f32 * scale) as i64),
                        Obj::Integer((entry.ttf.y_max as f32 * scale) as i64),
                    ]),
                );
                descriptor.set("ItalicAngle", Obj::Real(entry.ttf.italic_angle));
                descriptor.set(
                    "Ascent",
                    Obj::Integer((entry.ttf.ascent as f32 * scale) as i64),
                );
                descriptor.set(
                    "Descent",
                    Obj::Integer((entry.ttf.descent as f32 * scale) as i64),
                );
                let cap = entry.ttf.cap_height.unwrap_or(entry.ttf.ascent);
                descriptor.set("CapHeight", Obj::Integer((cap as f32 * scale) as i64));
                descriptor.set(
                    "StemV",
                    Obj::Integer(if entry.style.contains('B') { 120 } else { 88 }),
                );

                // W array over used gids, consecutive runs grouped
                let mut widths: Vec<Obj> = Vec::new();
                let mut run_start: Option<u16> = None;
                let mut run: Vec<Obj> = Vec::new();
                let used: Vec<u16> = gids.iter().copied().collect();
                for (i, gid) in used.iter().enumerate() {
                    let w = (entry.ttf.advance(*gid) as f32 * scale) as i64;
                    match run_start {
                        Some(start)
                            if *gid == start + run.len() as u16 =>
                        {
                            run.push(Obj::Integer(w));
                        }
                        _ => {
                            if let Some(start) = run_start.take() {
                                widths.push(Obj::Integer(start as i64));
                                widths.push(Obj::Array(std::mem::take(&mut run)));
                            }
                            run_start = Some(*gid);
                            run.push(Obj::Integer(w));
                        }
                    }
                    if i == used.len() - 1 {
                        if let Some(start) = run_start.take() {
                            widths.push(Obj::Integer(start as i64));
                            widths.push(Obj::Array(std::mem::take(&mut run)));
                        }
                    }
                }

                let to_unicode = generate_to_unicode(&base_font, &entry.gid_to_unicode());

                built.push(Built {
                    idx,
                    subset,
                    base_font,
                    descriptor,
                    widths,
                    to_unicode,
                });
            }
        }

        let mut font_ids = vec![None; self.fonts.len()];
        for b in built {
            let subset_len = b.subset.len();
            let mut ff_dict = Dict::new();
            ff_dict.set("Length1", subset_len as i64);
            let font_file = self.add_obj(Obj::Stream(StreamObj::new(ff_dict, b.subset)));

            let mut descriptor = b.descriptor;
            descriptor.set("FontFile2", font_file);
            let descriptor_id = self.add_obj(Obj::Dictionary(descriptor));

            let mut cid = Dict::new();
            cid.set("Type", Obj::name("Font"));
            cid.set("Subtype", Obj::name("CIDFontType2"));
            cid.set("BaseFont", Obj::name(b.base_font.clone()));
            let mut sysinfo = Dict::new();
            sysinfo.set(
                "Registry",
                Obj::String(b"Adobe".to_vec(), StringFormat::Literal),
            );
            sysinfo.set(
                "Ordering",
                Obj::String(b"Identity".to_vec(), StringFormat::Literal),
            );
            sysinfo.set("Supplement", 0i64);
            cid.set("CIDSystemInfo", sysinfo);
            cid.set("FontDescriptor", descriptor_id);
            cid.set("DW", 1000i64);
            cid.set("W", Obj::Array(b.widths));
            cid.set("CIDToGIDMap", Obj::name("Identity"));
            let cid_id = self.add_obj(Obj::Dictionary(cid));

            let to_unicode_id = self.add_obj(Obj::Stream(StreamObj::new(
                Dict::new(),
                b.to_unicode.into_bytes(),
            )));

            let mut type0 = Dict::new();
            type0.set("Type", Obj::name("Font"));
            type0.set("Subtype", Obj::name("Type0"));
            type0.set("BaseFont", Obj::name(b.base_font));
            type0.set("Encoding", Obj::name("Identity-H"));
            type0.set("DescendantFonts", Obj::Array(vec![Obj::Reference(cid_id)]));
            type0.set("ToUnicode", to_unicode_id);
            font_ids[b.idx] = Some(self.add_obj(Obj::Dictionary(type0)));
        }
        Ok(font_ids)
    }

    fn build_image_objects(&mut self) -> Vec<Option<ObjId>> {
        let mut streams: Vec<(usize, Option<StreamObj>, StreamObj)> = Vec::new();
        for (idx, img) in self.xobjects.iter() {
            let smask = img
                .smask
                .as_ref()
                .map(|alpha| smask_to_stream(img.width, img.height, alpha));
            // the SMask reference is patched after allocation
            streams.push((idx, smask, image_to_stream(img, None)));
        }
        let mut ids = vec![None; self.xobjects.len()];
        for (idx, smask, mut image) in streams {
            let smask_id = smask.map(|s| self.add_obj(Obj::Stream(s)));
            if let Some(sid) = smask_id {
                image.dict.set("SMask", sid);
            }
            ids[idx] = Some(self.add_obj(Obj::Stream(image)));
        }
        ids
    }

    fn build_extgstate_objects(&mut self) -> Vec<ObjId> {
        let defs = self.extgstates.clone();
        defs.iter()
            .map(|def| {
                let mut dict = Dict::new();
                dict.set("Type", Obj::name("ExtGState"));
                dict.set("CA", Obj::Real(def.stroke_alpha));
                dict.set("ca", Obj::Real(def.fill_alpha));
                dict.set("BM", Obj::name(def.blend.pdf_name()));
                self.add_obj(Obj::Dictionary(dict))
            })
            .collect()
    }

    fn page_resources(
        &self,
        page: &Page,
        font_ids: &[Option<ObjId>],
        image_ids: &[Option<ObjId>],
        gs_ids: &[ObjId],
    ) -> Dict {
        let mut used_fonts: BTreeSet<usize> = BTreeSet::new();
        let mut used_images: BTreeSet<usize> = BTreeSet::new();
        let mut used_gs: BTreeSet<usize> = BTreeSet::new();
        let mut used_templates: BTreeSet<usize> = BTreeSet::new();
        for item in &page.items {
            match item {
                ContentItem::Text(t) | ContentItem::Placeholder { item: t, .. } => {
                    used_fonts.insert(t.font);
                }
                ContentItem::Image(img) => {
                    used_images.insert(img.xobject);
                }
                ContentItem::ImportedTemplate { template, .. } => {
                    used_templates.insert(*template);
                }
                ContentItem::ExtGState { index } => {
                    used_gs.insert(*index);
                }
                _ => {}
            }
        }

        let mut resources = Dict::new();
        resources.set(
            "ProcSet",
            Obj::Array(vec![
                Obj::name("PDF"),
                Obj::name("Text"),
                Obj::name("ImageB"),
                Obj::name("ImageC"),
                Obj::name("ImageI"),
            ]),
        );
        if !used_fonts.is_empty() {
            let mut fonts = Dict::new();
            for idx in used_fonts {
                if let Some(Some(id)) = font_ids.get(idx) {
                    fonts.set(format!("F{}", idx), *id);
                }
            }
            resources.set("Font", fonts);
        }
        if !used_images.is_empty() || !used_templates.is_empty() {
            let mut xobjects = Dict::new();
            for idx in used_images {
                if let Some(Some(id)) = image_ids.get(idx) {
                    xobjects.set(format!("X{}", idx), *id);
                }
            }
            for idx in used_templates {
                if let Some((id, _, _)) = self.templates.get(idx) {
                    xobjects.set(format!("TPL{}", idx), *id);
                }
            }
            resources.set("XObject", xobjects);
        }
        if !used_gs.is_empty() {
            let mut gs = Dict::new();
            for idx in used_gs {
                if let Some(id) = gs_ids.get(idx) {
                    gs.set(format!("GS{}", idx), *id);
                }
            }
            resources.set("ExtGState", gs);
        }
        resources
    }

    fn page_labels_dict(&self) -> Dict {
        let mut nums: Vec<Obj> = Vec::new();
        for label in &self.page_labels {
            nums.push(Obj::Integer(label.from_page as i64));
            let mut entry = Dict::new();
            let style = match label.style {
                PageLabelStyle::Decimal => "D",
                PageLabelStyle::RomanUpper => "R",
                PageLabelStyle::RomanLower => "r",
                PageLabelStyle::LetterUpper => "A",
                PageLabelStyle::LetterLower => "a",
            };
            entry.set("S", Obj::name(style));
            if !label.prefix.is_empty() {
                entry.set(
                    "P",
                    Obj::String(label.prefix.clone().into_bytes(), StringFormat::Literal),
                );
            }
            if label.start_at != 1 {
                entry.set("St", label.start_at);
            }
            nums.push(Obj::Dictionary(entry));
        }
        let mut dict = Dict::new();
        dict.set("Nums", Obj::Array(nums));
        dict
    }
}

/// `Rng` view over the shared cell, so the encryption state and the
/// document draw from the same seedable source
struct SharedRngHandle(SharedRng);

impl Rng for SharedRngHandle {
    fn fill(&mut self, buf: &mut [u8]) {
        self.0.borrow_mut().fill(buf);
    }
}

fn normalize_style(style: &str) -> String {
    let mut out = String::new();
    if style.contains('B') || style.contains('b') {
        out.push('B');
    }
    if style.contains('I') || style.contains('i') {
        out.push('I');
    }
    out
}

/// Copies the object at `from` plus everything it references from one
/// table into another document
fn copy_subgraph(
    src: &[Obj],
    from: ObjId,
    dst: &mut Document,
    cache: &mut HashMap<usize, ObjId>,
) -> ObjId {
    if let Some(&done) = cache.get(&from.0) {
        return done;
    }
    let slot = dst.add_obj(Obj::Null);
    cache.insert(from.0, slot);
    let copied = copy_value(src, src.get(from.0).unwrap_or(&Obj::Null), dst, cache);
    dst.objects[slot.0] = copied;
    slot
}

fn copy_value(
    src: &[Obj],
    value: &Obj,
    dst: &mut Document,
    cache: &mut HashMap<usize, ObjId>,
) -> Obj {
    match value {
        Obj::Reference(id) => Obj::Reference(copy_subgraph(src, *id, dst, cache)),
        Obj::Array(items) => Obj::Array(
            items
                .iter()
                .map(|i| copy_value(src, i, dst, cache))
                .collect(),
        ),
        Obj::Dictionary(dict) => {
            let mut out = Dict::new();
            for (k, v) in dict.iter() {
                out.set(k, copy_value(src, v, dst, cache));
            }
            Obj::Dictionary(out)
        }
        Obj::Stream(stream) => {
            let mut out = Dict::new();
            for (k, v) in stream.dict.iter() {
                out.set(k, copy_value(src, v, dst, cache));
            }
            Obj::Stream(StreamObj {
                dict: out,
                content: stream.content.clone(),
                filters: stream.filters.clone(),
            })
        }
        other => other.clone(),
    }
}

fn remap_refs(obj: &mut Obj, map: &HashMap<usize, usize>) {
    match obj {
        Obj::Reference(id) => {
            if let Some(&n) = map.get(&id.0) {
                *id = ObjId(n);
            }
        }
        Obj::Array(items) => {
            for item in items {
                remap_refs(item, map);
            }
        }
        Obj::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                remap_refs(v, map);
            }
        }
        Obj::Stream(stream) => {
            for (_, v) in stream.dict.iter_mut() {
                remap_refs(v, map);
            }
        }
        _ => {}
    }
}

fn docinfo_to_dict(info: &DocumentInfo) -> Dict {
    let mut dict = Dict::new();
    let lit = |s: &str| Obj::String(s.as_bytes().to_vec(), StringFormat::Literal);
    if !info.title.is_empty() {
        dict.set("Title", lit(&info.title));
    }
    if !info.author.is_empty() {
        dict.set("Author", lit(&info.author));
    }
    if !info.subject.is_empty() {
        dict.set("Subject", lit(&info.subject));
    }
    if !info.creator.is_empty() {
        dict.set("Creator", lit(&info.creator));
    }
    if !info.producer.is_empty() {
        dict.set("Producer", lit(&info.producer));
    }
    if !info.keywords.is_empty() {
        dict.set("Keywords", lit(&info.keywords.join(",")));
    }
    if let Some(d) = &info.creation_date {
        dict.set("CreationDate", lit(&crate::date::to_pdf_timestamp(d)));
    }
    if let Some(d) = &info.mod_date {
        dict.set("ModDate", lit(&crate::date::to_pdf_timestamp(d)));
    }
    dict
}
