//! Operations that can occur on a PDF page.
//!
//! Every drawing primitive and state change the public API produces is
//! recorded as one [`ContentItem`]. At save time the items of a page are
//! emitted in insertion order into the page's content stream. Items are
//! individually addressable, so pages support element-level editing
//! (delete, replace, reposition) before the document is serialized.
//!
//! Coordinates inside items are stored in points with the origin at the
//! upper left corner of the page; the y axis is flipped at emit time.

use crate::color::{fmt_f32, Cmyk, Color, Rgb};
use crate::font::FontList;
use crate::matrix::CurTransMat;

/// Style string of a closed shape: "D" = draw, "F" = fill, "FD"/"DF" both
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PaintStyle {
    #[default]
    Draw,
    Fill,
    FillDraw,
}

impl PaintStyle {
    pub fn parse(style: &str) -> PaintStyle {
        match style {
            "F" | "f" => PaintStyle::Fill,
            "FD" | "DF" | "fd" | "df" | "B" => PaintStyle::FillDraw,
            _ => PaintStyle::Draw,
        }
    }

    fn paint_op(self) -> &'static str {
        match self {
            PaintStyle::Draw => "S",
            PaintStyle::Fill => "f",
            PaintStyle::FillDraw => "B",
        }
    }
}

/// Dash pattern of stroked lines
#[derive(Debug, Clone, PartialEq)]
pub enum LineType {
    Solid,
    Dashed,
    Dotted,
    /// Dash array in points plus phase
    Custom(Vec<f32>, f32),
}

impl LineType {
    fn write_op(&self, out: &mut Vec<u8>) {
        match self {
            LineType::Solid => out.extend_from_slice(b"[] 0 d\n"),
            LineType::Dashed => out.extend_from_slice(b"[5 3] 0 d\n"),
            LineType::Dotted => out.extend_from_slice(b"[1 2] 0 d\n"),
            LineType::Custom(dashes, phase) => {
                out.push(b'[');
                for (i, d) in dashes.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(fmt_f32(*d).as_bytes());
                }
                out.extend_from_slice(format!("] {} d\n", fmt_f32(*phase)).as_bytes());
            }
        }
    }
}

/// A single text run with all state needed to emit it
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    /// x of the run start, points from the left edge
    pub x: f32,
    /// baseline y, points from the top edge
    pub y: f32,
    /// index into the document's font list
    pub font: usize,
    pub size: f32,
    pub color: Color,
    pub char_spacing: f32,
    /// `(position_coef, thickness_coef)` relative to the font size
    pub underline: Option<(f32, f32)>,
    pub kerning: bool,
    pub text: String,
}

/// Placement of a registered image XObject
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// index into the document's XObject list
    pub xobject: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub transform: Option<CurTransMat>,
}

/// One entry in a page's content list
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(TextItem),
    /// Text that is filled in later by placeholder name
    Placeholder { name: String, item: TextItem },
    Image(ImageItem),
    Line { x1: f32, y1: f32, x2: f32, y2: f32 },
    Rectangle {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        style: PaintStyle,
        /// corner radius; 0 emits a plain `re`
        radius: f32,
        /// Bézier segments per quarter arc when `radius > 0`
        segments: usize,
    },
    Oval { x1: f32, y1: f32, x2: f32, y2: f32, style: PaintStyle },
    Polygon { points: Vec<(f32, f32)>, style: PaintStyle },
    Polyline { points: Vec<(f32, f32)> },
    Curve {
        x0: f32, y0: f32,
        x1: f32, y1: f32,
        x2: f32, y2: f32,
        x3: f32, y3: f32,
        style: PaintStyle,
    },
    Sector {
        cx: f32,
        cy: f32,
        radius: f32,
        start_deg: f32,
        end_deg: f32,
        style: PaintStyle,
    },
    ClipPolygon { points: Vec<(f32, f32)> },
    /// A page imported from another file, placed as a Form XObject.
    /// `native_width`/`native_height` are the template's BBox size.
    ImportedTemplate {
        template: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        native_width: f32,
        native_height: f32,
    },
    /// `/Name cs` fill color-space selection
    ColorSpace(String),
    LineWidth(f32),
    LineType(LineType),
    GrayFill(f32),
    GrayStroke(f32),
    RgbFill(Rgb),
    RgbStroke(Rgb),
    CmykFill(Cmyk),
    CmykStroke(Cmyk),
    /// `q` + rotation about a point; closed by [`ContentItem::RotateReset`]
    Rotate { angle_deg: f32, cx: f32, cy: f32 },
    RotateReset,
    SaveGraphicsState,
    RestoreGraphicsState,
    ConcatMatrix(CurTransMat),
    /// `/GSn gs`, referencing the document's ExtGState list
    ExtGState { index: usize },
}

/// Everything an item needs at emit time besides its own fields
pub(crate) struct EmitCtx<'a> {
    pub page_height: f32,
    pub fonts: &'a FontList,
}

impl ContentItem {
    /// Stable name of the item kind, used for delete-by-type and errors
    pub fn kind(&self) -> &'static str {
        match self {
            ContentItem::Text(_) => "Text",
            ContentItem::Placeholder { .. } => "Placeholder",
            ContentItem::Image(_) => "Image",
            ContentItem::Line { .. } => "Line",
            ContentItem::Rectangle { .. } => "Rectangle",
            ContentItem::Oval { .. } => "Oval",
            ContentItem::Polygon { .. } => "Polygon",
            ContentItem::Polyline { .. } => "Polyline",
            ContentItem::Curve { .. } => "Curve",
            ContentItem::Sector { .. } => "Sector",
            ContentItem::ClipPolygon { .. } => "ClipPolygon",
            ContentItem::ImportedTemplate { .. } => "ImportedTemplate",
            ContentItem::ColorSpace(_) => "ColorSpace",
            ContentItem::LineWidth(_) => "LineWidth",
            ContentItem::LineType(_) => "LineType",
            ContentItem::GrayFill(_) => "GrayFill",
            ContentItem::GrayStroke(_) => "GrayStroke",
            ContentItem::RgbFill(_) => "RgbFill",
            ContentItem::RgbStroke(_) => "RgbStroke",
            ContentItem::CmykFill(_) => "CmykFill",
            ContentItem::CmykStroke(_) => "CmykStroke",
            ContentItem::Rotate { .. } => "Rotate",
            ContentItem::RotateReset => "RotateReset",
            ContentItem::SaveGraphicsState => "SaveGraphicsState",
            ContentItem::RestoreGraphicsState => "RestoreGraphicsState",
            ContentItem::ConcatMatrix(_) => "ConcatMatrix",
            ContentItem::ExtGState { .. } => "ExtGState",
        }
    }

    /// True for items that change graphics state rather than paint
    pub fn is_state_setter(&self) -> bool {
        matches!(
            self,
            ContentItem::ColorSpace(_)
                | ContentItem::LineWidth(_)
                | ContentItem::LineType(_)
                | ContentItem::GrayFill(_)
                | ContentItem::GrayStroke(_)
                | ContentItem::RgbFill(_)
                | ContentItem::RgbStroke(_)
                | ContentItem::CmykFill(_)
                | ContentItem::CmykStroke(_)
                | ContentItem::Rotate { .. }
                | ContentItem::RotateReset
                | ContentItem::SaveGraphicsState
                | ContentItem::RestoreGraphicsState
                | ContentItem::ConcatMatrix(_)
                | ContentItem::ExtGState { .. }
        )
    }

    /// Net effect of the item on the `q`/`Q` nesting depth
    pub(crate) fn gs_depth_delta(&self) -> i32 {
        match self {
            ContentItem::SaveGraphicsState | ContentItem::Rotate { .. } => 1,
            ContentItem::RestoreGraphicsState | ContentItem::RotateReset => -1,
            _ => 0,
        }
    }

    /// Moves the item so its anchor point lands on `(x, y)`.
    /// Returns false for items without a meaningful position.
    pub(crate) fn set_position(&mut self, x: f32, y: f32) -> bool {
        fn shift(points: &mut [(f32, f32)], dx: f32, dy: f32) {
            for p in points {
                p.0 += dx;
                p.1 += dy;
            }
        }
        match self {
            ContentItem::Text(t) | ContentItem::Placeholder { item: t, .. } => {
                t.x = x;
                t.y = y;
                true
            }
            ContentItem::Image(img) => {
                img.x = x;
                img.y = y;
                true
            }
            ContentItem::ImportedTemplate { x: tx, y: ty, .. } => {
                *tx = x;
                *ty = y;
                true
            }
            ContentItem::Line { x1, y1, x2, y2 } => {
                *x2 += x - *x1;
                *y2 += y - *y1;
                *x1 = x;
                *y1 = y;
                true
            }
            ContentItem::Rectangle { x1, y1, x2, y2, .. }
            | ContentItem::Oval { x1, y1, x2, y2, .. } => {
                *x2 += x - *x1;
                *y2 += y - *y1;
                *x1 = x;
                *y1 = y;
                true
            }
            ContentItem::Curve {
                x0, y0, x1, y1, x2, y2, x3, y3, ..
            } => {
                let (dx, dy) = (x - *x0, y - *y0);
                *x0 = x;
                *y0 = y;
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
                *x3 += dx;
                *y3 += dy;
                true
            }
            ContentItem::Polygon { points, .. } | ContentItem::Polyline { points } => {
                if let Some(&(px, py)) = points.first() {
                    shift(points, x - px, y - py);
                }
                true
            }
            ContentItem::Sector { cx, cy, .. } => {
                *cx = x;
                *cy = y;
                true
            }
            _ => false,
        }
    }

    /// Bounding box of positionable items `(x1, y1, x2, y2)`, top-down
    pub(crate) fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        fn of_points(points: &[(f32, f32)]) -> Option<(f32, f32, f32, f32)> {
            let first = points.first()?;
            let mut b = (first.0, first.1, first.0, first.1);
            for p in points {
                b.0 = b.0.min(p.0);
                b.1 = b.1.min(p.1);
                b.2 = b.2.max(p.0);
                b.3 = b.3.max(p.1);
            }
            Some(b)
        }
        match self {
            ContentItem::Text(t) | ContentItem::Placeholder { item: t, .. } => {
                Some((t.x, t.y - t.size, t.x + t.size * t.text.chars().count() as f32, t.y))
            }
            ContentItem::Image(i) => Some((i.x, i.y, i.x + i.width, i.y + i.height)),
            ContentItem::ImportedTemplate { x, y, width, height, .. } => {
                Some((*x, *y, x + width, y + height))
            }
            ContentItem::Line { x1, y1, x2, y2 } => {
                Some((x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)))
            }
            ContentItem::Rectangle { x1, y1, x2, y2, .. }
            | ContentItem::Oval { x1, y1, x2, y2, .. } => {
                Some((x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)))
            }
            ContentItem::Curve { x0, y0, x3, y3, .. } => {
                Some((x0.min(*x3), y0.min(*y3), x0.max(*x3), y0.max(*y3)))
            }
            ContentItem::Polygon { points, .. } | ContentItem::Polyline { points } => {
                of_points(points)
            }
            ContentItem::Sector { cx, cy, radius, .. } => {
                Some((cx - radius, cy - radius, cx + radius, cy + radius))
            }
            _ => None,
        }
    }

    /// Appends this item's operators to the page content stream
    pub(crate) fn emit(&self, out: &mut Vec<u8>, ctx: &EmitCtx<'_>) {
        let h = ctx.page_height;
        match self {
            ContentItem::Text(item) => emit_text(item, out, ctx),
            ContentItem::Placeholder { item, .. } => emit_text(item, out, ctx),
            ContentItem::Image(img) => {
                out.extend_from_slice(b"q\n");
                if let Some(m) = img.transform {
                    m.write_op(out);
                }
                out.extend_from_slice(
                    format!(
                        "{} 0 0 {} {} {} cm\n/X{} Do\nQ\n",
                        fmt_f32(img.width),
                        fmt_f32(img.height),
                        fmt_f32(img.x),
                        fmt_f32(h - img.y - img.height),
                        img.xobject
                    )
                    .as_bytes(),
                );
            }
            ContentItem::Line { x1, y1, x2, y2 } => {
                out.extend_from_slice(
                    format!(
                        "{} {} m\n{} {} l\nS\n",
                        fmt_f32(*x1),
                        fmt_f32(h - y1),
                        fmt_f32(*x2),
                        fmt_f32(h - y2)
                    )
                    .as_bytes(),
                );
            }
            ContentItem::Rectangle {
                x1,
                y1,
                x2,
                y2,
                style,
                radius,
                segments,
            } => {
                if *radius <= 0.0 {
                    out.extend_from_slice(
                        format!(
                            "{} {} {} {} re\n{}\n",
                            fmt_f32(*x1),
                            fmt_f32(h - y2),
                            fmt_f32(x2 - x1),
                            fmt_f32(y2 - y1),
                            style.paint_op()
                        )
                        .as_bytes(),
                    );
                } else {
                    emit_rounded_rect(out, *x1, h - y2, *x2, h - y1, *radius, *segments);
                    out.extend_from_slice(style.paint_op().as_bytes());
                    out.push(b'\n');
                }
            }
            ContentItem::Oval { x1, y1, x2, y2, style } => {
                emit_oval(out, *x1, h - y2, *x2, h - y1);
                out.extend_from_slice(style.paint_op().as_bytes());
                out.push(b'\n');
            }
            ContentItem::Polygon { points, style } => {
                emit_poly_path(out, points, h);
                out.extend_from_slice(b"h\n");
                out.extend_from_slice(style.paint_op().as_bytes());
                out.push(b'\n');
            }
            ContentItem::Polyline { points } => {
                emit_poly_path(out, points, h);
                out.extend_from_slice(b"S\n");
            }
            ContentItem::Curve {
                x0, y0, x1, y1, x2, y2, x3, y3, style,
            } => {
                out.extend_from_slice(
                    format!(
                        "{} {} m\n{} {} {} {} {} {} c\n{}\n",
                        fmt_f32(*x0),
                        fmt_f32(h - y0),
                        fmt_f32(*x1),
                        fmt_f32(h - y1),
                        fmt_f32(*x2),
                        fmt_f32(h - y2),
                        fmt_f32(*x3),
                        fmt_f32(h - y3),
                        style.paint_op()
                    )
                    .as_bytes(),
                );
            }
            ContentItem::Sector {
                cx,
                cy,
                radius,
                start_deg,
                end_deg,
                style,
            } => {
                emit_sector(out, *cx, h - cy, *radius, *start_deg, *end_deg);
                out.extend_from_slice(style.paint_op().as_bytes());
                out.push(b'\n');
            }
            ContentItem::ClipPolygon { points } => {
                emit_poly_path(out, points, h);
                out.extend_from_slice(b"h\nW n\n");
            }
            ContentItem::ImportedTemplate {
                template,
                x,
                y,
                width,
                height,
                native_width,
                native_height,
            } => {
                let sx = if *native_width > 0.0 { width / native_width } else { 1.0 };
                let sy = if *native_height > 0.0 { height / native_height } else { 1.0 };
                out.extend_from_slice(
                    format!(
                        "q\n{} 0 0 {} {} {} cm\n/TPL{} Do\nQ\n",
                        fmt_f32(sx),
                        fmt_f32(sy),
                        fmt_f32(*x),
                        fmt_f32(h - y - height),
                        template
                    )
                    .as_bytes(),
                );
            }
            ContentItem::ColorSpace(name) => {
                out.extend_from_slice(format!("/{} cs\n", name).as_bytes());
            }
            ContentItem::LineWidth(w) => {
                out.extend_from_slice(format!("{} w\n", fmt_f32(*w)).as_bytes());
            }
            ContentItem::LineType(lt) => lt.write_op(out),
            ContentItem::GrayFill(g) => Color::Greyscale(*g).write_fill_op(out),
            ContentItem::GrayStroke(g) => Color::Greyscale(*g).write_stroke_op(out),
            ContentItem::RgbFill(c) => Color::Rgb(*c).write_fill_op(out),
            ContentItem::RgbStroke(c) => Color::Rgb(*c).write_stroke_op(out),
            ContentItem::CmykFill(c) => Color::Cmyk(*c).write_fill_op(out),
            ContentItem::CmykStroke(c) => Color::Cmyk(*c).write_stroke_op(out),
            ContentItem::Rotate { angle_deg, cx, cy } => {
                out.extend_from_slice(b"q\n");
                CurTransMat::RotateAbout(
                    crate::units::Pt(*cx),
                    crate::units::Pt(h - cy),
                    *angle_deg,
                )
                .write_op(out);
            }
            ContentItem::RotateReset | ContentItem::RestoreGraphicsState => {
                out.extend_from_slice(b"Q\n");
            }
            ContentItem::SaveGraphicsState => out.extend_from_slice(b"q\n"),
            ContentItem::ConcatMatrix(m) => m.write_op(out),
            ContentItem::ExtGState { index } => {
                out.extend_from_slice(format!("/GS{} gs\n", index).as_bytes());
            }
        }
    }
}

fn emit_text(item: &TextItem, out: &mut Vec<u8>, ctx: &EmitCtx<'_>) {
    let Some(font) = ctx.fonts.get(item.font) else {
        return;
    };
    let y = ctx.page_height - item.y;

    out.extend_from_slice(b"BT\n");
    out.extend_from_slice(format!("/F{} {} Tf\n", item.font, fmt_f32(item.size)).as_bytes());
    if item.char_spacing != 0.0 {
        out.extend_from_slice(format!("{} Tc\n", fmt_f32(item.char_spacing)).as_bytes());
    }
    item.color.write_fill_op(out);
    out.extend_from_slice(format!("{} {} Td\n", fmt_f32(item.x), fmt_f32(y)).as_bytes());

    let kern_pairs = item.kerning;
    let gids = font.encode_str(&item.text);
    if kern_pairs {
        // TJ with adjustments between kerned runs, in -1/1000 em
        out.push(b'[');
        let mut run = String::new();
        let mut prev: Option<u16> = None;
        for gid in &gids {
            if let Some(p) = prev {
                let kern = font.kern_between(p, *gid);
                if kern != 0 {
                    let adj = -(kern as f32) * 1000.0 / font.units_per_em() as f32;
                    out.push(b'<');
                    out.extend_from_slice(run.as_bytes());
                    out.extend_from_slice(b"> ");
                    out.extend_from_slice(fmt_f32(adj).as_bytes());
                    out.push(b' ');
                    run.clear();
                }
            }
            run.push_str(&format!("{:04X}", gid));
            prev = Some(*gid);
        }
        if !run.is_empty() {
            out.push(b'<');
            out.extend_from_slice(run.as_bytes());
            out.push(b'>');
        }
        out.extend_from_slice(b"] TJ\n");
    } else {
        out.push(b'<');
        for gid in &gids {
            out.extend_from_slice(format!("{:04X}", gid).as_bytes());
        }
        out.extend_from_slice(b"> Tj\n");
    }
    out.extend_from_slice(b"ET\n");

    if let Some((pos_coef, thick_coef)) = item.underline {
        let width = font.text_width(&item.text, item.size, item.char_spacing, item.kerning);
        let uy = y - pos_coef * item.size;
        item.color.write_fill_op(out);
        out.extend_from_slice(
            format!(
                "{} {} {} {} re\nf\n",
                fmt_f32(item.x),
                fmt_f32(uy),
                fmt_f32(width),
                fmt_f32(thick_coef * item.size)
            )
            .as_bytes(),
        );
    }
}

fn emit_poly_path(out: &mut Vec<u8>, points: &[(f32, f32)], h: f32) {
    for (i, (x, y)) in points.iter().enumerate() {
        let op = if i == 0 { "m" } else { "l" };
        out.extend_from_slice(
            format!("{} {} {}\n", fmt_f32(*x), fmt_f32(h - y), op).as_bytes(),
        );
    }
}

/// Magic constant for approximating a quarter circle with one cubic
const KAPPA: f32 = 0.552_284_7;

fn emit_oval(out: &mut Vec<u8>, x1: f32, y1: f32, x2: f32, y2: f32) {
    let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
    let (rx, ry) = ((x2 - x1) / 2.0, (y2 - y1) / 2.0);
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);
    out.extend_from_slice(format!("{} {} m\n", fmt_f32(cx + rx), fmt_f32(cy)).as_bytes());
    let arcs = [
        (cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry),
        (cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy),
        (cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry),
        (cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy),
    ];
    for (ax, ay, bx, by, ex, ey) in arcs {
        out.extend_from_slice(
            format!(
                "{} {} {} {} {} {} c\n",
                fmt_f32(ax),
                fmt_f32(ay),
                fmt_f32(bx),
                fmt_f32(by),
                fmt_f32(ex),
                fmt_f32(ey)
            )
            .as_bytes(),
        );
    }
}

/// Rounded rectangle in PDF-space coordinates (y up), radius clamped to
/// half of the shorter side, `segments` cubics per quarter arc
fn emit_rounded_rect(out: &mut Vec<u8>, x1: f32, y1: f32, x2: f32, y2: f32, radius: f32, segments: usize) {
    let r = radius.min((x2 - x1).abs() / 2.0).min((y2 - y1).abs() / 2.0);
    let segments = segments.max(1);
    out.extend_from_slice(format!("{} {} m\n", fmt_f32(x1 + r), fmt_f32(y1)).as_bytes());
    out.extend_from_slice(format!("{} {} l\n", fmt_f32(x2 - r), fmt_f32(y1)).as_bytes());
    emit_arc(out, x2 - r, y1 + r, r, -90.0, 0.0, segments);
    out.extend_from_slice(format!("{} {} l\n", fmt_f32(x2), fmt_f32(y2 - r)).as_bytes());
    emit_arc(out, x2 - r, y2 - r, r, 0.0, 90.0, segments);
    out.extend_from_slice(format!("{} {} l\n", fmt_f32(x1 + r), fmt_f32(y2)).as_bytes());
    emit_arc(out, x1 + r, y2 - r, r, 90.0, 180.0, segments);
    out.extend_from_slice(format!("{} {} l\n", fmt_f32(x1), fmt_f32(y1 + r)).as_bytes());
    emit_arc(out, x1 + r, y1 + r, r, 180.0, 270.0, segments);
    out.extend_from_slice(b"h\n");
}

/// Approximates the arc from `start_deg` to `end_deg` about `(cx, cy)`
/// with `segments` cubic Béziers, continuing the current path
fn emit_arc(out: &mut Vec<u8>, cx: f32, cy: f32, r: f32, start_deg: f32, end_deg: f32, segments: usize) {
    let step = (end_deg - start_deg) / segments as f32;
    for i in 0..segments {
        let a0 = (start_deg + step * i as f32).to_radians();
        let a1 = (start_deg + step * (i + 1) as f32).to_radians();
        // control distance for a circular arc segment
        let k = 4.0 / 3.0 * ((a1 - a0) / 4.0).tan();
        let (s0, c0) = a0.sin_cos();
        let (s1, c1) = a1.sin_cos();
        let p1 = (cx + r * (c0 - k * s0), cy + r * (s0 + k * c0));
        let p2 = (cx + r * (c1 + k * s1), cy + r * (s1 - k * c1));
        let p3 = (cx + r * c1, cy + r * s1);
        out.extend_from_slice(
            format!(
                "{} {} {} {} {} {} c\n",
                fmt_f32(p1.0),
                fmt_f32(p1.1),
                fmt_f32(p2.0),
                fmt_f32(p2.1),
                fmt_f32(p3.0),
                fmt_f32(p3.1)
            )
            .as_bytes(),
        );
    }
}

/// Pie slice: center, line to arc start, arc in ≤90° chunks, close
fn emit_sector(out: &mut Vec<u8>, cx: f32, cy: f32, r: f32, start_deg: f32, end_deg: f32) {
    let sweep = end_deg - start_deg;
    let segments = (sweep.abs() / 90.0).ceil().max(1.0) as usize;
    let a0 = start_deg.to_radians();
    out.extend_from_slice(format!("{} {} m\n", fmt_f32(cx), fmt_f32(cy)).as_bytes());
    out.extend_from_slice(
        format!("{} {} l\n", fmt_f32(cx + r * a0.cos()), fmt_f32(cy + r * a0.sin())).as_bytes(),
    );
    emit_arc(out, cx, cy, r, start_deg, end_deg, segments);
    out.extend_from_slice(b"h\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontList;

    fn ctx(fonts: &FontList) -> EmitCtx<'_> {
        EmitCtx {
            page_height: 842.0,
            fonts,
        }
    }

    fn emit(item: &ContentItem) -> String {
        let fonts = FontList::default();
        let mut out = Vec::new();
        item.emit(&mut out, &ctx(&fonts));
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn line_flips_y() {
        let s = emit(&ContentItem::Line {
            x1: 10.0,
            y1: 42.0,
            x2: 20.0,
            y2: 42.0,
        });
        assert_eq!(s, "10 800 m\n20 800 l\nS\n");
    }

    #[test]
    fn rectangle_re_operator() {
        let s = emit(&ContentItem::Rectangle {
            x1: 10.0,
            y1: 20.0,
            x2: 110.0,
            y2: 70.0,
            style: PaintStyle::FillDraw,
            radius: 0.0,
            segments: 0,
        });
        assert_eq!(s, "10 772 100 50 re\nB\n");
    }

    #[test]
    fn rounded_rectangle_uses_curves() {
        let s = emit(&ContentItem::Rectangle {
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 100.0,
            style: PaintStyle::Draw,
            radius: 10.0,
            segments: 2,
        });
        assert_eq!(s.matches(" c\n").count(), 8);
        assert!(s.ends_with("h\nS\n"));
    }

    #[test]
    fn oval_is_four_beziers() {
        let s = emit(&ContentItem::Oval {
            x1: 0.0,
            y1: 0.0,
            x2: 50.0,
            y2: 20.0,
            style: PaintStyle::Fill,
        });
        assert_eq!(s.matches(" c\n").count(), 4);
        assert!(s.ends_with("f\n"));
    }

    #[test]
    fn sector_splits_large_sweep() {
        let s = emit(&ContentItem::Sector {
            cx: 100.0,
            cy: 100.0,
            radius: 30.0,
            start_deg: 0.0,
            end_deg: 270.0,
            style: PaintStyle::Fill,
        });
        // 270 degrees needs three ≤90° arc segments
        assert_eq!(s.matches(" c\n").count(), 3);
    }

    #[test]
    fn clip_polygon_emits_w_n() {
        let s = emit(&ContentItem::ClipPolygon {
            points: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)],
        });
        assert!(s.ends_with("W n\n"));
    }

    #[test]
    fn state_setter_classification() {
        assert!(ContentItem::LineWidth(2.0).is_state_setter());
        assert!(!ContentItem::Line {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0
        }
        .is_state_setter());
    }

    #[test]
    fn reposition_line_keeps_length() {
        let mut item = ContentItem::Line {
            x1: 10.0,
            y1: 10.0,
            x2: 30.0,
            y2: 20.0,
        };
        assert!(item.set_position(50.0, 50.0));
        match item {
            ContentItem::Line { x1, y1, x2, y2 } => {
                assert_eq!((x1, y1), (50.0, 50.0));
                assert_eq!((x2, y2), (70.0, 60.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn reposition_state_setter_fails() {
        let mut item = ContentItem::SaveGraphicsState;
        assert!(!item.set_position(0.0, 0.0));
    }

    #[test]
    fn style_parse() {
        assert_eq!(PaintStyle::parse("D"), PaintStyle::Draw);
        assert_eq!(PaintStyle::parse("F"), PaintStyle::Fill);
        assert_eq!(PaintStyle::parse("FD"), PaintStyle::FillDraw);
        assert_eq!(PaintStyle::parse("DF"), PaintStyle::FillDraw);
    }
}
