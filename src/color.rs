//! Color values (gray, RGB or CMYK) and their content-stream operators.

use serde_derive::{Deserialize, Serialize};

/// A color in one of the supported device color spaces.
/// Components are in the `0.0..=1.0` range.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "data")]
pub enum Color {
    Greyscale(f32),
    Rgb(Rgb),
    Cmyk(Cmyk),
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// From 8-bit channel values, `255 => 1.0`
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cmyk {
    pub c: f32,
    pub m: f32,
    pub y: f32,
    pub k: f32,
}

impl Cmyk {
    pub fn new(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self { c, m, y, k }
    }
}

impl Color {
    pub const BLACK: Color = Color::Greyscale(0.0);
    pub const WHITE: Color = Color::Greyscale(1.0);

    /// Emits the fill-color operator (`g`, `rg` or `k`)
    pub(crate) fn write_fill_op(&self, out: &mut Vec<u8>) {
        match self {
            Color::Greyscale(g) => out.extend_from_slice(format!("{} g\n", fmt_f32(*g)).as_bytes()),
            Color::Rgb(c) => out.extend_from_slice(
                format!("{} {} {} rg\n", fmt_f32(c.r), fmt_f32(c.g), fmt_f32(c.b)).as_bytes(),
            ),
            Color::Cmyk(c) => out.extend_from_slice(
                format!(
                    "{} {} {} {} k\n",
                    fmt_f32(c.c),
                    fmt_f32(c.m),
                    fmt_f32(c.y),
                    fmt_f32(c.k)
                )
                .as_bytes(),
            ),
        }
    }

    /// Emits the stroke-color operator (`G`, `RG` or `K`)
    pub(crate) fn write_stroke_op(&self, out: &mut Vec<u8>) {
        match self {
            Color::Greyscale(g) => out.extend_from_slice(format!("{} G\n", fmt_f32(*g)).as_bytes()),
            Color::Rgb(c) => out.extend_from_slice(
                format!("{} {} {} RG\n", fmt_f32(c.r), fmt_f32(c.g), fmt_f32(c.b)).as_bytes(),
            ),
            Color::Cmyk(c) => out.extend_from_slice(
                format!(
                    "{} {} {} {} K\n",
                    fmt_f32(c.c),
                    fmt_f32(c.m),
                    fmt_f32(c.y),
                    fmt_f32(c.k)
                )
                .as_bytes(),
            ),
        }
    }
}

/// Color space of a decoded image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Cmyk,
    Greyscale,
    /// Palette image, base space DeviceRGB
    Indexed,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorSpace::Rgb => "DeviceRGB",
            ColorSpace::Cmyk => "DeviceCMYK",
            ColorSpace::Greyscale => "DeviceGray",
            ColorSpace::Indexed => "Indexed",
        }
    }

    /// Samples per pixel in this space
    pub fn components(self) -> usize {
        match self {
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
            ColorSpace::Greyscale | ColorSpace::Indexed => 1,
        }
    }
}

/// Formats a float the way PDF numbers are written: no exponent,
/// trailing zeros trimmed, `-0` normalized.
pub(crate) fn fmt_f32(v: f32) -> String {
    if v.fract() == 0.0 && v.abs() < 1.0e7 {
        return format!("{}", v as i64);
    }
    let mut s = format!("{:.4}", v);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(fmt_f32(1.0), "1");
        assert_eq!(fmt_f32(0.5), "0.5");
        assert_eq!(fmt_f32(-0.0), "0");
        assert_eq!(fmt_f32(12.125), "12.125");
        assert_eq!(fmt_f32(595.2756), "595.2756");
    }

    #[test]
    fn fill_ops() {
        let mut out = Vec::new();
        Color::Rgb(Rgb::new(1.0, 0.0, 0.5)).write_fill_op(&mut out);
        assert_eq!(out, b"1 0 0.5 rg\n");

        let mut out = Vec::new();
        Color::Cmyk(Cmyk::new(0.1, 0.2, 0.3, 0.4)).write_stroke_op(&mut out);
        assert_eq!(out, b"0.1 0.2 0.3 0.4 K\n");
    }
}
