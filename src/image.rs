//! Image decoding for embedding: JPEG pass-through and a from-scratch
//! PNG reader (filter reconstruction, alpha extraction, palettes).
//! Recompression of images inside existing files lives here too.

use log::warn;
use sha2::{Digest, Sha256};

use crate::color::ColorSpace;
use crate::deserialize::ParsedPdf;
use crate::errors::{PdfError, Result};
use crate::object::Obj;

/// A decoded image ready for XObject emission
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: ColorSpace,
    pub data: ImageData,
    /// 8-bit gray alpha channel split out of RGBA / gray+alpha PNGs
    pub smask: Option<Vec<u8>>,
    /// RGB triples for `ColorSpace::Indexed`
    pub palette: Option<Vec<u8>>,
    /// `/Mask` color-key ranges from a tRNS chunk
    pub transparency: Option<Vec<u16>>,
    /// identity for deduplication
    pub dedup_key: [u8; 32],
}

#[derive(Debug, Clone)]
pub enum ImageData {
    /// original JPEG file bytes, stored with `/DCTDecode`
    Jpeg(Vec<u8>),
    /// unfiltered raw samples, re-filtered + deflated at emit time
    Raw(Vec<u8>),
}

impl RawImage {
    /// Sniffs the format from the magic bytes and decodes. JPEG and PNG
    /// take the native paths; other formats the `image` crate can read
    /// (GIF) are re-encoded as raw samples.
    pub fn decode(bytes: &[u8]) -> Result<RawImage> {
        if bytes.starts_with(&[0xFF, 0xD8]) {
            decode_jpeg(bytes)
        } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            decode_png(bytes)
        } else {
            let img = image::load_from_memory(bytes).map_err(|_| {
                PdfError::ImageParse("unsupported image format".to_string())
            })?;
            Ok(Self::from_dynamic(&img))
        }
    }

    /// Raw-sample conversion of an already decoded image; alpha moves
    /// into the soft mask
    pub fn from_dynamic(img: &image::DynamicImage) -> RawImage {
        let (width, height) = (img.width(), img.height());
        let (color_space, data, smask) = if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(rgba.len() / 4);
            for px in rgba.as_raw().chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            (ColorSpace::Rgb, rgb, Some(alpha))
        } else if matches!(img.color(), image::ColorType::L8 | image::ColorType::L16) {
            (ColorSpace::Greyscale, img.to_luma8().into_raw(), None)
        } else {
            (ColorSpace::Rgb, img.to_rgb8().into_raw(), None)
        };
        RawImage {
            width,
            height,
            bits_per_component: 8,
            color_space,
            dedup_key: dedup_key_of(&data),
            data: ImageData::Raw(data),
            smask,
            palette: None,
            transparency: None,
        }
    }

    /// True when a CMYK JPEG needs the inverted `/Decode` array
    pub fn needs_cmyk_invert(&self) -> bool {
        matches!(self.data, ImageData::Jpeg(_)) && self.color_space == ColorSpace::Cmyk
    }
}

fn dedup_key_of(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

// ---------------------------------------------------------------------
// JPEG
// ---------------------------------------------------------------------

/// Walks the marker segments for the first SOF to learn dimensions and
/// component count; the compressed data itself is kept as-is.
fn decode_jpeg(bytes: &[u8]) -> Result<RawImage> {
    let mut pos = 2;
    loop {
        if pos + 4 > bytes.len() {
            return Err(PdfError::ImageParse("JPEG without SOF marker".to_string()));
        }
        if bytes[pos] != 0xFF {
            return Err(PdfError::ImageParse(format!(
                "bad JPEG marker at offset {}",
                pos
            )));
        }
        let marker = bytes[pos + 1];
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        match marker {
            // SOF0-SOF15 minus DHT/JPG/DAC
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if pos + 9 > bytes.len() {
                    return Err(PdfError::ImageParse("truncated SOF".to_string()));
                }
                let precision = bytes[pos + 4];
                if precision != 8 {
                    return Err(PdfError::ImageParse(format!(
                        "unsupported JPEG precision {}",
                        precision
                    )));
                }
                let height = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]) as u32;
                let width = u16::from_be_bytes([bytes[pos + 7], bytes[pos + 8]]) as u32;
                let components = bytes[pos + 9];
                let color_space = match components {
                    1 => ColorSpace::Greyscale,
                    3 => ColorSpace::Rgb,
                    4 => ColorSpace::Cmyk,
                    n => {
                        return Err(PdfError::ImageParse(format!(
                            "JPEG with {} components",
                            n
                        )));
                    }
                };
                return Ok(RawImage {
                    width,
                    height,
                    bits_per_component: 8,
                    color_space,
                    dedup_key: dedup_key_of(bytes),
                    data: ImageData::Jpeg(bytes.to_vec()),
                    smask: None,
                    palette: None,
                    transparency: None,
                });
            }
            // standalone markers without a length field
            0xD8 | 0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => pos += 2 + len,
        }
    }
}

// ---------------------------------------------------------------------
// PNG
// ---------------------------------------------------------------------

struct PngHeader {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
}

impl PngHeader {
    fn channels(&self) -> usize {
        match self.color_type {
            0 | 3 => 1,
            2 => 3,
            4 => 2,
            6 => 4,
            _ => 0,
        }
    }
}

fn decode_png(bytes: &[u8]) -> Result<RawImage> {
    let mut pos = 8;
    let mut header: Option<PngHeader> = None;
    let mut palette: Option<Vec<u8>> = None;
    let mut trns: Option<Vec<u8>> = None;
    let mut idat = Vec::new();

    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let chunk_type = &bytes[pos + 4..pos + 8];
        let data = bytes
            .get(pos + 8..pos + 8 + len)
            .ok_or_else(|| PdfError::ImageParse("truncated PNG chunk".to_string()))?;
        match chunk_type {
            b"IHDR" => {
                if len < 13 {
                    return Err(PdfError::ImageParse("short IHDR".to_string()));
                }
                let h = PngHeader {
                    width: u32::from_be_bytes(data[0..4].try_into().unwrap()),
                    height: u32::from_be_bytes(data[4..8].try_into().unwrap()),
                    bit_depth: data[8],
                    color_type: data[9],
                };
                if data[10] != 0 || data[11] != 0 {
                    return Err(PdfError::ImageParse(
                        "unknown PNG compression/filter method".to_string(),
                    ));
                }
                if data[12] != 0 {
                    return Err(PdfError::ImageParse(
                        "interlaced PNGs are not supported".to_string(),
                    ));
                }
                if h.bit_depth == 16 {
                    return Err(PdfError::ImageParse(
                        "16-bit PNGs are not supported".to_string(),
                    ));
                }
                if matches!(h.color_type, 4 | 6) && h.bit_depth != 8 {
                    return Err(PdfError::ImageParse(
                        "alpha PNGs must be 8-bit".to_string(),
                    ));
                }
                if h.channels() == 0 {
                    return Err(PdfError::ImageParse(format!(
                        "unknown PNG color type {}",
                        h.color_type
                    )));
                }
                header = Some(h);
            }
            b"PLTE" => palette = Some(data.to_vec()),
            b"tRNS" => trns = Some(data.to_vec()),
            b"IDAT" => idat.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
        pos += 12 + len; // length + type + data + crc
    }

    let header = header.ok_or_else(|| PdfError::ImageParse("PNG without IHDR".to_string()))?;
    if idat.is_empty() {
        return Err(PdfError::ImageParse("PNG without IDAT".to_string()));
    }

    let inflated = crate::serialize::decompress_flate(&idat)
        .map_err(|_| PdfError::ImageParse("corrupt IDAT stream".to_string()))?;

    let channels = header.channels();
    let bits_per_pixel = channels * header.bit_depth as usize;
    let row_len = (header.width as usize * bits_per_pixel).div_ceil(8);
    let bpp = bits_per_pixel.div_ceil(8).max(1);
    let raw = png_predictor_inverse(&inflated, row_len, bpp)
        .map_err(|e| PdfError::ImageParse(e.to_string()))?;
    let expected = row_len * header.height as usize;
    if raw.len() < expected {
        return Err(PdfError::ImageParse("PNG pixel data too short".to_string()));
    }

    let (color_space, data, smask) = match header.color_type {
        0 => (ColorSpace::Greyscale, raw, None),
        2 => (ColorSpace::Rgb, raw, None),
        3 => {
            if palette.is_none() {
                return Err(PdfError::ImageParse("indexed PNG without PLTE".to_string()));
            }
            (ColorSpace::Indexed, raw, None)
        }
        4 => {
            // gray + alpha → gray plus soft mask
            let mut gray = Vec::with_capacity(raw.len() / 2);
            let mut alpha = Vec::with_capacity(raw.len() / 2);
            for px in raw.chunks_exact(2) {
                gray.push(px[0]);
                alpha.push(px[1]);
            }
            (ColorSpace::Greyscale, gray, Some(alpha))
        }
        6 => {
            let mut rgb = Vec::with_capacity(raw.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(raw.len() / 4);
            for px in raw.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            (ColorSpace::Rgb, rgb, Some(alpha))
        }
        _ => unreachable!(),
    };

    // color-key transparency from tRNS, only meaningful without alpha
    let transparency = match (header.color_type, &trns) {
        (0, Some(t)) if t.len() >= 2 => {
            let v = u16::from_be_bytes([t[0], t[1]]);
            Some(vec![v, v])
        }
        (2, Some(t)) if t.len() >= 6 => {
            let mut out = Vec::with_capacity(6);
            for c in t.chunks_exact(2).take(3) {
                let v = u16::from_be_bytes([c[0], c[1]]);
                out.push(v);
                out.push(v);
            }
            Some(out)
        }
        _ => None,
    };

    Ok(RawImage {
        width: header.width,
        height: header.height,
        bits_per_component: header.bit_depth,
        color_space,
        dedup_key: dedup_key_of(&data),
        data: ImageData::Raw(data),
        smask,
        palette,
        transparency,
    })
}

/// Reverses the per-row PNG filters (None/Sub/Up/Average/Paeth).
/// `data` is rows of `1 + row_len` bytes, the leading byte being the
/// filter tag. Shared with the Flate-predictor decode path.
pub(crate) fn png_predictor_inverse(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>> {
    if row_len == 0 {
        return Err(PdfError::ImageParse("zero-width image row".to_string()));
    }
    let stride = row_len + 1;
    let rows = data.len() / stride;
    let mut out = Vec::with_capacity(rows * row_len);
    let mut prev_row = vec![0u8; row_len];

    for row_data in data.chunks_exact(stride) {
        let filter = row_data[0];
        let mut row = row_data[1..].to_vec();
        match filter {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up = prev_row[i];
                    let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(PdfError::ImageParse(format!(
                    "unknown PNG filter {}",
                    other
                )));
            }
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Re-applies row tags (all `None`) so the payload can be declared with
/// `/Predictor 15`
pub(crate) fn png_predictor_apply(data: &[u8], row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / row_len.max(1) + 1);
    for row in data.chunks(row_len.max(1)) {
        out.push(0);
        out.extend_from_slice(row);
    }
    out
}

// ---------------------------------------------------------------------
// recompression of images inside an existing file
// ---------------------------------------------------------------------

/// Target format of [`recompress_images`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecompressFormat {
    Jpeg,
    Flate,
}

#[derive(Debug, Clone)]
pub struct RecompressOptions {
    pub jpeg_quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub format: RecompressFormat,
}

impl Default for RecompressOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_width: None,
            max_height: None,
            format: RecompressFormat::Jpeg,
        }
    }
}

/// Decodes every image XObject, downscales to the requested bounds and
/// re-encodes it. Returns the rewritten file and the number of images
/// modified.
pub fn recompress_images(data: &[u8], opts: &RecompressOptions) -> Result<(Vec<u8>, usize)> {
    let mut parsed = ParsedPdf::parse(data)?;
    let numbers: Vec<u32> = parsed.object_numbers().iter().map(|(no, _)| *no).collect();
    let mut modified = 0usize;

    for no in numbers {
        let Some(decoded) = decode_image_object(&parsed, no) else {
            continue;
        };
        let (img, _had_dct) = decoded;

        let (w, h) = (img.width(), img.height());
        let max_w = opts.max_width.unwrap_or(w);
        let max_h = opts.max_height.unwrap_or(h);
        let needs_resize = w > max_w || h > max_h;
        let resized = if needs_resize {
            img.resize(max_w, max_h, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        let Some(obj) = parsed.object_mut(no) else {
            continue;
        };
        let Obj::Stream(stream) = obj else { continue };

        match opts.format {
            RecompressFormat::Jpeg => {
                let mut out = Vec::new();
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut out,
                    opts.jpeg_quality,
                );
                if encoder.encode_image(&resized).is_err() {
                    warn!("re-encoding image object {} failed, leaving as is", no);
                    continue;
                }
                stream.content = out;
                stream.filters.clear();
                stream.dict.set("Filter", Obj::name("DCTDecode"));
                stream.dict.set(
                    "ColorSpace",
                    Obj::name(match resized.color() {
                        image::ColorType::L8 => "DeviceGray",
                        _ => "DeviceRGB",
                    }),
                );
            }
            RecompressFormat::Flate => {
                let rgb = resized.to_rgb8();
                stream.content = crate::serialize::compress_flate(rgb.as_raw());
                stream.filters.clear();
                stream.dict.set("Filter", Obj::name("FlateDecode"));
                stream.dict.set("ColorSpace", Obj::name("DeviceRGB"));
            }
        }
        stream.dict.set("Width", resized.width() as i64);
        stream.dict.set("Height", resized.height() as i64);
        stream.dict.set("BitsPerComponent", 8i64);
        stream.dict.remove("DecodeParms");
        stream.dict.remove("Decode");
        stream
            .dict
            .set("Length", stream.content.len() as i64);
        modified += 1;
    }

    Ok((parsed.write(), modified))
}

/// Reads one image XObject into a `DynamicImage`; `None` for anything
/// that is not a decodable 8-bit image
fn decode_image_object(
    parsed: &ParsedPdf,
    no: u32,
) -> Option<(image::DynamicImage, bool)> {
    let stream = parsed.object(no)?.as_stream()?;
    if stream.dict.get("Subtype").and_then(Obj::as_name) != Some("Image") {
        return None;
    }
    let width = stream.dict.get("Width").and_then(Obj::as_int)? as u32;
    let height = stream.dict.get("Height").and_then(Obj::as_int)? as u32;
    let bpc = stream
        .dict
        .get("BitsPerComponent")
        .and_then(Obj::as_int)
        .unwrap_or(8);
    if bpc != 8 {
        return None;
    }
    let filter = match stream.dict.get("Filter").map(|f| parsed.resolve(f)) {
        Some(Obj::Name(n)) => n.clone(),
        Some(Obj::Array(items)) => items.last()?.as_name()?.to_string(),
        _ => String::new(),
    };

    if filter == "DCTDecode" {
        let img =
            image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok()?;
        return Some((img, true));
    }
    if filter == "FlateDecode" || filter.is_empty() {
        let raw = parsed.decode_stream(stream).ok()?;
        let components = match stream
            .dict
            .get("ColorSpace")
            .map(|c| parsed.resolve(c))
            .and_then(Obj::as_name)
        {
            Some("DeviceRGB") => 3,
            Some("DeviceGray") => 1,
            _ => return None,
        };
        if raw.len() < (width * height) as usize * components {
            return None;
        }
        let img = match components {
            3 => image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(
                width,
                height,
                raw[..(width * height * 3) as usize].to_vec(),
            )?),
            _ => image::DynamicImage::ImageLuma8(image::GrayImage::from_raw(
                width,
                height,
                raw[..(width * height) as usize].to_vec(),
            )?),
        };
        return Some((img, false));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a valid PNG in memory through a minimal encoder
    fn make_png(width: u32, height: u32, color_type: u8, pixel: &[u8]) -> Vec<u8> {
        let channels = match color_type {
            0 => 1,
            2 => 3,
            4 => 2,
            6 => 4,
            _ => panic!(),
        };
        let mut raw = Vec::new();
        for _ in 0..height {
            raw.push(0u8); // filter: none
            for _ in 0..width {
                raw.extend_from_slice(&pixel[..channels]);
            }
        }
        let idat = crate::serialize::compress_flate(&raw);

        let mut out = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]);
        push_chunk(&mut out, b"IHDR", &ihdr);
        push_chunk(&mut out, b"IDAT", &idat);
        push_chunk(&mut out, b"IEND", &[]);
        out
    }

    fn push_chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0u8; 4]); // crc unchecked
    }

    #[test]
    fn png_rgb_decode() {
        let png = make_png(4, 2, 2, &[10, 20, 30]);
        let img = RawImage::decode(&png).unwrap();
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 2);
        assert_eq!(img.color_space, ColorSpace::Rgb);
        match &img.data {
            ImageData::Raw(d) => {
                assert_eq!(d.len(), 4 * 2 * 3);
                assert_eq!(&d[..3], &[10, 20, 30]);
            }
            _ => panic!("expected raw data"),
        }
        assert!(img.smask.is_none());
    }

    #[test]
    fn png_rgba_splits_smask() {
        let png = make_png(2, 2, 6, &[1, 2, 3, 128]);
        let img = RawImage::decode(&png).unwrap();
        assert_eq!(img.color_space, ColorSpace::Rgb);
        let smask = img.smask.unwrap();
        assert_eq!(smask, vec![128, 128, 128, 128]);
    }

    #[test]
    fn png_gray_alpha_splits_smask() {
        let png = make_png(3, 1, 4, &[200, 77]);
        let img = RawImage::decode(&png).unwrap();
        assert_eq!(img.color_space, ColorSpace::Greyscale);
        assert_eq!(img.smask.unwrap(), vec![77, 77, 77]);
        match img.data {
            ImageData::Raw(d) => assert_eq!(d, vec![200, 200, 200]),
            _ => panic!(),
        }
    }

    #[test]
    fn png_16_bit_rejected() {
        let mut png = make_png(2, 2, 2, &[1, 2, 3]);
        // patch bit depth inside IHDR
        png[8 + 8 + 8] = 16;
        assert!(matches!(
            RawImage::decode(&png),
            Err(PdfError::ImageParse(_))
        ));
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(RawImage::decode(b"GIF89a....").is_err());
    }

    #[test]
    fn predictor_inverse_sub_filter() {
        // one row, filter 1 (sub), bpp 1: [5, +3, +2] → [5, 8, 10]
        let data = [1u8, 5, 3, 2];
        let out = png_predictor_inverse(&data, 3, 1).unwrap();
        assert_eq!(out, vec![5, 8, 10]);
    }

    #[test]
    fn predictor_inverse_up_filter() {
        // two rows: first plain, second filter 2 (up)
        let data = [0u8, 1, 2, 3, 2, 10, 10, 10];
        let out = png_predictor_inverse(&data, 3, 1).unwrap();
        assert_eq!(out, vec![1, 2, 3, 11, 12, 13]);
    }

    #[test]
    fn predictor_apply_round_trip() {
        let raw = vec![9u8, 8, 7, 6, 5, 4];
        let tagged = png_predictor_apply(&raw, 3);
        assert_eq!(png_predictor_inverse(&tagged, 3, 1).unwrap(), raw);
    }

    #[test]
    fn jpeg_sof_parse() {
        // SOI + APP0 stub + SOF0 with 8bpc 3x 10x20 + EOI
        let mut jpg = vec![0xFF, 0xD8];
        jpg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        jpg.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 8, 0x00, 20, 0x00, 10, 3, 0x01,
        ]);
        let img = decode_jpeg(&jpg).unwrap();
        assert_eq!(img.width, 10);
        assert_eq!(img.height, 20);
        assert_eq!(img.color_space, ColorSpace::Rgb);
        assert!(!img.needs_cmyk_invert());
    }

    #[test]
    fn identical_images_share_dedup_key() {
        let a = RawImage::decode(&make_png(2, 2, 2, &[9, 9, 9])).unwrap();
        let b = RawImage::decode(&make_png(2, 2, 2, &[9, 9, 9])).unwrap();
        let c = RawImage::decode(&make_png(2, 2, 2, &[1, 9, 9])).unwrap();
        assert_eq!(a.dedup_key, b.dedup_key);
        assert_ne!(a.dedup_key, c.dedup_key);
    }
}
