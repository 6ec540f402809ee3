//! Image XObjects: turning decoded images into the stream objects a
//! page's `/XObject` resource dictionary references.

use std::collections::HashMap;

use crate::color::ColorSpace;
use crate::image::{png_predictor_apply, ImageData, RawImage};
use crate::object::{Dict, Obj, ObjId, StreamObj, StringFormat};
use crate::serialize::compress_flate;

/// Images registered on a document. Position in the list is the `/Xn`
/// resource name; identical content maps to the same entry.
#[derive(Debug, Default, Clone)]
pub struct XObjectList {
    entries: Vec<RawImage>,
    by_key: HashMap<[u8; 32], usize>,
}

impl XObjectList {
    /// Registers an image, deduplicating by content hash
    pub fn add(&mut self, image: RawImage) -> usize {
        if let Some(&idx) = self.by_key.get(&image.dedup_key) {
            return idx;
        }
        let idx = self.entries.len();
        self.by_key.insert(image.dedup_key, idx);
        self.entries.push(image);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&RawImage> {
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RawImage)> {
        self.entries.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the image stream. `smask` is the object holding the alpha
/// channel, when the image has one.
pub(crate) fn image_to_stream(img: &RawImage, smask: Option<ObjId>) -> StreamObj {
    let mut dict = Dict::new();
    dict.set("Type", Obj::name("XObject"));
    dict.set("Subtype", Obj::name("Image"));
    dict.set("Width", img.width as i64);
    dict.set("Height", img.height as i64);
    dict.set("BitsPerComponent", img.bits_per_component as i64);

    match img.color_space {
        ColorSpace::Indexed => {
            let palette = img.palette.clone().unwrap_or_default();
            let hival = (palette.len() / 3).saturating_sub(1) as i64;
            dict.set(
                "ColorSpace",
                Obj::Array(vec![
                    Obj::name("Indexed"),
                    Obj::name("DeviceRGB"),
                    Obj::Integer(hival),
                    Obj::String(palette, StringFormat::Hexadecimal),
                ]),
            );
        }
        other => dict.set("ColorSpace", Obj::name(other.pdf_name())),
    }

    if img.needs_cmyk_invert() {
        // Adobe-style CMYK JPEGs store inverted ink values
        dict.set(
            "Decode",
            Obj::Array(
                std::iter::repeat([Obj::Integer(1), Obj::Integer(0)])
                    .take(4)
                    .flatten()
                    .collect(),
            ),
        );
    }

    if let Some(mask) = &img.transparency {
        dict.set(
            "Mask",
            Obj::Array(mask.iter().map(|v| Obj::Integer(*v as i64)).collect()),
        );
    }

    if let Some(smask_id) = smask {
        dict.set("SMask", smask_id);
    }

    let (content, filters) = match &img.data {
        ImageData::Jpeg(bytes) => (bytes.clone(), vec!["DCTDecode".to_string()]),
        ImageData::Raw(samples) => {
            let components = img.color_space.components();
            let row_len =
                (img.width as usize * components * img.bits_per_component as usize).div_ceil(8);
            let tagged = png_predictor_apply(samples, row_len);
            let mut parms = Dict::new();
            parms.set("Predictor", 15i64);
            parms.set("Colors", components as i64);
            parms.set("BitsPerComponent", img.bits_per_component as i64);
            parms.set("Columns", img.width as i64);
            dict.set("DecodeParms", parms);
            (compress_flate(&tagged), vec!["FlateDecode".to_string()])
        }
    };

    StreamObj {
        dict,
        content,
        filters,
    }
}

/// The gray 8-bit soft-mask companion of an alpha image
pub(crate) fn smask_to_stream(width: u32, height: u32, alpha: &[u8]) -> StreamObj {
    let mut dict = Dict::new();
    dict.set("Type", Obj::name("XObject"));
    dict.set("Subtype", Obj::name("Image"));
    dict.set("Width", width as i64);
    dict.set("Height", height as i64);
    dict.set("BitsPerComponent", 8i64);
    dict.set("ColorSpace", Obj::name("DeviceGray"));
    let tagged = png_predictor_apply(alpha, width as usize);
    let mut parms = Dict::new();
    parms.set("Predictor", 15i64);
    parms.set("Colors", 1i64);
    parms.set("BitsPerComponent", 8i64);
    parms.set("Columns", width as i64);
    dict.set("DecodeParms", parms);
    StreamObj {
        dict,
        content: compress_flate(&tagged),
        filters: vec!["FlateDecode".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageData;

    fn raw_rgb() -> RawImage {
        RawImage {
            width: 2,
            height: 2,
            bits_per_component: 8,
            color_space: ColorSpace::Rgb,
            data: ImageData::Raw(vec![0u8; 12]),
            smask: None,
            palette: None,
            transparency: None,
            dedup_key: [7u8; 32],
        }
    }

    #[test]
    fn dedup_returns_same_index() {
        let mut list = XObjectList::default();
        let a = list.add(raw_rgb());
        let b = list.add(raw_rgb());
        assert_eq!(a, b);
        assert_eq!(list.len(), 1);

        let mut other = raw_rgb();
        other.dedup_key = [8u8; 32];
        assert_ne!(list.add(other), a);
    }

    #[test]
    fn raw_image_stream_declares_predictor() {
        let stream = image_to_stream(&raw_rgb(), None);
        assert_eq!(stream.filters, vec!["FlateDecode".to_string()]);
        let parms = stream.dict.get("DecodeParms").unwrap().as_dict().unwrap();
        assert_eq!(parms.get("Predictor").and_then(Obj::as_int), Some(15));
        assert_eq!(parms.get("Columns").and_then(Obj::as_int), Some(2));
    }

    #[test]
    fn jpeg_stream_uses_dct() {
        let img = RawImage {
            data: ImageData::Jpeg(vec![0xFF, 0xD8, 1, 2, 3]),
            color_space: ColorSpace::Cmyk,
            ..raw_rgb()
        };
        let stream = image_to_stream(&img, None);
        assert_eq!(stream.filters, vec!["DCTDecode".to_string()]);
        // CMYK JPEG carries the inverted decode array
        let decode = stream.dict.get("Decode").unwrap().as_array().unwrap();
        assert_eq!(decode.len(), 8);
        assert_eq!(decode[0].as_int(), Some(1));
    }

    #[test]
    fn smask_stream_is_gray() {
        let stream = smask_to_stream(3, 1, &[1, 2, 3]);
        assert_eq!(
            stream.dict.get("ColorSpace").and_then(Obj::as_name),
            Some("DeviceGray")
        );
        assert_eq!(stream.dict.get("Width").and_then(Obj::as_int), Some(3));
    }
}
