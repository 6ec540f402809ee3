//! One page: boxes, rotation, annotations and the ordered content item
//! list that becomes its content stream.

use crate::annotation::Annotation;
use crate::object::ObjId;
use crate::ops::ContentItem;

/// Page dimensions in points. `page_size` presets follow ISO 216.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A3: PageSize = PageSize {
        width: 841.89,
        height: 1190.55,
    };
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };
    pub const A5: PageSize = PageSize {
        width: 419.53,
        height: 595.28,
    };
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
    pub const LEGAL: PageSize = PageSize {
        width: 612.0,
        height: 1008.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn landscape(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// `[llx lly urx ury]` in PDF coordinates
pub type PdfRect = [f32; 4];

/// Options for `add_page_with_option`
#[derive(Debug, Clone, Default)]
pub struct PageOption {
    pub page_size: Option<PageSize>,
    pub trim_box: Option<PdfRect>,
    pub crop_box: Option<PdfRect>,
}

#[derive(Debug)]
pub struct Page {
    /// object slot of the page dictionary
    pub(crate) obj_id: ObjId,
    /// object slot of the content stream
    pub(crate) content_id: ObjId,
    pub(crate) size: PageSize,
    pub(crate) crop_box: Option<PdfRect>,
    pub(crate) trim_box: Option<PdfRect>,
    pub(crate) bleed_box: Option<PdfRect>,
    pub(crate) art_box: Option<PdfRect>,
    /// multiple of 90
    pub(crate) rotation: i32,
    pub(crate) items: Vec<ContentItem>,
    pub(crate) annotations: Vec<Annotation>,
}

impl Page {
    pub(crate) fn new(obj_id: ObjId, content_id: ObjId, size: PageSize) -> Self {
        Self {
            obj_id,
            content_id,
            size,
            crop_box: None,
            trim_box: None,
            bleed_box: None,
            art_box: None,
            rotation: 0,
            items: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// Slot of the page dictionary in the document's object table
    pub fn object_id(&self) -> ObjId {
        self.obj_id
    }

    /// Slot of the page's content stream
    pub fn content_object_id(&self) -> ObjId {
        self.content_id
    }

    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    /// Clone for `copy_page` / `select_pages`: same geometry and items,
    /// fresh object slots supplied by the caller
    pub(crate) fn duplicate(&self, obj_id: ObjId, content_id: ObjId) -> Page {
        Page {
            obj_id,
            content_id,
            size: self.size,
            crop_box: self.crop_box,
            trim_box: self.trim_box,
            bleed_box: self.bleed_box,
            art_box: self.art_box,
            rotation: self.rotation,
            items: self.items.clone(),
            annotations: self.annotations.clone(),
        }
    }

    /// `q`/`Q` balance of the item list; non-zero depth is an error at
    /// serialize time
    pub(crate) fn graphics_depth(&self) -> i32 {
        self.items.iter().map(|i| i.gs_depth_delta()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_swaps_dimensions() {
        let l = PageSize::A4.landscape();
        assert_eq!(l.width, PageSize::A4.height);
        assert_eq!(l.height, PageSize::A4.width);
    }

    #[test]
    fn graphics_depth_counts_pairs() {
        let mut page = Page::new(ObjId(0), ObjId(1), PageSize::A4);
        page.items.push(ContentItem::SaveGraphicsState);
        page.items.push(ContentItem::RestoreGraphicsState);
        assert_eq!(page.graphics_depth(), 0);
        page.items.push(ContentItem::SaveGraphicsState);
        assert_eq!(page.graphics_depth(), 1);
        page.items.push(ContentItem::Rotate {
            angle_deg: 45.0,
            cx: 0.0,
            cy: 0.0,
        });
        page.items.push(ContentItem::RotateReset);
        assert_eq!(page.graphics_depth(), 1);
    }
}
