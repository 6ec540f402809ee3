//! Page annotations: external links, internal jump targets, and plain
//! text notes.

use crate::object::{Dict, Obj, ObjId, StringFormat};

/// An annotation attached to a page. Rectangles are in points with the
/// upper-left origin of the drawing API; the y axis flips at emit time.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Clickable link to a URI
    Link {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        uri: String,
    },
    /// Clickable jump to another page of the same document
    InternalLink {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        /// 0-based target page
        page: usize,
        /// target y from the top of that page
        top: f32,
    },
    /// Plain popup note
    Text {
        x: f32,
        y: f32,
        contents: String,
    },
}

impl Annotation {
    /// Builds the annotation dictionary. `page_height` flips the rect,
    /// `page_ids` resolves internal destinations.
    pub(crate) fn to_dict(&self, page_height: f32, page_ids: &[ObjId]) -> Dict {
        let mut dict = Dict::new();
        dict.set("Type", Obj::name("Annot"));
        match self {
            Annotation::Link {
                x,
                y,
                width,
                height,
                uri,
            } => {
                dict.set("Subtype", Obj::name("Link"));
                dict.set("Rect", rect_array(*x, *y, *width, *height, page_height));
                dict.set("Border", Obj::Array(vec![Obj::Integer(0), Obj::Integer(0), Obj::Integer(0)]));
                let mut action = Dict::new();
                action.set("Type", Obj::name("Action"));
                action.set("S", Obj::name("URI"));
                action.set(
                    "URI",
                    Obj::String(uri.clone().into_bytes(), StringFormat::Literal),
                );
                dict.set("A", action);
            }
            Annotation::InternalLink {
                x,
                y,
                width,
                height,
                page,
                top,
            } => {
                dict.set("Subtype", Obj::name("Link"));
                dict.set("Rect", rect_array(*x, *y, *width, *height, page_height));
                dict.set("Border", Obj::Array(vec![Obj::Integer(0), Obj::Integer(0), Obj::Integer(0)]));
                if let Some(target) = page_ids.get(*page) {
                    dict.set(
                        "Dest",
                        Obj::Array(vec![
                            Obj::Reference(*target),
                            Obj::name("XYZ"),
                            Obj::Null,
                            Obj::Real(page_height - top),
                            Obj::Null,
                        ]),
                    );
                }
            }
            Annotation::Text { x, y, contents } => {
                dict.set("Subtype", Obj::name("Text"));
                dict.set("Rect", rect_array(*x, *y, 20.0, 20.0, page_height));
                dict.set(
                    "Contents",
                    Obj::String(contents.clone().into_bytes(), StringFormat::Literal),
                );
            }
        }
        dict
    }
}

fn rect_array(x: f32, y: f32, width: f32, height: f32, page_height: f32) -> Obj {
    Obj::Array(vec![
        Obj::Real(x),
        Obj::Real(page_height - y - height),
        Obj::Real(x + width),
        Obj::Real(page_height - y),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_rect_is_flipped() {
        let annot = Annotation::Link {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 30.0,
            uri: "https://example.com".to_string(),
        };
        let dict = annot.to_dict(800.0, &[]);
        let rect = dict.get("Rect").unwrap().as_array().unwrap();
        assert_eq!(rect[1].as_f32(), Some(750.0));
        assert_eq!(rect[3].as_f32(), Some(780.0));
        let action = dict.get("A").unwrap().as_dict().unwrap();
        assert_eq!(
            action.get("URI").and_then(Obj::as_string),
            Some(b"https://example.com".as_slice())
        );
    }

    #[test]
    fn internal_link_resolves_page() {
        let annot = Annotation::InternalLink {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 10.0,
            page: 1,
            top: 100.0,
        };
        let dict = annot.to_dict(800.0, &[ObjId(4), ObjId(9)]);
        let dest = dict.get("Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0], Obj::Reference(ObjId(9)));
        assert_eq!(dest[3].as_f32(), Some(700.0));
    }
}
