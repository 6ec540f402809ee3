//! Transformation matrices for shapes and page-level transforms.

use serde_derive::{Deserialize, Serialize};

use crate::color::fmt_f32;
use crate::units::Pt;

/// PDF "current transformation matrix". Once emitted, operates on all
/// following operators until the surrounding graphics state is restored.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "data")]
pub enum CurTransMat {
    /// Translation (in points from the bottom left corner)
    Translate(Pt, Pt),
    /// Rotation, counter-clockwise in degrees
    Rotate(f32),
    /// Rotation about a point, counter-clockwise in degrees
    RotateAbout(Pt, Pt, f32),
    /// Scale (1.0 = 100 %)
    Scale(f32, f32),
    /// Raw (PDF-internal) matrix
    Raw([f32; 6]),
    Identity,
}

impl CurTransMat {
    pub fn as_array(&self) -> [f32; 6] {
        match self {
            CurTransMat::Translate(x, y) => [1.0, 0.0, 0.0, 1.0, x.0, y.0],
            CurTransMat::Rotate(deg) => {
                let rad = deg.to_radians();
                [rad.cos(), rad.sin(), -rad.sin(), rad.cos(), 0.0, 0.0]
            }
            CurTransMat::RotateAbout(x, y, deg) => {
                // translate to origin, rotate, translate back
                let t = Self::combine(
                    Self::Translate(Pt(-x.0), Pt(-y.0)).as_array(),
                    Self::Rotate(*deg).as_array(),
                );
                Self::combine(t, Self::Translate(*x, *y).as_array())
            }
            CurTransMat::Scale(sx, sy) => [*sx, 0.0, 0.0, *sy, 0.0, 0.0],
            CurTransMat::Raw(m) => *m,
            CurTransMat::Identity => [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        }
    }

    /// Matrix product `a × b` of two 2×3 affine matrices
    pub fn combine(a: [f32; 6], b: [f32; 6]) -> [f32; 6] {
        [
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
            a[4] * b[0] + a[5] * b[2] + b[4],
            a[4] * b[1] + a[5] * b[3] + b[5],
        ]
    }

    /// Applies the matrix to a point
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = self.as_array();
        (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
    }

    /// Emits a `cm` operator
    pub(crate) fn write_op(&self, out: &mut Vec<u8>) {
        let m = self.as_array();
        out.extend_from_slice(
            format!(
                "{} {} {} {} {} {} cm\n",
                fmt_f32(m[0]),
                fmt_f32(m[1]),
                fmt_f32(m[2]),
                fmt_f32(m[3]),
                fmt_f32(m[4]),
                fmt_f32(m[5])
            )
            .as_bytes(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_combine() {
        let id = CurTransMat::Identity.as_array();
        let t = CurTransMat::Translate(Pt(10.0), Pt(20.0)).as_array();
        assert_eq!(CurTransMat::combine(id, t), t);
        assert_eq!(CurTransMat::combine(t, id), t);
    }

    #[test]
    fn rotate_about_round_trip() {
        // rotating 360 degrees about a point is the identity within tolerance
        let m = CurTransMat::RotateAbout(Pt(100.0), Pt(50.0), 360.0);
        let (x, y) = m.apply(30.0, 40.0);
        assert!((x - 30.0).abs() < 1e-3);
        assert!((y - 40.0).abs() < 1e-3);
    }

    #[test]
    fn cm_operator() {
        let mut out = Vec::new();
        CurTransMat::Translate(Pt(5.0), Pt(7.5)).write_op(&mut out);
        assert_eq!(out, b"1 0 0 1 5 7.5 cm\n");
    }
}
