//! Measurement units. The drawing API accepts coordinates in whatever
//! unit the document was configured with; internally everything is
//! points (1/72 inch).

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

use serde_derive::{Deserialize, Serialize};

const PT_PER_MM: f32 = 72.0 / 25.4;
const PT_PER_INCH: f32 = 72.0;

/// Points, the native unit of the file format
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pt(pub f32);

/// Millimeters
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mm(pub f32);

/// Device pixels, used when sizing raster images
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Px(pub usize);

impl From<Mm> for Pt {
    fn from(v: Mm) -> Pt {
        Pt(v.0 * PT_PER_MM)
    }
}

impl From<Pt> for Mm {
    fn from(v: Pt) -> Mm {
        Mm(v.0 / PT_PER_MM)
    }
}

impl Mm {
    pub fn into_pt(self) -> Pt {
        self.into()
    }
}

impl Px {
    /// Pixel count to points at a given resolution
    pub fn into_pt(self, dpi: f32) -> Pt {
        Pt(self.0 as f32 * PT_PER_INCH / dpi)
    }
}

/// Coordinate arithmetic, ordering, and a comparison that absorbs the
/// rounding error a value picks up on a unit round trip. Anything
/// within half a thousandth of a unit counts as the same coordinate;
/// non-finite values never compare equal.
macro_rules! coordinate_unit {
    ($unit:ident) => {
        impl PartialEq for $unit {
            fn eq(&self, other: &Self) -> bool {
                self.0.is_finite()
                    && other.0.is_finite()
                    && (self.0 - other.0).abs() < 5.0e-4
            }
        }

        impl Eq for $unit {}

        impl PartialOrd for $unit {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $unit {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl Add for $unit {
            type Output = Self;
            fn add(self, other: Self) -> Self {
                $unit(self.0 + other.0)
            }
        }

        impl AddAssign for $unit {
            fn add_assign(&mut self, other: Self) {
                self.0 += other.0;
            }
        }

        impl Sub for $unit {
            type Output = Self;
            fn sub(self, other: Self) -> Self {
                $unit(self.0 - other.0)
            }
        }

        impl SubAssign for $unit {
            fn sub_assign(&mut self, other: Self) {
                self.0 -= other.0;
            }
        }

        impl Mul<f32> for $unit {
            type Output = Self;
            fn mul(self, factor: f32) -> Self {
                $unit(self.0 * factor)
            }
        }

        impl Div<f32> for $unit {
            type Output = Self;
            fn div(self, factor: f32) -> Self {
                $unit(self.0 / factor)
            }
        }

        /// Ratio of two values of the same unit
        impl Div for $unit {
            type Output = f32;
            fn div(self, other: Self) -> f32 {
                self.0 / other.0
            }
        }
    };
}

coordinate_unit!(Pt);
coordinate_unit!(Mm);

/// Unit of the values passed to the public drawing API.
/// Everything is converted to points internally.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[default]
    Pt,
    Mm,
    Cm,
    Inch,
}

impl Unit {
    /// Conversion factor from this unit to points
    pub fn to_pt(self) -> f32 {
        match self {
            Unit::Pt => 1.0,
            Unit::Mm => PT_PER_MM,
            Unit::Cm => PT_PER_MM * 10.0,
            Unit::Inch => PT_PER_INCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_pt_round_trip() {
        let start = Mm(210.0); // A4 width
        let back: Mm = Pt::from(start).into();
        assert_eq!(back, start);
        let start = Pt(595.2756);
        let back: Pt = Mm::from(start).into();
        assert_eq!(back, start);
    }

    #[test]
    fn a4_width_in_points() {
        assert_eq!(Mm(210.0).into_pt(), Pt(595.2756));
    }

    #[test]
    fn px_to_pt_depends_on_dpi() {
        assert_eq!(Px(72).into_pt(72.0), Pt(72.0));
        assert_eq!(Px(300).into_pt(300.0), Pt(72.0));
    }

    #[test]
    fn tolerance_absorbs_rounding_noise() {
        assert_eq!(Pt(10.0), Pt(10.0001));
        assert_ne!(Pt(10.0), Pt(10.01));
        assert_ne!(Pt(f32::NAN), Pt(f32::NAN));
    }

    #[test]
    fn ordering_and_arithmetic() {
        let mut widths = [Pt(30.0), Pt(10.0), Pt(20.0)];
        widths.sort();
        assert_eq!(widths[0], Pt(10.0));
        assert_eq!(*widths.iter().max().unwrap(), Pt(30.0));

        let mut total = Pt(10.0) + Pt(20.0);
        total += Pt(5.0);
        total -= Pt(15.0);
        assert_eq!(total, Pt(20.0));
        assert_eq!(total * 2.0, Pt(40.0));
        assert_eq!(total / Pt(10.0), 2.0);
    }

    #[test]
    fn unit_factors() {
        assert_eq!(Unit::Pt.to_pt(), 1.0);
        assert_eq!(Unit::Inch.to_pt(), 72.0);
        assert_eq!(Pt(Unit::Cm.to_pt()), Pt(Unit::Mm.to_pt() * 10.0));
    }
}
