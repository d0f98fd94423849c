// Layout geometry - 2D points, affine transforms, sector warp, normalization

use serde::{Deserialize, Serialize};

/// Row-major 3x3 homogeneous transform
pub type Matrix3 = [[f64; 3]; 3];

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Flips the y axis around the centre of the unit square
pub const CENTER_FLIP_Y: Matrix3 = [[1.0, 0.0, 0.0], [0.0, -1.0, 1.0], [0.0, 0.0, 1.0]];

/// A position, normalized to [0, 1] or in absolute device units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Apply an affine transform; both output coordinates use the untransformed input
    pub fn transform(&self, m: &Matrix3) -> Point {
        Point {
            x: self.x * m[0][0] + self.y * m[0][1] + m[0][2],
            y: self.x * m[1][0] + self.y * m[1][1] + m[1][2],
        }
    }

    /// Bend the unit rectangle onto a circular sector
    ///
    /// `x` sweeps the angle across `[pi/2 - angle/2, pi/2 + angle/2]`; `y` is
    /// added to the radius. The sector's centre sits at `(0.5, -radius)`.
    pub fn arc_warp(&self, center_angle: f64, radius: f64) -> Point {
        let start = std::f64::consts::FRAC_PI_2 - center_angle / 2.0;
        let angle = start + center_angle * self.x;
        let r = radius + self.y;

        Point {
            x: 0.5 + r * angle.cos(),
            y: -radius + r * angle.sin(),
        }
    }
}

/// Axis-aligned bounding box of a point set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Bounds of `points`, or `None` if there are none
    pub fn of<'a, I>(points: I) -> Option<Bounds>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;

        Some(iter.fold(
            Bounds {
                min: first,
                max: first,
            },
            |b, p| Bounds {
                min: Point::new(b.min.x.min(p.x), b.min.y.min(p.y)),
                max: Point::new(b.max.x.max(p.x), b.max.y.max(p.y)),
            },
        ))
    }

    /// Map a point into [0, 1] per axis; an axis with zero extent maps to 0
    pub fn normalize(&self, p: &Point) -> Point {
        Point {
            x: normalize_axis(p.x, self.min.x, self.max.x),
            y: normalize_axis(p.y, self.min.y, self.max.y),
        }
    }
}

fn normalize_axis(value: f64, min: f64, max: f64) -> f64 {
    let extent = max - min;
    if extent.abs() < f64::EPSILON {
        0.0
    } else {
        (value - min) / extent
    }
}

/// Normalize a point set in place to span [0, 1] on each axis
pub fn normalize_points<'a, I>(points: I)
where
    I: IntoIterator<Item = &'a mut Point>,
{
    let points: Vec<&mut Point> = points.into_iter().collect();
    let Some(bounds) = Bounds::of(points.iter().map(|p| &**p)) else {
        return;
    };

    for p in points {
        *p = bounds.normalize(p);
    }
}
