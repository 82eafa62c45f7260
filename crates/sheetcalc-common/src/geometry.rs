//! Plain coordinate types used by the grid, the reference model and the
//! evaluator.
//!
//! All coordinates are unsigned and bounded by [`MAX_SIZE`], which is derived
//! from the tile geometry of the sparse grid ([`GRID_LEVELS`]).

use std::fmt;
use std::ops::{Add, Sub};

pub type SizeType = u32;

/// Bits of `(x, y)` consumed by each tile level of the grid, from the root
/// level down to the leaf level.
pub const GRID_LEVELS: [(u32, u32); 3] = [(4, 10), (4, 10), (8, 11)];

const fn total_bits(axis: usize) -> u32 {
    let mut sum = 0;
    let mut i = 0;
    while i < GRID_LEVELS.len() {
        sum += if axis == 0 {
            GRID_LEVELS[i].0
        } else {
            GRID_LEVELS[i].1
        };
        i += 1;
    }
    sum
}

/// Upper bound on every sheet coordinate: `(2^16 - 1, 2^31 - 1)`.
pub const MAX_SIZE: Size = Size {
    width: ((1u64 << total_bits(0)) - 1) as SizeType,
    height: ((1u64 << total_bits(1)) - 1) as SizeType,
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: SizeType,
    pub y: SizeType,
}

impl Point {
    pub const fn new(x: SizeType, y: SizeType) -> Self {
        Self { x, y }
    }

    pub const fn as_size(self) -> Size {
        Size {
            width: self.x,
            height: self.y,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Add<Size> for Point {
    type Output = Point;

    fn add(self, rhs: Size) -> Point {
        Point::new(self.x + rhs.width, self.y + rhs.height)
    }
}

impl Sub<Size> for Point {
    type Output = Point;

    fn sub(self, rhs: Size) -> Point {
        Point::new(self.x - rhs.width, self.y - rhs.height)
    }
}

impl Sub for Point {
    type Output = Size;

    fn sub(self, rhs: Point) -> Size {
        Size::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: SizeType,
    pub height: SizeType,
}

impl Size {
    pub const ONE: Size = Size::new(1, 1);

    pub const fn new(width: SizeType, height: SizeType) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of cells covered, widened so `MAX_SIZE` does not overflow.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Grow to the component-wise maximum of `self` and `other`.
    pub fn extend_to(&mut self, other: Size) {
        self.width = self.width.max(other.width);
        self.height = self.height.max(other.height);
    }

    pub fn contains(&self, pt: Point) -> bool {
        pt.x < self.width && pt.y < self.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size::new(self.width + rhs.width, self.height + rhs.height)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub const fn from_xywh(x: SizeType, y: SizeType, w: SizeType, h: SizeType) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(w, h),
        }
    }

    /// Smallest rect containing both corners.
    pub fn spanning(a: Point, b: Point) -> Self {
        let origin = Point::new(a.x.min(b.x), a.y.min(b.y));
        Rect {
            origin,
            size: Size::new(a.x.max(b.x) - origin.x + 1, a.y.max(b.y) - origin.y + 1),
        }
    }

    pub const fn end(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width,
            self.origin.y + self.size.height,
        )
    }

    pub const fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains(&self, pt: Point) -> bool {
        pt.x >= self.origin.x
            && pt.y >= self.origin.y
            && pt.x - self.origin.x < self.size.width
            && pt.y - self.origin.y < self.size.height
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = (self.origin.x as u64 + self.size.width as u64)
            .min(other.origin.x as u64 + other.size.width as u64);
        let y1 = (self.origin.y as u64 + self.size.height as u64)
            .min(other.origin.y as u64 + other.size.height as u64);
        if (x0 as u64) < x1 && (y0 as u64) < y1 {
            Some(Rect::from_xywh(
                x0,
                y0,
                (x1 - x0 as u64) as SizeType,
                (y1 - y0 as u64) as SizeType,
            ))
        } else {
            None
        }
    }

    /// Iterate every covered point in row-major order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        let Rect { origin, size } = *self;
        (0..size.height).flat_map(move |dy| {
            (0..size.width).map(move |dx| Point::new(origin.x + dx, origin.y + dy))
        })
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.origin, self.size)
    }
}
