use std::rc::Rc;

use crate::{Point, Scalar, Size};

/// Immutable rectangular buffer of scalars, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    size: Size,
    data: Box<[Scalar]>,
}

pub type ArrayRef = Rc<Array>;

impl Array {
    /// `data` must hold exactly `size.width * size.height` elements.
    pub fn new(size: Size, data: Vec<Scalar>) -> Self {
        debug_assert_eq!(data.len() as u64, size.area());
        Self {
            size,
            data: data.into_boxed_slice(),
        }
    }

    /// Build from rows of equal length. Returns `None` for ragged or empty
    /// input.
    pub fn from_rows(rows: Vec<Vec<Scalar>>) -> Option<Self> {
        let height = rows.len();
        let width = rows.first()?.len();
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return None;
        }
        let data: Vec<Scalar> = rows.into_iter().flatten().collect();
        Some(Self::new(Size::new(width as u32, height as u32), data))
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn get(&self, pt: Point) -> Option<&Scalar> {
        if !self.size.contains(pt) {
            return None;
        }
        self.data
            .get(pt.y as usize * self.size.width as usize + pt.x as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scalar> {
        self.data.iter()
    }

    /// `{a,b;c,d}` form.
    pub fn reconstruct(&self, dest: &mut String) {
        dest.push('{');
        for y in 0..self.size.height {
            if y != 0 {
                dest.push(';');
            }
            for x in 0..self.size.width {
                if x != 0 {
                    dest.push(',');
                }
                if let Some(v) = self.get(Point::new(x, y)) {
                    v.reconstruct(dest);
                }
            }
        }
        dest.push('}');
    }
}
