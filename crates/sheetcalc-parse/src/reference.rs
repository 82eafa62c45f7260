//! Cell, area, column and row references.
//!
//! A reference coordinate is either absolute (a fixed position) or relative
//! (a signed distance from the cell that owns the formula, its anchor).
//! Anchoring relative parts is what lets the same parsed formula be copied
//! or moved without re-parsing.

use sheetcalc_common::{
    MAX_SIZE, Point, Rect, Size, SizeType, index_to_column, index_to_row, scan_column, scan_row,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefCoord {
    Relative(i64),
    Absolute(SizeType),
}

impl RefCoord {
    /// Build from a parsed position relative to the anchor coordinate `at`.
    pub fn new(index: SizeType, absolute: bool, at: SizeType) -> Self {
        if absolute {
            RefCoord::Absolute(index)
        } else {
            RefCoord::Relative(index as i64 - at as i64)
        }
    }

    pub fn is_absolute(self) -> bool {
        matches!(self, RefCoord::Absolute(_))
    }

    /// Absolute position seen from `at`. May be negative or past the grid
    /// for relative coordinates carried to a new anchor.
    pub fn position(self, at: SizeType) -> i64 {
        match self {
            RefCoord::Absolute(pos) => pos as i64,
            RefCoord::Relative(dist) => at as i64 + dist,
        }
    }

    pub fn is_dereferencable(self, at: SizeType, max: SizeType) -> bool {
        let pos = self.position(at);
        pos >= 0 && pos < max as i64
    }

    pub fn dereference(self, at: SizeType) -> SizeType {
        let pos = self.position(at);
        debug_assert!(pos >= 0 && pos <= SizeType::MAX as i64);
        pos as SizeType
    }

    /// Shift the referenced position by `delta` without moving the anchor.
    pub fn shifted(self, delta: i64) -> Self {
        match self {
            RefCoord::Absolute(pos) => RefCoord::Absolute((pos as i64 + delta) as SizeType),
            RefCoord::Relative(dist) => RefCoord::Relative(dist + delta),
        }
    }

    /// The owning formula moved by `dist`; keep pointing at the same place.
    pub fn adjusted_to_move(self, dist: i64) -> Self {
        match self {
            RefCoord::Absolute(_) => self,
            RefCoord::Relative(d) => RefCoord::Relative(d - dist),
        }
    }

    /// `size` indices starting at `from` were erased. `at` is the anchor
    /// before the erasure.
    pub fn adjusted_to_erasure(self, at: SizeType, from: SizeType, size: SizeType) -> Self {
        let (at, from, size) = (at as i64, from as i64, size as i64);
        match self {
            RefCoord::Absolute(pos) => {
                let pos = pos as i64;
                if pos >= from {
                    RefCoord::Absolute((pos - (pos - from).min(size)) as SizeType)
                } else {
                    self
                }
            }
            RefCoord::Relative(dist) => {
                let pos = at + dist;
                if at < from && pos >= from {
                    RefCoord::Relative(dist - (pos - from).min(size))
                } else if at >= from + size && pos < from + size {
                    RefCoord::Relative(dist + (from + size - pos).min(size))
                } else {
                    self
                }
            }
        }
    }

    /// `size` indices were inserted before `before`. Returns `None` when the
    /// referenced position would be pushed past `max`.
    pub fn adjusted_to_insertion(
        self,
        at: SizeType,
        before: SizeType,
        size: SizeType,
        max: SizeType,
    ) -> Option<Self> {
        let (at, before, size, max) = (at as i64, before as i64, size as i64, max as i64);
        match self {
            RefCoord::Absolute(pos) => {
                let pos = pos as i64;
                if pos >= before {
                    if pos >= max - size {
                        return None;
                    }
                    Some(RefCoord::Absolute((pos + size) as SizeType))
                } else {
                    Some(self)
                }
            }
            RefCoord::Relative(dist) => {
                let pos = at + dist;
                if at < before && pos >= before {
                    if pos >= max - size {
                        return None;
                    }
                    Some(RefCoord::Relative(dist + size))
                } else if at >= before && pos < before {
                    Some(RefCoord::Relative(dist - size))
                } else {
                    Some(self)
                }
            }
        }
    }

    fn reconstruct_column(self, at: SizeType, dest: &mut String) {
        if self.is_absolute() {
            dest.push('$');
        }
        dest.push_str(&index_to_column(self.dereference(at)));
    }

    fn reconstruct_row(self, at: SizeType, dest: &mut String) {
        if self.is_absolute() {
            dest.push('$');
        }
        dest.push_str(&index_to_row(self.dereference(at)));
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CellReference {
    pub x: RefCoord,
    pub y: RefCoord,
}

impl CellReference {
    pub fn dereference(&self, at: Point) -> Point {
        Point::new(self.x.dereference(at.x), self.y.dereference(at.y))
    }

    pub fn is_dereferencable(&self, at: Point) -> bool {
        self.x.is_dereferencable(at.x, MAX_SIZE.width)
            && self.y.is_dereferencable(at.y, MAX_SIZE.height)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AreaReference {
    pub x_start: RefCoord,
    pub y_start: RefCoord,
    pub x_end: RefCoord,
    pub y_end: RefCoord,
}

impl AreaReference {
    /// Normalized rect, whichever corners were written first.
    pub fn dereference(&self, at: Point) -> Rect {
        Rect::spanning(
            Point::new(self.x_start.dereference(at.x), self.y_start.dereference(at.y)),
            Point::new(self.x_end.dereference(at.x), self.y_end.dereference(at.y)),
        )
    }

    pub fn is_dereferencable(&self, at: Point) -> bool {
        self.x_start.is_dereferencable(at.x, MAX_SIZE.width)
            && self.x_end.is_dereferencable(at.x, MAX_SIZE.width)
            && self.y_start.is_dereferencable(at.y, MAX_SIZE.height)
            && self.y_end.is_dereferencable(at.y, MAX_SIZE.height)
    }
}

/// A span of whole columns (`A:C`) or whole rows (`3:5`), depending on which
/// [`Reference`] variant holds it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DimensionReference {
    pub start: RefCoord,
    pub end: RefCoord,
}

impl DimensionReference {
    /// `(first index, count)` after normalizing.
    pub fn dereference(&self, at: SizeType) -> (SizeType, SizeType) {
        let a = self.start.dereference(at);
        let b = self.end.dereference(at);
        (a.min(b), a.max(b) - a.min(b) + 1)
    }

    pub fn is_dereferencable(&self, at: SizeType, max: SizeType) -> bool {
        self.start.is_dereferencable(at, max) && self.end.is_dereferencable(at, max)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Cell(CellReference),
    Area(AreaReference),
    Columns(DimensionReference),
    Rows(DimensionReference),
    /// A reference whose target no longer exists. Renders as `#REF!`.
    Illegal,
}

impl Reference {
    /// Parse `A1`, `$A$1`, `A1:B2`, `A:C` or `3:5` anchored at `at`.
    pub fn parse(text: &str, at: Point) -> Option<Reference> {
        if let Some((first, second)) = text.split_once(':') {
            if let (Some((x0, y0)), Some((x1, y1))) =
                (parse_cell_parts(first, at), parse_cell_parts(second, at))
            {
                return Some(Reference::Area(AreaReference {
                    x_start: x0,
                    y_start: y0,
                    x_end: x1,
                    y_end: y1,
                }));
            }
            if let (Some(a), Some(b)) = (whole(scan_column, first), whole(scan_column, second)) {
                return Some(Reference::Columns(DimensionReference {
                    start: RefCoord::new(a.0, a.1, at.x),
                    end: RefCoord::new(b.0, b.1, at.x),
                }));
            }
            if let (Some(a), Some(b)) = (whole(scan_row, first), whole(scan_row, second)) {
                return Some(Reference::Rows(DimensionReference {
                    start: RefCoord::new(a.0, a.1, at.y),
                    end: RefCoord::new(b.0, b.1, at.y),
                }));
            }
            return None;
        }
        let (x, y) = parse_cell_parts(text, at)?;
        Some(Reference::Cell(CellReference { x, y }))
    }

    pub fn is_dereferencable(&self, at: Point) -> bool {
        match self {
            Reference::Cell(r) => r.is_dereferencable(at),
            Reference::Area(r) => r.is_dereferencable(at),
            Reference::Columns(r) => r.is_dereferencable(at.x, MAX_SIZE.width),
            Reference::Rows(r) => r.is_dereferencable(at.y, MAX_SIZE.height),
            Reference::Illegal => false,
        }
    }

    /// Rect addressed by the reference; whole columns/rows span `grid_size`
    /// along the open axis.
    pub fn to_rect(&self, at: Point, grid_size: Size) -> Option<Rect> {
        match self {
            Reference::Cell(r) => Some(Rect::new(r.dereference(at), Size::ONE)),
            Reference::Area(r) => Some(r.dereference(at)),
            Reference::Columns(r) => {
                let (start, count) = r.dereference(at.x);
                Some(Rect::from_xywh(start, 0, count, grid_size.height))
            }
            Reference::Rows(r) => {
                let (start, count) = r.dereference(at.y);
                Some(Rect::from_xywh(0, start, grid_size.width, count))
            }
            Reference::Illegal => None,
        }
    }

    pub fn reconstruct(&self, at: Point, dest: &mut String) {
        if !self.is_dereferencable(at) {
            dest.push_str("#REF!");
            return;
        }
        match self {
            Reference::Cell(r) => {
                r.x.reconstruct_column(at.x, dest);
                r.y.reconstruct_row(at.y, dest);
            }
            Reference::Area(r) => {
                r.x_start.reconstruct_column(at.x, dest);
                r.y_start.reconstruct_row(at.y, dest);
                dest.push(':');
                r.x_end.reconstruct_column(at.x, dest);
                r.y_end.reconstruct_row(at.y, dest);
            }
            Reference::Columns(r) => {
                r.start.reconstruct_column(at.x, dest);
                dest.push(':');
                r.end.reconstruct_column(at.x, dest);
            }
            Reference::Rows(r) => {
                r.start.reconstruct_row(at.y, dest);
                dest.push(':');
                r.end.reconstruct_row(at.y, dest);
            }
            Reference::Illegal => {}
        }
    }
}

fn whole(
    scan: fn(&str) -> Option<sheetcalc_common::ScannedIndex>,
    s: &str,
) -> Option<(SizeType, bool)> {
    scan(s)
        .filter(|p| p.len == s.len())
        .map(|p| (p.index, p.absolute))
}

fn parse_cell_parts(s: &str, at: Point) -> Option<(RefCoord, RefCoord)> {
    let column = scan_column(s)?;
    let rest = &s[column.len..];
    let row = scan_row(rest).filter(|r| r.len == rest.len())?;
    Some((
        RefCoord::new(column.index, column.absolute, at.x),
        RefCoord::new(row.index, row.absolute, at.y),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(r: &Reference, at: Point) -> String {
        let mut s = String::new();
        r.reconstruct(at, &mut s);
        s
    }

    #[test]
    fn test_relative_parts_are_distances() {
        let at = Point::new(2, 2);
        let r = Reference::parse("A1", at).unwrap();
        assert_eq!(
            r,
            Reference::Cell(CellReference {
                x: RefCoord::Relative(-2),
                y: RefCoord::Relative(-2)
            })
        );
        // Rendered from a different anchor the relative parts follow along.
        assert_eq!(text(&r, Point::new(3, 5)), "B4");
        assert_eq!(text(&r, at), "A1");
    }

    #[test]
    fn test_absolute_parts_stay_put() {
        let r = Reference::parse("$B$3", Point::new(0, 0)).unwrap();
        assert_eq!(text(&r, Point::new(10, 10)), "$B$3");
        let mixed = Reference::parse("B$3", Point::new(0, 0)).unwrap();
        assert_eq!(text(&mixed, Point::new(1, 10)), "C$3");
    }

    #[test]
    fn test_areas_and_dimensions() {
        let at = Point::new(0, 0);
        let area = Reference::parse("c3:a1", at).unwrap();
        assert_eq!(
            area.to_rect(at, Size::new(5, 5)),
            Some(Rect::from_xywh(0, 0, 3, 3))
        );
        assert_eq!(text(&area, at), "C3:A1");

        let cols = Reference::parse("$B:D", at).unwrap();
        assert_eq!(
            cols.to_rect(at, Size::new(5, 7)),
            Some(Rect::from_xywh(1, 0, 3, 7))
        );
        assert_eq!(text(&cols, at), "$B:D");

        let rows = Reference::parse("4:2", at).unwrap();
        assert_eq!(
            rows.to_rect(at, Size::new(5, 7)),
            Some(Rect::from_xywh(0, 1, 5, 3))
        );
        assert_eq!(text(&Reference::Illegal, at), "#REF!");
    }

    #[test]
    fn test_names_are_not_references() {
        let at = Point::new(0, 0);
        assert_eq!(Reference::parse("FOO", at), None);
        assert_eq!(Reference::parse("A1:B", at), None);
        assert_eq!(Reference::parse("A0", at), None);
    }

    #[test]
    fn test_erasure_moves_coordinates() {
        // Formula at row 0 referencing row 19; rows 4..8 erased.
        assert_eq!(
            RefCoord::Relative(19).adjusted_to_erasure(0, 4, 4),
            RefCoord::Relative(15)
        );
        // Formula below the band referencing above it.
        assert_eq!(
            RefCoord::Relative(-9).adjusted_to_erasure(10, 4, 2),
            RefCoord::Relative(-7)
        );
        assert_eq!(
            RefCoord::Absolute(10).adjusted_to_erasure(0, 4, 4),
            RefCoord::Absolute(6)
        );
        assert_eq!(
            RefCoord::Absolute(5).adjusted_to_erasure(0, 4, 4),
            RefCoord::Absolute(4)
        );
    }

    #[test]
    fn test_insertion_detects_overflow() {
        let max = MAX_SIZE.height;
        assert_eq!(
            RefCoord::Absolute(max - 1).adjusted_to_insertion(0, 0, 1, max),
            None
        );
        assert_eq!(
            RefCoord::Relative(3).adjusted_to_insertion(0, 1, 2, max),
            Some(RefCoord::Relative(5))
        );
        assert_eq!(
            RefCoord::Relative(-3).adjusted_to_insertion(5, 3, 2, max),
            Some(RefCoord::Relative(-5))
        );
    }
}
