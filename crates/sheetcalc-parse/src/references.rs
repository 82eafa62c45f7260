use std::ops::Index;

use sheetcalc_common::{MAX_SIZE, Point, SizeType};

use crate::reference::{AreaReference, CellReference, DimensionReference, RefCoord, Reference};

/// The reference list a formula's `Reference` nodes index into.
///
/// Every `adjusted_*` operation returns `None` when no reference changed, so
/// callers can keep sharing the existing list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaReferences {
    refs: Vec<Reference>,
}

impl Index<usize> for FormulaReferences {
    type Output = Reference;

    fn index(&self, idx: usize) -> &Reference {
        &self.refs[idx]
    }
}

impl FormulaReferences {
    pub fn new(refs: Vec<Reference>) -> Self {
        Self { refs }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Reference> {
        self.refs.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.refs.iter()
    }

    pub(crate) fn push(&mut self, r: Reference) -> usize {
        self.refs.push(r);
        self.refs.len() - 1
    }

    fn adjust(&self, mut f: impl FnMut(&Reference) -> Option<Reference>) -> Option<Self> {
        let mut adjusted: Option<Vec<Reference>> = None;
        for (idx, r) in self.refs.iter().enumerate() {
            if let Some(new_ref) = f(r) {
                adjusted.get_or_insert_with(|| self.refs.clone())[idx] = new_ref;
            }
        }
        adjusted.map(Self::new)
    }

    /// The formula was copied to `dest`: relative references that now point
    /// outside the grid become illegal.
    pub fn adjusted_to_copy(&self, dest: Point) -> Option<Self> {
        self.adjust(|r| match r {
            Reference::Illegal => None,
            r if !r.is_dereferencable(dest) => Some(Reference::Illegal),
            _ => None,
        })
    }

    /// The formula moved from `from` to `to` and must keep addressing the
    /// same cells.
    pub fn adjusted_to_move(&self, from: Point, to: Point) -> Option<Self> {
        let dx = to.x as i64 - from.x as i64;
        let dy = to.y as i64 - from.y as i64;
        if dx == 0 && dy == 0 {
            return None;
        }
        self.adjust(|r| {
            let moved = match *r {
                Reference::Cell(c) => Reference::Cell(CellReference {
                    x: c.x.adjusted_to_move(dx),
                    y: c.y.adjusted_to_move(dy),
                }),
                Reference::Area(a) => Reference::Area(AreaReference {
                    x_start: a.x_start.adjusted_to_move(dx),
                    y_start: a.y_start.adjusted_to_move(dy),
                    x_end: a.x_end.adjusted_to_move(dx),
                    y_end: a.y_end.adjusted_to_move(dy),
                }),
                Reference::Columns(d) => Reference::Columns(DimensionReference {
                    start: d.start.adjusted_to_move(dx),
                    end: d.end.adjusted_to_move(dx),
                }),
                Reference::Rows(d) => Reference::Rows(DimensionReference {
                    start: d.start.adjusted_to_move(dy),
                    end: d.end.adjusted_to_move(dy),
                }),
                Reference::Illegal => return None,
            };
            (moved != *r).then_some(moved)
        })
    }

    /// Rows `y..y + count` were deleted; `at` is the formula's row before
    /// the deletion.
    pub fn adjusted_to_row_deletion(&self, at: SizeType, y: SizeType, count: SizeType) -> Option<Self> {
        self.adjust(|r| match *r {
            Reference::Cell(c) => {
                adjust_single_to_deletion(c.y, at, y, count).map(|res| match res {
                    Some(ny) => Reference::Cell(CellReference { x: c.x, y: ny }),
                    None => Reference::Illegal,
                })
            }
            Reference::Area(a) => adjust_span_to_deletion(a.y_start, a.y_end, at, y, count).map(
                |res| match res {
                    Some((s, e)) => Reference::Area(AreaReference {
                        y_start: s,
                        y_end: e,
                        ..a
                    }),
                    None => Reference::Illegal,
                },
            ),
            Reference::Rows(d) => {
                adjust_span_to_deletion(d.start, d.end, at, y, count).map(|res| match res {
                    Some((start, end)) => Reference::Rows(DimensionReference { start, end }),
                    None => Reference::Illegal,
                })
            }
            Reference::Columns(_) | Reference::Illegal => None,
        })
    }

    /// Columns `x..x + count` were deleted; `at` is the formula's column
    /// before the deletion.
    pub fn adjusted_to_column_deletion(
        &self,
        at: SizeType,
        x: SizeType,
        count: SizeType,
    ) -> Option<Self> {
        self.adjust(|r| match *r {
            Reference::Cell(c) => {
                adjust_single_to_deletion(c.x, at, x, count).map(|res| match res {
                    Some(nx) => Reference::Cell(CellReference { x: nx, y: c.y }),
                    None => Reference::Illegal,
                })
            }
            Reference::Area(a) => adjust_span_to_deletion(a.x_start, a.x_end, at, x, count).map(
                |res| match res {
                    Some((s, e)) => Reference::Area(AreaReference {
                        x_start: s,
                        x_end: e,
                        ..a
                    }),
                    None => Reference::Illegal,
                },
            ),
            Reference::Columns(d) => {
                adjust_span_to_deletion(d.start, d.end, at, x, count).map(|res| match res {
                    Some((start, end)) => Reference::Columns(DimensionReference { start, end }),
                    None => Reference::Illegal,
                })
            }
            Reference::Rows(_) | Reference::Illegal => None,
        })
    }

    /// `count` rows were inserted before row `y`.
    pub fn adjusted_to_row_insertion(
        &self,
        at: SizeType,
        y: SizeType,
        count: SizeType,
    ) -> Option<Self> {
        let max = MAX_SIZE.height;
        self.adjust(|r| match *r {
            Reference::Cell(c) => changed_or_illegal(
                c.y.adjusted_to_insertion(at, y, count, max),
                c.y,
                |ny| Reference::Cell(CellReference { x: c.x, y: ny }),
            ),
            Reference::Area(a) => changed_span_or_illegal(
                (a.y_start, a.y_end),
                at,
                y,
                count,
                max,
                |s, e| {
                    Reference::Area(AreaReference {
                        y_start: s,
                        y_end: e,
                        ..a
                    })
                },
            ),
            Reference::Rows(d) => changed_span_or_illegal(
                (d.start, d.end),
                at,
                y,
                count,
                max,
                |start, end| Reference::Rows(DimensionReference { start, end }),
            ),
            Reference::Columns(_) | Reference::Illegal => None,
        })
    }

    /// `count` columns were inserted before column `x`.
    pub fn adjusted_to_column_insertion(
        &self,
        at: SizeType,
        x: SizeType,
        count: SizeType,
    ) -> Option<Self> {
        let max = MAX_SIZE.width;
        self.adjust(|r| match *r {
            Reference::Cell(c) => changed_or_illegal(
                c.x.adjusted_to_insertion(at, x, count, max),
                c.x,
                |nx| Reference::Cell(CellReference { x: nx, y: c.y }),
            ),
            Reference::Area(a) => changed_span_or_illegal(
                (a.x_start, a.x_end),
                at,
                x,
                count,
                max,
                |s, e| {
                    Reference::Area(AreaReference {
                        x_start: s,
                        x_end: e,
                        ..a
                    })
                },
            ),
            Reference::Columns(d) => changed_span_or_illegal(
                (d.start, d.end),
                at,
                x,
                count,
                max,
                |start, end| Reference::Columns(DimensionReference { start, end }),
            ),
            Reference::Rows(_) | Reference::Illegal => None,
        })
    }
}

/// `None` = unchanged, `Some(None)` = deleted, `Some(Some(c))` = moved.
fn adjust_single_to_deletion(
    coord: RefCoord,
    at: SizeType,
    from: SizeType,
    count: SizeType,
) -> Option<Option<RefCoord>> {
    let pos = coord.position(at);
    let (lo, hi) = (from as i64, from as i64 + count as i64);
    if pos >= lo && pos < hi {
        return Some(None);
    }
    let adjusted = coord.adjusted_to_erasure(at, from, count);
    (adjusted != coord).then_some(Some(adjusted))
}

/// Same contract as [`adjust_single_to_deletion`] for a start/end pair. A
/// span with only one end inside the deleted band is truncated to the part
/// that survives.
fn adjust_span_to_deletion(
    start: RefCoord,
    end: RefCoord,
    at: SizeType,
    from: SizeType,
    count: SizeType,
) -> Option<Option<(RefCoord, RefCoord)>> {
    let (lo, hi) = (from as i64, from as i64 + count as i64);
    let start_pos = start.position(at);
    let end_pos = end.position(at);
    let in_band = |p: i64| p >= lo && p < hi;
    if in_band(start_pos) && in_band(end_pos) {
        return Some(None);
    }
    let mut new_start = start.adjusted_to_erasure(at, from, count);
    let mut new_end = end.adjusted_to_erasure(at, from, count);
    // The far end of a straddling span lands on the first surviving index
    // after the band; pull it back onto the last one before it.
    if in_band(end_pos) && end_pos > start_pos {
        new_end = new_end.shifted(-1);
    } else if in_band(start_pos) && start_pos > end_pos {
        new_start = new_start.shifted(-1);
    }
    (new_start != start || new_end != end).then_some(Some((new_start, new_end)))
}

fn changed_or_illegal(
    adjusted: Option<RefCoord>,
    original: RefCoord,
    build: impl FnOnce(RefCoord) -> Reference,
) -> Option<Reference> {
    match adjusted {
        None => Some(Reference::Illegal),
        Some(c) if c != original => Some(build(c)),
        Some(_) => None,
    }
}

fn changed_span_or_illegal(
    (start, end): (RefCoord, RefCoord),
    at: SizeType,
    before: SizeType,
    count: SizeType,
    max: SizeType,
    build: impl FnOnce(RefCoord, RefCoord) -> Reference,
) -> Option<Reference> {
    match (
        start.adjusted_to_insertion(at, before, count, max),
        end.adjusted_to_insertion(at, before, count, max),
    ) {
        (Some(s), Some(e)) if s != start || e != end => Some(build(s, e)),
        (Some(_), Some(_)) => None,
        _ => Some(Reference::Illegal),
    }
}
