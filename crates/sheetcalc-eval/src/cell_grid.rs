//! Sparse two-dimensional cell storage.
//!
//! The grid is a fixed three level tile tree (see [`GRID_LEVELS`]). Inner
//! tiles hold child tiles, the leaf level holds cell slots. Every tile knows
//! how many occupied slots live beneath it; a tile is allocated on the first
//! write that needs it and freed as soon as that count drops to zero.
//!
//! Mutation always goes through a [`CellOp`] (one slot at a time) or a
//! [`CellTransformer`] (a source slot paired with a destination slot). The
//! grid derives its occupancy bookkeeping from slot state before and after
//! each call, so operations never report counts themselves.

use sheetcalc_common::{GRID_LEVELS, MAX_SIZE, Point, Rect, Size, SizeType};

pub type Slot<C> = Option<Box<C>>;

const LEAF_LEVEL: usize = GRID_LEVELS.len() - 1;

/// Bits of `(x, y)` addressed below each level.
const COVERAGE: [(u32, u32); GRID_LEVELS.len()] = {
    let mut cov = [(0u32, 0u32); GRID_LEVELS.len()];
    let mut level = LEAF_LEVEL;
    while level > 0 {
        cov[level - 1] = (
            cov[level].0 + GRID_LEVELS[level].0,
            cov[level].1 + GRID_LEVELS[level].1,
        );
        level -= 1;
    }
    cov
};

/// An operation applied to a single, possibly empty, slot.
pub trait CellOp<C> {
    /// Whether the op has anything to do on an empty slot. When `false` the
    /// grid never allocates tiles for it and skips absent tiles wholesale.
    fn modifies_missing(&self) -> bool {
        true
    }

    fn apply(&mut self, slot: &mut Slot<C>);
}

impl<C, F> CellOp<C> for F
where
    F: FnMut(&mut Slot<C>),
{
    fn apply(&mut self, slot: &mut Slot<C>) {
        self(slot)
    }
}

/// A paired read-from/write-to operation used for copying and moving.
///
/// For every pair the grid calls `set_points`, then `get` on the source slot
/// and `set` on the destination slot. `get` is skipped for an absent source
/// tile unless `modifies_missing_source` says otherwise; `set` is skipped
/// for an absent destination tile unless `modifies_missing_destination`
/// says otherwise.
pub trait CellTransformer<C> {
    fn modifies_missing_source(&self) -> bool;
    fn modifies_missing_destination(&self) -> bool;

    fn set_points(&mut self, _src: Point, _dst: Point) {}

    fn get(&mut self, slot: &mut Slot<C>);
    fn set(&mut self, slot: &mut Slot<C>);
}

trait Visit<C> {
    fn modifies_missing(&self) -> bool;
    fn visit(&mut self, slot: &mut Slot<C>);
}

struct OpVisit<'o, O>(&'o mut O);

impl<C, O: CellOp<C>> Visit<C> for OpVisit<'_, O> {
    fn modifies_missing(&self) -> bool {
        self.0.modifies_missing()
    }

    fn visit(&mut self, slot: &mut Slot<C>) {
        self.0.apply(slot)
    }
}

struct Getter<'t, T>(&'t mut T);

impl<C, T: CellTransformer<C>> Visit<C> for Getter<'_, T> {
    fn modifies_missing(&self) -> bool {
        self.0.modifies_missing_source()
    }

    fn visit(&mut self, slot: &mut Slot<C>) {
        self.0.get(slot)
    }
}

struct Setter<'t, T>(&'t mut T);

impl<C, T: CellTransformer<C>> Visit<C> for Setter<'_, T> {
    fn modifies_missing(&self) -> bool {
        self.0.modifies_missing_destination()
    }

    fn visit(&mut self, slot: &mut Slot<C>) {
        self.0.set(slot)
    }
}

/// Mover used to clear the band left uncovered by a deletion. The mover must
/// leave its source slot empty after `get`.
struct Eraser<'t, T>(&'t mut T);

impl<C, T: CellTransformer<C>> Visit<C> for Eraser<'_, T> {
    fn modifies_missing(&self) -> bool {
        false
    }

    fn visit(&mut self, slot: &mut Slot<C>) {
        self.0.get(slot);
        debug_assert!(slot.is_none(), "mover must erase on get");
    }
}

enum TileData<C> {
    Inner(Box<[Option<Box<Tile<C>>>]>),
    Leaf(Box<[Slot<C>]>),
}

struct Tile<C> {
    /// Occupied slots beneath this tile, plus one per active pin.
    count: u64,
    data: TileData<C>,
}

fn occupancy<C>(slot: &Slot<C>) -> i64 {
    slot.is_some() as i64
}

fn low_mask(bits: u32) -> SizeType {
    ((1u64 << bits) - 1) as SizeType
}

/// Index into the tile at `level`, plus the coordinate left for the levels
/// below it.
fn split(level: usize, pt: Point) -> (usize, Point) {
    let (cov_x, cov_y) = COVERAGE[level];
    let width_bits = GRID_LEVELS[level].0;
    let tx = (pt.x >> cov_x) as usize;
    let ty = (pt.y >> cov_y) as usize;
    let rest = Point::new(pt.x & low_mask(cov_x), pt.y & low_mask(cov_y));
    ((ty << width_bits) + tx, rest)
}

fn pin<C>(tile: &mut Tile<C>) {
    tile.count += 1;
}

fn unpin<C>(slot: &mut Option<Box<Tile<C>>>) {
    if let Some(tile) = slot {
        tile.count -= 1;
        if tile.count == 0 {
            *slot = None;
        }
    }
}

impl<C> Tile<C> {
    fn new(level: usize) -> Box<Self> {
        let (w, h) = GRID_LEVELS[level];
        let len = 1usize << (w + h);
        let data = if level == LEAF_LEVEL {
            TileData::Leaf(std::iter::repeat_with(|| None).take(len).collect())
        } else {
            TileData::Inner(std::iter::repeat_with(|| None).take(len).collect())
        };
        Box::new(Tile { count: 0, data })
    }

    fn add_count(&mut self, delta: i64) {
        debug_assert!(delta >= 0 || delta.unsigned_abs() <= self.count);
        self.count = self.count.wrapping_add_signed(delta);
    }

    fn get(&self, level: usize, pt: Point) -> Option<&C> {
        let (idx, rest) = split(level, pt);
        match &self.data {
            TileData::Inner(children) => children[idx].as_deref()?.get(level + 1, rest),
            TileData::Leaf(slots) => slots[idx].as_deref(),
        }
    }

    fn child_for<'t>(
        children: &'t mut [Option<Box<Tile<C>>>],
        idx: usize,
        level: usize,
        allocate: bool,
    ) -> Option<&'t mut Option<Box<Tile<C>>>> {
        let child = &mut children[idx];
        if child.is_none() {
            if !allocate {
                return None;
            }
            *child = Some(Tile::new(level + 1));
        }
        Some(child)
    }

    fn act_on<V: Visit<C>>(&mut self, level: usize, pt: Point, v: &mut V) -> i64 {
        let (idx, rest) = split(level, pt);
        let delta = match &mut self.data {
            TileData::Inner(children) => {
                let allocate = v.modifies_missing();
                let Some(child) = Self::child_for(children, idx, level, allocate) else {
                    return 0;
                };
                Self::pinned(child, |tile| tile.act_on(level + 1, rest, v))
            }
            TileData::Leaf(slots) => {
                let slot = &mut slots[idx];
                let before = occupancy(slot);
                v.visit(slot);
                occupancy(slot) - before
            }
        };
        self.add_count(delta);
        delta
    }

    /// Apply `v` to the largest sub-rect of `pt + size` that stays within one
    /// leaf tile (or one absent tile, which is skipped). `size` is updated to
    /// the part consumed.
    fn act_on_chunk<V: Visit<C>>(&mut self, level: usize, pt: Point, size: &mut Size, v: &mut V) -> i64 {
        let (idx, rest) = split(level, pt);
        let delta = match &mut self.data {
            TileData::Inner(children) => {
                let allocate = v.modifies_missing();
                let Some(child) = Self::child_for(children, idx, level, allocate) else {
                    let (cov_x, cov_y) = COVERAGE[level];
                    size.width = size.width.min(((1u64 << cov_x) - rest.x as u64) as SizeType);
                    size.height = size.height.min(((1u64 << cov_y) - rest.y as u64) as SizeType);
                    return 0;
                };
                Self::pinned(child, |tile| tile.act_on_chunk(level + 1, rest, size, v))
            }
            TileData::Leaf(slots) => {
                let (w, h) = GRID_LEVELS[level];
                // At leaf level `pt` is already local to this tile.
                let consumed = Size::new(
                    size.width.min((1 << w) - pt.x),
                    size.height.min((1 << h) - pt.y),
                );
                let mut delta = 0;
                for y in pt.y..pt.y + consumed.height {
                    for x in pt.x..pt.x + consumed.width {
                        let slot = &mut slots[((y as usize) << w) + x as usize];
                        let before = occupancy(slot);
                        v.visit(slot);
                        delta += occupancy(slot) - before;
                    }
                }
                *size = consumed;
                delta
            }
        };
        self.add_count(delta);
        delta
    }

    fn transform<T: CellTransformer<C>>(&mut self, level: usize, from: Point, to: Point, tr: &mut T) -> i64 {
        let (from_idx, from_rest) = split(level, from);
        let (to_idx, to_rest) = split(level, to);
        let delta = match &mut self.data {
            TileData::Inner(children) if from_idx == to_idx => {
                let allocate = tr.modifies_missing_source() || tr.modifies_missing_destination();
                let Some(child) = Self::child_for(children, to_idx, level, allocate) else {
                    return 0;
                };
                Self::pinned(child, |tile| tile.transform(level + 1, from_rest, to_rest, tr))
            }
            TileData::Inner(children) => {
                let mut delta = 0;
                let allocate = tr.modifies_missing_source();
                if let Some(child) = Self::child_for(children, from_idx, level, allocate) {
                    let mut getter = Getter(&mut *tr);
                    delta += Self::pinned(child, |tile| tile.act_on(level + 1, from_rest, &mut getter));
                }
                // Asked only now: what the getter picked up decides it.
                let allocate = tr.modifies_missing_destination();
                if let Some(child) = Self::child_for(children, to_idx, level, allocate) {
                    let mut setter = Setter(&mut *tr);
                    delta += Self::pinned(child, |tile| tile.act_on(level + 1, to_rest, &mut setter));
                }
                delta
            }
            TileData::Leaf(slots) => {
                let src = &mut slots[from_idx];
                let before = occupancy(src);
                tr.get(src);
                let mut delta = occupancy(src) - before;
                let dst = &mut slots[to_idx];
                let before = occupancy(dst);
                tr.set(dst);
                delta += occupancy(dst) - before;
                delta
            }
        };
        self.add_count(delta);
        delta
    }

    /// Run `f` on the tile in `slot` with a pin held, then unpin, freeing
    /// the tile if it ended up empty.
    fn pinned(slot: &mut Option<Box<Tile<C>>>, f: impl FnOnce(&mut Tile<C>) -> i64) -> i64 {
        let Some(tile) = slot.as_deref_mut() else {
            return 0;
        };
        pin(tile);
        let delta = f(tile);
        unpin(slot);
        delta
    }
}

pub struct CellGrid<C> {
    top: Option<Box<Tile<C>>>,
    size: Size,
}

impl<C> Default for CellGrid<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for CellGrid<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellGrid")
            .field("size", &self.size)
            .field("non_null_count", &self.non_null_count())
            .finish()
    }
}

impl<C> CellGrid<C> {
    pub fn new() -> Self {
        Self {
            top: None,
            size: Size::default(),
        }
    }

    /// Logical extent. Grows with writes, shrinks only on row/column
    /// deletion.
    pub fn size(&self) -> Size {
        self.size
    }

    pub const fn max_size() -> Size {
        MAX_SIZE
    }

    pub fn non_null_count(&self) -> u64 {
        self.top.as_ref().map_or(0, |t| t.count)
    }

    pub fn clear(&mut self) {
        self.top = None;
        self.size = Size::default();
    }

    pub fn expand_width_to_at_least(&mut self, width: SizeType) {
        self.size.width = self.size.width.max(width);
    }

    pub fn expand_height_to_at_least(&mut self, height: SizeType) {
        self.size.height = self.size.height.max(height);
    }

    pub fn expand_to_at_least(&mut self, size: Size) {
        self.size.extend_to(size);
    }

    pub fn get(&self, pt: Point) -> Option<&C> {
        if pt.x >= MAX_SIZE.width || pt.y >= MAX_SIZE.height {
            return None;
        }
        self.top.as_ref()?.get(0, pt)
    }

    fn top_for(&mut self, allocate: bool) -> Option<&mut Tile<C>> {
        if self.top.is_none() {
            if !allocate {
                return None;
            }
            self.top = Some(Tile::new(0));
        }
        self.top.as_deref_mut()
    }

    fn release_empty_top(&mut self) {
        if self.top.as_ref().is_some_and(|t| t.count == 0) {
            self.top = None;
        }
    }

    /// Apply `op` to the slot at `pt`, growing `size()` to include it.
    pub fn modify_cell<O: CellOp<C>>(&mut self, pt: Point, op: &mut O) {
        debug_assert!(pt.x < MAX_SIZE.width && pt.y < MAX_SIZE.height);
        self.expand_to_at_least(pt.as_size() + Size::ONE);
        if let Some(top) = self.top_for(op.modifies_missing()) {
            top.act_on(0, pt, &mut OpVisit(op));
        }
        self.release_empty_top();
    }

    /// Apply `op` to every slot of `rect`, one tile-sized chunk at a time,
    /// growing `size()` to cover the rect.
    pub fn modify_cells<O: CellOp<C>>(&mut self, rect: Rect, op: &mut O) {
        self.visit_cells(rect, &mut OpVisit(op));
        self.expand_to_at_least(rect.end().as_size());
    }

    fn visit_cells<V: Visit<C>>(&mut self, rect: Rect, v: &mut V) {
        debug_assert!(rect.origin.x < MAX_SIZE.width && rect.origin.y < MAX_SIZE.height);
        debug_assert!(
            rect.size.width <= MAX_SIZE.width - rect.origin.x
                && rect.size.height <= MAX_SIZE.height - rect.origin.y
        );
        if rect.is_empty() {
            return;
        }
        let Some(top) = self.top_for(v.modifies_missing()) else {
            return;
        };
        let end = rect.end();
        let mut y = rect.origin.y;
        while y < end.y {
            let mut row_height = end.y - y;
            let mut x = rect.origin.x;
            while x < end.x {
                let mut consumed = Size::new(end.x - x, row_height);
                top.act_on_chunk(0, Point::new(x, y), &mut consumed, v);
                x += consumed.width;
                row_height = row_height.min(consumed.height);
            }
            y += row_height;
        }
        self.release_empty_top();
    }

    /// Transfer every slot of `src` to the rect of the same size at `dest`.
    ///
    /// Iteration starts from the corner farthest along the direction of
    /// travel, so overlapping rects never read an already overwritten slot.
    pub fn transform_cells<T: CellTransformer<C>>(&mut self, src: Rect, dest: Point, tr: &mut T) {
        debug_assert!(src.origin.x < MAX_SIZE.width && src.origin.y < MAX_SIZE.height);
        debug_assert!(
            dest.x <= MAX_SIZE.width - src.size.width
                && dest.y <= MAX_SIZE.height - src.size.height
        );
        if src.is_empty() {
            return;
        }
        self.expand_to_at_least(dest.as_size() + src.size);
        let Some(top) = self.top.as_deref_mut() else {
            return;
        };

        let (step_x, start_x) = if dest.x < src.origin.x {
            (1i64, 0)
        } else {
            (-1i64, src.size.width as i64 - 1)
        };
        let (step_y, start_y) = if dest.y < src.origin.y {
            (1i64, 0)
        } else {
            (-1i64, src.size.height as i64 - 1)
        };

        let mut dy = start_y;
        for _ in 0..src.size.height {
            let mut dx = start_x;
            for _ in 0..src.size.width {
                let from = Point::new(src.origin.x + dx as SizeType, src.origin.y + dy as SizeType);
                let to = Point::new(dest.x + dx as SizeType, dest.y + dy as SizeType);
                tr.set_points(from, to);
                top.transform(0, from, to, tr);
                dx += step_x;
            }
            dy += step_y;
        }
        self.release_empty_top();
    }

    /// Transfer the slot at `src` to every slot of `dest` (copy-to-range).
    pub fn transform_cell<T: CellTransformer<C>>(&mut self, src: Point, dest: Rect, tr: &mut T) {
        debug_assert!(src.x < MAX_SIZE.width && src.y < MAX_SIZE.height);
        debug_assert!(
            dest.size.width <= MAX_SIZE.width - dest.origin.x
                && dest.size.height <= MAX_SIZE.height - dest.origin.y
        );
        self.expand_to_at_least(dest.end().as_size());
        let allocate = tr.modifies_missing_source() || tr.modifies_missing_destination();
        let Some(top) = self.top_for(allocate) else {
            return;
        };
        for pt in dest.points() {
            tr.set_points(src, pt);
            top.act_on(0, src, &mut Getter(&mut *tr));
            top.act_on(0, pt, &mut Setter(&mut *tr));
        }
        self.release_empty_top();
    }

    /// Remove rows `y..y + count`. Rows below move up; the band they vacate
    /// at the bottom is erased through `mover.get`.
    pub fn delete_rows<T: CellTransformer<C>>(&mut self, y: SizeType, count: SizeType, mover: &mut T) {
        debug_assert!(count <= MAX_SIZE.height && y <= MAX_SIZE.height - count);
        if y >= self.size.height || count == 0 {
            return;
        }
        let existing = self.size.height - y;
        let (count, shifted) = if existing > count {
            let shifted = existing - count;
            let moved = Rect::from_xywh(0, y + count, self.size.width, shifted);
            self.transform_cells(moved, Point::new(0, y), mover);
            (count, shifted)
        } else {
            (existing, 0)
        };
        if shifted < count {
            let band = Rect::from_xywh(0, y + shifted, self.size.width, count - shifted);
            self.visit_cells(band, &mut Eraser(mover));
        }
        self.size.height -= count;
    }

    pub fn delete_columns<T: CellTransformer<C>>(&mut self, x: SizeType, count: SizeType, mover: &mut T) {
        debug_assert!(count <= MAX_SIZE.width && x <= MAX_SIZE.width - count);
        if x >= self.size.width || count == 0 {
            return;
        }
        let existing = self.size.width - x;
        let (count, shifted) = if existing > count {
            let shifted = existing - count;
            let moved = Rect::from_xywh(x + count, 0, shifted, self.size.height);
            self.transform_cells(moved, Point::new(x, 0), mover);
            (count, shifted)
        } else {
            (existing, 0)
        };
        if shifted < count {
            let band = Rect::from_xywh(x + shifted, 0, count - shifted, self.size.height);
            self.visit_cells(band, &mut Eraser(mover));
        }
        self.size.width -= count;
    }

    /// Open `count` empty rows before row `y`.
    pub fn insert_rows<T: CellTransformer<C>>(&mut self, y: SizeType, count: SizeType, mover: &mut T) {
        debug_assert!(count <= MAX_SIZE.height && self.size.height.max(y) <= MAX_SIZE.height - count);
        if y < self.size.height {
            let new_height = self.size.height + count;
            let moved = Rect::from_xywh(0, y, self.size.width, self.size.height - y);
            self.transform_cells(moved, Point::new(0, y + count), mover);
            self.size.height = new_height;
        } else {
            self.size.height = y + count;
        }
    }

    pub fn insert_columns<T: CellTransformer<C>>(&mut self, x: SizeType, count: SizeType, mover: &mut T) {
        debug_assert!(count <= MAX_SIZE.width && self.size.width.max(x) <= MAX_SIZE.width - count);
        if x < self.size.width {
            let new_width = self.size.width + count;
            let moved = Rect::from_xywh(x, 0, self.size.width - x, self.size.height);
            self.transform_cells(moved, Point::new(x + count, 0), mover);
            self.size.width = new_width;
        } else {
            self.size.width = x + count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn set(grid: &mut CellGrid<i32>, x: u32, y: u32, v: i32) {
        grid.modify_cell(Point::new(x, y), &mut |slot: &mut Slot<i32>| *slot = Some(Box::new(v)));
    }

    fn erase(grid: &mut CellGrid<i32>, x: u32, y: u32) {
        grid.modify_cell(Point::new(x, y), &mut |slot: &mut Slot<i32>| *slot = None);
    }

    fn at(grid: &CellGrid<i32>, x: u32, y: u32) -> Option<i32> {
        grid.get(Point::new(x, y)).copied()
    }

    /// Moves a cell, leaving the source empty.
    #[derive(Default)]
    struct Mover(Slot<i32>);

    impl CellTransformer<i32> for Mover {
        fn modifies_missing_source(&self) -> bool {
            false
        }
        fn modifies_missing_destination(&self) -> bool {
            self.0.is_some()
        }
        fn get(&mut self, slot: &mut Slot<i32>) {
            self.0 = slot.take();
        }
        fn set(&mut self, slot: &mut Slot<i32>) {
            *slot = self.0.take();
        }
    }

    /// Copies a cell, leaving the source untouched.
    #[derive(Default)]
    struct Copier(Slot<i32>);

    impl CellTransformer<i32> for Copier {
        fn modifies_missing_source(&self) -> bool {
            false
        }
        fn modifies_missing_destination(&self) -> bool {
            self.0.is_some()
        }
        fn get(&mut self, slot: &mut Slot<i32>) {
            self.0 = slot.clone();
        }
        fn set(&mut self, slot: &mut Slot<i32>) {
            *slot = self.0.take();
        }
    }

    #[test]
    fn test_empty_grid() {
        let grid: CellGrid<i32> = CellGrid::new();
        assert_eq!(grid.size(), Size::new(0, 0));
        assert_eq!(grid.non_null_count(), 0);
        assert_eq!(at(&grid, 10, 10), None);
        assert_eq!(CellGrid::<i32>::max_size(), MAX_SIZE);
    }

    #[test]
    fn test_write_read_erase_frees_tiles() {
        let mut grid = CellGrid::new();
        set(&mut grid, 3, 7, 42);
        set(&mut grid, 300, 70_000, 43);
        set(&mut grid, MAX_SIZE.width - 1, MAX_SIZE.height - 1, 44);
        assert_eq!(grid.size(), MAX_SIZE);
        assert_eq!(grid.non_null_count(), 3);
        assert_eq!(at(&grid, 3, 7), Some(42));
        assert_eq!(at(&grid, 300, 70_000), Some(43));
        assert_eq!(at(&grid, MAX_SIZE.width - 1, MAX_SIZE.height - 1), Some(44));

        erase(&mut grid, 3, 7);
        erase(&mut grid, 300, 70_000);
        erase(&mut grid, MAX_SIZE.width - 1, MAX_SIZE.height - 1);
        assert_eq!(grid.non_null_count(), 0);
        assert!(grid.top.is_none());
        // Size never shrinks on its own.
        assert_eq!(grid.size(), MAX_SIZE);
    }

    #[test]
    fn test_non_modifying_op_allocates_nothing() {
        struct CountingOp(u32);
        impl CellOp<i32> for CountingOp {
            fn modifies_missing(&self) -> bool {
                false
            }
            fn apply(&mut self, _slot: &mut Slot<i32>) {
                self.0 += 1;
            }
        }
        let mut grid: CellGrid<i32> = CellGrid::new();
        let mut counter = CountingOp(0);
        grid.modify_cells(Rect::from_xywh(0, 0, 1000, 5000), &mut counter);
        assert_eq!(counter.0, 0);
        assert!(grid.top.is_none());

        set(&mut grid, 10, 10, 1);
        grid.modify_cells(Rect::from_xywh(0, 0, 1000, 5000), &mut counter);
        // Only the one leaf tile that exists (256 x 2048 slots) is visited.
        assert_eq!(counter.0, 256 * 2048);
    }

    #[test]
    fn test_modify_cells_spans_tiles() {
        let mut grid = CellGrid::new();
        let rect = Rect::from_xywh(250, 2040, 20, 20);
        grid.modify_cells(rect, &mut |slot: &mut Slot<i32>| *slot = Some(Box::new(1)));
        assert_eq!(grid.non_null_count(), 400);
        assert_eq!(grid.size(), Size::new(270, 2060));
        assert_eq!(at(&grid, 255, 2047), Some(1));
        assert_eq!(at(&grid, 256, 2048), Some(1));
        assert_eq!(at(&grid, 270, 2048), None);
        grid.modify_cells(rect, &mut |slot: &mut Slot<i32>| *slot = None);
        assert_eq!(grid.non_null_count(), 0);
        assert!(grid.top.is_none());
    }

    #[test]
    fn test_modify_cells_inside_one_tile_hits_exact_slots() {
        let mut grid = CellGrid::new();
        set(&mut grid, 0, 0, 9);
        grid.modify_cells(Rect::from_xywh(3, 5, 2, 1), &mut |slot: &mut Slot<i32>| *slot = Some(Box::new(1)));
        assert_eq!(at(&grid, 3, 5), Some(1));
        assert_eq!(at(&grid, 4, 5), Some(1));
        assert_eq!(at(&grid, 0, 0), Some(9));
        assert_eq!(at(&grid, 1, 0), None);
        assert_eq!(at(&grid, 5, 5), None);
        assert_eq!(grid.non_null_count(), 3);

        grid.modify_cells(Rect::from_xywh(1, 0, 4, 6), &mut |slot: &mut Slot<i32>| *slot = None);
        assert_eq!(at(&grid, 0, 0), Some(9));
        assert_eq!(grid.non_null_count(), 1);
    }

    #[test]
    fn test_transform_cells_overlapping_move() {
        let mut grid = CellGrid::new();
        for i in 0..5 {
            set(&mut grid, i, 0, i as i32);
        }
        grid.transform_cells(Rect::from_xywh(0, 0, 5, 1), Point::new(2, 0), &mut Mover::default());
        assert_eq!(grid.non_null_count(), 5);
        assert_eq!(at(&grid, 0, 0), None);
        assert_eq!(at(&grid, 1, 0), None);
        for i in 0..5 {
            assert_eq!(at(&grid, i + 2, 0), Some(i as i32));
        }

        grid.transform_cells(Rect::from_xywh(2, 0, 5, 1), Point::new(1, 0), &mut Mover::default());
        for i in 0..5 {
            assert_eq!(at(&grid, i + 1, 0), Some(i as i32));
        }
        assert_eq!(at(&grid, 6, 0), None);
        assert_eq!(grid.size(), Size::new(7, 1));
    }

    #[test]
    fn test_transform_cells_across_tiles() {
        let mut grid = CellGrid::new();
        set(&mut grid, 1, 1, 7);
        set(&mut grid, 2, 1, 8);
        grid.transform_cells(Rect::from_xywh(1, 1, 2, 1), Point::new(5000, 100_000), &mut Copier::default());
        assert_eq!(grid.non_null_count(), 4);
        assert_eq!(at(&grid, 5000, 100_000), Some(7));
        assert_eq!(at(&grid, 5001, 100_000), Some(8));
        assert_eq!(at(&grid, 1, 1), Some(7));
    }

    #[test]
    fn test_transform_cell_fills_rect() {
        let mut grid = CellGrid::new();
        set(&mut grid, 0, 0, 9);
        grid.transform_cell(Point::new(0, 0), Rect::from_xywh(3, 3, 3, 2), &mut Copier::default());
        assert_eq!(grid.non_null_count(), 7);
        assert_eq!(grid.size(), Size::new(6, 5));
        assert_eq!(at(&grid, 5, 4), Some(9));

        // Copying an empty source clears the destination.
        grid.transform_cell(Point::new(10, 10), Rect::from_xywh(3, 3, 1, 1), &mut Copier::default());
        assert_eq!(at(&grid, 3, 3), None);
        assert_eq!(grid.non_null_count(), 6);
    }

    #[test]
    fn test_row_deletion_and_insertion() {
        let mut grid = CellGrid::new();
        for y in 0..6 {
            set(&mut grid, 0, y, y as i32);
        }
        grid.delete_rows(1, 2, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(1, 4));
        assert_eq!(grid.non_null_count(), 4);
        assert_eq!(
            (0..4).map(|y| at(&grid, 0, y)).collect::<Vec<_>>(),
            vec![Some(0), Some(3), Some(4), Some(5)]
        );

        grid.insert_rows(1, 3, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(1, 7));
        assert_eq!(at(&grid, 0, 0), Some(0));
        assert_eq!(at(&grid, 0, 1), None);
        assert_eq!(at(&grid, 0, 4), Some(3));
        assert_eq!(at(&grid, 0, 6), Some(5));

        // Deleting past the end only trims what exists.
        grid.delete_rows(5, 100, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(1, 5));
        assert_eq!(grid.non_null_count(), 2);
    }

    #[test]
    fn test_column_operations_on_empty_grid() {
        let mut grid: CellGrid<i32> = CellGrid::new();
        grid.delete_columns(2, 1, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(0, 0));
        grid.insert_columns(0, 5, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(5, 0));
        grid.insert_columns(16, 32, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(48, 0));
        grid.insert_rows(0, 17, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(48, 17));
        assert_eq!(grid.non_null_count(), 0);
    }

    #[test]
    fn test_column_deletion_moves_far_cells() {
        let mut grid = CellGrid::new();
        set(&mut grid, 12_000, 0, 25);
        set(&mut grid, 12_000, 1, 4);
        grid.delete_columns(0, 12_000, &mut Mover::default());
        assert_eq!(grid.size(), Size::new(1, 2));
        assert_eq!(grid.non_null_count(), 2);
        assert_eq!(at(&grid, 0, 0), Some(25));
        assert_eq!(at(&grid, 0, 1), Some(4));
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Set(u32, u32, i32),
        Erase(u32, u32),
        Fill(u32, u32, u32, u32, i32),
        Clear(u32, u32, u32, u32),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        // Coordinates straddle the leaf tile boundary (256 x 2048).
        let x = 240u32..280;
        let y = 2030u32..2070;
        prop_oneof![
            (x.clone(), y.clone(), any::<i32>()).prop_map(|(x, y, v)| Edit::Set(x, y, v)),
            (x.clone(), y.clone()).prop_map(|(x, y)| Edit::Erase(x, y)),
            (x.clone(), y.clone(), 0u32..12, 0u32..12, any::<i32>())
                .prop_map(|(x, y, w, h, v)| Edit::Fill(x, y, w, h, v)),
            (x, y, 0u32..30, 0u32..30).prop_map(|(x, y, w, h)| Edit::Clear(x, y, w, h)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_prop_non_null_count_matches_reachable_cells(edits in prop::collection::vec(edit(), 1..40)) {
            let mut grid = CellGrid::new();
            let mut model: HashMap<(u32, u32), i32> = HashMap::new();
            for e in edits {
                match e {
                    Edit::Set(x, y, v) => {
                        set(&mut grid, x, y, v);
                        model.insert((x, y), v);
                    }
                    Edit::Erase(x, y) => {
                        erase(&mut grid, x, y);
                        model.remove(&(x, y));
                    }
                    Edit::Fill(x, y, w, h, v) => {
                        let rect = Rect::from_xywh(x, y, w, h);
                        grid.modify_cells(rect, &mut |slot: &mut Slot<i32>| *slot = Some(Box::new(v)));
                        for pt in rect.points() {
                            model.insert((pt.x, pt.y), v);
                        }
                    }
                    Edit::Clear(x, y, w, h) => {
                        let rect = Rect::from_xywh(x, y, w, h);
                        grid.modify_cells(rect, &mut |slot: &mut Slot<i32>| *slot = None);
                        for pt in rect.points() {
                            model.remove(&(pt.x, pt.y));
                        }
                    }
                }
                prop_assert_eq!(grid.non_null_count(), model.len() as u64);
            }
            for x in 230..300 {
                for y in 2020..2090 {
                    prop_assert_eq!(at(&grid, x, y), model.get(&(x, y)).copied());
                }
            }
        }

        #[test]
        fn test_prop_move_matches_independent_moves(
            cells in prop::collection::hash_map((0u32..12, 0u32..12), any::<i32>(), 0..40),
            src in (0u32..8, 0u32..8, 1u32..6, 1u32..6),
            dest in (0u32..10, 0u32..10),
        ) {
            let mut grid = CellGrid::new();
            for (&(x, y), &v) in &cells {
                set(&mut grid, x, y, v);
            }
            let rect = Rect::from_xywh(src.0, src.1, src.2, src.3);
            let dest = Point::new(dest.0, dest.1);

            let mut expected = cells.clone();
            for pt in rect.points() {
                expected.remove(&(pt.x, pt.y));
            }
            for pt in rect.points() {
                let to = (pt.x - rect.origin.x + dest.x, pt.y - rect.origin.y + dest.y);
                match cells.get(&(pt.x, pt.y)) {
                    Some(&v) => expected.insert(to, v),
                    None => expected.remove(&to),
                };
            }

            grid.transform_cells(rect, dest, &mut Mover::default());
            prop_assert_eq!(grid.non_null_count(), expected.len() as u64);
            for x in 0..20 {
                for y in 0..20 {
                    prop_assert_eq!(at(&grid, x, y), expected.get(&(x, y)).copied());
                }
            }
        }
    }
}
