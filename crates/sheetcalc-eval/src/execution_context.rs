//! Registers and grid access shared by every node while one formula
//! executes.
//!
//! A node hands its result to its parent through `returned_value` (a
//! [`ScalarGenerator`], possibly standing for a whole range) and
//! `returned_extent`. Parents pull individual scalars out of a generator at
//! the current broadcast `offset`; reading a cell whose formula is not yet
//! up to date reports a dependency instead of a value.

use std::rc::Rc;

use bitflags::bitflags;
use sheetcalc_common::{ArrayRef, CellError, MAX_SIZE, Point, Rect, Scalar, Size};
use sheetcalc_parse::FormulaReferences;

use crate::cell_grid::CellGrid;
use crate::formula_cells::{Cell, FormulaCells, FormulaId};

/// A value, or a recipe for producing one value per broadcast offset.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarGenerator {
    Scalar(Scalar),
    Array(ArrayRef),
    /// A single cell; always yields that cell regardless of offset.
    Point(Point),
    Rect(Rect),
}

impl Default for ScalarGenerator {
    fn default() -> Self {
        ScalarGenerator::Scalar(Scalar::Blank)
    }
}

impl From<Scalar> for ScalarGenerator {
    fn from(value: Scalar) -> Self {
        ScalarGenerator::Scalar(value)
    }
}

impl From<CellError> for ScalarGenerator {
    fn from(error: CellError) -> Self {
        ScalarGenerator::Scalar(Scalar::Error(error))
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct AggregateFlags: u8 {
        /// Some visited cell waits for recalculation; the fold is incomplete.
        const HAS_DEPENDENCIES = 1 << 0;
        /// The fold callback asked to stop.
        const ABORTED = 1 << 1;
    }
}

/// What a single evaluation borrows from its sheet.
pub struct Env<'a> {
    pub grid: &'a CellGrid<Cell>,
    pub formulas: &'a FormulaCells,
    /// Formulas discovered to be stale, in discovery order.
    pub dependencies: &'a mut Vec<FormulaId>,
}

enum CellRead<'a> {
    /// `None` is an empty slot.
    Value(Option<&'a Scalar>),
    Pending,
    Circular,
}

#[derive(Debug)]
pub struct ExecutionContext {
    pub suppress_evaluation: bool,
    pub circular_dependency: bool,
    pub offset: Point,
    pub returned_value: ScalarGenerator,
    pub returned_extent: Size,
    references: Rc<FormulaReferences>,
    at: Point,
    generation: bool,
}

impl ExecutionContext {
    pub fn new(references: Rc<FormulaReferences>, at: Point, generation: bool) -> Self {
        Self {
            suppress_evaluation: false,
            circular_dependency: false,
            offset: Point::default(),
            returned_value: ScalarGenerator::default(),
            returned_extent: Size::ONE,
            references,
            at,
            generation,
        }
    }

    pub fn at(&self) -> Point {
        self.at
    }

    pub fn references(&self) -> &FormulaReferences {
        &self.references
    }

    /// Step `offset` row-major through `extent`. Returns `false` (leaving the
    /// offset alone) once the last position is reached.
    pub fn increment_offset(&mut self, extent: Size) -> bool {
        debug_assert!(self.offset.x < extent.width.max(1) && self.offset.y < extent.height.max(1));
        if self.offset.x + 1 < extent.width {
            self.offset.x += 1;
            return true;
        }
        if self.offset.y + 1 < extent.height {
            self.offset.y += 1;
            self.offset.x = 0;
            return true;
        }
        false
    }

    /// The stale formula `cell` depends on, if any.
    fn recalc_dependency(&self, env: &Env<'_>, cell: &Cell) -> Option<(FormulaId, bool)> {
        let id = cell.owner()?;
        let formula = env.formulas.get(id)?;
        formula
            .is_pending(self.generation)
            .then(|| (id, formula.is_circular_dependency()))
    }

    fn read_cell<'a>(&mut self, env: &mut Env<'a>, pt: Point) -> CellRead<'a> {
        let grid = env.grid;
        let formulas = env.formulas;
        let Some(cell) = grid.get(pt) else {
            return CellRead::Value(None);
        };
        if let Some((id, circular)) = self.recalc_dependency(env, cell) {
            if circular {
                self.circular_dependency = true;
                return CellRead::Circular;
            }
            env.dependencies.push(id);
            return CellRead::Pending;
        }
        CellRead::Value(cell_value(formulas, cell))
    }

    /// Read the cell at `pt`. A stale formula there is either reported to
    /// the dependency sink, or, when it is mid-calculation or blocked, flags
    /// a circular dependency; `on_dependency` receives which one happened.
    pub fn evaluate_cell<R>(
        &mut self,
        env: &mut Env<'_>,
        pt: Point,
        on_value: impl FnOnce(&Scalar) -> R,
        on_dependency: impl FnOnce(bool) -> R,
    ) -> R {
        match self.read_cell(env, pt) {
            CellRead::Value(Some(value)) => on_value(value),
            CellRead::Value(None) => on_value(&Scalar::Blank),
            CellRead::Pending => on_dependency(false),
            CellRead::Circular => on_dependency(true),
        }
    }

    /// Cell of `rect` addressed by `off`. Axes of size 1 broadcast.
    fn generate_point(rect: Rect, mut off: Point) -> Result<Point, CellError> {
        if rect.size.width == 1 {
            if rect.size.height == 1 {
                return Ok(rect.origin);
            }
            off.x = 0;
        } else if rect.size.height == 1 {
            off.y = 0;
        }
        if off.x >= rect.size.width || off.y >= rect.size.height {
            return Err(CellError::InvalidArgs);
        }
        if off.x >= MAX_SIZE.width - rect.origin.x || off.y >= MAX_SIZE.height - rect.origin.y {
            return Err(CellError::InvalidReference);
        }
        Ok(Point::new(rect.origin.x + off.x, rect.origin.y + off.y))
    }

    fn array_element(array: &ArrayRef, mut off: Point) -> Scalar {
        let size = array.size();
        if size.width == 1 {
            off.x = 0;
        }
        if size.height == 1 {
            off.y = 0;
        }
        array
            .get(off)
            .cloned()
            .unwrap_or(Scalar::Error(CellError::InvalidArgs))
    }

    /// Resolve `generator` at the current offset. Returns the scalar and
    /// whether the generator stands for a single value, or `None` when a
    /// referenced cell is not available yet.
    pub fn generate_scalar(
        &mut self,
        env: &mut Env<'_>,
        generator: &ScalarGenerator,
    ) -> Option<(Scalar, bool)> {
        let off = self.offset;
        match generator {
            ScalarGenerator::Scalar(value) => Some((value.clone(), true)),
            ScalarGenerator::Array(array) => Some((Self::array_element(array, off), false)),
            ScalarGenerator::Point(pt) => {
                self.evaluate_cell(env, *pt, |v| Some((v.clone(), true)), |_| None)
            }
            ScalarGenerator::Rect(rect) => match Self::generate_point(*rect, off) {
                Ok(pt) => self.evaluate_cell(env, pt, |v| Some((v.clone(), false)), |_| None),
                Err(error) => Some((Scalar::Error(error), false)),
            },
        }
    }

    /// [`generate_scalar`](Self::generate_scalar) applied to
    /// `returned_value`.
    pub fn generate_returned(&mut self, env: &mut Env<'_>) -> Option<(Scalar, bool)> {
        let generator = std::mem::take(&mut self.returned_value);
        let result = self.generate_scalar(env, &generator);
        self.returned_value = generator;
        result
    }

    /// Collapse a range generator whose shape differs from `size` (the
    /// shape the caller will broadcast over) to the element at the current
    /// offset.
    pub fn singlify_if_needed(&self, generator: &mut ScalarGenerator, size: Size) {
        match generator {
            ScalarGenerator::Scalar(_) | ScalarGenerator::Point(_) => {}
            ScalarGenerator::Array(array) => {
                if array.size() != size {
                    *generator = ScalarGenerator::Scalar(Self::array_element(array, self.offset));
                }
            }
            ScalarGenerator::Rect(rect) => {
                if rect.size != size {
                    *generator = match Self::generate_point(*rect, self.offset) {
                        Ok(pt) => ScalarGenerator::Point(pt),
                        Err(error) => error.into(),
                    };
                }
            }
        }
    }

    fn clamp_to_grid(rect: Rect) -> Size {
        Size::new(
            rect.size.width.min(MAX_SIZE.width - rect.origin.x),
            rect.size.height.min(MAX_SIZE.height - rect.origin.y),
        )
    }

    /// Fold every cell of `rect` through `op` (which returns `false` to
    /// stop). Stale cells are all reported before returning
    /// `HAS_DEPENDENCIES`; a circular one stops the walk immediately.
    pub fn aggregate_rect(
        &mut self,
        env: &mut Env<'_>,
        rect: Rect,
        mut op: impl FnMut(&Scalar) -> bool,
    ) -> AggregateFlags {
        let size = Self::clamp_to_grid(rect);
        let mut flags = AggregateFlags::empty();
        for y in rect.origin.y..rect.origin.y + size.height {
            for x in rect.origin.x..rect.origin.x + size.width {
                match self.read_cell(env, Point::new(x, y)) {
                    CellRead::Value(value) => {
                        if flags.is_empty() && !op(value.unwrap_or(&Scalar::Blank)) {
                            return AggregateFlags::ABORTED;
                        }
                    }
                    CellRead::Pending => flags |= AggregateFlags::HAS_DEPENDENCIES,
                    CellRead::Circular => return AggregateFlags::HAS_DEPENDENCIES,
                }
            }
        }
        flags
    }

    /// Walk `main` and `second` in lock step; cells of `main` outside
    /// `second` pair with `Blank`.
    pub fn aggregate_rects(
        &mut self,
        env: &mut Env<'_>,
        main: Rect,
        second: Rect,
        mut op: impl FnMut(&Scalar, &Scalar) -> bool,
    ) -> AggregateFlags {
        let main_size = Self::clamp_to_grid(main);
        let second_size = Self::clamp_to_grid(second);
        let mut has_dependencies = false;
        for dy in 0..main_size.height {
            for dx in 0..main_size.width {
                let first = match self.read_cell(env, main.origin + Size::new(dx, dy)) {
                    CellRead::Value(value) => value,
                    CellRead::Pending => {
                        has_dependencies = true;
                        None
                    }
                    CellRead::Circular => return AggregateFlags::HAS_DEPENDENCIES,
                };
                let paired = dx < second_size.width && dy < second_size.height;
                let other = if paired {
                    match self.read_cell(env, second.origin + Size::new(dx, dy)) {
                        CellRead::Value(value) => value,
                        CellRead::Pending => {
                            has_dependencies = true;
                            None
                        }
                        CellRead::Circular => return AggregateFlags::HAS_DEPENDENCIES,
                    }
                } else {
                    None
                };
                if !has_dependencies
                    && !op(first.unwrap_or(&Scalar::Blank), other.unwrap_or(&Scalar::Blank))
                {
                    return AggregateFlags::ABORTED;
                }
            }
        }
        if has_dependencies {
            AggregateFlags::HAS_DEPENDENCIES
        } else {
            AggregateFlags::empty()
        }
    }
}

/// Current value of a grid cell.
pub fn cell_value<'a>(formulas: &'a FormulaCells, cell: &'a Cell) -> Option<&'a Scalar> {
    match cell {
        Cell::Value(value) => Some(value),
        Cell::Formula(id) => formulas.get(*id).map(|f| &f.value),
        Cell::Extension { value, .. } => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_grid::Slot;
    use sheetcalc_common::Array;
    use sheetcalc_parse::Formula;

    use crate::formula_cells::FormulaCell;

    fn put(grid: &mut CellGrid<Cell>, x: u32, y: u32, cell: Cell) {
        grid.modify_cell(Point::new(x, y), &mut |slot: &mut Slot<Cell>| {
            *slot = Some(Box::new(cell.clone()))
        });
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(Rc::new(FormulaReferences::default()), Point::new(9, 9), true)
    }

    #[test]
    fn test_increment_offset_row_major() {
        let mut ctx = context();
        let extent = Size::new(2, 2);
        let mut seen = vec![ctx.offset];
        while ctx.increment_offset(extent) {
            seen.push(ctx.offset);
        }
        assert_eq!(
            seen,
            vec![Point::new(0, 0), Point::new(1, 0), Point::new(0, 1), Point::new(1, 1)]
        );
        assert_eq!(ctx.offset, Point::new(1, 1));
    }

    #[test]
    fn test_generate_scalar_broadcasts_size_one_axes() {
        let grid = CellGrid::new();
        let formulas = FormulaCells::new();
        let mut deps = Vec::new();
        let mut env = Env {
            grid: &grid,
            formulas: &formulas,
            dependencies: &mut deps,
        };
        let mut ctx = context();
        let row = ScalarGenerator::Array(Rc::new(Array::new(
            Size::new(3, 1),
            vec![1.0.into(), 2.0.into(), 3.0.into()],
        )));
        ctx.offset = Point::new(2, 5);
        assert_eq!(ctx.generate_scalar(&mut env, &row), Some((Scalar::Number(3.0), false)));
        ctx.offset = Point::new(3, 0);
        assert_eq!(
            ctx.generate_scalar(&mut env, &row),
            Some((Scalar::Error(CellError::InvalidArgs), false))
        );

        let rect = ScalarGenerator::Rect(Rect::from_xywh(0, 0, 2, 2));
        ctx.offset = Point::new(2, 0);
        assert_eq!(
            ctx.generate_scalar(&mut env, &rect),
            Some((Scalar::Error(CellError::InvalidArgs), false))
        );
        let edge = ScalarGenerator::Rect(Rect::from_xywh(MAX_SIZE.width - 1, 0, 3, 1));
        ctx.offset = Point::new(1, 0);
        assert_eq!(
            ctx.generate_scalar(&mut env, &edge),
            Some((Scalar::Error(CellError::InvalidReference), false))
        );
    }

    #[test]
    fn test_stale_formula_is_reported_as_dependency() {
        let mut grid = CellGrid::new();
        let mut formulas = FormulaCells::new();
        let (formula, refs) = Formula::parse("1", Point::new(0, 0));
        let id = formulas.push_back(FormulaCell::new(formula, refs, Point::new(0, 0), false));
        put(&mut grid, 0, 0, Cell::Formula(id));
        put(&mut grid, 1, 0, Cell::Value(Scalar::Number(4.0)));

        let mut deps = Vec::new();
        let mut env = Env {
            grid: &grid,
            formulas: &formulas,
            dependencies: &mut deps,
        };
        let mut ctx = context();
        let r = ctx.evaluate_cell(&mut env, Point::new(0, 0), |_| "value", |c| if c { "circular" } else { "pending" });
        assert_eq!(r, "pending");
        assert!(!ctx.circular_dependency);

        let mut sum = 0.0;
        let flags = ctx.aggregate_rect(&mut env, Rect::from_xywh(0, 0, 2, 1), |v| {
            sum += v.as_number().unwrap_or(0.0);
            true
        });
        assert_eq!(flags, AggregateFlags::HAS_DEPENDENCIES);
        assert_eq!(sum, 0.0);
        assert_eq!(deps, vec![id, id]);
    }

    #[test]
    fn test_in_progress_formula_is_circular() {
        let mut grid = CellGrid::new();
        let mut formulas = FormulaCells::new();
        let (formula, refs) = Formula::parse("1", Point::new(0, 0));
        let id = formulas.push_back(FormulaCell::new(formula, refs, Point::new(0, 0), false));
        if let Some(f) = formulas.get_mut(id) {
            f.set_being_calculated(true);
        }
        put(&mut grid, 0, 0, Cell::Formula(id));

        let mut deps = Vec::new();
        let mut env = Env {
            grid: &grid,
            formulas: &formulas,
            dependencies: &mut deps,
        };
        let mut ctx = context();
        let flags = ctx.aggregate_rect(&mut env, Rect::from_xywh(0, 0, 1, 1), |_| true);
        assert_eq!(flags, AggregateFlags::HAS_DEPENDENCIES);
        assert!(ctx.circular_dependency);
        assert!(deps.is_empty());
    }

    #[test]
    fn test_aggregate_rects_pairs_missing_with_blank() {
        let mut grid = CellGrid::new();
        for y in 0..2 {
            put(&mut grid, 0, y, Cell::Value(Scalar::Number(y as f64 + 1.0)));
            put(&mut grid, 1, y, Cell::Value(Scalar::Number(10.0)));
        }
        let formulas = FormulaCells::new();
        let mut deps = Vec::new();
        let mut env = Env {
            grid: &grid,
            formulas: &formulas,
            dependencies: &mut deps,
        };
        let mut ctx = context();
        let mut pairs = Vec::new();
        let flags = ctx.aggregate_rects(
            &mut env,
            Rect::from_xywh(0, 0, 1, 2),
            Rect::from_xywh(1, 0, 1, 1),
            |a, b| {
                pairs.push((a.clone(), b.clone()));
                true
            },
        );
        assert!(flags.is_empty());
        assert_eq!(
            pairs,
            vec![
                (Scalar::Number(1.0), Scalar::Number(10.0)),
                (Scalar::Number(2.0), Scalar::Blank),
            ]
        );
    }

    #[test]
    fn test_singlify_keeps_matching_shapes() {
        let mut ctx = context();
        ctx.offset = Point::new(0, 1);
        let mut same = ScalarGenerator::Rect(Rect::from_xywh(0, 0, 1, 2));
        ctx.singlify_if_needed(&mut same, Size::new(1, 2));
        assert_eq!(same, ScalarGenerator::Rect(Rect::from_xywh(0, 0, 1, 2)));

        let mut other = ScalarGenerator::Rect(Rect::from_xywh(4, 4, 1, 2));
        ctx.singlify_if_needed(&mut other, Size::new(3, 2));
        assert_eq!(other, ScalarGenerator::Point(Point::new(4, 5)));
    }
}
