//! A single sheet: cell storage, formula bookkeeping and recalculation.
//!
//! Every edit goes through a [`CellOp`] or [`CellTransformer`] adapter
//! that keeps the formula arena in step with the grid. Adapters cannot
//! touch the grid while it is calling them, so spill areas orphaned by an
//! edit are collected and cleared right after the grid operation returns.
//!
//! Recalculation evaluates every formula once per pass in list order. A
//! formula that reads a stale one pauses; the dependency is moved in front
//! of it and evaluated first. A formula reading one that is still in
//! progress is circular and becomes `#REF!`.

use std::rc::Rc;

use bumpalo::Bump;
use sheetcalc_common::{CellError, MAX_SIZE, Point, Rect, Scalar, Size, SizeType};
use sheetcalc_parse::{Formula, FormulaReferences};
use thiserror::Error;

use crate::cell_grid::{CellGrid, CellOp, CellTransformer, Slot};
use crate::evaluator::FormulaEvaluator;
use crate::execution_context::{Env, cell_value};
use crate::formula_cells::{Cell, FormulaCell, FormulaCells, FormulaId};
use crate::interval_map::{IntervalMap, Intervals};

/// Input validation failures of the [`Sheet`] API. Nothing is modified
/// when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    #[error("{what} {value} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        limit: u64,
    },
    #[error("resume_recalc without matching suspend_recalc")]
    RecalcNotSuspended,
}

/// Configuration for a [`Sheet`].
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Recalculate after every edit unless recalculation is suspended.
    pub auto_recalc: bool,
    pub default_row_height: f32,
    pub default_column_width: f32,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            auto_recalc: true,
            default_row_height: 15.0,
            default_column_width: 64.0,
        }
    }
}

/// Per-row or per-column metadata. `length: None` means the default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LengthInfo {
    pub length: Option<f32>,
    pub hidden: bool,
}

static DEFAULT_LENGTH: LengthInfo = LengthInfo {
    length: None,
    hidden: false,
};

type LengthMap = IntervalMap<SizeType, LengthInfo>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaInfo {
    /// Canonical text without the leading `=`.
    pub text: String,
    pub extent: Size,
}

fn out_of_range(what: &'static str, value: SizeType, limit: SizeType) -> SheetError {
    SheetError::OutOfRange {
        what,
        value: value as u64,
        limit: limit as u64,
    }
}

/// `start..start + count` must lie within `0..max`.
fn check_band(what: &'static str, start: SizeType, count: SizeType, max: SizeType) -> Result<(), SheetError> {
    if start >= max {
        return Err(out_of_range(what, start, max));
    }
    if count > max - start {
        return Err(out_of_range("count", count, max - start));
    }
    Ok(())
}

fn check_point(pt: Point) -> Result<(), SheetError> {
    if pt.x >= MAX_SIZE.width {
        return Err(out_of_range("column", pt.x, MAX_SIZE.width));
    }
    if pt.y >= MAX_SIZE.height {
        return Err(out_of_range("row", pt.y, MAX_SIZE.height));
    }
    Ok(())
}

fn check_rect(rect: Rect) -> Result<(), SheetError> {
    check_band("column", rect.origin.x, rect.size.width, MAX_SIZE.width)?;
    check_band("row", rect.origin.y, rect.size.height, MAX_SIZE.height)
}

/// Inserting `count` before `at` must not push existing content past `max`.
fn check_insertion(
    what: &'static str,
    at: SizeType,
    count: SizeType,
    current: SizeType,
    max: SizeType,
) -> Result<(), SheetError> {
    check_band(what, at, count, max)?;
    let used = current.max(at);
    if count > max - used {
        return Err(out_of_range("count", count, max - used));
    }
    Ok(())
}

/* ─────────────────────────── spill bookkeeping ─────────────────────────── */

struct ClearExtension {
    parent: FormulaId,
}

impl CellOp<Cell> for ClearExtension {
    fn modifies_missing(&self) -> bool {
        false
    }

    fn apply(&mut self, slot: &mut Slot<Cell>) {
        if matches!(slot.as_deref(), Some(Cell::Extension { parent, .. }) if *parent == self.parent) {
            *slot = None;
        }
    }
}

struct ReserveExtension {
    parent: FormulaId,
}

impl CellOp<Cell> for ReserveExtension {
    fn apply(&mut self, slot: &mut Slot<Cell>) {
        debug_assert!(slot.as_deref().is_none_or(Cell::is_blank_value));
        *slot = Some(Box::new(Cell::Extension {
            parent: self.parent,
            value: Scalar::Blank,
        }));
    }
}

struct WriteExtension(Scalar);

impl CellOp<Cell> for WriteExtension {
    fn modifies_missing(&self) -> bool {
        false
    }

    fn apply(&mut self, slot: &mut Slot<Cell>) {
        if let Some(Cell::Extension { value, .. }) = slot.as_deref_mut() {
            *value = std::mem::take(&mut self.0);
        }
    }
}

/// Remove the extension cells `parent` owns in the area it spilled to,
/// leaving the formula cell itself alone.
fn clear_extensions(grid: &mut CellGrid<Cell>, parent: FormulaId, at: Point, extent: Size) {
    let width = extent.width.min(MAX_SIZE.width - at.x);
    let height = extent.height.min(MAX_SIZE.height - at.y);
    let bounds = Rect::new(Point::default(), grid.size());
    let mut op = ClearExtension { parent };
    let right = Rect::from_xywh(at.x + 1, at.y, width.saturating_sub(1), 1);
    let below = Rect::from_xywh(at.x, at.y + 1, width, height.saturating_sub(1));
    for area in [right, below] {
        if let Some(area) = area.intersection(&bounds) {
            grid.modify_cells(area, &mut op);
        }
    }
}

/// Spill areas left without an owner by the grid operation in progress.
#[derive(Debug, Default)]
struct Orphans(Vec<(FormulaId, Point, Size)>);

impl Orphans {
    /// Collapse `id` to a single cell; its extensions go in [`clear`](Self::clear).
    fn collapse(&mut self, formulas: &mut FormulaCells, id: FormulaId) {
        if let Some(cell) = formulas.get_mut(id)
            && cell.extent != Size::ONE
        {
            self.0.push((id, cell.location, cell.extent));
            cell.extent = Size::ONE;
        }
    }

    /// Drop `id` from the arena altogether.
    fn release(&mut self, formulas: &mut FormulaCells, id: FormulaId) {
        if let Some(cell) = formulas.remove(id)
            && cell.extent != Size::ONE
        {
            self.0.push((id, cell.location, cell.extent));
        }
    }

    fn clear(self, grid: &mut CellGrid<Cell>) {
        for (parent, at, extent) in self.0 {
            clear_extensions(grid, parent, at, extent);
        }
    }
}

/* ─────────────────────────── edit adapters ─────────────────────────── */

struct SetBlankCell<'s> {
    formulas: &'s mut FormulaCells,
    orphans: &'s mut Orphans,
}

impl CellOp<Cell> for SetBlankCell<'_> {
    fn modifies_missing(&self) -> bool {
        false
    }

    fn apply(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref() {
            // An extension is part of its formula's result, not an input.
            None | Some(Cell::Extension { .. }) => return,
            Some(Cell::Formula(id)) => self.orphans.release(self.formulas, *id),
            Some(Cell::Value(_)) => {}
        }
        *slot = None;
    }
}

struct SetValueCell<'s> {
    formulas: &'s mut FormulaCells,
    orphans: &'s mut Orphans,
    value: Scalar,
}

impl CellOp<Cell> for SetValueCell<'_> {
    fn apply(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref_mut() {
            Some(Cell::Value(value)) => {
                *value = self.value.clone();
                return;
            }
            Some(Cell::Formula(id)) => self.orphans.release(self.formulas, *id),
            Some(Cell::Extension { parent, .. }) => self.orphans.collapse(self.formulas, *parent),
            None => {}
        }
        *slot = Some(Box::new(Cell::Value(self.value.clone())));
    }
}

struct SetFormulaCell<'s> {
    formulas: &'s mut FormulaCells,
    orphans: &'s mut Orphans,
    at: Point,
    generation: bool,
    formula: Rc<Formula>,
    references: Rc<FormulaReferences>,
}

impl CellOp<Cell> for SetFormulaCell<'_> {
    fn apply(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref() {
            Some(Cell::Formula(id)) => {
                if let Some(cell) = self.formulas.get_mut(*id) {
                    cell.replace_formula(Rc::clone(&self.formula), Rc::clone(&self.references));
                }
                return;
            }
            Some(Cell::Extension { parent, .. }) => self.orphans.collapse(self.formulas, *parent),
            _ => {}
        }
        let cell = FormulaCell::new(
            Rc::clone(&self.formula),
            Rc::clone(&self.references),
            self.at,
            self.generation,
        );
        let id = self.formulas.push_back(cell);
        *slot = Some(Box::new(Cell::Formula(id)));
    }
}

/// Copies values and formulas (re-anchored at the destination). Extension
/// cells are never copied.
struct CopyCell<'s> {
    formulas: &'s mut FormulaCells,
    orphans: &'s mut Orphans,
    copied: Option<Cell>,
    destination: Point,
}

impl CellTransformer<Cell> for CopyCell<'_> {
    fn modifies_missing_source(&self) -> bool {
        false
    }

    fn modifies_missing_destination(&self) -> bool {
        self.copied.is_some()
    }

    fn set_points(&mut self, _src: Point, dst: Point) {
        self.destination = dst;
        self.copied = None;
    }

    fn get(&mut self, slot: &mut Slot<Cell>) {
        self.copied = match slot.as_deref() {
            Some(Cell::Value(value)) => Some(Cell::Value(value.clone())),
            Some(Cell::Formula(id)) => {
                let Some(copy) = self.formulas.get(*id).map(|c| c.copied_to(self.destination)) else {
                    return;
                };
                Some(Cell::Formula(self.formulas.push_back(copy)))
            }
            Some(Cell::Extension { .. }) | None => None,
        };
    }

    fn set(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref() {
            Some(Cell::Formula(id)) => self.orphans.release(self.formulas, *id),
            Some(Cell::Extension { parent, .. }) => {
                if self.copied.is_none() {
                    return;
                }
                self.orphans.collapse(self.formulas, *parent);
            }
            _ => {}
        }
        *slot = self.copied.take().map(Box::new);
    }
}

/// Moves values and formulas. A moved formula keeps pointing at the same
/// cells; its old spill area is cleared. Extension cells stay behind.
struct MoveCell<'s> {
    formulas: &'s mut FormulaCells,
    orphans: &'s mut Orphans,
    moved: Slot<Cell>,
    destination: Point,
}

impl CellTransformer<Cell> for MoveCell<'_> {
    fn modifies_missing_source(&self) -> bool {
        false
    }

    fn modifies_missing_destination(&self) -> bool {
        self.moved.is_some()
    }

    fn set_points(&mut self, _src: Point, dst: Point) {
        self.destination = dst;
        self.moved = None;
    }

    fn get(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref() {
            Some(Cell::Extension { .. }) => return,
            Some(Cell::Formula(id)) => {
                let id = *id;
                self.orphans.collapse(self.formulas, id);
                if let Some(cell) = self.formulas.get_mut(id) {
                    cell.move_to(self.destination);
                }
            }
            _ => {}
        }
        self.moved = slot.take();
    }

    fn set(&mut self, slot: &mut Slot<Cell>) {
        match slot.as_deref() {
            Some(Cell::Extension { parent, .. }) => {
                if self.moved.is_none() {
                    return;
                }
                self.orphans.collapse(self.formulas, *parent);
            }
            Some(Cell::Formula(id)) => self.orphans.release(self.formulas, *id),
            _ => {}
        }
        *slot = self.moved.take();
    }
}

/// Plain slot transfer used when rows or columns shift. Formula
/// bookkeeping is done by the caller.
#[derive(Default)]
struct ShiftCell {
    moved: Slot<Cell>,
}

impl CellTransformer<Cell> for ShiftCell {
    fn modifies_missing_source(&self) -> bool {
        false
    }

    fn modifies_missing_destination(&self) -> bool {
        self.moved.is_some()
    }

    fn get(&mut self, slot: &mut Slot<Cell>) {
        self.moved = slot.take();
    }

    fn set(&mut self, slot: &mut Slot<Cell>) {
        *slot = self.moved.take();
    }
}

/* ─────────────────────────── length metadata ─────────────────────────── */

fn set_length(map: &mut LengthMap, start: SizeType, end: SizeType, length: f32) {
    map.modify_value(start, end, |current| {
        Some(LengthInfo {
            length: Some(length),
            hidden: current.is_some_and(|info| info.hidden),
        })
    });
}

fn clear_length(map: &mut LengthMap, start: SizeType, end: SizeType) {
    map.modify_value(start, end, |current| {
        current.filter(|info| info.hidden).map(|_| LengthInfo {
            length: None,
            hidden: true,
        })
    });
}

fn hide_length(map: &mut LengthMap, start: SizeType, end: SizeType) {
    map.modify_value(start, end, |current| {
        Some(LengthInfo {
            length: current.and_then(|info| info.length),
            hidden: true,
        })
    });
}

fn unhide_length(map: &mut LengthMap, start: SizeType, end: SizeType) {
    map.modify_value(start, end, |current| {
        current.and_then(|info| info.length).map(|length| LengthInfo {
            length: Some(length),
            hidden: false,
        })
    });
}

/* ─────────────────────────── sheet ─────────────────────────── */

pub struct Sheet {
    grid: CellGrid<Cell>,
    formulas: FormulaCells,
    generation: bool,
    suspended: u32,
    row_heights: LengthMap,
    column_widths: LengthMap,
    config: SheetConfig,
    /// Execution frames of one recalculation pass; reset after each.
    arena: Bump,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sheet")
            .field("size", &self.grid.size())
            .field("formulas", &self.formulas.len())
            .field("suspended", &self.suspended)
            .finish()
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::with_config(SheetConfig::default())
    }

    pub fn with_config(config: SheetConfig) -> Self {
        Self {
            grid: CellGrid::new(),
            formulas: FormulaCells::new(),
            generation: false,
            suspended: 0,
            row_heights: LengthMap::new(),
            column_widths: LengthMap::new(),
            config,
            arena: Bump::new(),
        }
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    pub fn size(&self) -> Size {
        self.grid.size()
    }

    pub const fn max_size() -> Size {
        MAX_SIZE
    }

    pub fn non_null_cell_count(&self) -> u64 {
        self.grid.non_null_count()
    }

    /// Number of formula cells.
    pub fn formula_count(&self) -> usize {
        self.formulas.len()
    }

    /* ───── reading ───── */

    pub fn value(&self, pt: Point) -> Scalar {
        self.grid
            .get(pt)
            .and_then(|cell| cell_value(&self.formulas, cell))
            .cloned()
            .unwrap_or_default()
    }

    /// Text and result extent of the formula anchored at `pt`. Cells a
    /// formula spilled into have none.
    pub fn formula_info(&self, pt: Point) -> Option<FormulaInfo> {
        let id = self.grid.get(pt)?.formula_id()?;
        let cell = self.formulas.get(id)?;
        Some(FormulaInfo {
            text: cell.formula.reconstruct(&cell.references, cell.location),
            extent: cell.extent,
        })
    }

    /* ───── editing ───── */

    /// Store a value. Setting [`Scalar::Blank`] clears the cell.
    pub fn set_value_cell(&mut self, pt: Point, value: impl Into<Scalar>) -> Result<(), SheetError> {
        check_point(pt)?;
        let value = value.into();
        let mut orphans = Orphans::default();
        if value.is_blank() {
            let mut op = SetBlankCell {
                formulas: &mut self.formulas,
                orphans: &mut orphans,
            };
            self.grid.modify_cell(pt, &mut op);
        } else {
            let mut op = SetValueCell {
                formulas: &mut self.formulas,
                orphans: &mut orphans,
                value,
            };
            self.grid.modify_cell(pt, &mut op);
        }
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /// Store a formula. The leading `=` is optional; text that does not
    /// parse evaluates to `#ERROR!`.
    pub fn set_formula_cell(&mut self, pt: Point, text: &str) -> Result<(), SheetError> {
        check_point(pt)?;
        let (formula, references) = Formula::parse(text, pt);
        let mut orphans = Orphans::default();
        let mut op = SetFormulaCell {
            formulas: &mut self.formulas,
            orphans: &mut orphans,
            at: pt,
            generation: self.generation,
            formula,
            references,
        };
        self.grid.modify_cell(pt, &mut op);
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    pub fn clear_cell(&mut self, pt: Point) -> Result<(), SheetError> {
        self.set_value_cell(pt, Scalar::Blank)
    }

    pub fn clear_cells(&mut self, rect: Rect) -> Result<(), SheetError> {
        check_rect(rect)?;
        let mut orphans = Orphans::default();
        let mut op = SetBlankCell {
            formulas: &mut self.formulas,
            orphans: &mut orphans,
        };
        self.grid.modify_cells(rect, &mut op);
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /// Copy one cell into every cell of `to`.
    pub fn copy_cell(&mut self, from: Point, to: Rect) -> Result<(), SheetError> {
        check_point(from)?;
        check_rect(to)?;
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("copy_cell", %from, %to).entered();
        let mut orphans = Orphans::default();
        let mut tr = CopyCell {
            formulas: &mut self.formulas,
            orphans: &mut orphans,
            copied: None,
            destination: Point::default(),
        };
        self.grid.transform_cell(from, to, &mut tr);
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /// Copy `from` to the same-sized area anchored at `to`.
    pub fn copy_cells(&mut self, from: Rect, to: Point) -> Result<(), SheetError> {
        check_rect(from)?;
        check_rect(Rect::new(to, from.size))?;
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("copy_cells", %from, %to).entered();
        let mut orphans = Orphans::default();
        let mut tr = CopyCell {
            formulas: &mut self.formulas,
            orphans: &mut orphans,
            copied: None,
            destination: Point::default(),
        };
        self.grid.transform_cells(from, to, &mut tr);
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    pub fn move_cell(&mut self, from: Point, to: Point) -> Result<(), SheetError> {
        self.move_cells(Rect::new(from, Size::ONE), to)
    }

    /// Move `from` to the same-sized area anchored at `to`. Formulas
    /// elsewhere that referred to the moved cells are not rewritten.
    pub fn move_cells(&mut self, from: Rect, to: Point) -> Result<(), SheetError> {
        check_rect(from)?;
        check_rect(Rect::new(to, from.size))?;
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("move_cells", %from, %to).entered();
        let mut orphans = Orphans::default();
        let mut tr = MoveCell {
            formulas: &mut self.formulas,
            orphans: &mut orphans,
            moved: None,
            destination: Point::default(),
        };
        self.grid.transform_cells(from, to, &mut tr);
        orphans.clear(&mut self.grid);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /* ───── structure ───── */

    pub fn insert_rows(&mut self, y: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_insertion("row", y, count, self.grid.size().height, MAX_SIZE.height)?;
        if count == 0 {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("insert_rows", y, count).entered();

        // A spill crossing the insertion line would get a gap; it is
        // rebuilt on the next recalculation instead.
        for id in self.formulas.ids() {
            if let Some(cell) = self.formulas.get(id)
                && cell.location.y < y
                && cell.location.y + cell.extent.height > y
            {
                self.remove_formula_dependents(id);
            }
        }
        self.grid.insert_rows(y, count, &mut ShiftCell::default());
        for id in self.formulas.ids() {
            let Some(cell) = self.formulas.get_mut(id) else {
                continue;
            };
            let at = cell.location;
            if at.y >= y {
                cell.location.y += count;
            }
            cell.replace_references(cell.references.adjusted_to_row_insertion(at.y, y, count));
        }
        self.row_heights.insert_indices(y, count);
        self.recalc_if_not_suspended();
        Ok(())
    }

    pub fn insert_columns(&mut self, x: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_insertion("column", x, count, self.grid.size().width, MAX_SIZE.width)?;
        if count == 0 {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("insert_columns", x, count).entered();

        for id in self.formulas.ids() {
            if let Some(cell) = self.formulas.get(id)
                && cell.location.x < x
                && cell.location.x + cell.extent.width > x
            {
                self.remove_formula_dependents(id);
            }
        }
        self.grid.insert_columns(x, count, &mut ShiftCell::default());
        for id in self.formulas.ids() {
            let Some(cell) = self.formulas.get_mut(id) else {
                continue;
            };
            let at = cell.location;
            if at.x >= x {
                cell.location.x += count;
            }
            cell.replace_references(cell.references.adjusted_to_column_insertion(at.x, x, count));
        }
        self.column_widths.insert_indices(x, count);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /// Delete rows `y..y + count`. Formulas inside the band disappear;
    /// references into it become `#REF!`, ranges across it shrink.
    pub fn delete_rows(&mut self, y: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("row", y, count, MAX_SIZE.height)?;
        if count == 0 {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("delete_rows", y, count).entered();

        for id in self.formulas.ids() {
            let Some(at) = self.formulas.get(id).map(|c| c.location) else {
                continue;
            };
            if at.y >= y && at.y < y + count {
                self.remove_formula_dependents(id);
                self.formulas.remove(id);
                continue;
            }
            let Some(cell) = self.formulas.get_mut(id) else {
                continue;
            };
            if at.y < y {
                let bottom = at.y + cell.extent.height;
                if bottom > y {
                    cell.extent.height -= count.min(bottom - y);
                }
            } else {
                cell.location.y -= count;
            }
            cell.replace_references(cell.references.adjusted_to_row_deletion(at.y, y, count));
        }
        self.grid.delete_rows(y, count, &mut ShiftCell::default());
        self.row_heights.erase_indices(y, y + count);
        self.recalc_if_not_suspended();
        Ok(())
    }

    pub fn delete_columns(&mut self, x: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("column", x, count, MAX_SIZE.width)?;
        if count == 0 {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("delete_columns", x, count).entered();

        for id in self.formulas.ids() {
            let Some(at) = self.formulas.get(id).map(|c| c.location) else {
                continue;
            };
            if at.x >= x && at.x < x + count {
                self.remove_formula_dependents(id);
                self.formulas.remove(id);
                continue;
            }
            let Some(cell) = self.formulas.get_mut(id) else {
                continue;
            };
            if at.x < x {
                let right = at.x + cell.extent.width;
                if right > x {
                    cell.extent.width -= count.min(right - x);
                }
            } else {
                cell.location.x -= count;
            }
            cell.replace_references(cell.references.adjusted_to_column_deletion(at.x, x, count));
        }
        self.grid.delete_columns(x, count, &mut ShiftCell::default());
        self.column_widths.erase_indices(x, x + count);
        self.recalc_if_not_suspended();
        Ok(())
    }

    /* ───── row and column metadata ───── */

    pub fn set_row_height(&mut self, y: SizeType, count: SizeType, height: f32) -> Result<(), SheetError> {
        check_band("row", y, count, MAX_SIZE.height)?;
        self.grid.expand_height_to_at_least(y + count);
        set_length(&mut self.row_heights, y, y + count, height);
        Ok(())
    }

    pub fn clear_row_height(&mut self, y: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("row", y, count, MAX_SIZE.height)?;
        self.grid.expand_height_to_at_least(y + count);
        clear_length(&mut self.row_heights, y, y + count);
        Ok(())
    }

    pub fn hide_row(&mut self, y: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("row", y, count, MAX_SIZE.height)?;
        self.grid.expand_height_to_at_least(y + count);
        hide_length(&mut self.row_heights, y, y + count);
        Ok(())
    }

    pub fn unhide_row(&mut self, y: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("row", y, count, MAX_SIZE.height)?;
        self.grid.expand_height_to_at_least(y + count);
        unhide_length(&mut self.row_heights, y, y + count);
        Ok(())
    }

    pub fn row_info(&self, y: SizeType) -> LengthInfo {
        *self.row_heights.get_value_with_default(y, &DEFAULT_LENGTH)
    }

    pub fn row_height(&self, y: SizeType) -> f32 {
        self.row_info(y).length.unwrap_or(self.config.default_row_height)
    }

    pub fn is_row_hidden(&self, y: SizeType) -> bool {
        self.row_info(y).hidden
    }

    /// Row metadata over `start..end`, gaps reported as the default.
    pub fn row_infos(&self, start: SizeType, end: SizeType) -> Intervals<'_, SizeType, LengthInfo> {
        self.row_heights.intervals(start, end, &DEFAULT_LENGTH)
    }

    pub fn set_column_width(&mut self, x: SizeType, count: SizeType, width: f32) -> Result<(), SheetError> {
        check_band("column", x, count, MAX_SIZE.width)?;
        self.grid.expand_width_to_at_least(x + count);
        set_length(&mut self.column_widths, x, x + count, width);
        Ok(())
    }

    pub fn clear_column_width(&mut self, x: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("column", x, count, MAX_SIZE.width)?;
        self.grid.expand_width_to_at_least(x + count);
        clear_length(&mut self.column_widths, x, x + count);
        Ok(())
    }

    pub fn hide_column(&mut self, x: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("column", x, count, MAX_SIZE.width)?;
        self.grid.expand_width_to_at_least(x + count);
        hide_length(&mut self.column_widths, x, x + count);
        Ok(())
    }

    pub fn unhide_column(&mut self, x: SizeType, count: SizeType) -> Result<(), SheetError> {
        check_band("column", x, count, MAX_SIZE.width)?;
        self.grid.expand_width_to_at_least(x + count);
        unhide_length(&mut self.column_widths, x, x + count);
        Ok(())
    }

    pub fn column_info(&self, x: SizeType) -> LengthInfo {
        *self.column_widths.get_value_with_default(x, &DEFAULT_LENGTH)
    }

    pub fn column_width(&self, x: SizeType) -> f32 {
        self.column_info(x).length.unwrap_or(self.config.default_column_width)
    }

    pub fn is_column_hidden(&self, x: SizeType) -> bool {
        self.column_info(x).hidden
    }

    pub fn column_infos(&self, start: SizeType, end: SizeType) -> Intervals<'_, SizeType, LengthInfo> {
        self.column_widths.intervals(start, end, &DEFAULT_LENGTH)
    }

    /* ───── coordinate names ───── */

    /// Parse an area name; whole rows and columns span the current size.
    pub fn parse_area(&self, text: &str) -> Option<Rect> {
        sheetcalc_common::parse_area(text, self.size())
    }

    /* ───── recalculation control ───── */

    /// Hold back automatic recalculation until the matching
    /// [`resume_recalc`](Self::resume_recalc). Calls nest.
    pub fn suspend_recalc(&mut self) {
        self.suspended += 1;
    }

    pub fn resume_recalc(&mut self) -> Result<(), SheetError> {
        if self.suspended == 0 {
            return Err(SheetError::RecalcNotSuspended);
        }
        self.suspended -= 1;
        self.recalc_if_not_suspended();
        Ok(())
    }

    pub fn is_recalc_suspended(&self) -> bool {
        self.suspended > 0
    }

    /// Run `edits` with recalculation suspended, recalculating once at the
    /// end.
    pub fn batch<R>(&mut self, edits: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.suspended;
        self.suspend_recalc();
        let result = edits(self);
        // Unbalanced suspend/resume calls inside `edits` are undone here.
        self.suspended = depth;
        self.recalc_if_not_suspended();
        result
    }

    fn recalc_if_not_suspended(&mut self) {
        if self.suspended == 0 && self.config.auto_recalc {
            self.recalculate();
        }
    }

    /// Evaluate every formula of the sheet.
    pub fn recalculate(&mut self) {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("recalculate", formulas = self.formulas.len()).entered();

        self.generation = !self.generation;
        let mut arena = std::mem::take(&mut self.arena);
        let mut dependencies = Vec::new();
        let mut cursor = self.formulas.first();

        while let Some(id) = cursor {
            let Some(cell) = self.formulas.get_mut(id) else {
                break;
            };
            if !cell.needs_recalc(self.generation) {
                cursor = self.formulas.next(id);
                continue;
            }
            // Stays set while waiting on dependencies; reading it then is
            // a cycle.
            cell.set_being_calculated(true);
            let formula = Rc::clone(&cell.formula);
            let references = Rc::clone(&cell.references);
            let at = cell.location;

            dependencies.clear();
            let mut evaluator = FormulaEvaluator::new(&arena, &formula, references, id, at, self.generation);
            let outcome = self.evaluate(id, &mut evaluator, &mut dependencies);
            drop(evaluator);

            match outcome {
                Some(circular) => {
                    if let Some(cell) = self.formulas.get_mut(id) {
                        cell.finish_calculation(self.generation, circular);
                    }
                    cursor = self.formulas.next(id);
                }
                None if dependencies.is_empty() => {
                    debug_assert!(false, "evaluation paused without a dependency");
                    if let Some(cell) = self.formulas.get_mut(id) {
                        cell.value = CellError::InvalidReference.into();
                        cell.finish_calculation(self.generation, true);
                    }
                    cursor = self.formulas.next(id);
                }
                None => {
                    let mut before = id;
                    for &dependency in &dependencies {
                        if dependency != before {
                            self.formulas.move_before(dependency, before);
                            before = dependency;
                        }
                    }
                    cursor = Some(before);
                }
            }
        }

        arena.reset();
        self.arena = arena;
    }

    /// Drive `evaluator` through every offset of its result, writing values
    /// back as they come. Returns `None` when a dependency must be
    /// calculated first, otherwise whether the formula is circular.
    fn evaluate(
        &mut self,
        id: FormulaId,
        evaluator: &mut FormulaEvaluator<'_, '_>,
        dependencies: &mut Vec<FormulaId>,
    ) -> Option<bool> {
        loop {
            let ready = {
                let mut env = Env {
                    grid: &self.grid,
                    formulas: &self.formulas,
                    dependencies: &mut *dependencies,
                };
                evaluator.eval(&mut env)
            };
            if !ready {
                return None;
            }
            if evaluator.is_circular_dependency() {
                #[cfg(feature = "tracing")]
                if let Some(cell) = self.formulas.get(id) {
                    tracing::debug!(at = %cell.location, "circular dependency");
                }
                self.remove_formula_dependents(id);
                if let Some(cell) = self.formulas.get_mut(id) {
                    cell.value = CellError::InvalidReference.into();
                }
                return Some(true);
            }

            let offset = evaluator.offset();
            if offset == Point::default() {
                self.reserve_extent(id, evaluator.extent());
                if let Some(cell) = self.formulas.get_mut(id) {
                    cell.value = evaluator.take_result();
                }
            } else if let Some(at) = self.formulas.get(id).map(|c| c.location) {
                let mut op = WriteExtension(evaluator.take_result());
                self.grid.modify_cell(at + offset.as_size(), &mut op);
            }

            if !evaluator.next_offset() {
                return Some(false);
            }
        }
    }

    /// Grow or shrink the set of extension cells of `id` to `extent`.
    fn reserve_extent(&mut self, id: FormulaId, extent: Size) {
        let Some(cell) = self.formulas.get_mut(id) else {
            return;
        };
        let old = cell.extent;
        if old == extent {
            return;
        }
        cell.extent = extent;
        let at = cell.location;

        let common = Size::new(extent.width.min(old.width), extent.height.min(old.height));
        let mut reserve = ReserveExtension { parent: id };
        let mut clear = ClearExtension { parent: id };
        for y in 0..common.height {
            for x in common.width..extent.width {
                self.grid.modify_cell(at + Size::new(x, y), &mut reserve);
            }
            for x in extent.width..old.width {
                self.grid.modify_cell(at + Size::new(x, y), &mut clear);
            }
        }
        for y in common.height..extent.height {
            for x in 0..extent.width {
                self.grid.modify_cell(at + Size::new(x, y), &mut reserve);
            }
        }
        for y in extent.height..old.height {
            for x in 0..old.width {
                self.grid.modify_cell(at + Size::new(x, y), &mut clear);
            }
        }
    }

    /// Clear every extension cell of `id` and collapse it to one cell.
    fn remove_formula_dependents(&mut self, id: FormulaId) {
        let Some(cell) = self.formulas.get_mut(id) else {
            return;
        };
        if cell.extent == Size::ONE {
            return;
        }
        let (at, extent) = (cell.location, cell.extent);
        cell.extent = Size::ONE;
        clear_extensions(&mut self.grid, id, at, extent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(name: &str) -> Point {
        sheetcalc_common::parse_point(name).expect("valid cell name")
    }

    #[test]
    fn test_validation_happens_before_mutation() {
        let mut sheet = Sheet::new();
        let err = sheet.set_value_cell(Point::new(MAX_SIZE.width, 0), 1.0).unwrap_err();
        assert!(matches!(err, SheetError::OutOfRange { what: "column", .. }));
        assert_eq!(sheet.size(), Size::default());

        let err = sheet.delete_rows(5, MAX_SIZE.height).unwrap_err();
        assert!(matches!(err, SheetError::OutOfRange { what: "count", .. }));
        assert_eq!(sheet.resume_recalc(), Err(SheetError::RecalcNotSuspended));
    }

    #[test]
    fn test_insertion_cannot_push_cells_off_the_grid() {
        let mut sheet = Sheet::new();
        sheet.set_value_cell(Point::new(0, MAX_SIZE.height - 1), 1.0).unwrap();
        assert!(sheet.insert_rows(0, 1).is_err());
        assert!(sheet.insert_rows(MAX_SIZE.height - 1, 1).is_err());
        assert_eq!(sheet.value(Point::new(0, MAX_SIZE.height - 1)), Scalar::Number(1.0));
    }

    #[test]
    fn test_blank_value_clears_but_keeps_extensions() {
        let mut sheet = Sheet::new();
        sheet.set_formula_cell(pt("A1"), "{1,2}").unwrap();
        assert_eq!(sheet.value(pt("B1")), Scalar::Number(2.0));
        sheet.clear_cell(pt("B1")).unwrap();
        assert_eq!(sheet.value(pt("B1")), Scalar::Number(2.0));
        sheet.clear_cell(pt("A1")).unwrap();
        assert_eq!(sheet.value(pt("B1")), Scalar::Blank);
        assert_eq!(sheet.non_null_cell_count(), 0);
    }

    #[test]
    fn test_batch_recalculates_once_at_the_end() {
        let mut sheet = Sheet::new();
        let seen = sheet.batch(|s| {
            s.set_value_cell(pt("A1"), 2.0).unwrap();
            s.set_formula_cell(pt("A2"), "=A1*2").unwrap();
            s.value(pt("A2"))
        });
        assert_eq!(seen, Scalar::Blank);
        assert_eq!(sheet.value(pt("A2")), Scalar::Number(4.0));
        assert!(!sheet.is_recalc_suspended());
    }

    #[test]
    fn test_manual_recalc_config() {
        let mut sheet = Sheet::with_config(SheetConfig {
            auto_recalc: false,
            ..SheetConfig::default()
        });
        sheet.set_formula_cell(pt("A1"), "=1+1").unwrap();
        assert_eq!(sheet.value(pt("A1")), Scalar::Blank);
        sheet.recalculate();
        assert_eq!(sheet.value(pt("A1")), Scalar::Number(2.0));
    }

    #[test]
    fn test_formula_info_only_on_anchor() {
        let mut sheet = Sheet::new();
        sheet.set_formula_cell(pt("B2"), "=A1:A2").unwrap();
        let info = sheet.formula_info(pt("B2")).unwrap();
        assert_eq!(info.text, "A1:A2");
        assert_eq!(info.extent, Size::new(1, 2));
        assert_eq!(sheet.formula_info(pt("B3")), None);
        assert_eq!(sheet.formula_info(pt("A1")), None);
    }
}
