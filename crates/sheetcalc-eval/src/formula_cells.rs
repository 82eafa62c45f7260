//! Grid cell payloads and the formula arena.
//!
//! Formula bookkeeping lives outside the grid in [`FormulaCells`]: an arena
//! of generation-checked slots that also threads the recalculation order as
//! a doubly-linked list. Grid cells refer to it through [`FormulaId`].

use std::rc::Rc;

use sheetcalc_common::{Point, Scalar, Size};
use sheetcalc_parse::{Formula, FormulaReferences};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FormulaId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Scalar),
    Formula(FormulaId),
    /// A cell covered by the spilled result of the formula at `parent`.
    Extension { parent: FormulaId, value: Scalar },
}

impl Cell {
    pub fn formula_id(&self) -> Option<FormulaId> {
        match self {
            Cell::Formula(id) => Some(*id),
            _ => None,
        }
    }

    /// The formula whose state decides whether this cell is up to date.
    pub fn owner(&self) -> Option<FormulaId> {
        match self {
            Cell::Value(_) => None,
            Cell::Formula(id) => Some(*id),
            Cell::Extension { parent, .. } => Some(*parent),
        }
    }

    pub fn is_blank_value(&self) -> bool {
        matches!(self, Cell::Value(Scalar::Blank))
    }
}

#[derive(Debug, Clone)]
pub struct FormulaCell {
    pub formula: Rc<Formula>,
    pub references: Rc<FormulaReferences>,
    pub location: Point,
    pub extent: Size,
    pub value: Scalar,
    generation: bool,
    in_progress: bool,
    blocked: bool,
    prev: Option<FormulaId>,
    next: Option<FormulaId>,
}

impl FormulaCell {
    pub fn new(
        formula: Rc<Formula>,
        references: Rc<FormulaReferences>,
        location: Point,
        generation: bool,
    ) -> Self {
        Self {
            formula,
            references,
            location,
            extent: Size::ONE,
            value: Scalar::Blank,
            generation,
            in_progress: false,
            blocked: false,
            prev: None,
            next: None,
        }
    }

    /// A copy of this formula anchored at `to`. Relative references that
    /// fall off the grid there become illegal.
    pub fn copied_to(&self, to: Point) -> Self {
        let references = match self.references.adjusted_to_copy(to) {
            Some(adjusted) => Rc::new(adjusted),
            None => Rc::clone(&self.references),
        };
        Self::new(Rc::clone(&self.formula), references, to, self.generation)
    }

    /// Re-anchor at `to`, keeping every reference on its current target.
    pub fn move_to(&mut self, to: Point) {
        if let Some(adjusted) = self.references.adjusted_to_move(self.location, to) {
            self.references = Rc::new(adjusted);
        }
        self.location = to;
    }

    pub fn replace_formula(&mut self, formula: Rc<Formula>, references: Rc<FormulaReferences>) {
        self.formula = formula;
        self.references = references;
    }

    pub fn replace_references(&mut self, references: Option<FormulaReferences>) {
        if let Some(references) = references {
            self.references = Rc::new(references);
        }
    }

    pub fn needs_recalc(&self, generation: bool) -> bool {
        self.generation != generation
    }

    /// Whether a reader in `generation` must wait for this formula.
    pub fn is_pending(&self, generation: bool) -> bool {
        self.generation != generation || self.blocked
    }

    pub fn is_circular_dependency(&self) -> bool {
        self.in_progress || self.blocked
    }

    pub fn set_being_calculated(&mut self, value: bool) {
        self.in_progress = value;
    }

    pub fn finish_calculation(&mut self, generation: bool, blocked: bool) {
        self.generation = generation;
        self.in_progress = false;
        self.blocked = blocked;
    }

    pub fn generation(&self) -> bool {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Entry {
    generation: u32,
    cell: Option<FormulaCell>,
}

/// Arena of formula cells plus their recalculation order.
#[derive(Debug, Default)]
pub struct FormulaCells {
    entries: Vec<Entry>,
    free: Vec<u32>,
    head: Option<FormulaId>,
    tail: Option<FormulaId>,
    len: usize,
}

impl FormulaCells {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: FormulaId) -> Option<&FormulaCell> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.cell.as_ref())
    }

    pub fn get_mut(&mut self, id: FormulaId) -> Option<&mut FormulaCell> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.cell.as_mut())
    }

    /// Store `cell` and append it to the end of the recalculation order.
    pub fn push_back(&mut self, cell: FormulaCell) -> FormulaId {
        let id = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.cell = Some(cell);
                FormulaId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    cell: Some(cell),
                });
                FormulaId {
                    index,
                    generation: 0,
                }
            }
        };
        self.len += 1;
        self.link_before(id, None);
        id
    }

    /// Unlink and free `id`, returning its cell.
    pub fn remove(&mut self, id: FormulaId) -> Option<FormulaCell> {
        self.get(id)?;
        self.unlink(id);
        let entry = &mut self.entries[id.index as usize];
        let cell = entry.cell.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        cell
    }

    /// First formula in recalculation order.
    pub fn first(&self) -> Option<FormulaId> {
        self.head
    }

    pub fn next(&self, id: FormulaId) -> Option<FormulaId> {
        self.get(id).and_then(|c| c.next)
    }

    /// Ids in recalculation order.
    pub fn ids(&self) -> Vec<FormulaId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.next(id);
        }
        ids
    }

    /// Take `id` out of wherever it sits and re-insert it right before
    /// `before`.
    pub fn move_before(&mut self, id: FormulaId, before: FormulaId) {
        if id == before {
            return;
        }
        self.unlink(id);
        self.link_before(id, Some(before));
    }

    fn unlink(&mut self, id: FormulaId) {
        let Some(cell) = self.get_mut(id) else {
            return;
        };
        let (prev, next) = (cell.prev.take(), cell.next.take());
        match prev {
            Some(p) => {
                if let Some(c) = self.get_mut(p) {
                    c.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(c) = self.get_mut(n) {
                    c.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    /// Insert an unlinked `id` before `before`, or at the end for `None`.
    fn link_before(&mut self, id: FormulaId, before: Option<FormulaId>) {
        let prev = match before {
            Some(b) => self.get(b).and_then(|c| c.prev),
            None => self.tail,
        };
        if let Some(cell) = self.get_mut(id) {
            cell.prev = prev;
            cell.next = before;
        }
        match prev {
            Some(p) => {
                if let Some(c) = self.get_mut(p) {
                    c.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match before {
            Some(b) => {
                if let Some(c) = self.get_mut(b) {
                    c.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(at: Point) -> FormulaCell {
        let (formula, refs) = Formula::parse("1", at);
        FormulaCell::new(formula, refs, at, false)
    }

    #[test]
    fn test_push_back_preserves_order() {
        let mut cells = FormulaCells::new();
        let a = cells.push_back(cell(Point::new(0, 0)));
        let b = cells.push_back(cell(Point::new(0, 1)));
        let c = cells.push_back(cell(Point::new(0, 2)));
        assert_eq!(cells.ids(), vec![a, b, c]);
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn test_move_before_reorders() {
        let mut cells = FormulaCells::new();
        let a = cells.push_back(cell(Point::new(0, 0)));
        let b = cells.push_back(cell(Point::new(0, 1)));
        let c = cells.push_back(cell(Point::new(0, 2)));
        cells.move_before(c, a);
        assert_eq!(cells.ids(), vec![c, a, b]);
        cells.move_before(a, b);
        assert_eq!(cells.ids(), vec![c, a, b]);
        cells.move_before(b, c);
        assert_eq!(cells.ids(), vec![b, c, a]);
        assert_eq!(cells.first(), Some(b));
        assert_eq!(cells.next(a), None);
    }

    #[test]
    fn test_removed_ids_go_stale() {
        let mut cells = FormulaCells::new();
        let a = cells.push_back(cell(Point::new(0, 0)));
        let b = cells.push_back(cell(Point::new(0, 1)));
        assert!(cells.remove(a).is_some());
        assert!(cells.get(a).is_none());
        assert!(cells.remove(a).is_none());

        let reused = cells.push_back(cell(Point::new(5, 5)));
        assert_ne!(reused, a);
        assert!(cells.get(a).is_none());
        assert_eq!(cells.ids(), vec![b, reused]);
        assert_eq!(cells.get(reused).map(|c| c.location), Some(Point::new(5, 5)));
    }

    #[test]
    fn test_recalc_state_transitions() {
        let mut c = cell(Point::new(1, 1));
        assert!(c.needs_recalc(true));
        assert!(!c.needs_recalc(false));
        c.set_being_calculated(true);
        assert!(c.is_circular_dependency());
        c.finish_calculation(true, false);
        assert!(!c.is_pending(true));
        assert!(!c.is_circular_dependency());
        c.finish_calculation(true, true);
        assert!(c.is_pending(true));
        assert!(c.is_circular_dependency());
    }

    #[test]
    fn test_copy_and_move_adjust_references() {
        let at = Point::new(1, 1);
        let (formula, refs) = Formula::parse("A1+$A$1", at);
        let mut c = FormulaCell::new(formula, refs, at, false);

        let copied = c.copied_to(Point::new(3, 3));
        assert_eq!(copied.formula.reconstruct(&copied.references, copied.location), "C3 + $A$1");
        assert!(Rc::ptr_eq(&copied.formula, &c.formula));

        c.move_to(Point::new(4, 4));
        assert_eq!(c.formula.reconstruct(&c.references, c.location), "A1 + $A$1");
    }
}
