//! Drives one formula's traversal and walks its result extent.

use std::rc::Rc;

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use sheetcalc_common::{CellError, MAX_SIZE, Point, Rect, Scalar, Size};
use sheetcalc_parse::{Formula, FormulaReferences, Frame, Node, Outcome, Status, Traversal, TraversalHandler};

use crate::builtins::{self, Scratch};
use crate::execution_context::{Env, ExecutionContext, ScalarGenerator};
use crate::formula_cells::{Cell, FormulaId};

type ExecutionStack<'n, 'b> = BumpVec<'b, Frame<'n, Scratch>>;

struct Executor<'c, 'a> {
    ctx: &'c mut ExecutionContext,
    env: &'c mut Env<'a>,
}

impl<'n> TraversalHandler<'n> for Executor<'_, '_> {
    type Scratch = Scratch;

    fn new_scratch(&mut self, node: &'n Node) -> Scratch {
        Scratch::for_node(node)
    }

    fn on_before_child(&mut self, frame: &mut Frame<'n, Scratch>) -> Outcome {
        if frame.child == 0 {
            builtins::before_arguments(self.ctx, frame);
        }
        Outcome::Continue
    }

    fn on_after_child(&mut self, frame: &mut Frame<'n, Scratch>) -> Outcome {
        builtins::after_argument(self.ctx, self.env, frame)
    }

    fn on_exit(&mut self, frame: &mut Frame<'n, Scratch>) -> Outcome {
        if builtins::execute(self.ctx, self.env, frame) {
            Outcome::Continue
        } else {
            Outcome::Pause
        }
    }
}

/// Evaluates one formula cell, offset by offset.
///
/// [`eval`](Self::eval) produces the value at the current offset, or
/// returns `false` when it had to stop on a stale dependency (reported to
/// the env's sink). [`next_offset`](Self::next_offset) steps through the
/// result extent; array and range results are computed once and then only
/// indexed, scalar broadcasts re-run the traversal at every offset.
pub struct FormulaEvaluator<'n, 'b> {
    traversal: Traversal<'n, Scratch, ExecutionStack<'n, 'b>>,
    ctx: ExecutionContext,
    id: FormulaId,
    current: Scalar,
    has_full_result: bool,
}

impl<'n, 'b> FormulaEvaluator<'n, 'b> {
    pub fn new(
        bump: &'b Bump,
        formula: &'n Formula,
        references: Rc<FormulaReferences>,
        id: FormulaId,
        at: Point,
        generation: bool,
    ) -> Self {
        Self {
            traversal: Traversal::new(formula.root(), BumpVec::new_in(bump)),
            ctx: ExecutionContext::new(references, at, generation),
            id,
            current: Scalar::Blank,
            has_full_result: false,
        }
    }

    /// `true` when a value is available (or the formula turned out to be
    /// circular); `false` when evaluation waits for a dependency.
    pub fn eval(&mut self, env: &mut Env<'_>) -> bool {
        if self.has_full_result {
            return match self.ctx.generate_returned(env) {
                Some((value, _)) => {
                    self.current = value;
                    true
                }
                None => self.ctx.circular_dependency,
            };
        }

        let mut executor = Executor {
            ctx: &mut self.ctx,
            env: &mut *env,
        };
        match self.traversal.run(&mut executor) {
            Status::Paused => self.ctx.circular_dependency,
            Status::Done => {
                if self.ctx.offset == Point::default() {
                    self.check_spill(env);
                }
                match self.ctx.generate_returned(env) {
                    Some((value, is_single)) => {
                        self.current = value;
                        self.has_full_result = !is_single;
                        true
                    }
                    None => self.ctx.circular_dependency,
                }
            }
        }
    }

    /// Replace a multi-cell result by `#SPILL!` when the cells it would
    /// cover are taken by anything other than blanks or its own extension.
    fn check_spill(&mut self, env: &Env<'_>) {
        let extent = self.ctx.returned_extent;
        if extent == Size::ONE || self.ctx.circular_dependency {
            return;
        }
        let at = self.ctx.at();
        let clamped = Size::new(
            extent.width.min(MAX_SIZE.width - at.x),
            extent.height.min(MAX_SIZE.height - at.y),
        );
        let grid = env.grid.size();
        let Some(area) = Rect::new(at, clamped).intersection(&Rect::new(Point::default(), grid)) else {
            return;
        };
        let collides = area.points().any(|pt| match env.grid.get(pt) {
            None => false,
            Some(Cell::Value(value)) => !value.is_blank(),
            Some(Cell::Formula(id)) => *id != self.id,
            Some(Cell::Extension { parent, .. }) => *parent != self.id,
        });
        if collides {
            #[cfg(feature = "tracing")]
            tracing::debug!(x = at.x, y = at.y, %extent, "result spills onto occupied cells");
            self.ctx.returned_value = ScalarGenerator::from(CellError::Spill);
            self.ctx.returned_extent = Size::ONE;
        } else {
            self.ctx.returned_extent = clamped;
        }
    }

    /// Advance to the next offset of the result extent. Returns `false`
    /// after the last one.
    pub fn next_offset(&mut self) -> bool {
        if !self.ctx.increment_offset(self.ctx.returned_extent) {
            return false;
        }
        debug_assert!(!self.ctx.suppress_evaluation);
        debug_assert!(!self.ctx.circular_dependency);
        if !self.has_full_result {
            self.traversal.reset();
        }
        true
    }

    pub fn result(&self) -> &Scalar {
        &self.current
    }

    pub fn take_result(&mut self) -> Scalar {
        std::mem::take(&mut self.current)
    }

    pub fn extent(&self) -> Size {
        self.ctx.returned_extent
    }

    pub fn offset(&self) -> Point {
        self.ctx.offset
    }

    pub fn is_circular_dependency(&self) -> bool {
        self.ctx.circular_dependency
    }
}
