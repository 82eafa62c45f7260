//! Execution of AST nodes.
//!
//! Every node gets one [`Scratch`] in its traversal frame. Function nodes
//! follow a three step contract: [`before_arguments`] once before the first
//! argument, [`after_argument`] after every argument (deciding how the walk
//! continues), and [`execute`] on exit, which publishes the result through the
//! context registers and may ask to pause. Leaves only execute.

mod aggregators;
mod control;
mod operators;
mod scalar;

use sheetcalc_common::{CellError, Scalar, Size};
use sheetcalc_parse::{Frame, FunctionId, FunctionKind, Node, NodeKind, Outcome, Reference};

use crate::execution_context::{Env, ExecutionContext, ScalarGenerator};

pub use aggregators::{Aggregator, AggregatorState, SumProductState};
pub use control::{ChoiceState, IfErrorState};
pub use operators::{BinaryState, binary_operator, compare, unary_operator};
pub use scalar::{FiniteState, call_scalar_function};

/// Per-node execution state.
#[derive(Debug)]
pub enum Scratch {
    Leaf,
    Binary(BinaryState),
    Unary(Scalar),
    Aggregate(AggregatorState),
    SumProduct(SumProductState),
    Finite(FiniteState),
    Choice(ChoiceState),
    IfError(IfErrorState),
}

impl Scratch {
    pub fn for_node(node: &Node) -> Self {
        let Some(id) = node.function_id() else {
            return Scratch::Leaf;
        };
        match id.kind() {
            FunctionKind::Infix => Scratch::Binary(BinaryState::default()),
            FunctionKind::Prefix | FunctionKind::Postfix => Scratch::Unary(Scalar::Blank),
            FunctionKind::Aggregator if id == FunctionId::SumProduct => {
                Scratch::SumProduct(SumProductState::default())
            }
            FunctionKind::Aggregator => Scratch::Aggregate(AggregatorState::new(id)),
            FunctionKind::Scalar => Scratch::Finite(FiniteState::default()),
            FunctionKind::Control if id == FunctionId::IfError => {
                Scratch::IfError(IfErrorState::default())
            }
            FunctionKind::Control => Scratch::Choice(ChoiceState::new(id, node.children().len())),
        }
    }
}

pub fn before_arguments(ctx: &mut ExecutionContext, frame: &mut Frame<'_, Scratch>) {
    match &mut frame.scratch {
        Scratch::Aggregate(state) => state.before_arguments(ctx),
        Scratch::SumProduct(state) => state.before_arguments(ctx),
        Scratch::Choice(state) => state.before_arguments(ctx),
        Scratch::IfError(state) => state.before_arguments(ctx),
        Scratch::Leaf | Scratch::Binary(_) | Scratch::Unary(_) | Scratch::Finite(_) => {}
    }
}

pub fn after_argument(
    ctx: &mut ExecutionContext,
    env: &mut Env<'_>,
    frame: &mut Frame<'_, Scratch>,
) -> Outcome {
    let index = frame.child;
    let Some(id) = frame.node.function_id() else {
        debug_assert!(false, "leaf nodes have no arguments");
        return Outcome::Continue;
    };
    match &mut frame.scratch {
        Scratch::Binary(state) => state.after_argument(id, ctx, env, index),
        Scratch::Unary(value) => operators::unary_after_argument(id, value, ctx, env),
        Scratch::Aggregate(state) => state.after_argument(ctx, env),
        Scratch::SumProduct(state) => state.after_argument(ctx, env, index),
        Scratch::Finite(state) => state.after_argument(ctx, env),
        Scratch::Choice(state) => state.after_argument(ctx, env, index),
        Scratch::IfError(state) => state.after_argument(ctx, env, index),
        Scratch::Leaf => Outcome::Continue,
    }
}

/// Returns `false` to pause.
pub fn execute(ctx: &mut ExecutionContext, env: &mut Env<'_>, frame: &mut Frame<'_, Scratch>) -> bool {
    let node = frame.node;
    match (&node.kind, &mut frame.scratch) {
        (NodeKind::Function { id, .. }, scratch) => match scratch {
            Scratch::Binary(state) => state.execute(ctx),
            Scratch::Unary(value) => operators::unary_execute(value, ctx),
            Scratch::Aggregate(state) => state.execute(ctx),
            Scratch::SumProduct(state) => return state.execute(ctx, env),
            Scratch::Finite(state) => state.execute(*id, ctx),
            Scratch::Choice(state) => state.execute(ctx),
            Scratch::IfError(state) => state.execute(ctx),
            Scratch::Leaf => {}
        },
        (kind, _) => execute_leaf(kind, ctx, env),
    }
    true
}

fn publish(ctx: &mut ExecutionContext, value: impl Into<ScalarGenerator>, extent: Size) {
    ctx.returned_value = value.into();
    ctx.returned_extent = extent;
}

fn execute_leaf(kind: &NodeKind, ctx: &mut ExecutionContext, env: &Env<'_>) {
    match kind {
        NodeKind::Scalar(value) => publish(ctx, value.clone(), Size::ONE),
        NodeKind::Array(array) => {
            let extent = array.size();
            publish(ctx, ScalarGenerator::Array(array.clone()), extent);
        }
        NodeKind::ParseError { error, .. } => publish(ctx, *error, Size::ONE),
        NodeKind::Reference(index) => {
            let at = ctx.at();
            let reference = ctx.references().get(*index).copied();
            match reference {
                Some(Reference::Cell(cell)) if cell.is_dereferencable(at) => {
                    publish(ctx, ScalarGenerator::Point(cell.dereference(at)), Size::ONE);
                }
                Some(r) if r.is_dereferencable(at) => {
                    // Whole rows and columns of an empty grid still address one cell.
                    let grid = env.grid.size();
                    let bounds = Size::new(grid.width.max(1), grid.height.max(1));
                    match r.to_rect(at, bounds) {
                        Some(rect) => publish(ctx, ScalarGenerator::Rect(rect), rect.size),
                        None => publish(ctx, CellError::InvalidReference, Size::ONE),
                    }
                }
                _ => publish(ctx, CellError::InvalidReference, Size::ONE),
            }
        }
        NodeKind::Function { .. } => {}
    }
}
