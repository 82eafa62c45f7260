//! Sparse cell storage, resumable formula evaluation and demand-driven
//! recalculation.
//!
//! [`Sheet`] is the entry point; the lower layers are public for callers
//! that want to drive evaluation themselves.

pub mod builtins;
pub mod cell_grid;
pub mod evaluator;
pub mod execution_context;
pub mod formula_cells;
pub mod interval_map;
pub mod sheet;

#[cfg(test)]
mod tests;

pub use cell_grid::{CellGrid, CellOp, CellTransformer, Slot};
pub use evaluator::FormulaEvaluator;
pub use execution_context::{AggregateFlags, Env, ExecutionContext, ScalarGenerator};
pub use formula_cells::{Cell, FormulaCell, FormulaCells, FormulaId};
pub use interval_map::{IntervalMap, Intervals};
pub use sheet::{FormulaInfo, LengthInfo, Sheet, SheetConfig, SheetError};

pub use sheetcalc_common::{
    CellError, MAX_SIZE, Point, Rect, Scalar, Size, SizeType, index_to_column, index_to_row,
    parse_area, parse_column, parse_point, parse_row,
};

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Does nothing when
/// `RUST_LOG` is unset or a global subscriber is already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    if std::env::var("RUST_LOG").is_err() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
