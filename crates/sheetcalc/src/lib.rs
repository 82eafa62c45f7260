//! Meta crate that re-exports the sheetcalc layers. Depend on this crate
//! and pick layers with feature flags; `eval` (the default) brings in
//! everything.

#[cfg(feature = "common")]
pub use sheetcalc_common as common;

#[cfg(feature = "parse")]
pub use sheetcalc_parse as parse;

#[cfg(feature = "eval")]
pub use sheetcalc_eval as eval;

#[cfg(feature = "common")]
pub use sheetcalc_common::{
    CellError, MAX_SIZE, Point, Rect, Scalar, Size, index_to_column, index_to_row, parse_area,
    parse_column, parse_point, parse_row,
};

#[cfg(feature = "parse")]
pub use sheetcalc_parse::{Formula, FormulaReferences};

#[cfg(feature = "eval")]
pub use sheetcalc_eval::{FormulaInfo, LengthInfo, Sheet, SheetConfig, SheetError};
