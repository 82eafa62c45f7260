mod recalculation;
mod structure;

use sheetcalc_common::{CellError, Point, Scalar};

use crate::sheet::Sheet;

pub(crate) fn pt(name: &str) -> Point {
    sheetcalc_common::parse_point(name).expect("valid cell name")
}

pub(crate) fn n(x: f64) -> Scalar {
    Scalar::Number(x)
}

pub(crate) fn err(e: CellError) -> Scalar {
    Scalar::Error(e)
}

/// Fill cells from `(name, text)` pairs; text starting with `=` is a
/// formula, anything else a number.
pub(crate) fn sheet_with(cells: &[(&str, &str)]) -> Sheet {
    #[cfg(feature = "tracing")]
    crate::init_tracing();
    let mut sheet = Sheet::new();
    sheet.batch(|s| {
        for &(name, text) in cells {
            if text.starts_with('=') {
                s.set_formula_cell(pt(name), text).unwrap();
            } else {
                s.set_value_cell(pt(name), text.parse::<f64>().unwrap()).unwrap();
            }
        }
    });
    sheet
}

pub(crate) fn text_of(sheet: &Sheet, name: &str) -> String {
    sheet.formula_info(pt(name)).expect("formula cell").text
}
