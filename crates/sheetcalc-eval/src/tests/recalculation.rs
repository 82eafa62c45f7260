//! Tests for dependency-ordered recalculation and cycle handling.

use sheetcalc_common::{CellError, Scalar};

use super::{err, n, pt, sheet_with};
use crate::sheet::Sheet;

#[test]
fn test_sum_follows_its_inputs() {
    let mut sheet = sheet_with(&[("A1", "3"), ("A2", "4"), ("A3", "=SUM(A1:A2)")]);
    assert_eq!(sheet.value(pt("A3")), n(7.0));
    sheet.set_value_cell(pt("A2"), 2.0).unwrap();
    assert_eq!(sheet.value(pt("A3")), n(5.0));
}

#[test]
fn test_dependencies_are_calculated_first() {
    let mut sheet = Sheet::new();
    sheet.set_formula_cell(pt("A1"), "=A2+1").unwrap();
    sheet.set_formula_cell(pt("A2"), "=A3+1").unwrap();
    assert_eq!(sheet.value(pt("A1")), n(2.0));
    sheet.set_value_cell(pt("A3"), 1.0).unwrap();
    assert_eq!(sheet.value(pt("A2")), n(2.0));
    assert_eq!(sheet.value(pt("A1")), n(3.0));
}

#[test]
fn test_long_reverse_chain() {
    let mut sheet = Sheet::new();
    sheet.batch(|s| {
        for y in 0..199u32 {
            let text = format!("=A{}+1", y + 2);
            s.set_formula_cell(sheetcalc_common::Point::new(0, y), &text).unwrap();
        }
        s.set_value_cell(sheetcalc_common::Point::new(0, 199), 1.0).unwrap();
    });
    assert_eq!(sheet.value(pt("A1")), n(200.0));
    assert_eq!(sheet.value(pt("A100")), n(101.0));
}

#[test]
fn test_recalculation_is_idempotent() {
    let mut sheet = sheet_with(&[
        ("A1", "2"),
        ("B1", "=A1*A1"),
        ("C1", "=B1+A1"),
        ("D1", "=AVERAGE(A1:C1)"),
    ]);
    let before: Vec<Scalar> = ["B1", "C1", "D1"].iter().map(|c| sheet.value(pt(c))).collect();
    sheet.recalculate();
    sheet.recalculate();
    let after: Vec<Scalar> = ["B1", "C1", "D1"].iter().map(|c| sheet.value(pt(c))).collect();
    assert_eq!(before, after);
    assert_eq!(after, vec![n(4.0), n(6.0), n(4.0)]);
}

#[test]
fn test_cycle_turns_every_member_into_ref_error() {
    let mut sheet = sheet_with(&[("A1", "=B1"), ("B1", "=C1+1"), ("C1", "=A1")]);
    for name in ["A1", "B1", "C1"] {
        assert_eq!(sheet.value(pt(name)), err(CellError::InvalidReference), "{name}");
    }

    sheet.set_formula_cell(pt("D1"), "=A1+1").unwrap();
    assert_eq!(sheet.value(pt("D1")), err(CellError::InvalidReference));

    sheet.set_value_cell(pt("C1"), 5.0).unwrap();
    assert_eq!(sheet.value(pt("B1")), n(6.0));
    assert_eq!(sheet.value(pt("A1")), n(6.0));
    assert_eq!(sheet.value(pt("D1")), n(7.0));
}

#[test]
fn test_self_reference() {
    let sheet = sheet_with(&[("A1", "=A1+1")]);
    assert_eq!(sheet.value(pt("A1")), err(CellError::InvalidReference));
}

#[test]
fn test_sum_over_its_own_reader_is_circular() {
    let sheet = sheet_with(&[
        ("A2", "2"),
        ("A3", "=SUM(A1:A2)"),
        ("A4", "=A3+1"),
        ("A1", "=A4/2"),
    ]);
    for name in ["A1", "A3", "A4"] {
        assert_eq!(sheet.value(pt(name)), err(CellError::InvalidReference), "{name}");
    }
    assert_eq!(sheet.value(pt("A2")), n(2.0));
}

#[test]
fn test_conditionals() {
    let sheet = sheet_with(&[
        ("A1", "1"),
        ("A2", "2"),
        ("A3", "3"),
        ("B1", "=IF(A1>1, \"y\", \"n\")"),
        ("C1", "=IF(A1:A3>1, \"y\", \"n\")"),
        ("D1", "=CHOOSE(A2, 10, 20, 30)"),
        ("D2", "=CHOOSE(4, 10, 20, 30)"),
        ("D3", "=IFERROR(1/0, -1)"),
        ("D4", "=IFERROR(A3, -1)"),
        ("D5", "=IF(FALSE, 1)"),
    ]);
    assert_eq!(sheet.value(pt("B1")), Scalar::text("n"));
    assert_eq!(sheet.value(pt("C1")), Scalar::text("n"));
    assert_eq!(sheet.value(pt("C2")), Scalar::text("y"));
    assert_eq!(sheet.value(pt("C3")), Scalar::text("y"));
    assert_eq!(sheet.value(pt("D1")), n(20.0));
    assert_eq!(sheet.value(pt("D2")), err(CellError::InvalidValue));
    assert_eq!(sheet.value(pt("D3")), n(-1.0));
    assert_eq!(sheet.value(pt("D4")), n(3.0));
    assert_eq!(sheet.value(pt("D5")), Scalar::Bool(false));
}

#[test]
fn test_sumproduct() {
    let sheet = sheet_with(&[
        ("A1", "1"),
        ("A2", "2"),
        ("A3", "3"),
        ("B1", "4"),
        ("B2", "5"),
        ("B3", "6"),
        ("C1", "=SUMPRODUCT(A1:A3, B1:B3)"),
        ("C2", "=SUMPRODUCT(A1:A3, B1:B2)"),
    ]);
    assert_eq!(sheet.value(pt("C1")), n(32.0));
    assert_eq!(sheet.value(pt("C2")), err(CellError::InvalidValue));
}

#[test]
fn test_errors_propagate_through_arithmetic() {
    let sheet = sheet_with(&[("A1", "=1/0"), ("A2", "=A1+1"), ("A3", "=SUM(A1:A2)")]);
    assert_eq!(sheet.value(pt("A1")), err(CellError::DivisionByZero));
    assert_eq!(sheet.value(pt("A2")), err(CellError::DivisionByZero));
    assert_eq!(sheet.value(pt("A3")), err(CellError::DivisionByZero));
}

#[test]
fn test_suspended_sheet_keeps_old_values() {
    let mut sheet = sheet_with(&[("A1", "1"), ("A2", "=A1*2")]);
    sheet.suspend_recalc();
    sheet.set_value_cell(pt("A1"), 5.0).unwrap();
    assert_eq!(sheet.value(pt("A2")), n(2.0));
    sheet.resume_recalc().unwrap();
    assert_eq!(sheet.value(pt("A2")), n(10.0));
}
