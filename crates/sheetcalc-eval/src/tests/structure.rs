//! Tests for row and column insertion and deletion.

use sheetcalc_common::{CellError, Rect, Scalar, Size};

use super::{err, n, pt, sheet_with, text_of};
use crate::sheet::LengthInfo;

#[test]
fn test_deleting_a_referenced_column() {
    let mut sheet = sheet_with(&[("D1", "0"), ("A1", "=D1+3")]);
    assert_eq!(sheet.value(pt("A1")), n(3.0));
    sheet.delete_columns(3, 1).unwrap();
    assert_eq!(sheet.value(pt("A1")), err(CellError::InvalidReference));
    assert_eq!(text_of(&sheet, "A1"), "#REF! + 3");
}

#[test]
fn test_deleting_rows_between_formula_and_target() {
    let mut sheet = sheet_with(&[("A20", "7"), ("B1", "=A20+3")]);
    sheet.delete_rows(4, 4).unwrap();
    assert_eq!(text_of(&sheet, "B1"), "A16 + 3");
    assert_eq!(sheet.value(pt("A16")), n(7.0));
    assert_eq!(sheet.value(pt("B1")), n(10.0));
}

#[test]
fn test_deleting_inside_a_range_shrinks_it() {
    let mut sheet = sheet_with(&[("A3", "1"), ("A5", "100"), ("A10", "2"), ("B1", "=SUM(A3:A10)")]);
    assert_eq!(sheet.value(pt("B1")), n(103.0));
    sheet.delete_rows(4, 4).unwrap();
    assert_eq!(text_of(&sheet, "B1"), "SUM(A3:A6)");
    assert_eq!(sheet.value(pt("B1")), n(3.0));
}

#[test]
fn test_formulas_below_a_deletion_move_up() {
    let mut sheet = sheet_with(&[("A1", "2"), ("A3", "=1"), ("A10", "=A1*2")]);
    assert_eq!(sheet.formula_count(), 2);
    sheet.delete_rows(1, 3).unwrap();
    assert_eq!(sheet.formula_count(), 1);
    assert_eq!(text_of(&sheet, "A7"), "A1 * 2");
    assert_eq!(sheet.value(pt("A7")), n(4.0));
    assert_eq!(sheet.value(pt("A10")), Scalar::Blank);
}

#[test]
fn test_insertion_shifts_cells_and_grows_ranges() {
    let mut sheet = sheet_with(&[("A1", "1"), ("A2", "=A1+1"), ("B1", "=SUM(A1:A3)")]);
    assert_eq!(sheet.value(pt("B1")), n(3.0));
    sheet.insert_rows(1, 2).unwrap();
    assert_eq!(text_of(&sheet, "A4"), "A1 + 1");
    assert_eq!(text_of(&sheet, "B1"), "SUM(A1:A5)");
    assert_eq!(sheet.value(pt("A4")), n(2.0));
    assert_eq!(sheet.value(pt("B1")), n(3.0));

    sheet.insert_columns(0, 1).unwrap();
    assert_eq!(text_of(&sheet, "C1"), "SUM(B1:B5)");
    assert_eq!(sheet.value(pt("B4")), n(2.0));
}

#[test]
fn test_insertion_keeps_spills_intact() {
    let mut sheet = sheet_with(&[("C2", "={1;2}"), ("A1", "={1;2;3}")]);
    sheet.insert_rows(0, 1).unwrap();
    assert_eq!(sheet.value(pt("C3")), n(1.0));
    assert_eq!(sheet.value(pt("C4")), n(2.0));
    assert_eq!(sheet.value(pt("C2")), Scalar::Blank);
    assert_eq!(sheet.formula_info(pt("C3")).unwrap().extent, Size::new(1, 2));

    // A2 now anchors a spill over A2:A4; a row inserted below A2 splits it.
    sheet.insert_rows(2, 1).unwrap();
    let values: Vec<Scalar> = ["A2", "A3", "A4", "A5"].iter().map(|c| sheet.value(pt(c))).collect();
    assert_eq!(values, vec![n(1.0), n(2.0), n(3.0), Scalar::Blank]);
}

#[test]
fn test_deleting_through_a_spill_respills() {
    let mut sheet = sheet_with(&[("A1", "={1;2;3;4}")]);
    sheet.delete_rows(1, 2).unwrap();
    let values: Vec<Scalar> = ["A1", "A2", "A3", "A4"].iter().map(|c| sheet.value(pt(c))).collect();
    assert_eq!(values, vec![n(1.0), n(2.0), n(3.0), n(4.0)]);
}

#[test]
fn test_length_metadata_follows_structure_edits() {
    let mut sheet = sheet_with(&[]);
    sheet.set_row_height(2, 3, 20.0).unwrap();
    sheet.hide_row(3, 1).unwrap();
    assert_eq!(sheet.row_height(4), 20.0);
    assert_eq!(sheet.row_height(5), 15.0);
    assert!(sheet.is_row_hidden(3));
    assert_eq!(sheet.row_height(3), 20.0);

    sheet.insert_rows(0, 2).unwrap();
    assert_eq!(sheet.row_height(6), 20.0);
    assert_eq!(sheet.row_height(7), 15.0);
    assert!(sheet.is_row_hidden(5));

    sheet.delete_rows(0, 2).unwrap();
    assert!(sheet.is_row_hidden(3));
    sheet.clear_row_height(2, 3).unwrap();
    assert_eq!(sheet.row_height(3), 15.0);
    assert!(sheet.is_row_hidden(3));
    assert_eq!(sheet.row_info(2), LengthInfo::default());

    sheet.unhide_row(3, 1).unwrap();
    let default = LengthInfo::default();
    assert_eq!(sheet.row_infos(0, 10).collect::<Vec<_>>(), vec![(0, 10, &default)]);
}

#[test]
fn test_column_widths() {
    let mut sheet = sheet_with(&[]);
    sheet.set_column_width(1, 2, 100.0).unwrap();
    sheet.delete_columns(0, 2).unwrap();
    assert_eq!(sheet.column_width(0), 100.0);
    assert_eq!(sheet.column_width(1), 64.0);
}

#[test]
fn test_parse_area_uses_sheet_size() {
    let sheet = sheet_with(&[("A10", "1")]);
    assert_eq!(sheet.parse_area("B:C"), Some(Rect::from_xywh(1, 0, 2, 10)));
    assert_eq!(sheet.parse_area("C3:A1"), Some(Rect::from_xywh(0, 0, 3, 3)));
    assert_eq!(sheet.parse_area("nope"), None);
}
