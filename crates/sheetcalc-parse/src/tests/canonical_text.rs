//! Tests for parse → reconstruct round trips of whole formulas.
use crate::ast::{Formula, NodeKind};
use sheetcalc_common::{CellError, Point};

fn canon_at(text: &str, at: Point) -> String {
    let (formula, refs) = Formula::parse(text, at);
    formula.reconstruct(&refs, at)
}

fn canon(text: &str) -> String {
    canon_at(text, Point::new(0, 0))
}

#[test]
fn test_numbers_are_normalised() {
    assert_eq!(canon("+5. + -000.23"), "5 + -0.23");
    assert_eq!(canon("=1.50E+2"), "150");
    assert_eq!(canon("0.1+0.2"), "0.1 + 0.2");
}

#[test]
fn test_canonical_text_is_a_fixed_point() {
    for text in [
        "+5. + -000.23",
        "SUM(A1:B3,  $C$4, 7:9, D:E)",
        "IF(A1>=2,\"big\",\"small\")&\"!\"",
        "-(1+2)^2%",
        "{1,2,3;4,5,6}*2",
        "CHOOSE(2, #N/A, TRUE, \"x\")",
    ] {
        let once = canon(text);
        assert_eq!(canon(&once), once, "not stable: {text}");
    }
}

#[test]
fn test_relative_references_follow_the_anchor() {
    let (formula, refs) = Formula::parse("A1+$A$1+A$1", Point::new(1, 1));
    assert_eq!(formula.reconstruct(&refs, Point::new(1, 1)), "A1 + $A$1 + A$1");
    assert_eq!(formula.reconstruct(&refs, Point::new(3, 4)), "C4 + $A$1 + C$1");
    // Pushed off the grid: rendered as an invalid reference.
    assert_eq!(formula.reconstruct(&refs, Point::new(0, 0)), "#REF! + $A$1 + #REF!");
}

#[test]
fn test_unparsable_formula_keeps_its_text() {
    let (formula, refs) = Formula::parse("=1+*2", Point::new(0, 0));
    assert!(refs.is_empty());
    assert!(matches!(
        formula.root().kind,
        NodeKind::ParseError {
            error: CellError::InvalidFormula,
            ..
        }
    ));
    assert_eq!(formula.reconstruct(&refs, Point::new(0, 0)), "1+*2");
}

#[test]
fn test_name_errors_keep_their_text() {
    assert_eq!(canon("1 + nosuch(A1,  2)"), "1 + nosuch(A1,  2)");
    assert_eq!(canon("foo+1"), "foo + 1");
}
