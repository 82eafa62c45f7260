use std::cmp::Ordering;
use std::rc::Rc;

use sheetcalc_common::{CellError, Scalar, Size};
use sheetcalc_parse::{FunctionId, Outcome};

use crate::execution_context::{Env, ExecutionContext};

/* ─────────────────────────── binary operators ─────────────────────────── */

#[derive(Debug, Default)]
pub struct BinaryState {
    first: Scalar,
    result: Scalar,
    extent: Size,
}

impl BinaryState {
    pub(super) fn after_argument(
        &mut self,
        id: FunctionId,
        ctx: &mut ExecutionContext,
        env: &mut Env<'_>,
        index: usize,
    ) -> Outcome {
        debug_assert!(index < 2);
        if !ctx.suppress_evaluation {
            let Some((value, _)) = ctx.generate_returned(env) else {
                return Outcome::Pause;
            };
            if index == 0 {
                self.first = value;
            } else {
                self.result = binary_operator(id, &self.first, &value);
            }
        }
        if index == 0 {
            self.extent = ctx.returned_extent;
        } else {
            self.extent.extend_to(ctx.returned_extent);
        }
        Outcome::Continue
    }

    pub(super) fn execute(&mut self, ctx: &mut ExecutionContext) {
        if !ctx.suppress_evaluation {
            ctx.returned_value = std::mem::take(&mut self.result).into();
        }
        ctx.returned_extent = self.extent;
    }
}

/// Apply an infix operator to two already generated operands. The left
/// operand's error wins.
pub fn binary_operator(id: FunctionId, lhs: &Scalar, rhs: &Scalar) -> Scalar {
    match id {
        FunctionId::Add => arithmetic(lhs, rhs, |a, b| Ok(a + b)),
        FunctionId::Subtract => arithmetic(lhs, rhs, |a, b| Ok(a - b)),
        FunctionId::Multiply => arithmetic(lhs, rhs, |a, b| Ok(a * b)),
        FunctionId::Divide => arithmetic(lhs, rhs, |a, b| {
            if b == 0.0 {
                Err(CellError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
        FunctionId::Exponent => arithmetic(lhs, rhs, power),
        FunctionId::Ampersand => match (lhs.to_text(), rhs.to_text()) {
            (Err(e), _) | (_, Err(e)) => Scalar::Error(e),
            (Ok(a), Ok(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(&a);
                joined.push_str(&b);
                Scalar::Text(Rc::from(joined))
            }
        },
        FunctionId::Equals => comparison(lhs, rhs, Ordering::is_eq),
        FunctionId::NotEquals => comparison(lhs, rhs, Ordering::is_ne),
        FunctionId::Less => comparison(lhs, rhs, Ordering::is_lt),
        FunctionId::LessEquals => comparison(lhs, rhs, Ordering::is_le),
        FunctionId::Greater => comparison(lhs, rhs, Ordering::is_gt),
        FunctionId::GreaterEquals => comparison(lhs, rhs, Ordering::is_ge),
        _ => {
            debug_assert!(false, "{} is not an infix operator", id.name());
            Scalar::Error(CellError::InvalidFormula)
        }
    }
}

fn arithmetic(
    lhs: &Scalar,
    rhs: &Scalar,
    op: impl FnOnce(f64, f64) -> Result<f64, CellError>,
) -> Scalar {
    let a = match lhs.to_number() {
        Ok(a) => a,
        Err(e) => return Scalar::Error(e),
    };
    let b = match rhs.to_number() {
        Ok(b) => b,
        Err(e) => return Scalar::Error(e),
    };
    match op(a, b) {
        Ok(n) => Scalar::number(n),
        Err(e) => Scalar::Error(e),
    }
}

pub(super) fn power(base: f64, exponent: f64) -> Result<f64, CellError> {
    if base == 0.0 {
        if exponent == 0.0 {
            return Err(CellError::NotANumber);
        }
        if exponent < 0.0 {
            return Err(CellError::DivisionByZero);
        }
    }
    Ok(base.powf(exponent))
}

fn comparison(lhs: &Scalar, rhs: &Scalar, test: fn(Ordering) -> bool) -> Scalar {
    match compare(lhs, rhs) {
        Ok(ordering) => Scalar::Bool(test(ordering)),
        Err(e) => Scalar::Error(e),
    }
}

/// Rank used when comparing values of different types.
fn type_rank(value: &Scalar) -> u8 {
    match value {
        Scalar::Number(_) | Scalar::Blank => 0,
        Scalar::Text(_) => 1,
        Scalar::Bool(_) => 2,
        Scalar::Error(_) => 3,
    }
}

/// Spreadsheet ordering: numbers before text before booleans, text
/// compared case-insensitively, a blank taking the type of the other side.
pub fn compare(lhs: &Scalar, rhs: &Scalar) -> Result<Ordering, CellError> {
    if let Scalar::Error(e) = lhs {
        return Err(*e);
    }
    if let Scalar::Error(e) = rhs {
        return Err(*e);
    }
    let ordering = match (lhs, rhs) {
        (Scalar::Blank, Scalar::Blank) => Ordering::Equal,
        (Scalar::Blank, Scalar::Text(s)) => compare_text("", s),
        (Scalar::Text(s), Scalar::Blank) => compare_text(s, ""),
        (Scalar::Blank, Scalar::Bool(b)) => false.cmp(b),
        (Scalar::Bool(b), Scalar::Blank) => b.cmp(&false),
        (Scalar::Blank, Scalar::Number(n)) => compare_numbers(0.0, *n),
        (Scalar::Number(n), Scalar::Blank) => compare_numbers(*n, 0.0),
        (Scalar::Number(a), Scalar::Number(b)) => compare_numbers(*a, *b),
        (Scalar::Text(a), Scalar::Text(b)) => compare_text(a, b),
        (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
        _ => type_rank(lhs).cmp(&type_rank(rhs)),
    };
    Ok(ordering)
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn compare_text(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        let a = a.bytes().map(|c| c.to_ascii_lowercase());
        let b = b.bytes().map(|c| c.to_ascii_lowercase());
        return a.cmp(b);
    }
    a.to_lowercase().cmp(&b.to_lowercase())
}

/* ─────────────────────────── unary operators ─────────────────────────── */

pub(super) fn unary_after_argument(
    id: FunctionId,
    value: &mut Scalar,
    ctx: &mut ExecutionContext,
    env: &mut Env<'_>,
) -> Outcome {
    if !ctx.suppress_evaluation {
        let Some((arg, _)) = ctx.generate_returned(env) else {
            return Outcome::Pause;
        };
        *value = unary_operator(id, &arg);
    }
    Outcome::Continue
}

/// The operand's extent is left in place.
pub(super) fn unary_execute(value: &mut Scalar, ctx: &mut ExecutionContext) {
    if !ctx.suppress_evaluation {
        ctx.returned_value = std::mem::take(value).into();
    }
}

pub fn unary_operator(id: FunctionId, arg: &Scalar) -> Scalar {
    let n = match arg.to_number() {
        Ok(n) => n,
        Err(e) => return Scalar::Error(e),
    };
    match id {
        FunctionId::Negate => Scalar::number(-n),
        FunctionId::Percent => Scalar::number(n / 100.0),
        _ => {
            debug_assert!(false, "{} is not a unary operator", id.name());
            Scalar::Error(CellError::InvalidFormula)
        }
    }
}
