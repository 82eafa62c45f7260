use std::f64::consts::PI;
use std::rc::Rc;

use smallvec::SmallVec;
use sheetcalc_common::{CellError, Scalar, Size};
use sheetcalc_parse::{FunctionId, Outcome};

use super::operators::power;
use crate::execution_context::{Env, ExecutionContext};

/// Arguments of a fixed-arity function, generated at the current offset.
#[derive(Debug)]
pub struct FiniteState {
    args: SmallVec<[Scalar; 3]>,
    extent: Size,
}

impl Default for FiniteState {
    fn default() -> Self {
        Self {
            args: SmallVec::new(),
            extent: Size::ONE,
        }
    }
}

impl FiniteState {
    pub(super) fn after_argument(&mut self, ctx: &mut ExecutionContext, env: &mut Env<'_>) -> Outcome {
        if !ctx.suppress_evaluation {
            let Some((value, _)) = ctx.generate_returned(env) else {
                return Outcome::Pause;
            };
            self.args.push(value);
        }
        self.extent.extend_to(ctx.returned_extent);
        Outcome::Continue
    }

    pub(super) fn execute(&mut self, id: FunctionId, ctx: &mut ExecutionContext) {
        if !ctx.suppress_evaluation {
            ctx.returned_value = call_scalar_function(id, &self.args).into();
        }
        ctx.returned_extent = self.extent;
    }
}

fn numeric(arg: &Scalar, f: impl FnOnce(f64) -> Result<f64, CellError>) -> Scalar {
    match arg.to_number().and_then(f) {
        Ok(n) => Scalar::number(n),
        Err(e) => Scalar::Error(e),
    }
}

fn numeric2(a: &Scalar, b: &Scalar, f: impl FnOnce(f64, f64) -> Result<f64, CellError>) -> Scalar {
    let result = a
        .to_number()
        .and_then(|x| b.to_number().map(|y| (x, y)))
        .and_then(|(x, y)| f(x, y));
    match result {
        Ok(n) => Scalar::number(n),
        Err(e) => Scalar::Error(e),
    }
}

fn textual(arg: &Scalar, f: impl FnOnce(&str) -> Scalar) -> Scalar {
    match arg.to_text() {
        Ok(s) => f(&s),
        Err(e) => Scalar::Error(e),
    }
}

/// Round half away from zero to `digits` decimal places (negative digits
/// round to tens, hundreds, ...).
fn round_to(n: f64, digits: f64) -> f64 {
    let digits = digits.trunc().clamp(-308.0, 308.0) as i32;
    let factor = 10f64.powi(digits.abs());
    if digits >= 0 {
        (n * factor).round() / factor
    } else {
        (n / factor).round() * factor
    }
}

/// Collapse runs of spaces and strip leading/trailing ones.
fn trim_spaces(s: &str) -> String {
    s.split(' ').filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Evaluate a fixed-arity function on already generated arguments.
pub fn call_scalar_function(id: FunctionId, args: &[Scalar]) -> Scalar {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Scalar::Blank);
    match id {
        /* ─────────────────────────── numeric ─────────────────────────── */
        FunctionId::Abs => numeric(&arg(0), |n| Ok(n.abs())),
        FunctionId::Int => numeric(&arg(0), |n| Ok(n.floor())),
        FunctionId::Sign => numeric(&arg(0), |n| {
            Ok(if n > 0.0 {
                1.0
            } else if n < 0.0 {
                -1.0
            } else {
                0.0
            })
        }),
        FunctionId::Sqrt => numeric(&arg(0), |n| {
            if n < 0.0 {
                Err(CellError::NotANumber)
            } else {
                Ok(n.sqrt())
            }
        }),
        FunctionId::Mod => numeric2(&arg(0), &arg(1), |a, b| {
            if b == 0.0 {
                Err(CellError::DivisionByZero)
            } else {
                Ok(a - b * (a / b).floor())
            }
        }),
        FunctionId::Power => numeric2(&arg(0), &arg(1), power),
        FunctionId::Round => numeric2(&arg(0), &arg(1), |n, d| Ok(round_to(n, d))),
        FunctionId::Pi => Scalar::Number(PI),

        /* ─────────────────────────── logical ─────────────────────────── */
        FunctionId::Not => match arg(0).to_bool() {
            Ok(b) => Scalar::Bool(!b),
            Err(e) => Scalar::Error(e),
        },
        FunctionId::True => Scalar::Bool(true),
        FunctionId::False => Scalar::Bool(false),

        /* ─────────────────────────── text ─────────────────────────── */
        FunctionId::Len => textual(&arg(0), |s| Scalar::Number(s.chars().count() as f64)),
        FunctionId::Upper => textual(&arg(0), |s| Scalar::Text(Rc::from(s.to_uppercase()))),
        FunctionId::Lower => textual(&arg(0), |s| Scalar::Text(Rc::from(s.to_lowercase()))),
        FunctionId::Trim => textual(&arg(0), |s| Scalar::Text(Rc::from(trim_spaces(s)))),

        /* ─────────────────────────── info ─────────────────────────── */
        FunctionId::IsBlank => Scalar::Bool(arg(0).is_blank()),
        FunctionId::IsNumber => Scalar::Bool(matches!(arg(0), Scalar::Number(_))),
        FunctionId::IsText => Scalar::Bool(matches!(arg(0), Scalar::Text(_))),
        FunctionId::IsLogical => Scalar::Bool(matches!(arg(0), Scalar::Bool(_))),
        FunctionId::IsError => Scalar::Bool(arg(0).is_error()),
        FunctionId::IsErr => Scalar::Bool(arg(0).as_error().is_some_and(|e| e != CellError::InvalidArgs)),
        FunctionId::IsNa => Scalar::Bool(arg(0).as_error() == Some(CellError::InvalidArgs)),
        FunctionId::ErrorType => match arg(0).as_error() {
            Some(e) => Scalar::Number(e.type_code() as f64),
            None => Scalar::Error(CellError::InvalidArgs),
        },
        FunctionId::Na => Scalar::Error(CellError::InvalidArgs),
        _ => {
            debug_assert!(false, "{} is not a scalar function", id.name());
            Scalar::Error(CellError::InvalidFormula)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: FunctionId, args: &[Scalar]) -> Scalar {
        call_scalar_function(id, args)
    }

    fn n(x: f64) -> Scalar {
        Scalar::Number(x)
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call(FunctionId::Abs, &[n(-2.5)]), n(2.5));
        assert_eq!(call(FunctionId::Int, &[n(-2.5)]), n(-3.0));
        assert_eq!(call(FunctionId::Sign, &[Scalar::text("-7")]), n(-1.0));
        assert_eq!(call(FunctionId::Sqrt, &[n(-1.0)]), Scalar::Error(CellError::NotANumber));
        assert_eq!(call(FunctionId::Mod, &[n(-3.0), n(2.0)]), n(1.0));
        assert_eq!(call(FunctionId::Mod, &[n(3.0), n(0.0)]), Scalar::Error(CellError::DivisionByZero));
        assert_eq!(call(FunctionId::Power, &[n(3.0), n(2.0)]), n(9.0));
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(call(FunctionId::Round, &[n(2.5)]), n(3.0));
        assert_eq!(call(FunctionId::Round, &[n(-2.5)]), n(-3.0));
        assert_eq!(call(FunctionId::Round, &[n(1234.5678), n(2.0)]), n(1234.57));
        assert_eq!(call(FunctionId::Round, &[n(1250.0), n(-2.0)]), n(1300.0));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(call(FunctionId::Len, &[n(12.5)]), n(4.0));
        assert_eq!(call(FunctionId::Upper, &[Scalar::text("abc")]), Scalar::text("ABC"));
        assert_eq!(call(FunctionId::Trim, &[Scalar::text("  a   b ")]), Scalar::text("a b"));
        assert_eq!(
            call(FunctionId::Lower, &[Scalar::Error(CellError::NullRange)]),
            Scalar::Error(CellError::NullRange)
        );
    }

    #[test]
    fn test_info_functions_do_not_propagate_errors() {
        let na = Scalar::Error(CellError::InvalidArgs);
        let div = Scalar::Error(CellError::DivisionByZero);
        assert_eq!(call(FunctionId::IsError, &[na.clone()]), Scalar::Bool(true));
        assert_eq!(call(FunctionId::IsErr, &[na.clone()]), Scalar::Bool(false));
        assert_eq!(call(FunctionId::IsErr, &[div.clone()]), Scalar::Bool(true));
        assert_eq!(call(FunctionId::IsNa, &[na]), Scalar::Bool(true));
        assert_eq!(call(FunctionId::ErrorType, &[div]), n(2.0));
        assert_eq!(call(FunctionId::ErrorType, &[n(1.0)]), Scalar::Error(CellError::InvalidArgs));
        assert_eq!(call(FunctionId::IsBlank, &[Scalar::Blank]), Scalar::Bool(true));
        assert_eq!(call(FunctionId::IsText, &[Scalar::text("")]), Scalar::Bool(true));
    }

    #[test]
    fn test_constants() {
        assert_eq!(call(FunctionId::Pi, &[]), n(PI));
        assert_eq!(call(FunctionId::Na, &[]), Scalar::Error(CellError::InvalidArgs));
        assert_eq!(call(FunctionId::Not, &[Scalar::Blank]), Scalar::Bool(true));
    }
}
