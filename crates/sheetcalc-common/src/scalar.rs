use std::fmt::{self, Display};
use std::rc::Rc;

use crate::CellError;

/// A single spreadsheet value and the unit of value exchange between
/// formulas.
#[derive(Debug, Clone, Default)]
pub enum Scalar {
    #[default]
    Blank,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    Error(CellError),
}

impl Scalar {
    /// Wrap a computed number, degrading NaN and infinities to `#NUM!`.
    pub fn number(n: f64) -> Scalar {
        if n.is_finite() {
            Scalar::Number(n)
        } else {
            Scalar::Error(CellError::NotANumber)
        }
    }

    pub fn text(s: impl AsRef<str>) -> Scalar {
        Scalar::Text(Rc::from(s.as_ref()))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Scalar::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<CellError> {
        match self {
            Scalar::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /* ───────────────────────── coercions ───────────────────────── */

    /// Numeric view of the value as used by arithmetic operators.
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            Scalar::Blank => Ok(0.0),
            Scalar::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Scalar::Number(n) => Ok(*n),
            Scalar::Text(s) => parse_number_text(s).ok_or(CellError::InvalidValue),
            Scalar::Error(e) => Err(*e),
        }
    }

    /// Logical view of the value as used by `IF`, `AND`, `NOT`, ...
    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            Scalar::Blank => Ok(false),
            Scalar::Bool(b) => Ok(*b),
            Scalar::Number(n) => Ok(*n != 0.0),
            Scalar::Text(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Ok(false)
                } else {
                    Err(CellError::InvalidValue)
                }
            }
            Scalar::Error(e) => Err(*e),
        }
    }

    /// Textual view of the value as used by `&` and the string functions.
    pub fn to_text(&self) -> Result<Rc<str>, CellError> {
        match self {
            Scalar::Text(s) => Ok(s.clone()),
            Scalar::Error(e) => Err(*e),
            other => Ok(Rc::from(other.to_string())),
        }
    }

    /// Append the formula-source form of the value.
    pub fn reconstruct(&self, dest: &mut String) {
        match self {
            Scalar::Blank => {}
            Scalar::Bool(b) => dest.push_str(if *b { "TRUE" } else { "FALSE" }),
            Scalar::Number(n) => dest.push_str(&format_number(*n)),
            Scalar::Text(s) => {
                dest.push('"');
                for c in s.chars() {
                    if c == '"' {
                        dest.push('"');
                    }
                    dest.push(c);
                }
                dest.push('"');
            }
            Scalar::Error(e) => dest.push_str(e.as_str()),
        }
    }
}

/// Shortest round-trip rendering; negative zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{n}")
}

/// Parse text the way a cell entry would be read as a number. Rejects the
/// `inf`/`nan` spellings Rust itself accepts.
pub fn parse_number_text(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty()
        || !s.bytes().any(|b| b.is_ascii_digit())
        || !s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'+' | b'-' | b'e' | b'E'))
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Blank => Ok(()),
            Scalar::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Scalar::Number(n) => f.write_str(&format_number(*n)),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Error(e) => write!(f, "{e}"),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Blank, Scalar::Blank) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => a == b,
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::Error(a), Scalar::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::number(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::text(s)
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(Rc::from(s))
    }
}

impl From<CellError> for Scalar {
    fn from(e: CellError) -> Self {
        Scalar::Error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_render_shortest() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.23), "-0.23");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(4.77), "4.77");
    }

    #[test]
    fn test_text_coerces_to_number_only_when_numeric() {
        assert_eq!(Scalar::text(" 12.5 ").to_number(), Ok(12.5));
        assert_eq!(Scalar::text("abc").to_number(), Err(CellError::InvalidValue));
        assert_eq!(Scalar::text("inf").to_number(), Err(CellError::InvalidValue));
        assert_eq!(Scalar::Blank.to_number(), Ok(0.0));
        assert_eq!(Scalar::Bool(true).to_number(), Ok(1.0));
    }

    #[test]
    fn test_errors_propagate_through_coercion() {
        let e = Scalar::Error(CellError::DivisionByZero);
        assert_eq!(e.to_number(), Err(CellError::DivisionByZero));
        assert_eq!(e.to_bool(), Err(CellError::DivisionByZero));
        assert_eq!(e.to_text(), Err(CellError::DivisionByZero));
    }

    #[test]
    fn test_text_reconstruction_doubles_quotes() {
        let mut out = String::new();
        Scalar::text("say \"hi\"").reconstruct(&mut out);
        assert_eq!(out, "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_non_finite_numbers_become_num_error() {
        assert_eq!(Scalar::number(f64::INFINITY), Scalar::Error(CellError::NotANumber));
        assert_eq!(Scalar::from(1.5), Scalar::Number(1.5));
    }
}
