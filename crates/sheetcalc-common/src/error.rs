//! Spreadsheet error values.
//!
//! A [`CellError`] is an ordinary value: it flows through expressions inside
//! [`crate::Scalar::Error`] and is never turned into a Rust `Err`.

use std::fmt;

/// The closed set of spreadsheet error codes.
///
/// Discriminants follow the `ERROR.TYPE` numbering so the function can simply
/// cast them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellError {
    NullRange = 1,
    DivisionByZero,
    InvalidValue,
    InvalidReference,
    InvalidName,
    NotANumber,
    InvalidArgs,
    GettingData,
    Spill,
    InvalidFormula,
}

impl CellError {
    pub const ALL: [CellError; 10] = [
        CellError::NullRange,
        CellError::DivisionByZero,
        CellError::InvalidValue,
        CellError::InvalidReference,
        CellError::InvalidName,
        CellError::NotANumber,
        CellError::InvalidArgs,
        CellError::GettingData,
        CellError::Spill,
        CellError::InvalidFormula,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullRange => "#NULL!",
            Self::DivisionByZero => "#DIV/0!",
            Self::InvalidValue => "#VALUE!",
            Self::InvalidReference => "#REF!",
            Self::InvalidName => "#NAME?",
            Self::NotANumber => "#NUM!",
            Self::InvalidArgs => "#N/A",
            Self::GettingData => "#GETTING_DATA",
            Self::Spill => "#SPILL!",
            Self::InvalidFormula => "#ERROR!",
        }
    }

    /// Numeric code reported by `ERROR.TYPE`.
    pub const fn type_code(self) -> u8 {
        self as u8
    }

    /// Case-insensitive inverse of [`CellError::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
