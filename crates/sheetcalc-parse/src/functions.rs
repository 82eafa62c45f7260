//! Stable identifiers for operators and built-in functions.
//!
//! The parser resolves names through a lazily built dictionary; evaluation
//! dispatches on the id.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// How a function node consumes its arguments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FunctionKind {
    /// `a op b`; broadcasts over both operands.
    Infix,
    /// `op a`.
    Prefix,
    /// `a op`.
    Postfix,
    /// Folds every element of every argument into one value.
    Aggregator,
    /// Fixed-arity function applied per element; broadcasts.
    Scalar,
    /// Evaluates only some of its arguments (`IF`, `CHOOSE`, `IFERROR`).
    Control,
}

macro_rules! function_ids {
    ($( $id:ident => $name:literal, $kind:ident, $min:literal, $max:expr; )*) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum FunctionId {
            $( $id, )*
        }

        impl FunctionId {
            pub const ALL: &'static [FunctionId] = &[ $( FunctionId::$id, )* ];

            /// Source spelling: the operator symbol or the upper-case name.
            pub const fn name(self) -> &'static str {
                match self {
                    $( FunctionId::$id => $name, )*
                }
            }

            pub const fn kind(self) -> FunctionKind {
                match self {
                    $( FunctionId::$id => FunctionKind::$kind, )*
                }
            }

            /// `(min, max)` argument count; `None` means unbounded.
            pub const fn arity(self) -> (usize, Option<usize>) {
                match self {
                    $( FunctionId::$id => ($min, $max), )*
                }
            }
        }
    };
}

const MANY: Option<usize> = None;

const fn exactly(n: usize) -> Option<usize> {
    Some(n)
}

function_ids! {
    Add => "+", Infix, 2, exactly(2);
    Subtract => "-", Infix, 2, exactly(2);
    Multiply => "*", Infix, 2, exactly(2);
    Divide => "/", Infix, 2, exactly(2);
    Exponent => "^", Infix, 2, exactly(2);
    Ampersand => "&", Infix, 2, exactly(2);
    Equals => "=", Infix, 2, exactly(2);
    NotEquals => "<>", Infix, 2, exactly(2);
    Less => "<", Infix, 2, exactly(2);
    LessEquals => "<=", Infix, 2, exactly(2);
    Greater => ">", Infix, 2, exactly(2);
    GreaterEquals => ">=", Infix, 2, exactly(2);
    Negate => "-", Prefix, 1, exactly(1);
    Percent => "%", Postfix, 1, exactly(1);

    Sum => "SUM", Aggregator, 1, MANY;
    Product => "PRODUCT", Aggregator, 1, MANY;
    Average => "AVERAGE", Aggregator, 1, MANY;
    Count => "COUNT", Aggregator, 1, MANY;
    CountA => "COUNTA", Aggregator, 1, MANY;
    CountBlank => "COUNTBLANK", Aggregator, 1, exactly(1);
    Min => "MIN", Aggregator, 1, MANY;
    Max => "MAX", Aggregator, 1, MANY;
    And => "AND", Aggregator, 1, MANY;
    Or => "OR", Aggregator, 1, MANY;
    Xor => "XOR", Aggregator, 1, MANY;
    Concat => "CONCAT", Aggregator, 1, MANY;
    SumProduct => "SUMPRODUCT", Aggregator, 2, exactly(2);

    Abs => "ABS", Scalar, 1, exactly(1);
    Int => "INT", Scalar, 1, exactly(1);
    Sign => "SIGN", Scalar, 1, exactly(1);
    Sqrt => "SQRT", Scalar, 1, exactly(1);
    Mod => "MOD", Scalar, 2, exactly(2);
    Power => "POWER", Scalar, 2, exactly(2);
    Round => "ROUND", Scalar, 1, exactly(2);
    Not => "NOT", Scalar, 1, exactly(1);
    Len => "LEN", Scalar, 1, exactly(1);
    Upper => "UPPER", Scalar, 1, exactly(1);
    Lower => "LOWER", Scalar, 1, exactly(1);
    Trim => "TRIM", Scalar, 1, exactly(1);
    IsBlank => "ISBLANK", Scalar, 1, exactly(1);
    IsNumber => "ISNUMBER", Scalar, 1, exactly(1);
    IsText => "ISTEXT", Scalar, 1, exactly(1);
    IsLogical => "ISLOGICAL", Scalar, 1, exactly(1);
    IsError => "ISERROR", Scalar, 1, exactly(1);
    IsErr => "ISERR", Scalar, 1, exactly(1);
    IsNa => "ISNA", Scalar, 1, exactly(1);
    ErrorType => "ERROR.TYPE", Scalar, 1, exactly(1);
    Na => "NA", Scalar, 0, exactly(0);
    True => "TRUE", Scalar, 0, exactly(0);
    False => "FALSE", Scalar, 0, exactly(0);
    Pi => "PI", Scalar, 0, exactly(0);

    If => "IF", Control, 2, exactly(3);
    Choose => "CHOOSE", Control, 2, MANY;
    IfError => "IFERROR", Control, 2, exactly(2);
}

static FUNCTIONS_BY_NAME: Lazy<FxHashMap<&'static str, FunctionId>> = Lazy::new(|| {
    FunctionId::ALL
        .iter()
        .copied()
        .filter(|id| {
            matches!(
                id.kind(),
                FunctionKind::Aggregator | FunctionKind::Scalar | FunctionKind::Control
            )
        })
        .map(|id| (id.name(), id))
        .collect()
});

impl FunctionId {
    /// Resolve a function name, case-insensitively.
    pub fn lookup(name: &str) -> Option<FunctionId> {
        if name.bytes().all(|b| !b.is_ascii_lowercase()) {
            return FUNCTIONS_BY_NAME.get(name).copied();
        }
        FUNCTIONS_BY_NAME
            .get(name.to_ascii_uppercase().as_str())
            .copied()
    }

    /// Resolve an infix operator symbol.
    pub fn infix(symbol: &str) -> Option<FunctionId> {
        let id = match symbol {
            "+" => FunctionId::Add,
            "-" => FunctionId::Subtract,
            "*" => FunctionId::Multiply,
            "/" => FunctionId::Divide,
            "^" => FunctionId::Exponent,
            "&" => FunctionId::Ampersand,
            "=" => FunctionId::Equals,
            "<>" => FunctionId::NotEquals,
            "<" => FunctionId::Less,
            "<=" => FunctionId::LessEquals,
            ">" => FunctionId::Greater,
            ">=" => FunctionId::GreaterEquals,
            _ => return None,
        };
        Some(id)
    }

    pub fn accepts(self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.is_none_or(|max| count <= max)
    }
}
