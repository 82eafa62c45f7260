pub mod ast;
pub mod functions;
pub mod parser;
mod reconstruct;
pub mod reference;
pub mod references;
#[cfg(test)]
mod tests;
pub mod tokenizer;
pub mod traversal;

pub use ast::{Formula, Node, NodeKind};
pub use functions::{FunctionId, FunctionKind};
pub use parser::{Parser, ParserError};
pub use reference::{AreaReference, CellReference, DimensionReference, RefCoord, Reference};
pub use references::FormulaReferences;
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};
pub use traversal::{Frame, FrameStack, Outcome, Status, Traversal, TraversalHandler, TraversalState};

// Re-export common types
pub use sheetcalc_common::{CellError, Point, Scalar};
