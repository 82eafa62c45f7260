use std::rc::Rc;

use sheetcalc_common::{ArrayRef, CellError, Point, Scalar};

use crate::functions::FunctionId;
use crate::parser::Parser;
use crate::reconstruct;
use crate::references::FormulaReferences;
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar(Scalar),
    Array(ArrayRef),
    /// Index into the formula's [`FormulaReferences`].
    Reference(usize),
    /// Source that could not be parsed. Evaluates to `error` and renders as
    /// `text`.
    ParseError {
        error: CellError,
        text: Rc<str>,
    },
    Function {
        id: FunctionId,
        args: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Written inside parentheses.
    pub bracketed: bool,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            bracketed: false,
        }
    }

    pub fn scalar(value: impl Into<Scalar>) -> Self {
        Self::new(NodeKind::Scalar(value.into()))
    }

    pub fn function(id: FunctionId, args: Vec<Node>) -> Self {
        Self::new(NodeKind::Function { id, args })
    }

    pub fn parse_error(error: CellError, text: &str) -> Self {
        Self::new(NodeKind::ParseError {
            error,
            text: Rc::from(text),
        })
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Function { args, .. } => args,
            _ => &[],
        }
    }

    pub fn function_id(&self) -> Option<FunctionId> {
        match self.kind {
            NodeKind::Function { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// An immutable parsed formula. Shared between the cell that owns it and
/// every copy made from that cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Node,
}

impl Formula {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Parse `text` (with or without a leading `=`) anchored at `at`.
    ///
    /// Never fails: unparsable input becomes a tree holding a
    /// [`NodeKind::ParseError`] leaf.
    pub fn parse(text: &str, at: Point) -> (Rc<Formula>, Rc<FormulaReferences>) {
        let source = text.strip_prefix('=').unwrap_or(text);
        let parsed = Tokenizer::new(source)
            .map_err(Into::into)
            .and_then(|tokenizer| Parser::new(source, tokenizer.items, at).parse());
        let (root, refs) = match parsed {
            Ok(parsed) => parsed,
            Err(_) => (
                Node::parse_error(CellError::InvalidFormula, source),
                FormulaReferences::default(),
            ),
        };
        (Rc::new(Formula::new(root)), Rc::new(refs))
    }

    /// Canonical source text (without `=`) as seen from `at`.
    pub fn reconstruct(&self, refs: &FormulaReferences, at: Point) -> String {
        reconstruct::reconstruct(&self.root, refs, at)
    }
}
