//! Formula source regeneration, driven by the explicit-stack walker.

use sheetcalc_common::Point;

use crate::ast::{Node, NodeKind};
use crate::functions::FunctionKind;
use crate::references::FormulaReferences;
use crate::traversal::{Frame, Outcome, Status, Traversal, TraversalHandler};

struct Reconstructor<'r> {
    refs: &'r FormulaReferences,
    at: Point,
    dest: String,
}

impl<'n> TraversalHandler<'n> for Reconstructor<'_> {
    type Scratch = ();

    fn new_scratch(&mut self, _node: &'n Node) {}

    fn on_enter(&mut self, frame: &mut Frame<'n, ()>) -> Outcome {
        let node = frame.node;
        if node.bracketed {
            self.dest.push('(');
        }
        match &node.kind {
            NodeKind::Scalar(value) => value.reconstruct(&mut self.dest),
            NodeKind::Array(array) => array.reconstruct(&mut self.dest),
            NodeKind::Reference(idx) => match self.refs.get(*idx) {
                Some(r) => r.reconstruct(self.at, &mut self.dest),
                None => self.dest.push_str("#REF!"),
            },
            NodeKind::ParseError { text, .. } => self.dest.push_str(text),
            NodeKind::Function { id, .. } => match id.kind() {
                FunctionKind::Prefix => self.dest.push_str(id.name()),
                FunctionKind::Infix | FunctionKind::Postfix => {}
                FunctionKind::Aggregator | FunctionKind::Scalar | FunctionKind::Control => {
                    self.dest.push_str(id.name());
                    self.dest.push('(');
                }
            },
        }
        Outcome::Continue
    }

    fn on_after_child(&mut self, frame: &mut Frame<'n, ()>) -> Outcome {
        let Some(id) = frame.node.function_id() else {
            return Outcome::Continue;
        };
        let is_last = frame.child + 1 == frame.node.children().len();
        match id.kind() {
            FunctionKind::Infix if !is_last => {
                self.dest.push(' ');
                self.dest.push_str(id.name());
                self.dest.push(' ');
            }
            FunctionKind::Aggregator | FunctionKind::Scalar | FunctionKind::Control
                if !is_last =>
            {
                self.dest.push_str(", ");
            }
            _ => {}
        }
        Outcome::Continue
    }

    fn on_exit(&mut self, frame: &mut Frame<'n, ()>) -> Outcome {
        let node = frame.node;
        if let Some(id) = node.function_id() {
            match id.kind() {
                FunctionKind::Postfix => self.dest.push_str(id.name()),
                FunctionKind::Aggregator | FunctionKind::Scalar | FunctionKind::Control => {
                    self.dest.push(')')
                }
                FunctionKind::Infix | FunctionKind::Prefix => {}
            }
        }
        if node.bracketed {
            self.dest.push(')');
        }
        Outcome::Continue
    }
}

pub(crate) fn reconstruct(root: &Node, refs: &FormulaReferences, at: Point) -> String {
    let mut handler = Reconstructor {
        refs,
        at,
        dest: String::new(),
    };
    let mut traversal = Traversal::new(root, Vec::new());
    let status = traversal.run(&mut handler);
    debug_assert_eq!(status, Status::Done);
    handler.dest
}
