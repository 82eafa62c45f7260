//! Explicit-stack walker over a formula tree.
//!
//! The walker never recurses: every visited node owns one [`Frame`] on a
//! caller-supplied stack. A handler may ask to [`Outcome::Pause`] at any
//! event; the stack is then left untouched and the next [`Traversal::run`]
//! continues from the exact frame and state that paused.

use std::marker::PhantomData;

use crate::ast::Node;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TraversalState {
    FirstSeen,
    BeforeChild,
    AfterChild,
    BeforeExit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Continue and skip the next `n` children.
    ContinueAndSkip(usize),
    /// Continue and skip every remaining child.
    SkipAll,
    /// Visit the child that just finished once more.
    RepeatChild,
    Pause,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Done,
    Paused,
}

/// Per-node stack entry. `child` is the index of the next child to visit
/// (or, in `AfterChild`, of the child that just finished).
#[derive(Debug)]
pub struct Frame<'n, S> {
    pub node: &'n Node,
    pub state: TraversalState,
    pub child: usize,
    pub scratch: S,
}

/// Storage the walker keeps its frames in.
pub trait FrameStack<T> {
    fn push(&mut self, value: T);
    fn pop(&mut self) -> Option<T>;
    fn last_mut(&mut self) -> Option<&mut T>;
    fn clear(&mut self);
    fn is_empty(&self) -> bool;
}

impl<T> FrameStack<T> for Vec<T> {
    fn push(&mut self, value: T) {
        Vec::push(self, value)
    }
    fn pop(&mut self) -> Option<T> {
        Vec::pop(self)
    }
    fn last_mut(&mut self) -> Option<&mut T> {
        <[T]>::last_mut(self)
    }
    fn clear(&mut self) {
        Vec::clear(self)
    }
    fn is_empty(&self) -> bool {
        <[T]>::is_empty(self)
    }
}

impl<T> FrameStack<T> for bumpalo::collections::Vec<'_, T> {
    fn push(&mut self, value: T) {
        bumpalo::collections::Vec::push(self, value)
    }
    fn pop(&mut self) -> Option<T> {
        bumpalo::collections::Vec::pop(self)
    }
    fn last_mut(&mut self) -> Option<&mut T> {
        <[T]>::last_mut(self)
    }
    fn clear(&mut self) {
        bumpalo::collections::Vec::clear(self)
    }
    fn is_empty(&self) -> bool {
        <[T]>::is_empty(self)
    }
}

/// Event callbacks. Every callback gets the frame of the node it concerns;
/// `child` tells which argument is about to be (or was just) visited.
pub trait TraversalHandler<'n> {
    type Scratch;

    fn new_scratch(&mut self, node: &'n Node) -> Self::Scratch;

    fn on_enter(&mut self, _frame: &mut Frame<'n, Self::Scratch>) -> Outcome {
        Outcome::Continue
    }

    fn on_before_child(&mut self, _frame: &mut Frame<'n, Self::Scratch>) -> Outcome {
        Outcome::Continue
    }

    fn on_after_child(&mut self, _frame: &mut Frame<'n, Self::Scratch>) -> Outcome {
        Outcome::Continue
    }

    fn on_exit(&mut self, _frame: &mut Frame<'n, Self::Scratch>) -> Outcome {
        Outcome::Continue
    }
}

pub struct Traversal<'n, S, St> {
    root: &'n Node,
    stack: St,
    started: bool,
    _scratch: PhantomData<S>,
}

impl<'n, S, St: FrameStack<Frame<'n, S>>> Traversal<'n, S, St> {
    /// `stack` must be empty.
    pub fn new(root: &'n Node, stack: St) -> Self {
        debug_assert!(stack.is_empty());
        Self {
            root,
            stack,
            started: false,
            _scratch: PhantomData,
        }
    }

    /// Forget all progress; the next `run` starts at the root again.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.started = false;
    }

    pub fn run<H>(&mut self, handler: &mut H) -> Status
    where
        H: TraversalHandler<'n, Scratch = S>,
    {
        if !self.started {
            let scratch = handler.new_scratch(self.root);
            self.stack.push(Frame {
                node: self.root,
                state: TraversalState::FirstSeen,
                child: 0,
                scratch,
            });
            self.started = true;
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Status::Done;
            };
            let child_count = frame.node.children().len();

            match frame.state {
                TraversalState::FirstSeen => match handler.on_enter(frame) {
                    Outcome::Pause => return Status::Paused,
                    Outcome::ContinueAndSkip(n) => {
                        frame.child = n.min(child_count);
                        frame.state = TraversalState::BeforeChild;
                    }
                    Outcome::SkipAll => {
                        frame.child = child_count;
                        frame.state = TraversalState::BeforeChild;
                    }
                    Outcome::Continue | Outcome::RepeatChild => {
                        frame.state = TraversalState::BeforeChild;
                    }
                },
                TraversalState::BeforeChild => {
                    if frame.child >= child_count {
                        frame.state = TraversalState::BeforeExit;
                        continue;
                    }
                    match handler.on_before_child(frame) {
                        Outcome::Pause => return Status::Paused,
                        Outcome::SkipAll => {
                            frame.child = child_count;
                            frame.state = TraversalState::BeforeExit;
                        }
                        Outcome::ContinueAndSkip(n) => {
                            frame.child = (frame.child + n).min(child_count);
                        }
                        Outcome::Continue | Outcome::RepeatChild => {
                            let node = frame.node;
                            let child = &node.children()[frame.child];
                            frame.state = TraversalState::AfterChild;
                            self.push_child(child, handler);
                        }
                    }
                }
                TraversalState::AfterChild => match handler.on_after_child(frame) {
                    Outcome::Pause => return Status::Paused,
                    Outcome::RepeatChild => {
                        let node = frame.node;
                        let child = &node.children()[frame.child];
                        self.push_child(child, handler);
                    }
                    Outcome::Continue => {
                        frame.child += 1;
                        frame.state = TraversalState::BeforeChild;
                    }
                    Outcome::ContinueAndSkip(n) => {
                        frame.child = (frame.child + 1 + n).min(child_count);
                        frame.state = TraversalState::BeforeChild;
                    }
                    Outcome::SkipAll => {
                        frame.child = child_count;
                        frame.state = TraversalState::BeforeChild;
                    }
                },
                TraversalState::BeforeExit => {
                    if handler.on_exit(frame) == Outcome::Pause {
                        return Status::Paused;
                    }
                    self.stack.pop();
                    if self.stack.is_empty() {
                        return Status::Done;
                    }
                }
            }
        }
    }

    fn push_child<H>(&mut self, child: &'n Node, handler: &mut H)
    where
        H: TraversalHandler<'n, Scratch = S>,
    {
        let scratch = handler.new_scratch(child);
        self.stack.push(Frame {
            node: child,
            state: TraversalState::FirstSeen,
            child: 0,
            scratch,
        });
    }
}
