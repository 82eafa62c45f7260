use sheetcalc_common::{CellError, Scalar, Size};
use sheetcalc_parse::{FunctionId, Outcome};

use crate::execution_context::{Env, ExecutionContext, ScalarGenerator};

/* ─────────────────────────── IF() / CHOOSE() ─────────────────────────── */

/// Shared by `IF` and `CHOOSE`: the first argument selects which of the
/// remaining ones is evaluated; the others run with evaluation suppressed
/// and only contribute their extent.
#[derive(Debug)]
pub struct ChoiceState {
    id: FunctionId,
    arg_count: usize,
    original_suppress: bool,
    /// Index of the selected argument; 0 selects nothing.
    chosen: usize,
    value: ScalarGenerator,
    extent: Size,
}

impl ChoiceState {
    pub(super) fn new(id: FunctionId, arg_count: usize) -> Self {
        Self {
            id,
            arg_count,
            original_suppress: false,
            chosen: 0,
            value: ScalarGenerator::default(),
            extent: Size::ONE,
        }
    }

    pub(super) fn before_arguments(&mut self, ctx: &mut ExecutionContext) {
        self.original_suppress = ctx.suppress_evaluation;
    }

    fn select(&mut self, selector: &Scalar) {
        match self.id {
            FunctionId::If => match selector.to_bool() {
                Ok(condition) => {
                    self.chosen = if condition { 1 } else { 2 };
                    if self.chosen >= self.arg_count {
                        self.value = Scalar::Bool(false).into();
                    }
                }
                Err(e) => self.value = e.into(),
            },
            _ => match selector.to_number() {
                Ok(n) => {
                    self.value = CellError::InvalidValue.into();
                    if n >= 1.0 && n.trunc() < self.arg_count as f64 {
                        self.chosen = n.trunc() as usize;
                    }
                }
                Err(e) => self.value = e.into(),
            },
        }
    }

    pub(super) fn after_argument(
        &mut self,
        ctx: &mut ExecutionContext,
        env: &mut Env<'_>,
        index: usize,
    ) -> Outcome {
        if index == 0 {
            if !ctx.suppress_evaluation {
                let Some((selector, _)) = ctx.generate_returned(env) else {
                    return Outcome::Pause;
                };
                self.select(&selector);
                if self.chosen != 1 {
                    ctx.suppress_evaluation = true;
                }
            }
            self.extent = ctx.returned_extent;
            return Outcome::Continue;
        }
        if !self.original_suppress {
            if self.chosen == index {
                debug_assert!(!ctx.suppress_evaluation);
                self.value = std::mem::take(&mut ctx.returned_value);
            }
            ctx.suppress_evaluation = self.chosen != index + 1;
        }
        self.extent.extend_to(ctx.returned_extent);
        Outcome::Continue
    }

    pub(super) fn execute(&mut self, ctx: &mut ExecutionContext) {
        ctx.suppress_evaluation = self.original_suppress;
        if !ctx.suppress_evaluation {
            let mut value = std::mem::take(&mut self.value);
            ctx.singlify_if_needed(&mut value, self.extent);
            ctx.returned_value = value;
        }
        ctx.returned_extent = self.extent;
    }
}

/* ─────────────────────────── IFERROR() ─────────────────────────── */

#[derive(Debug, Default)]
pub struct IfErrorState {
    original_suppress: bool,
    value: ScalarGenerator,
    extent: Size,
}

impl IfErrorState {
    pub(super) fn before_arguments(&mut self, ctx: &mut ExecutionContext) {
        self.original_suppress = ctx.suppress_evaluation;
    }

    pub(super) fn after_argument(
        &mut self,
        ctx: &mut ExecutionContext,
        env: &mut Env<'_>,
        index: usize,
    ) -> Outcome {
        debug_assert!(index < 2);
        if index == 0 {
            if !ctx.suppress_evaluation {
                let Some((value, _)) = ctx.generate_returned(env) else {
                    return Outcome::Pause;
                };
                if !value.is_error() {
                    self.value = value.into();
                    ctx.suppress_evaluation = true;
                }
            }
            self.extent = ctx.returned_extent;
            return Outcome::Continue;
        }
        if !self.original_suppress && !ctx.suppress_evaluation {
            self.value = std::mem::take(&mut ctx.returned_value);
        }
        self.extent.extend_to(ctx.returned_extent);
        Outcome::Continue
    }

    pub(super) fn execute(&mut self, ctx: &mut ExecutionContext) {
        ctx.suppress_evaluation = self.original_suppress;
        if !ctx.suppress_evaluation {
            let mut value = std::mem::take(&mut self.value);
            ctx.singlify_if_needed(&mut value, self.extent);
            ctx.returned_value = value;
        }
        ctx.returned_extent = self.extent;
    }
}
