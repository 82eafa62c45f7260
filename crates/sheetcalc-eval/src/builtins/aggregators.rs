use std::rc::Rc;

use sheetcalc_common::{CellError, Point, Rect, Scalar, Size};
use sheetcalc_parse::{FunctionId, Outcome};

use crate::execution_context::{AggregateFlags, Env, ExecutionContext, ScalarGenerator};

/* ─────────────────────────── fold state ─────────────────────────── */

/// Running fold of one aggregate function.
///
/// Values typed directly into the call (`SUM(1, "2")`) are coerced; values
/// read from ranges or arrays only count when they already have the right
/// type. The first error stops the fold.
#[derive(Debug, Clone)]
pub struct Aggregator {
    id: FunctionId,
    total: f64,
    count: u64,
    text: String,
    error: Option<CellError>,
}

impl Aggregator {
    pub fn new(id: FunctionId) -> Self {
        let total = match id {
            FunctionId::Product => 1.0,
            FunctionId::Min => f64::INFINITY,
            FunctionId::Max => f64::NEG_INFINITY,
            FunctionId::And => 1.0,
            _ => 0.0,
        };
        Self {
            id,
            total,
            count: 0,
            text: String::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: CellError) -> bool {
        self.error = Some(error);
        false
    }

    fn add_number(&mut self, n: f64) {
        match self.id {
            FunctionId::Sum | FunctionId::Average => self.total += n,
            FunctionId::Product => self.total *= n,
            FunctionId::Min => self.total = self.total.min(n),
            FunctionId::Max => self.total = self.total.max(n),
            _ => {}
        }
        self.count += 1;
    }

    fn add_bool(&mut self, b: bool) {
        match self.id {
            FunctionId::And => {
                if !b {
                    self.total = 0.0;
                }
            }
            FunctionId::Or => {
                if b {
                    self.total = 1.0;
                }
            }
            FunctionId::Xor => {
                if b {
                    self.total = 1.0 - self.total;
                }
            }
            _ => {}
        }
        self.count += 1;
    }

    fn is_logical(&self) -> bool {
        matches!(self.id, FunctionId::And | FunctionId::Or | FunctionId::Xor)
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self.id,
            FunctionId::Sum | FunctionId::Product | FunctionId::Average | FunctionId::Min | FunctionId::Max
        )
    }

    /// Returns `false` once the fold is finished.
    pub fn add_direct(&mut self, value: &Scalar) -> bool {
        match self.id {
            FunctionId::Count => {
                if value.to_number().is_ok() {
                    self.count += 1;
                }
                true
            }
            FunctionId::CountA | FunctionId::CountBlank | FunctionId::Concat => self.add_indirect(value),
            _ if self.is_numeric() => match value.to_number() {
                Ok(n) => {
                    self.add_number(n);
                    true
                }
                Err(e) => self.fail(e),
            },
            _ if self.is_logical() => {
                if value.is_blank() {
                    return true;
                }
                match value.to_bool() {
                    Ok(b) => {
                        self.add_bool(b);
                        true
                    }
                    Err(e) => self.fail(e),
                }
            }
            _ => true,
        }
    }

    /// Returns `false` once the fold is finished.
    pub fn add_indirect(&mut self, value: &Scalar) -> bool {
        match self.id {
            FunctionId::Count => {
                if matches!(value, Scalar::Number(_)) {
                    self.count += 1;
                }
                true
            }
            FunctionId::CountA => {
                if !value.is_blank() {
                    self.count += 1;
                }
                true
            }
            FunctionId::CountBlank => {
                if value.is_blank() || value.as_text().is_some_and(str::is_empty) {
                    self.count += 1;
                }
                true
            }
            FunctionId::Concat => match value.to_text() {
                Ok(s) => {
                    self.text.push_str(&s);
                    true
                }
                Err(e) => self.fail(e),
            },
            _ => match value {
                Scalar::Error(e) => self.fail(*e),
                Scalar::Number(n) if self.is_numeric() => {
                    self.add_number(*n);
                    true
                }
                Scalar::Number(n) if self.is_logical() => {
                    self.add_bool(*n != 0.0);
                    true
                }
                Scalar::Bool(b) if self.is_logical() => {
                    self.add_bool(*b);
                    true
                }
                _ => true,
            },
        }
    }

    pub fn result(&self) -> Scalar {
        if let Some(e) = self.error {
            return Scalar::Error(e);
        }
        match self.id {
            FunctionId::Count | FunctionId::CountA | FunctionId::CountBlank => {
                Scalar::Number(self.count as f64)
            }
            FunctionId::Concat => Scalar::Text(Rc::from(self.text.as_str())),
            FunctionId::Average if self.count == 0 => Scalar::Error(CellError::DivisionByZero),
            FunctionId::Average => Scalar::number(self.total / self.count as f64),
            _ if self.is_logical() && self.count == 0 => Scalar::Error(CellError::InvalidValue),
            _ if self.is_logical() => Scalar::Bool(self.total != 0.0),
            _ if self.count == 0 => Scalar::Number(0.0),
            _ => Scalar::number(self.total),
        }
    }
}

/* ─────────────────────────── aggregate node ─────────────────────────── */

#[derive(Debug)]
pub struct AggregatorState {
    aggregator: Aggregator,
    saved_offset: Point,
}

impl AggregatorState {
    pub(super) fn new(id: FunctionId) -> Self {
        Self {
            aggregator: Aggregator::new(id),
            saved_offset: Point::default(),
        }
    }

    /// Arguments are walked whole, from their first element.
    pub(super) fn before_arguments(&mut self, ctx: &mut ExecutionContext) {
        self.saved_offset = ctx.offset;
        ctx.offset = Point::default();
    }

    fn next_element(ctx: &mut ExecutionContext) -> Outcome {
        if ctx.increment_offset(ctx.returned_extent) {
            return Outcome::RepeatChild;
        }
        ctx.offset = Point::default();
        Outcome::Continue
    }

    pub(super) fn after_argument(&mut self, ctx: &mut ExecutionContext, env: &mut Env<'_>) -> Outcome {
        if ctx.suppress_evaluation {
            return Outcome::SkipAll;
        }
        debug_assert!(self.aggregator.error.is_none());
        let aggregator = &mut self.aggregator;
        match ctx.returned_value.clone() {
            ScalarGenerator::Scalar(value) => {
                if !aggregator.add_direct(&value) {
                    return Outcome::SkipAll;
                }
                Self::next_element(ctx)
            }
            ScalarGenerator::Point(pt) => {
                let outcome = ctx.evaluate_cell(
                    env,
                    pt,
                    |value| {
                        if aggregator.add_indirect(value) {
                            Outcome::Continue
                        } else {
                            Outcome::SkipAll
                        }
                    },
                    |_| Outcome::Pause,
                );
                if outcome != Outcome::Continue {
                    return outcome;
                }
                Self::next_element(ctx)
            }
            ScalarGenerator::Array(array) => {
                if array.iter().all(|value| aggregator.add_indirect(value)) {
                    Outcome::Continue
                } else {
                    Outcome::SkipAll
                }
            }
            ScalarGenerator::Rect(rect) => {
                let saved = aggregator.clone();
                let flags = ctx.aggregate_rect(env, rect, |value| aggregator.add_indirect(value));
                if flags.contains(AggregateFlags::HAS_DEPENDENCIES) {
                    *aggregator = saved;
                    Outcome::Pause
                } else if flags.contains(AggregateFlags::ABORTED) {
                    Outcome::SkipAll
                } else {
                    Outcome::Continue
                }
            }
        }
    }

    pub(super) fn execute(&mut self, ctx: &mut ExecutionContext) {
        ctx.offset = self.saved_offset;
        if !ctx.suppress_evaluation {
            ctx.returned_value = self.aggregator.result().into();
        }
        ctx.returned_extent = Size::ONE;
    }
}

/* ─────────────────────────── SUMPRODUCT() ─────────────────────────── */

#[derive(Debug)]
enum Operand {
    /// Read lazily so two ranges can be walked in lock step.
    Range(Rect),
    Values { extent: Size, values: Vec<Scalar> },
}

impl Operand {
    fn extent(&self) -> Size {
        match self {
            Operand::Range(rect) => rect.size,
            Operand::Values { extent, .. } => *extent,
        }
    }
}

#[derive(Debug, Default)]
pub struct SumProductState {
    saved_offset: Point,
    operands: [Option<Operand>; 2],
}

/// One product term. Non-numbers count as zero; errors stop the walk.
fn product_term(a: &Scalar, b: &Scalar, total: &mut f64, error: &mut Option<CellError>) -> bool {
    if let Some(e) = a.as_error().or_else(|| b.as_error()) {
        *error = Some(e);
        return false;
    }
    if let (Scalar::Number(x), Scalar::Number(y)) = (a, b) {
        *total += x * y;
    }
    true
}

impl SumProductState {
    pub(super) fn before_arguments(&mut self, ctx: &mut ExecutionContext) {
        self.saved_offset = ctx.offset;
        ctx.offset = Point::default();
    }

    pub(super) fn after_argument(
        &mut self,
        ctx: &mut ExecutionContext,
        env: &mut Env<'_>,
        index: usize,
    ) -> Outcome {
        debug_assert!(index < 2);
        if ctx.suppress_evaluation {
            return Outcome::SkipAll;
        }
        let slot = &mut self.operands[index];
        match ctx.returned_value.clone() {
            ScalarGenerator::Rect(rect) => *slot = Some(Operand::Range(rect)),
            ScalarGenerator::Array(array) => {
                *slot = Some(Operand::Values {
                    extent: array.size(),
                    values: array.iter().cloned().collect(),
                })
            }
            ScalarGenerator::Point(pt) => {
                let Some(value) = ctx.evaluate_cell(env, pt, |v| Some(v.clone()), |_| None) else {
                    return Outcome::Pause;
                };
                *slot = Some(Operand::Values {
                    extent: Size::ONE,
                    values: vec![value],
                });
            }
            ScalarGenerator::Scalar(value) => {
                // Broadcast results arrive one element per repetition.
                let continuing = ctx.offset != Point::default();
                if continuing && let Some(Operand::Values { values, .. }) = slot {
                    values.push(value);
                } else {
                    *slot = Some(Operand::Values {
                        extent: ctx.returned_extent,
                        values: vec![value],
                    });
                }
                return AggregatorState::next_element(ctx);
            }
        }
        Outcome::Continue
    }

    fn materialize(ctx: &mut ExecutionContext, env: &mut Env<'_>, operand: &Operand) -> Option<Vec<Scalar>> {
        match operand {
            Operand::Values { values, .. } => Some(values.clone()),
            Operand::Range(rect) => {
                let mut values = Vec::with_capacity(rect.size.area() as usize);
                let flags = ctx.aggregate_rect(env, *rect, |v| {
                    values.push(v.clone());
                    true
                });
                (!flags.contains(AggregateFlags::HAS_DEPENDENCIES)).then_some(values)
            }
        }
    }

    fn compute(&self, ctx: &mut ExecutionContext, env: &mut Env<'_>) -> Option<Scalar> {
        let [Some(first), Some(second)] = &self.operands else {
            return Some(Scalar::Error(CellError::InvalidValue));
        };
        if first.extent() != second.extent() {
            return Some(Scalar::Error(CellError::InvalidValue));
        }
        let mut total = 0.0;
        let mut error = None;
        if let (Operand::Range(a), Operand::Range(b)) = (first, second) {
            let flags = ctx.aggregate_rects(env, *a, *b, |x, y| product_term(x, y, &mut total, &mut error));
            if flags.contains(AggregateFlags::HAS_DEPENDENCIES) {
                return None;
            }
        } else {
            let a = Self::materialize(ctx, env, first)?;
            let b = Self::materialize(ctx, env, second)?;
            for (x, y) in a.iter().zip(&b) {
                if !product_term(x, y, &mut total, &mut error) {
                    break;
                }
            }
        }
        Some(match error {
            Some(e) => Scalar::Error(e),
            None => Scalar::number(total),
        })
    }

    /// Returns `false` while a referenced cell is still pending.
    pub(super) fn execute(&mut self, ctx: &mut ExecutionContext, env: &mut Env<'_>) -> bool {
        if !ctx.suppress_evaluation {
            let Some(result) = self.compute(ctx, env) else {
                return false;
            };
            ctx.returned_value = result.into();
        }
        ctx.offset = self.saved_offset;
        ctx.returned_extent = Size::ONE;
        true
    }
}
