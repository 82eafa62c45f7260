//! Ordered map from half-open index ranges to values.
//!
//! Intervals are disjoint, kept sorted by start, and two intervals that
//! touch never hold equal values: every mutation merges such neighbours.

use std::collections::BTreeMap;
use std::ops::{Add, ControlFlow, Sub};

pub trait IntervalIndex: Copy + Ord + Add<Output = Self> + Sub<Output = Self> {}

impl<T> IntervalIndex for T where T: Copy + Ord + Add<Output = T> + Sub<Output = T> {}

#[derive(Debug, Clone, PartialEq)]
struct Span<I, V> {
    end: I,
    value: V,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalMap<I, V> {
    /// Keyed by interval start.
    spans: BTreeMap<I, Span<I, V>>,
}

impl<I, V> Default for IntervalMap<I, V> {
    fn default() -> Self {
        Self {
            spans: BTreeMap::new(),
        }
    }
}

impl<I: IntervalIndex, V: Clone + PartialEq> IntervalMap<I, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intervals.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }

    /// Stored intervals as `(start, end, value)`, in order.
    pub fn iter(&self) -> impl Iterator<Item = (I, I, &V)> + '_ {
        self.spans.iter().map(|(&start, span)| (start, span.end, &span.value))
    }

    /// Start of the interval containing `idx`, if any.
    fn containing(&self, idx: I) -> Option<I> {
        let (&start, span) = self.spans.range(..=idx).next_back()?;
        (idx < span.end).then_some(start)
    }

    pub fn get_value(&self, idx: I) -> Option<&V> {
        let start = self.containing(idx)?;
        self.spans.get(&start).map(|span| &span.value)
    }

    pub fn get_value_with_default<'a>(&'a self, idx: I, default: &'a V) -> &'a V {
        self.get_value(idx).unwrap_or(default)
    }

    /// Make `idx` an interval boundary, splitting the interval across it.
    fn split_at(&mut self, idx: I) {
        let Some(start) = self.containing(idx) else {
            return;
        };
        if start == idx {
            return;
        }
        if let Some(span) = self.spans.get_mut(&start) {
            let tail = Span {
                end: span.end,
                value: span.value.clone(),
            };
            span.end = idx;
            self.spans.insert(idx, tail);
        }
    }

    /// Merge two intervals meeting at `idx` when they hold equal values.
    fn merge_at(&mut self, idx: I) {
        let Some((&left_start, left)) = self.spans.range(..idx).next_back() else {
            return;
        };
        if left.end != idx {
            return;
        }
        let mergeable = self.spans.get(&idx).is_some_and(|right| right.value == left.value);
        if mergeable && let Some(right) = self.spans.remove(&idx) {
            if let Some(left) = self.spans.get_mut(&left_start) {
                left.end = right.end;
            }
        }
    }

    /// Merge every mergeable pair of neighbours whose seam lies in
    /// `start..=end`.
    fn merge_range(&mut self, start: I, end: I) {
        let seams: Vec<I> = self.spans.range(start..=end).map(|(&s, _)| s).collect();
        for seam in seams.into_iter().rev() {
            self.merge_at(seam);
        }
    }

    fn remove_covered(&mut self, start: I, end: I) {
        let covered: Vec<I> = self.spans.range(start..end).map(|(&s, _)| s).collect();
        for s in covered {
            self.spans.remove(&s);
        }
    }

    pub fn set_value(&mut self, start: I, end: I, value: V) {
        debug_assert!(start <= end);
        if start >= end {
            return;
        }
        self.split_at(start);
        self.split_at(end);
        self.remove_covered(start, end);
        self.spans.insert(start, Span { end, value });
        self.merge_at(end);
        self.merge_at(start);
    }

    pub fn clear_value(&mut self, start: I, end: I) {
        debug_assert!(start <= end);
        if start >= end {
            return;
        }
        self.split_at(start);
        self.split_at(end);
        self.remove_covered(start, end);
    }

    /// Replace the value of every sub-range of `start..end` by what `op`
    /// computes from the current one (`None` for gaps). Returning `None`
    /// clears the sub-range.
    pub fn modify_value<F>(&mut self, start: I, end: I, mut op: F)
    where
        F: FnMut(Option<&V>) -> Option<V>,
    {
        debug_assert!(start <= end);
        if start >= end {
            return;
        }
        let mut pieces = Vec::new();
        self.for_each_interval(start, end, |s, e, current| {
            pieces.push((s, e, op(current)));
            ControlFlow::<()>::Continue(())
        });
        self.split_at(start);
        self.split_at(end);
        self.remove_covered(start, end);
        for (s, e, value) in pieces {
            if let Some(value) = value {
                self.spans.insert(s, Span { end: e, value });
            }
        }
        self.merge_range(start, end);
    }

    /// Shift everything at or after `before` up by `count`. An interval
    /// starting at or spanning `before` grows to cover the new indices.
    pub fn insert_indices(&mut self, before: I, count: I) {
        if count == count - count {
            return;
        }
        let growing = match self.spans.get(&before) {
            Some(_) => Some(before),
            None => self.containing(before),
        };
        let moved = self.spans.split_off(&before);
        if let Some(start) = growing {
            let grown = if start == before {
                None
            } else {
                self.spans.get_mut(&start)
            };
            if let Some(span) = grown {
                span.end = span.end + count;
            }
        }
        for (s, mut span) in moved {
            span.end = span.end + count;
            if Some(s) == growing {
                self.spans.insert(s, span);
            } else {
                self.spans.insert(s + count, span);
            }
        }
    }

    /// Remove indices `start..end`, shifting everything after down. The
    /// intervals meeting at the seam are merged when equal.
    pub fn erase_indices(&mut self, start: I, end: I) {
        debug_assert!(start <= end);
        if start >= end {
            return;
        }
        let count = end - start;
        self.clear_value(start, end);
        let moved = self.spans.split_off(&end);
        for (s, mut span) in moved {
            span.end = span.end - count;
            self.spans.insert(s - count, span);
        }
        self.merge_at(start);
    }

    /// Visit `start..end` as consecutive `(start, end, value)` pieces, with
    /// `None` for gaps. Stops early when `f` breaks.
    pub fn for_each_interval<B, F>(&self, start: I, end: I, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(I, I, Option<&V>) -> ControlFlow<B>,
    {
        for (s, e, value) in self.pieces(start, end) {
            f(s, e, value)?;
        }
        ControlFlow::Continue(())
    }

    pub fn for_each_interval_with_default<'a, B, F>(
        &'a self,
        start: I,
        end: I,
        default: &'a V,
        mut f: F,
    ) -> ControlFlow<B>
    where
        F: FnMut(I, I, &'a V) -> ControlFlow<B>,
    {
        for (s, e, value) in self.intervals(start, end, default) {
            f(s, e, value)?;
        }
        ControlFlow::Continue(())
    }

    /// Lazy sequence of pieces covering `start..end` exactly, gaps filled
    /// with `default`.
    pub fn intervals<'a>(&'a self, start: I, end: I, default: &'a V) -> Intervals<'a, I, V> {
        Intervals {
            pieces: self.pieces(start, end),
            default,
        }
    }

    fn pieces(&self, start: I, end: I) -> Pieces<'_, I, V> {
        debug_assert!(start <= end);
        let from = self.containing(start).unwrap_or(start);
        Pieces {
            spans: self.spans.range(from..),
            pending: None,
            pos: start,
            end,
        }
    }
}

struct Pieces<'a, I, V> {
    spans: std::collections::btree_map::Range<'a, I, Span<I, V>>,
    pending: Option<(I, &'a Span<I, V>)>,
    pos: I,
    end: I,
}

impl<'a, I: IntervalIndex, V> Iterator for Pieces<'a, I, V> {
    type Item = (I, I, Option<&'a V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        if self.pending.is_none() {
            self.pending = self.spans.next().map(|(&s, span)| (s, span));
        }
        let start = self.pos;
        let item = match self.pending {
            None => {
                self.pos = self.end;
                (start, self.end, None)
            }
            Some((s, _)) if start < s => {
                self.pos = s.min(self.end);
                (start, self.pos, None)
            }
            Some((_, span)) => {
                self.pending = None;
                self.pos = span.end.min(self.end);
                (start, self.pos, Some(&span.value))
            }
        };
        Some(item)
    }
}

pub struct Intervals<'a, I, V> {
    pieces: Pieces<'a, I, V>,
    default: &'a V,
}

impl<'a, I: IntervalIndex, V> Iterator for Intervals<'a, I, V> {
    type Item = (I, I, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (s, e, value) = self.pieces.next()?;
        Some((s, e, value.unwrap_or(self.default)))
    }
}
