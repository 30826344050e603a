//! Window builder: aligned lookback views for multi-bar rules.
//!
//! Two representations are offered. [`CandleWindow`] is a borrowed view of the
//! `N` bars ending at the bar under test, handed to rule predicates.
//! [`ShiftedFrame`] is the columnar form: `N` shifted copies of each field,
//! with NaN sentinels where history is missing.

use crate::{shape::Shape, Bar, PatternError, Result, OHLCV};

/// Lookback lengths the rule catalog may use.
pub const SUPPORTED_WINDOW_LENGTHS: [usize; 10] = [1, 2, 3, 4, 5, 8, 10, 11, 12, 13];

#[inline]
pub fn is_supported_length(length: usize) -> bool {
    SUPPORTED_WINDOW_LENGTHS.contains(&length)
}

// ============================================================
// CANDLE WINDOW
// ============================================================

/// The `len()` bars ending at the bar under test, in chronological order.
///
/// Indexing with [`bar`](Self::bar) counts backwards: `bar(0)` is the most
/// recent bar, `bar(1)` the one before it.
#[derive(Debug, Clone, Copy)]
pub struct CandleWindow<'a> {
    bars: &'a [Bar],
    shapes: &'a [Shape],
    end: usize,
}

impl<'a> CandleWindow<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Index of the most recent bar in the underlying series.
    #[inline]
    pub fn end_index(&self) -> usize {
        self.end
    }

    /// Bar `k` positions before the most recent one.
    ///
    /// Panics if `k >= len()`; rules only address bars inside their window.
    #[inline]
    pub fn bar(&self, k: usize) -> &'a Bar {
        &self.bars[self.bars.len() - 1 - k]
    }

    #[inline]
    pub fn shape(&self, k: usize) -> Shape {
        self.shapes[self.shapes.len() - 1 - k]
    }

    /// Bars oldest first.
    #[inline]
    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    /// Shapes oldest first.
    #[inline]
    pub fn shapes(&self) -> &'a [Shape] {
        self.shapes
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builds windows of one fixed length.
#[derive(Debug, Clone, Copy)]
pub struct WindowBuilder {
    length: usize,
}

impl WindowBuilder {
    pub fn new(length: usize) -> Result<Self> {
        if !is_supported_length(length) {
            return Err(PatternError::UnsupportedWindowLength(length));
        }
        Ok(Self { length })
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Window ending at `index`, or `None` while history is insufficient.
    #[inline]
    pub fn window<'a>(
        &self,
        bars: &'a [Bar],
        shapes: &'a [Shape],
        index: usize,
    ) -> Option<CandleWindow<'a>> {
        if index + 1 < self.length || index >= bars.len() || index >= shapes.len() {
            return None;
        }
        let start = index + 1 - self.length;
        Some(CandleWindow {
            bars: &bars[start..=index],
            shapes: &shapes[start..=index],
            end: index,
        })
    }

    /// One entry per bar, `None` for the first `length - 1` positions.
    pub fn windows<'a>(
        &self,
        bars: &'a [Bar],
        shapes: &'a [Shape],
    ) -> impl Iterator<Item = Option<CandleWindow<'a>>> + 'a {
        let builder = *self;
        (0..bars.len().min(shapes.len())).map(move |i| builder.window(bars, shapes, i))
    }

    /// Evaluate `predicate` over every complete window; incomplete positions are `false`.
    pub fn evaluate<'a, F>(
        &self,
        bars: &'a [Bar],
        shapes: &'a [Shape],
        mut predicate: F,
    ) -> Vec<bool>
    where
        F: FnMut(&CandleWindow<'a>) -> bool,
    {
        self.windows(bars, shapes)
            .map(|w| w.is_some_and(|w| predicate(&w)))
            .collect()
    }

    /// Columnar shifted copies of the five fields.
    pub fn shifted<T: OHLCV>(&self, bars: &[T]) -> ShiftedFrame {
        let columns = (0..self.length)
            .map(|shift| ShiftedColumns {
                shift,
                open: shift_column(bars, shift, |b| b.open()),
                high: shift_column(bars, shift, |b| b.high()),
                low: shift_column(bars, shift, |b| b.low()),
                close: shift_column(bars, shift, |b| b.close()),
                volume: shift_column(bars, shift, |b| b.volume()),
            })
            .collect();
        ShiftedFrame {
            length: self.length,
            rows: bars.len(),
            columns,
        }
    }
}

fn shift_column<T: OHLCV>(bars: &[T], shift: usize, field: impl Fn(&T) -> f64) -> Vec<f64> {
    (0..bars.len())
        .map(|i| if i >= shift { field(&bars[i - shift]) } else { f64::NAN })
        .collect()
}

// ============================================================
// SHIFTED FRAME
// ============================================================

/// Fields of the bar `shift` positions before each row.
#[derive(Debug, Clone)]
pub struct ShiftedColumns {
    pub shift: usize,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

/// `length` shifted copies of a bar series, row-aligned with the source.
#[derive(Debug, Clone)]
pub struct ShiftedFrame {
    length: usize,
    rows: usize,
    columns: Vec<ShiftedColumns>,
}

impl ShiftedFrame {
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns for bars `shift` positions back; `None` beyond the lookback.
    #[inline]
    pub fn shift(&self, shift: usize) -> Option<&ShiftedColumns> {
        self.columns.get(shift)
    }

    /// True if row `i` has all `length` bars of history.
    #[inline]
    pub fn is_complete(&self, row: usize) -> bool {
        row < self.rows && row + 1 >= self.length
    }
}

// ============================================================
// TESTS
// ============================================================
