//! Shape classifier: maps a bar and calibration thresholds onto categorical
//! body and shadow buckets, plus the two-candle gap predicates.
//!
//! Bucket boundaries are closed-open (`lower <= len < upper`) and the top
//! bucket is open-ended. A length of exactly zero always lands in the lowest
//! bucket, so a flat open/close is a doji and a missing wick is `None` even
//! when the calibrated lower boundary itself is zero.

use crate::{calibration::CalibrationContext, Color, OHLCVExt, OHLCV};

// ============================================================
// BUCKETS
// ============================================================

/// Body length bucket, ordered from smallest to largest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BodyBucket {
    Doji,
    Short,
    Normal,
    Tall,
}

impl BodyBucket {
    /// Bucket of `len` against the three ascending body percentiles.
    #[inline]
    pub fn classify(len: f64, levels: &[f64; 3]) -> Self {
        if len <= 0.0 || len < levels[0] {
            BodyBucket::Doji
        } else if len < levels[1] {
            BodyBucket::Short
        } else if len < levels[2] {
            BodyBucket::Normal
        } else {
            BodyBucket::Tall
        }
    }
}

/// Shadow length bucket, ordered from smallest to largest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ShadowBucket {
    None,
    Small,
    Normal,
    Long,
    Extreme,
}

impl ShadowBucket {
    /// Bucket of `len` against the four ascending shadow percentiles.
    #[inline]
    pub fn classify(len: f64, levels: &[f64; 4]) -> Self {
        if len <= 0.0 || len < levels[0] {
            ShadowBucket::None
        } else if len < levels[1] {
            ShadowBucket::Small
        } else if len < levels[2] {
            ShadowBucket::Normal
        } else if len < levels[3] {
            ShadowBucket::Long
        } else {
            ShadowBucket::Extreme
        }
    }
}

// ============================================================
// SHAPE
// ============================================================

/// Categorical facts about one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    pub color: Color,
    pub body: BodyBucket,
    pub upper: ShadowBucket,
    pub lower: ShadowBucket,
}

impl Shape {
    pub fn classify<T: OHLCV>(bar: &T, ctx: &CalibrationContext) -> Self {
        let thresholds = ctx.thresholds();
        let color = bar.color();
        Self {
            color,
            body: BodyBucket::classify(bar.body(), &thresholds.body_levels(color)),
            upper: ShadowBucket::classify(bar.upper_shadow(), thresholds.upper_shadow_levels()),
            lower: ShadowBucket::classify(bar.lower_shadow(), thresholds.lower_shadow_levels()),
        }
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.color == Color::Black
    }

    #[inline]
    pub fn is_white(&self) -> bool {
        self.color == Color::White
    }

    #[inline]
    pub fn is_doji(&self) -> bool {
        self.body == BodyBucket::Doji
    }

    #[inline]
    pub fn is_tall(&self) -> bool {
        self.body == BodyBucket::Tall
    }

    /// Doji or short body
    #[inline]
    pub fn is_small(&self) -> bool {
        self.body <= BodyBucket::Short
    }

    /// Short "black" body, e.g. for rules written as "short black".
    #[inline]
    pub fn is(&self, color: Color, body: BodyBucket) -> bool {
        self.color == color && self.body == body
    }

    /// No upper and no lower shadow
    #[inline]
    pub fn is_shaven(&self) -> bool {
        self.upper == ShadowBucket::None && self.lower == ShadowBucket::None
    }
}

/// Classify every bar of a series against one calibration.
pub fn classify_series<T: OHLCV>(bars: &[T], ctx: &CalibrationContext) -> Vec<Shape> {
    bars.iter().map(|b| Shape::classify(b, ctx)).collect()
}

// ============================================================
// TWO-CANDLE GAPS
// ============================================================
// Strict inequalities: touching ranges are never a gap.

/// Second bar trades entirely below the first: `low₁ > high₂`.
#[inline]
pub fn down_shadow_gap(low1: f64, high2: f64) -> bool {
    low1 > high2
}

/// Second bar trades entirely above the first: `high₁ < low₂`.
#[inline]
pub fn up_shadow_gap(high1: f64, low2: f64) -> bool {
    high1 < low2
}

/// Second body entirely below the first body: `bottom₁ > top₂`.
#[inline]
pub fn down_body_gap(bottom1: f64, top2: f64) -> bool {
    bottom1 > top2
}

/// Second body entirely above the first body: `top₁ < bottom₂`.
#[inline]
pub fn up_body_gap(top1: f64, bottom2: f64) -> bool {
    top1 < bottom2
}

fn pairwise<T: OHLCV>(bars: &[T], f: impl Fn(&T, &T) -> bool) -> Vec<bool> {
    let mut out = Vec::with_capacity(bars.len());
    if !bars.is_empty() {
        out.push(false);
    }
    out.extend(bars.windows(2).map(|w| f(&w[0], &w[1])));
    out
}

/// Per-bar up shadow gaps; index `i` compares bar `i - 1` with bar `i`.
pub fn up_shadow_gaps<T: OHLCV>(bars: &[T]) -> Vec<bool> {
    pairwise(bars, |a, b| up_shadow_gap(a.high(), b.low()))
}

pub fn down_shadow_gaps<T: OHLCV>(bars: &[T]) -> Vec<bool> {
    pairwise(bars, |a, b| down_shadow_gap(a.low(), b.high()))
}

pub fn up_body_gaps<T: OHLCV>(bars: &[T]) -> Vec<bool> {
    pairwise(bars, |a, b| up_body_gap(a.top(), b.bottom()))
}

pub fn down_body_gaps<T: OHLCV>(bars: &[T]) -> Vec<bool> {
    pairwise(bars, |a, b| down_body_gap(a.bottom(), b.top()))
}

// ============================================================
// TESTS
// ============================================================
