//! Single-bar patterns.
//!
//! Doji family, hammer family, marubozu, spinning top and long days, written
//! against calibrated body/shadow buckets instead of fixed ratios.

use super::{PatternRule, TrendGate};
use crate::{
    calibration::CalibrationContext,
    shape::{BodyBucket, ShadowBucket},
    window::CandleWindow,
    Color, OHLCVExt,
};

pub const RULES: &[PatternRule] = &[
    PatternRule::new("doji", 1, TrendGate::Any, doji),
    PatternRule::new("long_legged_doji", 1, TrendGate::Any, long_legged_doji),
    PatternRule::new("dragonfly_doji", 1, TrendGate::Down, dragonfly_doji),
    PatternRule::new("gravestone_doji", 1, TrendGate::Up, gravestone_doji),
    PatternRule::new("hammer", 1, TrendGate::Down, hammer_shape),
    PatternRule::new("hanging_man", 1, TrendGate::Up, hammer_shape),
    PatternRule::new("inverted_hammer", 1, TrendGate::Down, inverted_hammer_shape),
    PatternRule::new("shooting_star", 1, TrendGate::Up, inverted_hammer_shape),
    PatternRule::new("white_marubozu", 1, TrendGate::Any, white_marubozu),
    PatternRule::new("black_marubozu", 1, TrendGate::Any, black_marubozu),
    PatternRule::new("spinning_top", 1, TrendGate::Any, spinning_top),
    PatternRule::new("long_white_day", 1, TrendGate::Any, long_white_day),
    PatternRule::new("long_black_day", 1, TrendGate::Any, long_black_day),
];

// ============================================================
// DOJI FAMILY
// ============================================================

pub fn doji(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.shape(0).is_doji()
}

/// Doji with long shadows on both sides
pub fn long_legged_doji(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let s = w.shape(0);
    s.is_doji() && s.upper >= ShadowBucket::Long && s.lower >= ShadowBucket::Long
}

/// Doji at the top of the range with a long lower shadow
pub fn dragonfly_doji(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let s = w.shape(0);
    s.is_doji() && s.upper == ShadowBucket::None && s.lower >= ShadowBucket::Long
}

/// Doji at the bottom of the range with a long upper shadow
pub fn gravestone_doji(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let s = w.shape(0);
    s.is_doji() && s.lower == ShadowBucket::None && s.upper >= ShadowBucket::Long
}

// ============================================================
// HAMMER FAMILY
// ============================================================
// Hammer and hanging man share a shape; only the trend gate differs.

/// Small real body near the high, lower shadow at least twice the body.
pub fn hammer_shape(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (bar, s) = (w.bar(0), w.shape(0));
    !s.is_doji()
        && s.body <= BodyBucket::Normal
        && s.upper <= ShadowBucket::Small
        && s.lower >= ShadowBucket::Long
        && bar.lower_shadow() >= 2.0 * bar.body()
}

/// Small real body near the low, upper shadow at least twice the body.
pub fn inverted_hammer_shape(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (bar, s) = (w.bar(0), w.shape(0));
    !s.is_doji()
        && s.body <= BodyBucket::Normal
        && s.lower <= ShadowBucket::Small
        && s.upper >= ShadowBucket::Long
        && bar.upper_shadow() >= 2.0 * bar.body()
}

// ============================================================
// BODY-DOMINATED
// ============================================================

pub fn white_marubozu(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let s = w.shape(0);
    s.is(Color::White, BodyBucket::Tall) && s.is_shaven()
}

pub fn black_marubozu(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let s = w.shape(0);
    s.is(Color::Black, BodyBucket::Tall) && s.is_shaven()
}

/// Short body with shadows longer than the body on both sides
pub fn spinning_top(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (bar, s) = (w.bar(0), w.shape(0));
    s.body == BodyBucket::Short
        && s.upper >= ShadowBucket::Normal
        && s.lower >= ShadowBucket::Normal
        && bar.upper_shadow() > bar.body()
        && bar.lower_shadow() > bar.body()
}

pub fn long_white_day(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.shape(0).is(Color::White, BodyBucket::Tall)
}

pub fn long_black_day(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.shape(0).is(Color::Black, BodyBucket::Tall)
}

// ============================================================
// TESTS
// ============================================================
