//! Two-bar patterns: engulfing, harami, piercing line / dark cloud cover,
//! rising / falling windows and tweezers.

use super::{PatternRule, TrendGate};
use crate::{
    calibration::CalibrationContext,
    shape::{down_shadow_gap, up_shadow_gap, BodyBucket},
    window::CandleWindow,
    OHLCVExt,
};

pub const RULES: &[PatternRule] = &[
    PatternRule::new("bullish_engulfing", 2, TrendGate::Down, bullish_engulfing),
    PatternRule::new("bearish_engulfing", 2, TrendGate::Up, bearish_engulfing),
    PatternRule::new("bullish_harami", 2, TrendGate::Down, bullish_harami),
    PatternRule::new("bearish_harami", 2, TrendGate::Up, bearish_harami),
    PatternRule::new("piercing_line", 2, TrendGate::Down, piercing_line),
    PatternRule::new("dark_cloud_cover", 2, TrendGate::Up, dark_cloud_cover),
    PatternRule::new("rising_window", 2, TrendGate::Up, rising_window),
    PatternRule::new("falling_window", 2, TrendGate::Down, falling_window),
    PatternRule::new("tweezer_top", 2, TrendGate::Up, tweezer_top),
    PatternRule::new("tweezer_bottom", 2, TrendGate::Down, tweezer_bottom),
];

/// Current body covers the previous one and extends past at least one end.
fn body_engulfs(w: &CandleWindow<'_>) -> bool {
    let (prev, curr) = (w.bar(1), w.bar(0));
    curr.top() >= prev.top()
        && curr.bottom() <= prev.bottom()
        && (curr.top() > prev.top() || curr.bottom() < prev.bottom())
}

/// Current body sits inside the previous one.
fn body_inside(w: &CandleWindow<'_>) -> bool {
    let (prev, curr) = (w.bar(1), w.bar(0));
    curr.top() <= prev.top() && curr.bottom() >= prev.bottom()
}

// ============================================================
// ENGULFING / HARAMI
// ============================================================

pub fn bullish_engulfing(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.shape(1).is_black() && w.shape(0).is_white() && body_engulfs(w)
}

pub fn bearish_engulfing(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.shape(1).is_white() && w.shape(0).is_black() && body_engulfs(w)
}

/// Tall black body followed by a small white body inside it
pub fn bullish_harami(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (prev, curr) = (w.shape(1), w.shape(0));
    prev.is_black() && prev.is_tall() && curr.is_white() && curr.is_small() && body_inside(w)
}

/// Tall white body followed by a small black body inside it
pub fn bearish_harami(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (prev, curr) = (w.shape(1), w.shape(0));
    prev.is_white() && prev.is_tall() && curr.is_black() && curr.is_small() && body_inside(w)
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

/// Tall black bar, then a white bar opening below its low and closing above its midpoint.
pub fn piercing_line(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (prev, curr) = (w.bar(1), w.bar(0));
    let (ps, cs) = (w.shape(1), w.shape(0));
    ps.is_black()
        && ps.is_tall()
        && cs.is_white()
        && cs.body >= BodyBucket::Normal
        && curr.open < prev.low
        && curr.close > prev.midpoint()
        && curr.close < prev.open
}

/// Tall white bar, then a black bar opening above its high and closing below its midpoint.
pub fn dark_cloud_cover(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (prev, curr) = (w.bar(1), w.bar(0));
    let (ps, cs) = (w.shape(1), w.shape(0));
    ps.is_white()
        && ps.is_tall()
        && cs.is_black()
        && cs.body >= BodyBucket::Normal
        && curr.open > prev.high
        && curr.close < prev.midpoint()
        && curr.close > prev.open
}

// ============================================================
// WINDOWS
// ============================================================

pub fn rising_window(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    up_shadow_gap(w.bar(1).high, w.bar(0).low)
}

pub fn falling_window(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    down_shadow_gap(w.bar(1).low, w.bar(0).high)
}

// ============================================================
// TWEEZERS
// ============================================================

pub fn tweezer_top(w: &CandleWindow<'_>, ctx: &CalibrationContext) -> bool {
    w.shape(1).is_white() && w.shape(0).is_black() && ctx.near(w.bar(1).high, w.bar(0).high)
}

pub fn tweezer_bottom(w: &CandleWindow<'_>, ctx: &CalibrationContext) -> bool {
    w.shape(1).is_black() && w.shape(0).is_white() && ctx.near(w.bar(1).low, w.bar(0).low)
}

// ============================================================
// TESTS
// ============================================================
