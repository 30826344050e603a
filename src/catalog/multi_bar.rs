//! Patterns spanning four or more bars.
//!
//! New price lines are registered once per supported long window (8, 10, 11,
//! 12 and 13 bars); the predicate reads the length from the window itself.

use super::{PatternRule, TrendGate};
use crate::{
    calibration::CalibrationContext,
    shape::{down_body_gap, BodyBucket},
    window::CandleWindow,
    OHLCVExt,
};

pub const RULES: &[PatternRule] = &[
    PatternRule::new("concealing_baby_swallow", 4, TrendGate::Down, concealing_baby_swallow),
    PatternRule::new("bullish_three_line_strike", 4, TrendGate::Up, bullish_three_line_strike),
    PatternRule::new("bearish_three_line_strike", 4, TrendGate::Down, bearish_three_line_strike),
    PatternRule::new("rising_three_methods", 5, TrendGate::Up, rising_three_methods),
    PatternRule::new("falling_three_methods", 5, TrendGate::Down, falling_three_methods),
    PatternRule::new("new_price_lines_up", 8, TrendGate::Up, new_price_lines_up),
    PatternRule::new("new_price_lines_up", 10, TrendGate::Up, new_price_lines_up),
    PatternRule::new("new_price_lines_up", 11, TrendGate::Up, new_price_lines_up),
    PatternRule::new("new_price_lines_up", 12, TrendGate::Up, new_price_lines_up),
    PatternRule::new("new_price_lines_up", 13, TrendGate::Up, new_price_lines_up),
    PatternRule::new("new_price_lines_down", 8, TrendGate::Down, new_price_lines_down),
    PatternRule::new("new_price_lines_down", 10, TrendGate::Down, new_price_lines_down),
    PatternRule::new("new_price_lines_down", 11, TrendGate::Down, new_price_lines_down),
    PatternRule::new("new_price_lines_down", 12, TrendGate::Down, new_price_lines_down),
    PatternRule::new("new_price_lines_down", 13, TrendGate::Down, new_price_lines_down),
];

// ============================================================
// FOUR BARS
// ============================================================

/// Two black marubozu, a black bar gapping down whose upper shadow reaches
/// into the prior body, then a black bar engulfing it shadows included.
pub fn concealing_baby_swallow(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (s1, s2, s3, s4) = (w.shape(3), w.shape(2), w.shape(1), w.shape(0));
    let (b2, b3, b4) = (w.bar(2), w.bar(1), w.bar(0));
    let marubozu = |s: crate::shape::Shape| s.is_black() && s.is_tall() && s.is_shaven();

    marubozu(s1)
        && marubozu(s2)
        && s3.is_black()
        && down_body_gap(b2.bottom(), b3.top())
        && b3.high > b2.close
        && s4.is_black()
        && b4.top() >= b3.high
        && b4.bottom() <= b3.low
}

/// Three rising white bars, then a black bar opening above the last close
/// and closing below the first open.
pub fn bullish_three_line_strike(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let bars = &w.bars()[..3];
    let shapes = &w.shapes()[..3];
    let strike = w.bar(0);
    shapes.iter().all(|s| s.is_white())
        && bars.windows(2).all(|p| p[1].close > p[0].close)
        && w.shape(0).is_black()
        && strike.open > bars[2].close
        && strike.close < bars[0].open
}

pub fn bearish_three_line_strike(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let bars = &w.bars()[..3];
    let shapes = &w.shapes()[..3];
    let strike = w.bar(0);
    shapes.iter().all(|s| s.is_black())
        && bars.windows(2).all(|p| p[1].close < p[0].close)
        && w.shape(0).is_white()
        && strike.open < bars[2].close
        && strike.close > bars[0].open
}

// ============================================================
// FIVE BARS
// ============================================================

/// Tall white, three small bodies inside its range, tall white closing higher.
pub fn rising_three_methods(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (first, last) = (w.bar(4), w.bar(0));
    let (s1, s5) = (w.shape(4), w.shape(0));
    let inner = &w.bars()[1..4];
    let inner_shapes = &w.shapes()[1..4];

    s1.is_white()
        && s1.is_tall()
        && inner_shapes.iter().all(|s| s.body <= BodyBucket::Short)
        && inner.iter().all(|b| b.high <= first.high && b.low >= first.low)
        && s5.is_white()
        && s5.is_tall()
        && last.close > first.close
}

/// Tall black, three small bodies inside its range, tall black closing lower.
pub fn falling_three_methods(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (first, last) = (w.bar(4), w.bar(0));
    let (s1, s5) = (w.shape(4), w.shape(0));
    let inner = &w.bars()[1..4];
    let inner_shapes = &w.shapes()[1..4];

    s1.is_black()
        && s1.is_tall()
        && inner_shapes.iter().all(|s| s.body <= BodyBucket::Short)
        && inner.iter().all(|b| b.high <= first.high && b.low >= first.low)
        && s5.is_black()
        && s5.is_tall()
        && last.close < first.close
}

// ============================================================
// NEW PRICE LINES
// ============================================================

/// Every bar after the first closes at a new high for the window.
pub fn new_price_lines_up(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.len() >= 2 && w.bars().windows(2).all(|p| p[1].close > p[0].close)
}

/// Every bar after the first closes at a new low for the window.
pub fn new_price_lines_down(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    w.len() >= 2 && w.bars().windows(2).all(|p| p[1].close < p[0].close)
}

// ============================================================
// TESTS
// ============================================================
