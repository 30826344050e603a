//! Three-bar patterns: morning / evening star, three white soldiers, three
//! black crows and upside gap two crows.

use super::{PatternRule, TrendGate};
use crate::{
    calibration::CalibrationContext,
    shape::{down_body_gap, up_body_gap, BodyBucket, ShadowBucket},
    window::CandleWindow,
    OHLCVExt,
};

pub const RULES: &[PatternRule] = &[
    PatternRule::new("morning_star", 3, TrendGate::Down, morning_star),
    PatternRule::new("evening_star", 3, TrendGate::Up, evening_star),
    PatternRule::new("three_white_soldiers", 3, TrendGate::Down, three_white_soldiers),
    PatternRule::new("three_black_crows", 3, TrendGate::Up, three_black_crows),
    PatternRule::new("upside_gap_two_crows", 3, TrendGate::Up, upside_gap_two_crows),
];

// ============================================================
// STARS
// ============================================================

/// Tall black, small body gapping below it, white closing above the first midpoint.
pub fn morning_star(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (first, star, last) = (w.bar(2), w.bar(1), w.bar(0));
    let (s1, s2, s3) = (w.shape(2), w.shape(1), w.shape(0));
    s1.is_black()
        && s1.is_tall()
        && s2.is_small()
        && down_body_gap(first.bottom(), star.top())
        && s3.is_white()
        && s3.body >= BodyBucket::Normal
        && last.close > first.midpoint()
}

/// Tall white, small body gapping above it, black closing below the first midpoint.
pub fn evening_star(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (first, star, last) = (w.bar(2), w.bar(1), w.bar(0));
    let (s1, s2, s3) = (w.shape(2), w.shape(1), w.shape(0));
    s1.is_white()
        && s1.is_tall()
        && s2.is_small()
        && up_body_gap(first.top(), star.bottom())
        && s3.is_black()
        && s3.body >= BodyBucket::Normal
        && last.close < first.midpoint()
}

// ============================================================
// SOLDIERS / CROWS
// ============================================================

pub fn three_white_soldiers(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let shapes = w.shapes();
    let bars = w.bars();
    shapes
        .iter()
        .all(|s| s.is_white() && s.body >= BodyBucket::Normal && s.upper <= ShadowBucket::Small)
        && bars.windows(2).all(|p| {
            p[1].close > p[0].close && p[1].open > p[0].open && p[1].open <= p[0].close
        })
}

pub fn three_black_crows(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let shapes = w.shapes();
    let bars = w.bars();
    shapes
        .iter()
        .all(|s| s.is_black() && s.body >= BodyBucket::Normal && s.lower <= ShadowBucket::Small)
        && bars.windows(2).all(|p| {
            p[1].close < p[0].close && p[1].open < p[0].open && p[1].open >= p[0].close
        })
}

/// Tall white, black gapping up, second black engulfing the first but still above the white close.
pub fn upside_gap_two_crows(w: &CandleWindow<'_>, _ctx: &CalibrationContext) -> bool {
    let (first, crow, last) = (w.bar(2), w.bar(1), w.bar(0));
    let (s1, s2, s3) = (w.shape(2), w.shape(1), w.shape(0));
    s1.is_white()
        && s1.is_tall()
        && s2.is_black()
        && up_body_gap(first.top(), crow.bottom())
        && s3.is_black()
        && last.open > crow.open
        && last.close < crow.close
        && last.close > first.close
}

// ============================================================
// TESTS
// ============================================================
