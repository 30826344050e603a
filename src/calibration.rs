//! Percentile calibration of body and shadow buckets.
//!
//! Thresholds are computed once per run from a reference slice that strictly
//! precedes the data being classified, then frozen inside a
//! [`CalibrationContext`] that every classifier and rule call reads from.

use tracing::{debug, warn};

use crate::{
    config::RunConfig,
    shape::Shape,
    stats::{self, KsTest},
    validate_bars, Color, OHLCVExt, PatternError, Ratio, Result, OHLCV,
};

/// Default body percentiles (doji / short / normal / tall boundaries)
pub const DEFAULT_BODY_PERCENTILES: [f64; 3] = [10.0, 30.0, 70.0];
/// Default shadow percentiles (none / small / normal / long / extreme boundaries)
pub const DEFAULT_SHADOW_PERCENTILES: [f64; 4] = [10.0, 30.0, 70.0, 90.0];

// ============================================================
// THRESHOLDS
// ============================================================

/// Calibrated bucket boundaries in absolute price units.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CalibrationThresholds {
    /// Black and white bodies share one distribution.
    Unified {
        body: [f64; 3],
        upper_shadow: [f64; 4],
        lower_shadow: [f64; 4],
    },
    /// Black and white bodies are calibrated separately.
    Split {
        black_body: [f64; 3],
        white_body: [f64; 3],
        upper_shadow: [f64; 4],
        lower_shadow: [f64; 4],
    },
}

impl CalibrationThresholds {
    /// Body boundaries for a bar of the given colour. In split mode a
    /// neutral bar uses the element-wise minimum of both lists.
    pub fn body_levels(&self, color: Color) -> [f64; 3] {
        match self {
            Self::Unified { body, .. } => *body,
            Self::Split {
                black_body,
                white_body,
                ..
            } => match color {
                Color::Black => *black_body,
                Color::White => *white_body,
                Color::Neutral => [
                    black_body[0].min(white_body[0]),
                    black_body[1].min(white_body[1]),
                    black_body[2].min(white_body[2]),
                ],
            },
        }
    }

    pub fn upper_shadow_levels(&self) -> &[f64; 4] {
        match self {
            Self::Unified { upper_shadow, .. } | Self::Split { upper_shadow, .. } => upper_shadow,
        }
    }

    pub fn lower_shadow_levels(&self) -> &[f64; 4] {
        match self {
            Self::Unified { lower_shadow, .. } | Self::Split { lower_shadow, .. } => lower_shadow,
        }
    }

    #[inline]
    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split { .. })
    }

    /// Every boundary value, in no particular order.
    fn all_levels(&self) -> Vec<f64> {
        let mut levels = Vec::with_capacity(14);
        match self {
            Self::Unified { body, .. } => levels.extend_from_slice(body),
            Self::Split {
                black_body,
                white_body,
                ..
            } => {
                levels.extend_from_slice(black_body);
                levels.extend_from_slice(white_body);
            }
        }
        levels.extend_from_slice(self.upper_shadow_levels());
        levels.extend_from_slice(self.lower_shadow_levels());
        levels
    }

    /// Boundaries must be finite, non-negative and non-decreasing.
    pub fn validate(&self) -> Result<()> {
        fn check(field: &'static str, levels: &[f64]) -> Result<()> {
            if levels.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(PatternError::InvalidValue(
                    "threshold must be finite and non-negative",
                ));
            }
            if levels.windows(2).any(|w| w[0] > w[1]) {
                return Err(PatternError::NonMonotonicPercentiles { field });
            }
            Ok(())
        }

        match self {
            Self::Unified { body, .. } => check("body", body)?,
            Self::Split {
                black_body,
                white_body,
                ..
            } => {
                check("black_body", black_body)?;
                check("white_body", white_body)?;
            }
        }
        check("upper_shadow", self.upper_shadow_levels())?;
        check("lower_shadow", self.lower_shadow_levels())
    }
}

// ============================================================
// CONTEXT
// ============================================================

/// Immutable calibration shared by every classification in a run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CalibrationContext {
    thresholds: CalibrationThresholds,
    near_tolerance: f64,
    distribution_test: Option<KsTest>,
}

impl CalibrationContext {
    /// Wrap externally supplied thresholds.
    pub fn new(thresholds: CalibrationThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            near_tolerance: near_tolerance(&thresholds),
            thresholds,
            distribution_test: None,
        })
    }

    #[inline]
    pub fn thresholds(&self) -> &CalibrationThresholds {
        &self.thresholds
    }

    /// KS test of black vs white body lengths, if it could be run.
    #[inline]
    pub fn distribution_test(&self) -> Option<&KsTest> {
        self.distribution_test.as_ref()
    }

    #[inline]
    pub fn shape<T: OHLCV>(&self, bar: &T) -> Shape {
        Shape::classify(bar, self)
    }

    /// Largest distance still considered "near".
    #[inline]
    pub fn near_tolerance(&self) -> f64 {
        self.near_tolerance
    }

    /// `|a - b|` within the smallest positive calibrated boundary.
    #[inline]
    pub fn near(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.near_tolerance
    }
}

fn near_tolerance(thresholds: &CalibrationThresholds) -> f64 {
    let smallest = thresholds
        .all_levels()
        .into_iter()
        .filter(|v| *v > 0.0)
        .fold(f64::INFINITY, f64::min);
    if smallest.is_finite() {
        smallest
    } else {
        0.0
    }
}

// ============================================================
// CALIBRATOR
// ============================================================

/// Computes [`CalibrationThresholds`] from a reference slice.
#[derive(Debug, Clone)]
pub struct Calibrator {
    body_percentiles: [f64; 3],
    shadow_percentiles: [f64; 4],
    significance_level: Ratio,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            body_percentiles: DEFAULT_BODY_PERCENTILES,
            shadow_percentiles: DEFAULT_SHADOW_PERCENTILES,
            significance_level: Ratio::new_const(0.05),
        }
    }
}

impl Calibrator {
    pub fn new(
        body_percentiles: [f64; 3],
        shadow_percentiles: [f64; 4],
        significance_level: Ratio,
    ) -> Result<Self> {
        check_percentile_list("body_percentiles", &body_percentiles)?;
        check_percentile_list("shadow_percentiles", &shadow_percentiles)?;
        Ok(Self {
            body_percentiles,
            shadow_percentiles,
            significance_level,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(
            config.body_percentiles,
            config.shadow_percentiles,
            config.significance_level,
        )
    }

    /// Calibrate from a reference slice.
    ///
    /// Black and white body lengths are compared with a two-sample KS test; if
    /// equality is rejected the body boundaries are split per colour. Shadows
    /// are always pooled. An empty colour group falls back to pooled bodies.
    pub fn calibrate<T: OHLCV>(&self, reference: &[T]) -> Result<CalibrationContext> {
        if reference.is_empty() {
            return Err(PatternError::InsufficientData { need: 1, got: 0 });
        }
        validate_bars(reference)?;

        let mut pooled = Vec::with_capacity(reference.len());
        let mut black = Vec::new();
        let mut white = Vec::new();
        let mut upper = Vec::with_capacity(reference.len());
        let mut lower = Vec::with_capacity(reference.len());

        for bar in reference {
            let body = bar.body();
            pooled.push(body);
            match bar.color() {
                Color::Black => black.push(body),
                Color::White => white.push(body),
                Color::Neutral => {}
            }
            upper.push(bar.upper_shadow());
            lower.push(bar.lower_shadow());
        }

        let insufficient = || PatternError::InsufficientData {
            need: 1,
            got: reference.len(),
        };
        let upper_shadow = stats::percentiles(&upper, &self.shadow_percentiles)
            .ok_or_else(insufficient)?;
        let lower_shadow = stats::percentiles(&lower, &self.shadow_percentiles)
            .ok_or_else(insufficient)?;

        let distribution_test = stats::ks_2samp(&black, &white);

        let thresholds = match distribution_test {
            Some(ks) if ks.rejects(self.significance_level.get()) => {
                debug!(
                    statistic = ks.statistic,
                    p_value = ks.p_value,
                    black = black.len(),
                    white = white.len(),
                    "body distributions differ, calibrating per colour"
                );
                CalibrationThresholds::Split {
                    black_body: stats::percentiles(&black, &self.body_percentiles)
                        .ok_or_else(insufficient)?,
                    white_body: stats::percentiles(&white, &self.body_percentiles)
                        .ok_or_else(insufficient)?,
                    upper_shadow,
                    lower_shadow,
                }
            }
            test => {
                match test {
                    Some(ks) => debug!(
                        statistic = ks.statistic,
                        p_value = ks.p_value,
                        "body distributions indistinguishable, pooling"
                    ),
                    None => warn!(
                        black = black.len(),
                        white = white.len(),
                        "empty colour group in reference slice, falling back to pooled bodies"
                    ),
                }
                CalibrationThresholds::Unified {
                    body: stats::percentiles(&pooled, &self.body_percentiles)
                        .ok_or_else(insufficient)?,
                    upper_shadow,
                    lower_shadow,
                }
            }
        };

        let mut ctx = CalibrationContext::new(thresholds)?;
        ctx.distribution_test = distribution_test;
        Ok(ctx)
    }
}

/// Percentile lists must lie in [0, 100] and be non-decreasing.
pub(crate) fn check_percentile_list(field: &'static str, values: &[f64]) -> Result<()> {
    for &v in values {
        if !v.is_finite() || !(0.0..=100.0).contains(&v) {
            return Err(PatternError::OutOfRange {
                field,
                value: v,
                min: 0.0,
                max: 100.0,
            });
        }
    }
    if values.windows(2).any(|w| w[0] > w[1]) {
        return Err(PatternError::NonMonotonicPercentiles { field });
    }
    Ok(())
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(0, o, h, l, c, 0.0)
    }

    /// Black and white bodies drawn from the same lengths.
    fn symmetric_reference() -> Vec<Bar> {
        (0..60)
            .map(|i| {
                let body = 0.5 + ((i / 2) % 5) as f64 * 0.2;
                let o = 100.0;
                let c = if i % 2 == 0 { o + body } else { o - body };
                bar(o, o.max(c) + 0.3, o.min(c) - 0.2, c)
            })
            .collect()
    }

    #[test]
    fn test_symmetric_bodies_are_unified() {
        let ctx = Calibrator::default().calibrate(&symmetric_reference()).unwrap();
        assert!(!ctx.thresholds().is_split());
        assert!(ctx.distribution_test().is_some());
    }

    #[test]
    fn test_asymmetric_bodies_are_split() {
        let reference: Vec<Bar> = (0..200)
            .map(|i| {
                let o = 100.0;
                if i % 2 == 0 {
                    let c = o + 5.0 + (i % 7) as f64 * 0.1;
                    bar(o, c + 0.5, o - 0.5, c)
                } else {
                    let c = o - 0.1 - (i % 7) as f64 * 0.01;
                    bar(o, o + 0.5, c - 0.5, c)
                }
            })
            .collect();
        let ctx = Calibrator::default().calibrate(&reference).unwrap();
        match ctx.thresholds() {
            CalibrationThresholds::Split {
                black_body,
                white_body,
                ..
            } => assert!(white_body[0] > black_body[2]),
            other => panic!("expected split thresholds, got {other:?}"),
        }
    }

    #[test]
    fn test_single_colour_falls_back_to_unified() {
        let reference: Vec<Bar> = (0..20)
            .map(|i| bar(100.0, 102.0 + i as f64, 99.0, 101.0 + i as f64 * 0.1))
            .collect();
        let ctx = Calibrator::default().calibrate(&reference).unwrap();
        assert!(!ctx.thresholds().is_split());
        assert!(ctx.distribution_test().is_none());
    }

    #[test]
    fn test_percentiles_non_decreasing() {
        let ctx = Calibrator::default().calibrate(&symmetric_reference()).unwrap();
        let t = ctx.thresholds();
        for color in [Color::Black, Color::White, Color::Neutral] {
            let b = t.body_levels(color);
            assert!(b[0] <= b[1] && b[1] <= b[2]);
        }
        assert!(t.upper_shadow_levels().windows(2).all(|w| w[0] <= w[1]));
        assert!(t.lower_shadow_levels().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_empty_reference_is_error() {
        let result = Calibrator::default().calibrate::<Bar>(&[]);
        assert!(matches!(result, Err(PatternError::InsufficientData { .. })));
    }

    #[test]
    fn test_invalid_reference_bar_is_error() {
        let reference = vec![bar(100.0, 101.0, 99.0, 100.5), bar(100.0, 98.0, 99.0, 100.0)];
        let result = Calibrator::default().calibrate(&reference);
        assert!(matches!(result, Err(PatternError::InvalidOHLCV { index: 1, .. })));
    }

    #[test]
    fn test_non_monotonic_percentiles_rejected() {
        let result = Calibrator::new(
            [10.0, 70.0, 30.0],
            DEFAULT_SHADOW_PERCENTILES,
            Ratio::new_const(0.05),
        );
        assert!(matches!(
            result,
            Err(PatternError::NonMonotonicPercentiles { field: "body_percentiles" })
        ));
        let result = Calibrator::new(
            DEFAULT_BODY_PERCENTILES,
            [10.0, 30.0, 70.0, 120.0],
            Ratio::new_const(0.05),
        );
        assert!(matches!(result, Err(PatternError::OutOfRange { .. })));
    }

    #[test]
    fn test_neutral_bar_uses_minimum_levels() {
        let t = CalibrationThresholds::Split {
            black_body: [1.0, 4.0, 5.0],
            white_body: [2.0, 3.0, 6.0],
            upper_shadow: [0.0; 4],
            lower_shadow: [0.0; 4],
        };
        assert_eq!(t.body_levels(Color::Neutral), [1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_near_uses_smallest_positive_boundary() {
        let ctx = CalibrationContext::new(CalibrationThresholds::Unified {
            body: [0.4, 1.0, 2.0],
            upper_shadow: [0.0, 0.2, 0.5, 1.0],
            lower_shadow: [0.1, 0.3, 0.6, 1.2],
        })
        .unwrap();
        assert_eq!(ctx.near_tolerance(), 0.1);
        assert!(ctx.near(100.0, 100.1));
        assert!(!ctx.near(100.0, 100.2));
    }

    #[test]
    fn test_context_rejects_unsorted_thresholds() {
        let result = CalibrationContext::new(CalibrationThresholds::Unified {
            body: [2.0, 1.0, 3.0],
            upper_shadow: [0.0; 4],
            lower_shadow: [0.0; 4],
        });
        assert!(matches!(result, Err(PatternError::NonMonotonicPercentiles { field: "body" })));
    }

    #[test]
    fn test_calibration_ignores_later_data() {
        let reference = symmetric_reference();
        let a = Calibrator::default().calibrate(&reference).unwrap();
        let mut extended = reference.clone();
        extended.push(bar(100.0, 150.0, 50.0, 140.0));
        let b = Calibrator::default().calibrate(&extended[..reference.len()]).unwrap();
        assert_eq!(a, b);
    }
}
