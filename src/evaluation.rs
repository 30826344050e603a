//! Forward evaluation of detections.
//!
//! Two strategies run over the main slice:
//!
//! - **Stop-loss / take-profit scan**: from the detection bar, enter at its
//!   open and walk forward until price reaches the take-profit or stop-loss
//!   band. Both in one bar, or no hit before the data ends, is undefined.
//! - **Fixed holding period**: `close[i + h] - open[i]` for each horizon.
//!
//! Scan outcomes are aggregated into a win rate and tested against a null
//! rate with one-sided exact binomial tests.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    catalog::RuleKey,
    config::{MarginSpec, NullRate, RunConfig},
    runner::DetectionSet,
    stats::{self, binomial_test},
    to_bars, Bar, OHLCVExt, PatternError, Period, Result, OHLCV,
};

/// Null rate used when the empirical estimate is not evaluable.
pub const FALLBACK_NULL_RATE: f64 = 0.5;

// ============================================================
// OUTCOME
// ============================================================

/// Result of one stop-loss / take-profit scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    /// Both bands crossed in one bar, or history exhausted.
    Undefined,
}

impl Outcome {
    /// `1.0`, `0.0` or `NaN`.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
            Outcome::Undefined => f64::NAN,
        }
    }

    #[inline]
    pub fn is_defined(self) -> bool {
        self != Outcome::Undefined
    }
}

/// Scan forward from `index` (inclusive) with entry price `open[index]`.
///
/// Take profit is `high >= P * (1 + margin)`, stop loss `low <= P * (1 - margin)`.
/// An index past the end yields `Undefined`.
pub fn scan_outcome<T: OHLCV>(bars: &[T], index: usize, margin: f64) -> Outcome {
    let Some(entry) = bars.get(index) else {
        return Outcome::Undefined;
    };
    let price = entry.open();
    let take_profit = price * (1.0 + margin);
    let stop_loss = price * (1.0 - margin);

    for bar in &bars[index..] {
        let tp = bar.high() >= take_profit;
        let sl = bar.low() <= stop_loss;
        match (tp, sl) {
            (true, true) => return Outcome::Undefined,
            (true, false) => return Outcome::Win,
            (false, true) => return Outcome::Loss,
            (false, false) => {}
        }
    }
    Outcome::Undefined
}

/// Scan outcome for every bar.
pub fn outcome_series<T: OHLCV + Sync>(bars: &[T], margin: f64) -> Vec<Outcome> {
    (0..bars.len())
        .into_par_iter()
        .map(|i| scan_outcome(bars, i, margin))
        .collect()
}

/// Scan outcome at every bar some series of `set` detected, `None` elsewhere.
pub fn detected_outcomes<T: OHLCV + Sync>(
    bars: &[T],
    set: &DetectionSet,
    margin: f64,
) -> Vec<Option<Outcome>> {
    let mut detected = vec![false; bars.len()];
    for i in set.iter().flat_map(|d| d.indices()) {
        if let Some(slot) = detected.get_mut(i) {
            *slot = true;
        }
    }
    detected
        .par_iter()
        .enumerate()
        .map(|(i, &hit)| hit.then(|| scan_outcome(bars, i, margin)))
        .collect()
}

// ============================================================
// WIN RATE
// ============================================================

/// Win rate, or the "/" marker when fewer than two outcomes are defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WinRate {
    Evaluable(f64),
    NotEvaluable,
}

impl WinRate {
    /// Mean of defined outcomes; not evaluable below two samples.
    pub fn from_counts(wins: usize, sample_size: usize) -> Self {
        if sample_size <= 1 {
            WinRate::NotEvaluable
        } else {
            WinRate::Evaluable(wins as f64 / sample_size as f64)
        }
    }

    #[inline]
    pub fn value(self) -> Option<f64> {
        match self {
            WinRate::Evaluable(v) => Some(v),
            WinRate::NotEvaluable => None,
        }
    }

    #[inline]
    pub fn is_evaluable(self) -> bool {
        matches!(self, WinRate::Evaluable(_))
    }
}

impl std::fmt::Display for WinRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WinRate::Evaluable(v) => write!(f, "{v}"),
            WinRate::NotEvaluable => f.write_str("/"),
        }
    }
}

impl serde::Serialize for WinRate {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            WinRate::Evaluable(v) => s.serialize_f64(*v),
            WinRate::NotEvaluable => s.serialize_str("/"),
        }
    }
}

// ============================================================
// RECORDS
// ============================================================

/// Fixed-holding-period returns for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HoldingStats {
    pub holding_period: usize,
    pub sample_size: usize,
    pub buy_mean_profit: f64,
    pub buy_win_rate: f64,
    pub sell_mean_profit: f64,
    pub sell_win_rate: f64,
}

/// Aggregate evaluation of one detection series.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EvaluationRecord {
    pub key: RuleKey,
    pub column: String,
    pub detections: usize,
    pub win_rate: WinRate,
    pub null_rate: WinRate,
    pub sample_size: usize,
    pub wins: usize,
    /// P(X >= wins) under the null; `None` when not evaluable.
    pub p_greater: Option<f64>,
    /// P(X <= wins) under the null; `None` when not evaluable.
    pub p_less: Option<f64>,
    pub holding: Vec<HoldingStats>,
}

impl EvaluationRecord {
    /// True if either one-sided test rejects at `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_greater.is_some_and(|p| p < alpha) || self.p_less.is_some_and(|p| p < alpha)
    }
}

/// Holding-period statistics for detections at `indices`. Horizons with no
/// forward data are skipped.
pub fn holding_stats(bars: &[Bar], indices: &[usize], max_holding: usize) -> Vec<HoldingStats> {
    (1..=max_holding)
        .filter_map(|h| {
            let returns: Vec<f64> = indices
                .iter()
                .filter(|&&i| i + h < bars.len())
                .map(|&i| bars[i + h].close - bars[i].open)
                .collect();
            let buy_mean = stats::mean(&returns)?;
            let n = returns.len() as f64;
            Some(HoldingStats {
                holding_period: h,
                sample_size: returns.len(),
                buy_mean_profit: buy_mean,
                buy_win_rate: returns.iter().filter(|r| **r > 0.0).count() as f64 / n,
                sell_mean_profit: -buy_mean,
                sell_win_rate: returns.iter().filter(|r| **r < 0.0).count() as f64 / n,
            })
        })
        .collect()
}

// ============================================================
// EVALUATOR
// ============================================================

/// Evaluates every series of a [`DetectionSet`].
#[derive(Debug, Clone)]
pub struct Evaluator {
    margin: MarginSpec,
    null_rate: NullRate,
    max_holding_period: Period,
}

impl Evaluator {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            margin: config.margin,
            null_rate: config.null_rate,
            max_holding_period: config.max_holding_period,
        })
    }

    /// Concrete margin for this run. A volatility margin only reads the
    /// reference slice.
    pub fn resolve_margin<T: OHLCV>(&self, reference: &[T]) -> Result<f64> {
        match self.margin {
            MarginSpec::Fixed(m) => Ok(m),
            MarginSpec::Volatility { period, multiplier } => {
                let margin = multiplier * relative_true_range(reference, period.get())?;
                if margin.is_finite() && margin > 0.0 {
                    Ok(margin)
                } else {
                    Err(PatternError::InvalidValue(
                        "volatility margin must be positive and finite",
                    ))
                }
            }
        }
    }

    /// Evaluate each detection series against the main slice it was run on.
    pub fn evaluate<T: OHLCV>(
        &self,
        set: &DetectionSet,
        reference: &[T],
        main: &[T],
    ) -> Result<Vec<EvaluationRecord>> {
        if main.len() != set.bars() {
            return Err(PatternError::LengthMismatch {
                field: "main",
                expected: set.bars(),
                got: main.len(),
            });
        }

        let margin = self.resolve_margin(reference)?;
        let bars = to_bars(main);
        // Only the empirical null needs a scan from every bar.
        let outcomes: Vec<Option<Outcome>> = match self.null_rate {
            NullRate::Empirical => outcome_series(&bars, margin).into_iter().map(Some).collect(),
            NullRate::Fixed(_) => detected_outcomes(&bars, set, margin),
        };
        let (null_rate, null_report) = self.resolve_null_rate(&outcomes);
        debug!(margin, null_rate, "evaluating {} series", set.len());

        let records: Vec<EvaluationRecord> = set
            .detections
            .par_iter()
            .map(|d| self.evaluate_series(d.key, &d.hits, &bars, &outcomes, null_rate, null_report))
            .collect();

        info!(
            patterns = records.len(),
            evaluable = records.iter().filter(|r| r.win_rate.is_evaluable()).count(),
            "evaluation complete"
        );
        Ok(records)
    }

    /// Evaluate one series given precomputed scan outcomes. A hit with no
    /// scanned outcome counts as undefined.
    pub fn evaluate_series(
        &self,
        key: RuleKey,
        hits: &[bool],
        bars: &[Bar],
        outcomes: &[Option<Outcome>],
        null_rate: f64,
        null_report: WinRate,
    ) -> EvaluationRecord {
        let indices: Vec<usize> = hits
            .iter()
            .enumerate()
            .filter_map(|(i, &h)| h.then_some(i))
            .collect();

        let (wins, sample_size) = indices
            .iter()
            .filter_map(|&i| outcomes.get(i).copied().flatten())
            .fold((0, 0), |(w, n), o| match o {
                Outcome::Win => (w + 1, n + 1),
                Outcome::Loss => (w, n + 1),
                Outcome::Undefined => (w, n),
            });

        let win_rate = WinRate::from_counts(wins, sample_size);
        let (p_greater, p_less) = if win_rate.is_evaluable() {
            let test = binomial_test(wins, sample_size, null_rate);
            (Some(test.greater), Some(test.less))
        } else {
            (None, None)
        };

        EvaluationRecord {
            key,
            column: key.column_name(),
            detections: indices.len(),
            win_rate,
            null_rate: null_report,
            sample_size,
            wins,
            p_greater,
            p_less,
            holding: holding_stats(bars, &indices, self.max_holding_period.get()),
        }
    }

    /// Rate used by the tests and the value reported in each record.
    fn resolve_null_rate(&self, outcomes: &[Option<Outcome>]) -> (f64, WinRate) {
        match self.null_rate {
            NullRate::Fixed(p) => (p, WinRate::Evaluable(p)),
            NullRate::Empirical => {
                let scanned = || outcomes.iter().flatten();
                let wins = scanned().filter(|o| **o == Outcome::Win).count();
                let n = scanned().filter(|o| o.is_defined()).count();
                match WinRate::from_counts(wins, n) {
                    WinRate::Evaluable(p) => (p, WinRate::Evaluable(p)),
                    WinRate::NotEvaluable => {
                        warn!(
                            defined = n,
                            fallback = FALLBACK_NULL_RATE,
                            "empirical null rate not evaluable"
                        );
                        (FALLBACK_NULL_RATE, WinRate::NotEvaluable)
                    }
                }
            }
        }
    }
}

/// Mean of `true_range_t / close_{t-1}` over the last `period` bars that have
/// a predecessor.
fn relative_true_range<T: OHLCV>(bars: &[T], period: usize) -> Result<f64> {
    if bars.len() < 2 {
        return Err(PatternError::InsufficientData {
            need: 2,
            got: bars.len(),
        });
    }
    let start = bars.len().saturating_sub(period + 1);
    let ranges: Vec<f64> = bars[start..]
        .windows(2)
        .map(|p| p[1].true_range(p[0].close()) / p[0].close())
        .filter(|r| r.is_finite())
        .collect();
    stats::mean(&ranges).ok_or(PatternError::InvalidValue(
        "no finite true range in reference slice",
    ))
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::CalibrationThresholds,
        catalog::TrendGate,
        runner::Detection,
        TrendLabel,
    };

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(0, o, h, l, c, 0.0)
    }

    fn key() -> RuleKey {
        RuleKey::new("test", 1, TrendGate::Any)
    }

    fn evaluator(null_rate: NullRate) -> Evaluator {
        Evaluator::from_config(&RunConfig {
            margin: MarginSpec::Fixed(0.01),
            null_rate,
            max_holding_period: Period::new_const(3),
            ..RunConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_take_profit_is_win() {
        let bars = [
            bar(100.0, 100.5, 99.5, 100.2),
            bar(100.2, 101.5, 99.8, 101.2),
        ];
        assert_eq!(scan_outcome(&bars, 0, 0.01), Outcome::Win);
    }

    #[test]
    fn test_stop_loss_is_loss() {
        let bars = [
            bar(100.0, 100.5, 99.5, 99.6),
            bar(99.6, 99.9, 98.5, 98.8),
        ];
        assert_eq!(scan_outcome(&bars, 0, 0.01), Outcome::Loss);
    }

    #[test]
    fn test_both_bands_in_one_bar_is_undefined() {
        let bars = [
            bar(100.0, 100.5, 99.5, 100.0),
            bar(100.0, 101.5, 98.5, 100.0),
        ];
        assert_eq!(scan_outcome(&bars, 0, 0.01), Outcome::Undefined);
        assert!(Outcome::Undefined.as_f64().is_nan());
    }

    #[test]
    fn test_exhausted_history_is_undefined() {
        let bars = [
            bar(100.0, 100.5, 99.5, 100.0),
            bar(100.0, 100.8, 99.2, 100.1),
        ];
        assert_eq!(scan_outcome(&bars, 0, 0.01), Outcome::Undefined);
        assert_eq!(scan_outcome(&bars, 5, 0.01), Outcome::Undefined);
    }

    #[test]
    fn test_scan_starts_at_detection_bar() {
        let bars = [bar(100.0, 101.2, 99.5, 101.0)];
        assert_eq!(scan_outcome(&bars, 0, 0.01), Outcome::Win);
    }

    #[test]
    fn test_all_wins_are_significant() {
        let n = 40;
        let bars: Vec<Bar> = (0..n).map(|_| bar(100.0, 100.5, 99.5, 100.0)).collect();
        let hits: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
        let outcomes = vec![Some(Outcome::Win); n];
        let record = evaluator(NullRate::default()).evaluate_series(
            key(),
            &hits,
            &bars,
            &outcomes,
            0.5,
            WinRate::Evaluable(0.5),
        );
        assert_eq!(record.sample_size, 20);
        assert_eq!(record.win_rate, WinRate::Evaluable(1.0));
        assert!(record.p_greater.unwrap() < 1e-4);
        assert!(record.p_less.unwrap() > 0.99);
        assert!(record.is_significant(0.05));
    }

    #[test]
    fn test_single_outcome_not_evaluable() {
        let bars: Vec<Bar> = (0..4).map(|_| bar(100.0, 100.5, 99.5, 100.0)).collect();
        let outcomes = [
            Some(Outcome::Win),
            Some(Outcome::Undefined),
            Some(Outcome::Undefined),
            None,
        ];
        let record = evaluator(NullRate::default()).evaluate_series(
            key(),
            &[true, true, true, false],
            &bars,
            &outcomes,
            0.5,
            WinRate::Evaluable(0.5),
        );
        assert_eq!(record.detections, 3);
        assert_eq!(record.sample_size, 1);
        assert_eq!(record.win_rate, WinRate::NotEvaluable);
        assert_eq!(record.p_greater, None);
        assert!(!record.is_significant(0.05));
    }

    #[test]
    fn test_holding_stats_skip_missing_horizons() {
        let bars = vec![
            bar(100.0, 101.0, 99.0, 100.0),
            bar(100.0, 102.0, 99.0, 101.0),
            bar(101.0, 102.0, 98.0, 99.0),
        ];
        let stats = holding_stats(&bars, &[0, 1], 5);
        assert_eq!(stats.len(), 2);

        // h = 1: 101 - 100 = 1 and 99 - 100 = -1
        assert_eq!(stats[0].sample_size, 2);
        assert_eq!(stats[0].buy_mean_profit, 0.0);
        assert_eq!(stats[0].buy_win_rate, 0.5);
        assert_eq!(stats[0].sell_win_rate, 0.5);

        // h = 2: only the first detection, 99 - 100 = -1
        assert_eq!(stats[1].sample_size, 1);
        assert_eq!(stats[1].buy_mean_profit, -1.0);
        assert_eq!(stats[1].sell_mean_profit, 1.0);
        assert_eq!(stats[1].sell_win_rate, 1.0);
    }

    #[test]
    fn test_volatility_margin() {
        let reference = vec![
            bar(100.0, 101.0, 99.0, 100.0),
            bar(100.0, 102.0, 100.0, 101.0),
            bar(101.0, 101.0, 99.0, 100.0),
        ];
        let evaluator = Evaluator::from_config(&RunConfig {
            margin: MarginSpec::Volatility {
                period: Period::new_const(2),
                multiplier: 2.0,
            },
            ..RunConfig::default()
        })
        .unwrap();
        // true ranges: 2/100 and 2/101
        let expected = 2.0 * (0.02 + 2.0 / 101.0) / 2.0;
        let margin = evaluator.resolve_margin(&reference).unwrap();
        assert!((margin - expected).abs() < 1e-12);

        assert!(matches!(
            evaluator.resolve_margin(&reference[..1]),
            Err(PatternError::InsufficientData { need: 2, got: 1 })
        ));
    }

    #[test]
    fn test_empirical_null_fallback() {
        let outcomes = [Some(Outcome::Undefined), Some(Outcome::Win), None];
        let (rate, report) = evaluator(NullRate::Empirical).resolve_null_rate(&outcomes);
        assert_eq!(rate, FALLBACK_NULL_RATE);
        assert_eq!(report, WinRate::NotEvaluable);

        let outcomes = [Outcome::Win, Outcome::Loss, Outcome::Loss, Outcome::Loss].map(Some);
        let (rate, report) = evaluator(NullRate::Empirical).resolve_null_rate(&outcomes);
        assert_eq!(rate, 0.25);
        assert_eq!(report, WinRate::Evaluable(0.25));
    }

    fn detection_set(hits: Vec<Vec<bool>>) -> DetectionSet {
        let bars = hits.first().map_or(0, Vec::len);
        DetectionSet {
            thresholds: CalibrationThresholds::Unified {
                body: [0.2, 0.5, 1.0],
                upper_shadow: [0.1, 0.3, 0.6, 1.0],
                lower_shadow: [0.1, 0.3, 0.6, 1.0],
            },
            trend: vec![TrendLabel::Flat; bars],
            gaps: vec![false; bars],
            detections: hits
                .into_iter()
                .enumerate()
                .map(|(i, hits)| Detection {
                    key: RuleKey::new("test", i + 1, TrendGate::Any),
                    hits,
                })
                .collect(),
        }
    }

    #[test]
    fn test_fixed_null_scans_only_detected_bars() {
        let bars: Vec<Bar> = (0..6).map(|_| bar(100.0, 101.5, 99.5, 100.0)).collect();

        let quiet = detection_set(vec![vec![false; 6]]);
        assert!(detected_outcomes(&bars, &quiet, 0.01).iter().all(Option::is_none));

        let set = detection_set(vec![
            vec![false, true, false, false, false, false],
            vec![false, true, false, false, true, false],
        ]);
        let outcomes = detected_outcomes(&bars, &set, 0.01);
        let scanned: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.map(|_| i))
            .collect();
        assert_eq!(scanned, vec![1, 4]);
        assert_eq!(outcomes[4], Some(Outcome::Win));
    }

    #[test]
    fn test_quiet_set_on_long_history() {
        let n = 200_000;
        // Flat bars never reach either band, so a full scan is quadratic.
        let bars: Vec<Bar> = (0..n).map(|_| bar(100.0, 100.1, 99.9, 100.0)).collect();
        let set = detection_set(vec![vec![false; n]]);
        let evaluator = Evaluator::from_config(&RunConfig {
            margin: MarginSpec::Fixed(0.5),
            ..RunConfig::default()
        })
        .unwrap();

        let records = evaluator.evaluate(&set, &bars[..20], &bars).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detections, 0);
        assert_eq!(records[0].sample_size, 0);
        assert_eq!(records[0].win_rate, WinRate::NotEvaluable);
        assert!(records[0].holding.is_empty());
    }

    #[test]
    fn test_all_undefined_outcomes_not_evaluable() {
        // Every bar crosses both bands, so every scan is undefined.
        let bars: Vec<Bar> = (0..5).map(|_| bar(100.0, 102.0, 98.0, 100.0)).collect();
        let set = detection_set(vec![vec![true, false, true, true, false]]);

        let records = evaluator(NullRate::default())
            .evaluate(&set, &bars, &bars)
            .unwrap();
        let record = &records[0];
        assert_eq!(record.detections, 3);
        assert_eq!(record.sample_size, 0);
        assert_eq!(record.wins, 0);
        assert_eq!(record.win_rate, WinRate::NotEvaluable);
        assert_eq!(record.p_greater, None);
        assert_eq!(record.p_less, None);
        assert!(!record.is_significant(0.05));

        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["win_rate"], "/");
        assert_eq!(json["sample_size"], 0);

        // The empirical null over the same bars falls back too.
        let records = evaluator(NullRate::Empirical)
            .evaluate(&set, &bars, &bars)
            .unwrap();
        assert_eq!(records[0].win_rate, WinRate::NotEvaluable);
        assert_eq!(records[0].null_rate, WinRate::NotEvaluable);
    }

    #[test]
    fn test_win_rate_serialization() {
        assert_eq!(serde_json::to_string(&WinRate::Evaluable(0.75)).unwrap(), "0.75");
        assert_eq!(serde_json::to_string(&WinRate::NotEvaluable).unwrap(), "\"/\"");
        assert_eq!(WinRate::NotEvaluable.to_string(), "/");
    }
}
