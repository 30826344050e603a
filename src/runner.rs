//! Detection runner: calibration, trend labelling, windowing, rule evaluation
//! and gap filtering for one instrument.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    calibration::{CalibrationContext, CalibrationThresholds, Calibrator},
    catalog::{RuleCatalog, RuleKey, TrendGate},
    config::RunConfig,
    gap::GapPolicy,
    shape::classify_series,
    to_bars,
    trend::TrendLabeler,
    validate_bars,
    window::WindowBuilder,
    PatternError, Result, TrendLabel, OHLCV,
};

// ============================================================
// OUTPUT
// ============================================================

/// One boolean series, true at the last bar of each matched window.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Detection {
    pub key: RuleKey,
    pub hits: Vec<bool>,
}

impl Detection {
    #[inline]
    pub fn count(&self) -> usize {
        self.hits.iter().filter(|h| **h).count()
    }

    /// Bar indices where the pattern fired.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.hits
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.then_some(i))
    }
}

/// Everything produced by one detection run, in catalog order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DetectionSet {
    pub thresholds: CalibrationThresholds,
    pub trend: Vec<TrendLabel>,
    pub gaps: Vec<bool>,
    pub detections: Vec<Detection>,
}

impl DetectionSet {
    /// Number of detection series
    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Number of bars each series is aligned with
    #[inline]
    pub fn bars(&self) -> usize {
        self.trend.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn get(&self, key: &RuleKey) -> Option<&Detection> {
        self.detections.iter().find(|d| d.key == *key)
    }

    pub fn find(&self, pattern: &str, window_length: usize, gate: TrendGate) -> Option<&Detection> {
        self.detections.iter().find(|d| {
            d.key.pattern == pattern && d.key.window_length == window_length && d.key.gate == gate
        })
    }

    /// `(column name, series)` pairs for persistence.
    pub fn columns(&self) -> impl Iterator<Item = (String, &[bool])> + '_ {
        self.detections
            .iter()
            .map(|d| (d.key.column_name(), d.hits.as_slice()))
    }

    pub fn total_hits(&self) -> usize {
        self.detections.iter().map(Detection::count).sum()
    }
}

// ============================================================
// RUNNER
// ============================================================

/// Runs a rule catalog over a main slice calibrated on a reference slice.
#[derive(Debug, Clone)]
pub struct DetectionRunner {
    catalog: RuleCatalog,
    calibrator: Calibrator,
    labeler: TrendLabeler,
    gap_policy: GapPolicy,
    validate_data: bool,
}

impl DetectionRunner {
    /// Build a runner, validating the configuration first.
    pub fn new(config: &RunConfig, catalog: RuleCatalog) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            calibrator: Calibrator::from_config(config)?,
            labeler: TrendLabeler::from_config(config)?,
            gap_policy: GapPolicy::new(config.gap_mode),
            validate_data: true,
        })
    }

    /// Enable/disable OHLC sanity checks on the main slice
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.validate_data = enable;
        self
    }

    #[inline]
    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    #[inline]
    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    /// Calibrate on `reference`, then detect over `main`.
    ///
    /// `gaps` holds one data-gap flag per main bar. When both slices carry
    /// timestamps the reference slice must end strictly before the main slice.
    pub fn run<T: OHLCV>(
        &self,
        reference: &[T],
        main: &[T],
        gaps: &[bool],
    ) -> Result<DetectionSet> {
        check_disjoint(reference, main)?;
        let ctx = self.calibrator.calibrate(reference)?;
        debug!(
            split = ctx.thresholds().is_split(),
            near_tolerance = ctx.near_tolerance(),
            "calibrated on {} reference bars",
            reference.len()
        );
        self.detect(&ctx, main, gaps)
    }

    /// Detect over `main` with an existing calibration.
    pub fn detect<T: OHLCV>(
        &self,
        ctx: &CalibrationContext,
        main: &[T],
        gaps: &[bool],
    ) -> Result<DetectionSet> {
        if gaps.len() != main.len() {
            return Err(PatternError::LengthMismatch {
                field: "gaps",
                expected: main.len(),
                got: gaps.len(),
            });
        }
        if self.validate_data {
            validate_bars(main)?;
        }

        let bars = to_bars(main);
        let shapes = classify_series(&bars, ctx);
        let trend = self.labeler.label(&bars);

        let detections: Vec<Detection> = self
            .catalog
            .rules()
            .par_iter()
            .map(|rule| {
                let key = rule.key();
                let hits = match WindowBuilder::new(key.window_length) {
                    Ok(builder) => {
                        let raw = builder.evaluate(&bars, &shapes, |w| {
                            rule.evaluate(w, trend[w.end_index()], ctx)
                        });
                        self.gap_policy.apply(&raw, gaps, key.window_length)
                    }
                    // Catalog construction rejects unsupported lengths.
                    Err(_) => vec![false; bars.len()],
                };
                Detection { key, hits }
            })
            .collect();

        let set = DetectionSet {
            thresholds: *ctx.thresholds(),
            trend,
            gaps: gaps.to_vec(),
            detections,
        };
        info!(
            rules = set.len(),
            bars = set.bars(),
            hits = set.total_hits(),
            gap_mode = %self.gap_policy.mode,
            "detection run complete"
        );
        Ok(set)
    }
}

/// Reject a reference slice that does not strictly precede the main slice.
fn check_disjoint<T: OHLCV>(reference: &[T], main: &[T]) -> Result<()> {
    let reference_end = reference.last().and_then(|b| b.timestamp());
    let main_start = main.first().and_then(|b| b.timestamp());
    match (reference_end, main_start) {
        (Some(reference_end), Some(main_start)) if reference_end >= main_start => {
            Err(PatternError::OverlappingSlices {
                reference_end,
                main_start,
            })
        }
        _ => Ok(()),
    }
}

// ============================================================
// PARALLEL RUNS
// ============================================================

/// Result of running a single instrument
#[derive(Debug)]
pub struct RunResult {
    pub symbol: String,
    pub detections: DetectionSet,
}

/// Error from running a single instrument
#[derive(Debug)]
pub struct RunError {
    pub symbol: String,
    pub error: PatternError,
}

/// Run several instruments in parallel: `(symbol, reference, main, gaps)`.
pub fn run_parallel<'a, T, I>(
    runner: &DetectionRunner,
    instruments: I,
) -> (Vec<RunResult>, Vec<RunError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T], &'a [T], &'a [bool])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, reference, main, gaps)| {
            runner
                .run(reference, main, gaps)
                .map(|detections| RunResult {
                    symbol: symbol.to_string(),
                    detections,
                })
                .map_err(|error| RunError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{CatalogBuilder, PatternRule},
        gap::GapMode,
        window::CandleWindow,
        Bar,
    };

    fn always(_: &CandleWindow<'_>, _: &CalibrationContext) -> bool {
        true
    }

    fn bars(start: i64, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let o = 100.0 + (i as f64 * 0.7).sin() * 3.0;
                let c = o + if i % 3 == 0 { -0.8 } else { 0.6 + (i % 4) as f64 * 0.2 };
                Bar::new(start + i as i64, o, o.max(c) + 0.3, o.min(c) - 0.4, c, 1000.0)
            })
            .collect()
    }

    fn runner(mode: GapMode) -> DetectionRunner {
        let config = RunConfig {
            gap_mode: mode,
            ..RunConfig::default()
        };
        let catalog = CatalogBuilder::new()
            .add(PatternRule::new("always", 3, TrendGate::Any, always))
            .build()
            .unwrap();
        DetectionRunner::new(&config, catalog).unwrap()
    }

    #[test]
    fn test_warmup_and_gap_exclusion() {
        let reference = bars(0, 50);
        let main = bars(100, 8);
        let mut gaps = vec![false; 8];
        gaps[5] = true;

        let set = runner(GapMode::Exclude).run(&reference, &main, &gaps).unwrap();
        let any = set.find("always", 3, TrendGate::Any).unwrap();
        assert_eq!(any.hits, vec![false, false, true, true, true, false, false, false]);

        let set = runner(GapMode::Only).run(&reference, &main, &gaps).unwrap();
        let any = set.find("always", 3, TrendGate::Any).unwrap();
        assert_eq!(any.hits, vec![false, false, false, false, false, true, true, true]);
    }

    #[test]
    fn test_output_follows_catalog_order() {
        let reference = bars(0, 50);
        let main = bars(100, 30);
        let catalog = CatalogBuilder::new().with_all_defaults().build().unwrap();
        let expected: Vec<RuleKey> = catalog.keys().collect();
        let runner = DetectionRunner::new(&RunConfig::default(), catalog).unwrap();
        let set = runner.run(&reference, &main, &vec![false; 30]).unwrap();
        let got: Vec<RuleKey> = set.iter().map(|d| d.key).collect();
        assert_eq!(got, expected);
        assert!(set.iter().all(|d| d.hits.len() == 30));
    }

    #[test]
    fn test_gap_length_mismatch() {
        let result = runner(GapMode::Ignore).run(&bars(0, 20), &bars(100, 10), &[false; 9]);
        assert!(matches!(
            result,
            Err(PatternError::LengthMismatch { field: "gaps", expected: 10, got: 9 })
        ));
    }

    #[test]
    fn test_overlapping_slices_rejected() {
        let result = runner(GapMode::Ignore).run(&bars(0, 20), &bars(10, 10), &[false; 10]);
        assert!(matches!(result, Err(PatternError::OverlappingSlices { .. })));
    }

    #[test]
    fn test_thresholds_come_from_reference_only() {
        let reference = bars(0, 60);
        let main_a = bars(100, 40);
        let mut main_b = bars(100, 40);
        for b in &mut main_b {
            b.high += 50.0;
            b.low -= 50.0;
        }
        let r = runner(GapMode::Ignore);
        let a = r.run(&reference, &main_a, &[false; 40]).unwrap();
        let b = r.run(&reference, &main_b, &[false; 40]).unwrap();
        let expected = Calibrator::default().calibrate(&reference).unwrap();
        assert_eq!(a.thresholds, b.thresholds);
        assert_eq!(&a.thresholds, expected.thresholds());
    }

    #[test]
    fn test_data_validation_can_be_disabled() {
        let reference = bars(0, 30);
        let mut main = bars(100, 6);
        main[4].high = main[4].low - 1.0;
        let gaps = [false; 6];

        let strict = runner(GapMode::Ignore).run(&reference, &main, &gaps);
        assert!(matches!(strict, Err(PatternError::InvalidOHLCV { index: 4, .. })));

        let set = runner(GapMode::Ignore)
            .validate_data(false)
            .run(&reference, &main, &gaps)
            .unwrap();
        let any = set.find("always", 3, TrendGate::Any).unwrap();
        assert_eq!(any.hits, vec![false, false, true, true, true, true]);
    }

    #[test]
    fn test_run_parallel_splits_errors() {
        let r = runner(GapMode::Ignore);
        let reference = bars(0, 30);
        let main = bars(100, 10);
        let gaps = vec![false; 10];
        let short_gaps = vec![false; 3];
        let instruments = vec![
            ("AAA", reference.as_slice(), main.as_slice(), gaps.as_slice()),
            ("BBB", reference.as_slice(), main.as_slice(), short_gaps.as_slice()),
        ];
        let (ok, err) = run_parallel(&r, instruments);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].symbol, "AAA");
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].symbol, "BBB");
    }
}
