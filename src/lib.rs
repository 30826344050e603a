//! # YACPE - Yet Another Candlestick Pattern Evaluator
//!
//! Percentile-calibrated candlestick shape classification, multi-bar pattern
//! detection and forward-looking statistical evaluation.
//!
//! A run takes two disjoint slices of the same instrument: an older *reference*
//! slice used only for calibration, and a newer *main* slice that is classified,
//! scanned for patterns and evaluated. Calibration never sees main-slice bars.
//!
//! ## Quick Start
//!
//! ```rust
//! use yacpe::prelude::*;
//!
//! let bars: Vec<Bar> = (0..200)
//!     .map(|i| {
//!         let base = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         let close = if i % 2 == 0 { base + 0.8 } else { base - 0.6 };
//!         Bar::new(i, base, base.max(close) + 0.4, base.min(close) - 0.3, close, 1000.0)
//!     })
//!     .collect();
//! let (reference, main) = bars.split_at(100);
//!
//! let config = RunConfig::default();
//! let catalog = CatalogBuilder::new().with_all_defaults().build().unwrap();
//! let runner = DetectionRunner::new(&config, catalog).unwrap();
//!
//! let gaps = vec![false; main.len()];
//! let detections = runner.run(reference, main, &gaps).unwrap();
//!
//! let evaluator = Evaluator::from_config(&config).unwrap();
//! let records = evaluator.evaluate(&detections, reference, main).unwrap();
//! assert_eq!(records.len(), detections.len());
//! ```

pub mod calibration;
pub mod catalog;
pub mod config;
pub mod evaluation;
pub mod gap;
pub mod runner;
pub mod shape;
pub mod stats;
pub mod trend;
pub mod window;

pub mod prelude {
    pub use crate::{
        // Calibration
        calibration::{CalibrationContext, CalibrationThresholds, Calibrator},
        // Catalog
        catalog::{CatalogBuilder, PatternFn, PatternRule, Rule, RuleCatalog, RuleKey, TrendGate},
        // Configuration
        config::{MarginSpec, NullRate, RunConfig},
        // Evaluation
        evaluation::{EvaluationRecord, Evaluator, HoldingStats, Outcome, WinRate},
        // Gaps
        gap::{mark_gaps, window_gaps, GapMode, GapPolicy},
        // Detection
        runner::{run_parallel, Detection, DetectionRunner, DetectionSet, RunError, RunResult},
        // Shapes
        shape::{classify_series, BodyBucket, ShadowBucket, Shape},
        // Trend
        trend::TrendLabeler,
        // Windows
        window::{CandleWindow, ShiftedFrame, WindowBuilder, SUPPORTED_WINDOW_LENGTHS},
        // Core types
        Bar,
        Color,
        OHLCVExt,
        // Errors
        PatternError,
        Period,
        Ratio,
        Result,
        TrendLabel,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors surfaced at configuration or input-validation time.
///
/// Statistical edge cases (too little data, ambiguous scans, empty colour
/// groups) are not errors; they degrade to documented sentinels.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown gap mode '{0}' (expected exclude, ignore or only)")]
    UnknownGapMode(String),

    #[error("{field} must be non-decreasing")]
    NonMonotonicPercentiles { field: &'static str },

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("{field} has length {got}, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Reference slice ends at {reference_end} but main slice starts at {main_start}")]
    OverlappingSlices { reference_end: i64, main_start: i64 },

    #[error("Duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("Unsupported window length {0}")]
    UnsupportedWindowLength(usize),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Body colour. `Neutral` means open == close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Black,
    White,
    Neutral,
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Absolute body length `|open - close|`
    #[inline]
    fn body(&self) -> f64 {
        (self.open() - self.close()).abs()
    }

    /// Upper edge of the body
    #[inline]
    fn top(&self) -> f64 {
        self.open().max(self.close())
    }

    /// Lower edge of the body
    #[inline]
    fn bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.top()
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.bottom() - self.low()
    }

    /// Midpoint of the body
    #[inline]
    fn midpoint(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    #[inline]
    fn is_black(&self) -> bool {
        self.open() > self.close()
    }

    #[inline]
    fn is_white(&self) -> bool {
        self.open() < self.close()
    }

    #[inline]
    fn color(&self) -> Color {
        if self.is_black() {
            Color::Black
        } else if self.is_white() {
            Color::White
        } else {
            Color::Neutral
        }
    }

    /// Wilder true range against the previous close
    #[inline]
    fn true_range(&self, prev_close: f64) -> f64 {
        self.range()
            .max((self.high() - prev_close).abs())
            .max((self.low() - prev_close).abs())
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.high() < self.top() || self.low() > self.bottom() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "body outside high/low range",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate every bar, reporting the offending index.
pub(crate) fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PatternError::InvalidOHLCV { reason, .. } => {
                PatternError::InvalidOHLCV { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BAR
// ============================================================

/// One time-ordered OHLCV record.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Copy any OHLCV source into a `Bar`; a missing timestamp becomes the position.
    pub fn from_ohlcv<T: OHLCV>(index: usize, bar: &T) -> Self {
        Self {
            timestamp: bar.timestamp().unwrap_or(index as i64),
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
            volume: bar.volume(),
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

pub(crate) fn to_bars<T: OHLCV>(bars: &[T]) -> Vec<Bar> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| Bar::from_ohlcv(i, b))
        .collect()
}

// ============================================================
// TREND LABEL
// ============================================================

/// Per-bar direction of the recent moving average.
///
/// Serialized as `1`, `-1` or `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrendLabel {
    Up,
    Down,
    #[default]
    Flat,
}

impl TrendLabel {
    #[inline]
    pub fn as_i8(self) -> i8 {
        match self {
            TrendLabel::Up => 1,
            TrendLabel::Down => -1,
            TrendLabel::Flat => 0,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(TrendLabel::Up),
            -1 => Some(TrendLabel::Down),
            0 => Some(TrendLabel::Flat),
            _ => None,
        }
    }
}

impl serde::Serialize for TrendLabel {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_i8().serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for TrendLabel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = i8::deserialize(d)?;
        TrendLabel::from_i8(value)
            .ok_or_else(|| serde::de::Error::custom("trend label must be 1, -1 or 0"))
    }
}

// ============================================================
// TESTS
// ============================================================
