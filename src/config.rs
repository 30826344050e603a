//! Run configuration.
//!
//! Every option has a default, so a partial JSON document (or `{}`) is a valid
//! configuration. Newtype fields reject bad values while deserializing; the
//! cross-field checks run in [`RunConfig::validate`].

use crate::{
    calibration::{check_percentile_list, DEFAULT_BODY_PERCENTILES, DEFAULT_SHADOW_PERCENTILES},
    gap::GapMode,
    PatternError, Period, Ratio, Result,
};

/// Stop-loss / take-profit margin as a fraction of the entry price.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginSpec {
    /// Fixed fraction, e.g. `0.01` for 1%.
    Fixed(f64),
    /// `multiplier` times the mean relative true range of the last `period`
    /// reference bars.
    Volatility { period: Period, multiplier: f64 },
}

impl Default for MarginSpec {
    fn default() -> Self {
        MarginSpec::Volatility {
            period: Period::new_const(14),
            multiplier: 1.0,
        }
    }
}

/// Null win rate the binomial tests compare against.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullRate {
    Fixed(f64),
    /// Win rate of the stop-loss / take-profit scan started at every main bar.
    Empirical,
}

impl Default for NullRate {
    fn default() -> Self {
        NullRate::Fixed(0.5)
    }
}

/// Options consumed by calibration, detection and evaluation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub significance_level: Ratio,
    pub gap_mode: GapMode,
    pub margin: MarginSpec,
    pub trend_span: Period,
    pub trend_averaging_window: Period,
    pub body_percentiles: [f64; 3],
    pub shadow_percentiles: [f64; 4],
    pub null_rate: NullRate,
    pub max_holding_period: Period,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            significance_level: Ratio::new_const(0.05),
            gap_mode: GapMode::default(),
            margin: MarginSpec::default(),
            trend_span: Period::new_const(7),
            trend_averaging_window: Period::new_const(5),
            body_percentiles: DEFAULT_BODY_PERCENTILES,
            shadow_percentiles: DEFAULT_SHADOW_PERCENTILES,
            null_rate: NullRate::default(),
            max_holding_period: Period::new_const(10),
        }
    }
}

impl RunConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PatternError::InvalidConfig(e.to_string()))
    }

    /// Fail fast on values that would otherwise surface deep inside a run.
    pub fn validate(&self) -> Result<()> {
        check_percentile_list("body_percentiles", &self.body_percentiles)?;
        check_percentile_list("shadow_percentiles", &self.shadow_percentiles)?;

        if self.trend_span.get() < 2 {
            return Err(PatternError::OutOfRange {
                field: "trend_span",
                value: self.trend_span.get() as f64,
                min: 2.0,
                max: f64::INFINITY,
            });
        }

        match self.margin {
            MarginSpec::Fixed(m) => check_open_unit("margin", m)?,
            MarginSpec::Volatility { multiplier, .. } => {
                if !multiplier.is_finite() || multiplier <= 0.0 {
                    return Err(PatternError::InvalidConfig(format!(
                        "volatility multiplier must be positive, got {multiplier}"
                    )));
                }
            }
        }

        if let NullRate::Fixed(p) = self.null_rate {
            check_open_unit("null_rate", p)?;
        }
        Ok(())
    }
}

/// `value` must lie strictly between 0 and 1.
fn check_open_unit(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(PatternError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
