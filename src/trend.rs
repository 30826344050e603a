//! Trend labeler: rolling mean of closes, labelled by the monotonicity of its
//! most recent `span` values.

use crate::{config::RunConfig, Period, Result, TrendLabel, OHLCV};

/// Labels each bar `Up`, `Down` or `Flat` from a moving average of closes.
#[derive(Debug, Clone)]
pub struct TrendLabeler {
    pub span: Period,
    pub averaging_window: Period,
}

impl Default for TrendLabeler {
    fn default() -> Self {
        Self {
            span: Period::new_const(7),
            averaging_window: Period::new_const(5),
        }
    }
}

impl TrendLabeler {
    pub fn new(span: Period, averaging_window: Period) -> Self {
        Self {
            span,
            averaging_window,
        }
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Ok(Self::new(config.trend_span, config.trend_averaging_window))
    }

    /// Trailing simple moving average; the first `window - 1` values are NaN.
    ///
    /// Each window is summed from scratch so equal inputs give bit-equal means.
    pub fn moving_average(&self, closes: &[f64]) -> Vec<f64> {
        let window = self.averaging_window.get();
        (0..closes.len())
            .map(|i| {
                if i + 1 < window {
                    f64::NAN
                } else {
                    closes[i + 1 - window..=i].iter().sum::<f64>() / window as f64
                }
            })
            .collect()
    }

    pub fn label<T: OHLCV>(&self, bars: &[T]) -> Vec<TrendLabel> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        self.label_averages(&self.moving_average(&closes))
    }

    /// Label each position from the `span` averages ending there.
    pub fn label_averages(&self, averages: &[f64]) -> Vec<TrendLabel> {
        let span = self.span.get();
        (0..averages.len())
            .map(|i| {
                if i + 1 < span {
                    TrendLabel::Flat
                } else {
                    label_run(&averages[i + 1 - span..=i])
                }
            })
            .collect()
    }
}

/// `Up` if strictly increasing, `Down` if strictly decreasing, otherwise `Flat`.
/// Any tie or NaN gives `Flat` immediately; fewer than two values are `Flat`.
pub fn label_run(values: &[f64]) -> TrendLabel {
    if values.len() < 2 {
        return TrendLabel::Flat;
    }

    let mut direction = TrendLabel::Flat;
    for pair in values.windows(2) {
        let step = if pair[1] > pair[0] {
            TrendLabel::Up
        } else if pair[1] < pair[0] {
            TrendLabel::Down
        } else {
            // Equal or NaN
            return TrendLabel::Flat;
        };
        match direction {
            TrendLabel::Flat => direction = step,
            d if d != step => return TrendLabel::Flat,
            _ => {}
        }
    }
    direction
}

// ============================================================
// TESTS
// ============================================================
