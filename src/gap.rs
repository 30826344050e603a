//! Data-gap annotation and the run-wide gap policy.
//!
//! A bar's `gap` flag is true when the time since the previous bar exceeds the
//! aggregation interval. After a rule runs, its detections are filtered against
//! the gap flags covering the rule's window.

use std::str::FromStr;

use crate::{PatternError, Result};

/// What to do with detections whose window touches a data gap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum GapMode {
    /// Drop detections whose window contains a gap.
    #[default]
    Exclude,
    /// Keep detections unchanged.
    Ignore,
    /// Keep only detections whose window contains a gap.
    Only,
}

impl GapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GapMode::Exclude => "exclude",
            GapMode::Ignore => "ignore",
            GapMode::Only => "only",
        }
    }
}

impl FromStr for GapMode {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(GapMode::Exclude),
            "ignore" => Ok(GapMode::Ignore),
            "only" => Ok(GapMode::Only),
            _ => Err(PatternError::UnknownGapMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for GapMode {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl std::fmt::Display for GapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag bars that follow a discontinuity: `ts[i] - ts[i-1] > interval`.
/// The first bar is never a gap.
pub fn mark_gaps(timestamps: &[i64], interval: i64) -> Vec<bool> {
    let mut gaps = Vec::with_capacity(timestamps.len());
    if !timestamps.is_empty() {
        gaps.push(false);
    }
    gaps.extend(timestamps.windows(2).map(|w| w[1] - w[0] > interval));
    gaps
}

/// `OR(gap[i], gap[i-1], .., gap[i-length+1])`, truncated at the series start.
pub fn window_gaps(gaps: &[bool], length: usize) -> Vec<bool> {
    let length = length.max(1);
    let mut out = Vec::with_capacity(gaps.len());
    // Index of the most recent gap seen so far.
    let mut last_gap: Option<usize> = None;
    for (i, &g) in gaps.iter().enumerate() {
        if g {
            last_gap = Some(i);
        }
        out.push(matches!(last_gap, Some(j) if i - j < length));
    }
    out
}

/// Post-filter applied to every rule's raw detections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapPolicy {
    pub mode: GapMode,
}

impl GapPolicy {
    pub fn new(mode: GapMode) -> Self {
        Self { mode }
    }

    /// Filter `detections` for a rule spanning `length` bars.
    ///
    /// `detections` and `gaps` must be the same length.
    pub fn apply(&self, detections: &[bool], gaps: &[bool], length: usize) -> Vec<bool> {
        debug_assert_eq!(detections.len(), gaps.len());
        match self.mode {
            GapMode::Ignore => detections.to_vec(),
            GapMode::Exclude => detections
                .iter()
                .zip(window_gaps(gaps, length))
                .map(|(&d, g)| d && !g)
                .collect(),
            GapMode::Only => detections
                .iter()
                .zip(window_gaps(gaps, length))
                .map(|(&d, g)| d && g)
                .collect(),
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_gaps() {
        assert_eq!(mark_gaps(&[0, 60, 120, 300, 360], 60), vec![false, false, false, true, false]);
        assert!(mark_gaps(&[], 60).is_empty());
        assert_eq!(mark_gaps(&[5], 60), vec![false]);
    }

    #[test]
    fn test_window_gaps() {
        let gaps = [false, false, true, false, false, false];
        assert_eq!(window_gaps(&gaps, 1), gaps.to_vec());
        assert_eq!(window_gaps(&gaps, 3), vec![false, false, true, true, true, false]);
        assert_eq!(window_gaps(&[true, false], 13), vec![true, true]);
    }

    #[test]
    fn test_policy_modes() {
        let detections = [true, true, false, true, true];
        let gaps = [false, false, true, false, false];
        let len = 2;
        assert_eq!(
            GapPolicy::new(GapMode::Ignore).apply(&detections, &gaps, len),
            detections.to_vec()
        );
        assert_eq!(
            GapPolicy::new(GapMode::Exclude).apply(&detections, &gaps, len),
            vec![true, true, false, false, true]
        );
        assert_eq!(
            GapPolicy::new(GapMode::Only).apply(&detections, &gaps, len),
            vec![false, false, false, true, false]
        );
    }

    #[test]
    fn test_gap_mode_parse() {
        assert_eq!("exclude".parse::<GapMode>().unwrap(), GapMode::Exclude);
        assert_eq!(" Only ".parse::<GapMode>().unwrap(), GapMode::Only);
        assert!(matches!(
            "skip".parse::<GapMode>(),
            Err(PatternError::UnknownGapMode(m)) if m == "skip"
        ));
    }

    #[test]
    fn test_gap_mode_serde() {
        assert_eq!(serde_json::to_string(&GapMode::Ignore).unwrap(), "\"ignore\"");
        let mode: GapMode = serde_json::from_str("\"only\"").unwrap();
        assert_eq!(mode, GapMode::Only);
        assert!(serde_json::from_str::<GapMode>("\"sometimes\"").is_err());
    }
}
