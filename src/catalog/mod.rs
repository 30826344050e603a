//! Pattern rule catalog.
//!
//! A [`PatternRule`] is a named pure predicate over a [`CandleWindow`] and the
//! run's [`CalibrationContext`]. The catalog exposes every pattern three ways,
//! one [`Rule`] per [`TrendGate`]: no trend requirement, trend must be up, and
//! trend must be down. One of those gates is the pattern's textbook
//! precondition; the others exist for contingency-table research.
//!
//! # Pattern Groups
//!
//! - **Single-bar**: doji family, hammer family, marubozu, spinning top, long days
//! - **Two-bar**: engulfing, harami, piercing / dark cloud, windows, tweezers
//! - **Three-bar**: stars, three soldiers / crows, upside gap two crows
//! - **Multi-bar**: concealing baby swallow, three line strike, three methods,
//!   new price lines (8 to 13 bars)

use std::collections::HashSet;

use crate::{
    calibration::CalibrationContext,
    window::{is_supported_length, CandleWindow},
    PatternError, Result, TrendLabel,
};

pub mod multi_bar;
pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

/// Signature of a pattern predicate.
pub type PatternFn = for<'a> fn(&CandleWindow<'a>, &CalibrationContext) -> bool;

// ============================================================
// TREND GATE
// ============================================================

/// Trend precondition attached to a rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrendGate {
    Any,
    Up,
    Down,
}

impl TrendGate {
    /// Order in which gated variants are registered.
    pub const ALL: [TrendGate; 3] = [TrendGate::Any, TrendGate::Up, TrendGate::Down];

    #[inline]
    pub fn admits(self, trend: TrendLabel) -> bool {
        match self {
            TrendGate::Any => true,
            TrendGate::Up => trend == TrendLabel::Up,
            TrendGate::Down => trend == TrendLabel::Down,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            TrendGate::Any => TrendGate::Any,
            TrendGate::Up => TrendGate::Down,
            TrendGate::Down => TrendGate::Up,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TrendGate::Any => "",
            TrendGate::Up => "_up",
            TrendGate::Down => "_down",
        }
    }
}

// ============================================================
// RULE KEY
// ============================================================

/// Identity of one detection series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct RuleKey {
    pub pattern: &'static str,
    pub window_length: usize,
    pub gate: TrendGate,
}

impl RuleKey {
    pub fn new(pattern: &'static str, window_length: usize, gate: TrendGate) -> Self {
        Self {
            pattern,
            window_length,
            gate,
        }
    }

    /// Column name used for persisted series, e.g. `hammer_1_down`.
    pub fn column_name(&self) -> String {
        format!("{}_{}{}", self.pattern, self.window_length, self.gate.suffix())
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.column_name())
    }
}

// ============================================================
// PATTERN RULE
// ============================================================

/// A named pattern predicate with its textbook trend precondition.
#[derive(Clone, Copy)]
pub struct PatternRule {
    pub name: &'static str,
    pub window_length: usize,
    pub natural: TrendGate,
    pub predicate: PatternFn,
}

impl PatternRule {
    pub const fn new(
        name: &'static str,
        window_length: usize,
        natural: TrendGate,
        predicate: PatternFn,
    ) -> Self {
        Self {
            name,
            window_length,
            natural,
            predicate,
        }
    }
}

impl std::fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("window_length", &self.window_length)
            .field("natural", &self.natural)
            .finish_non_exhaustive()
    }
}

/// One pattern under one trend gate.
#[derive(Clone, Copy)]
pub struct Rule {
    key: RuleKey,
    natural: TrendGate,
    predicate: PatternFn,
}

impl Rule {
    #[inline]
    pub fn key(&self) -> RuleKey {
        self.key
    }

    #[inline]
    pub fn window_length(&self) -> usize {
        self.key.window_length
    }

    /// True if this gate is the pattern's textbook precondition.
    #[inline]
    pub fn is_natural(&self) -> bool {
        self.key.gate == self.natural
    }

    /// Evaluate against one window and the trend label of its last bar.
    #[inline]
    pub fn evaluate(
        &self,
        window: &CandleWindow<'_>,
        trend: TrendLabel,
        ctx: &CalibrationContext,
    ) -> bool {
        window.len() == self.key.window_length
            && self.key.gate.admits(trend)
            && (self.predicate)(window, ctx)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("key", &self.key)
            .field("natural", &self.natural)
            .finish_non_exhaustive()
    }
}

// ============================================================
// CATALOG
// ============================================================

/// Immutable, ordered set of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn get(&self, key: &RuleKey) -> Option<&Rule> {
        self.rules.iter().find(|r| r.key == *key)
    }

    pub fn keys(&self) -> impl Iterator<Item = RuleKey> + '_ {
        self.rules.iter().map(|r| r.key)
    }

    /// Distinct window lengths in use, ascending.
    pub fn window_lengths(&self) -> Vec<usize> {
        let mut lengths: Vec<usize> = self.rules.iter().map(|r| r.key.window_length).collect();
        lengths.sort_unstable();
        lengths.dedup();
        lengths
    }
}

impl<'a> IntoIterator for &'a RuleCatalog {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`RuleCatalog`]. Registration order is catalog order.
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    patterns: Vec<PatternRule>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every builtin pattern
    pub fn with_all_defaults(self) -> Self {
        self.with_single_bar_defaults()
            .with_two_bar_defaults()
            .with_three_bar_defaults()
            .with_multi_bar_defaults()
    }

    pub fn with_single_bar_defaults(mut self) -> Self {
        self.patterns.extend_from_slice(single_bar::RULES);
        self
    }

    pub fn with_two_bar_defaults(mut self) -> Self {
        self.patterns.extend_from_slice(two_bar::RULES);
        self
    }

    pub fn with_three_bar_defaults(mut self) -> Self {
        self.patterns.extend_from_slice(three_bar::RULES);
        self
    }

    pub fn with_multi_bar_defaults(mut self) -> Self {
        self.patterns.extend_from_slice(multi_bar::RULES);
        self
    }

    /// Add a custom pattern
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, pattern: PatternRule) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Validate and expand each pattern into its three gated rules.
    pub fn build(self) -> Result<RuleCatalog> {
        let mut seen = HashSet::with_capacity(self.patterns.len());
        let mut rules = Vec::with_capacity(self.patterns.len() * TrendGate::ALL.len());

        for pattern in self.patterns {
            if !is_supported_length(pattern.window_length) {
                return Err(PatternError::UnsupportedWindowLength(pattern.window_length));
            }
            if !seen.insert((pattern.name, pattern.window_length)) {
                return Err(PatternError::DuplicateRule(format!(
                    "{}_{}",
                    pattern.name, pattern.window_length
                )));
            }
            rules.extend(TrendGate::ALL.iter().map(|&gate| Rule {
                key: RuleKey::new(pattern.name, pattern.window_length, gate),
                natural: pattern.natural,
                predicate: pattern.predicate,
            }));
        }

        Ok(RuleCatalog { rules })
    }
}

// ============================================================
// TESTS
// ============================================================
