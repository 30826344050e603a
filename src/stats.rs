//! Statistical primitives: percentiles, the two-sample Kolmogorov-Smirnov
//! test and the exact one-sided binomial test.
//!
//! All functions are total: degenerate input yields `None` or a clamped
//! probability instead of panicking.

use std::cmp::Ordering;

/// Sort a copy of `values` ascending. NaN values are dropped.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Percentile `p` (0..=100) of an ascending slice, linear interpolation
/// between closest ranks. Returns `None` for an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Several percentiles of the same sample, sorting once.
pub fn percentiles<const N: usize>(values: &[f64], ps: &[f64; N]) -> Option<[f64; N]> {
    let v = sorted(values);
    if v.is_empty() {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, &p) in out.iter_mut().zip(ps) {
        *slot = percentile_sorted(&v, p)?;
    }
    Some(out)
}

/// Arithmetic mean, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

// ============================================================
// KOLMOGOROV-SMIRNOV
// ============================================================

/// Result of a two-sample Kolmogorov-Smirnov test.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KsTest {
    /// Largest distance between the two empirical CDFs
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

impl KsTest {
    /// True if equality of distributions is rejected at `alpha`.
    #[inline]
    pub fn rejects(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Two-sample KS test. `None` if either sample is empty.
///
/// The p-value uses the asymptotic Kolmogorov distribution with Stephens'
/// effective-size correction.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Option<KsTest> {
    let a = sorted(a);
    let b = sorted(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let (n1, n2) = (a.len(), b.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    // Step both CDFs past every tied value before measuring the distance.
    while i < n1 && j < n2 {
        let x = a[i].min(b[j]);
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 as f64 - j as f64 / n2 as f64).abs());
    }

    let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
    let sqrt_ne = ne.sqrt();
    let lambda = (sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d;

    Some(KsTest {
        statistic: d,
        p_value: kolmogorov_sf(lambda),
    })
}

/// Survival function of the Kolmogorov distribution,
/// `Q(λ) = 2 Σ (-1)^(j-1) exp(-2 j² λ²)`.
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev_term: f64 = 0.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = fac * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 0.001 * prev_term || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev_term = term.abs();
    }
    // Series did not converge: λ is tiny, the distributions are indistinguishable.
    1.0
}

// ============================================================
// BINOMIAL TEST
// ============================================================

/// One-sided exact binomial test p-values for both alternatives.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BinomialTest {
    /// P(X >= successes) under the null rate
    pub greater: f64,
    /// P(X <= successes) under the null rate
    pub less: f64,
}

/// Exact binomial test of `successes` out of `trials` against `null_rate`.
///
/// `null_rate` is clamped to [0, 1]. With zero trials both p-values are 1.
pub fn binomial_test(successes: usize, trials: usize, null_rate: f64) -> BinomialTest {
    let k = successes.min(trials);
    let n = trials;
    let p = null_rate.clamp(0.0, 1.0);

    if n == 0 {
        return BinomialTest {
            greater: 1.0,
            less: 1.0,
        };
    }
    // Point masses at the boundaries.
    if p == 0.0 {
        return BinomialTest {
            greater: if k == 0 { 1.0 } else { 0.0 },
            less: 1.0,
        };
    }
    if p == 1.0 {
        return BinomialTest {
            greater: 1.0,
            less: if k == n { 1.0 } else { 0.0 },
        };
    }

    let ln_fact = ln_factorials(n);
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());
    let pmf = |i: usize| -> f64 {
        (ln_fact[n] - ln_fact[i] - ln_fact[n - i] + i as f64 * ln_p + (n - i) as f64 * ln_q).exp()
    };

    let greater: f64 = (k..=n).map(pmf).sum();
    let less: f64 = (0..=k).map(pmf).sum();

    BinomialTest {
        greater: greater.clamp(0.0, 1.0),
        less: less.clamp(0.0, 1.0),
    }
}

/// `ln(i!)` for i in 0..=n.
fn ln_factorials(n: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(n + 1);
    let mut acc = 0.0;
    table.push(acc);
    for i in 1..=n {
        acc += (i as f64).ln();
        table.push(acc);
    }
    table
}

// ============================================================
// TESTS
// ============================================================
