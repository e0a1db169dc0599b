//! Mixture likelihood of observed reads under a diploid genotype plus a mosaic allele

use crate::stutter::{confine_range, StutterTable};
use std::collections::BTreeMap;

/// Multiset of per-read repeat offsets, grouped by distinct value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadObservation {
    counts: BTreeMap<i64, u32>,
    total: u32,
}

impl ReadObservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reads(reads: &[i64]) -> Self {
        let mut observation = Self::new();
        for &read in reads {
            observation.add(read, 1);
        }
        observation
    }

    pub fn add(&mut self, offset: i64, count: u32) {
        if count == 0 {
            return;
        }
        *self.counts.entry(offset).or_insert(0) += count;
        self.total += count;
    }

    /// Number of reads with exactly this offset
    pub fn count(&self, offset: i64) -> u32 {
        self.counts.get(&offset).copied().unwrap_or(0)
    }

    pub fn contains(&self, offset: i64) -> bool {
        self.counts.contains_key(&offset)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn min(&self) -> Option<i64> {
        self.counts.keys().next().copied()
    }

    pub fn max(&self) -> Option<i64> {
        self.counts.keys().next_back().copied()
    }

    /// Distinct offsets in ascending order with their multiplicities
    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.counts.iter().map(|(&offset, &count)| (offset, count))
    }

    /// Expand back into one entry per read
    pub fn reads(&self) -> Vec<i64> {
        self.iter()
            .flat_map(|(offset, count)| std::iter::repeat(offset).take(count as usize))
            .collect()
    }
}

/// Which true allele hosts the mosaic sub-population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypothesis {
    /// A keeps weight 1/2, B gives up `f` to C
    H1,
    /// A gives up `f` to C, B keeps weight 1/2
    H2,
}

/// Log-likelihood of the better-supported hypothesis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixtureLikelihood {
    pub hypothesis: Hypothesis,
    pub log_likelihood: f64,
}

/// Evaluate both mosaic-origin hypotheses for `(a, b, c, f)` and keep the one
/// with the higher total log-likelihood.
///
/// A mosaic allele equal to either genotype allele scores every read at
/// `floor`, so a genuinely distinct third allele is always preferred.
pub fn log_likelihood_mixture(
    a: i64,
    b: i64,
    c: Option<i64>,
    f: f64,
    reads: &ReadObservation,
    table: &StutterTable,
    floor: f64,
) -> MixtureLikelihood {
    let window = table.window();
    let degenerate = matches!(c, Some(c) if c == a || c == b);

    let mut sum_h1 = 0.0;
    let mut sum_h2 = 0.0;
    for (read, count) in reads.iter() {
        let (prob_h1, prob_h2) = if degenerate {
            (floor, floor)
        } else {
            let p_a = table.probability(confine_range(read - a, -window, window));
            let p_b = table.probability(confine_range(read - b, -window, window));
            // C is only absent when f has collapsed to zero
            let p_c = match c {
                Some(c) => table.probability(confine_range(read - c, -window, window)),
                None => table.probability(0),
            };
            (
                (0.5 * p_a + (0.5 - f) * p_b + f * p_c).max(floor),
                ((0.5 - f) * p_a + 0.5 * p_b + f * p_c).max(floor),
            )
        };
        sum_h1 += count as f64 * prob_h1.ln();
        sum_h2 += count as f64 * prob_h2.ln();
    }

    if sum_h1 >= sum_h2 {
        MixtureLikelihood {
            hypothesis: Hypothesis::H1,
            log_likelihood: sum_h1,
        }
    } else {
        MixtureLikelihood {
            hypothesis: Hypothesis::H2,
            log_likelihood: sum_h2,
        }
    }
}
