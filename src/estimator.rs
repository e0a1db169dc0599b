//! Joint maximum-likelihood estimation of the mosaic allele and mosaic fraction

use crate::likelihood::{log_likelihood_mixture, ReadObservation};
use crate::optimize::minimize_bounded;
use crate::stutter::StutterTable;
use crate::MosaicConfig;

/// Upper bound on objective evaluations for a single f-step
const MAX_SOLVER_EVALUATIONS: usize = 500;

/// Outcome of the alternating C/f estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicEstimate {
    /// `None` when the fraction collapsed to exactly zero
    pub allele: Option<i64>,
    pub fraction: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// C-step: most likely mosaic allele for a fixed fraction.
///
/// Candidates run over `[min(reads) - margin, max(reads) + margin]` and ties
/// go to the smallest candidate. Returns `None` only for an empty observation.
pub fn estimate_allele(
    reads: &ReadObservation,
    a: i64,
    b: i64,
    f: f64,
    table: &StutterTable,
    config: &MosaicConfig,
) -> Option<i64> {
    let (min_read, max_read) = (reads.min()?, reads.max()?);

    let mut best: Option<(i64, f64)> = None;
    for candidate in (min_read - config.search_margin)..=(max_read + config.search_margin) {
        let likelihood = log_likelihood_mixture(
            a,
            b,
            Some(candidate),
            f,
            reads,
            table,
            config.floor_probability,
        )
        .log_likelihood;

        match best {
            Some((_, best_likelihood)) if likelihood <= best_likelihood => {}
            _ => best = Some((candidate, likelihood)),
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// f-step: most likely mosaic fraction in `[0, max_fraction]` for a fixed allele
pub fn estimate_fraction(
    reads: &ReadObservation,
    a: i64,
    b: i64,
    c: Option<i64>,
    table: &StutterTable,
    config: &MosaicConfig,
) -> f64 {
    let negated = |f: f64| {
        -log_likelihood_mixture(a, b, c, f, reads, table, config.floor_probability).log_likelihood
    };

    minimize_bounded(
        negated,
        0.0,
        config.max_fraction,
        config.solver_tolerance,
        MAX_SOLVER_EVALUATIONS,
    )
    .x
}

/// Alternate C-steps and f-steps until the estimates stabilise or the
/// iteration cap is exceeded. Non-convergence is logged and the last
/// estimate is returned.
pub fn estimate(
    reads: &ReadObservation,
    a: i64,
    b: i64,
    table: &StutterTable,
    config: &MosaicConfig,
    locus_name: &str,
) -> MosaicEstimate {
    let mut c = estimate_allele(reads, a, b, config.initial_fraction, table, config);
    let mut f = estimate_fraction(reads, a, b, c, table, config);

    let mut iterations = 1;
    let mut converged = false;
    loop {
        let c_prev = c;
        let f_prev = f;

        c = estimate_allele(reads, a, b, f, table, config);
        f = estimate_fraction(reads, a, b, c, table, config);
        iterations += 1;

        if iterations > config.max_iterations {
            log::warn!(
                "ML didn't converge reads={:?} A={} B={} {}",
                reads.reads(),
                a,
                b,
                locus_name
            );
            break;
        }

        if (f - f_prev).abs() < config.convergence_tolerance
            && (f < config.null_fraction || c == c_prev)
        {
            converged = true;
            break;
        }
    }

    MosaicEstimate {
        allele: if f == 0.0 { None } else { c },
        fraction: f,
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StutterParams;
    use approx::assert_relative_eq;

    fn table() -> StutterTable {
        StutterTable::new(StutterParams::new(0.05, 0.05, 0.9), 100)
    }

    fn mosaic_reads() -> ReadObservation {
        ReadObservation::from_reads(&[5, 5, 5, 5, 5, 5, 5, 5, 7, 7])
    }

    #[test]
    fn test_estimate_allele_picks_third_allele() {
        let config = MosaicConfig::default();
        let c = estimate_allele(&mosaic_reads(), 5, 5, 0.01, &table(), &config);
        assert_eq!(c, Some(7));
    }

    #[test]
    fn test_estimate_allele_ties_go_to_smallest_candidate() {
        let config = MosaicConfig::default();
        let reads = ReadObservation::from_reads(&[0, 0, 2, 2]);
        // With f = 0 every non-genotype candidate scores the same
        let c = estimate_allele(&reads, 0, 2, 0.0, &table(), &config);
        assert_eq!(c, Some(-3));
    }

    #[test]
    fn test_estimate_allele_empty_reads() {
        let config = MosaicConfig::default();
        let c = estimate_allele(&ReadObservation::new(), 0, 0, 0.1, &table(), &config);
        assert_eq!(c, None);
    }

    #[test]
    fn test_estimate_fraction() {
        let config = MosaicConfig::default();
        let f = estimate_fraction(&mosaic_reads(), 5, 5, Some(7), &table(), &config);
        assert_relative_eq!(f, 0.197, epsilon = 0.005);

        let reads = ReadObservation::from_reads(&[0, 0, 0, 2, 2, 2]);
        let f = estimate_fraction(&reads, 0, 2, Some(5), &table(), &config);
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_estimate_end_to_end_scenario() {
        let config = MosaicConfig::default();
        let estimate = estimate(&mosaic_reads(), 5, 5, &table(), &config, "chr1:100");

        assert!(estimate.converged);
        assert_eq!(estimate.allele, Some(7));
        assert_relative_eq!(estimate.fraction, 0.2, epsilon = 0.01);
    }

    #[test]
    fn test_estimate_is_fixed_point() {
        let config = MosaicConfig::default();
        let table = table();
        let mut offsets = vec![0i64; 12];
        offsets.extend([-3i64; 4]);
        offsets.extend([4i64; 12]);
        let reads = ReadObservation::from_reads(&offsets);

        let fitted = estimate(&reads, 0, 4, &table, &config, "chr1:200");
        assert!(fitted.converged);
        assert_eq!(fitted.allele, Some(-3));

        let c = estimate_allele(&reads, 0, 4, fitted.fraction, &table, &config);
        let f = estimate_fraction(&reads, 0, 4, c, &table, &config);
        assert_eq!(c, fitted.allele);
        assert_relative_eq!(f, fitted.fraction, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_null_collapse() {
        let config = MosaicConfig::default();
        let reads = ReadObservation::from_reads(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8]);
        let estimate = estimate(&reads, 5, 8, &table(), &config, "chr1:300");

        assert!(estimate.converged);
        assert_eq!(estimate.fraction, 0.0);
        assert_eq!(estimate.allele, None);
    }

    #[test]
    fn test_estimate_iteration_cap() {
        let config = MosaicConfig {
            max_iterations: 1,
            ..MosaicConfig::default()
        };
        let estimate = estimate(&mosaic_reads(), 5, 5, &table(), &config, "chr1:400");

        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 2);
        assert_eq!(estimate.allele, Some(7));
    }
}
