//! # prancSTR - somatic mosaicism detection at short tandem repeats
//!
//! A Rust implementation of prancSTR for detecting mosaic (post-zygotic)
//! alleles at STR loci from per-sample read length distributions reported
//! in HipSTR VCF files.

pub mod detect;
pub mod estimator;
pub mod likelihood;
pub mod observation;
pub mod optimize;
pub mod significance;
pub mod stutter;
pub mod utils;
pub mod vcf;

use serde::{Deserialize, Serialize};

/// PCR stutter parameters for a single locus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StutterParams {
    /// Probability of an expansion stutter read
    pub up: f64,
    /// Probability of a deletion stutter read
    pub down: f64,
    /// Geometric step size parameter
    pub rho: f64,
}

impl StutterParams {
    /// Build stutter parameters, replacing degenerate values that would
    /// otherwise give zero or one probabilities.
    pub fn new(up: f64, down: f64, rho: f64) -> Self {
        Self {
            up: if up == 0.0 { 0.01 } else { up },
            down: if down == 0.0 { 0.01 } else { down },
            rho: if rho == 1.0 { 0.95 } else { rho },
        }
    }
}

/// Diploid genotype in repeat units relative to the reference allele
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Genotype {
    Called { a: i64, b: i64 },
    Uncalled,
}

impl Genotype {
    pub fn alleles(&self) -> Option<(i64, i64)> {
        match *self {
            Genotype::Called { a, b } => Some((a, b)),
            Genotype::Uncalled => None,
        }
    }
}

/// Fitted mosaic hypothesis and supporting statistics for one sample at one locus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub allele_a: i64,
    pub allele_b: i64,
    pub mosaic_allele: Option<i64>,
    pub mosaic_fraction: f64,
    pub pvalue: f64,
    pub mosaic_support: u32,
}

impl DetectionResult {
    pub fn new(
        allele_a: i64,
        allele_b: i64,
        mosaic_allele: Option<i64>,
        mosaic_fraction: f64,
        pvalue: f64,
        mosaic_support: u32,
    ) -> Self {
        Self {
            allele_a,
            allele_b,
            mosaic_allele,
            mosaic_fraction,
            pvalue,
            mosaic_support,
        }
    }
}

/// Tuning values for the likelihood engine and the mosaic estimator
#[derive(Debug, Clone)]
pub struct MosaicConfig {
    /// Stutter offsets are tabulated over `[-window, window)`
    pub window: i64,
    /// Probability used in place of zero so that `ln` stays finite
    pub floor_probability: f64,
    /// Candidate mosaic alleles extend this far past the observed reads
    pub search_margin: i64,
    pub convergence_tolerance: f64,
    /// Fractions below this count as "no mosaicism" during convergence checks
    pub null_fraction: f64,
    pub max_iterations: usize,
    pub initial_fraction: f64,
    pub max_fraction: f64,
    pub solver_tolerance: f64,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            window: 100,
            floor_probability: 10e-200,
            search_margin: 3,
            convergence_tolerance: 0.01,
            null_fraction: 1e-6,
            max_iterations: 100,
            initial_fraction: 0.01,
            max_fraction: 0.5,
            solver_tolerance: 1e-6,
        }
    }
}

/// Error types for the prancSTR library
#[derive(Debug, thiserror::Error)]
pub enum PrancstrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported VCF type: {0}")]
    UnsupportedVcfType(String),
}

pub type PrancstrResult<T> = Result<T, PrancstrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stutter_params_fallbacks() {
        let params = StutterParams::new(0.0, 0.0, 1.0);
        assert_eq!(params.up, 0.01);
        assert_eq!(params.down, 0.01);
        assert_eq!(params.rho, 0.95);

        let params = StutterParams::new(0.05, 0.02, 0.9);
        assert_eq!(params, StutterParams { up: 0.05, down: 0.02, rho: 0.9 });
    }

    #[test]
    fn test_genotype_alleles() {
        assert_eq!(Genotype::Called { a: -1, b: 2 }.alleles(), Some((-1, 2)));
        assert_eq!(Genotype::Uncalled.alleles(), None);
    }
}
