//! Boundary-corrected likelihood-ratio test for mosaicism

use crate::likelihood::{log_likelihood_mixture, ReadObservation};
use crate::stutter::StutterTable;
use crate::{MosaicConfig, PrancstrError, PrancstrResult};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Tests H0: f = 0 against the fitted mosaic fraction.
///
/// The null sits on the boundary of `[0, 0.5]`, so the statistic is referred
/// to a 50:50 mixture of a point mass at zero and a chi-squared distribution.
#[derive(Debug, Clone)]
pub struct SignificanceTester {
    chi_squared: ChiSquared,
}

impl SignificanceTester {
    pub fn new(degrees_of_freedom: f64) -> PrancstrResult<Self> {
        let chi_squared = ChiSquared::new(degrees_of_freedom)
            .map_err(|e| PrancstrError::InvalidConfig(format!("chi-squared reference: {}", e)))?;
        Ok(Self { chi_squared })
    }

    /// Reference distribution used by prancSTR: chi-squared with 2 degrees of freedom
    pub fn boundary_mixture() -> PrancstrResult<Self> {
        Self::new(2.0)
    }

    /// Likelihood-ratio statistic `-2 (logL_null - logL_fit)`
    pub fn test_statistic(
        &self,
        reads: &ReadObservation,
        a: i64,
        b: i64,
        c: Option<i64>,
        f: f64,
        table: &StutterTable,
        config: &MosaicConfig,
    ) -> f64 {
        let fitted =
            log_likelihood_mixture(a, b, c, f, reads, table, config.floor_probability).log_likelihood;
        let null =
            log_likelihood_mixture(a, b, c, 0.0, reads, table, config.floor_probability).log_likelihood;
        -2.0 * (null - fitted)
    }

    /// p-value of a likelihood-ratio statistic under the boundary mixture
    pub fn pvalue_from_statistic(&self, statistic: f64) -> f64 {
        if statistic <= 0.0 {
            1.0
        } else {
            0.5 * self.chi_squared.sf(statistic)
        }
    }

    pub fn pvalue(
        &self,
        reads: &ReadObservation,
        a: i64,
        b: i64,
        c: Option<i64>,
        f: f64,
        table: &StutterTable,
        config: &MosaicConfig,
    ) -> f64 {
        let statistic = self.test_statistic(reads, a, b, c, f, table, config);
        self.pvalue_from_statistic(statistic)
    }
}
