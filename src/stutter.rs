//! PCR stutter error model

use crate::StutterParams;

/// Probability of observing a read `delta` repeat units away from its true allele
pub fn stutter_probability(delta: i64, params: &StutterParams) -> f64 {
    let abs_delta = delta.unsigned_abs();
    if delta == 0 {
        1.0 - params.up - params.down
    } else {
        let step = params.rho * (1.0 - params.rho).powi((abs_delta - 1) as i32);
        if delta > 0 {
            params.up * step
        } else {
            params.down * step
        }
    }
}

/// Confine `x` to lie within `[min, max]`
pub fn confine_range<T: PartialOrd>(x: T, min: T, max: T) -> T {
    if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}

/// Stutter probabilities tabulated over the offsets `[-window, window)`
#[derive(Debug, Clone)]
pub struct StutterTable {
    window: i64,
    probs: Vec<f64>,
    params: StutterParams,
}

impl StutterTable {
    pub fn new(params: StutterParams, window: i64) -> Self {
        let probs = (-window..window)
            .map(|delta| stutter_probability(delta, &params))
            .collect();

        Self {
            window,
            probs,
            params,
        }
    }

    /// Look up an offset, clamping it to the tabulated window first
    pub fn probability(&self, delta: i64) -> f64 {
        let delta = confine_range(delta, -self.window, self.window - 1);
        self.probs[(delta + self.window) as usize]
    }

    pub fn window(&self) -> i64 {
        self.window
    }

    pub fn params(&self) -> &StutterParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stutter_probability_no_stutter() {
        for &(u, d) in &[(0.05, 0.05), (0.1, 0.01), (0.3, 0.2)] {
            let params = StutterParams::new(u, d, 0.9);
            assert_relative_eq!(stutter_probability(0, &params), 1.0 - u - d);
        }
    }

    #[test]
    fn test_stutter_probability_geometric() {
        let params = StutterParams::new(0.05, 0.02, 0.9);
        assert_relative_eq!(stutter_probability(1, &params), 0.05 * 0.9);
        assert_relative_eq!(stutter_probability(-1, &params), 0.02 * 0.9);
        assert_relative_eq!(stutter_probability(3, &params), 0.05 * 0.9 * 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_stutter_probability_decreasing() {
        let params = StutterParams::new(0.1, 0.08, 0.6);
        for sign in [-1i64, 1] {
            let mut previous = 1.0;
            for step in 1..20 {
                let prob = stutter_probability(sign * step, &params);
                assert!(prob > 0.0 && prob < 1.0);
                assert!(prob < previous);
                previous = prob;
            }
        }
    }

    #[test]
    fn test_confine_range() {
        assert_eq!(confine_range(5, -100, 100), 5);
        assert_eq!(confine_range(-150, -100, 100), -100);
        assert_eq!(confine_range(150, -100, 100), 100);
        assert_eq!(confine_range(7, 7, 7), 7);
        assert_eq!(confine_range(0.7, 0.0, 0.5), 0.5);
    }

    #[test]
    fn test_table_lookup_clamps() {
        let params = StutterParams::new(0.05, 0.05, 0.9);
        let table = StutterTable::new(params, 100);

        assert_eq!(table.window(), 100);
        assert_relative_eq!(table.probability(0), 0.9, epsilon = 1e-12);
        assert_eq!(table.probability(150), table.probability(99));
        assert_eq!(table.probability(100), table.probability(99));
        assert_eq!(table.probability(-150), table.probability(-100));
    }

    #[test]
    fn test_narrow_window() {
        let params = StutterParams::new(0.05, 0.05, 0.5);
        let table = StutterTable::new(params, 2);

        assert_relative_eq!(table.probability(1), stutter_probability(1, &params));
        assert_relative_eq!(table.probability(10), stutter_probability(1, &params));
        assert_relative_eq!(table.probability(-10), stutter_probability(-2, &params));
    }
}
