//! Bounded one-dimensional minimisation

/// Result of a bounded scalar minimisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub evaluations: usize,
}

/// Minimise `objective` over `[lower, upper]` with Brent's method
/// (golden-section search with parabolic interpolation).
///
/// Brent's method only probes interior points, so both endpoints are
/// evaluated afterwards and returned exactly when they score at least as well.
pub fn minimize_bounded<F>(
    mut objective: F,
    lower: f64,
    upper: f64,
    xtol: f64,
    max_evaluations: usize,
) -> Minimum
where
    F: FnMut(f64) -> f64,
{
    if upper <= lower {
        let value = objective(lower);
        return Minimum {
            x: lower,
            value,
            evaluations: 1,
        };
    }

    let sqrt_eps = f64::EPSILON.sqrt();
    let golden = 0.5 * (3.0 - 5.0_f64.sqrt());

    let (mut a, mut b) = (lower, upper);
    let mut fulc = a + golden * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat: f64 = 0.0;
    let mut e: f64 = 0.0;
    let mut fx = objective(xf);
    let mut evaluations = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;
    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xtol / 3.0;
    let mut tol2 = 2.0 * tol1;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) && evaluations < max_evaluations {
        let mut golden_step = true;

        if e.abs() > tol1 {
            golden_step = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = if xm - xf >= 0.0 { tol1 } else { -tol1 };
                }
            } else {
                golden_step = true;
            }
        }

        if golden_step {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden * e;
        }

        let step = if rat >= 0.0 { 1.0 } else { -1.0 };
        let x = xf + step * rat.abs().max(tol1);
        let fu = objective(x);
        evaluations += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xtol / 3.0;
        tol2 = 2.0 * tol1;
    }

    let f_lower = objective(lower);
    let f_upper = objective(upper);
    evaluations += 2;

    if f_lower <= fx && f_lower <= f_upper {
        Minimum {
            x: lower,
            value: f_lower,
            evaluations,
        }
    } else if f_upper < fx {
        Minimum {
            x: upper,
            value: f_upper,
            evaluations,
        }
    } else {
        Minimum {
            x: xf,
            value: fx,
            evaluations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interior_minimum() {
        let result = minimize_bounded(|x| (x - 0.2).powi(2), 0.0, 0.5, 1e-8, 500);
        assert_relative_eq!(result.x, 0.2, epsilon = 1e-6);
        assert!(result.value < 1e-10);
    }

    #[test]
    fn test_boundary_minimum_is_exact() {
        let result = minimize_bounded(|x| x + 1.0, 0.0, 0.5, 1e-6, 500);
        assert_eq!(result.x, 0.0);
        assert_eq!(result.value, 1.0);

        let result = minimize_bounded(|x| -x, 0.0, 0.5, 1e-6, 500);
        assert_eq!(result.x, 0.5);
    }

    #[test]
    fn test_non_quadratic_objective() {
        let result = minimize_bounded(|x: f64| -(x.ln()) + 4.0 * x, 0.01, 2.0, 1e-8, 500);
        assert_relative_eq!(result.x, 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_interval() {
        let result = minimize_bounded(|x| x * x, 0.3, 0.3, 1e-6, 500);
        assert_eq!(result.x, 0.3);
        assert_eq!(result.evaluations, 1);
    }

    #[test]
    fn test_evaluation_cap() {
        let result = minimize_bounded(|x| (x - 0.37).powi(2), 0.0, 1.0, 1e-12, 5);
        assert!(result.evaluations <= 7);
    }
}
