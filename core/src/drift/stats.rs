//! Two-sample statistics used by the drift detector

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Welch's unequal-variance t-test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchTest {
    pub t: f64,
    pub degrees_of_freedom: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

/// Welch's t-test for a difference in means
///
/// Returns `None` when either sample has fewer than two observations. When
/// both samples have zero variance the statistic is undefined; the p-value is
/// then 1 for equal means and 0 otherwise.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (mean_a, var_a) = mean_and_variance(a);
    let (mean_b, var_b) = mean_and_variance(b);
    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let se_a = var_a / n_a;
    let se_b = var_b / n_b;
    let se = (se_a + se_b).sqrt();

    if se == 0.0 || !se.is_finite() {
        let p_value = if mean_a == mean_b { 1.0 } else { 0.0 };
        return Some(WelchTest {
            t: if p_value == 1.0 { 0.0 } else { f64::INFINITY },
            degrees_of_freedom: n_a + n_b - 2.0,
            p_value,
        });
    }

    let t = (mean_a - mean_b) / se;
    let df = (se_a + se_b).powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));
    Some(WelchTest {
        t,
        degrees_of_freedom: df,
        p_value: student_t_two_sided_p(t, df),
    })
}

/// Sample mean and unbiased variance
fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (mean, ss / (n - 1.0))
}

/// `P(|T| >= |t|)` for Student's t with `df` degrees of freedom
///
/// NaN when `t` is NaN or `df` is not a positive number.
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}
