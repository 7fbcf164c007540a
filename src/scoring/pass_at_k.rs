//! pass@k under the independent-trial approximation.

/// Percentage chance that at least one of `k` trials succeeds, given `c`
/// successes observed in `n` trials.
///
/// Computed as `100 * (1 - (1 - c/n)^k)`, treating trials as independent
/// Bernoulli draws at the observed rate. This is not the unbiased
/// combinatorial estimator. Returns 0 when `n` is 0.
pub fn pass_at_k(n: usize, c: usize, k: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let c = c.min(n);
    let failure_rate = 1.0 - c as f64 / n as f64;
    let value = 100.0 * (1.0 - failure_rate.powi(i32::try_from(k).unwrap_or(i32::MAX)));
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        for n in 0..=12 {
            for c in 0..=n {
                for k in 1..=6 {
                    let v = pass_at_k(n, c, k);
                    assert!((0.0..=100.0).contains(&v), "n={n} c={c} k={k} -> {v}");
                }
            }
        }
    }

    #[test]
    fn test_edges() {
        assert_eq!(pass_at_k(0, 0, 1), 0.0);
        assert_eq!(pass_at_k(5, 0, 5), 0.0);
        assert_eq!(pass_at_k(5, 5, 1), 100.0);
        assert_eq!(pass_at_k(5, 5, 5), 100.0);
    }

    #[test]
    fn test_known_values() {
        assert!((pass_at_k(4, 2, 1) - 50.0).abs() < 1e-9);
        assert!((pass_at_k(4, 2, 2) - 75.0).abs() < 1e-9);
        assert!((pass_at_k(10, 1, 5) - 40.951).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_k() {
        assert!(pass_at_k(10, 3, 5) > pass_at_k(10, 3, 1));
    }

    #[test]
    fn test_huge_k_saturates() {
        assert!((pass_at_k(10, 1, u32::MAX) - 100.0).abs() < 1e-9);
        assert_eq!(pass_at_k(10, 0, u32::MAX), 0.0);
    }
}
