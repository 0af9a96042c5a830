//! Property tests for statistical invariants.
//!
//! Uses proptest to verify:
//! 1. P-values are probabilities
//! 2. Matching checkpoint and final percentages give p = 1
//! 3. The exact test agrees with a direct enumeration of the definition
//! 4. Points on y = x give perfect agreement statistics
//! 5. Correlation and R-squared stay in range
//! 6. Values of any magnitude give finite statistics or an explicit error

use proptest::prelude::*;

use concordance_core::special::binomial_pmf;
use concordance_core::{
    analyze_stage, binomial_test_two_sided, test_pairs, SignificanceConfig, StageBucket,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_percentage() -> impl Strategy<Value = f64> {
    (0.0..=100.0_f64).prop_map(|p| (p * 10.0).round() / 10.0)
}

fn arb_pairs() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.0..100.0_f64, 0.0..100.0_f64), 3..30)
}

/// Any finite magnitude, from the smallest normal up to near `f64::MAX`.
fn arb_unbounded_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        prop::num::f64::NORMAL,
        -1e300..1e300_f64,
        -1.0..1.0_f64,
    ]
}

fn arb_unbounded_pairs() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((arb_unbounded_value(), arb_unbounded_value()), 2..20)
}

/// Direct enumeration in linear space, no complement trick.
fn reference_p_value(k: u64, n: u64, p: f64) -> f64 {
    let observed = binomial_pmf(k, n, p);
    (0..=n)
        .map(|j| binomial_pmf(j, n, p))
        .filter(|&m| m <= observed * (1.0 + 1e-7))
        .sum::<f64>()
        .min(1.0)
}

// ── 1–3. Significance tester ─────────────────────────────────────────

proptest! {
    #[test]
    fn p_value_is_a_probability(cp in arb_percentage(), fin in arb_percentage(), n in 1_u64..500) {
        let config = SignificanceConfig::default().with_trials(n).with_parallelism(false);
        let results = test_pairs(&[cp], &[fin], &config).unwrap();
        let p = results[0].as_ref().unwrap().p_value;
        prop_assert!((0.0..=1.0).contains(&p), "p = {}", p);
    }

    /// Only integral n * p guarantees k == n * p; 94.5% of 100 trials
    /// rounds to k = 94 and gives p = 0.8243864, not 1.
    #[test]
    fn equal_integer_percentages_give_one(pct in 0_u32..=100) {
        let v = pct as f64;
        let config = SignificanceConfig::default().with_parallelism(false);
        let results = test_pairs(&[v], &[v], &config).unwrap();
        prop_assert_eq!(results[0].as_ref().unwrap().p_value, 1.0);
    }

    #[test]
    fn exact_test_matches_enumeration(n in 1_u64..400, k_frac in 0.0..=1.0_f64, p in 0.01..0.99_f64) {
        let k = ((n as f64) * k_frac).floor() as u64;
        let got = binomial_test_two_sided(k, n, p).unwrap();
        let expected = reference_p_value(k, n, p);
        prop_assert!((got - expected).abs() < 1e-9, "k={} n={} p={}: {} vs {}", k, n, p, got, expected);
    }

    #[test]
    fn observed_and_reference_swap_is_consistent(a in 1_u32..99, b in 1_u32..99) {
        // Testing a against b and b against a are different tests; each must
        // still equal its own directly enumerated value.
        let n = 1000;
        let ab = binomial_test_two_sided(a as u64 * 10, n, b as f64 / 100.0).unwrap();
        let ba = binomial_test_two_sided(b as u64 * 10, n, a as f64 / 100.0).unwrap();
        prop_assert!((ab - reference_p_value(a as u64 * 10, n, b as f64 / 100.0)).abs() < 1e-9);
        prop_assert!((ba - reference_p_value(b as u64 * 10, n, a as f64 / 100.0)).abs() < 1e-9);
    }
}

// ── 4–5. Regression analyzer ─────────────────────────────────────────

proptest! {
    #[test]
    fn identity_line_is_perfect(xs in prop::collection::vec(0.0..100.0_f64, 2..30)) {
        let mut xs = xs;
        xs.dedup();
        prop_assume!(xs.windows(2).any(|w| w[0] != w[1]));

        let tuples: Vec<(f64, f64)> = xs.iter().map(|&x| (x, x)).collect();
        let stats = analyze_stage(&StageBucket::from_tuples(0, &tuples)).unwrap();

        prop_assert!((stats.pearson_correlation.clone().unwrap() - 1.0).abs() < 1e-9);
        prop_assert!(stats.rmse.clone().unwrap() < 1e-9);
        prop_assert!((stats.r_squared.clone().unwrap() - 1.0).abs() < 1e-9);
        prop_assert!(stats.slope_deviation_from_1.clone().unwrap() < 1e-9);
    }

    #[test]
    fn statistics_stay_in_range(tuples in arb_pairs()) {
        let stats = analyze_stage(&StageBucket::from_tuples(0, &tuples)).unwrap();
        if let Ok(r) = stats.pearson_correlation {
            prop_assert!((-1.0..=1.0).contains(&r));
        }
        if let Ok(r2) = stats.r_squared {
            prop_assert!(r2 <= 1.0 + 1e-12);
            // With an intercept, OLS R-squared equals r^2.
            if let Ok(r) = stats.pearson_correlation {
                prop_assert!((r2 - r * r).abs() < 1e-6);
            }
        }
        if let Ok(e) = stats.rmse {
            prop_assert!(e >= 0.0);
        }
        if let Ok(d) = stats.slope_deviation_from_1 {
            prop_assert!(d >= 0.0);
        }
    }

    #[test]
    fn unbounded_values_give_finite_statistics(tuples in arb_unbounded_pairs()) {
        let stats = analyze_stage(&StageBucket::from_tuples(0, &tuples)).unwrap();
        if let Ok(r) = stats.pearson_correlation {
            prop_assert!(r.is_finite() && (-1.0..=1.0).contains(&r), "r = {}", r);
        }
        if let Ok(e) = stats.rmse {
            prop_assert!(e.is_finite() && e >= 0.0, "rmse = {}", e);
        }
        if let Ok(r2) = stats.r_squared {
            prop_assert!(r2.is_finite() && r2 <= 1.0, "r2 = {}", r2);
        }
        if let Ok(d) = stats.slope_deviation_from_1 {
            prop_assert!(d.is_finite() && d >= 0.0, "deviation = {}", d);
        }
        if let Some(fit) = stats.fit {
            prop_assert!(fit.slope.is_finite() && fit.intercept.is_finite());
        }
    }
}
