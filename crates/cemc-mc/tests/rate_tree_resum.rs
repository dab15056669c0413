use proptest::prelude::*;

use cemc_mc::CumulativeRateTree;

proptest! {
    // After any sequence of updates, the incrementally maintained total
    // must track the exact leaf sum.
    #[test]
    fn total_rate_tracks_exact_resum(
        n_slots in 1usize..300,
        updates in proptest::collection::vec((0usize..300, 0.0f64..10.0), 1..500),
    ) {
        let mut tree = CumulativeRateTree::new(n_slots);
        for (slot, rate) in updates {
            tree.update(slot % n_slots, rate);
        }
        let exact: f64 = (0..n_slots).map(|slot| tree.rate(slot)).sum();
        let drifted = tree.total_rate();
        prop_assert!((drifted - exact).abs() <= 1e-10 * exact.max(1.0));
        tree.resum();
        prop_assert!((tree.total_rate() - exact).abs() <= 1e-12 * exact.max(1.0));
    }

    // select(u) must return the slot whose cumulative interval contains u.
    #[test]
    fn select_inverts_cumulative_sums(
        rates in proptest::collection::vec(0.0f64..5.0, 2..64),
        fraction in 0.0f64..1.0,
    ) {
        let mut tree = CumulativeRateTree::new(rates.len());
        for (slot, &rate) in rates.iter().enumerate() {
            tree.update(slot, rate);
        }
        let total = tree.total_rate();
        prop_assume!(total > 0.0);
        let u = fraction * total * 0.999_999;
        let selected = tree.select(u);

        // u must fall inside the selected slot's cumulative interval, up
        // to summation round-off
        let before: f64 = rates[..selected].iter().sum();
        let eps = 1e-9 * total.max(1.0);
        prop_assert!(before <= u + eps);
        prop_assert!(u < before + rates[selected] + eps);
    }
}
