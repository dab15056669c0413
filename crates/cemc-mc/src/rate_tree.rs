//! Cumulative-rate tree for rejection-free event selection.

/// A complete binary tree over event-slot rates.
///
/// Leaves hold per-slot rates; every internal node holds the sum of its
/// children, so `total_rate` is O(1) at the root, and `update` / `select`
/// are O(log n). Floating-point drift accumulated by incremental updates
/// is corrected by periodic [`CumulativeRateTree::resum`].
#[derive(Debug, Clone)]
pub struct CumulativeRateTree {
    n_slots: usize,
    /// Padded leaf count, a power of two.
    n_leaves: usize,
    /// 1-indexed heap layout; `tree[1]` is the root.
    tree: Vec<f64>,
}

impl CumulativeRateTree {
    /// Creates a tree of `n_slots` zero-rate slots.
    pub fn new(n_slots: usize) -> Self {
        let n_leaves = n_slots.max(1).next_power_of_two();
        Self {
            n_slots,
            n_leaves,
            tree: vec![0.0; 2 * n_leaves],
        }
    }

    /// Number of slots.
    pub fn n_slots(&self) -> usize {
        self.n_slots
    }

    /// Sum of every slot rate.
    pub fn total_rate(&self) -> f64 {
        self.tree[1]
    }

    /// Rate currently stored for `slot`.
    pub fn rate(&self, slot: usize) -> f64 {
        self.tree[self.n_leaves + slot]
    }

    /// Sets the rate of `slot`, propagating sums to the root.
    pub fn update(&mut self, slot: usize, rate: f64) {
        debug_assert!(slot < self.n_slots);
        let mut node = self.n_leaves + slot;
        self.tree[node] = rate;
        while node > 1 {
            node /= 2;
            self.tree[node] = self.tree[2 * node] + self.tree[2 * node + 1];
        }
    }

    /// Returns the slot whose cumulative-rate interval contains `u`, for
    /// `u` in `[0, total_rate)`.
    pub fn select(&self, u: f64) -> usize {
        let mut node = 1;
        let mut u = u;
        while node < self.n_leaves {
            let left = 2 * node;
            if u < self.tree[left] {
                node = left;
            } else {
                u -= self.tree[left];
                node = left + 1;
            }
        }
        (node - self.n_leaves).min(self.n_slots.saturating_sub(1))
    }

    /// Rebuilds every internal sum exactly from the current leaf rates.
    pub fn resum(&mut self) {
        for node in (1..self.n_leaves).rev() {
            self.tree[node] = self.tree[2 * node] + self.tree[2 * node + 1];
        }
    }
}
