//! Accumulate-then-reduce buffer for per-particle vector contributions.
//!
//! Parallel passes never write to a particle directly. They append
//! `(particle_index, value)` contributions, and a single reduction after the
//! pass sums each particle's contributions:
//!
//! ```text
//! gravity pass ─┐
//! spring pass  ─┼─> contributions (unordered, many per key)
//! external     ─┘          │
//!                   stable sort by key
//!                          │
//!            parallel over particles: sum own key range
//!                          │
//!                    totals[particle]
//! ```
//!
//! Rayon's `par_extend` gathers each worker's output separately and joins
//! them, so concurrent writers never share a slot.

use nalgebra::Vector3;
use rayon::prelude::*;

/// Multi-valued map from particle index to vector contributions.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    entries: Vec<(usize, Vector3<f64>)>,
    totals: Vec<Vector3<f64>>,
}

impl Accumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single contribution.
    pub fn push(&mut self, index: usize, value: Vector3<f64>) {
        self.entries.push((index, value));
    }

    /// Append the output of a parallel pass.
    pub fn par_extend<I>(&mut self, contributions: I)
    where
        I: IntoParallelIterator<Item = (usize, Vector3<f64>)>,
    {
        self.entries.par_extend(contributions);
    }

    /// Append copies of another accumulator's pending contributions.
    pub fn extend_from(&mut self, other: &Self) {
        self.entries.extend_from_slice(&other.entries);
    }

    /// Number of pending contributions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no pending contributions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the pending contributions for one particle.
    pub fn contributions(&self, index: usize) -> impl Iterator<Item = &Vector3<f64>> + '_ {
        self.entries
            .iter()
            .filter(move |(i, _)| *i == index)
            .map(|(_, value)| value)
    }

    /// Sum contributions into one total per particle in `0..len`.
    ///
    /// Contributions keyed at or beyond `len` are ignored. The summation
    /// order within a key is the order the contributions were appended, so
    /// the result does not depend on thread scheduling.
    pub fn reduce(&mut self, len: usize) -> &[Vector3<f64>] {
        self.entries.par_sort_by_key(|(index, _)| *index);

        self.totals.clear();
        self.totals.resize(len, Vector3::zeros());

        let entries = &self.entries;
        self.totals
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, total)| {
                let start = entries.partition_point(|(i, _)| *i < index);
                let end = entries.partition_point(|(i, _)| *i <= index);
                *total = entries[start..end]
                    .iter()
                    .fold(Vector3::zeros(), |acc, (_, value)| acc + value);
            });

        &self.totals
    }

    /// Totals from the last [`reduce`](Self::reduce).
    #[must_use]
    pub fn totals(&self) -> &[Vector3<f64>] {
        &self.totals
    }

    /// Drop all pending contributions, keeping allocations.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reduce_sums_per_key() {
        let mut acc = Accumulator::new();
        acc.push(2, Vector3::new(1.0, 0.0, 0.0));
        acc.push(0, Vector3::new(0.0, 1.0, 0.0));
        acc.push(2, Vector3::new(0.5, 0.0, 0.0));

        let totals = acc.reduce(3).to_vec();
        assert_relative_eq!(totals[0], Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(totals[1], Vector3::zeros());
        assert_relative_eq!(totals[2], Vector3::new(1.5, 0.0, 0.0));
    }

    #[test]
    fn test_parallel_writers_same_key() {
        let mut acc = Accumulator::new();
        acc.par_extend((0..10_000).into_par_iter().map(|i| (i % 4, Vector3::new(1.0, 0.0, 0.0))));

        assert_eq!(acc.len(), 10_000);
        let totals = acc.reduce(4);
        for total in totals {
            assert_relative_eq!(total.x, 2500.0);
        }
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut acc = Accumulator::new();
        acc.push(5, Vector3::new(1.0, 1.0, 1.0));
        let totals = acc.reduce(2);
        assert_eq!(totals.len(), 2);
        assert_relative_eq!(totals[0], Vector3::zeros());
    }

    #[test]
    fn test_clear() {
        let mut acc = Accumulator::new();
        acc.push(0, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(acc.contributions(0).count(), 1);
        acc.clear();
        assert!(acc.is_empty());
        assert_relative_eq!(acc.reduce(1)[0], Vector3::zeros());
    }
}
