//! Fractional spine partitioning.
//!
//! Every spine section owns a half-open range within `[0,1)`. The ranges are
//! contiguous, monotonically increasing, and cover `[0,1)` exactly, so a
//! global reading fraction always maps to exactly one section.

use serde::{Deserialize, Serialize};

/// Half-open range `[start, end)` of the global progress axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionRange {
    pub start: f64,
    pub end: f64,
}

impl FractionRange {
    pub fn contains(&self, fraction: f64) -> bool {
        fraction >= self.start && fraction < self.end
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }
}

/// How the progress axis is divided among spine sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionPolicy {
    /// Every section gets an equal share. Documented approximation: skews
    /// global percentages for books with uneven chapter sizes.
    #[default]
    Uniform,
    /// Shares proportional to content byte length.
    SizeWeighted,
}

/// Partition `[0,1)` across `weights.len()` sections.
///
/// Boundary values are computed once and shared between adjacent ranges, so
/// contiguity is exact rather than approximate.
pub fn partition(policy: PartitionPolicy, weights: &[usize]) -> Vec<FractionRange> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }

    let boundaries: Vec<f64> = match policy {
        PartitionPolicy::Uniform => (0..=n).map(|i| i as f64 / n as f64).collect(),
        PartitionPolicy::SizeWeighted => {
            // Zero-length sections still get a sliver of the axis
            let total: u64 = weights.iter().map(|&w| w.max(1) as u64).sum();
            let mut cumulative = 0u64;
            let mut bounds = Vec::with_capacity(n + 1);
            bounds.push(0.0);
            for &w in weights {
                cumulative += w.max(1) as u64;
                bounds.push(cumulative as f64 / total as f64);
            }
            bounds
        }
    };

    (0..n)
        .map(|i| FractionRange {
            start: boundaries[i],
            end: if i + 1 == n { 1.0 } else { boundaries[i + 1] },
        })
        .collect()
}

/// Index of the section owning `fraction`. `fraction >= 1.0` maps to the
/// last section; out-of-range inputs clamp.
pub fn section_for_fraction(ranges: &[FractionRange], fraction: f64) -> Option<usize> {
    if ranges.is_empty() {
        return None;
    }
    if fraction >= 1.0 {
        return Some(ranges.len() - 1);
    }
    if fraction <= 0.0 {
        return Some(0);
    }
    ranges.iter().position(|r| r.contains(fraction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_partition_invariants(ranges: &[FractionRange]) {
        assert_eq!(ranges[0].start, 0.0);
        assert_eq!(ranges[ranges.len() - 1].end, 1.0);
        for window in ranges.windows(2) {
            assert_eq!(window[0].end, window[1].start);
            assert!(window[0].start < window[0].end);
        }
    }

    #[test]
    fn test_uniform_two_sections() {
        let ranges = partition(PartitionPolicy::Uniform, &[10, 10]);
        assert_eq!(ranges[0], FractionRange { start: 0.0, end: 0.5 });
        assert_eq!(ranges[1], FractionRange { start: 0.5, end: 1.0 });
    }

    #[test]
    fn test_weighted_prefers_larger_sections() {
        let ranges = partition(PartitionPolicy::SizeWeighted, &[300, 100]);
        assert_eq!(ranges[0].end, 0.75);
        assert_partition_invariants(&ranges);
    }

    #[test]
    fn test_weighted_zero_weight_section() {
        let ranges = partition(PartitionPolicy::SizeWeighted, &[0, 100]);
        assert!(ranges[0].span() > 0.0);
        assert_partition_invariants(&ranges);
    }

    #[test]
    fn test_empty_spine() {
        assert!(partition(PartitionPolicy::Uniform, &[]).is_empty());
        assert_eq!(section_for_fraction(&[], 0.5), None);
    }

    #[test]
    fn test_section_for_fraction_edges() {
        let ranges = partition(PartitionPolicy::Uniform, &[1, 1, 1, 1]);
        assert_eq!(section_for_fraction(&ranges, 0.0), Some(0));
        assert_eq!(section_for_fraction(&ranges, 0.25), Some(1));
        assert_eq!(section_for_fraction(&ranges, 0.999), Some(3));
        assert_eq!(section_for_fraction(&ranges, 1.0), Some(3));
        assert_eq!(section_for_fraction(&ranges, -0.5), Some(0));
        assert_eq!(section_for_fraction(&ranges, 7.0), Some(3));
    }

    proptest! {
        #[test]
        fn prop_uniform_partitions_exactly(n in 1usize..200) {
            let weights = vec![1usize; n];
            let ranges = partition(PartitionPolicy::Uniform, &weights);
            prop_assert_eq!(ranges.len(), n);
            assert_partition_invariants(&ranges);
        }

        #[test]
        fn prop_weighted_partitions_exactly(
            weights in prop::collection::vec(0usize..100_000, 1..64)
        ) {
            let ranges = partition(PartitionPolicy::SizeWeighted, &weights);
            prop_assert_eq!(ranges.len(), weights.len());
            assert_partition_invariants(&ranges);
        }

        #[test]
        fn prop_every_fraction_has_an_owner(
            n in 1usize..32,
            fraction in 0.0f64..1.0
        ) {
            let ranges = partition(PartitionPolicy::Uniform, &vec![1; n]);
            let idx = section_for_fraction(&ranges, fraction);
            prop_assert!(idx.is_some());
            prop_assert!(ranges[idx.unwrap()].contains(fraction));
        }
    }
}
