use std::ops::Range;

use log::debug;
use rayon::prelude::*;

use crate::error::Result;
use crate::sim::precision::Precision;

use super::{Partial, composite_background, sort_partials};

/// Counts reported by a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of partials received.
    pub num_partials: usize,
    /// Number of merged records (one per distinct pixel).
    pub num_pixels: usize,
    /// Largest number of partials blended into a single pixel.
    pub max_depth_complexity: usize,
}

/// Merges unordered partials into one record per pixel.
///
/// The compositor keeps no state between calls. The optional background is
/// configuration, applied after every merge.
#[derive(Debug, Clone, Default)]
pub struct PartialCompositor<P: Precision> {
    background: Option<Vec<P>>,
}

impl<P: Precision> PartialCompositor<P> {
    pub fn new() -> Self {
        Self { background: None }
    }

    pub fn with_background(mut self, background: Vec<P>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn set_background(&mut self, background: Option<Vec<P>>) {
        self.background = background;
    }

    pub fn background(&self) -> Option<&[P]> {
        self.background.as_deref()
    }

    /// Sorts, blends same-pixel groups and applies the background.
    pub fn merge<T>(&self, partials: Vec<T>) -> Result<Vec<T>>
    where
        T: Partial<Value = P>,
    {
        self.merge_with_stats(partials).map(|(merged, _)| merged)
    }

    pub fn merge_with_stats<T>(&self, mut partials: Vec<T>) -> Result<(Vec<T>, MergeStats)>
    where
        T: Partial<Value = P>,
    {
        let num_partials = partials.len();
        if let Some(first) = partials.first() {
            let num_bins = first.num_bins();
            partials.iter().try_for_each(|p| p.check_shape(num_bins))?;
        }

        sort_partials(&mut partials);
        let groups = pixel_groups(&partials);
        let max_depth_complexity = groups.iter().map(|g| g.len()).max().unwrap_or(0);

        let mut merged: Vec<T> = groups
            .into_par_iter()
            .map(|range| reduce_group(&partials[range]))
            .collect::<Result<Vec<T>>>()?;

        if let Some(background) = &self.background {
            composite_background(&mut merged, background)?;
        }

        let stats = MergeStats {
            num_partials,
            num_pixels: merged.len(),
            max_depth_complexity,
        };
        debug!(
            "merged {} partials into {} pixels (max {} per pixel)",
            stats.num_partials, stats.num_pixels, stats.max_depth_complexity
        );
        Ok((merged, stats))
    }

    /// Merges partial sets received from several workers.
    ///
    /// Where each set came from does not matter: all partials are pooled and
    /// merged with the same ordering rule. Depths must share one coordinate frame.
    pub fn merge_workers<T>(&self, worker_sets: Vec<Vec<T>>) -> Result<Vec<T>>
    where
        T: Partial<Value = P>,
    {
        let total: usize = worker_sets.iter().map(|s| s.len()).sum();
        debug!(
            "compositing {} partials from {} workers",
            total,
            worker_sets.len()
        );
        let mut pooled = Vec::with_capacity(total);
        for set in worker_sets {
            pooled.extend(set);
        }
        self.merge(pooled)
    }
}

/// Index ranges of consecutive partials sharing a pixel id. Input must be sorted.
fn pixel_groups<T: Partial>(partials: &[T]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=partials.len() {
        if i == partials.len() || partials[i].pixel_id() != partials[start].pixel_id() {
            groups.push(start..i);
            start = i;
        }
    }
    groups
}

/// Blends a sorted same-pixel group front-to-back into its first record.
fn reduce_group<T: Partial>(group: &[T]) -> Result<T> {
    let mut acc = group[0].clone();
    for next in &group[1..] {
        acc.blend(next)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use crate::sim::engine::{AbsorptionPartial, EmissionPartial};

    #[test]
    fn test_pixel_groups() {
        let partials = vec![
            AbsorptionPartial::new(0, 0.0, vec![1.0_f64]),
            AbsorptionPartial::new(0, 0.0, vec![1.0]),
            AbsorptionPartial::new(2, 0.0, vec![1.0]),
        ];
        assert_eq!(pixel_groups(&partials), vec![0..2, 2..3]);
        assert!(pixel_groups::<AbsorptionPartial<f64>>(&[]).is_empty());
    }

    #[test]
    fn test_merge_same_pixel() {
        let compositor = PartialCompositor::new();
        let partials = vec![
            AbsorptionPartial::new(5, 0.0, vec![0.5_f64, 0.8]),
            AbsorptionPartial::new(7, 0.0, vec![0.1, 0.1]),
            AbsorptionPartial::new(5, 0.0, vec![0.4, 0.9]),
        ];
        let (merged, stats) = compositor.merge_with_stats(partials).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].pixel_id, 5);
        assert!((merged[0].bins[0] - 0.2).abs() < 1e-10);
        assert!((merged[0].bins[1] - 0.72).abs() < 1e-10);
        assert_eq!(merged[1].pixel_id, 7);
        assert_eq!(
            stats,
            MergeStats {
                num_partials: 3,
                num_pixels: 2,
                max_depth_complexity: 2,
            }
        );
    }

    #[test]
    fn test_merge_emission_uses_depth_order() {
        let compositor = PartialCompositor::new();
        // Far partial listed first
        let partials = vec![
            EmissionPartial::new(0, 2.0, vec![1.0_f64], vec![2.0]),
            EmissionPartial::new(0, 1.0, vec![0.5], vec![0.0]),
        ];
        let merged = compositor.merge(partials).unwrap();
        assert_eq!(merged.len(), 1);
        assert!((merged[0].emission_bins[0] - 1.0).abs() < 1e-10);
        assert!((merged[0].depth - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_merge_applies_background() {
        let compositor = PartialCompositor::new().with_background(vec![0.5_f64, 1.0]);
        let partials = vec![AbsorptionPartial::new(1, 0.0, vec![0.5, 0.5])];
        let merged = compositor.merge(partials).unwrap();
        assert!((merged[0].bins[0] - 0.25).abs() < 1e-10);
        assert!((merged[0].bins[1] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_merge_rejects_mixed_bin_counts() {
        let compositor = PartialCompositor::new();
        let partials = vec![
            AbsorptionPartial::new(0, 0.0, vec![1.0_f32, 1.0]),
            AbsorptionPartial::new(1, 0.0, vec![1.0_f32]),
        ];
        let err = compositor.merge(partials).unwrap_err();
        assert!(matches!(err, TraceError::InvariantViolation(_)));
    }

    #[test]
    fn test_merge_rejects_short_emission_bins() {
        // Alone at its pixel, so blend never sees it
        let compositor = PartialCompositor::new();
        let partials = vec![
            EmissionPartial::new(0, 1.0, vec![1.0_f64, 1.0], vec![0.5, 0.5]),
            EmissionPartial::new(1, 1.0, vec![1.0, 1.0], vec![1.0]),
        ];
        let err = compositor.merge(partials).unwrap_err();
        assert!(matches!(err, TraceError::InvariantViolation(_)));
    }

    #[test]
    fn test_merge_workers_matches_single_merge() {
        let compositor = PartialCompositor::new();
        let worker_a = vec![
            EmissionPartial::new(1, 3.0, vec![0.5_f64], vec![1.0]),
            EmissionPartial::new(0, 1.0, vec![0.9], vec![0.1]),
        ];
        let worker_b = vec![
            EmissionPartial::new(1, 1.0, vec![0.8], vec![0.2]),
            EmissionPartial::new(0, 2.0, vec![0.7], vec![0.3]),
        ];
        let mut pooled = worker_a.clone();
        pooled.extend(worker_b.clone());

        let from_workers = compositor.merge_workers(vec![worker_b, worker_a]).unwrap();
        let single = compositor.merge(pooled).unwrap();
        assert_eq!(from_workers, single);
    }

    #[test]
    fn test_merge_empty() {
        let compositor: PartialCompositor<f64> = PartialCompositor::new();
        let (merged, stats) = compositor
            .merge_with_stats(Vec::<AbsorptionPartial<f64>>::new())
            .unwrap();
        assert!(merged.is_empty());
        assert_eq!(stats, MergeStats::default());
    }
}
