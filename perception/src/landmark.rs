use common::robot::Landmark;

use crate::grouping::Cluster;

/// Reduces every cluster to its centroid and keeps the ones strictly closer than
/// `range_cutoff` to the vehicle origin. Discovery order is preserved.
pub fn filter_landmarks(clusters: &[Cluster], range_cutoff: f32) -> Vec<Landmark> {
    clusters
        .iter()
        .map(|c| Landmark::from(c.centroid()))
        .filter(|l| l.range() < range_cutoff)
        .collect()
}
