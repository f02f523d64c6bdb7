//! Splits a lidar sweep into clusters of returns that hit the same object.
//!
//! The sweep is walked in scan order and a cluster is broken wherever two consecutive
//! returns are at least `adjacency_threshold` apart. Nothing is sorted, so the result
//! depends on the order in which the lidar delivered the points.

use std::mem;

use anyhow::ensure;
use itertools::Itertools;
use nalgebra::Point2;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Each maximal run of adjacent returns becomes one cluster, seed point included,
    /// and a run still open at the end of the sweep is kept.
    #[default]
    Contiguous,

    /// The first return of every run is left out of its cluster and a run still open at
    /// the end of the sweep is discarded. Kept to replay recordings tuned against it.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Two consecutive returns closer than this (meters) belong to the same cluster.
    pub adjacency_threshold: f32,

    /// Runs with fewer returns than this are dropped. Only used in `Contiguous` mode.
    pub min_cluster_points: usize,

    pub mode: GroupingMode,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            adjacency_threshold: 0.1,
            min_cluster_points: 2,
            mode: GroupingMode::Contiguous,
        }
    }
}

impl GroupingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.adjacency_threshold.is_finite() && self.adjacency_threshold > 0.0,
            "adjacency_threshold must be a positive distance, got {}",
            self.adjacency_threshold
        );
        Ok(())
    }
}

/// A non-empty group of returns believed to come from one physical object.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    points: Vec<Point2<f32>>,
}

impl Cluster {
    /// Returns `None` for an empty set of points.
    pub fn new(points: Vec<Point2<f32>>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn points(&self) -> &[Point2<f32>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arithmetic mean of the member points.
    pub fn centroid(&self) -> Point2<f32> {
        let sum = self
            .points
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / self.points.len() as f32)
    }
}

/// Groups `points` (in scan order) into clusters. Fewer than two points never form a cluster.
pub fn group_points(points: &[Point2<f32>], config: &GroupingConfig) -> Vec<Cluster> {
    if points.len() < 2 {
        return Vec::new();
    }

    match config.mode {
        GroupingMode::Contiguous => group_contiguous(
            points,
            config.adjacency_threshold,
            config.min_cluster_points,
        ),
        GroupingMode::Legacy => group_legacy(points, config.adjacency_threshold),
    }
}

fn group_contiguous(points: &[Point2<f32>], threshold: f32, min_points: usize) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    let mut current = vec![points[0]];

    let mut close = |run: Vec<Point2<f32>>| {
        if run.len() >= min_points {
            clusters.extend(Cluster::new(run));
        }
    };

    for (prev, next) in points.iter().tuple_windows() {
        if nalgebra::distance(prev, next) < threshold {
            current.push(*next);
        } else {
            close(mem::replace(&mut current, vec![*next]));
        }
    }

    // the sweep ended inside a run
    close(current);

    clusters
}

fn group_legacy(points: &[Point2<f32>], threshold: f32) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    let mut current = Vec::new();

    for (prev, next) in points.iter().tuple_windows() {
        if nalgebra::distance(prev, next) < threshold {
            current.push(*next);
        } else {
            clusters.extend(Cluster::new(mem::take(&mut current)));
        }
    }

    // a run still open here is dropped

    clusters
}
