use anyhow::ensure;
use common::{robot::Landmark, sensor::LidarReading};
use nalgebra::Point2;
use serde::Deserialize;

use crate::{
    grouping::{group_points, GroupingConfig},
    landmark::filter_landmarks,
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub grouping: GroupingConfig,

    /// Cones at or beyond this distance (meters) from the vehicle are ignored.
    pub cones_range_cutoff: f32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingConfig::default(),
            cones_range_cutoff: 7.0,
        }
    }
}

impl PerceptionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.grouping.validate()?;
        ensure!(
            self.cones_range_cutoff > 0.0,
            "cones_range_cutoff must be positive, got {}",
            self.cones_range_cutoff
        );
        Ok(())
    }
}

/// Turns a lidar sweep into the set of cones close enough to matter for control.
///
/// Holds no state between sweeps: the same reading always gives the same cones.
#[derive(Debug, Clone)]
pub struct ConeDetector {
    config: PerceptionConfig,
}

impl ConeDetector {
    pub fn new(config: PerceptionConfig) -> Self {
        Self { config }
    }

    /// Fails only if the reading is malformed.
    pub fn detect(&self, reading: &LidarReading) -> anyhow::Result<Vec<Landmark>> {
        let points = reading.points_xy()?;
        Ok(self.detect_points(&points))
    }

    pub fn detect_points(&self, points: &[Point2<f32>]) -> Vec<Landmark> {
        let clusters = group_points(points, &self.config.grouping);
        let cones = filter_landmarks(&clusters, self.config.cones_range_cutoff);

        tracing::debug!(
            "{} returns -> {} clusters -> {} cones in range",
            points.len(),
            clusters.len(),
            cones.len()
        );

        cones
    }
}
