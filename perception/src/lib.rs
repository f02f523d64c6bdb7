mod detector;
mod grouping;
mod landmark;
mod tracking;

pub use detector::{ConeDetector, PerceptionConfig};
pub use grouping::{group_points, Cluster, GroupingConfig, GroupingMode};
pub use landmark::filter_landmarks;
pub use tracking::{LandmarkTracker, Track, TrackerConfig};
