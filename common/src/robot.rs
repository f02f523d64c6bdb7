use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// The pose of the vehicle in the 2D plane (world frame).
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The x position of the vehicle
    pub x: f32,

    /// The y position of the vehicle
    pub y: f32,

    /// The heading of the vehicle, measured in radians counter-clockwise from the positive x-axis.
    pub theta: f32,
}

impl Pose {
    /// Transforms a world frame point into the vehicle frame.
    pub fn to_local(&self, world: Point2<f32>) -> Point2<f32> {
        let (s, c) = self.theta.sin_cos();
        let dx = world.x - self.x;
        let dy = world.y - self.y;
        Point2::new(c * dx + s * dy, -s * dx + c * dy)
    }
}

/// A detected cone, represented only by the centroid of the lidar returns that hit it.
///
/// Coordinates are in the vehicle (lidar) frame: x forward, y to the left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance from the vehicle origin.
    pub fn range(&self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl From<Point2<f32>> for Landmark {
    fn from(p: Point2<f32>) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// A command for the vehicle actuators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarControls {
    /// Normalised steering, positive turns the vehicle to the left.
    pub steering: f32,

    /// Normalised throttle in the range [0, 1].
    pub throttle: f32,

    /// Normalised brake in the range [0, 1].
    pub brake: f32,
}
