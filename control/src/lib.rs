use anyhow::ensure;
use common::robot::{CarControls, Landmark};
use nalgebra::Vector2;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Throttle applied when standing still, decays linearly to zero at `target_speed`.
    pub max_throttle: f32,

    /// Speed (meters/second) at which the throttle reaches zero.
    pub target_speed: f32,

    /// Magnitude of every steering command.
    pub max_steering: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_throttle: 0.2,
            target_speed: 4.0,
            max_steering: 0.3,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.target_speed > 0.0,
            "target_speed must be positive, got {}",
            self.target_speed
        );
        ensure!(
            self.max_throttle >= 0.0,
            "max_throttle must not be negative, got {}",
            self.max_throttle
        );
        ensure!(
            self.max_steering >= 0.0,
            "max_steering must not be negative, got {}",
            self.max_steering
        );
        Ok(())
    }
}

/// Memoryless reactive controller.
///
/// Steering is bang-bang: it always saturates, away from the side where the cones are on
/// average. Throttle falls off linearly with speed and never brakes.
#[derive(Debug, Clone)]
pub struct ControlLaw {
    config: ControlConfig,
}

impl ControlLaw {
    pub fn new(config: ControlConfig) -> Self {
        Self { config }
    }

    /// `None` when there are no cones to steer by.
    pub fn steering(&self, cones: &[Landmark]) -> Option<f32> {
        if cones.is_empty() {
            return None;
        }

        let average_y = cones.iter().map(|c| c.y).sum::<f32>() / cones.len() as f32;

        if average_y > 0.0 {
            Some(-self.config.max_steering)
        } else {
            Some(self.config.max_steering)
        }
    }

    /// Throttle for the given planar velocity.
    pub fn throttle(&self, velocity: Vector2<f32>) -> f32 {
        let speed = velocity.norm();
        self.config.max_throttle * (1.0 - speed / self.config.target_speed).max(0.0)
    }

    /// Full actuator command, or `None` when there are no cones to steer by.
    pub fn command(&self, cones: &[Landmark], velocity: Vector2<f32>) -> Option<CarControls> {
        let steering = self.steering(cones)?;
        let throttle = self.throttle(velocity);

        tracing::trace!(steering, throttle, "control output");

        Some(CarControls {
            steering,
            throttle,
            brake: 0.0,
        })
    }
}
