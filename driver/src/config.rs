use std::{fs, path::Path};

use anyhow::{anyhow, ensure, Context};
use control::ControlConfig;
use perception::{PerceptionConfig, TrackerConfig};
use serde::Deserialize;
use simulator::SimulatorConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub perception: PerceptionConfig,
    pub control: ControlConfig,
    pub tracker: TrackerConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lidar_name: String,
    pub camera_name: String,
    pub vehicle_name: String,

    /// Stop after this many iterations. Runs until interrupted when unset.
    pub max_iterations: Option<u64>,

    /// Log the loop timing every this many iterations.
    pub stats_interval: u64,

    /// Minimum wall time (seconds) of one iteration, the loop sleeps for whatever is left.
    /// 0 runs as fast as the client answers.
    pub loop_period: f32,

    /// Fetch and show a camera frame at the start of every iteration.
    pub camera: bool,

    /// Keep landmark identities across sweeps and log them.
    pub track_landmarks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lidar_name: "Lidar".to_owned(),
            camera_name: "examplecam".to_owned(),
            vehicle_name: "FSCar".to_owned(),
            max_iterations: None,
            stats_interval: 100,
            loop_period: 0.05,
            camera: true,
            track_landmarks: false,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;

        Self::from_contents(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_contents(contents: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(contents).map_err(|e| anyhow!(e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.settings.stats_interval > 0,
            "settings.stats_interval must be positive"
        );
        ensure!(
            self.settings.loop_period.is_finite() && self.settings.loop_period >= 0.0,
            "settings.loop_period must be a non-negative number of seconds, got {}",
            self.settings.loop_period
        );
        self.perception.validate().context("perception")?;
        self.control.validate().context("control")?;
        self.simulator.validate().context("simulator")?;
        self.tracker.validate().context("tracker")?;
        Ok(())
    }
}
