use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, ensure};
use common::{
    client::SimulatorClient,
    robot::{CarControls, Pose},
    sensor::{GpsReading, ImageRequest, ImageResponse, ImageType, LidarReading},
};
use nalgebra::{Point2, Vector2};
use serde::Deserialize;

use scene::{
    cone::{Cone, DEFAULT_CONE_RADIUS},
    ray::{LineSegment, Scene},
    track::circle_track,
};
use simulator_loop::SimulatorThreadHandle;

pub mod scene;
mod sim;

pub use sim::{SimParameters, Simulator};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub lidar_name: String,
    pub camera_name: String,
    pub vehicle_name: String,

    pub parameters: SimParameters,
    pub scene: Vec<SceneObject>,
    pub start_pose: Pose,
    pub timing: Timing,

    /// Seed of the lidar noise generator.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            lidar_name: "Lidar".to_owned(),
            camera_name: "examplecam".to_owned(),
            vehicle_name: "FSCar".to_owned(),
            parameters: SimParameters::default(),
            scene: vec![SceneObject::CircleTrack {
                radius: 20.0,
                half_width: 1.5,
                spacing: 2.5,
            }],
            start_pose: Pose::default(),
            timing: Timing::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum SceneObject {
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Cone {
        x: f32,
        y: f32,
        #[serde(default)]
        radius: Option<f32>,
    },
    CircleTrack {
        radius: f32,
        half_width: f32,
        spacing: f32,
    },
}

/// How simulated time relates to the client calls.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum Timing {
    /// Simulated time advances `dt` seconds on every lidar request, whatever the wall clock does.
    Lockstep { dt: f32 },

    /// A background thread advances the simulation in fixed `dt` steps to keep up with the wall clock.
    RealTime { dt: f32 },
}

impl Default for Timing {
    fn default() -> Self {
        Timing::Lockstep { dt: 0.05 }
    }
}

impl Timing {
    pub fn dt(&self) -> f32 {
        match *self {
            Timing::Lockstep { dt } | Timing::RealTime { dt } => dt,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parameters.validate()?;
        ensure!(
            self.timing.dt() > 0.0,
            "Simulation time step must be positive, got {}",
            self.timing.dt()
        );
        for o in &self.scene {
            if let SceneObject::CircleTrack {
                radius,
                half_width,
                spacing,
            } = *o
            {
                ensure!(
                    spacing > 0.0 && half_width > 0.0 && radius > half_width,
                    "Invalid circle track (radius {radius}, half_width {half_width}, spacing {spacing})"
                );
            }
        }
        Ok(())
    }

    pub fn build_scene(&self) -> Scene {
        let mut scene = Scene::new();

        for o in &self.scene {
            match *o {
                SceneObject::Line { x1, y1, x2, y2 } => {
                    scene.add(Box::new(LineSegment::new(x1, y1, x2, y2)));
                }
                SceneObject::Rectangle {
                    x,
                    y,
                    width,
                    height,
                } => {
                    scene.add_rect(Point2::new(x, y), Vector2::new(width, height));
                }
                SceneObject::Cone { x, y, radius } => {
                    scene.add_cone(Cone::new(x, y, radius.unwrap_or(DEFAULT_CONE_RADIUS)));
                }
                SceneObject::CircleTrack {
                    radius,
                    half_width,
                    spacing,
                } => {
                    for cone in circle_track(radius, half_width, spacing) {
                        scene.add_cone(cone);
                    }
                }
            }
        }

        scene
    }
}

/// A simulator living in the same process, reachable through the same request/response
/// calls as a remote one.
pub struct LocalSimulator {
    simulator: Arc<Mutex<Simulator>>,
    config: SimulatorConfig,
    api_control: bool,
    handle: Option<SimulatorThreadHandle>,
}

impl LocalSimulator {
    pub fn new(config: SimulatorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let scene = config.build_scene();
        tracing::info!(
            "Scene with {} cones, timing {:?}",
            scene.cones().len(),
            config.timing
        );

        let simulator = Arc::new(Mutex::new(Simulator::new(
            scene,
            config.parameters,
            config.start_pose,
            config.seed,
        )?));

        let handle = match config.timing {
            Timing::Lockstep { .. } => None,
            Timing::RealTime { dt } => Some(SimulatorThreadHandle::new(simulator.clone(), dt)),
        };

        Ok(Self {
            simulator,
            config,
            api_control: false,
            handle,
        })
    }

    pub fn pose(&self) -> anyhow::Result<Pose> {
        Ok(self.lock()?.pose())
    }

    pub fn time(&self) -> anyhow::Result<f64> {
        Ok(self.lock()?.time())
    }

    /// Stops the background thread, if any. Called on drop as well.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        match self.handle.take() {
            Some(h) => h.stop(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Simulator>> {
        self.simulator
            .lock()
            .map_err(|_| anyhow!("Simulator state poisoned by a panicking thread"))
    }

    fn check_vehicle(&self, vehicle_name: &str) -> anyhow::Result<()> {
        ensure!(
            vehicle_name == self.config.vehicle_name,
            "Unknown vehicle '{vehicle_name}'"
        );
        Ok(())
    }
}

impl Drop for LocalSimulator {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Simulator thread did not stop cleanly: {e}");
        }
    }
}

impl SimulatorClient for LocalSimulator {
    fn confirm_connection(&mut self) -> anyhow::Result<()> {
        if self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            bail!("Simulator thread is no longer running");
        }
        tracing::info!("Connected to local simulator");
        Ok(())
    }

    fn enable_api_control(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.api_control = enabled;
        if !enabled {
            self.lock()?.set_controls(CarControls::default());
        }
        tracing::debug!(enabled, "API control");
        Ok(())
    }

    fn lidar_data(&mut self, lidar_name: &str) -> anyhow::Result<LidarReading> {
        ensure!(
            lidar_name == self.config.lidar_name,
            "Unknown lidar '{lidar_name}'"
        );

        let timing = self.config.timing;
        let mut sim = self.lock()?;
        if let Timing::Lockstep { dt } = timing {
            sim.tick(dt);
        }
        Ok(sim.lidar_scan())
    }

    fn gps_data(&mut self) -> anyhow::Result<GpsReading> {
        Ok(self.lock()?.gps())
    }

    fn sim_get_images(
        &mut self,
        requests: &[ImageRequest],
        vehicle_name: &str,
    ) -> anyhow::Result<Vec<ImageResponse>> {
        self.check_vehicle(vehicle_name)?;

        let sim = self.lock()?;
        requests
            .iter()
            .map(|r| {
                ensure!(
                    r.camera_name == self.config.camera_name,
                    "Unknown camera '{}'",
                    r.camera_name
                );
                ensure!(
                    r.image_type == ImageType::Scene && !r.pixels_as_float,
                    "Only 8-bit scene images are supported"
                );
                Ok(sim.render_camera(&r.camera_name))
            })
            .collect()
    }

    fn set_car_controls(
        &mut self,
        controls: &CarControls,
        vehicle_name: &str,
    ) -> anyhow::Result<()> {
        self.check_vehicle(vehicle_name)?;
        ensure!(
            self.api_control,
            "API control is not enabled for '{vehicle_name}'"
        );
        self.lock()?.set_controls(*controls);
        Ok(())
    }
}

mod simulator_loop {
    // The simulator runs on its own thread with a fixed time step while the client calls
    // only lock it to read sensors and write controls.

    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    };

    use anyhow::anyhow;

    use crate::Simulator;

    pub struct SimulatorThreadHandle {
        handle: JoinHandle<()>,
        running: Arc<AtomicBool>,
    }

    impl SimulatorThreadHandle {
        pub fn new(sim: Arc<Mutex<Simulator>>, dt: f32) -> Self {
            let running = Arc::new(AtomicBool::new(true));

            let handle = thread::spawn({
                let running = running.clone();
                move || Self::thread(running, sim, dt as f64)
            });

            SimulatorThreadHandle { handle, running }
        }

        fn thread(running: Arc<AtomicBool>, sim: Arc<Mutex<Simulator>>, dt: f64) {
            tracing::info!("[SimulatorThread] Started");

            // loop taken from : https://www.gafferongames.com/post/fix_your_timestep/
            let mut current_time = Instant::now();
            let mut accumulator = 0.0;

            while running.load(Ordering::Relaxed) {
                let new_time = Instant::now();
                let frame_time = new_time - current_time;
                current_time = new_time;

                accumulator += frame_time.as_secs_f64();

                while accumulator >= dt {
                    match sim.lock() {
                        Ok(mut s) => s.tick(dt as f32),
                        Err(_) => {
                            tracing::error!("[SimulatorThread] Simulator state poisoned");
                            return;
                        }
                    }
                    accumulator -= dt;
                }

                thread::sleep(Duration::from_secs_f64(dt));
            }

            tracing::info!("[SimulatorThread] Ended");
        }

        pub fn is_finished(&self) -> bool {
            self.handle.is_finished()
        }

        pub fn stop(self) -> anyhow::Result<()> {
            self.running.store(false, Ordering::Relaxed);
            self.handle
                .join()
                .map_err(|_| anyhow!("Simulator thread panicked"))
        }
    }
}
