use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use common::{
    client::SimulatorClient,
    robot::{CarControls, Landmark},
    sensor::ImageRequest,
    PerfStats,
};
use control::ControlLaw;
use perception::{ConeDetector, LandmarkTracker};

use crate::{
    camera::{CameraFrame, FrameSink},
    config::{Config, Settings},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// A command was computed and sent.
    Commanded(CarControls),

    /// No cone in range, nothing was sent.
    NoLandmarks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    IterationLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub commanded: u64,
    pub skipped: u64,
    pub stop_reason: StopReason,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} iterations ({} commanded, {} without cones), stopped by {:?}",
            self.iterations, self.commanded, self.skipped, self.stop_reason
        )
    }
}

/// Owns the simulator connection and runs sense -> perceive -> control -> act, one sweep
/// per iteration. Any client error ends the run.
pub struct Driver<C: SimulatorClient> {
    client: C,
    settings: Settings,
    detector: ConeDetector,
    control: ControlLaw,
    tracker: Option<LandmarkTracker>,
    sink: Box<dyn FrameSink>,
    image_request: ImageRequest,
    loop_period: Duration,
    stats: PerfStats,
}

impl<C: SimulatorClient> Driver<C> {
    pub fn new(client: C, config: &Config, sink: Box<dyn FrameSink>) -> Self {
        Self {
            client,
            settings: config.settings.clone(),
            detector: ConeDetector::new(config.perception),
            control: ControlLaw::new(config.control),
            tracker: config
                .settings
                .track_landmarks
                .then(|| LandmarkTracker::new(config.tracker)),
            sink,
            image_request: ImageRequest::scene(&config.settings.camera_name),
            loop_period: Duration::from_secs_f32(config.settings.loop_period.max(0.0)),
            stats: PerfStats::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    pub fn stats(&self) -> &PerfStats {
        &self.stats
    }

    pub fn tracker(&self) -> Option<&LandmarkTracker> {
        self.tracker.as_ref()
    }

    /// Fetches one camera frame and hands it to the frame sink.
    pub fn show_camera(&mut self) -> anyhow::Result<()> {
        let response = self
            .client
            .sim_get_images(
                std::slice::from_ref(&self.image_request),
                &self.settings.vehicle_name,
            )?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Simulator returned no image"))?;

        let frame = CameraFrame::try_from(response)?;
        self.sink.show(&frame)
    }

    /// The cones currently in range, in the vehicle frame.
    pub fn perceive(&mut self) -> anyhow::Result<Vec<Landmark>> {
        let reading = self.client.lidar_data(&self.settings.lidar_name)?;
        let cones = self.detector.detect(&reading)?;

        if let Some(tracker) = self.tracker.as_mut() {
            let tracks = tracker.update(&cones);
            let confirmed = tracks.iter().filter(|t| t.hits > 1).count();
            tracing::debug!("{} tracks, {confirmed} seen more than once", tracks.len());
        }

        Ok(cones)
    }

    /// Lidar to command. The velocity is only requested when there is something to steer by.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn step(&mut self) -> anyhow::Result<StepOutcome> {
        let cones = self.perceive()?;
        if cones.is_empty() {
            tracing::debug!("No cones in range, skipping");
            return Ok(StepOutcome::NoLandmarks);
        }

        let velocity = self.client.gps_data()?.planar_velocity();

        let Some(controls) = self.control.command(&cones, velocity) else {
            return Ok(StepOutcome::NoLandmarks);
        };

        self.client
            .set_car_controls(&controls, &self.settings.vehicle_name)?;

        Ok(StepOutcome::Commanded(controls))
    }

    /// Iterates until `quit` is raised or the iteration limit is hit. The quit flag is
    /// checked once per iteration, after the camera frame is shown. Each iteration takes
    /// at least `loop_period`.
    pub fn run(&mut self, quit: &AtomicBool) -> anyhow::Result<RunSummary> {
        let mut iterations = 0;
        let mut commanded = 0;
        let mut skipped = 0;

        let stop_reason = loop {
            if self
                .settings
                .max_iterations
                .is_some_and(|max| iterations >= max)
            {
                break StopReason::IterationLimit;
            }

            let start = Instant::now();

            if self.settings.camera {
                self.show_camera()?;
            }

            if quit.load(Ordering::Relaxed) {
                break StopReason::Quit;
            }

            match self.step()? {
                StepOutcome::Commanded(_) => commanded += 1,
                StepOutcome::NoLandmarks => skipped += 1,
            }
            iterations += 1;

            let elapsed = start.elapsed();
            self.stats.update(elapsed);
            if iterations % self.settings.stats_interval == 0 {
                tracing::info!("Iteration {iterations}: {}", self.stats);
            }

            if let Some(rest) = self.loop_period.checked_sub(elapsed) {
                thread::sleep(rest);
            }
        };

        let summary = RunSummary {
            iterations,
            commanded,
            skipped,
            stop_reason,
        };
        tracing::info!("Loop ended: {summary}, timing {}", self.stats);

        Ok(summary)
    }

    /// `run`, then hands the vehicle back. When the loop failed its error is the one
    /// returned and a failure to release control is only logged.
    pub fn run_and_release(&mut self, quit: &AtomicBool) -> anyhow::Result<RunSummary> {
        let result = self.run(quit);
        let released = self.client.enable_api_control(false);

        match (result, released) {
            (Err(e), Err(release_err)) => {
                tracing::warn!("Could not release API control: {release_err}");
                Err(e)
            }
            (result, released) => {
                released?;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use anyhow::bail;
    use approx::assert_relative_eq;
    use common::sensor::{GpsReading, ImageResponse, LidarReading};
    use nalgebra::Vector3;

    use super::*;
    use crate::camera::TracingSink;

    /// Replays canned lidar sweeps and records every call.
    #[derive(Default)]
    struct ScriptedClient {
        scans: VecDeque<anyhow::Result<LidarReading>>,
        velocity: Vector3<f32>,
        sent: Vec<CarControls>,
        calls: Vec<&'static str>,
        fail_release: bool,
    }

    impl ScriptedClient {
        fn with_scans(scans: Vec<anyhow::Result<LidarReading>>) -> Self {
            Self {
                scans: scans.into(),
                ..Default::default()
            }
        }
    }

    impl SimulatorClient for ScriptedClient {
        fn confirm_connection(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn enable_api_control(&mut self, enabled: bool) -> anyhow::Result<()> {
            if !enabled {
                self.calls.push("release");
                if self.fail_release {
                    bail!("simulator gone");
                }
            }
            Ok(())
        }

        fn lidar_data(&mut self, lidar_name: &str) -> anyhow::Result<LidarReading> {
            assert_eq!(lidar_name, "Lidar");
            self.calls.push("lidar");
            self.scans.pop_front().unwrap_or_else(|| Ok(LidarReading::default()))
        }

        fn gps_data(&mut self) -> anyhow::Result<GpsReading> {
            self.calls.push("gps");
            Ok(GpsReading {
                position: Vector3::zeros(),
                velocity: self.velocity,
            })
        }

        fn sim_get_images(
            &mut self,
            requests: &[ImageRequest],
            vehicle_name: &str,
        ) -> anyhow::Result<Vec<ImageResponse>> {
            assert_eq!(vehicle_name, "FSCar");
            self.calls.push("images");
            Ok(requests
                .iter()
                .map(|r| ImageResponse {
                    camera_name: r.camera_name.clone(),
                    image_data_uint8: vec![128; 4 * 3],
                    height: 2,
                    width: 2,
                })
                .collect())
        }

        fn set_car_controls(
            &mut self,
            controls: &CarControls,
            _vehicle_name: &str,
        ) -> anyhow::Result<()> {
            self.calls.push("controls");
            self.sent.push(*controls);
            Ok(())
        }
    }

    /// Two returns 5cm apart around `(x, y)`.
    fn cone_scan(x: f32, y: f32) -> anyhow::Result<LidarReading> {
        Ok(LidarReading::new(vec![x, y, 0.0, x + 0.05, y, 0.0]))
    }

    fn driver(client: ScriptedClient, config: &Config) -> Driver<ScriptedClient> {
        Driver::new(client, config, Box::new(TracingSink::default()))
    }

    #[test]
    fn commands_from_cones_and_speed() {
        let mut client = ScriptedClient::with_scans(vec![cone_scan(2.0, 1.0)]);
        client.velocity = Vector3::new(2.0, 0.0, 0.3);
        let mut driver = driver(client, &Config::default());

        let outcome = driver.step().unwrap();

        let StepOutcome::Commanded(controls) = outcome else {
            panic!("expected a command, got {outcome:?}");
        };
        assert_eq!(controls.steering, -0.3);
        assert_relative_eq!(controls.throttle, 0.1, epsilon = 1e-6);
        assert_eq!(controls.brake, 0.0);
        assert_eq!(driver.client().sent, vec![controls]);
    }

    #[test]
    fn no_cones_skips_without_commanding() {
        let client = ScriptedClient::with_scans(vec![cone_scan(9.0, 0.0)]);
        let mut driver = driver(client, &Config::default());

        assert_eq!(driver.step().unwrap(), StepOutcome::NoLandmarks);
        assert_eq!(driver.client().calls, vec!["lidar"]);
        assert!(driver.client().sent.is_empty());
    }

    #[test]
    fn iteration_order() {
        let mut config = Config::default();
        config.settings.max_iterations = Some(1);
        let client = ScriptedClient::with_scans(vec![cone_scan(2.0, -1.0)]);
        let mut driver = driver(client, &config);

        driver.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(
            driver.client().calls,
            vec!["images", "lidar", "gps", "controls"]
        );
    }

    #[test]
    fn quit_is_checked_after_the_camera() {
        let client = ScriptedClient::with_scans(vec![cone_scan(2.0, 1.0)]);
        let mut driver = driver(client, &Config::default());

        let summary = driver.run(&AtomicBool::new(true)).unwrap();

        assert_eq!(summary.stop_reason, StopReason::Quit);
        assert_eq!(summary.iterations, 0);
        assert_eq!(driver.client().calls, vec!["images"]);
    }

    #[test]
    fn counts_commanded_and_skipped() {
        let mut config = Config::default();
        config.settings.max_iterations = Some(4);
        config.settings.camera = false;
        let client = ScriptedClient::with_scans(vec![
            cone_scan(2.0, 1.0),
            Ok(LidarReading::default()),
            cone_scan(3.0, -1.0),
        ]);
        let mut driver = driver(client, &config);

        let summary = driver.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(
            summary,
            RunSummary {
                iterations: 4,
                commanded: 2,
                skipped: 2,
                stop_reason: StopReason::IterationLimit,
            }
        );
        assert_eq!(driver.stats().sample_count(), 4);
        assert_eq!(
            driver.client().sent.iter().map(|c| c.steering).collect::<Vec<_>>(),
            vec![-0.3, 0.3]
        );
    }

    #[test]
    fn loop_is_paced() {
        let mut config = Config::default();
        config.settings.max_iterations = Some(5);
        config.settings.loop_period = 0.02;
        let client = ScriptedClient::with_scans((0..5).map(|_| cone_scan(2.0, 1.0)).collect());
        let mut driver = driver(client, &config);

        let start = Instant::now();
        let summary = driver.run(&AtomicBool::new(false)).unwrap();
        let elapsed = start.elapsed().as_secs_f64();

        assert_eq!(summary.iterations, 5);
        assert!(elapsed >= 5.0 * 0.02, "5 iterations took only {elapsed}s");
        assert!(summary.iterations as f64 / elapsed <= 1.0 / 0.02);
        // sleeping is not counted as loop work
        assert!(driver.stats().mean() < 20.0);
    }

    #[test]
    fn client_errors_abort_the_run() {
        let client = ScriptedClient::with_scans(vec![
            cone_scan(2.0, 1.0),
            Err(anyhow!("connection reset")),
            cone_scan(2.0, 1.0),
        ]);
        let mut driver = driver(client, &Config::default());

        let err = driver.run(&AtomicBool::new(false)).unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(driver.client().sent.len(), 1);
    }

    #[test]
    fn loop_error_wins_over_release_error() {
        let mut client = ScriptedClient::with_scans(vec![Err(anyhow!("connection reset"))]);
        client.fail_release = true;
        let mut driver = driver(client, &Config::default());

        let err = driver.run_and_release(&AtomicBool::new(false)).unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(driver.client().calls.last(), Some(&"release"));
    }

    #[test]
    fn release_error_after_clean_run_is_reported() {
        let mut config = Config::default();
        config.settings.max_iterations = Some(1);
        let mut client = ScriptedClient::with_scans(vec![cone_scan(2.0, 1.0)]);
        client.fail_release = true;
        let mut failing = driver(client, &config);

        let err = failing.run_and_release(&AtomicBool::new(false)).unwrap_err();
        assert!(err.to_string().contains("simulator gone"));

        let mut clean = driver(ScriptedClient::default(), &config);
        let summary = clean.run_and_release(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.iterations, 1);
        assert_eq!(clean.client().calls.last(), Some(&"release"));
    }

    #[test]
    fn malformed_sweep_aborts_the_run() {
        let client =
            ScriptedClient::with_scans(vec![Ok(LidarReading::new(vec![1.0, 2.0, 0.0, 3.0]))]);
        let mut driver = driver(client, &Config::default());

        assert!(driver.run(&AtomicBool::new(false)).is_err());
    }

    #[test]
    fn bad_camera_frame_aborts_the_run() {
        struct BrokenCamera(ScriptedClient);

        impl SimulatorClient for BrokenCamera {
            fn confirm_connection(&mut self) -> anyhow::Result<()> {
                Ok(())
            }
            fn enable_api_control(&mut self, enabled: bool) -> anyhow::Result<()> {
                self.0.enable_api_control(enabled)
            }
            fn lidar_data(&mut self, lidar_name: &str) -> anyhow::Result<LidarReading> {
                self.0.lidar_data(lidar_name)
            }
            fn gps_data(&mut self) -> anyhow::Result<GpsReading> {
                self.0.gps_data()
            }
            fn sim_get_images(
                &mut self,
                _requests: &[ImageRequest],
                _vehicle_name: &str,
            ) -> anyhow::Result<Vec<ImageResponse>> {
                bail!("no camera")
            }
            fn set_car_controls(
                &mut self,
                controls: &CarControls,
                vehicle_name: &str,
            ) -> anyhow::Result<()> {
                self.0.set_car_controls(controls, vehicle_name)
            }
        }

        let mut driver = Driver::new(
            BrokenCamera(ScriptedClient::default()),
            &Config::default(),
            Box::new(TracingSink::default()),
        );

        assert!(driver.run(&AtomicBool::new(false)).is_err());
        assert!(driver.client().0.calls.is_empty());
    }

    #[test]
    fn tracker_follows_cones_when_enabled() {
        let mut config = Config::default();
        config.settings.track_landmarks = true;
        let client =
            ScriptedClient::with_scans(vec![cone_scan(2.0, 1.0), cone_scan(1.9, 1.0)]);
        let mut driver = driver(client, &config);

        driver.step().unwrap();
        driver.step().unwrap();

        let tracks = driver.tracker().unwrap().tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].hits, 2);
    }
}
