use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use approx::assert_relative_eq;
use common::client::SimulatorClient;
use driver::{camera::TracingSink, config::Config, Driver, StopReason};
use simulator::{LocalSimulator, SceneObject, Timing};

fn run(config: &Config) -> (driver::RunSummary, LocalSimulator) {
    let mut client = LocalSimulator::new(config.simulator.clone()).unwrap();
    client.confirm_connection().unwrap();
    client.enable_api_control(true).unwrap();

    let mut driver = Driver::new(client, config, Box::<TracingSink>::default());
    let summary = driver.run(&AtomicBool::new(false)).unwrap();

    (summary, driver.into_client())
}

#[test]
fn drives_the_default_track() {
    let mut config = Config::default();
    config.settings.max_iterations = Some(200);
    config.settings.loop_period = 0.0;
    config.settings.track_landmarks = true;

    let (summary, mut sim) = run(&config);

    assert_eq!(summary.stop_reason, StopReason::IterationLimit);
    assert_eq!(summary.iterations, 200);
    assert!(summary.commanded > 0);
    assert_eq!(summary.commanded + summary.skipped, 200);

    // lockstep: one time step per sweep
    assert_relative_eq!(sim.time().unwrap(), 200.0 * 0.05, epsilon = 1e-3);

    let speed = sim.gps_data().unwrap().planar_velocity().norm();
    assert!(speed > 0.0 && speed < config.control.target_speed + 0.5);
}

#[test]
fn empty_scene_never_commands() {
    let mut config = Config::default();
    config.settings.max_iterations = Some(20);
    config.settings.loop_period = 0.0;
    config.simulator.scene.clear();

    let (summary, sim) = run(&config);

    assert_eq!(summary.commanded, 0);
    assert_eq!(summary.skipped, 20);
    assert_eq!(sim.pose().unwrap(), config.simulator.start_pose);
}

#[test]
fn single_cone_on_the_left_steers_right() {
    let mut config = Config::default();
    config.settings.max_iterations = Some(1);
    config.simulator.scene = vec![SceneObject::Cone {
        x: 3.0,
        y: 0.8,
        radius: None,
    }];

    let (summary, mut sim) = run(&config);
    assert_eq!(summary.commanded, 1);

    // the command lands after the sweep, so it shows from the next step on
    for _ in 0..10 {
        sim.lidar_data("Lidar").unwrap();
    }
    let pose = sim.pose().unwrap();
    assert!(pose.x > 0.0);
    assert!(pose.theta < 0.0);
}

#[test]
fn example_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/track.yaml");
    let config = Config::from_file(path).unwrap();

    assert_eq!(config.settings.vehicle_name, config.simulator.vehicle_name);
    assert!(!config.simulator.scene.is_empty());
}

#[test]
fn real_time_loop_keeps_pace_with_the_wall_clock() {
    let mut config = Config::default();
    config.settings.loop_period = 0.05;
    config.simulator.timing = Timing::RealTime { dt: 0.02 };

    let mut client = LocalSimulator::new(config.simulator.clone()).unwrap();
    client.enable_api_control(true).unwrap();
    let mut driver = Driver::new(client, &config, Box::<TracingSink>::default());

    let quit = AtomicBool::new(false);
    let start = Instant::now();
    let summary = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(500));
            quit.store(true, Ordering::Relaxed);
        });
        driver.run(&quit).unwrap()
    });
    let wall = start.elapsed().as_secs_f64();

    assert_eq!(summary.stop_reason, StopReason::Quit);
    assert!(summary.iterations >= 1);
    // at most one iteration per period, plus the one in flight when quit was raised
    assert!(
        summary.iterations as f64 <= wall / 0.05 + 1.0,
        "{} iterations in {wall:.2}s",
        summary.iterations
    );

    let sim = driver.into_client();
    assert!(sim.time().unwrap() > 0.0);
}
