#![warn(clippy::all, rust_2018_idioms)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use common::client::SimulatorClient;
use driver::{camera::TracingSink, config::Config, Driver};
use simulator::LocalSimulator;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Log to stdout (if you run with `RUST_LOG=debug`).
    tracing_subscriber::fmt::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // load configuration file
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let quit = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let quit = quit.clone();
        move || quit.store(true, Ordering::Relaxed)
    })?;

    let mut client = LocalSimulator::new(config.simulator.clone())?;
    client.confirm_connection()?;
    client.enable_api_control(true)?;

    let mut driver = Driver::new(client, &config, Box::<TracingSink>::default());
    let result = driver.run_and_release(&quit);

    // the loop error, if any, is the one worth reporting
    let stopped = driver.into_client().stop();
    let summary = result?;
    stopped?;
    println!("{summary}");

    Ok(())
}
