#![warn(clippy::all, rust_2018_idioms)]

pub mod camera;
pub mod config;
mod driver;

pub use driver::{Driver, RunSummary, StepOutcome, StopReason};
