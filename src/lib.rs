//! Parameter-sweep harness for energy-system optimization models.
//!
//! Generates perturbed model cases (sensitivity and Monte Carlo), dispatches
//! build/solve/extract runs across a worker pool, and aggregates the
//! per-case results into long-format tables.

pub mod aggregate;
pub mod cases;
pub mod config;
pub mod model;
pub mod results;
/// Worker-pool dispatch of build/solve/extract runs.
pub mod sweep;
pub mod toolchain;
