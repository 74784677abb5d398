//! haarc - hash-addressed autonomous routing core
//!
//! The library crates do the work; this crate holds the combined config file,
//! the pipeline that wires them together and the simulated collaborators the
//! `haarc` binary runs against.

pub mod config;
pub mod pipeline;
pub mod sim;

pub use config::{HaarcConfig, SimulationConfig};
pub use pipeline::{simulate, Pipeline, RunReport, Services};
