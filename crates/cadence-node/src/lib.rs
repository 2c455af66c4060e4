//! cadence-node - Health monitor driving a SubMaster against synthetic
//! publishers.
//!
//! # Configuration
//!
//! The node requires a YAML configuration file specifying:
//! - The monitored services and their check exemptions (`submaster`)
//! - The update tick, per-update timeout and report interval
//! - An optional run duration
//! - Synthetic publishers with rate scaling, validity and stop time
//!
//! See the `config/example.yaml` file for a complete example.
//!
//! Setting the `SIMULATION` environment variable to a non-zero integer
//! forces the simulation override regardless of the file.

pub mod config;
pub mod node;

pub use config::{Config, PublisherConfig};
pub use node::{HealthReport, MonitorNode, ServiceHealth};
