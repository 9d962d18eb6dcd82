//! Uppe probe worker: fetches due monitors from the control plane, checks
//! them by type and reports the results back.

pub mod config;
pub mod control_plane;
pub mod error;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod routes;

pub use config::Config;
pub use metrics::ProbeMetrics;
