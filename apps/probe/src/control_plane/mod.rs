//! Everything that talks to the control plane: fetching the batch of due
//! monitors and posting results back.

pub mod client;
pub mod reporter;

pub use client::{ControlPlane, HttpControlPlane};
pub use reporter::create_reporting_client;
