//! Type-specific checkers, one per monitor type family.

mod http;
mod incoming;
mod ip;
mod kubernetes;
mod server;

pub use http::HttpChecker;
pub use incoming::IncomingRequestChecker;
pub use ip::IpChecker;
pub use kubernetes::KubernetesChecker;
pub use server::{AgentlessConfig, Authentication, OpenSsh, RemoteShell, ServerChecker};
