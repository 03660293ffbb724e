pub mod config;
pub mod error;
pub mod github;
pub mod host;
pub mod memory;
pub mod throttle;

pub use config::HostConfig;
pub use error::HostError;
pub use github::GitHubHost;
pub use host::{NewRepository, RepositoryHost};
pub use memory::{HostCall, MemoryHost, MemoryHostOptions};
pub use throttle::{Admission, Throttled};
