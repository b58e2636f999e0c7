//! RepairHub Server: configuration loading, logging setup and the
//! [`Backend`] facade that gates and dispatches every operation.

pub mod backend;
pub mod config;

pub use backend::{Backend, SurrealBackend, SurrealStores};
pub use config::{BootstrapAdmin, ConfigError, LogConfig, ServerConfig};
