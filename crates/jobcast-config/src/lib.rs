//! KDL configuration parsing for the jobcast scheduler.
//!
//! This crate handles parsing of the system configuration file
//! (`jobcast.kdl`): database, scheduler, executor, hub and server sections.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DatabaseConfig, ExecutorConfig, HubConfig, SchedulerConfig, ServerConfig, SystemConfig,
    load_system_config, parse_system_config,
};
