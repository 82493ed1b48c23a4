//! CLI command implementations.

pub mod jobs;

use anyhow::Result;
use jobcast_config::ExecutorConfig;

pub fn validate(path: &str) -> Result<()> {
    match jobcast_config::load_system_config(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  database:         {}", config.database.url);
            println!("  max attempts:     {}", config.scheduler.max_attempts);
            match &config.executor {
                ExecutorConfig::Http { endpoint, .. } => println!("  executor:         http {}", endpoint),
                ExecutorConfig::Log => println!("  executor:         log"),
            }
            println!("  listening on:     {}", config.server.bind);
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
