//! jobcast CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "jobcast")]
#[command(about = "Delayed, prioritized job scheduler CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "JOBCAST_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    Submit {
        /// Job type, e.g. send_email
        job_type: String,
        /// JSON payload handed to the task executor
        #[arg(long, default_value = "{}")]
        payload: String,
        /// high, medium or low
        #[arg(long, default_value = "medium")]
        priority: String,
        /// RFC 3339 time to run at; defaults to now
        #[arg(long)]
        run_at: Option<String>,
    },
    /// Show the status of a job
    Status {
        /// Job ID
        id: String,
    },
    /// Show the full job record
    Show {
        /// Job ID
        id: String,
    },
    /// Validate a system configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "jobcast.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            job_type,
            payload,
            priority,
            run_at,
        } => {
            commands::jobs::submit(&cli.api_url, &job_type, &payload, &priority, run_at).await?;
        }
        Commands::Status { id } => {
            commands::jobs::status(&cli.api_url, &id).await?;
        }
        Commands::Show { id } => {
            commands::jobs::show(&cli.api_url, &id).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
