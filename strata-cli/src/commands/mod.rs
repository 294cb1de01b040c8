//! Command handlers
//!
//! Every command opens the ledger database first; commands that execute
//! runs build an engine on top of it.

pub mod edit;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use strata_engine::EngineConfig;
use strata_ledger::{PgPool, db};

#[derive(Subcommand)]
pub enum Commands {
    /// Edit a pipeline definition in the interactive shell
    Edit {
        /// Pipeline name
        pipeline: String,
    },
    /// Run a pipeline (non-promoting)
    Trigger {
        /// Pipeline name
        pipeline: String,
    },
    /// Re-provision a pipeline and promote the result to the new base
    Refresh {
        /// Pipeline name
        pipeline: String,
    },
    /// List committed pipelines
    List,
    /// Show the step run history of a pipeline
    Runs {
        /// Pipeline name
        pipeline: String,
    },
    /// Print a step run's log
    Logs {
        /// Step run ID
        id: Uuid,

        /// First log index to print
        #[arg(long, default_value_t = 0)]
        from: i64,

        /// Keep polling for new lines until the step finishes
        #[arg(long)]
        follow: bool,
    },
}

/// Handle a CLI command
pub async fn handle_command(command: Commands) -> Result<()> {
    let config = EngineConfig::from_env();
    config.validate()?;

    let pool = connect(&config).await?;

    match command {
        Commands::Edit { pipeline } => edit::edit_pipeline(config, pool, &pipeline).await,
        Commands::Trigger { pipeline } => run::trigger(config, pool, &pipeline).await,
        Commands::Refresh { pipeline } => run::refresh(config, pool, &pipeline).await,
        Commands::List => status::list(pool).await,
        Commands::Runs { pipeline } => status::runs(pool, &pipeline).await,
        Commands::Logs { id, from, follow } => status::logs(pool, id, from, follow).await,
    }
}

async fn connect(config: &EngineConfig) -> Result<PgPool> {
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to the ledger database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(pool)
}
