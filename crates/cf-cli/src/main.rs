//! Caseflow CLI
//!
//! Command-line interface for the Caseflow DFIR case management service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use cf_core::db::{create_pool, run_migrations, seed_defaults};
use commands::{run_server, ServeConfig};

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(version)]
#[command(about = "DFIR case management: alert triage, escalation and case tasks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Database URL
        #[arg(short, long, default_value = "sqlite://caseflow.db?mode=rwc", env = "CASEFLOW_DATABASE_URL")]
        database: String,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,
    },

    /// Apply the database schema
    Migrate {
        /// Database URL
        #[arg(short, long, default_value = "sqlite://caseflow.db?mode=rwc", env = "CASEFLOW_DATABASE_URL")]
        database: String,
    },

    /// Seed reference data (statuses, severities, system user)
    Seed {
        /// Database URL
        #[arg(short, long, default_value = "sqlite://caseflow.db?mode=rwc", env = "CASEFLOW_DATABASE_URL")]
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    cf_observability::init_logging_with_config(cf_observability::LoggingConfig {
        level: log_level,
        ..Default::default()
    });

    match cli.command {
        Commands::Serve {
            port,
            host,
            database,
            no_swagger,
        } => {
            run_server(ServeConfig {
                port,
                host,
                database_url: database,
                enable_swagger: !no_swagger,
            })
            .await
        }
        Commands::Migrate { database } => cmd_migrate(&database).await,
        Commands::Seed { database } => cmd_seed(&database).await,
    }
}

async fn cmd_migrate(database_url: &str) -> Result<()> {
    println!("{} Applying schema to {}", "[migrate]".cyan(), database_url);

    let pool = create_pool(database_url)
        .await
        .context("Failed to create database connection pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    println!("{} Schema up to date", "✓".green());
    Ok(())
}

async fn cmd_seed(database_url: &str) -> Result<()> {
    println!("{} Seeding reference data in {}", "[seed]".cyan(), database_url);

    let pool = create_pool(database_url)
        .await
        .context("Failed to create database connection pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    seed_defaults(&pool)
        .await
        .context("Failed to seed reference data")?;

    println!("{} Reference data seeded", "✓".green());
    Ok(())
}
