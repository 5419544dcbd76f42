//! Serve command - starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;

use cf_api::{ApiServer, ApiServerConfig, AppState};
use cf_core::db::{create_pool, run_migrations, seed_defaults};
use cf_core::events::EventBus;

/// Server configuration from CLI arguments.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Port to listen on.
    pub port: u16,
    /// Hostname to bind to.
    pub host: String,
    /// Database URL.
    pub database_url: String,
    /// Enable Swagger UI.
    pub enable_swagger: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            database_url: "sqlite://caseflow.db?mode=rwc".to_string(),
            enable_swagger: true,
        }
    }
}

/// Runs the API server.
pub async fn run_server(config: ServeConfig) -> Result<()> {
    println!("{} Starting Caseflow API Server...", "[server]".cyan());

    println!("  {} Database: {}", "→".green(), config.database_url);
    let db_pool = create_pool(&config.database_url)
        .await
        .context("Failed to create database connection pool")?;

    println!("  {} Running migrations...", "→".green());
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    seed_defaults(&db_pool)
        .await
        .context("Failed to seed reference data")?;

    println!("  {} Database ready", "✓".green());

    let event_bus = EventBus::new(1024);
    let state = AppState::new(db_pool, event_bus);

    let bind_address: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    let server_config = ApiServerConfig {
        bind_address,
        enable_swagger: config.enable_swagger,
        shutdown_timeout: Duration::from_secs(30),
    };

    println!();
    println!("{}", "Caseflow API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!("  {} {}", "Database:".cyan(), config.database_url);

    if config.enable_swagger {
        println!(
            "  {} http://{}/swagger-ui",
            "Swagger UI:".cyan(),
            bind_address
        );
    }

    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /health                    - Health check");
    println!("  GET  /alerts/filter             - List alerts");
    println!("  POST /alerts/add                - Create alert");
    println!("  GET  /alerts/:id                - Get alert");
    println!("  POST /alerts/escalate/:id       - Escalate alert to a new case");
    println!("  POST /alerts/merge/:id          - Merge alert into a case");
    println!("  GET  /cases/:id/tasks/list      - List case tasks");
    println!("  POST /cases/:id/tasks/add       - Create case task");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    let server = ApiServer::new(state, server_config);
    server.run().await.context("Server error")?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
