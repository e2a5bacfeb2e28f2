use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use ozone_telemetry::config::ServerConfig;
use ozone_telemetry::db::{self, services::user_service};
use ozone_telemetry::services::auth_service;
use ozone_telemetry::web;

#[derive(Parser)]
#[command(name = "ozone-telemetry", about = "Ozone-treatment device administration backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default).
    Serve,
    /// Create or reset the admin account.
    SeedAdmin {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match ServerConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let conn = match db::connect(&config.database_url).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = db::setup_schema(&conn).await {
        error!("Failed to set up database schema: {e}");
        std::process::exit(1);
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::SeedAdmin { username, password } => {
            let password_hash = match auth_service::hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!("Failed to hash password: {e}");
                    std::process::exit(1);
                }
            };
            match user_service::seed_admin(&conn, &username, &password_hash).await {
                Ok(account) => info!(username = %account.username, "admin account ready"),
                Err(e) => {
                    error!("Failed to seed admin account: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Serve => {
            let app = web::create_axum_router(conn, config.clone());

            let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind to {}: {e}", config.listen_addr);
                    std::process::exit(1);
                }
            };
            info!("HTTP server listening on {}", config.listen_addr);

            let server_handle = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("HTTP server error: {e}");
                }
            });

            tokio::select! {
                _ = server_handle => {
                    error!("HTTP server terminated");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
        }
    }
}
