mod api;
mod call_cmd;
mod config;
mod status_cmd;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use sudsline_config::{config_dir, config_file_path, load_and_prepare, redact, SudslineConfig};
use sudsline_core::{PhoneNumberValidator, PhoneValidator};
use sudsline_session::CallSessionManager;
use sudsline_store::{record_finished_calls, CallStore};
use sudsline_vendor::VapiConnector;

use api::AppState;
use call_cmd::CallArgs;
use config::Config;

#[derive(Parser)]
#[command(name = "sudsline")]
#[command(about = "Sudsline: outbound assistant calls for the Auto Laundry CRM")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.sudsline/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the operator API server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Place a single call and follow it until it ends
    Call {
        #[arg(long)]
        assistant: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        caller_name: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
    /// Parse a phone number and print the result as JSON
    Validate { number: String },
    /// Show the state of a running server
    Status {
        #[arg(short, long)]
        port: Option<u16>,
        /// Log lines to show
        #[arg(long, default_value_t = 10)]
        logs: usize,
    },
    /// Print the effective config with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));
    let file = load_and_prepare(&path).await?;
    let config = Config::from_file(&file);

    match cli.command {
        Commands::Serve { port } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            let log_dir = config
                .log_dir
                .clone()
                .unwrap_or_else(|| config_dir().join("logs"));
            logging::init_logger(&log_dir, &config.log_level, config.log_json);
            report_config_warnings(&file);
            run_server(config, file).await?;
        }
        Commands::Call {
            assistant,
            phone,
            caller_name,
            context,
        } => {
            logging::init_console_logger(&config.log_level);
            report_config_warnings(&file);
            let args = CallArgs {
                assistant,
                phone,
                caller_name,
                context,
            };
            call_cmd::run(&config, &file, args).await?;
        }
        Commands::Validate { number } => {
            let parsed = PhoneNumberValidator::new().parse(&number);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Commands::Status { port, logs } => {
            let addr = format!("{}:{}", config.bind_address, port.unwrap_or(config.port));
            status_cmd::run(&addr, logs).await?;
        }
        Commands::Config => {
            let value = serde_json::to_value(&file).context("Failed to serialize config")?;
            print!("{}", serde_yaml::to_string(&redact(&value))?);
        }
    }

    Ok(())
}

/// Config loads before the subscriber exists, so warnings are repeated here.
fn report_config_warnings(file: &SudslineConfig) {
    for warning in sudsline_config::validate(file).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
}

async fn run_server(config: Config, file: SudslineConfig) -> Result<()> {
    info!(
        addr = %config.addr(),
        vendor = %config.vendor.base_url,
        store = ?config.store_path,
        "Starting Sudsline call desk"
    );

    let manager = CallSessionManager::new(
        Arc::new(VapiConnector::new(config.vendor.clone())),
        config.session.clone(),
    );

    let recorder = match &config.store_path {
        Some(path) => match CallStore::open(path) {
            Ok(store) => Some(tokio::spawn(record_finished_calls(manager.subscribe(), store))),
            Err(e) => {
                error!(error = %e, "Call store unavailable; records stay in memory only");
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState {
        manager: manager.clone(),
        assistants: file.assistants.clone(),
    });
    let app = api::build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.addr()).await?;
    info!(addr = %config.addr(), "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, ending any active call");
    manager.cleanup().await;
    drop(manager);

    if let Some(handle) = recorder {
        if tokio::time::timeout(Duration::from_secs(2), handle).await.is_err() {
            warn!("Call recorder did not drain in time");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
