use clap::Parser;
use std::process::ExitCode;
use tourdesk::app::Dashboard;
use tourdesk::cli::Args;
use tourdesk::config::Config;
use tourdesk::logging::setup_logging;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config comes before logging so startup logs are never silently dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);
    debug!(?config, "configuration loaded");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting tourdesk"
    );

    let dashboard = match Dashboard::from_config(&config) {
        Ok(dashboard) => dashboard,
        Err(e) => {
            error!(error = format!("{e:#}"), "Failed to initialize");
            return ExitCode::FAILURE;
        }
    };
    dashboard.rehydrate().await;

    let outcome = dashboard.run(args.command).await;

    if let Err(e) = dashboard.persist().await {
        error!(error = format!("{e:#}"), "Failed to persist UI state");
    }

    match outcome {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to render output");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = format!("{e:#}"), "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
