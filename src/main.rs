use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use parrot::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use parrot::startup::{render_banner, render_field_checks};
use parrot::{app, build_state, load_config, BotConfig, Credentials, EnvironmentReport};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

/// LINE echo bot: validates configuration and credentials, then serves the
/// webhook.
#[derive(Debug, Parser)]
#[command(name = "parrot", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, credentials) = match preflight(&cli) {
        Some(checked) => checked,
        None => return ExitCode::FAILURE,
    };

    // Initialise structured logging. RUST_LOG wins over the config's debug flag.
    let default_level = if config.server.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).init();

    println!("\n{}\n", render_banner(&config));

    match serve(config, credentials).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "server failed");
            eprintln!("[error] startup failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Load and validate everything the server needs, printing a check list.
/// Nothing binds before this returns `Some`.
fn preflight(cli: &Cli) -> Option<(BotConfig, Credentials)> {
    let rule = "=".repeat(50);
    println!("{}\n  startup checks\n{}", rule, rule);

    let loaded = match load_config(&cli.config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("[error] {}", err);
            return None;
        }
    };
    println!("[ok] loaded config file: {}", loaded.path);

    println!("\n[config]");
    for line in render_field_checks(&loaded.check_required()) {
        println!("{}", line);
    }
    if let Err(err) = loaded.validate() {
        eprintln!("\n[error] {}", err);
        return None;
    }

    println!("\n[environment]");
    let report = EnvironmentReport::from_process_env();
    for line in report.render() {
        println!("{}", line);
    }
    let credentials = match report.into_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("\n[error] {}", err);
            return None;
        }
    };

    println!("\n[ok] all checks passed");
    Some((loaded.config, credentials))
}

async fn serve(config: BotConfig, credentials: Credentials) -> anyhow::Result<()> {
    let addr = config.listen_address();
    let state = build_state(config, credentials)?;
    let app = app(state);

    // Run the server with graceful shutdown on Ctrl+C
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
