use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;

use cli::{Args, Mode};
use config::Config;

/// Initialize tracing:
/// 1. Console output (stderr) - stdout carries the JSON responses
/// 2. Optional file output under CLOUDSTEP_LOG_DIR, rotated daily
fn initialize_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,cloudstep_provisioning=debug".into());

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // The guard must outlive every log call or buffered lines are lost
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "cloudstep.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(file_writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load .env and the environment
    let config = Config::load()?;

    let _guard = initialize_tracing(&config)?;

    // Route to appropriate handler
    match args.mode {
        Mode::Step {
            family,
            operation,
            model,
            context,
        } => commands::step::run_step(&config, &family, operation, &model, context.as_deref()).await,
        Mode::Run {
            family,
            operation,
            model,
            max_steps,
        } => commands::run::run_until_done(&config, &family, operation, &model, max_steps).await,
        Mode::Read { family, model } => commands::resource::run_read(&config, &family, &model).await,
        Mode::List { family, model, output } => {
            commands::resource::run_list(&config, &family, &model, &output).await
        }
        Mode::Config => commands::config::show(&config),
    }
}
