use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use pricewatch::tracking::{self, TrackRequest};
use pricewatch::{web, App, AppConfig, BatchScheduler};

#[derive(Debug, Parser)]
#[command(name = "pricewatch", version, about = "Periodic price refresh for tracked products")]
struct Cli {
    /// Write logs to daily files in this directory instead of stdout
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP trigger and run batches on the configured schedule
    Serve {
        /// Only answer HTTP triggers
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Run a single batch and print the result as JSON
    RunOnce {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Start tracking a product page
    Track {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Notify once the price falls to or below this value
        #[arg(long)]
        target: Option<f64>,
    },
}

fn init_tracing(log_dir: Option<&PathBuf>) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("pricewatch=info,tower_http=info"))?;

    let (writer, guard) = match log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "pricewatch.log")),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_dir.is_none())
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref())?;

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Command::RunOnce {
        batch_size: Some(batch_size),
    } = &cli.command
    {
        config.batch.batch_size = *batch_size;
        config.validate()?;
    }

    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let app = App::build(config).await?;

    match cli.command {
        Command::Serve { no_scheduler } => {
            info!("Starting PriceWatch v{}", env!("CARGO_PKG_VERSION"));

            let mut scheduler = if no_scheduler {
                None
            } else {
                let mut scheduler = BatchScheduler::new(app.runner.clone(), app.config.batch.schedule.clone()).await?;
                scheduler.start().await?;
                Some(scheduler)
            };

            web::serve(&app.config.server, app.state(), shutdown_signal()).await?;

            if let Some(scheduler) = scheduler.as_mut() {
                scheduler.shutdown().await?;
            }
            info!("Shutting down...");
        }
        Command::RunOnce { .. } => {
            let result = app.runner.run().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Track {
            url,
            title,
            email,
            target,
        } => {
            let request = TrackRequest {
                url,
                title,
                email,
                target_price: target,
            };
            let item = tracking::track(app.store.as_ref(), request).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
    }

    Ok(())
}
