mod render;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use url::Url;

use marquee_core::config::AppConfig;
use marquee_core::models::{ConfigPatch, PipelineState};
use marquee_core::orchestrator::PipelineEvent;
use marquee_runtime::{DefaultRuntime, Runtime, RuntimeError};

const DEFAULT_LOG_FILTER: &str = "marquee=info,marquee_core=info,marquee_api=info,marquee_runtime=info";

#[derive(Parser, Debug)]
#[command(name = "marquee")]
#[command(version, about = "Show a film watchlist as a row of cards")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the watchlist row from the cache
    Show {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Wait for a pending refresh before printing
        #[arg(long)]
        wait: bool,
    },
    /// Fetch and resolve the watchlist now
    Refresh,
    /// Print the host action for the card at INDEX (0-based)
    Select { index: usize },
    /// Show or change watchlist settings
    Settings {
        /// Account name on the watchlist site
        #[arg(long)]
        user: Option<String>,
        /// Pages to fetch (clamped to 1..=5)
        #[arg(long)]
        pages: Option<i64>,
        /// Proxy endpoint URL
        #[arg(long)]
        proxy: Option<Url>,
    },
    /// Drop the cached row for the configured account
    ClearCache,
    /// Keep refreshing on an interval and print state changes
    Watch {
        /// Minutes between refreshes (defaults to general.revalidate_minutes)
        #[arg(long)]
        minutes: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let app = match AppConfig::load() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("marquee: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_logging(&app);

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to initialize runtime");
            eprintln!("marquee: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &runtime).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("marquee: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Stderr logging, plus a daily rolling file when `general.log_to_file` is set.
///
/// `RUST_LOG` overrides the default filter.
fn init_logging(app: &AppConfig) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(filter());

    if app.general.log_to_file {
        let appender = tracing_appender::rolling::daily(AppConfig::log_dir(), "marquee.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter());
        tracing_subscriber::registry().with(stderr).with(file).init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(stderr).init();
        None
    }
}

async fn run(command: Command, runtime: &DefaultRuntime) -> Result<(), RuntimeError> {
    match command {
        Command::Show { json, wait } => {
            let mut snapshot = runtime.snapshot_for_display()?;
            if wait && snapshot.state == PipelineState::Loading {
                runtime.refresh().await?;
                snapshot = runtime.snapshot_for_display()?;
            }
            if json {
                println!("{}", to_json(&snapshot)?);
            } else {
                render::print_snapshot(&snapshot);
            }
        }
        Command::Refresh => {
            let report = runtime.refresh().await?;
            render::print_report(&report);
            if report.state == PipelineState::Error {
                return Err(RuntimeError::Api(report.error.unwrap_or_default()));
            }
        }
        Command::Select { index } => {
            let action = runtime.select_index(index)?;
            println!("{}", to_json(&action)?);
        }
        Command::Settings { user, pages, proxy } => {
            let patch = ConfigPatch {
                account_handle: user,
                page_count: pages,
                proxy_endpoint: proxy,
            };
            if patch.is_empty() {
                println!("{}", to_json(&runtime.open_settings()?)?);
                return Ok(());
            }
            let config = runtime.save_settings(&patch)?;
            info!(handle = %config.account_handle, "settings saved");
            println!("{}", to_json(&config)?);
            if config.is_configured() {
                // Joins the run save_settings started.
                let report = runtime.refresh().await?;
                render::print_report(&report);
            }
        }
        Command::ClearCache => {
            runtime.clear_cache()?;
            println!("cache cleared");
        }
        Command::Watch { minutes } => watch(runtime, minutes).await?,
    }
    Ok(())
}

async fn watch(runtime: &DefaultRuntime, minutes: Option<u64>) -> Result<(), RuntimeError> {
    let interval = match minutes {
        Some(m) => Some(Duration::from_secs(m.max(1) * 60)),
        None => runtime.app_config().general.revalidate_interval(),
    };
    let Some(interval) = interval else {
        return Err(RuntimeError::Config(
            "revalidation is disabled (general.revalidate_minutes = 0); pass --minutes".into(),
        ));
    };

    render::print_report(&runtime.refresh().await?);
    let mut events = runtime.subscribe();
    let task = runtime.spawn_revalidation(interval);
    info!(minutes = interval.as_secs() / 60, "watching for changes, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PipelineEvent::StateChanged { handle, state }) => {
                    println!("{handle}: {state}");
                }
                Ok(PipelineEvent::RunFinished(report)) => render::print_report(&report),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    task.abort();
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RuntimeError> {
    serde_json::to_string_pretty(value).map_err(|e| RuntimeError::Config(e.to_string()))
}
