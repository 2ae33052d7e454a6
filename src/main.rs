use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use telforge::config::{Config, Dataset, RendererKind, SinkMode};
use telforge::pipeline::{Pipeline, PipelineOptions};
use telforge::render::Renderer;
use telforge::sink::{BulkSink, HttpTransport, MemoryTransport, StdoutTransport, Transport};

/// Synthetic telemetry generator for load-testing monitoring stacks.
#[derive(Parser)]
#[command(name = "telforge", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Dataset override (hosts, weather).
    #[arg(long)]
    dataset: Option<String>,

    /// Entity count override.
    #[arg(long)]
    entities: Option<usize>,

    /// Tick interval override (e.g. "10s", "1m").
    #[arg(long)]
    interval: Option<String>,

    /// Backfill start override (e.g. "now-2h").
    #[arg(long)]
    backfill: Option<String>,

    /// Renderer override; repeatable (elastic, otel, fieldsense).
    #[arg(long = "renderer")]
    renderers: Vec<String>,

    /// Discard documents after rendering instead of submitting them.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Target OS.
    pub fn target_os() -> &'static str {
        std::env::consts::OS
    }

    /// Target architecture.
    pub fn target_arch() -> &'static str {
        std::env::consts::ARCH
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            target_os(),
            target_arch(),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("telforge {}", version::full());
        return Ok(());
    }

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    apply_overrides(&mut cfg, &cli)?;
    cfg.validate()?;

    // Initialize tracing. CLI takes precedence over the config file.
    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter =
        EnvFilter::try_new(log_level).with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        dataset = cfg.dataset.as_str(),
        entities = cfg.entity_count,
        "starting telforge",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg, cli.dry_run).await })
}

/// Applies CLI flags on top of the loaded configuration.
fn apply_overrides(cfg: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(dataset) = &cli.dataset {
        cfg.dataset = Dataset::from_str(dataset)?;
    }
    if let Some(entities) = cli.entities {
        cfg.entity_count = entities;
    }
    if let Some(interval) = &cli.interval {
        cfg.interval = interval.clone();
    }
    if let Some(backfill) = &cli.backfill {
        cfg.backfill = backfill.clone();
    }
    if !cli.renderers.is_empty() {
        cfg.renderers = cli
            .renderers
            .iter()
            .map(|name| RendererKind::from_str(name))
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(())
}

async fn run(cfg: Config, dry_run: bool) -> Result<()> {
    // The whole run resolves its schedule against one reference instant.
    let plan = cfg.resolve(Utc::now())?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let transport = if dry_run {
        Transport::Memory(MemoryTransport::new())
    } else {
        match cfg.sink.mode {
            SinkMode::Http => Transport::Http(HttpTransport::new(&cfg.sink)?),
            SinkMode::Stdout => Transport::Stdout(StdoutTransport::new()),
        }
    };
    tracing::info!(transport = transport.name(), "sink configured");

    let (sink, sink_task) = BulkSink::spawn(cfg.sink.clone(), Arc::new(transport));

    let pipeline = Pipeline::new(
        PipelineOptions {
            dataset: cfg.dataset,
            renderers: cfg.renderers.iter().copied().map(Renderer::from).collect(),
            entity_count: cfg.entity_count,
            entity_prefix: cfg.entity_prefix.clone(),
            interval: plan.interval,
            backfill_start: plan.backfill_start,
        },
        sink.clone(),
        cancel.clone(),
    );

    pipeline.run().await?;

    // Dropping the last producer handle lets the sink drain and exit.
    drop(sink);
    sink_task.join().await?;

    tracing::info!("telforge stopped");

    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        let mut sigterm = match sigterm {
            Ok(sigterm) => sigterm,
            Err(err) => {
                tracing::error!(error = %err, "failed to register SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        cancel.cancel();
    });
}
