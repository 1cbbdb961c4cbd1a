//! Strategy engine binary
//!
//! Usage:
//!   torq-engine --config config/engine.toml --synthetic
//!   torq-engine --config config/engine.toml --replay ticks.jsonl
//!   cat ticks.jsonl | torq-engine --replay -

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use torq_engine_config::{resolve_config_path, EngineConfig};
use torq_health_check::HealthCheckServer;
use torq_strategy_engine::logging::init_tracing;
use torq_strategy_engine::{
    EngineContext, EngineError, EngineSupervisor, ReplayFeed, ReplaySource, ShutdownToken,
    SyntheticFeed,
};
use tracing::{error, info, warn};

const DEFAULT_STREAM: &str = "market_ticks";

#[derive(Parser, Debug)]
#[command(name = "torq-engine")]
#[command(about = "Torq strategy engine: market ticks in, trading signals out")]
#[command(version)]
struct Args {
    /// Path to configuration file (default: $TORQ_ENGINE_CONFIG or config/engine.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter, overrides logging.level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Replay JSON-lines feed events from a file, or `-` for stdin
    #[arg(long, conflicts_with = "synthetic")]
    replay: Option<String>,

    /// Generate random-walk ticks for feed.synthetic_symbols
    #[arg(long)]
    synthetic: bool,

    /// Seed for the synthetic feed
    #[arg(long)]
    seed: Option<u64>,

    /// Health endpoint port, overrides health.port
    #[arg(long)]
    health_port: Option<u16>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    if let Some(port) = args.health_port {
        config.health.port = port;
    }
    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }
    init_tracing(&config.logging)?;

    let ctx = Arc::new(EngineContext::new(config.engine.clone()));
    info!(
        instance_id = %ctx.instance_id(),
        strategies = config.enabled_strategies().count(),
        max_strategies = config.engine.max_strategies,
        max_orders_per_second = config.engine.max_orders_per_second,
        memory_limit_mb = config.engine.memory_limit_mb,
        "Starting Torq strategy engine"
    );

    let supervisor = Arc::new(EngineSupervisor::new(ctx.clone()));
    supervisor.start(&config.strategies).map_err(|e| {
        error!("Failed to start engine: {}", e);
        e
    })?;

    let stop_services = ShutdownToken::new();

    // Log every signal on the channels strategies publish to
    let mut channels: Vec<String> = config
        .enabled_strategies()
        .map(|s| s.transport.signal_channel.clone())
        .collect();
    channels.sort();
    channels.dedup();
    for channel in channels {
        let subscription = ctx.signals().subscribe(&channel, "engine-log");
        tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                match envelope.to_json() {
                    Ok(json) => info!(target: "torq::signals", "{}", json),
                    Err(e) => warn!("Failed to encode signal: {}", e),
                }
            }
        });
    }

    let health_handle = if config.health.enabled {
        let server = HealthCheckServer::new(supervisor.clone(), config.health.port);
        let token = stop_services.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(async move { token.cancelled().await }).await {
                error!("Health endpoint failed: {}", e);
            }
        }))
    } else {
        None
    };

    let feed_handle = spawn_feed(&args, &config, &ctx, &stop_services)?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    stop_services.cancel();
    if let Some(handle) = feed_handle {
        let _ = handle.await;
    }

    match supervisor.stop().await {
        Ok(()) => {}
        Err(EngineError::ShutdownTimeout { forced }) => {
            warn!(?forced, "Some strategies were stopped forcibly");
        }
        Err(e) => warn!("Engine stop: {}", e),
    }

    ctx.streams().close_all();
    ctx.signals().close_all();
    if let Some(handle) = health_handle {
        let _ = handle.await;
    }

    let totals = ctx.registry().totals();
    info!(
        ticks_processed = totals.ticks_processed,
        signals_generated = totals.signals_generated,
        errors = totals.errors,
        rate_limited = totals.rate_limited,
        "Torq strategy engine stopped"
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let path = resolve_config_path(args.config.as_deref())?;
    if args.config.is_none() && !path.exists() {
        // No file anywhere: defaults plus TORQ_* environment
        return EngineConfig::load(None);
    }
    EngineConfig::load(Some(&path))
}

fn spawn_feed(
    args: &Args,
    config: &EngineConfig,
    ctx: &Arc<EngineContext>,
    shutdown: &ShutdownToken,
) -> Result<Option<tokio::task::JoinHandle<()>>> {
    let stream = config.feed.stream.as_deref().unwrap_or(DEFAULT_STREAM);
    let adapter = ctx.streams().adapter(stream);
    let shutdown = shutdown.clone();

    if let Some(source) = args.replay.as_ref().or(config.feed.replay_path.as_ref()) {
        let feed = ReplayFeed::new(ReplaySource::parse(source));
        return Ok(Some(tokio::spawn(async move {
            if let Err(e) = feed.run(adapter, shutdown).await {
                error!("Replay feed failed: {:#}", e);
            }
        })));
    }

    if args.synthetic || config.feed.synthetic {
        let symbols = &config.feed.synthetic_symbols;
        if symbols.is_empty() {
            bail!("Synthetic feed needs feed.synthetic_symbols");
        }
        let interval = config.engine.data_refresh_interval();
        let feed = match args.seed {
            Some(seed) => SyntheticFeed::with_seed(symbols, interval, seed),
            None => SyntheticFeed::new(symbols, interval),
        };
        return Ok(Some(tokio::spawn(async move {
            feed.run(adapter, shutdown, None).await;
        })));
    }

    warn!(stream, "No feed configured; strategies will idle");
    Ok(None)
}
