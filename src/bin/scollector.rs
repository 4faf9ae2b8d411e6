use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use scollector::{
    Registry, TelemetryContext, builtin,
    clock::CachedClock,
    config::{Config, read_config_file},
    dispatch,
    sink::{self, PrintSink, Sink},
    util::{get_config_path, resolve_hostname},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (falls back to $SCOLLECTOR_CONFIG)
    #[arg(short, long)]
    conf: Option<String>,

    /// Print points to stdout instead of the configured sink
    #[arg(short, long)]
    print: bool,

    /// Comma-separated collector name substrings; overrides the config filter
    #[arg(short, long)]
    filter: Option<String>,

    /// List available collectors and exit
    #[arg(short, long)]
    list: bool,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("scollector", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    match args.conf.clone().or_else(get_config_path) {
        Some(path) => {
            read_config_file(&path).with_context(|| format!("failed to load config from {path}"))
        }
        None => {
            debug!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;
    let cancel = CancellationToken::new();

    let hostname = resolve_hostname(config.hostname.as_deref(), config.full_host);
    info!("collecting as {hostname}");

    let clock = Arc::new(CachedClock::new());
    let clock_task = clock.spawn_refresh(cancel.clone());

    let ctx = Arc::new(
        TelemetryContext::builder(hostname)
            .default_tags(config.default_tags.clone())
            .clock(clock)
            .default_interval(config.freq())
            .self_monitoring(!config.disable_self)
            .build(),
    );

    let mut registry = Registry::new();
    builtin::register_all(&mut registry, &config, &ctx)?;
    registry.apply_tag_overrides(&config.tag_override)?;

    if args.list {
        for c in registry.iter() {
            println!("{} ({})", c.name(), c.kind());
        }
        return Ok(());
    }

    let filters: Vec<String> = match &args.filter {
        Some(f) => f
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => config.filter.clone(),
    };
    let collectors = registry.search(&filters);
    if collectors.is_empty() {
        warn!("no collectors match {filters:?}");
    }

    let (sink, options) = sink::from_config(&config.sink)?;
    let sink: Box<dyn Sink> = if args.print { Box::new(PrintSink) } else { sink };

    let (rx, handle) = dispatch::run(collectors, ctx, cancel.clone(), config.channel_capacity);
    info!("running {} collectors: {:?}", handle.len(), handle.names());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received ctrl-c, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("unable to listen for ctrl-c: {e}"),
        }
    });

    let stats = sink::drain(rx, sink.as_ref(), options).await;
    handle.join().await;
    cancel.cancel();
    let _ = clock_task.await;

    info!("sent {} points in {} batches", stats.points, stats.batches);
    Ok(())
}
