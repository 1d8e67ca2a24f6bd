//! Synthetic Metrics Load Generator CLI
//!
//! Loads a TOML configuration, builds the series registry, wires up the
//! configured exporters and control API, and runs the tick engine until
//! interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use synthload::control::{serve_control, ControlContext, LogReloadHandle};
use synthload::engine::{SystemClock, TickEngine, DEFAULT_QUEUE_CAPACITY};
use synthload::export::{serve_metrics, MetricsServerConfig, PullRegistry, PushSink};
use synthload::monitor::SelfMonitor;
use synthload::registry::SeriesRegistry;
use synthload::spike::SpikeController;
use synthload::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "synthload", version, about = "Synthetic metrics load generator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "synthload.toml")]
    config: PathBuf,

    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides the configured tick interval, in seconds.
    #[arg(long)]
    tick_interval_s: Option<f64>,

    /// Overrides the configured control API port.
    #[arg(long)]
    control_port: Option<u16>,

    /// Overrides the configured log level filter.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) -> LogReloadHandle {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{}' ({}), falling back to info", level, e);
        EnvFilter::new("info")
    });
    let (filter_layer, reload_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();
    reload_handle
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(seed) = cli.seed {
        config.global.seed = seed;
    }
    if let Some(tick_interval_s) = cli.tick_interval_s {
        config.global.tick_interval_s = tick_interval_s;
    }
    if let Some(control_port) = cli.control_port {
        config.global.control_port = control_port;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration after overrides: {}", e);
        std::process::exit(1);
    }

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.global.log_level.clone());
    let reload_handle = init_logging(&level);

    info!(version = synthload::VERSION, config = %cli.config.display(), seed = config.global.seed, "starting");

    let registry = match SeriesRegistry::build(&config) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to build series registry: {}", e);
            std::process::exit(1);
        }
    };
    let metric_names: std::collections::BTreeSet<String> =
        registry.metric_names().into_iter().collect();

    let spikes = Arc::new(SpikeController::new());
    let monitor = SelfMonitor::new();
    let mut engine = TickEngine::new(
        registry,
        Arc::clone(&spikes),
        Arc::clone(&monitor),
        Arc::new(SystemClock),
        config.global.tick_interval_s,
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if config.exporters.prometheus.enabled {
        let pull = PullRegistry::new(config.exporters.prometheus.prefix.clone());
        engine.add_sink(Box::new(Arc::clone(&pull)), DEFAULT_QUEUE_CAPACITY);

        let server_config = match MetricsServerConfig::from_exporter(&config.exporters.prometheus)
        {
            Ok(server_config) => server_config,
            Err(e) => {
                eprintln!("Invalid exposition server config: {}", e);
                std::process::exit(1);
            }
        };
        runtime.spawn(async move {
            if let Err(e) = serve_metrics(server_config, pull).await {
                tracing::error!(error = %e, "exposition server failed");
            }
        });
    }

    if config.exporters.push.enabled {
        match PushSink::new(&config.exporters.push) {
            Ok(push) => engine.add_sink(Box::new(push), DEFAULT_QUEUE_CAPACITY),
            Err(e) => {
                eprintln!("Failed to configure push exporter: {}", e);
                std::process::exit(1);
            }
        }
    }

    let context = Arc::new(ControlContext {
        spikes,
        monitor,
        engine: engine.handle(),
        metrics: metric_names,
        log_reload: Some(reload_handle),
    });
    let control_port = config.global.control_port;
    runtime.spawn(async move {
        if let Err(e) = serve_control(control_port, context).await {
            tracing::error!(error = %e, "control server failed");
        }
    });

    let handle = engine.handle();
    if let Err(e) = ctrlc::set_handler(move || handle.stop()) {
        eprintln!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    // Runs until a stop is requested; servers live on the runtime's
    // worker threads meanwhile.
    engine.run();

    info!("shut down cleanly");
}
