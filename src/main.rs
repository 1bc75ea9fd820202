//! dice - A weighted HTTP load balancer for static infrastructures
//!
//! Usage:
//!     dice --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use dice::config::{load_config, Config, ConfigWatcher};
use dice::control::Controller;
use dice::frontend::ProxyListener;
use dice::health::HealthChecker;
use dice::metrics::MetricsServer;
use dice::util::init_logging;
use dice::AppState;

/// A weighted HTTP load balancer.
#[derive(Parser, Debug)]
#[command(name = "dice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and topology, then exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(
        log_level,
        &config.global.log_format,
        config.global.log_file.as_deref(),
    )
    .context("failed to initialise logging")?;

    if cli.validate {
        return print_topology(&config);
    }

    info!(
        config_path = %cli.config.display(),
        listen = %config.proxy.listen,
        nodes = config.nodes.len(),
        services = config.services.len(),
        instances = config.instances.len(),
        "dice starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run(config, cli.config))
}

/// Build the topology without starting anything and print it.
fn print_topology(config: &Config) -> Result<()> {
    let controller =
        Controller::from_config(config).context("configuration does not form a valid topology")?;

    println!("Configuration is valid.");

    let nodes = controller.list_nodes(true)?;
    println!("  Nodes: {}", nodes.len());
    for node in &nodes {
        println!(
            "    - {} {} (weight {}, {})",
            node.name,
            node.url,
            node.weight,
            if node.is_attached { "attached" } else { "detached" }
        );
    }

    let services = controller.list_services(true)?;
    println!("  Services: {}", services.len());
    for service in &services {
        println!(
            "    - {} [{}] {} -> {}",
            service.name,
            service.balancing_method,
            if service.is_enabled { "enabled" } else { "disabled" },
            service.routes.join(", ")
        );
    }

    let instances = controller.list_instances(true)?;
    println!("  Instances: {}", instances.len());
    for instance in &instances {
        println!(
            "    - {} {} version '{}' ({})",
            instance.name,
            instance.address,
            instance.version,
            if instance.is_attached { "attached" } else { "detached" }
        );
    }

    Ok(())
}

async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    let state =
        AppState::from_config(config).context("failed to build topology from configuration")?;

    let (listen, metrics) = {
        let config = state.config();
        (config.proxy.listen, config.global.metrics.clone())
    };

    let mut handles = Vec::new();

    let listener = ProxyListener::bind(listen, state.clone())
        .await
        .with_context(|| format!("failed to bind proxy listener on {}", listen))?;
    handles.push(tokio::spawn(listener.run(state.shutdown().subscribe())));

    let checker = HealthChecker::new(state.clone());
    handles.push(tokio::spawn(checker.run(state.shutdown().subscribe())));

    if metrics.enabled {
        let server = MetricsServer::new(metrics.address, metrics.path, state.clone());
        handles.push(tokio::spawn(server.run(state.shutdown().subscribe())));
    }

    let reload_state = state.clone();
    let watcher = ConfigWatcher::new(
        config_path,
        Box::new(move |config| reload_state.reload(config)),
    );
    handles.push(tokio::spawn(watcher.run(state.shutdown().subscribe())));

    info!("dice is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    state.trigger_shutdown();

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "task failed during shutdown");
        }
    }

    info!("dice shut down complete");
    Ok(())
}
