//! linkkeeper - keep a network association and MQTT session alive

use clap::{Parser, Subcommand};
use linkkeeper::config::LinkConfig;
use linkkeeper::observability::init_default_logging;
use linkkeeper::transport::mqtt::RumqttcSession;
use linkkeeper::transport::network::HostNetwork;
use linkkeeper::LinkSupervisor;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Self-healing network and MQTT session supervisor
#[derive(Parser)]
#[command(name = "linkkeeper")]
#[command(about = "Keep a network association and MQTT session alive")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "LINKKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Report link events (connecting, subscribed, message echo)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor until SIGINT or SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Show the configuration and resolved settings
        #[arg(long)]
        show: bool,
    },
    /// Print the supervisor status as JSON
    Status,
}

type SupervisorLink = LinkSupervisor<HostNetwork, RumqttcSession>;

fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting linkkeeper v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_link(config, cli.verbose > 0),
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Status => print_status(config, cli.verbose > 0),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(LinkConfig::load_from_file(path)?);
    }

    for path_str in ["linkkeeper.toml", "config/linkkeeper.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(LinkConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create linkkeeper.toml".into())
}

/// Wire the configured collaborators into a supervisor
fn build_link(config: &LinkConfig, verbose: bool) -> Result<SupervisorLink, Box<dyn std::error::Error>> {
    let mut settings = config.resolve()?;
    if verbose {
        settings.debug_messages = true;
    }

    if settings.update.is_some() {
        warn!("No update service is available in the CLI; [update] is ignored");
    }

    let session = RumqttcSession::from_config(&config.mqtt)?;
    let endpoint = session.endpoint().clone();
    let network = HostNetwork::new(endpoint.host, endpoint.port);

    Ok(LinkSupervisor::new(settings, network, session))
}

fn run_link(config: LinkConfig, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut link = build_link(&config, verbose)?;

    let patterns = config.runner.subscribe.clone();
    link.set_on_session_established(move |link: &mut SupervisorLink| {
        for pattern in &patterns {
            let subscribed = pattern.clone();
            // Failures are already reported by the supervisor
            let _ = link.subscribe_with_topic(pattern, move |topic, payload| {
                info!(pattern = %subscribed, topic = %topic, "{}", payload);
            });
        }
    });
    link.set_on_session_lost(|| info!("Waiting for the session to come back"));

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let tick = Duration::from_millis(config.runner.tick_ms);
    info!(
        client = %link.client_name(),
        broker = %config.mqtt.broker_url,
        "Supervisor running"
    );

    while !shutdown.load(Ordering::Relaxed) {
        link.tick();
        thread::sleep(tick);
    }

    info!(
        status = %serde_json::to_string(&link.status())?,
        "Shutdown requested, final status"
    );
    Ok(())
}

fn handle_config_command(config: &LinkConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.resolve()?;

    if show {
        println!("Configuration:");
        println!("{}", toml::to_string_pretty(config)?);
        println!("Resolved settings:");
        println!("{:#?}", settings.redacted());
    }

    info!("Configuration validation complete");
    Ok(())
}

fn print_status(config: LinkConfig, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let link = build_link(&config, verbose)?;
    println!("{}", serde_json::to_string_pretty(&link.status())?);
    Ok(())
}
