use clap::{Parser, Subcommand};
use loom_nfv::config;
use loom_nfv::telemetry::init_logging;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "In-path packet filter with a reconfigurable network function chain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the filter daemon
    Run {
        /// Path to loom.toml
        #[arg(short, long, default_value = "loom.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate loom.toml
    Validate {
        /// Path to loom.toml
        #[arg(short, long, default_value = "loom.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration with defaults filled in
    Show {
        /// Path to loom.toml
        #[arg(short, long, default_value = "loom.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => {
            init_logging(None);
            match action {
                ConfigAction::Validate { config } => cmd_config_validate(&config),
                ConfigAction::Show { config } => cmd_config_show(&config),
            }
        }
        Commands::Run { config } => cmd_run(&config),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    use loom_nfv::capture::{self, AfPacketSocket, EgressQueue, DEFAULT_QUEUE_DEPTH};
    use loom_nfv::control;
    use loom_nfv::dataplane::{CaptureHook, Netif, NfEngine};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::runtime::Runtime;
    use tracing::{error, info};

    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    init_logging(cfg.logging.as_ref());
    info!("Loaded {}", config_path.display());

    let validation = config::validate_for_run(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let (Some(rx_name), Some(tx_name)) = (
        cfg.capture.interface.clone(),
        cfg.capture.forward_interface.clone(),
    ) else {
        return Err("capture.interface and capture.forward_interface are required".to_string());
    };
    let listen = cfg.control_listen();

    let engine = Arc::new(
        NfEngine::from_config(&cfg).map_err(|e| format!("Failed to build NF chain: {}", e))?,
    );

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        info!("Binding to {} (capture) and {} (forward)...", rx_name, tx_name);
        let source = AfPacketSocket::capture(&rx_name).map_err(|e| {
            format!(
                "Failed to bind to {}: {}. Run with root privileges.",
                rx_name, e
            )
        })?;
        let sink = AfPacketSocket::transmit(&tx_name)
            .map_err(|e| format!("Failed to bind to {}: {}", tx_name, e))?;

        let (egress, queue) = EgressQueue::new(DEFAULT_QUEUE_DEPTH);
        let netif = Arc::new(Netif::with_input(rx_name.clone(), Arc::new(egress)));
        CaptureHook::install(&netif, engine.clone())
            .map_err(|e| format!("Failed to install capture hook: {}", e))?;

        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| format!("Failed to listen on {}: {}", listen, e))?;

        let control_engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = control::serve(listener, control_engine).await {
                error!(error = %e, "Control server stopped");
            }
        });
        tokio::spawn(capture::run_writer(queue, sink));
        tokio::spawn(capture::run_pump(source, netif));

        info!("Filter running, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to wait for shutdown signal: {}", e))?;

        let stats = engine.stats();
        info!(
            total_packets = stats.total_packets,
            passed_packets = stats.passed_packets,
            dropped_packets = stats.dropped_packets,
            "Shutting down"
        );
        Ok::<(), String>(())
    })
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_config_show(config_path: &Path) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let rendered =
        config::render_effective(&cfg).map_err(|e| format!("Failed to render config: {}", e))?;
    print!("{}", rendered);
    Ok(())
}
