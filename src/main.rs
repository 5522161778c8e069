//! Kiosk Server CLI
//!
//! Runs the embedded server under a headless presentation shell: the server
//! is started at launch and shut down cleanly on Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Serve ./webapp with the database assembly on an auto-assigned port
//! kiosk-server
//!
//! # Minimal assembly on a fixed port
//! kiosk-server --configurator minimal --port 8081
//!
//! # TLS assembly with material under ./tls
//! kiosk-server --configurator tls --root /opt/kiosk
//! ```

use clap::{Parser, ValueEnum};
use kiosk_server::config::AppLayout;
use kiosk_server::configurator::{
    Configurator, DatabaseConfigurator, LoopbackConfigurator, MinimalConfigurator, TlsConfigurator,
};
use kiosk_server::resources::ResourceRegistry;
use kiosk_server::server::EmbeddedServer;
use kiosk_server::shell::{Shell, ShellCommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Server assembly to run
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConfiguratorArg {
    /// One HTTP listener on a fixed port
    Minimal,
    /// Loopback-only listeners sharing an auto-assigned port
    Loopback,
    /// Loopback plus the embedded database (default)
    Database,
    /// Database plus an HTTPS listener
    Tls,
}

/// Kiosk Server - embedded local web server with a lifecycle shell
#[derive(Parser, Debug)]
#[command(name = "kiosk-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a local web application under an embedded server", long_about = None)]
struct Args {
    /// Install root containing webapp/, and where logs/, work/, db/ live
    #[arg(long, default_value = ".", value_name = "DIR")]
    root: PathBuf,

    /// Listen port (0 or omitted = auto-assign where the assembly allows)
    #[arg(short, long, env = "KIOSK_PORT")]
    port: Option<u16>,

    /// Server assembly
    #[arg(short, long, value_enum, default_value_t = ConfiguratorArg::Database, env = "KIOSK_CONFIGURATOR")]
    configurator: ConfiguratorArg,

    /// Fixed port for the HTTPS listener of the tls assembly
    #[arg(long, default_value = "8443")]
    https_port: u16,

    /// Enable permissive CORS on the application router
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(layout: &AppLayout, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    // Date-named server log under logs/, alongside the console output.
    let log_name = format!("{}.log", chrono::Local::now().format("%Y-%m-%d_%H%M%S"));
    let file_layer = std::fs::File::create(layout.logs_dir().join(&log_name))
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
}

fn build_configurator(args: &Args) -> Box<dyn Configurator> {
    match args.configurator {
        ConfiguratorArg::Minimal => Box::new(MinimalConfigurator),
        ConfiguratorArg::Loopback => Box::new(LoopbackConfigurator),
        ConfiguratorArg::Database => Box::new(DatabaseConfigurator::new()),
        ConfiguratorArg::Tls => Box::new(TlsConfigurator::new().with_https_port(args.https_port)),
    }
}

/// Resolves when Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received termination signal, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let layout = AppLayout::new(&args.root);
    if let Err(err) = layout.ensure_writable_dirs() {
        eprintln!("cannot prepare install root {:?}: {err}", args.root);
        std::process::exit(1);
    }
    init_logging(&layout, args.verbose);

    info!("Kiosk Server v{}", env!("CARGO_PKG_VERSION"));
    info!("  root: {:?}", layout.root());
    info!("  assembly: {:?}", args.configurator);

    let configurator = build_configurator(&args);
    let config = match configurator.build(layout, args.port) {
        Ok(config) => config.with_cors(args.cors),
        Err(err) => {
            error!("configuration failed: {err}");
            std::process::exit(1);
        }
    };

    let server = Arc::new(EmbeddedServer::new(config, Arc::new(ResourceRegistry::new())));
    if let Err(err) = configurator.wire(&server) {
        error!("wiring failed: {err}");
        std::process::exit(1);
    }
    if let Err(err) = server.init().await {
        error!("initialization failed: {err}");
        std::process::exit(1);
    }

    let (shell, handle) = Shell::new(server.clone());
    let shell_task = tokio::spawn(shell.run());
    handle.send(ShellCommand::Start);

    shutdown_signal().await;
    handle.send(ShellCommand::Close);

    match shell_task.await {
        Ok(()) => info!("Server shut down"),
        Err(err) => {
            // A dead shell cannot guarantee clean shutdown; terminate the
            // whole process.
            error!("shell task failed: {err}");
            std::process::exit(1);
        }
    }
}
