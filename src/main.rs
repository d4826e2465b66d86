//! krill server entry point.
//!
//! Sets up logging, the shared store, the background expiry sweep and the
//! TCP listener, then accepts connections until interrupted.

use krill::commands::CommandExecutor;
use krill::connection::{handle_connection, ConnectionRegistry};
use krill::storage::{Store, SweepConfig, Sweeper};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Interval between background expiry sweeps
    sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: krill::DEFAULT_HOST.to_string(),
            port: krill::DEFAULT_PORT,
            sweep_interval: SweepConfig::default().interval,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--sweep-interval" => {
                    if i + 1 < args.len() {
                        let seconds: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid sweep interval");
                            std::process::exit(1);
                        });
                        config.sweep_interval = Duration::from_secs(seconds);
                        i += 2;
                    } else {
                        eprintln!("Error: --sweep-interval requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("krill version {}", krill::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
krill - a small in-memory key-value store

USAGE:
    krill [OPTIONS]

OPTIONS:
    -h, --host <HOST>             Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>             Port to listen on (default: 6379)
        --sweep-interval <SECS>   Seconds between expiry sweeps (default: 300)
    -v, --version                 Print version information
        --help                    Print this help message

EXAMPLES:
    krill                         # Start on 127.0.0.1:6379
    krill --port 6380             # Start on port 6380
    krill --sweep-interval 60     # Sweep expired keys every minute
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Shared across all connections plus the sweeper
    let store = Arc::new(Store::new());

    let _sweeper = Sweeper::start(
        Arc::clone(&store),
        SweepConfig {
            interval: config.sweep_interval,
        },
    );

    let registry = Arc::new(ConnectionRegistry::new());

    // A failed bind is fatal to the whole process
    let listener = match TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind_address(), error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_address(), "krill v{} listening", krill::VERSION);

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, store, registry) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Accepts connections indefinitely, one serving task each.
async fn accept_loop(
    listener: TcpListener,
    store: Arc<Store>,
    registry: Arc<ConnectionRegistry>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let executor = CommandExecutor::new(Arc::clone(&store));
                let registry = Arc::clone(&registry);

                tokio::spawn(async move {
                    handle_connection(stream, addr, executor, registry).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
