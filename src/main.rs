//! PulseKV - A Record Store That Pushes Its Changes
//!
//! This is the main entry point for the PulseKV server.
//! It wires up the store, audit log, subscriber registry, and dispatcher,
//! then accepts connections until Ctrl+C.

use anyhow::Context;
use pulsekv::commands::Dispatcher;
use pulsekv::connection::{handle_connection, ConnectionStats};
use pulsekv::registry::SubscriberRegistry;
use pulsekv::store::{EventLog, MemoryEventLog, MemoryRecordStore, RecordStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Accept backlog handed to the kernel at listen time.
const LISTEN_BACKLOG: u32 = 128;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Enable debug-level logging
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: pulsekv::DEFAULT_HOST.to_string(),
            port: pulsekv::DEFAULT_PORT,
            verbose: false,
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
                "--verbose" | "-v" => {
                    config.verbose = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" => {
                    println!("PulseKV version {}", pulsekv::VERSION);
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
PulseKV - A Record Store That Pushes Its Changes

USAGE:
    pulsekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 8080)
    -v, --verbose        Enable debug-level logging
        --version        Print version information
        --help           Print this help message

EXAMPLES:
    pulsekv                        # Start on 127.0.0.1:8080
    pulsekv --port 9000            # Start on port 9000
    pulsekv --host 0.0.0.0         # Listen on all interfaces
    pulsekv -v                     # Log every request at debug level

CONNECTING:
    Use the bundled CLI to talk to the server:
    $ pulsekv-cli send -i request.json     # one-shot request
    $ pulsekv-cli watch                    # follow the change feed
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
        ____        __           __ ___    __
       / __ \__  __/ /________  / //_/ |  / /
      / /_/ / / / / / ___/ _ \/ //_/ | | / /
     / ____/ /_/ / (__  )  __/ ,<    | |/ /
    /_/    \__,_/_/____/\___/_/|_|   |___/

PulseKV v{} - Record Store With a Live Change Feed
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        pulsekv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Construct the collaborators once; every connection shares them.
    let store = Arc::new(MemoryRecordStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let registry = Arc::new(SubscriberRegistry::new());
    let dispatcher = Dispatcher::new(
        store as Arc<dyn RecordStore>,
        log as Arc<dyn EventLog>,
        registry,
    );
    info!("In-memory record store and audit log initialized");

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = bind_listener(&config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, dispatcher, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Binds the listening socket with address reuse enabled, so a restarted
/// server can rebind immediately instead of waiting out TIME_WAIT.
async fn bind_listener(addr_text: &str) -> anyhow::Result<TcpListener> {
    let addr = tokio::net::lookup_host(addr_text)
        .await
        .with_context(|| format!("failed to resolve {addr_text}"))?
        .next()
        .with_context(|| format!("{addr_text} resolved to no addresses"))?;

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("failed to bind {addr}"))?;

    Ok(socket.listen(LISTEN_BACKLOG)?)
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, dispatcher: Dispatcher, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let dispatcher = dispatcher.clone();
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, dispatcher, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
