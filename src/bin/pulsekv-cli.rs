//! PulseKV Command-Line Client
//!
//! Two ways to talk to a running server:
//!
//! - `send`: read a request from a JSON file, stamp it with a fresh
//!   identity, send it, and print the pretty response.
//! - `watch`: subscribe to the change feed and print every change notice
//!   as one JSON line, resubscribing with a fixed delay whenever the
//!   connection is lost.

use anyhow::Context;
use pulsekv::client::{self, Subscription};
use pulsekv::protocol::RawRequest;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// Seconds to wait before resubscribing after a lost connection.
const DEFAULT_RETRY_SECS: u64 = 30;

/// Client configuration
struct CliConfig {
    /// Server host to connect to
    host: String,
    /// Server port to connect to
    port: u16,
    /// Enable debug-level logging
    verbose: bool,
    /// What to do once connected
    mode: Mode,
}

enum Mode {
    /// One request, one response, exit.
    Send {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    /// Follow the change feed until killed.
    Watch {
        output: Option<PathBuf>,
        identifier: Option<String>,
        retry_secs: u64,
    },
}

impl CliConfig {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        if args.len() < 2 {
            print_help();
            std::process::exit(1);
        }

        let command = args[1].as_str();
        match command {
            "send" | "watch" => {}
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" => {
                println!("pulsekv-cli version {}", pulsekv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown command: {command}");
                print_help();
                std::process::exit(1);
            }
        }

        let mut host = pulsekv::DEFAULT_HOST.to_string();
        let mut port = pulsekv::DEFAULT_PORT;
        let mut verbose = false;
        let mut input: Option<PathBuf> = None;
        let mut output: Option<PathBuf> = None;
        let mut identifier: Option<String> = None;
        let mut retry_secs = DEFAULT_RETRY_SECS;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--server" | "-s" => {
                    host = take_value(&args, i, "--server");
                    i += 2;
                }
                "--port" | "-p" => {
                    port = take_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--input" | "-i" => {
                    input = Some(PathBuf::from(take_value(&args, i, "--input")));
                    i += 2;
                }
                "--output" | "-o" => {
                    output = Some(PathBuf::from(take_value(&args, i, "--output")));
                    i += 2;
                }
                "--uuid" | "-u" => {
                    identifier = Some(take_value(&args, i, "--uuid"));
                    i += 2;
                }
                "--retry" | "-r" => {
                    retry_secs = take_value(&args, i, "--retry").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid retry delay");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--verbose" | "-v" => {
                    verbose = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        let mode = match command {
            "send" => {
                let input = input.unwrap_or_else(|| {
                    eprintln!("Error: send requires --input <FILE>");
                    std::process::exit(1);
                });
                Mode::Send { input, output }
            }
            _ => Mode::Watch {
                output,
                identifier,
                retry_secs,
            },
        };

        CliConfig {
            host,
            port,
            verbose,
            mode,
        }
    }

    /// Returns the server address as a string
    fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
pulsekv-cli - Talk to a PulseKV server

USAGE:
    pulsekv-cli send  [OPTIONS] --input <FILE>
    pulsekv-cli watch [OPTIONS]

COMMANDS:
    send     Send the request in a JSON file and print the response
    watch    Subscribe and print every change notice as one JSON line

OPTIONS:
    -s, --server <HOST>    Server host (default: 127.0.0.1)
    -p, --port <PORT>      Server port (default: 8080)
    -i, --input <FILE>     Request file for send (its UUID is replaced)
    -o, --output <FILE>    Also write results to this file
                           (send: overwrite; watch: append one line each)
    -u, --uuid <ID>        Subscribe under a fixed identity
                           (default: a fresh one per attempt)
    -r, --retry <SECONDS>  Watch reconnect delay after errors (default: 30)
    -v, --verbose          Enable debug-level logging
        --version          Print version information
        --help             Print this help message

EXAMPLES:
    pulsekv-cli send -i set_record.json
    pulsekv-cli send -i get_record.json -s 10.0.0.5 -p 9000
    pulsekv-cli watch -o changes.jsonl
    pulsekv-cli watch -u dashboard-1 -r 5
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::from_args();

    // Set up logging
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    let addr = config.server_address();
    match config.mode {
        Mode::Send { input, output } => run_send(&addr, &input, output.as_deref()).await,
        Mode::Watch {
            output,
            identifier,
            retry_secs,
        } => run_watch(&addr, output.as_deref(), identifier, retry_secs).await,
    }
}

/// Sends the request in `input` and prints the single response.
async fn run_send(addr: &str, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let mut request: RawRequest = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid request", input.display()))?;

    // Whatever identity the file carries is replaced; every send is its
    // own client as far as the server's audit log is concerned.
    request.client_id = Some(Uuid::new_v4().to_string());

    let response = client::request(addr, &request)
        .await
        .with_context(|| format!("request to {addr} failed"))?;

    let rendered = serde_json::to_string_pretty(&response)?;
    if let Some(path) = output {
        std::fs::write(path, &rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    println!("{rendered}");
    Ok(())
}

/// Follows the change feed forever, resubscribing as needed.
async fn run_watch(
    addr: &str,
    output: Option<&Path>,
    identifier: Option<String>,
    retry_secs: u64,
) -> anyhow::Result<()> {
    loop {
        // Fresh identity per attempt unless one was pinned on the command
        // line; a pinned identity displaces whoever held it before.
        let attempt_id = identifier
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match watch_once(addr, output, &attempt_id).await {
            Ok(()) => {
                info!("Server closed the subscription, resubscribing");
            }
            Err(e) => {
                warn!(error = %e, "Subscription lost, retrying in {}s", retry_secs);
                sleep(Duration::from_secs(retry_secs)).await;
            }
        }
    }
}

/// One subscription: connect, then print pushes until the server hangs up.
async fn watch_once(addr: &str, output: Option<&Path>, identifier: &str) -> anyhow::Result<()> {
    let mut subscription = Subscription::connect(addr, identifier).await?;
    info!(identifier = %identifier, "Subscribed, waiting for changes");

    while let Some(notice) = subscription.next().await? {
        let line = serde_json::to_string(&notice)?;
        if let Some(path) = output {
            append_line(path, &line)
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        println!("{line}");
    }
    Ok(())
}

/// Appends one line to `path`, creating the file on first use.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}
