//! oscar - send, receive and dispatch Open Sound Control packets

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use oscar_core::{Bundle, Message, Packet, Timetag};
use oscar_router::Dispatcher;
use oscar_transport::{OscClient, OscServer, TransportError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;
mod config;

use config::Config;

/// oscar - Open Sound Control toolkit
#[derive(Parser)]
#[command(name = "oscar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true, env = "OSCAR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every packet received on a UDP port
    Listen {
        /// Bind address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// Print packets as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one message
    Send {
        /// Target host:port
        target: String,

        /// Message address
        address: String,

        /// Arguments: i:1 h:1 f:1.5 d:1.5 s:text b:hex t:<u64> T F N, or bare values
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        /// Wrap the message in a bundle timed this many milliseconds ahead
        #[arg(long)]
        bundle_delay_ms: Option<u64>,
    },

    /// Serve a dispatcher with logging methods at the given addresses
    Dispatch {
        /// Bind address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// Method address to register (repeatable)
        #[arg(short, long = "method")]
        methods: Vec<String>,
    },

    /// Show version info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = Config::load(cli.config.as_deref())?;

    // Handle Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    match cli.command {
        Commands::Listen { bind, json } => {
            run_listen(config, bind, json, shutdown_rx).await?;
        }

        Commands::Send {
            target,
            address,
            args,
            bundle_delay_ms,
        } => {
            run_send(&target, &address, &args, bundle_delay_ms).await?;
        }

        Commands::Dispatch { bind, methods } => {
            run_dispatch(config, bind, methods, shutdown_rx).await?;
        }

        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender gone: signal handling unavailable, run until killed
            std::future::pending::<()>().await;
        }
    }
}

async fn run_listen(
    mut config: Config,
    bind: Option<String>,
    json: bool,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let server = OscServer::bind(config.server).await?;
    println!(
        "{} Listening on {}",
        "OSC".cyan().bold(),
        server.local_addr()?
    );

    let shutdown = shutdown_signal(shutdown_rx);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = server.recv_from() => match received {
                Ok((packet, from)) => print_packet(&packet, from, json)?,
                Err(TransportError::Timeout) => continue,
                Err(TransportError::Decode(e)) => {
                    warn!("Undecodable datagram: {}", e);
                }
                Err(e) => return Err(e.into()),
            },
            _ = &mut shutdown => break,
        }
    }

    println!("{}", "Listener stopped".yellow());
    Ok(())
}

fn print_packet(packet: &Packet, from: std::net::SocketAddr, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(packet)?);
        return Ok(());
    }

    match packet {
        Packet::Message(msg) => {
            println!("{} {}", from.to_string().dimmed(), msg.to_string().green());
        }
        Packet::Bundle(bundle) => {
            println!(
                "{} {} {}",
                from.to_string().dimmed(),
                "#bundle".cyan(),
                bundle.timetag
            );
            for element in &bundle.elements {
                println!("    {}", element);
            }
        }
    }
    Ok(())
}

async fn run_send(
    target: &str,
    address: &str,
    raw_args: &[String],
    bundle_delay_ms: Option<u64>,
) -> Result<()> {
    let arguments = args::parse_arguments(raw_args)?;
    let message = Message::with_args(address, arguments);

    let packet = match bundle_delay_ms {
        Some(ms) => {
            Packet::Bundle(Bundle::new(Timetag::after(Duration::from_millis(ms))).element(message))
        }
        None => Packet::Message(message),
    };

    let client = OscClient::connect(target).await?;
    client.send(&packet).await?;

    println!("{} {} -> {}", "OK".green().bold(), packet, target.yellow());
    Ok(())
}

async fn run_dispatch(
    mut config: Config,
    bind: Option<String>,
    methods: Vec<String>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let addresses = config.method_addresses(&methods);
    if addresses.is_empty() {
        warn!("No methods registered; every message will be dropped");
    }

    let dispatcher = Dispatcher::with_config(config.dispatcher.clone());
    for address in &addresses {
        let name = address.clone();
        dispatcher
            .add_method(address, move |msg: &Message| {
                println!("{} {}", name.cyan(), msg);
            })
            .with_context(|| format!("Cannot register method {}", address))?;
    }

    let server = OscServer::bind(config.server).await?;
    println!(
        "{} Dispatching {} method(s) on {}",
        "OSC".cyan().bold(),
        dispatcher.len(),
        server.local_addr()?
    );

    server
        .serve_until(dispatcher.clone(), shutdown_signal(shutdown_rx))
        .await?;

    let stats = dispatcher.stats();
    println!("{} {}", "Stats".yellow(), serde_json::to_string(&stats)?);
    Ok(())
}

fn print_info() {
    println!("{}", "oscar - Open Sound Control 1.0".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!("Max packet: {} bytes", oscar_core::MAX_PACKET_SIZE);
    println!();
    println!("{}", "Examples:".green());
    println!("  oscar listen --bind 0.0.0.0:9000");
    println!("  oscar send 127.0.0.1:9000 /synth/1/freq f:440");
    println!("  oscar send 127.0.0.1:9000 /cue/go --bundle-delay-ms 500");
    println!("  oscar dispatch --method /synth/1/freq --method /synth/1/gate");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::parse_from([
            "oscar",
            "send",
            "127.0.0.1:9000",
            "/a/b",
            "i:1",
            "-2",
            "--bundle-delay-ms",
            "250",
        ]);
        match cli.command {
            Commands::Send {
                target,
                address,
                args,
                bundle_delay_ms,
            } => {
                assert_eq!(target, "127.0.0.1:9000");
                assert_eq!(address, "/a/b");
                assert_eq!(args, vec!["i:1", "-2"]);
                assert_eq!(bundle_delay_ms, Some(250));
            }
            _ => panic!("Expected send"),
        }
    }

    #[test]
    fn test_parse_dispatch_methods() {
        let cli = Cli::parse_from(["oscar", "dispatch", "-m", "/x", "--method", "/y"]);
        match cli.command {
            Commands::Dispatch { bind, methods } => {
                assert_eq!(bind, None);
                assert_eq!(methods, vec!["/x", "/y"]);
            }
            _ => panic!("Expected dispatch"),
        }
    }
}
