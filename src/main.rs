//! Chat Session Client - Main entry point
//!
//! A terminal front end that owns one session coordinator: restores the
//! session at startup, then multiplexes typed commands with socket events.
use anyhow::Context;
use chat_session::cli::{self, Command, ConsoleMessages, ConsoleNotifier};
use chat_session::{ClientConfig, HttpAuthService, SessionCoordinator, WsTransport};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chat-session")]
#[command(about = "Chat session client - login, presence and live messages")]
struct Args {
    /// Authentication API base URL
    #[arg(long, default_value = chat_session::config::DEFAULT_API_URL)]
    api: String,

    /// Real-time endpoint (http(s) is rewritten to ws(s))
    #[arg(long, default_value = chat_session::config::DEFAULT_SOCKET_URL)]
    socket: String,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = chat_session::config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose flag
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let config = ClientConfig::new(&args.api, &args.socket)
        .context("invalid endpoint configuration")?
        .with_timeout(Duration::from_secs(args.timeout_secs));

    info!("Starting chat session client");
    info!("API: {}", config.api_base_url);
    info!("Socket: {}", config.socket_url);

    let auth = HttpAuthService::new(&config).context("failed to build HTTP client")?;
    let transport = WsTransport::new(&config);
    let mut coordinator = SessionCoordinator::new(
        auth,
        transport,
        Arc::new(ConsoleNotifier),
        Arc::new(ConsoleMessages),
    );

    if coordinator.check_session().await {
        if let Some(user) = coordinator.auth_user() {
            println!("Welcome back, {}", user.display_name());
        }
    }
    println!("{}", cli::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = cli::read_line_async(&mut lines) => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match cli::parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = cli::execute(&mut coordinator, command).await {
                            eprintln!("{}", e);
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            event = coordinator.next_socket_event() => coordinator.handle_socket_event(event),
        }
    }

    coordinator.disconnect_socket();
    println!("Goodbye!");
    Ok(())
}
