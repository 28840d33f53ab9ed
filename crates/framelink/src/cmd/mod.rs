use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server: answer pings, relay text to every client.
    Serve(ServeArgs),
    /// Connect, send one message and optionally wait for a reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (e.g. 127.0.0.1, 0.0.0.0, ::1).
    pub addr: String,
    /// Port to bind. 0 picks a free port, reported in the `listening` event.
    #[arg(long, short = 'p', default_value = "0")]
    pub port: u16,
    /// Exit after handling N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Close connections beyond this many active clients.
    #[arg(long, value_name = "N")]
    pub max_sessions: Option<usize>,
    /// Drop a partial frame that stalls this long (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub stall_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    #[arg(long, short = 'p')]
    pub port: u16,
    /// Send a Text message with this body.
    #[arg(long, conflicts_with = "ping", required_unless_present = "ping")]
    pub text: Option<String>,
    /// Send a Ping.
    #[arg(long)]
    pub ping: bool,
    /// Sender name carried in Text messages.
    #[arg(long, default_value = "cli")]
    pub from: String,
    /// Wait for one message back and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
