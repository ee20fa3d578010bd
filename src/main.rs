//! Rover Link - teleop front end for the robot controller.
//!
//! Starts the controller link in the background, then either runs an
//! interactive line-based teleop session on stdin or sends a single command
//! and prints its JSON result.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rover_link::config::timeout_from_millis;
use rover_link::teleop::{Submission, Teleop};
use rover_link::{Command, ConnectionState, LinkConfig, LinkHandle};

#[derive(Parser)]
#[command(name = "rover-link", about = "Drive a robot controller over TCP", version)]
struct Cli {
    /// Controller host (overrides ROVER_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Controller port (overrides ROVER_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, global = true)]
    reconnect_ms: Option<u64>,

    /// Per-request timeout in milliseconds (0 waits indefinitely)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "rover_link=info")]
    log_level: String,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive teleop session (default)
    Drive,

    /// Send one command and print the result as JSON
    Send {
        /// Command name, passed through unchanged
        name: String,

        /// Option field as key=value; values are parsed as JSON, else kept as text
        #[arg(long = "opt", value_parser = parse_option)]
        options: Vec<(String, Value)>,

        /// Seconds to wait for the connection before giving up
        #[arg(long, default_value_t = 10)]
        wait_secs: u64,
    },
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_config(cli: &Cli) -> Result<LinkConfig> {
    let mut config = LinkConfig::from_env().context("Invalid link configuration")?;
    if let Some(ref host) = cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ms) = cli.reconnect_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.timeout_ms {
        config.request_timeout = timeout_from_millis(ms);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `send` output stays clean JSON.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("rover_link=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!("Starting rover-link v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&cli)?;
    tracing::info!("Controller endpoint: {}", config.endpoint());
    let link = LinkHandle::spawn(config);

    let result = match cli.mode {
        None | Some(Mode::Drive) => run_drive(&link).await,
        Some(Mode::Send {
            name,
            options,
            wait_secs,
        }) => run_send(&link, name, options, wait_secs).await,
    };

    link.shutdown().await;
    if let Err(ref e) = result {
        tracing::error!("Application error: {}", e);
    }
    result
}

/// Send a single command once the link is up.
async fn run_send(
    link: &LinkHandle,
    name: String,
    options: Vec<(String, Value)>,
    wait_secs: u64,
) -> Result<()> {
    let command = options
        .into_iter()
        .fold(Command::new(name), |cmd, (key, value)| cmd.with(key, value));

    tokio::time::timeout(
        Duration::from_secs(wait_secs),
        link.wait_for_state(ConnectionState::Connected),
    )
    .await
    .map_err(|_| anyhow!("Controller not reachable after {}s", wait_secs))??;

    let result = link.issue_command(command).await;
    println!("{}", serde_json::to_string(&result)?);
    if result.ok {
        Ok(())
    } else {
        Err(anyhow!("Command failed: {}", result.error_text()))
    }
}

/// Interactive teleop loop over stdin.
async fn run_drive(link: &LinkHandle) -> Result<()> {
    let mut teleop = Teleop::new(link.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Commands: forward [speed], backward [speed], left, right, stop, sensors, quit");
    loop {
        let prompt = format!("[{}] > ", teleop.drive_state().direction);
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if matches!(input, "quit" | "exit") {
            break;
        }

        let submission = teleop.submit(input).await;
        render(&submission, link.state());
    }

    // Leave the robot stationary when the operator goes away.
    if link.is_connected() {
        let result = teleop.halt().await;
        if !result.ok {
            tracing::warn!("Final stop failed: {}", result.error_text());
        }
    }
    Ok(())
}

fn render(submission: &Submission, state: ConnectionState) {
    let stamp = chrono::Local::now().format("%H:%M:%S");

    if let Some(ref notice) = submission.notice {
        println!("[{}] {}", stamp, notice);
    }
    if let Some(ref result) = submission.command {
        if result.ok {
            println!("[{}] ok", stamp);
        } else {
            println!("[{}] Error: {} (link {})", stamp, result.error_text(), state);
        }
    }
    match submission.reading() {
        Some(reading) => {
            let distance = reading
                .distance_cm
                .map(|d| format!("{:.1} cm", d))
                .unwrap_or_else(|| "--".to_string());
            let cliff = reading
                .cliff
                .as_ref()
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "--".to_string());
            println!("[{}] distance {} | cliff {}", stamp, distance, cliff);
            if reading.cliff.as_ref().is_some_and(|c| c.is_danger()) {
                println!("[{}] WARNING: cliff detected", stamp);
            }
        }
        None => {
            if let Some(ref telemetry) = submission.telemetry {
                println!("[{}] sensors unavailable: {}", stamp, telemetry.error_text());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_option_values() {
        assert_eq!(parse_option("speed=40").unwrap(), ("speed".to_string(), json!(40)));
        assert_eq!(parse_option("mode=turbo").unwrap(), ("mode".to_string(), json!("turbo")));
        assert_eq!(parse_option("flag=true").unwrap(), ("flag".to_string(), json!(true)));
        assert!(parse_option("speed").is_err());
        assert!(parse_option("=5").is_err());
    }

    #[test]
    fn test_cli_send_mode() {
        let cli = Cli::try_parse_from([
            "rover-link", "--port", "6000", "send", "forward", "--opt", "speed=40", "--opt", "angle=0",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(6000));
        match cli.mode {
            Some(Mode::Send { name, options, .. }) => {
                assert_eq!(name, "forward");
                assert_eq!(options.len(), 2);
            }
            _ => panic!("expected send mode"),
        }
    }
}
