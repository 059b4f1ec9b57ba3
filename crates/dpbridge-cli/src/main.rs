//! Command-line interface for the datapoint bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;

use dpbridge_core::config::env_vars;
use dpbridge_core::{BridgeConfig, EventBus};
use dpbridge_devices::{
    builtin_registry, datapoint, AttributeKey, AttributeValue, CommandSequencer, FamilyRegistry,
    McuDispatcher, McuFrame, Status, Transport, TransportError, TransportRequest,
};

/// Datapoint bridge - inspect and replay vendor MCU frames.
#[derive(Parser, Debug)]
#[command(name = "dpbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bridge configuration file (JSON). Defaults to environment settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a frame given as hex.
    Decode {
        /// Frame bytes in hex.
        hex: String,
        /// Treat the input as bare records without the frame header.
        #[arg(long)]
        records: bool,
    },
    /// List the built-in device families.
    Families,
    /// Feed frames through a family's dispatcher and print what comes out.
    Replay {
        /// Device family name.
        #[arg(short, long)]
        family: String,
        /// Frames in hex, processed in order.
        #[arg(required = true)]
        frames: Vec<String>,
    },
    /// Encode an attribute write into an outbound command.
    Encode {
        /// Device family name.
        #[arg(short, long)]
        family: String,
        /// Cluster name, e.g. "thermostat".
        #[arg(short, long)]
        cluster: String,
        /// Attribute id, decimal or 0x-prefixed hex.
        #[arg(short, long, value_parser = parse_u16)]
        attribute: u16,
        /// Attribute value as JSON, e.g. '{"Integer": 2500}'.
        #[arg(long)]
        value: String,
        /// Session sequence number to put on the command.
        #[arg(short, long, default_value_t = 1)]
        sequence: u16,
        /// Manufacturer code requested by the caller.
        #[arg(short, long, value_parser = parse_u16)]
        manufacturer: Option<u16>,
    },
}

/// Acknowledges every request without sending anything.
struct LoopbackTransport;

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: TransportRequest) -> Result<Status, TransportError> {
        tracing::debug!(
            sequence = request.sequence,
            payload = %hex::encode(&request.payload),
            "Loopback send"
        );
        Ok(Status::Success)
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if args.verbose { "dpbridge=debug" } else { "dpbridge=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Decode { hex, records } => run_decode(&hex, records),
        Command::Families => run_families(),
        Command::Replay { family, frames } => {
            let config = load_config(args.config.as_deref())?;
            run_replay(&config, &family, &frames)
        }
        Command::Encode {
            family,
            cluster,
            attribute,
            value,
            sequence,
            manufacturer,
        } => {
            let value: AttributeValue =
                serde_json::from_str(&value).context("Invalid attribute value JSON")?;
            let key = AttributeKey::new(cluster, attribute);
            let config = load_config(args.config.as_deref())?;
            run_encode(&config, &family, key, value, sequence, manufacturer).await
        }
    }
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid 16-bit number '{}': {}", s, e))
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).with_context(|| format!("Invalid hex input '{}'", input))
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => BridgeConfig::from_env().context("Invalid bridge configuration"),
    }
}

fn load_registry() -> Result<FamilyRegistry> {
    builtin_registry().context("Failed to build the family registry")
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_decode(input: &str, records_only: bool) -> Result<()> {
    let raw = parse_hex(input)?;
    if records_only {
        let records = datapoint::decode(&raw).context("Failed to decode records")?;
        print_json(&records)
    } else {
        let frame = McuFrame::decode(&raw).context("Failed to decode frame")?;
        print_json(&frame)
    }
}

fn run_families() -> Result<()> {
    let registry = load_registry()?;
    for family in registry.iter() {
        println!(
            "{:<20} {:>3} datapoints {:>3} devices  {}",
            family.name,
            family.table.len(),
            family.applies_to.len(),
            family.description
        );
    }
    Ok(())
}

fn session(
    config: &BridgeConfig,
    family_name: &str,
    last_sequence: u16,
) -> Result<(McuDispatcher, dpbridge_core::EventBusReceiver)> {
    let registry = load_registry()?;
    let family = registry
        .get(family_name)
        .with_context(|| format!("Unknown device family '{}'", family_name))?;

    let sequencer = CommandSequencer::new(Arc::new(LoopbackTransport), config)
        .with_last_sequence(last_sequence);
    let bus = Arc::new(EventBus::with_capacity(config.event_channel_capacity));
    let receiver = bus.subscribe();

    let dispatcher = McuDispatcher::new("cli", 1, family, Arc::new(sequencer), bus);
    Ok((dispatcher, receiver))
}

fn run_replay(config: &BridgeConfig, family: &str, frames: &[String]) -> Result<()> {
    let (dispatcher, mut events) = session(config, family, 0)?;

    for (index, input) in frames.iter().enumerate() {
        let raw = parse_hex(input)?;
        let report = dispatcher.handle_incoming_report(&raw);
        print_json(&json!({
            "frame": index,
            "report": report,
            "events": events.drain(),
        }))?;
    }

    let attributes: Vec<_> = dispatcher
        .reported_values()
        .into_iter()
        .map(|(key, value)| json!({ "attribute": key.to_string(), "value": value }))
        .collect();
    print_json(&json!({ "attributes": attributes }))
}

async fn run_encode(
    config: &BridgeConfig,
    family: &str,
    key: AttributeKey,
    value: AttributeValue,
    sequence: u16,
    manufacturer: Option<u16>,
) -> Result<()> {
    let (dispatcher, _events) = session(config, family, sequence.wrapping_sub(1))?;
    let command = dispatcher
        .handle_outgoing(&key, &value, manufacturer)
        .await
        .with_context(|| format!("Failed to encode write to {}", key))?;
    print_json(&command)
}
