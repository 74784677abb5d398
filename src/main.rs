//! haarc - hash-addressed autonomous routing core
//!
//! Usage:
//!   haarc run --duration-secs 30          simulated pipeline, JSON report on exit
//!   haarc address AUTHENTICATE -c tenant=7 -c region=eu
//!   haarc route E041
//!   haarc --dump-config

use clap::{Parser, Subcommand};
use haarc::config::HaarcConfig;
use haarc_address::{AddressEngine, Segment, UniquenessToken};
use haarc_core::{ContextRecord, ContextValue, OperationCode};
use haarc_dispatch::{Category, DispatchTable, Primitive};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "haarc", about = "Hash-addressed autonomous routing core")]
struct Cli {
    /// Path to config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "haarc.toml")]
    config: PathBuf,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline against simulated collaborators
    Run {
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
    },
    /// Generate the address for one operation
    Address {
        operation: String,
        /// Context attribute as key=value (repeatable)
        #[arg(short, long = "context", value_parser = parse_context_pair)]
        context: Vec<(String, ContextValue)>,
        /// Fixed uniqueness seed; omitted draws a fresh token
        #[arg(long)]
        seed: Option<String>,
    },
    /// Show where an operation code is routed
    Route {
        /// Hex code (E041, 0xE041) or a single character
        #[arg(value_parser = parse_code)]
        code: OperationCode,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", HaarcConfig::default().to_toml());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "haarc=info".into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = HaarcConfig::load(&cli.config);

    match cli.command.unwrap_or(Command::Run { duration_secs: 10 }) {
        Command::Run { duration_secs } => {
            let report = haarc::simulate(&config, Duration::from_secs(duration_secs)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Address {
            operation,
            context,
            seed,
        } => {
            let engine = AddressEngine::new(config.address)?;
            let mut record = ContextRecord::new();
            for (key, value) in context {
                record.insert(key, value);
            }
            let token = match seed {
                Some(s) => UniquenessToken::from_bytes(s.into_bytes()),
                None => UniquenessToken::fresh(),
            };
            let address = engine.generate(&operation, &record, token.as_bytes())?;
            let out = json!({
                "address": address.as_str(),
                "semantic": address.segment(Segment::Semantic),
                "context": address.segment(Segment::Context),
                "unique": address.segment(Segment::Unique),
                "hashes": Segment::ALL
                    .iter()
                    .map(|&s| address.segment_hash(s).map(|h| format!("{h:08x}")))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Route { code } => {
            let table = DispatchTable::from_config(&config.dispatch)?;
            let route = table.route(code);
            let out = json!({
                "code": code.to_string(),
                "primitive": Primitive::from_code(code).map(|p| p.name()),
                "category": Category::of_code(code).map(|c| c.name()),
                "bound": table.is_bound(code),
                "handler": route.handler.as_str(),
                "priority": route.priority,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

fn parse_code(s: &str) -> Result<OperationCode, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("U+"))
        .unwrap_or(s);
    if let Ok(v) = u32::from_str_radix(hex, 16) {
        return Ok(OperationCode::new(v));
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(OperationCode::from_char(c)),
        _ => Err(format!("'{s}' is neither a hex code nor a single character")),
    }
}

fn parse_context_pair(s: &str) -> Result<(String, ContextValue), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err("empty context key".into());
    }
    let value = if let Ok(b) = raw.parse::<bool>() {
        ContextValue::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        ContextValue::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        ContextValue::Float(f)
    } else {
        ContextValue::Text(raw.to_string())
    };
    Ok((key.to_string(), value))
}
