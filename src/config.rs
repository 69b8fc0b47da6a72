// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : orderbook_relay — replay-driven web front end for a batch order
          matching engine
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Keeps an append-only command log, replays it through the engine
          binary on every request, decodes the text report back into order
          books / trades, serves them as JSON, exposes Prometheus metrics,
          and records JSONL session events.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{PriceBand, Symbol};
use crate::engine::EngineCfg;
use crate::report::SideInference;

const DEFAULT_SEED_BANDS: &str = "RELIANCE:2000.0:5.0,INFY:1500.0:10.0,TATASTEEL:800.0:20.0";

/// CLI flags; each one overrides the matching ENV key.
#[derive(Parser, Debug, Default)]
#[command(name = "orderbook_relay", version, about = "Replay front end for the order matching engine")]
pub struct Cli {
    /// Engine binary (ENV: ENGINE_PATH)
    #[arg(long)]
    pub engine: Option<PathBuf>,
    /// HTTP port (ENV: HTTP_PORT)
    #[arg(long)]
    pub port: Option<u16>,
    /// Engine timeout in ms (ENV: ENGINE_TIMEOUT_MS)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// sections | legacy (ENV: SIDE_INFERENCE)
    #[arg(long)]
    pub side_inference: Option<String>,
    /// JSONL event record (ENV: RECORD_FILE)
    #[arg(long)]
    pub record_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub engine: EngineCfg,
    pub http_port: u16,
    pub seed_bands: Vec<PriceBand>,
    pub side_inference: SideInference,
    pub record_file: Option<String>,
}

/// `SYMBOL:reference:band` -> PriceBand
pub fn parse_band(entry: &str) -> Option<PriceBand> {
    let mut it = entry.trim().split(':');
    let symbol = Symbol::parse(it.next()?).ok()?;
    let reference_price = Decimal::from_str(it.next()?.trim()).ok()?;
    let band_percent = Decimal::from_str(it.next()?.trim()).ok()?;
    if it.next().is_some() {
        return None;
    }
    Some(PriceBand { symbol, reference_price, band_percent })
}

/// SEED_BANDS=RELIANCE:2000.0:5.0,INFY:1500.0:10.0 (invalid entries are skipped)
pub fn parse_seed_bands(list: &str) -> Vec<PriceBand> {
    list.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .filter_map(|x| {
            let band = parse_band(x);
            if band.is_none() {
                warn!(entry = %x, "SEED_BANDS: invalid entry, skipped");
            }
            band
        })
        .collect()
}

pub fn load() -> Args {
    load_with(Cli::parse())
}

pub fn load_with(cli: Cli) -> Args {
    // Pastikan .env dibaca sebelum ENV dibaca
    let _ = dotenv();

    // ===== Engine =====
    let program = cli
        .engine
        .or_else(|| env::var("ENGINE_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./cpp_src/orderbook"));
    // ENGINE_ARGS="-c ..." -> diletakkan sebelum path script
    let args: Vec<String> = env::var("ENGINE_ARGS")
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    let timeout_ms = cli
        .timeout_ms
        .or_else(|| env::var("ENGINE_TIMEOUT_MS").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(10_000);
    let script_dir = env::var("SCRIPT_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from);

    let engine = EngineCfg { program, args, timeout: Duration::from_millis(timeout_ms), script_dir };

    // ===== HTTP =====
    let http_port = cli
        .port
        .or_else(|| env::var("HTTP_PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(5000);

    // ===== Seed =====
    let seed_bands = parse_seed_bands(
        &env::var("SEED_BANDS").unwrap_or_else(|_| DEFAULT_SEED_BANDS.to_string()),
    );

    // ===== Parser =====
    let side_inference = cli
        .side_inference
        .or_else(|| env::var("SIDE_INFERENCE").ok())
        .map(|s| {
            SideInference::parse(&s).unwrap_or_else(|| {
                warn!(value = %s, "SIDE_INFERENCE: unknown value, using sections");
                SideInference::default()
            })
        })
        .unwrap_or_default();

    let record_file = cli.record_file.or_else(|| env::var("RECORD_FILE").ok());

    Args { engine, http_port, seed_bands, side_inference, record_file }
}
