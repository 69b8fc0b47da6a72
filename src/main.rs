// ===============================
// src/main.rs
// ===============================
/*
 # jalankan (engine default: ./cpp_src/orderbook)
 ENGINE_PATH=./cpp_src/orderbook HTTP_PORT=5000 cargo run --release

 # pasang order lalu lihat hasil replay
curl -s -XPOST localhost:5000/place_order \
     -d 'order_type=BUY&order_variant=LIMIT&price=2005&quantity=10&symbol=RELIANCE'
curl -s localhost:5000/api/orderbook/RELIANCE
curl -s localhost:5000/metrics | grep '^engine_runs_total'

*/
/*
=============================================================================
Project : orderbook_relay — replay-driven web front end for a batch order
          matching engine
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Keeps an append-only command log, replays it through the engine
          binary on every request, decodes the text report back into order
          books / trades, serves them as JSON, exposes Prometheus metrics,
          and records JSONL session events.
=============================================================================
*/
mod config;
mod domain;
mod engine;    // engine process driver (staged script + timeout)
mod error;
mod http;
mod metrics;
mod protocol;  // command log + script encoder
mod recorder;
mod report;    // engine stdout parser
mod session;   // single-writer replay actor
mod store;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::engine::EngineDriver;
use crate::recorder::Event;
use crate::session::{Session, SessionHandle};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let args = config::load();

    // ---- Metrics ----
    metrics::init();

    info!(
        engine = %args.engine.program.display(),
        engine_args = ?args.engine.args,
        timeout_ms = args.engine.timeout.as_millis() as u64,
        http_port = args.http_port,
        seed = ?args.seed_bands.iter().map(|b| b.symbol.as_str()).collect::<Vec<_>>(),
        side_inference = ?args.side_inference,
        "startup config"
    );
    if args.seed_bands.is_empty() {
        error!("no valid seed price bands, engine starts from its own defaults only");
    }

    // ---- Recorder (optional) ----
    let rec_tx = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(1024);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Session ----
    let session = Session::new(
        &args.seed_bands,
        EngineDriver::new(args.engine.clone()),
        args.side_inference,
        rec_tx,
    );
    let handle = SessionHandle::spawn(session);

    // ---- HTTP ----
    tokio::select! {
        res = http::serve(args.http_port, handle) => {
            if let Err(e) = res {
                error!(?e, "http server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c, shutting down");
        }
    }
}
