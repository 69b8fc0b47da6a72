// ===============================
// src/session.rs (replay session actor)
// ===============================
//
// Satu task memiliki CommandLog + StateStore + EngineDriver. Semua mutasi
// (append -> encode -> run engine -> parse -> update store) diproses
// berurutan dari satu antrean mpsc, jadi tidak ada replay yang saling tumpang.
// Pembaca cukup melihat snapshot terakhir lewat `watch`.
//
use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::domain::{Command, OrderBook, OrderVariant, PriceBand, Side, Symbol, Trade};
use crate::engine::EngineDriver;
use crate::error::ReplayError;
use crate::metrics::{COMMAND_LOG_LEN, ORDERS_SUBMITTED, REPORT_ISSUES, SESSION_RESETS};
use crate::protocol::{encode, view_queries, CommandLog};
use crate::recorder::Event;
use crate::report::{self, ReportIssue, SideInference};
use crate::store::StateStore;

/// Diagnostics of one replay, kept next to the decoded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub symbol: Symbol,
    pub commands: usize,
    pub unrecognized_lines: usize,
    pub issues: Vec<ReportIssue>,
    pub engine_stderr: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub side: Side,
    pub variant: OrderVariant,
    /// `None` for MARKET orders; rendered as `0.0`.
    pub price: Option<Decimal>,
    pub quantity: u64,
    pub symbol: Symbol,
}

pub struct Session {
    log: CommandLog,
    store: StateStore,
    driver: EngineDriver,
    side_mode: SideInference,
    snap_tx: watch::Sender<Arc<StateStore>>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl Session {
    pub fn new(
        seed: &[PriceBand],
        driver: EngineDriver,
        side_mode: SideInference,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> Self {
        let (snap_tx, _) = watch::channel(Arc::new(StateStore::default()));
        let log = CommandLog::new(seed);
        COMMAND_LOG_LEN.set(log.len() as i64);
        Self { log, store: StateStore::default(), driver, side_mode, snap_tx, rec_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StateStore>> { self.snap_tx.subscribe() }

    pub fn commands(&self) -> &[Command] { self.log.snapshot() }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }

    fn append(&mut self, cmd: Command) -> Result<(), ReplayError> {
        let line = cmd.to_string();
        self.log.append(cmd.clone())?;
        COMMAND_LOG_LEN.set(self.log.len() as i64);
        info!(%line, log_len = self.log.len(), "command appended");
        self.record(Event::CommandAppended { line, command: cmd });
        Ok(())
    }

    pub async fn submit_order(&mut self, req: OrderRequest) -> Result<ReplaySummary, ReplayError> {
        ORDERS_SUBMITTED.with_label_values(&[req.side.as_str(), req.variant.as_str()]).inc();
        let symbol = req.symbol.clone();
        self.append(Command::PlaceOrder {
            side: req.side,
            variant: req.variant,
            price: req.price,
            quantity: req.quantity,
            symbol: req.symbol,
        })?;
        self.replay(&symbol).await
    }

    pub async fn cancel_order(&mut self, order_id: u64, symbol: Symbol) -> Result<ReplaySummary, ReplayError> {
        self.append(Command::CancelOrder { order_id })?;
        self.replay(&symbol).await
    }

    pub async fn view_symbol(&mut self, symbol: Symbol) -> Result<ReplaySummary, ReplayError> {
        self.replay(&symbol).await
    }

    /// Back to the seed bands, no decoded state. Calling it twice changes nothing.
    pub fn reset(&mut self) {
        self.log.reset();
        self.store.clear();
        self.publish();
        SESSION_RESETS.inc();
        COMMAND_LOG_LEN.set(self.log.len() as i64);
        info!(log_len = self.log.len(), "session reset to seed");
        self.record(Event::SessionReset { log_len: self.log.len() });
    }

    fn publish(&self) {
        self.snap_tx.send_replace(Arc::new(self.store.clone()));
    }

    async fn replay(&mut self, symbol: &Symbol) -> Result<ReplaySummary, ReplayError> {
        let result = self.replay_inner(symbol).await;
        if let Err(e) = &result {
            error!(%symbol, code = e.code(), %e, "replay failed");
            self.record(Event::ReplayFailed { symbol: symbol.clone(), code: e.code(), message: e.to_string() });
        }
        result
    }

    async fn replay_inner(&mut self, symbol: &Symbol) -> Result<ReplaySummary, ReplayError> {
        let script = encode(self.log.snapshot(), &view_queries(symbol));
        let out = self.driver.run(&script).await?;

        let parsed = report::parse(&out.stdout, self.side_mode);
        if !parsed.books.contains_key(symbol.as_str()) || !parsed.trades.contains_key(symbol.as_str()) {
            return Err(ReplayError::MalformedReport(format!(
                "report has no order book / trade history section for {symbol}"
            )));
        }

        let engine_stderr: Vec<String> =
            out.stderr.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();
        for line in &engine_stderr {
            warn!(%symbol, line = %line, "engine stderr");
        }
        for issue in &parsed.issues {
            let kind = match issue {
                ReportIssue::Malformed(_) => "malformed",
                ReportIssue::SideAssumed { .. } => "side_assumed",
            };
            REPORT_ISSUES.with_label_values(&[kind]).inc();
        }
        REPORT_ISSUES
            .with_label_values(&["unrecognized"])
            .inc_by(parsed.unrecognized_lines as u64);

        let summary = ReplaySummary {
            symbol: symbol.clone(),
            commands: self.log.len(),
            unrecognized_lines: parsed.unrecognized_lines,
            issues: parsed.issues.clone(),
            engine_stderr,
            elapsed_ms: out.elapsed.as_millis() as u64,
        };

        self.store.apply(parsed);
        self.store.set_last_replay(summary.clone());
        self.publish();

        info!(
            %symbol,
            exit = %out.status,
            commands = summary.commands,
            unrecognized = summary.unrecognized_lines,
            issues = summary.issues.len(),
            elapsed_ms = summary.elapsed_ms,
            "replay done"
        );
        self.record(Event::ReplayFinished(summary.clone()));
        Ok(summary)
    }
}

// ---- Actor ----
type Reply<T> = oneshot::Sender<T>;

pub enum Request {
    Submit { order: OrderRequest, reply: Reply<Result<ReplaySummary, ReplayError>> },
    Cancel { order_id: u64, symbol: Symbol, reply: Reply<Result<ReplaySummary, ReplayError>> },
    View { symbol: Symbol, reply: Reply<Result<ReplaySummary, ReplayError>> },
    Reset { reply: Reply<()> },
    Commands { reply: Reply<Vec<String>> },
}

/// Task session: proses request satu per satu sampai semua handle di-drop.
pub async fn run(mut session: Session, mut rx: mpsc::Receiver<Request>) {
    info!(log_len = session.commands().len(), "session: started");
    while let Some(req) = rx.recv().await {
        match req {
            Request::Submit { order, reply } => {
                let _ = reply.send(session.submit_order(order).await);
            }
            Request::Cancel { order_id, symbol, reply } => {
                let _ = reply.send(session.cancel_order(order_id, symbol).await);
            }
            Request::View { symbol, reply } => {
                let _ = reply.send(session.view_symbol(symbol).await);
            }
            Request::Reset { reply } => {
                session.reset();
                let _ = reply.send(());
            }
            Request::Commands { reply } => {
                let _ = reply.send(session.commands().iter().map(|c| c.to_string()).collect());
            }
        }
    }
    info!("session: all handles dropped, stopped");
}

/// Cheap, cloneable entry point for request handlers.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Request>,
    snap_rx: watch::Receiver<Arc<StateStore>>,
}

impl SessionHandle {
    pub fn spawn(session: Session) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let snap_rx = session.subscribe();
        tokio::spawn(run(session, rx));
        Self { tx, snap_rx }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, ReplayError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| ReplayError::SessionClosed)?;
        rx.await.map_err(|_| ReplayError::SessionClosed)
    }

    pub async fn submit_order(&self, order: OrderRequest) -> Result<ReplaySummary, ReplayError> {
        self.call(|reply| Request::Submit { order, reply }).await?
    }

    pub async fn cancel_order(&self, order_id: u64, symbol: Symbol) -> Result<ReplaySummary, ReplayError> {
        self.call(|reply| Request::Cancel { order_id, symbol, reply }).await?
    }

    pub async fn view_symbol(&self, symbol: Symbol) -> Result<ReplaySummary, ReplayError> {
        self.call(|reply| Request::View { symbol, reply }).await?
    }

    pub async fn reset_session(&self) -> Result<(), ReplayError> {
        self.call(|reply| Request::Reset { reply }).await
    }

    pub async fn commands(&self) -> Result<Vec<String>, ReplayError> {
        self.call(|reply| Request::Commands { reply }).await
    }

    pub fn get_order_book(&self, symbol: &str) -> OrderBook {
        self.snap_rx.borrow().order_book(symbol)
    }

    pub fn get_trades(&self, symbol: &str) -> Vec<Trade> {
        self.snap_rx.borrow().trades(symbol)
    }

    pub fn list_known_symbols(&self) -> BTreeSet<String> {
        self.snap_rx.borrow().all_symbols()
    }

    pub fn last_replay(&self) -> Option<ReplaySummary> {
        self.snap_rx.borrow().last_replay().cloned()
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::engine::tests::sh_engine;
    use std::str::FromStr;

    // Tiny stand-in engine: every place_order for the viewed symbol rests on
    // its side unless cancelled; ids count all orders in the script.
    pub(crate) const FAKE_ENGINE: &str = r#"
sym=$(awk '$1=="print_orderbook"{print $2}' "$1")
echo "Starting Stock Market Order Matching System with Circuit Breakers..."
echo "Order Book for $sym:"
echo "-------------------"
for want in BUY SELL; do
  if [ "$want" = BUY ]; then echo "Buy Orders (highest first):"; else echo "Sell Orders (lowest first):"; fi
  id=0
  grep '^place_order' "$1" | while read -r cmd side variant price qty s; do
    id=$((id+1))
    [ "$s" = "$sym" ] || continue
    [ "$side" = "$want" ] || continue
    grep -q "^cancel_order $id\$" "$1" && continue
    echo "Price: \$$price, Qty: $qty, ID: $id, Type: $variant, Status: ACTIVE, Time: $(date +%s%N)"
  done
done
echo "Trade History for $sym:"
echo "------------------------"
"#;

    fn seed() -> Vec<PriceBand> {
        ["RELIANCE:2000.0:5.0", "INFY:1500.0:10.0", "TATASTEEL:800.0:20.0"]
            .iter()
            .map(|s| {
                let p: Vec<&str> = s.split(':').collect();
                PriceBand {
                    symbol: Symbol::parse(p[0]).unwrap(),
                    reference_price: Decimal::from_str(p[1]).unwrap(),
                    band_percent: Decimal::from_str(p[2]).unwrap(),
                }
            })
            .collect()
    }

    pub(crate) fn session(body: &str, dir: &std::path::Path) -> Session {
        Session::new(&seed(), sh_engine(body, dir, 5_000), SideInference::Sections, None)
    }

    fn order(side: Side, price: &str, qty: u64, symbol: &str) -> OrderRequest {
        OrderRequest {
            side,
            variant: OrderVariant::Limit,
            price: Some(Decimal::from_str(price).unwrap()),
            quantity: qty,
            symbol: Symbol::parse(symbol).unwrap(),
        }
    }

    fn sym(s: &str) -> Symbol { Symbol::parse(s).unwrap() }

    fn without_times(mut book: OrderBook) -> OrderBook {
        for o in book.buy_orders.iter_mut().chain(book.sell_orders.iter_mut()) {
            o.timestamp.clear();
        }
        book
    }

    #[tokio::test]
    async fn submit_replays_and_decodes_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(FAKE_ENGINE, dir.path());
        s.submit_order(order(Side::Buy, "2005.00", 10, "RELIANCE")).await.unwrap();
        let summary = s.submit_order(order(Side::Sell, "2010.00", 4, "RELIANCE")).await.unwrap();

        assert_eq!(summary.commands, 5);
        assert!(summary.issues.is_empty());
        assert_eq!(summary.unrecognized_lines, 1);

        let book = s.store.order_book("RELIANCE");
        assert_eq!(book.buy_orders.len(), 1);
        assert_eq!(book.buy_orders[0].id, 1);
        assert_eq!(book.buy_orders[0].price, Decimal::from_str("2005").unwrap());
        assert_eq!(book.sell_orders.len(), 1);
        assert_eq!(book.sell_orders[0].id, 2);
        assert_eq!(book.sell_orders[0].quantity, 4);
    }

    #[tokio::test]
    async fn replay_is_deterministic_apart_from_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(FAKE_ENGINE, dir.path());
        s.submit_order(order(Side::Buy, "1490.5", 3, "INFY")).await.unwrap();
        s.submit_order(order(Side::Sell, "1510", 2, "INFY")).await.unwrap();

        s.view_symbol(sym("INFY")).await.unwrap();
        let first = without_times(s.store.order_book("INFY"));
        s.view_symbol(sym("INFY")).await.unwrap();
        let second = without_times(s.store.order_book("INFY"));
        assert_eq!(first, second);
        assert_eq!(s.store.trades("INFY"), Vec::new());
    }

    #[tokio::test]
    async fn cancel_is_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(FAKE_ENGINE, dir.path());
        s.submit_order(order(Side::Buy, "800", 1, "TATASTEEL")).await.unwrap();
        s.submit_order(order(Side::Buy, "801", 1, "TATASTEEL")).await.unwrap();
        s.cancel_order(1, sym("TATASTEEL")).await.unwrap();

        let book = s.store.order_book("TATASTEEL");
        assert_eq!(book.buy_orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(s.commands().last(), Some(&Command::CancelOrder { order_id: 1 }));
    }

    #[tokio::test]
    async fn reset_twice_equals_reset_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(FAKE_ENGINE, dir.path());
        let seed_lines: Vec<String> = s.commands().iter().map(|c| c.to_string()).collect();
        s.submit_order(order(Side::Buy, "2000", 1, "RELIANCE")).await.unwrap();

        s.reset();
        let once: Vec<String> = s.commands().iter().map(|c| c.to_string()).collect();
        s.reset();
        let twice: Vec<String> = s.commands().iter().map(|c| c.to_string()).collect();

        assert_eq!(once, seed_lines);
        assert_eq!(twice, seed_lines);
        assert_eq!(seed_lines.len(), 3);
        assert!(s.store.all_symbols().is_empty());
        assert_eq!(s.store.order_book("RELIANCE"), OrderBook::default());
        assert!(s.store.last_replay().is_none());
    }

    #[tokio::test]
    async fn known_symbols_only_come_from_queries() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(FAKE_ENGINE, dir.path());
        s.submit_order(order(Side::Buy, "2000", 1, "RELIANCE")).await.unwrap();
        s.submit_order(order(Side::Sell, "1500", 1, "INFY")).await.unwrap();

        let known = s.store.all_symbols();
        assert!(known.iter().all(|k| k == "RELIANCE" || k == "INFY"), "{known:?}");
        assert!(!known.contains("TATASTEEL"));
        assert_eq!(s.store.order_book("UNSEEN"), OrderBook::default());
    }

    #[tokio::test]
    async fn failed_engine_keeps_command_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut ok = session(FAKE_ENGINE, dir.path());
        ok.submit_order(order(Side::Buy, "2000", 1, "RELIANCE")).await.unwrap();
        let before = ok.store.order_book("RELIANCE");

        // swap in a broken engine, same log/store
        ok.driver = sh_engine("echo boom >&2; exit 2", dir.path(), 5_000);
        let err = ok.submit_order(order(Side::Buy, "2001", 1, "RELIANCE")).await.unwrap_err();
        assert!(matches!(err, ReplayError::EngineInvocation(_)));
        assert_eq!(ok.commands().len(), 5);
        assert_eq!(ok.store.order_book("RELIANCE"), before);
    }

    #[tokio::test]
    async fn silent_engine_is_malformed_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session("echo 'nothing to see'", dir.path());
        let err = s.view_symbol(sym("INFY")).await.unwrap_err();
        assert!(matches!(err, ReplayError::MalformedReport(_)));
        assert!(s.store.all_symbols().is_empty());
    }

    #[tokio::test]
    async fn stderr_lines_land_in_summary() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("echo 'Unknown command: foo' >&2\n{FAKE_ENGINE}");
        let mut s = session(&body, dir.path());
        let summary = s.view_symbol(sym("INFY")).await.unwrap();
        assert_eq!(summary.engine_stderr, vec!["Unknown command: foo".to_string()]);
    }

    #[tokio::test]
    async fn handle_serializes_concurrent_submits() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SessionHandle::spawn(session(FAKE_ENGINE, dir.path()));

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let h = handle.clone();
            tasks.push(tokio::spawn(async move {
                h.submit_order(order(Side::Buy, "2000", i + 1, "RELIANCE")).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(handle.commands().await.unwrap().len(), 3 + 8);
        handle.view_symbol(sym("RELIANCE")).await.unwrap();
        let book = handle.get_order_book("RELIANCE");
        assert_eq!(book.buy_orders.len(), 8);
        let mut ids: Vec<u64> = book.buy_orders.iter().map(|o| o.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());

        assert_eq!(handle.get_order_book("UNSEEN"), OrderBook::default());
        assert!(handle.get_trades("UNSEEN").is_empty());
        assert_eq!(handle.list_known_symbols().into_iter().collect::<Vec<_>>(), vec!["RELIANCE"]);
        assert_eq!(handle.last_replay().map(|r| r.commands), Some(11));

        handle.reset_session().await.unwrap();
        handle.reset_session().await.unwrap();
        assert!(handle.list_known_symbols().is_empty());
        assert_eq!(handle.commands().await.unwrap().len(), 3);
    }
}
