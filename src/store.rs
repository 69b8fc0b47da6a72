// ===============================
// src/store.rs
// ===============================
use std::collections::BTreeSet;

use ahash::AHashMap as HashMap;

use crate::domain::{OrderBook, Trade};
use crate::report::ParsedReport;
use crate::session::ReplaySummary;

/// Latest decoded view per symbol. Symbols not touched by the last replay keep
/// whatever the previous replay wrote for them.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    books: HashMap<String, OrderBook>,
    trades: HashMap<String, Vec<Trade>>,
    last_replay: Option<ReplaySummary>,
}

impl StateStore {
    pub fn update_order_book(&mut self, symbol: &str, book: OrderBook) {
        self.books.insert(symbol.to_string(), book);
    }

    pub fn update_trades(&mut self, symbol: &str, trades: Vec<Trade>) {
        self.trades.insert(symbol.to_string(), trades);
    }

    /// Replace every section present in the report; leave the rest alone.
    pub fn apply(&mut self, report: ParsedReport) {
        for (symbol, book) in report.books {
            self.update_order_book(&symbol, book);
        }
        for (symbol, trades) in report.trades {
            self.update_trades(&symbol, trades);
        }
    }

    pub fn order_book(&self, symbol: &str) -> OrderBook {
        self.books.get(symbol).cloned().unwrap_or_default()
    }

    pub fn trades(&self, symbol: &str) -> Vec<Trade> {
        self.trades.get(symbol).cloned().unwrap_or_default()
    }

    pub fn all_symbols(&self) -> BTreeSet<String> {
        self.books.keys().chain(self.trades.keys()).cloned().collect()
    }

    pub fn set_last_replay(&mut self, summary: ReplaySummary) {
        self.last_replay = Some(summary);
    }

    pub fn last_replay(&self) -> Option<&ReplaySummary> { self.last_replay.as_ref() }

    pub fn clear(&mut self) {
        self.books.clear();
        self.trades.clear();
        self.last_replay = None;
    }
}
