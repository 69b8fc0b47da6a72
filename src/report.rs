// ===============================
// src/report.rs (engine stdout -> order books / trades)
// ===============================
//
// Line-oriented state machine:
//   Idle -> InOrderBook(sym) on "Order Book for <sym>:"
//        -> InTrades(sym)    on "Trade History for <sym>:"
// Entering a section replaces (never merges) that symbol's data.
//
// Bad records are skipped and reported in `issues`; only unreadable output
// as a whole is an error (see `session`).
//
use std::str::FromStr;

use ahash::AHashMap as HashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Order, OrderBook, Side, Trade};

const ORDER_BOOK_HDR: &str = "Order Book for ";
const TRADES_HDR: &str = "Trade History for ";
const BUY_HDR: &str = "Buy Orders";
const SELL_HDR: &str = "Sell Orders";
const ORDER_PREFIX: &str = "Price: $";
const TRADE_PREFIX: &str = "Time: ";

/// How a `Price:` line is assigned to a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SideInference {
    /// Last "Buy Orders"/"Sell Orders" heading seen inside the current order book section.
    #[default]
    Sections,
    /// Old behaviour: line text found between the first "Buy Orders" and the next
    /// "Sell Orders" of the whole report => buy, otherwise sell.
    Legacy,
}

impl SideInference {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sections" | "section" => Some(SideInference::Sections),
            "legacy" | "substring" => Some(SideInference::Legacy),
            _ => None,
        }
    }
}

/// One record that could not be decoded. Never turned into a zero value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("line {line_no}: field `{field}` has bad value {value:?}")]
pub struct MalformedRecord {
    pub line_no: usize,
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReportIssue {
    Malformed(MalformedRecord),
    /// Order line before any side heading; kept as buy.
    SideAssumed { line_no: usize },
}

#[derive(Debug, Default)]
pub struct ParsedReport {
    pub books: HashMap<String, OrderBook>,
    pub trades: HashMap<String, Vec<Trade>>,
    pub issues: Vec<ReportIssue>,
    pub unrecognized_lines: usize,
}

enum Section {
    Idle,
    OrderBook { symbol: String, side: Option<Side> },
    Trades { symbol: String },
}

fn section_symbol<'a>(line: &'a str, hdr: &str) -> &'a str {
    line[hdr.len()..].trim().trim_matches(':')
}

fn is_decoration(line: &str) -> bool {
    line.chars().all(|c| c == '-' || c == '=')
}

/// Split "K: v, K: v, ..." into (key, value) pairs; unkeyed pieces are dropped.
fn fields(line: &str) -> Vec<(&str, &str)> {
    line.split(", ")
        .filter_map(|part| part.split_once(": "))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

struct Fields<'a> {
    pairs: Vec<(&'a str, &'a str)>,
    line_no: usize,
}

impl<'a> Fields<'a> {
    fn text(&self, key: &str) -> String {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string()).unwrap_or_default()
    }

    fn num<T: FromStr>(&self, key: &'static str) -> Result<T, MalformedRecord> {
        let raw = self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        let raw = raw.ok_or_else(|| MalformedRecord { line_no: self.line_no, field: key, value: String::new() })?;
        raw.parse::<T>()
            .map_err(|_| MalformedRecord { line_no: self.line_no, field: key, value: raw.to_string() })
    }

    fn price(&self, key: &'static str) -> Result<Decimal, MalformedRecord> {
        let raw = self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v).unwrap_or("");
        let digits = raw.trim_start_matches('$');
        if digits.is_empty() {
            return Err(MalformedRecord { line_no: self.line_no, field: key, value: raw.to_string() });
        }
        Decimal::from_str(digits)
            .or_else(|_| Decimal::from_scientific(digits))
            .map_err(|_| MalformedRecord { line_no: self.line_no, field: key, value: raw.to_string() })
    }
}

fn parse_order(line: &str, line_no: usize, side: Side) -> Result<Order, MalformedRecord> {
    let f = Fields { pairs: fields(line), line_no };
    Ok(Order {
        price: f.price("Price")?,
        quantity: f.num("Qty")?,
        id: f.num("ID")?,
        side,
        order_type: f.text("Type"),
        status: f.text("Status"),
        timestamp: f.text("Time"),
    })
}

fn parse_trade(line: &str, line_no: usize) -> Result<Trade, MalformedRecord> {
    let f = Fields { pairs: fields(line), line_no };
    Ok(Trade {
        timestamp: f.text("Time"),
        quantity: f.num("Qty")?,
        price: f.price("Price")?,
        buy_order_id: f.num("Buy ID")?,
        sell_order_id: f.num("Sell ID")?,
    })
}

/// Region of the whole report that the legacy heuristic treats as "buy side".
fn legacy_buy_region(report: &str) -> Option<&str> {
    if !report.contains(BUY_HDR) || !report.contains(SELL_HDR) {
        return None;
    }
    let after_buy = report.split(BUY_HDR).nth(1)?;
    after_buy.split(SELL_HDR).next()
}

pub fn parse(report: &str, mode: SideInference) -> ParsedReport {
    let mut out = ParsedReport::default();
    let mut section = Section::Idle;
    let legacy_region = legacy_buy_region(report);

    for (idx, raw) in report.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || is_decoration(line) {
            continue;
        }

        if line.starts_with(ORDER_BOOK_HDR) {
            let symbol = section_symbol(line, ORDER_BOOK_HDR).to_string();
            out.books.insert(symbol.clone(), OrderBook::default());
            section = Section::OrderBook { symbol, side: None };
            continue;
        }
        if line.starts_with(TRADES_HDR) {
            let symbol = section_symbol(line, TRADES_HDR).to_string();
            out.trades.insert(symbol.clone(), Vec::new());
            section = Section::Trades { symbol };
            continue;
        }

        match &mut section {
            Section::OrderBook { side, .. } if line.starts_with(BUY_HDR) => *side = Some(Side::Buy),
            Section::OrderBook { side, .. } if line.starts_with(SELL_HDR) => *side = Some(Side::Sell),
            Section::OrderBook { symbol, side } if line.starts_with(ORDER_PREFIX) => {
                let resolved = match mode {
                    SideInference::Sections => *side,
                    SideInference::Legacy => legacy_region
                        .map(|region| if region.contains(line) { Side::Buy } else { Side::Sell }),
                };
                let side = resolved.unwrap_or_else(|| {
                    out.issues.push(ReportIssue::SideAssumed { line_no });
                    Side::Buy
                });
                match parse_order(line, line_no, side) {
                    Ok(order) => out.books.entry(symbol.clone()).or_default().push(order),
                    Err(e) => {
                        warn!(symbol = %symbol, %e, "skip malformed order line");
                        out.issues.push(ReportIssue::Malformed(e));
                    }
                }
            }
            Section::Trades { symbol } if line.starts_with(TRADE_PREFIX) => match parse_trade(line, line_no) {
                Ok(trade) => out.trades.entry(symbol.clone()).or_default().push(trade),
                Err(e) => {
                    warn!(symbol = %symbol, %e, "skip malformed trade line");
                    out.issues.push(ReportIssue::Malformed(e));
                }
            },
            _ => {
                debug!(line_no, line, "unrecognized report line");
                out.unrecognized_lines += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "\
Starting Stock Market Order Matching System with Circuit Breakers...
Order Placed: BUY LIMIT 10 RELIANCE @ $2005.00 (ID: 1)

Order Book for RELIANCE:
-------------------
Buy Orders (highest first):
Price: $2005.00, Qty: 10, ID: 1, Type: LIMIT, Status: OPEN, Time: T1

Sell Orders (lowest first):
Price: $2010.00, Qty: 4, ID: 2, Type: LIMIT, Status: OPEN, Time: T3

Trade History for RELIANCE:
------------------------
Time: T2, Qty: 5, Price: $2001.00, Buy ID: 1, Sell ID: 2
";

    fn d(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    #[test]
    fn clean_report_splits_sides() {
        for mode in [SideInference::Sections, SideInference::Legacy] {
            let r = parse(CLEAN, mode);
            let book = &r.books["RELIANCE"];
            assert_eq!(book.buy_orders.len(), 1, "{mode:?}");
            assert_eq!(book.sell_orders.len(), 1, "{mode:?}");

            let b = &book.buy_orders[0];
            assert_eq!((b.id, b.price, b.quantity), (1, d("2005.00"), 10));
            assert_eq!(b.order_type, "LIMIT");
            assert_eq!(b.status, "OPEN");
            assert_eq!(b.timestamp, "T1");
            assert_eq!(b.side, Side::Buy);

            let s = &book.sell_orders[0];
            assert_eq!((s.id, s.price, s.quantity, s.side), (2, d("2010.00"), 4, Side::Sell));
            assert!(r.issues.is_empty());
        }
    }

    #[test]
    fn trade_line_parses() {
        let r = parse(CLEAN, SideInference::Sections);
        assert_eq!(
            r.trades["RELIANCE"],
            vec![Trade { timestamp: "T2".into(), quantity: 5, price: d("2001.00"), buy_order_id: 1, sell_order_id: 2 }]
        );
    }

    #[test]
    fn chatter_is_counted_not_parsed() {
        let r = parse(CLEAN, SideInference::Sections);
        // startup banner + "Order Placed" line
        assert_eq!(r.unrecognized_lines, 2);
    }

    #[test]
    fn non_numeric_quantity_is_flagged_and_skipped() {
        let report = "\
Order Book for INFY:
Buy Orders (highest first):
Price: $1500.00, Qty: ten, ID: 7, Type: LIMIT, Status: OPEN, Time: T
Price: $1499.00, Qty: 3, ID: 8, Type: LIMIT, Status: OPEN, Time: T
Sell Orders (lowest first):
Trade History for INFY:
Time: T, Qty: 1, Price: $abc, Buy ID: 7, Sell ID: 9
";
        let r = parse(report, SideInference::Sections);
        assert_eq!(r.books["INFY"].buy_orders.len(), 1);
        assert_eq!(r.books["INFY"].buy_orders[0].id, 8);
        assert!(r.trades["INFY"].is_empty());
        assert_eq!(
            r.issues,
            vec![
                ReportIssue::Malformed(MalformedRecord { line_no: 3, field: "Qty", value: "ten".into() }),
                ReportIssue::Malformed(MalformedRecord { line_no: 7, field: "Price", value: "$abc".into() }),
            ]
        );
    }

    #[test]
    fn missing_id_is_malformed_not_zero() {
        let report = "Order Book for X:\nBuy Orders\nPrice: $1.00, Qty: 1, Type: LIMIT\n";
        let r = parse(report, SideInference::Sections);
        assert!(r.books["X"].buy_orders.is_empty());
        assert!(matches!(&r.issues[0], ReportIssue::Malformed(m) if m.field == "ID"));
    }

    #[test]
    fn order_before_heading_defaults_to_buy() {
        let report = "Order Book for X:\nPrice: $1.00, Qty: 1, ID: 1, Type: LIMIT, Status: OPEN, Time: T\n";
        let r = parse(report, SideInference::Sections);
        assert_eq!(r.books["X"].buy_orders.len(), 1);
        assert_eq!(r.issues, vec![ReportIssue::SideAssumed { line_no: 2 }]);
    }

    #[test]
    fn legacy_mode_misassigns_second_book_like_before() {
        // Two books in one report: the old substring rule only knows the first
        // buy region, so the second book's buy line lands on the sell side.
        let report = "\
Order Book for A:
Buy Orders (highest first):
Price: $1.00, Qty: 1, ID: 1, Type: LIMIT, Status: OPEN, Time: T
Sell Orders (lowest first):
Order Book for B:
Buy Orders (highest first):
Price: $2.00, Qty: 2, ID: 2, Type: LIMIT, Status: OPEN, Time: T
Sell Orders (lowest first):
";
        let legacy = parse(report, SideInference::Legacy);
        assert_eq!(legacy.books["B"].buy_orders.len(), 0);
        assert_eq!(legacy.books["B"].sell_orders.len(), 1);

        let sections = parse(report, SideInference::Sections);
        assert_eq!(sections.books["B"].buy_orders.len(), 1);
        assert_eq!(sections.books["A"].buy_orders.len(), 1);
    }

    #[test]
    fn reentering_a_section_replaces_it() {
        let report = "\
Trade History for A:
Time: T, Qty: 1, Price: $1.00, Buy ID: 1, Sell ID: 2
Trade History for A:
";
        let r = parse(report, SideInference::Sections);
        assert!(r.trades["A"].is_empty());
    }
}
