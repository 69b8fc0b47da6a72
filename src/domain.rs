// ===============================
// src/domain.rs
// ===============================
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side {
    pub fn as_str(&self) -> &'static str { match self { Side::Buy => "BUY", Side::Sell => "SELL" } }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderVariant { Limit, Market, Ioc, Fok }
impl OrderVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderVariant::Limit => "LIMIT",
            OrderVariant::Market => "MARKET",
            OrderVariant::Ioc => "IOC",
            OrderVariant::Fok => "FOK",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIMIT" => Some(OrderVariant::Limit),
            "MARKET" => Some(OrderVariant::Market),
            "IOC" => Some(OrderVariant::Ioc),
            "FOK" => Some(OrderVariant::Fok),
            _ => None,
        }
    }
}

/// Instrument symbol. Always a single protocol token: no whitespace, no
/// control chars, so it can never split or inject a script line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, ReplayError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(ReplayError::InvalidCommand("empty symbol".into()));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ReplayError::InvalidCommand(format!("symbol {s:?} is not a single token")));
        }
        Ok(Symbol(s.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Reference price + tolerance for one symbol (enforced by the engine, only configured here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBand { pub symbol: Symbol, pub reference_price: Decimal, pub band_percent: Decimal }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind { OrderBook, Trades }

/// One line of the engine script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    SetPriceBand(PriceBand),
    PlaceOrder { side: Side, variant: OrderVariant, price: Option<Decimal>, quantity: u64, symbol: Symbol },
    CancelOrder { order_id: u64 },
    Query { kind: QueryKind, symbol: Symbol },
    Terminate,
}

impl Command {
    /// Only state-changing commands belong in the log; queries and `exit` are per-run suffix.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Command::Query { .. } | Command::Terminate)
    }
}

// Engine reads prices with `iss >> double`; keep one fractional digit minimum ("2000.0").
pub fn fmt_price(px: Decimal) -> String {
    let s = px.normalize().to_string();
    if s.contains('.') { s } else { format!("{s}.0") }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPriceBand(b) => write!(
                f,
                "setStockPriceBand {} {} {}",
                b.symbol,
                fmt_price(b.reference_price),
                fmt_price(b.band_percent)
            ),
            Command::PlaceOrder { side, variant, price, quantity, symbol } => write!(
                f,
                "place_order {} {} {} {} {}",
                side.as_str(),
                variant.as_str(),
                fmt_price(price.unwrap_or(Decimal::ZERO)),
                quantity,
                symbol
            ),
            Command::CancelOrder { order_id } => write!(f, "cancel_order {order_id}"),
            Command::Query { kind: QueryKind::OrderBook, symbol } => write!(f, "print_orderbook {symbol}"),
            Command::Query { kind: QueryKind::Trades, symbol } => write!(f, "print_trades {symbol}"),
            Command::Terminate => f.write_str("exit"),
        }
    }
}

// ---- Parsed engine report records ----
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub price: Decimal,
    pub quantity: u64,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: String,
    pub quantity: u64,
    pub price: Decimal,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook { pub buy_orders: Vec<Order>, pub sell_orders: Vec<Order> }

impl OrderBook {
    pub fn push(&mut self, order: Order) {
        match order.side {
            Side::Buy => self.buy_orders.push(order),
            Side::Sell => self.sell_orders.push(order),
        }
    }
}
