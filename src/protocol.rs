// ===============================
// src/protocol.rs (command log + script encoder)
// ===============================
//
// Engine tidak menyimpan state antar proses: setiap request menulis ulang
// seluruh riwayat command + query untuk symbol yang dilihat + `exit`.
//
use crate::domain::{Command, PriceBand, QueryKind, Symbol};
use crate::error::ReplayError;

/// Append-only history. Only `reset()` shrinks it, and only back to the seed.
#[derive(Debug, Clone)]
pub struct CommandLog {
    seed: Vec<Command>,
    entries: Vec<Command>,
}

impl CommandLog {
    pub fn new(seed_bands: &[PriceBand]) -> Self {
        let seed: Vec<Command> = seed_bands.iter().cloned().map(Command::SetPriceBand).collect();
        Self { entries: seed.clone(), seed }
    }

    pub fn append(&mut self, cmd: Command) -> Result<(), ReplayError> {
        if !cmd.is_replayable() {
            return Err(ReplayError::InvalidCommand(format!("`{cmd}` cannot be stored in the command log")));
        }
        self.entries.push(cmd);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.entries.clone_from(&self.seed);
    }

    pub fn snapshot(&self) -> &[Command] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }
}

/// Standard query suffix for one symbol: order book, trades, then `exit`.
pub fn view_queries(symbol: &Symbol) -> [Command; 3] {
    [
        Command::Query { kind: QueryKind::OrderBook, symbol: symbol.clone() },
        Command::Query { kind: QueryKind::Trades, symbol: symbol.clone() },
        Command::Terminate,
    ]
}

/// One command per line, history first, trailing queries last.
pub fn encode(history: &[Command], trailing: &[Command]) -> String {
    let mut out = String::with_capacity((history.len() + trailing.len()) * 40);
    for cmd in history.iter().chain(trailing) {
        out.push_str(&cmd.to_string());
        out.push('\n');
    }
    out
}
