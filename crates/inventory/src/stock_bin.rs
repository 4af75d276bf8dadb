use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockhold_core::{Aggregate, AggregateId, AggregateRoot, DomainError, StockKey};
use stockhold_events::Event;

/// Stream family for stock bins.
pub const STOCK_BIN_STREAM: &str = "stock.bin";

/// Aggregate root: StockBin, the physical on-hand quantity of one item in one warehouse.
///
/// This is the write side of the physical stock source. The reservation
/// ledger never mutates it; it only reads the projected on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockBin {
    id: AggregateId,
    key: StockKey,
    on_hand: Decimal,
    version: u64,
    opened: bool,
}

impl StockBin {
    /// Create an empty, not-yet-opened bin for rehydration.
    pub fn empty(key: StockKey) -> Self {
        Self {
            id: key.stream_id(STOCK_BIN_STREAM),
            key,
            on_hand: Decimal::ZERO,
            version: 0,
            opened: false,
        }
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn on_hand(&self) -> Decimal {
        self.on_hand
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }
}

impl AggregateRoot for StockBin {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenBin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBin {
    pub key: StockKey,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostStockMovement (receipt when positive, issue when negative).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStockMovement {
    pub key: StockKey,
    pub delta: Decimal,
    /// Stock ledger voucher that moved the goods (purchase receipt, delivery note, ...).
    pub voucher_no: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockBinCommand {
    OpenBin(OpenBin),
    PostStockMovement(PostStockMovement),
}

/// Event: BinOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinOpened {
    pub key: StockKey,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosted {
    pub key: StockKey,
    pub delta: Decimal,
    pub voucher_no: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockBinEvent {
    BinOpened(BinOpened),
    StockPosted(StockPosted),
}

impl StockBinEvent {
    pub fn key(&self) -> &StockKey {
        match self {
            StockBinEvent::BinOpened(e) => &e.key,
            StockBinEvent::StockPosted(e) => &e.key,
        }
    }
}

impl Event for StockBinEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockBinEvent::BinOpened(_) => "stock.bin.opened",
            StockBinEvent::StockPosted(_) => "stock.bin.posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockBinEvent::BinOpened(e) => e.occurred_at,
            StockBinEvent::StockPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockBin {
    type Command = StockBinCommand;
    type Event = StockBinEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockBinEvent::BinOpened(e) => {
                self.key = e.key.clone();
                self.on_hand = Decimal::ZERO;
                self.opened = true;
            }
            StockBinEvent::StockPosted(e) => {
                self.on_hand += e.delta;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockBinCommand::OpenBin(cmd) => self.handle_open(cmd),
            StockBinCommand::PostStockMovement(cmd) => self.handle_post(cmd),
        }
    }
}

impl StockBin {
    fn ensure_key(&self, key: &StockKey) -> Result<(), DomainError> {
        if &self.key != key {
            return Err(DomainError::invariant("stock key mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenBin) -> Result<Vec<StockBinEvent>, DomainError> {
        if self.opened {
            return Err(DomainError::conflict("bin already opened"));
        }
        self.ensure_key(&cmd.key)?;
        if cmd.key.item_code.as_str().trim().is_empty() {
            return Err(DomainError::validation("item_code cannot be empty"));
        }
        if cmd.key.warehouse.as_str().trim().is_empty() {
            return Err(DomainError::validation("warehouse cannot be empty"));
        }
        Ok(vec![StockBinEvent::BinOpened(BinOpened {
            key: cmd.key.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostStockMovement) -> Result<Vec<StockBinEvent>, DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        self.ensure_key(&cmd.key)?;

        if cmd.delta.is_zero() {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        if self.on_hand + cmd.delta < Decimal::ZERO {
            return Err(DomainError::invariant("on-hand stock cannot go negative"));
        }

        Ok(vec![StockBinEvent::StockPosted(StockPosted {
            key: cmd.key.clone(),
            delta: cmd.delta,
            voucher_no: cmd.voucher_no.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
