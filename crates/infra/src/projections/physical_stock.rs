use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockhold_core::{AggregateId, StockKey};
use stockhold_events::EventEnvelope;
use stockhold_inventory::{STOCK_BIN_STREAM, StockBinEvent};
use stockhold_reservations::PhysicalStock;

use crate::read_model::KeyValueStore;

/// Queryable physical stock: on-hand quantity per (item, warehouse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinReadModel {
    pub key: StockKey,
    pub on_hand: Decimal,
}

#[derive(Debug, Error)]
pub enum PhysicalStockProjectionError {
    #[error("failed to deserialize stock bin event: {0}")]
    Deserialize(String),

    #[error("event does not belong to its stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Physical stock projection over stock bin events.
///
/// Idempotent for at-least-once delivery (envelopes at or below the stream
/// cursor are ignored) and rebuildable from the event store.
#[derive(Debug)]
pub struct PhysicalStockProjection<S>
where
    S: KeyValueStore<StockKey, BinReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> PhysicalStockProjection<S>
where
    S: KeyValueStore<StockKey, BinReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &StockKey) -> Option<BinReadModel> {
        self.store.get(key)
    }

    pub fn list(&self) -> Vec<BinReadModel> {
        self.store.list()
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), PhysicalStockProjectionError> {
        if envelope.aggregate_type() != STOCK_BIN_STREAM {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| PhysicalStockProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq <= last {
            // Duplicate or replay.
            return Ok(());
        }
        if seq != last + 1 {
            return Err(PhysicalStockProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: StockBinEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| PhysicalStockProjectionError::Deserialize(e.to_string()))?;

        if event.key().stream_id(STOCK_BIN_STREAM) != aggregate_id {
            return Err(PhysicalStockProjectionError::StreamMismatch(format!(
                "{} is not stream {aggregate_id}",
                event.key()
            )));
        }

        match event {
            StockBinEvent::BinOpened(e) => {
                self.store.upsert(
                    e.key.clone(),
                    BinReadModel {
                        key: e.key,
                        on_hand: Decimal::ZERO,
                    },
                );
            }
            StockBinEvent::StockPosted(e) => {
                let mut rm = self.store.get(&e.key).unwrap_or(BinReadModel {
                    key: e.key.clone(),
                    on_hand: Decimal::ZERO,
                });
                rm.on_hand += e.delta;
                self.store.upsert(e.key, rm);
            }
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), PhysicalStockProjectionError> {
        self.cursors
            .write()
            .map_err(|_| PhysicalStockProjectionError::Poisoned)?
            .clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

impl<S> PhysicalStock for PhysicalStockProjection<S>
where
    S: KeyValueStore<StockKey, BinReadModel>,
{
    fn on_hand_qty(&self, key: &StockKey) -> Decimal {
        self.store.get(key).map(|rm| rm.on_hand).unwrap_or(Decimal::ZERO)
    }
}
