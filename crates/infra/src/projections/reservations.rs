use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard};

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockhold_core::{Aggregate, AggregateId, AggregateRoot, ReservationId, StockKey};
use stockhold_events::EventEnvelope;
use stockhold_reservations::{
    RESERVATION_BUCKET_STREAM, ReservationBucket, ReservationEvent, ReservationRecord, Voucher,
};

#[derive(Debug, Error)]
pub enum ReservationProjectionError {
    #[error("failed to deserialize reservation event: {0}")]
    Deserialize(String),

    #[error("event does not belong to its stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<AggregateId, ReservationBucket>,
    by_voucher: HashMap<Voucher, BTreeSet<StockKey>>,
    by_id: HashMap<ReservationId, AggregateId>,
}

/// Query side of the reservation ledger.
///
/// Holds one rehydrated `ReservationBucket` per (item, warehouse); the bucket
/// version doubles as the projection cursor. Voucher and record indexes let
/// voucher-scoped operations find their buckets without scanning.
#[derive(Debug, Default)]
pub struct ReservationProjection {
    state: RwLock<State>,
}

impl ReservationProjection {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, ReservationProjectionError> {
        self.state.read().map_err(|_| ReservationProjectionError::Poisoned)
    }

    /// Last applied sequence number for a bucket stream.
    pub fn cursor(&self, aggregate_id: AggregateId) -> Result<u64, ReservationProjectionError> {
        Ok(self.read()?.buckets.get(&aggregate_id).map(|b| b.version()).unwrap_or(0))
    }

    /// Outstanding reservations for a key, optionally excluding one voucher.
    pub fn reserved_qty(&self, key: &StockKey, exclude: Option<&Voucher>) -> Result<Decimal, ReservationProjectionError> {
        let id = key.stream_id(RESERVATION_BUCKET_STREAM);
        Ok(self
            .read()?
            .buckets
            .get(&id)
            .map(|b| b.reserved_qty(exclude))
            .unwrap_or(Decimal::ZERO))
    }

    pub fn record(&self, id: ReservationId) -> Result<Option<ReservationRecord>, ReservationProjectionError> {
        let state = self.read()?;
        Ok(state
            .by_id
            .get(&id)
            .and_then(|aggregate_id| state.buckets.get(aggregate_id))
            .and_then(|bucket| bucket.record(id).cloned()))
    }

    /// Keys of every bucket that ever held a reservation for this voucher.
    pub fn keys_for_voucher(&self, voucher: &Voucher) -> Result<Vec<StockKey>, ReservationProjectionError> {
        Ok(self
            .read()?
            .by_voucher
            .get(voucher)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Every record (any status) of a voucher, ordered by creation.
    pub fn records_for_voucher(&self, voucher: &Voucher) -> Result<Vec<ReservationRecord>, ReservationProjectionError> {
        let state = self.read()?;
        let mut records: Vec<ReservationRecord> = state
            .by_voucher
            .get(voucher)
            .into_iter()
            .flatten()
            .filter_map(|key| state.buckets.get(&key.stream_id(RESERVATION_BUCKET_STREAM)))
            .flat_map(|b| b.matching(voucher, None).cloned().collect::<Vec<_>>())
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    /// Apply a published envelope into the projection.
    ///
    /// Envelopes at or below the bucket version are ignored; gaps are errors.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ReservationProjectionError> {
        if envelope.aggregate_type() != RESERVATION_BUCKET_STREAM {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut state = self.state.write().map_err(|_| ReservationProjectionError::Poisoned)?;
        let last = state.buckets.get(&aggregate_id).map(|b| b.version()).unwrap_or(0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ReservationProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: ReservationEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ReservationProjectionError::Deserialize(e.to_string()))?;
        let key = event.key().clone();
        if key.stream_id(RESERVATION_BUCKET_STREAM) != aggregate_id {
            return Err(ReservationProjectionError::StreamMismatch(format!(
                "{key} is not stream {aggregate_id}"
            )));
        }

        if let ReservationEvent::ReservationCreated(e) = &event {
            state
                .by_voucher
                .entry(e.line.voucher.clone())
                .or_default()
                .insert(key.clone());
            state.by_id.insert(e.reservation_id, aggregate_id);
        }

        state
            .buckets
            .entry(aggregate_id)
            .or_insert_with(|| ReservationBucket::empty(key))
            .apply(&event);

        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ReservationProjectionError> {
        {
            let mut state = self.state.write().map_err(|_| ReservationProjectionError::Poisoned)?;
            *state = State::default();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
