//! Reservation ledger service.
//!
//! Write path: every mutation is a `ReservationCommand` dispatched to the
//! `ReservationBucket` of its (item, warehouse) with compare-and-swap and
//! bounded retry. Read path: the in-process `ReservationProjection`, caught up
//! from the event store before every read and every voucher-scoped write, so
//! ledgers sharing a store (other handlers, a restarted process) agree.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockhold_core::{DomainError, ReservationId, StockKey};
use stockhold_events::{EventBus, EventEnvelope};
use stockhold_reservations::{
    AvailabilityCheck, CancelReservations, EntryOrigin, MarkDelivered, PhysicalStock,
    RESERVATION_BUCKET_STREAM, RecordDelivery, Reserve, ReservationBucket, ReservationCommand,
    ReservationEvent, ReservationRecord, SetDeliveredQty, Voucher, VoucherLine,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, DispatchOutcome};
use crate::config::LedgerSettings;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::projections::reservations::{ReservationProjection, ReservationProjectionError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ReservationProjectionError),
}

impl LedgerError {
    /// The request was refused outright (e.g. a manual entry).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, LedgerError::Dispatch(DispatchError::Forbidden(_)))
    }

    /// Still losing the compare-and-swap after every retry.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, LedgerError::Dispatch(DispatchError::Concurrency(_)))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        LedgerError::Dispatch(value.into())
    }
}

/// A request to hold stock for one voucher line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub key: StockKey,
    pub qty: Decimal,
    pub line: VoucherLine,
    pub company: Option<String>,
    pub posting_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

impl ReservationRequest {
    pub fn new(key: StockKey, qty: Decimal, voucher: Voucher) -> Self {
        Self {
            key,
            qty,
            line: VoucherLine::new(voucher, None),
            company: None,
            posting_date: None,
            remarks: None,
        }
    }

    pub fn detail_no(mut self, detail_no: impl AsRef<str>) -> Self {
        self.line = VoucherLine::new(self.line.voucher, Some(detail_no.as_ref()));
        self
    }

    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn posting_date(mut self, date: NaiveDate) -> Self {
        self.posting_date = Some(date);
        self
    }

    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    fn into_command(self, reservation_id: ReservationId, origin: EntryOrigin, guard: Option<Decimal>) -> Reserve {
        Reserve {
            key: self.key,
            reservation_id,
            line: self.line,
            qty: self.qty,
            company: self.company,
            posting_date: self.posting_date,
            remarks: self.remarks,
            origin,
            guard_physical_qty: guard,
            occurred_at: Utc::now(),
        }
    }
}

/// Result of `reserve_if_available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The line holds stock (newly, or from an earlier identical request).
    Reserved(ReservationId),
    /// Not enough free stock; nothing was written.
    Rejected(AvailabilityCheck),
    /// Non-positive quantity; nothing to hold.
    Skipped,
}

#[derive(Debug)]
pub struct ReservationLedger<S, B, P> {
    dispatcher: CommandDispatcher<S, B>,
    projection: ReservationProjection,
    stock: P,
    settings: LedgerSettings,
}

impl<S, B, P> ReservationLedger<S, B, P>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: PhysicalStock,
{
    /// Ledger over `store`, which may already hold reservation streams; reads
    /// catch up from it lazily.
    pub fn new(store: S, bus: B, stock: P, settings: LedgerSettings) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projection: ReservationProjection::new(),
            stock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    pub fn stock(&self) -> &P {
        &self.stock
    }

    pub fn projection(&self) -> &ReservationProjection {
        &self.projection
    }

    /// Hold stock for a voucher line.
    ///
    /// Returns `None` for non-positive quantities. A line that already holds a
    /// non-cancelled reservation keeps it and its id is returned. Availability
    /// is not checked.
    #[instrument(skip(self, request), fields(key = %request.key, voucher = %request.line.voucher))]
    pub fn create_reservation(&self, request: ReservationRequest) -> Result<Option<ReservationId>, LedgerError> {
        if request.qty <= Decimal::ZERO {
            debug!(qty = %request.qty, "nothing to reserve");
            return Ok(None);
        }

        let line = request.line.clone();
        let reservation_id = ReservationId::new();
        let command = request.into_command(reservation_id, EntryOrigin::VoucherLifecycle, None);
        let outcome = self.dispatch(ReservationCommand::Reserve(command))?;

        let id = outcome.aggregate.find_active(&line).map(|r| r.id);
        if id == Some(reservation_id) {
            info!(%reservation_id, "reservation created");
        }
        Ok(id)
    }

    /// Hold stock only if enough is free, decided atomically with the write.
    #[instrument(skip(self, request), fields(key = %request.key, voucher = %request.line.voucher))]
    pub fn reserve_if_available(&self, request: ReservationRequest) -> Result<ReserveOutcome, LedgerError> {
        if request.qty <= Decimal::ZERO {
            return Ok(ReserveOutcome::Skipped);
        }

        let physical = self.stock.on_hand_qty(&request.key);
        let line = request.line.clone();
        let required = request.qty;
        let reservation_id = ReservationId::new();
        let command = request.into_command(reservation_id, EntryOrigin::VoucherLifecycle, Some(physical));
        let outcome = self.dispatch(ReservationCommand::Reserve(command))?;

        if let Some(record) = outcome.aggregate.find_active(&line) {
            return Ok(ReserveOutcome::Reserved(record.id));
        }

        let check = outcome.aggregate.check_availability(physical, required, None);
        info!(available = %check.available_qty, required = %required, "reservation rejected");
        Ok(ReserveOutcome::Rejected(check))
    }

    /// Generic entry insert; reservations only come from voucher lifecycle code.
    #[instrument(skip(self, request), fields(key = %request.key, voucher = %request.line.voucher))]
    pub fn insert_entry(&self, request: ReservationRequest) -> Result<ReservationId, LedgerError> {
        let reservation_id = ReservationId::new();
        let command = request.into_command(reservation_id, EntryOrigin::Manual, None);
        self.dispatch(ReservationCommand::Reserve(command))?;
        Ok(reservation_id)
    }

    /// Cancel the open reservations of a voucher (or of one of its lines).
    pub fn cancel_reservation(&self, voucher: &Voucher, detail_no: Option<&str>) -> Result<usize, LedgerError> {
        self.cancel_reservation_with_reason(voucher, detail_no, None)
    }

    #[instrument(skip(self))]
    pub fn cancel_reservation_with_reason(
        &self,
        voucher: &Voucher,
        detail_no: Option<&str>,
        reason: Option<&str>,
    ) -> Result<usize, LedgerError> {
        let mut cancelled = 0;
        for key in self.voucher_keys(voucher)? {
            let outcome = self.dispatch(ReservationCommand::Cancel(CancelReservations {
                key,
                voucher: voucher.clone(),
                detail_no: detail_no.map(str::to_string),
                reason: reason.map(str::to_string),
                occurred_at: Utc::now(),
            }))?;
            cancelled += outcome.committed.len();
        }

        if cancelled > 0 {
            info!(cancelled, "reservations cancelled");
        }
        Ok(cancelled)
    }

    /// Set the absolute delivered quantity on a voucher's active reservations.
    #[instrument(skip(self))]
    pub fn update_delivered_qty(
        &self,
        voucher: &Voucher,
        detail_no: Option<&str>,
        delivered_qty: Decimal,
    ) -> Result<usize, LedgerError> {
        if delivered_qty < Decimal::ZERO {
            return Err(DomainError::validation("delivered_qty cannot be negative").into());
        }

        let mut updated = 0;
        for key in self.voucher_keys(voucher)? {
            let outcome = self.dispatch(ReservationCommand::SetDeliveredQty(SetDeliveredQty {
                key,
                voucher: voucher.clone(),
                detail_no: detail_no.map(str::to_string),
                delivered_qty,
                occurred_at: Utc::now(),
            }))?;
            for event in decode(&outcome.committed)? {
                if let ReservationEvent::DeliveredQtyUpdated(e) = event {
                    if e.correction {
                        warn!(
                            reservation_id = %e.reservation_id,
                            delivered_qty = %e.delivered_qty,
                            "delivered quantity decreased, recorded as correction"
                        );
                    }
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Set one delivery note's share of the delivered quantity on a voucher's
    /// active reservations; a zero `qty` withdraws the note.
    ///
    /// The delivered quantity becomes the sum of the shares stored on the
    /// bucket stream, so resubmitting a note is a no-op and withdrawing one
    /// leaves the others in place, whichever process recorded them.
    #[instrument(skip(self))]
    pub fn record_delivery(
        &self,
        voucher: &Voucher,
        detail_no: Option<&str>,
        note: &Voucher,
        qty: Decimal,
    ) -> Result<usize, LedgerError> {
        if qty < Decimal::ZERO {
            return Err(DomainError::validation("delivered qty cannot be negative").into());
        }

        let mut updated = 0;
        for key in self.voucher_keys(voucher)? {
            let outcome = self.dispatch(ReservationCommand::RecordDelivery(RecordDelivery {
                key,
                voucher: voucher.clone(),
                detail_no: detail_no.map(str::to_string),
                note: note.clone(),
                qty,
                occurred_at: Utc::now(),
            }))?;
            for event in decode(&outcome.committed)? {
                if let ReservationEvent::DeliveredQtyUpdated(e) = event {
                    debug!(
                        reservation_id = %e.reservation_id,
                        delivered_qty = %e.delivered_qty,
                        status = %e.status,
                        "delivery recorded"
                    );
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Mark a voucher's active reservations fully delivered.
    #[instrument(skip(self))]
    pub fn mark_reservation_delivered(&self, voucher: &Voucher, detail_no: Option<&str>) -> Result<usize, LedgerError> {
        let mut delivered = 0;
        for key in self.voucher_keys(voucher)? {
            let outcome = self.dispatch(ReservationCommand::MarkDelivered(MarkDelivered {
                key,
                voucher: voucher.clone(),
                detail_no: detail_no.map(str::to_string),
                occurred_at: Utc::now(),
            }))?;
            delivered += outcome.committed.len();
        }
        Ok(delivered)
    }

    /// Outstanding reserved quantity, optionally excluding one voucher.
    pub fn get_reserved_qty(&self, key: &StockKey, exclude: Option<&Voucher>) -> Result<Decimal, LedgerError> {
        self.catch_up(key)?;
        Ok(self.projection.reserved_qty(key, exclude)?)
    }

    /// Physical minus reserved. Negative means over-committed.
    pub fn get_available_qty(&self, key: &StockKey, exclude: Option<&Voucher>) -> Result<Decimal, LedgerError> {
        Ok(self.stock.on_hand_qty(key) - self.get_reserved_qty(key, exclude)?)
    }

    /// Check `required_qty` against free stock, ignoring `voucher`'s own holds.
    pub fn validate_stock_availability(
        &self,
        key: &StockKey,
        required_qty: Decimal,
        voucher: Option<&Voucher>,
    ) -> Result<AvailabilityCheck, LedgerError> {
        Ok(AvailabilityCheck::evaluate(
            key.clone(),
            required_qty,
            self.stock.on_hand_qty(key),
            self.get_reserved_qty(key, voucher)?,
        ))
    }

    pub fn reservations_for_voucher(&self, voucher: &Voucher) -> Result<Vec<ReservationRecord>, LedgerError> {
        self.sync()?;
        Ok(self.projection.records_for_voucher(voucher)?)
    }

    pub fn reservation(&self, id: ReservationId) -> Result<Option<ReservationRecord>, LedgerError> {
        self.sync()?;
        Ok(self.projection.record(id)?)
    }

    /// Replay every bucket stream from the store into a fresh projection.
    pub fn rebuild_projection(&self) -> Result<(), LedgerError> {
        let stored = self.store().load_all(RESERVATION_BUCKET_STREAM)?;
        info!(events = stored.len(), "rebuilding reservation projection");
        self.projection
            .rebuild_from_scratch(stored.iter().map(StoredEvent::to_envelope))?;
        Ok(())
    }

    fn dispatch(&self, command: ReservationCommand) -> Result<DispatchOutcome<ReservationBucket>, LedgerError> {
        let key = command.key().clone();
        let aggregate_id = key.stream_id(RESERVATION_BUCKET_STREAM);

        let result = self.dispatcher.dispatch_with_retry(
            aggregate_id,
            RESERVATION_BUCKET_STREAM,
            &command,
            self.settings.max_conflict_retries,
            |_| ReservationBucket::empty(key.clone()),
        );

        match result {
            Ok(outcome) => {
                if !outcome.committed.is_empty() {
                    self.catch_up(&key)?;
                }
                if outcome.attempts > 1 {
                    debug!(%key, attempts = outcome.attempts, "committed after retries");
                }
                Ok(outcome)
            }
            Err(DispatchError::Publish(reason)) => {
                // Committed but not published; local reads still see the write.
                warn!(%key, %reason, "reservation events committed but not published");
                self.catch_up(&key)?;
                Err(DispatchError::Publish(reason).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Catch up one bucket stream from the store.
    fn catch_up(&self, key: &StockKey) -> Result<(), LedgerError> {
        let stored = self.store().load_stream(key.stream_id(RESERVATION_BUCKET_STREAM))?;
        self.apply_new(&stored)?;
        Ok(())
    }

    /// Catch up every bucket stream; voucher lookups span buckets.
    fn sync(&self) -> Result<(), LedgerError> {
        let stored = self.store().load_all(RESERVATION_BUCKET_STREAM)?;
        let applied = self.apply_new(&stored)?;
        if applied > 0 {
            debug!(applied, "reservation projection caught up from store");
        }
        Ok(())
    }

    fn voucher_keys(&self, voucher: &Voucher) -> Result<Vec<StockKey>, LedgerError> {
        self.sync()?;
        Ok(self.projection.keys_for_voucher(voucher)?)
    }

    fn apply_new(&self, stored: &[StoredEvent]) -> Result<usize, LedgerError> {
        let mut applied = 0;
        for event in stored {
            if event.sequence_number > self.projection.cursor(event.aggregate_id)? {
                self.projection.apply_envelope(&event.to_envelope())?;
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn decode(committed: &[StoredEvent]) -> Result<Vec<ReservationEvent>, LedgerError> {
    committed
        .iter()
        .map(|stored| {
            serde_json::from_value(stored.payload.clone())
                .map_err(|e| LedgerError::Dispatch(DispatchError::Deserialize(e.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use rust_decimal_macros::dec;
    use stockhold_events::InMemoryEventBus;
    use stockhold_reservations::ReservationStatus;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Ledger = ReservationLedger<Arc<InMemoryEventStore>, Bus, HashMap<StockKey, Decimal>>;

    fn key() -> StockKey {
        StockKey::new("ITEM-A", "WH-1")
    }

    fn ledger(on_hand: Decimal) -> Ledger {
        ReservationLedger::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            HashMap::from([(key(), on_hand)]),
            LedgerSettings::default(),
        )
    }

    fn request(voucher: &str, detail: &str, qty: Decimal) -> ReservationRequest {
        ReservationRequest::new(key(), qty, Voucher::sales_invoice(voucher))
            .detail_no(detail)
            .company("Acme")
    }

    #[test]
    fn create_is_idempotent_per_line() {
        let ledger = ledger(dec!(100));
        let first = ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        let again = ledger.create_reservation(request("SI-001", "d1", dec!(99))).unwrap();

        assert!(first.is_some());
        assert_eq!(first, again);
        assert_eq!(ledger.get_reserved_qty(&key(), None).unwrap(), dec!(30));
        assert_eq!(ledger.reservations_for_voucher(&Voucher::sales_invoice("SI-001")).unwrap().len(), 1);
    }

    #[test]
    fn non_positive_quantities_are_skipped() {
        let ledger = ledger(dec!(100));
        assert_eq!(ledger.create_reservation(request("SI-001", "d1", dec!(0))).unwrap(), None);
        assert_eq!(
            ledger.reserve_if_available(request("SI-001", "d1", dec!(-1))).unwrap(),
            ReserveOutcome::Skipped
        );
        assert!(ledger.store().load_all(RESERVATION_BUCKET_STREAM).unwrap().is_empty());
    }

    #[test]
    fn manual_entries_are_forbidden() {
        let ledger = ledger(dec!(100));
        let err = ledger.insert_entry(request("SI-001", "d1", dec!(5))).unwrap_err();
        assert!(err.is_forbidden());
        assert_eq!(ledger.get_reserved_qty(&key(), None).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn delivery_flow_releases_stock() {
        let ledger = ledger(dec!(100));
        let voucher = Voucher::sales_invoice("SI-001");
        let id = ledger.create_reservation(request("SI-001", "d1", dec!(40))).unwrap().unwrap();

        assert_eq!(ledger.update_delivered_qty(&voucher, Some("d1"), dec!(15)).unwrap(), 1);
        assert_eq!(ledger.reservation(id).unwrap().unwrap().status, ReservationStatus::PartiallyDelivered);
        assert_eq!(ledger.get_available_qty(&key(), None).unwrap(), dec!(75));

        assert_eq!(ledger.mark_reservation_delivered(&voucher, None).unwrap(), 1);
        assert_eq!(ledger.reservation(id).unwrap().unwrap().status, ReservationStatus::Delivered);
        assert_eq!(ledger.get_available_qty(&key(), None).unwrap(), dec!(100));

        // Terminal records ignore further updates.
        assert_eq!(ledger.update_delivered_qty(&voucher, Some("d1"), dec!(1)).unwrap(), 0);
        assert_eq!(ledger.cancel_reservation(&voucher, None).unwrap(), 0);
    }

    #[test]
    fn negative_delivered_qty_is_rejected() {
        let ledger = ledger(dec!(100));
        let err = ledger
            .update_delivered_qty(&Voucher::sales_invoice("SI-404"), None, dec!(-1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Dispatch(DispatchError::Validation(_))));
    }

    #[test]
    fn cancel_with_reason_records_audit_note() {
        let ledger = ledger(dec!(100));
        let voucher = Voucher::sales_invoice("SI-001");
        let id = ledger.create_reservation(request("SI-001", "d1", dec!(10))).unwrap().unwrap();

        assert_eq!(ledger.cancel_reservation_with_reason(&voucher, None, Some("customer request")).unwrap(), 1);
        let record = ledger.reservation(id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Cancelled);
        assert!(record.remarks.unwrap().ends_with(": customer request"));
        assert_eq!(ledger.cancel_reservation(&voucher, None).unwrap(), 0);
    }

    #[test]
    fn reserve_if_available_rejects_shortage() {
        let ledger = ledger(dec!(50));
        ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();

        let outcome = ledger.reserve_if_available(request("SI-002", "d1", dec!(25))).unwrap();
        let ReserveOutcome::Rejected(check) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert!(!check.is_valid);
        assert_eq!(check.available_qty, dec!(20));
        assert_eq!(ledger.get_reserved_qty(&key(), None).unwrap(), dec!(30));

        assert!(matches!(
            ledger.reserve_if_available(request("SI-002", "d1", dec!(20))).unwrap(),
            ReserveOutcome::Reserved(_)
        ));
    }

    #[test]
    fn availability_excludes_own_voucher() {
        let ledger = ledger(dec!(100));
        ledger.create_reservation(request("SI-001", "d1", dec!(80))).unwrap();

        let check = ledger.validate_stock_availability(&key(), dec!(50), None).unwrap();
        assert!(!check.is_valid);
        assert_eq!(check.shortage(), dec!(30));

        let own = ledger
            .validate_stock_availability(&key(), dec!(50), Some(&Voucher::sales_invoice("SI-001")))
            .unwrap();
        assert!(own.is_valid);
        assert!(own.message.is_empty());
    }

    #[test]
    fn rebuild_restores_projection_from_store() {
        let ledger = ledger(dec!(100));
        let id = ledger.create_reservation(request("SI-001", "d1", dec!(12))).unwrap().unwrap();

        ledger.rebuild_projection().unwrap();
        assert_eq!(ledger.get_reserved_qty(&key(), None).unwrap(), dec!(12));
        assert_eq!(ledger.reservation(id).unwrap().unwrap().reserved_qty, dec!(12));
    }

    #[test]
    fn ledgers_sharing_a_store_see_each_others_writes() {
        let writer = ledger(dec!(100));
        let (store, bus) = (writer.store().clone(), writer.bus().clone());
        let reader: Ledger =
            ReservationLedger::new(store, bus, HashMap::from([(key(), dec!(100))]), LedgerSettings::default());
        let voucher = Voucher::sales_invoice("SI-001");

        let id = writer.create_reservation(request("SI-001", "d1", dec!(30))).unwrap().unwrap();
        assert_eq!(reader.get_available_qty(&key(), None).unwrap(), dec!(70));
        assert!(!reader.validate_stock_availability(&key(), dec!(80), None).unwrap().is_valid);
        assert_eq!(reader.reservation(id).unwrap().unwrap().reserved_qty, dec!(30));

        assert_eq!(reader.update_delivered_qty(&voucher, Some("d1"), dec!(10)).unwrap(), 1);
        assert_eq!(writer.get_reserved_qty(&key(), None).unwrap(), dec!(20));

        assert_eq!(reader.cancel_reservation(&voucher, None).unwrap(), 1);
        assert_eq!(writer.get_reserved_qty(&key(), None).unwrap(), Decimal::ZERO);
        assert_eq!(
            writer.reservation(id).unwrap().unwrap().status,
            ReservationStatus::Cancelled
        );
    }

    #[test]
    fn delivery_shares_survive_a_second_ledger() {
        let first = ledger(dec!(100));
        let voucher = Voucher::sales_invoice("SI-001");
        let id = first.create_reservation(request("SI-001", "d1", dec!(40))).unwrap().unwrap();
        let (dn1, dn2) = (Voucher::delivery_note("DN-001"), Voucher::delivery_note("DN-002"));

        first.record_delivery(&voucher, Some("d1"), &dn1, dec!(10)).unwrap();
        assert_eq!(first.record_delivery(&voucher, Some("d1"), &dn1, dec!(10)).unwrap(), 0);
        first.record_delivery(&voucher, Some("d1"), &dn2, dec!(5)).unwrap();

        let (store, bus) = (first.store().clone(), first.bus().clone());
        let second: Ledger = ReservationLedger::new(store, bus, HashMap::new(), LedgerSettings::default());
        assert_eq!(second.record_delivery(&voucher, Some("d1"), &dn2, Decimal::ZERO).unwrap(), 1);

        let record = first.reservation(id).unwrap().unwrap();
        assert_eq!(record.delivered_qty, dec!(10));
        assert_eq!(record.status, ReservationStatus::PartiallyDelivered);
    }
}
