use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockhold_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ReservationId, StockKey};
use stockhold_events::Event;

use crate::availability::AvailabilityCheck;
use crate::record::{ReservationRecord, ReservationStatus};
use crate::voucher::{Voucher, VoucherLine};

/// Stream family for reservation buckets.
pub const RESERVATION_BUCKET_STREAM: &str = "reservation.bucket";

/// Aggregate root: every reservation held against one (item, warehouse).
///
/// The bucket is the unit of serialization for reservations. It keeps a
/// running `outstanding_total` (Σ pending of Reserved / Partially Delivered
/// records) and a per-voucher breakdown, so availability reads never re-sum
/// the records and every write is checked against a single stream version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationBucket {
    id: AggregateId,
    key: StockKey,
    records: Vec<ReservationRecord>,
    outstanding_total: Decimal,
    outstanding_by_voucher: HashMap<Voucher, Decimal>,
    /// Delivered quantity per delivery note, per record.
    delivery_shares: HashMap<ReservationId, BTreeMap<Voucher, Decimal>>,
    version: u64,
}

impl ReservationBucket {
    /// Create an empty bucket for rehydration.
    pub fn empty(key: StockKey) -> Self {
        Self {
            id: key.stream_id(RESERVATION_BUCKET_STREAM),
            key,
            records: Vec::new(),
            outstanding_total: Decimal::ZERO,
            outstanding_by_voucher: HashMap::new(),
            delivery_shares: HashMap::new(),
            version: 0,
        }
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn records(&self) -> &[ReservationRecord] {
        &self.records
    }

    pub fn record(&self, id: ReservationId) -> Option<&ReservationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Delivered quantity each delivery note reported against a record.
    pub fn delivery_shares(&self, id: ReservationId) -> Option<&BTreeMap<Voucher, Decimal>> {
        self.delivery_shares.get(&id)
    }

    /// The non-cancelled record owning this exact voucher line, if any.
    pub fn find_active(&self, line: &VoucherLine) -> Option<&ReservationRecord> {
        self.records
            .iter()
            .find(|r| r.is_active() && r.is_same_line(line))
    }

    /// Records selected by a voucher (and optional line) filter.
    pub fn matching<'a>(
        &'a self,
        voucher: &'a Voucher,
        detail_no: Option<&'a str>,
    ) -> impl Iterator<Item = &'a ReservationRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.line.selected_by(voucher, detail_no))
    }

    /// Σ pending over outstanding records, optionally excluding one voucher.
    pub fn reserved_qty(&self, exclude: Option<&Voucher>) -> Decimal {
        let excluded = exclude
            .and_then(|v| self.outstanding_by_voucher.get(v))
            .copied()
            .unwrap_or(Decimal::ZERO);
        self.outstanding_total - excluded
    }

    /// Check `required_qty` against a physical stock snapshot.
    pub fn check_availability(
        &self,
        physical_qty: Decimal,
        required_qty: Decimal,
        exclude: Option<&Voucher>,
    ) -> AvailabilityCheck {
        AvailabilityCheck::evaluate(
            self.key.clone(),
            required_qty,
            physical_qty,
            self.reserved_qty(exclude),
        )
    }

    fn record_mut(&mut self, id: ReservationId) -> Option<&mut ReservationRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    fn adjust_outstanding(&mut self, voucher: &Voucher, delta: Decimal) {
        if delta.is_zero() {
            return;
        }
        self.outstanding_total += delta;
        let entry = self
            .outstanding_by_voucher
            .entry(voucher.clone())
            .or_insert(Decimal::ZERO);
        *entry += delta;
        if entry.is_zero() {
            self.outstanding_by_voucher.remove(voucher);
        }
    }

    /// Mutate one record and keep the running totals in step with it.
    fn update_record(&mut self, id: ReservationId, f: impl FnOnce(&mut ReservationRecord)) {
        let Some(record) = self.record_mut(id) else {
            return;
        };
        let before = record.outstanding_qty();
        f(record);
        let after = record.outstanding_qty();
        let voucher = record.voucher().clone();
        self.adjust_outstanding(&voucher, after - before);
    }
}

impl AggregateRoot for ReservationBucket {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Where a reservation request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// Voucher lifecycle code (submit hooks, programmatic API).
    VoucherLifecycle,
    /// A hand-made entry (generic document insert, import, UI).
    Manual,
}

/// Command: Reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub key: StockKey,
    /// Identity for the record if one gets created.
    pub reservation_id: ReservationId,
    pub line: VoucherLine,
    pub qty: Decimal,
    pub company: Option<String>,
    pub posting_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub origin: EntryOrigin,
    /// Physical stock snapshot; when set, the reservation is only taken if it fits.
    pub guard_physical_qty: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservations {
    pub key: StockKey,
    pub voucher: Voucher,
    pub detail_no: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetDeliveredQty (absolute, not incremental).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDeliveredQty {
    pub key: StockKey,
    pub voucher: Voucher,
    pub detail_no: Option<String>,
    pub delivered_qty: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery.
///
/// Sets one delivery note's share of the delivered quantity; a zero share
/// withdraws the note. The record's delivered quantity becomes the sum of its
/// shares, so resubmitting a note never counts it twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub key: StockKey,
    pub voucher: Voucher,
    pub detail_no: Option<String>,
    pub note: Voucher,
    pub qty: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered (delivered = reserved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub key: StockKey,
    pub voucher: Voucher,
    pub detail_no: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    Reserve(Reserve),
    Cancel(CancelReservations),
    SetDeliveredQty(SetDeliveredQty),
    RecordDelivery(RecordDelivery),
    MarkDelivered(MarkDelivered),
}

impl ReservationCommand {
    pub fn key(&self) -> &StockKey {
        match self {
            ReservationCommand::Reserve(c) => &c.key,
            ReservationCommand::Cancel(c) => &c.key,
            ReservationCommand::SetDeliveredQty(c) => &c.key,
            ReservationCommand::RecordDelivery(c) => &c.key,
            ReservationCommand::MarkDelivered(c) => &c.key,
        }
    }
}

/// Event: ReservationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCreated {
    pub key: StockKey,
    pub reservation_id: ReservationId,
    pub line: VoucherLine,
    pub reserved_qty: Decimal,
    pub company: Option<String>,
    pub posting_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub key: StockKey,
    pub reservation_id: ReservationId,
    /// Audit note appended to the record's remarks.
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveredQtyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredQtyUpdated {
    pub key: StockKey,
    pub reservation_id: ReservationId,
    pub delivered_qty: Decimal,
    pub status: ReservationStatus,
    /// The new delivered quantity is lower than the previous one.
    pub correction: bool,
    /// Set when the update came from a delivery note.
    #[serde(default)]
    pub delivery: Option<DeliveryShare>,
    pub occurred_at: DateTime<Utc>,
}

/// One delivery note's contribution to a record; zero means withdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryShare {
    pub note: Voucher,
    pub qty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    ReservationCreated(ReservationCreated),
    ReservationCancelled(ReservationCancelled),
    DeliveredQtyUpdated(DeliveredQtyUpdated),
}

impl ReservationEvent {
    pub fn key(&self) -> &StockKey {
        match self {
            ReservationEvent::ReservationCreated(e) => &e.key,
            ReservationEvent::ReservationCancelled(e) => &e.key,
            ReservationEvent::DeliveredQtyUpdated(e) => &e.key,
        }
    }

    pub fn reservation_id(&self) -> ReservationId {
        match self {
            ReservationEvent::ReservationCreated(e) => e.reservation_id,
            ReservationEvent::ReservationCancelled(e) => e.reservation_id,
            ReservationEvent::DeliveredQtyUpdated(e) => e.reservation_id,
        }
    }
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::ReservationCreated(_) => "reservation.created",
            ReservationEvent::ReservationCancelled(_) => "reservation.cancelled",
            ReservationEvent::DeliveredQtyUpdated(_) => "reservation.delivered_qty_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::ReservationCreated(e) => e.occurred_at,
            ReservationEvent::ReservationCancelled(e) => e.occurred_at,
            ReservationEvent::DeliveredQtyUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReservationBucket {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::ReservationCreated(e) => {
                let record = ReservationRecord {
                    id: e.reservation_id,
                    key: e.key.clone(),
                    line: e.line.clone(),
                    reserved_qty: e.reserved_qty,
                    delivered_qty: Decimal::ZERO,
                    status: ReservationStatus::Reserved,
                    company: e.company.clone(),
                    posting_date: e.posting_date,
                    remarks: e.remarks.clone(),
                    created_at: e.occurred_at,
                    modified_at: e.occurred_at,
                };
                let voucher = record.voucher().clone();
                let outstanding = record.outstanding_qty();
                self.records.push(record);
                self.adjust_outstanding(&voucher, outstanding);
            }
            ReservationEvent::ReservationCancelled(e) => {
                self.update_record(e.reservation_id, |r| {
                    r.status = ReservationStatus::Cancelled;
                    r.append_remark(&e.note);
                    r.modified_at = e.occurred_at;
                });
            }
            ReservationEvent::DeliveredQtyUpdated(e) => {
                // Terminal states are never left, whatever the stream says.
                let open = self
                    .record(e.reservation_id)
                    .is_some_and(|r| !r.status.is_terminal());
                if open {
                    self.update_record(e.reservation_id, |r| {
                        r.delivered_qty = e.delivered_qty;
                        r.status = ReservationStatus::derive(r.reserved_qty, r.delivered_qty);
                        r.modified_at = e.occurred_at;
                    });
                    if let Some(share) = &e.delivery {
                        let shares = self.delivery_shares.entry(e.reservation_id).or_default();
                        if share.qty.is_zero() {
                            shares.remove(&share.note);
                        } else {
                            shares.insert(share.note.clone(), share.qty);
                        }
                    }
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.key() != &self.key {
            return Err(DomainError::invariant("stock key mismatch"));
        }
        match command {
            ReservationCommand::Reserve(cmd) => self.handle_reserve(cmd),
            ReservationCommand::Cancel(cmd) => self.handle_cancel(cmd),
            ReservationCommand::SetDeliveredQty(cmd) => self.handle_set_delivered(cmd),
            ReservationCommand::RecordDelivery(cmd) => self.handle_record_delivery(cmd),
            ReservationCommand::MarkDelivered(cmd) => self.handle_mark_delivered(cmd),
        }
    }
}

impl ReservationBucket {
    fn handle_reserve(&self, cmd: &Reserve) -> Result<Vec<ReservationEvent>, DomainError> {
        if cmd.origin == EntryOrigin::Manual {
            return Err(DomainError::forbidden(
                "reservation entries can only be created by voucher lifecycle code",
            ));
        }

        // Callers pass zero quantities for lines that need no stock.
        if cmd.qty <= Decimal::ZERO {
            return Ok(vec![]);
        }

        // Idempotent: one active record per voucher line.
        if self.find_active(&cmd.line).is_some() {
            return Ok(vec![]);
        }

        if let Some(physical) = cmd.guard_physical_qty {
            if !self.check_availability(physical, cmd.qty, None).is_valid {
                return Ok(vec![]);
            }
        }

        if self.record(cmd.reservation_id).is_some() {
            return Err(DomainError::conflict("reservation id already used"));
        }

        Ok(vec![ReservationEvent::ReservationCreated(ReservationCreated {
            key: cmd.key.clone(),
            reservation_id: cmd.reservation_id,
            line: cmd.line.clone(),
            reserved_qty: cmd.qty,
            company: cmd.company.clone(),
            posting_date: cmd.posting_date,
            remarks: cmd.remarks.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelReservations) -> Result<Vec<ReservationEvent>, DomainError> {
        let note = match cmd.reason.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => format!(
                "Cancelled with {} on {}: {reason}",
                cmd.voucher,
                cmd.occurred_at.format("%Y-%m-%d %H:%M:%S")
            ),
            _ => format!(
                "Cancelled with {} on {}",
                cmd.voucher,
                cmd.occurred_at.format("%Y-%m-%d %H:%M:%S")
            ),
        };

        Ok(self
            .matching(&cmd.voucher, cmd.detail_no.as_deref())
            .filter(|r| !r.status.is_terminal())
            .map(|r| {
                ReservationEvent::ReservationCancelled(ReservationCancelled {
                    key: cmd.key.clone(),
                    reservation_id: r.id,
                    note: note.clone(),
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    fn handle_set_delivered(&self, cmd: &SetDeliveredQty) -> Result<Vec<ReservationEvent>, DomainError> {
        if cmd.delivered_qty < Decimal::ZERO {
            return Err(DomainError::validation("delivered_qty cannot be negative"));
        }

        Ok(self
            .matching(&cmd.voucher, cmd.detail_no.as_deref())
            .filter(|r| !r.status.is_terminal() && r.delivered_qty != cmd.delivered_qty)
            .map(|r| {
                ReservationEvent::DeliveredQtyUpdated(DeliveredQtyUpdated {
                    key: cmd.key.clone(),
                    reservation_id: r.id,
                    delivered_qty: cmd.delivered_qty,
                    status: ReservationStatus::derive(r.reserved_qty, cmd.delivered_qty),
                    correction: cmd.delivered_qty < r.delivered_qty,
                    delivery: None,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    fn handle_record_delivery(&self, cmd: &RecordDelivery) -> Result<Vec<ReservationEvent>, DomainError> {
        if cmd.qty < Decimal::ZERO {
            return Err(DomainError::validation("delivered qty cannot be negative"));
        }

        Ok(self
            .matching(&cmd.voucher, cmd.detail_no.as_deref())
            .filter(|r| !r.status.is_terminal())
            .filter_map(|r| {
                let shares = self.delivery_shares.get(&r.id);
                let previous = shares
                    .and_then(|s| s.get(&cmd.note))
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if previous == cmd.qty {
                    return None;
                }
                let others: Decimal = shares
                    .into_iter()
                    .flatten()
                    .filter(|(note, _)| *note != &cmd.note)
                    .map(|(_, qty)| *qty)
                    .sum();
                let delivered_qty = others + cmd.qty;
                Some(ReservationEvent::DeliveredQtyUpdated(DeliveredQtyUpdated {
                    key: cmd.key.clone(),
                    reservation_id: r.id,
                    delivered_qty,
                    status: ReservationStatus::derive(r.reserved_qty, delivered_qty),
                    correction: delivered_qty < r.delivered_qty,
                    delivery: Some(DeliveryShare {
                        note: cmd.note.clone(),
                        qty: cmd.qty,
                    }),
                    occurred_at: cmd.occurred_at,
                }))
            })
            .collect())
    }

    fn handle_mark_delivered(&self, cmd: &MarkDelivered) -> Result<Vec<ReservationEvent>, DomainError> {
        Ok(self
            .matching(&cmd.voucher, cmd.detail_no.as_deref())
            .filter(|r| !r.status.is_terminal())
            .map(|r| {
                ReservationEvent::DeliveredQtyUpdated(DeliveredQtyUpdated {
                    key: cmd.key.clone(),
                    reservation_id: r.id,
                    delivered_qty: r.reserved_qty,
                    status: ReservationStatus::Delivered,
                    correction: false,
                    delivery: None,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }
}
