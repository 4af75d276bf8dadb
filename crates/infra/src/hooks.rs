//! Voucher lifecycle hooks driving the reservation ledger.
//!
//! | voucher        | validate            | submit                   | cancel                  |
//! |----------------|---------------------|--------------------------|-------------------------|
//! | Sales Invoice  | availability check  | reserve every line       | cancel its reservations |
//! | Stock Entry    | availability check  | reserve every line       | cancel its reservations |
//! | Delivery Note  | (none)              | record its line shares   | withdraw its shares     |
//!
//! Every hook is gated by `ReservationSettings`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, instrument};

use stockhold_core::{ItemCode, StockKey, WarehouseId};
use stockhold_events::{EventBus, EventEnvelope};
use stockhold_reservations::{
    AvailabilityCheck, PhysicalStock, ReservationSettings, Role, Voucher, VoucherLine, VoucherType,
};

use crate::event_store::EventStore;
use crate::ledger::{LedgerError, ReservationLedger, ReservationRequest};

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    InsufficientStock(ValidationReport),
}

/// One line of a voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherItem {
    pub detail_no: String,
    pub item_code: ItemCode,
    pub warehouse: WarehouseId,
    pub qty: Decimal,
    /// For delivery note lines: the sales invoice line being fulfilled.
    pub against: Option<VoucherLine>,
}

impl VoucherItem {
    pub fn new(
        detail_no: impl Into<String>,
        item_code: impl Into<ItemCode>,
        warehouse: impl Into<WarehouseId>,
        qty: Decimal,
    ) -> Self {
        Self {
            detail_no: detail_no.into(),
            item_code: item_code.into(),
            warehouse: warehouse.into(),
            qty,
            against: None,
        }
    }

    pub fn against(mut self, line: VoucherLine) -> Self {
        self.against = Some(line);
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_code.clone(), self.warehouse.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherDocument {
    pub voucher: Voucher,
    pub company: Option<String>,
    pub posting_date: Option<NaiveDate>,
    pub items: Vec<VoucherItem>,
}

impl VoucherDocument {
    pub fn new(voucher: Voucher) -> Self {
        Self {
            voucher,
            company: None,
            posting_date: None,
            items: Vec::new(),
        }
    }

    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn posting_date(mut self, date: NaiveDate) -> Self {
        self.posting_date = Some(date);
        self
    }

    pub fn item(mut self, item: VoucherItem) -> Self {
        self.items.push(item);
        self
    }

    fn holds_stock(&self) -> bool {
        matches!(
            self.voucher.voucher_type(),
            VoucherType::SalesInvoice | VoucherType::StockEntry
        )
    }

    /// Required quantity per (item, warehouse), lines summed.
    fn required_by_key(&self) -> BTreeMap<StockKey, Decimal> {
        let mut required = BTreeMap::new();
        for item in self.items.iter().filter(|i| i.qty > Decimal::ZERO) {
            *required.entry(item.key()).or_insert(Decimal::ZERO) += item.qty;
        }
        required
    }
}

/// Outcome of validating a voucher save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub checks: Vec<AvailabilityCheck>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.is_valid)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AvailabilityCheck> {
        self.checks.iter().filter(|c| !c.is_valid)
    }

    /// Turn a failing report into an error for callers that block the save.
    pub fn ensure_valid(self) -> Result<(), HookError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(HookError::InsufficientStock(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for check in self.failures() {
            if !first {
                f.write_str("\n")?;
            }
            f.write_str(&check.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Sales invoice / delivery note / stock entry callbacks.
#[derive(Debug)]
pub struct VoucherHooks<S, B, P> {
    settings: ReservationSettings,
    ledger: Arc<ReservationLedger<S, B, P>>,
}

impl<S, B, P> VoucherHooks<S, B, P>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: PhysicalStock,
{
    pub fn new(settings: ReservationSettings, ledger: Arc<ReservationLedger<S, B, P>>) -> Self {
        Self { settings, ledger }
    }

    pub fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &ReservationLedger<S, B, P> {
        &self.ledger
    }

    /// Save-time availability check, ignoring the voucher's own reservations.
    #[instrument(skip(self, doc, roles), fields(voucher = %doc.voucher))]
    pub fn validate(&self, doc: &VoucherDocument, roles: &[Role]) -> Result<ValidationReport, HookError> {
        if !doc.holds_stock() || !self.settings.should_validate(doc.voucher.voucher_type(), roles) {
            debug!("availability validation skipped");
            return Ok(ValidationReport::default());
        }

        let checks = doc
            .required_by_key()
            .into_iter()
            .map(|(key, required)| {
                self.ledger
                    .validate_stock_availability(&key, required, Some(&doc.voucher))
            })
            .collect::<Result<_, _>>()?;
        Ok(ValidationReport { checks })
    }

    /// Returns the number of lines that now hold or report against a reservation.
    #[instrument(skip(self, doc), fields(voucher = %doc.voucher))]
    pub fn on_submit(&self, doc: &VoucherDocument) -> Result<usize, HookError> {
        if !self.settings.is_enabled_for(doc.voucher.voucher_type()) {
            return Ok(0);
        }

        match doc.voucher.voucher_type() {
            VoucherType::SalesInvoice | VoucherType::StockEntry => self.reserve_lines(doc),
            VoucherType::DeliveryNote => self.report_deliveries(doc),
        }
    }

    /// Returns the number of reservations cancelled or corrected.
    #[instrument(skip(self, doc), fields(voucher = %doc.voucher))]
    pub fn on_cancel(&self, doc: &VoucherDocument) -> Result<usize, HookError> {
        if !self.settings.is_enabled_for(doc.voucher.voucher_type()) {
            return Ok(0);
        }

        match doc.voucher.voucher_type() {
            VoucherType::SalesInvoice | VoucherType::StockEntry => {
                Ok(self.ledger.cancel_reservation(&doc.voucher, None)?)
            }
            VoucherType::DeliveryNote => self.withdraw_deliveries(doc),
        }
    }

    fn reserve_lines(&self, doc: &VoucherDocument) -> Result<usize, HookError> {
        let mut reserved = 0;
        for item in &doc.items {
            let mut request =
                ReservationRequest::new(item.key(), item.qty, doc.voucher.clone()).detail_no(&item.detail_no);
            request.company = doc.company.clone();
            request.posting_date = doc.posting_date;

            if self.ledger.create_reservation(request)?.is_some() {
                reserved += 1;
            }
        }
        info!(reserved, lines = doc.items.len(), "voucher submitted");
        Ok(reserved)
    }

    fn report_deliveries(&self, doc: &VoucherDocument) -> Result<usize, HookError> {
        self.share_deliveries(doc, |item| item.qty.max(Decimal::ZERO))
    }

    fn withdraw_deliveries(&self, doc: &VoucherDocument) -> Result<usize, HookError> {
        self.share_deliveries(doc, |_| Decimal::ZERO)
    }

    /// Record each line's share against the invoice line it fulfils. Lines of
    /// one note hitting the same invoice line are summed first.
    fn share_deliveries(
        &self,
        doc: &VoucherDocument,
        share: impl Fn(&VoucherItem) -> Decimal,
    ) -> Result<usize, HookError> {
        let mut shares: BTreeMap<&VoucherLine, Decimal> = BTreeMap::new();
        for item in &doc.items {
            if let Some(line) = &item.against {
                *shares.entry(line).or_insert(Decimal::ZERO) += share(item);
            }
        }

        let mut updated = 0;
        for (line, qty) in shares {
            updated += self
                .ledger
                .record_delivery(&line.voucher, line.detail_no.as_deref(), &doc.voucher, qty)?;
        }
        info!(updated, "delivery note shares recorded");
        Ok(updated)
    }
}
