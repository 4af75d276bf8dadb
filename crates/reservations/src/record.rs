//! Reservation records and their status lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockhold_core::{Entity, ReservationId, StockKey};

use crate::voucher::{Voucher, VoucherLine};

/// Reservation status.
///
/// `Reserved` is the only initial state; `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    #[serde(rename = "Partially Delivered")]
    PartiallyDelivered,
    Delivered,
    Cancelled,
}

impl ReservationStatus {
    /// Status of a non-cancelled record with the given quantities.
    pub fn derive(reserved_qty: Decimal, delivered_qty: Decimal) -> Self {
        if delivered_qty >= reserved_qty {
            ReservationStatus::Delivered
        } else if delivered_qty > Decimal::ZERO {
            ReservationStatus::PartiallyDelivered
        } else {
            ReservationStatus::Reserved
        }
    }

    /// Counts against availability.
    pub fn is_outstanding(self) -> bool {
        matches!(
            self,
            ReservationStatus::Reserved | ReservationStatus::PartiallyDelivered
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Delivered | ReservationStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "Reserved",
            ReservationStatus::PartiallyDelivered => "Partially Delivered",
            ReservationStatus::Delivered => "Delivered",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// One soft hold on stock for one voucher line in one (item, warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: ReservationId,
    pub key: StockKey,
    pub line: VoucherLine,
    pub reserved_qty: Decimal,
    pub delivered_qty: Decimal,
    pub status: ReservationStatus,
    pub company: Option<String>,
    pub posting_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity for ReservationRecord {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl ReservationRecord {
    pub fn voucher(&self) -> &Voucher {
        &self.line.voucher
    }

    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }

    /// `reserved - delivered`, never below zero (over-delivery holds nothing).
    pub fn pending_qty(&self) -> Decimal {
        (self.reserved_qty - self.delivered_qty).max(Decimal::ZERO)
    }

    /// Quantity this record currently withholds from availability.
    pub fn outstanding_qty(&self) -> Decimal {
        if self.status.is_outstanding() {
            self.pending_qty()
        } else {
            Decimal::ZERO
        }
    }

    /// Same natural key: identical voucher and line (item/warehouse are implied by the bucket).
    pub fn is_same_line(&self, line: &VoucherLine) -> bool {
        &self.line == line
    }

    /// Append an audit note to `remarks`.
    pub fn append_remark(&mut self, note: &str) {
        self.remarks = Some(match self.remarks.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn record(reserved: Decimal, delivered: Decimal) -> ReservationRecord {
        ReservationRecord {
            id: ReservationId::new(),
            key: StockKey::new("ITEM-A", "WH-1"),
            line: VoucherLine::new(Voucher::sales_invoice("SI-001"), Some("d1")),
            reserved_qty: reserved,
            delivered_qty: delivered,
            status: ReservationStatus::derive(reserved, delivered),
            company: None,
            posting_date: None,
            remarks: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn derive_covers_each_band() {
        assert_eq!(ReservationStatus::derive(dec!(10), dec!(0)), ReservationStatus::Reserved);
        assert_eq!(
            ReservationStatus::derive(dec!(10), dec!(0.5)),
            ReservationStatus::PartiallyDelivered
        );
        assert_eq!(ReservationStatus::derive(dec!(10), dec!(10)), ReservationStatus::Delivered);
        assert_eq!(ReservationStatus::derive(dec!(10), dec!(12)), ReservationStatus::Delivered);
    }

    #[test]
    fn status_serializes_with_display_labels() {
        let json = serde_json::to_value(ReservationStatus::PartiallyDelivered).unwrap();
        assert_eq!(json, serde_json::json!("Partially Delivered"));
    }

    #[test]
    fn cancelled_record_withholds_nothing() {
        let mut r = record(dec!(10), dec!(2));
        assert_eq!(r.outstanding_qty(), dec!(8));
        r.status = ReservationStatus::Cancelled;
        assert_eq!(r.outstanding_qty(), Decimal::ZERO);
        assert!(!r.is_active());
    }

    #[test]
    fn remarks_accumulate_audit_notes() {
        let mut r = record(dec!(1), dec!(0));
        r.append_remark("first");
        r.append_remark("second");
        assert_eq!(r.remarks.as_deref(), Some("first\nsecond"));
    }

    proptest! {
        #[test]
        fn derived_status_matches_quantities(reserved in 1u32..10_000, delivered in 0u32..20_000) {
            let r = Decimal::from(reserved);
            let d = Decimal::from(delivered);
            let status = ReservationStatus::derive(r, d);
            match status {
                ReservationStatus::Delivered => prop_assert!(d >= r),
                ReservationStatus::PartiallyDelivered => prop_assert!(d > Decimal::ZERO && d < r),
                ReservationStatus::Reserved => prop_assert!(d.is_zero()),
                ReservationStatus::Cancelled => prop_assert!(false, "derive never cancels"),
            }
        }

        #[test]
        fn pending_is_never_negative(reserved in 1u32..10_000, delivered in 0u32..20_000) {
            let rec = record(Decimal::from(reserved), Decimal::from(delivered));
            prop_assert!(rec.pending_qty() >= Decimal::ZERO);
        }
    }
}
