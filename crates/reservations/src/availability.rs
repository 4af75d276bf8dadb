//! Availability checks: physical stock minus outstanding reservations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockhold_core::StockKey;

/// Outcome of checking a required quantity against available stock.
///
/// A failed check is data for the caller, not an error. `available_qty` is
/// never clamped: a negative value means reservations exceed physical stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCheck {
    pub key: StockKey,
    pub required_qty: Decimal,
    pub physical_qty: Decimal,
    pub reserved_qty: Decimal,
    pub available_qty: Decimal,
    pub is_valid: bool,
    /// Empty when valid; itemized explanation otherwise.
    pub message: String,
}

impl AvailabilityCheck {
    pub fn evaluate(
        key: StockKey,
        required_qty: Decimal,
        physical_qty: Decimal,
        reserved_qty: Decimal,
    ) -> Self {
        let available_qty = physical_qty - reserved_qty;
        let is_valid = required_qty <= available_qty;
        let mut check = Self {
            key,
            required_qty,
            physical_qty,
            reserved_qty,
            available_qty,
            is_valid,
            message: String::new(),
        };
        if !is_valid {
            check.message = check.shortage_message();
        }
        check
    }

    /// `required - available`, zero when the check passes.
    pub fn shortage(&self) -> Decimal {
        (self.required_qty - self.available_qty).max(Decimal::ZERO)
    }

    fn shortage_message(&self) -> String {
        format!(
            "Insufficient stock for item {item} in warehouse {warehouse}: \
             required {required}, physical {physical}, reserved {reserved}, \
             available {available}, shortage {shortage}",
            item = self.key.item_code,
            warehouse = self.key.warehouse,
            required = self.required_qty.normalize(),
            physical = self.physical_qty.normalize(),
            reserved = self.reserved_qty.normalize(),
            available = self.available_qty.normalize(),
            shortage = self.shortage().normalize(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> StockKey {
        StockKey::new("ITEM-A", "WH-1")
    }

    #[test]
    fn sufficient_stock_is_valid_with_empty_message() {
        let check = AvailabilityCheck::evaluate(key(), dec!(20), dec!(100), dec!(80));
        assert!(check.is_valid);
        assert_eq!(check.available_qty, dec!(20));
        assert_eq!(check.shortage(), Decimal::ZERO);
        assert!(check.message.is_empty());
    }

    #[test]
    fn shortage_message_is_itemized() {
        let check = AvailabilityCheck::evaluate(key(), dec!(25), dec!(100), dec!(80));
        assert!(!check.is_valid);
        assert_eq!(check.shortage(), dec!(5));
        assert_eq!(
            check.message,
            "Insufficient stock for item ITEM-A in warehouse WH-1: required 25, physical 100, \
             reserved 80, available 20, shortage 5"
        );
    }

    #[test]
    fn over_commitment_reports_negative_availability() {
        let check = AvailabilityCheck::evaluate(key(), dec!(1), dec!(10), dec!(15.50));
        assert_eq!(check.available_qty, dec!(-5.50));
        assert!(check.message.contains("available -5.5"));
        assert!(check.message.contains("shortage 6.5"));
    }
}
