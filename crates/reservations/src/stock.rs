use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use stockhold_core::StockKey;

/// Read-only view of physical on-hand stock.
///
/// Owned and mutated by the stock ledger; reservations only read it. Unknown
/// keys report zero.
pub trait PhysicalStock: Send + Sync {
    fn on_hand_qty(&self, key: &StockKey) -> Decimal;
}

/// Fixed snapshot, handy for previews and tests.
impl PhysicalStock for HashMap<StockKey, Decimal> {
    fn on_hand_qty(&self, key: &StockKey) -> Decimal {
        self.get(key).copied().unwrap_or(Decimal::ZERO)
    }
}

impl<S> PhysicalStock for Arc<S>
where
    S: PhysicalStock + ?Sized,
{
    fn on_hand_qty(&self, key: &StockKey) -> Decimal {
        (**self).on_hand_qty(key)
    }
}
