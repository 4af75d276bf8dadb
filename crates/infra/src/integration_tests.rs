//! Integration tests for the full reservation pipeline.
//!
//! Tests: StockBin command → EventStore → EventBus → PhysicalStockProjection,
//! and ReservationLedger → bucket streams → ReservationProjection, sharing one
//! store and one bus.
//!
//! Verifies:
//! - Availability arithmetic against projected physical stock
//! - Reservation lifecycle (create, deliver, cancel) and its invariants
//! - Concurrent writers never over-commit a bucket

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::Value as JsonValue;

    use stockhold_core::StockKey;
    use stockhold_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use stockhold_inventory::{OpenBin, PostStockMovement, STOCK_BIN_STREAM, StockBin, StockBinCommand};
    use stockhold_reservations::{
        RESERVATION_BUCKET_STREAM, ReservationEvent, ReservationStatus, Voucher,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::config::LedgerSettings;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::ledger::{ReservationLedger, ReservationRequest, ReserveOutcome};
    use crate::projections::physical_stock::{BinReadModel, PhysicalStockProjection};
    use crate::read_model::InMemoryStore;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Stock = Arc<PhysicalStockProjection<InMemoryStore<StockKey, BinReadModel>>>;
    type Ledger = ReservationLedger<Store, Bus, Stock>;

    struct Harness {
        ledger: Arc<Ledger>,
        stock: Stock,
        bins: CommandDispatcher<Store, Bus>,
        stock_feed: Subscription<EventEnvelope<JsonValue>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(LedgerSettings::default())
        }

        fn with_settings(settings: LedgerSettings) -> Self {
            let store: Store = Arc::new(InMemoryEventStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            // Subscribe before anything is published.
            let stock_feed = bus.subscribe();
            let stock: Stock = Arc::new(PhysicalStockProjection::new(InMemoryStore::new()));

            Self {
                ledger: Arc::new(ReservationLedger::new(store.clone(), bus.clone(), stock.clone(), settings)),
                stock,
                bins: CommandDispatcher::new(store, bus),
                stock_feed,
            }
        }

        /// Post a stock movement and let the physical stock projection consume the bus.
        fn post(&self, key: &StockKey, delta: Decimal) {
            let id = key.stream_id(STOCK_BIN_STREAM);
            let open = StockBinCommand::OpenBin(OpenBin {
                key: key.clone(),
                occurred_at: Utc::now(),
            });
            match self.bins.dispatch(id, STOCK_BIN_STREAM, &open, |_| StockBin::empty(key.clone())) {
                Ok(_) | Err(DispatchError::Conflict(_)) => {}
                Err(e) => panic!("failed to open bin: {e}"),
            }

            let movement = StockBinCommand::PostStockMovement(PostStockMovement {
                key: key.clone(),
                delta,
                voucher_no: "PR-TEST".to_string(),
                occurred_at: Utc::now(),
            });
            self.bins
                .dispatch(id, STOCK_BIN_STREAM, &movement, |_| StockBin::empty(key.clone()))
                .unwrap();

            for env in self.stock_feed.drain() {
                self.stock.apply_envelope(&env).unwrap();
            }
        }
    }

    fn item_a() -> StockKey {
        StockKey::new("ITEM-A", "WH-1")
    }

    fn si(no: &str) -> Voucher {
        Voucher::sales_invoice(no)
    }

    fn request(voucher: &str, detail: &str, qty: Decimal) -> ReservationRequest {
        ReservationRequest::new(item_a(), qty, si(voucher)).detail_no(detail)
    }

    #[test]
    fn lifecycle_walkthrough() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));

        // 1. Reserve 30 of 100.
        let first = h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        assert!(first.is_some());
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(70));

        // 2. Reserve 50 more; 25 no longer fits.
        let second = h.ledger.create_reservation(request("SI-002", "d1", dec!(50))).unwrap();
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(20));
        let check = h.ledger.validate_stock_availability(&item_a(), dec!(25), None).unwrap();
        assert!(!check.is_valid);
        assert_eq!(check.available_qty, dec!(20));
        assert!(check.message.contains("shortage 5"), "{}", check.message);

        // 3. Cancelling SI-001 releases its 30; SI-002 still holds 50.
        assert_eq!(h.ledger.cancel_reservation(&si("SI-001"), None).unwrap(), 1);
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), dec!(50));
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(50));

        // 4. Fully delivering SI-002 drops it from the reserved total.
        assert_eq!(h.ledger.update_delivered_qty(&si("SI-002"), Some("d1"), dec!(50)).unwrap(), 1);
        let record = h.ledger.reservation(second.unwrap()).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Delivered);
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), Decimal::ZERO);
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(100));

        // 5. A delivered line is not reserved again.
        assert_eq!(h.ledger.create_reservation(request("SI-002", "d1", dec!(50))).unwrap(), second);
        assert_eq!(h.ledger.reservations_for_voucher(&si("SI-002")).unwrap().len(), 1);
    }

    #[test]
    fn stock_movements_flow_into_availability() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        h.ledger.create_reservation(request("SI-001", "d1", dec!(60))).unwrap();

        h.post(&item_a(), dec!(-50));
        // Over-commitment is reported, not clamped.
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(-10));

        let other = StockKey::new("ITEM-B", "WH-1");
        h.post(&other, dec!(5));
        assert_eq!(h.ledger.get_available_qty(&other, None).unwrap(), dec!(5));
    }

    #[test]
    fn exclusion_only_removes_the_named_voucher() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        h.ledger.create_reservation(request("SI-001", "d2", dec!(5))).unwrap();
        h.ledger.create_reservation(request("SI-002", "d1", dec!(20))).unwrap();

        assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), dec!(55));
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), Some(&si("SI-001"))).unwrap(), dec!(20));
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), Some(&si("SI-404"))).unwrap(), dec!(55));
        assert_eq!(
            h.ledger.get_reserved_qty(&item_a(), Some(&Voucher::stock_entry("SI-001"))).unwrap(),
            dec!(55)
        );
    }

    #[test]
    fn cancelled_reservations_stay_cancelled() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        let id = h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap().unwrap();
        h.ledger.cancel_reservation(&si("SI-001"), Some("d1")).unwrap();

        assert_eq!(h.ledger.update_delivered_qty(&si("SI-001"), Some("d1"), dec!(10)).unwrap(), 0);
        assert_eq!(h.ledger.mark_reservation_delivered(&si("SI-001"), Some("d1")).unwrap(), 0);
        assert_eq!(h.ledger.reservation(id).unwrap().unwrap().status, ReservationStatus::Cancelled);

        // The line can be reserved afresh once its previous hold is cancelled.
        let again = h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        assert!(again.is_some_and(|new_id| new_id != id));
        assert_eq!(h.ledger.reservations_for_voucher(&si("SI-001")).unwrap().len(), 2);
    }

    #[test]
    fn decreasing_delivery_is_recorded_as_correction() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        h.ledger.update_delivered_qty(&si("SI-001"), Some("d1"), dec!(20)).unwrap();
        h.ledger.update_delivered_qty(&si("SI-001"), Some("d1"), dec!(10)).unwrap();

        let stream = h
            .ledger
            .store()
            .load_stream(item_a().stream_id(RESERVATION_BUCKET_STREAM))
            .unwrap();
        let corrections: Vec<bool> = stream
            .iter()
            .filter_map(|stored| match serde_json::from_value(stored.payload.clone()).unwrap() {
                ReservationEvent::DeliveredQtyUpdated(e) => Some(e.correction),
                _ => None,
            })
            .collect();
        assert_eq!(corrections, vec![false, true]);
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), dec!(20));
    }

    #[test]
    fn concurrent_reserve_if_available_never_overcommits() {
        let h = Harness::with_settings(LedgerSettings {
            max_conflict_retries: 16,
        });
        h.post(&item_a(), dec!(10));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let ledger = h.ledger.clone();
                std::thread::spawn(move || {
                    ledger
                        .reserve_if_available(request(&format!("SI-{i:03}"), "d1", dec!(1)))
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
        let reserved = outcomes
            .iter()
            .filter(|o| matches!(o, ReserveOutcome::Reserved(_)))
            .count();

        assert_eq!(reserved, 10);
        assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), dec!(10));
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn projections_rebuild_from_the_store() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        h.ledger.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        h.ledger.create_reservation(request("SI-002", "d1", dec!(15))).unwrap();
        h.ledger.cancel_reservation(&si("SI-002"), None).unwrap();

        let stock: Stock = Arc::new(PhysicalStockProjection::new(InMemoryStore::new()));
        stock
            .rebuild_from_scratch(
                h.ledger
                    .store()
                    .load_all(STOCK_BIN_STREAM)
                    .unwrap()
                    .iter()
                    .map(|e| e.to_envelope()),
            )
            .unwrap();
        let reopened: Ledger = ReservationLedger::new(
            h.ledger.store().clone(),
            h.ledger.bus().clone(),
            stock,
            LedgerSettings::default(),
        );
        reopened.rebuild_projection().unwrap();

        assert_eq!(reopened.get_reserved_qty(&item_a(), None).unwrap(), dec!(30));
        assert_eq!(reopened.get_available_qty(&item_a(), None).unwrap(), dec!(70));
        assert_eq!(reopened.reservations_for_voucher(&si("SI-002")).unwrap().len(), 1);
    }

    #[test]
    fn second_ledger_on_the_same_store_sees_every_hold() {
        let h = Harness::new();
        h.post(&item_a(), dec!(100));
        let other: Ledger = ReservationLedger::new(
            h.ledger.store().clone(),
            h.ledger.bus().clone(),
            h.stock.clone(),
            LedgerSettings::default(),
        );

        other.create_reservation(request("SI-001", "d1", dec!(30))).unwrap();
        assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(70));
        assert!(!h.ledger.validate_stock_availability(&item_a(), dec!(80), None).unwrap().is_valid);

        // Guarded reservations through either ledger respect the other's holds.
        assert!(matches!(
            h.ledger.reserve_if_available(request("SI-002", "d1", dec!(75))).unwrap(),
            ReserveOutcome::Rejected(_)
        ));

        assert_eq!(h.ledger.cancel_reservation(&si("SI-001"), None).unwrap(), 1);
        assert_eq!(other.get_reserved_qty(&item_a(), None).unwrap(), Decimal::ZERO);
        assert_eq!(
            other.reservations_for_voucher(&si("SI-001")).unwrap()[0].status,
            ReservationStatus::Cancelled
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve { voucher: u8, qty: u32 },
        Deliver { voucher: u8, qty: u32 },
        Cancel { voucher: u8 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 0u32..40).prop_map(|(voucher, qty)| Op::Reserve { voucher, qty }),
            (0u8..4, 0u32..40).prop_map(|(voucher, qty)| Op::Deliver { voucher, qty }),
            (0u8..4).prop_map(|voucher| Op::Cancel { voucher }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn reserved_total_matches_records(ops in proptest::collection::vec(op(), 1..24)) {
            let h = Harness::new();
            h.post(&item_a(), dec!(50));

            for op in &ops {
                match op {
                    Op::Reserve { voucher, qty } => {
                        h.ledger
                            .create_reservation(request(&format!("SI-{voucher}"), "d1", Decimal::from(*qty)))
                            .unwrap();
                    }
                    Op::Deliver { voucher, qty } => {
                        h.ledger
                            .update_delivered_qty(&si(&format!("SI-{voucher}")), Some("d1"), Decimal::from(*qty))
                            .unwrap();
                    }
                    Op::Cancel { voucher } => {
                        h.ledger.cancel_reservation(&si(&format!("SI-{voucher}")), None).unwrap();
                    }
                }
            }

            let records: Vec<_> = (0u8..4)
                .flat_map(|v| h.ledger.reservations_for_voucher(&si(&format!("SI-{v}"))).unwrap())
                .collect();
            let expected: Decimal = records
                .iter()
                .filter(|r| r.status.is_outstanding())
                .map(|r| r.pending_qty())
                .sum();

            prop_assert_eq!(h.ledger.get_reserved_qty(&item_a(), None).unwrap(), expected);
            prop_assert_eq!(h.ledger.get_available_qty(&item_a(), None).unwrap(), dec!(50) - expected);
            for r in &records {
                prop_assert!(r.pending_qty() >= Decimal::ZERO);
                prop_assert_eq!(
                    r.status == ReservationStatus::Cancelled,
                    r.remarks.as_deref().is_some_and(|m| m.contains("Cancelled with"))
                );
                if r.status != ReservationStatus::Cancelled {
                    prop_assert_eq!(r.status, ReservationStatus::derive(r.reserved_qty, r.delivered_qty));
                }
            }
            // At most one live record per line.
            for v in 0u8..4 {
                let active = h
                    .ledger
                    .reservations_for_voucher(&si(&format!("SI-{v}"))).unwrap()
                    .iter()
                    .filter(|r| r.is_active())
                    .count();
                prop_assert!(active <= 1);
            }
        }
    }
}
