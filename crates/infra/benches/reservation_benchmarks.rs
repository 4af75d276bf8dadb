use std::collections::HashMap;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use stockhold_core::StockKey;
use stockhold_events::{EventEnvelope, InMemoryEventBus};
use stockhold_infra::config::LedgerSettings;
use stockhold_infra::event_store::InMemoryEventStore;
use stockhold_infra::ledger::{ReservationLedger, ReservationRequest};
use stockhold_reservations::Voucher;

type Ledger = ReservationLedger<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    HashMap<StockKey, Decimal>,
>;

fn key() -> StockKey {
    StockKey::new("ITEM-A", "WH-1")
}

fn ledger() -> Ledger {
    ReservationLedger::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
        HashMap::from([(key(), dec!(1_000_000))]),
        LedgerSettings::default(),
    )
}

/// Ledger whose bucket already holds `n` open reservations.
fn ledger_with_history(n: usize) -> Ledger {
    let ledger = ledger();
    for i in 0..n {
        ledger
            .create_reservation(ReservationRequest::new(key(), dec!(1), Voucher::sales_invoice(format!("SI-{i}"))))
            .unwrap();
    }
    ledger
}

fn bench_create_reservation(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_reservation");
    group.throughput(Throughput::Elements(1));

    for history in [0usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("bucket_history", history), &history, |b, &history| {
            let ledger = ledger_with_history(history);
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let request = ReservationRequest::new(key(), dec!(1), Voucher::sales_invoice(format!("BENCH-{n}")));
                black_box(ledger.create_reservation(request).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_availability_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability");

    for history in [10usize, 1_000] {
        let ledger = ledger_with_history(history);
        let exclude = Voucher::sales_invoice("SI-0");

        group.bench_with_input(BenchmarkId::new("get_available_qty", history), &history, |b, _| {
            b.iter(|| black_box(ledger.get_available_qty(&key(), Some(&exclude)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("validate_stock_availability", history), &history, |b, _| {
            b.iter(|| black_box(ledger.validate_stock_availability(&key(), dec!(25), None).unwrap()))
        });
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");
    group.sample_size(20);

    for history in [100usize, 1_000] {
        let ledger = ledger_with_history(history);
        group.throughput(Throughput::Elements(history as u64));
        group.bench_with_input(BenchmarkId::new("rebuild_from_events", history), &history, |b, _| {
            b.iter(|| ledger.rebuild_projection().unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_reservation,
    bench_availability_reads,
    bench_projection_rebuild
);
criterion_main!(benches);
