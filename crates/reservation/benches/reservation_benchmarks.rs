use std::sync::Arc;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use stockgate_core::{Sku, WarehouseId};
use stockgate_events::InMemoryEventBus;
use stockgate_ledger::{InMemoryLedgerStore, LedgerStore, StockLedgerEntry};
use stockgate_reservation::{
    InMemoryReservationStore, ReservationManager, StockEvent,
};

type BenchManager = ReservationManager<
    Arc<InMemoryLedgerStore>,
    Arc<InMemoryReservationStore>,
    Arc<InMemoryEventBus<StockEvent>>,
>;

fn setup(on_hand: u64) -> (Arc<BenchManager>, Sku, WarehouseId) {
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let reservations = Arc::new(InMemoryReservationStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let sku = Sku::new("BENCH-SKU").unwrap();
    let warehouse = WarehouseId::new();

    ledger
        .put(StockLedgerEntry::new(sku.clone(), warehouse, on_hand))
        .unwrap();

    let manager = Arc::new(ReservationManager::new(ledger, reservations, bus));
    (manager, sku, warehouse)
}

fn bench_reserve_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("uncontended", |b| {
        let (manager, sku, warehouse) = setup(1_000_000);
        b.iter(|| {
            let reservation = manager
                .reserve(black_box(&sku), warehouse, 1, None, None)
                .unwrap();
            manager.release(reservation.id).unwrap();
        });
    });

    group.finish();
}

fn bench_contended_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_reserve");
    group.throughput(Throughput::Elements(8));

    group.bench_function("8_threads_one_sku", |b| {
        let (manager, sku, warehouse) = setup(u64::MAX / 2);
        b.iter(|| {
            let mut handles = Vec::with_capacity(8);
            for _ in 0..8 {
                let manager = manager.clone();
                let sku = sku.clone();
                handles.push(std::thread::spawn(move || {
                    loop {
                        match manager.reserve(&sku, warehouse, 1, None, None) {
                            Ok(r) => break r,
                            Err(_) => continue,
                        }
                    }
                }));
            }
            for h in handles {
                let reservation = h.join().unwrap();
                manager.release(reservation.id).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_insufficient_stock_path(c: &mut Criterion) {
    c.bench_function("insufficient_stock_rejection", |b| {
        let (manager, sku, warehouse) = setup(1);
        b.iter(|| {
            let err = manager
                .reserve(black_box(&sku), warehouse, 5, None, None)
                .unwrap_err();
            black_box(err);
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release_cycle,
    bench_contended_reserve,
    bench_insufficient_stock_path
);
criterion_main!(benches);
