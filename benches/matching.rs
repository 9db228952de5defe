use criterion::{black_box, criterion_group, criterion_main, Criterion};
use matchbook::order::book::tree_map::TreeMap;
use matchbook::order::{Order, OrderType, Side};

fn bench_add_and_sweep(c: &mut Criterion) {
    c.bench_function("rest 1k bids across 50 levels and sweep them", |b| {
        b.iter(|| {
            let mut book = TreeMap::new();
            for i in 0..1_000u64 {
                book.add(Order::new(
                    OrderType::GoodTillCancel,
                    i + 1,
                    Side::Buy,
                    100 + (i % 50) as i32,
                    10,
                ));
            }
            let trades = book.add(Order::new(
                OrderType::GoodTillCancel,
                2_000,
                Side::Sell,
                100,
                10_000,
            ));
            black_box(trades);
        });
    });
}

criterion_group!(benches, bench_add_and_sweep);
criterion_main!(benches);
