use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use cubemerch_accounts::{Account, AccountCommand, AccountId, DebitCredits, OpenAccount};
use cubemerch_core::AggregateId;
use cubemerch_events::{EventEnvelope, InMemoryEventBus};
use cubemerch_infra::command_dispatcher::CommandDispatcher;
use cubemerch_infra::event_store::InMemoryEventStore;
use cubemerch_pricing::{compute_quote, PricingConfig};

fn setup_dispatcher() -> (
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>,
    AccountId,
) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus);

    let account_id = AccountId::new(AggregateId::new());
    dispatcher
        .dispatch::<Account>(
            account_id.0,
            "accounts.account",
            AccountCommand::OpenAccount(OpenAccount {
                account_id,
                initial_credits: u64::MAX / 2,
                occurred_at: Utc::now(),
            }),
            |id| Account::empty(AccountId::new(id)),
        )
        .expect("open account");

    (dispatcher, account_id)
}

fn bench_quote_calculator(c: &mut Criterion) {
    let config = PricingConfig::default();
    let mut group = c.benchmark_group("quote_calculator");
    group.throughput(Throughput::Elements(1));

    for credits in [0u64, 100, 100_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(credits),
            &credits,
            |b, &credits| {
                b.iter(|| {
                    compute_quote(
                        black_box(&config),
                        black_box(Decimal::new(2999, 2)),
                        black_box(credits),
                    )
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_debit_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("debit_dispatch");
    group.throughput(Throughput::Elements(1));

    // Latency of one debit command through load → rehydrate → handle →
    // append → publish, as the stream grows.
    group.bench_function("single_debit", |b| {
        let (dispatcher, account_id) = setup_dispatcher();
        b.iter(|| {
            dispatcher
                .dispatch::<Account>(
                    account_id.0,
                    "accounts.account",
                    AccountCommand::DebitCredits(DebitCredits {
                        account_id,
                        amount: 1,
                        redemption_id: AggregateId::new(),
                        occurred_at: Utc::now(),
                    }),
                    |id| Account::empty(AccountId::new(id)),
                )
                .expect("debit")
        });
    });

    group.finish();
}

criterion_group!(benches, bench_quote_calculator, bench_debit_dispatch);
criterion_main!(benches);
