//! Benchmark for log encoding, decoding and mirror updates.
//!
//! TARGET: decode + apply well under 1 microsecond per log
//!
//! Run with: cargo bench --package ascent_chain --bench codec_benchmark

use alloy_primitives::Address;
use ascent_chain::{ChainEvent, ChainSyncedState, EventCodec};
use ascent_economy::{Identity, ProgressionEvent};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn claim(byte: u8) -> ProgressionEvent {
    ProgressionEvent::TokensClaimed {
        identity: Identity::repeat_byte(byte),
        amount: 52,
        timestamp: 1_700_003_600,
    }
}

fn benchmark_encode(c: &mut Criterion) {
    let event = claim(1);
    c.bench_function("encode_tokens_claimed", |b| {
        b.iter(|| black_box(EventCodec::encode(black_box(&event), Address::ZERO)));
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let log = EventCodec::encode(&claim(1), Address::ZERO);
    c.bench_function("decode_tokens_claimed", |b| {
        b.iter(|| black_box(EventCodec::decode(black_box(&log.topics), black_box(&log.data), 1)));
    });
}

fn benchmark_mirror(c: &mut Criterion) {
    let mut group = c.benchmark_group("mirror");
    let events: Vec<ChainEvent> = (0..=255u8)
        .flat_map(|byte| {
            let identity = Identity::repeat_byte(byte);
            [
                ProgressionEvent::PlayerCreated { identity, timestamp: 0 },
                claim(byte),
                ProgressionEvent::LevelUpgraded { identity, new_level: 2, timestamp: 1 },
            ]
        })
        .enumerate()
        .map(|(block, event)| ChainEvent::Progression { event, block_number: block as u64 })
        .collect();
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("apply_768_events", |b| {
        b.iter(|| {
            let mut state = ChainSyncedState::new(175, 256);
            black_box(state.process_batch(&events).is_ok());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_mirror);
criterion_main!(benches);
