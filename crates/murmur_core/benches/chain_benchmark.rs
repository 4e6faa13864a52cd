//! Effect chain and block handoff benchmarks
//!
//! Measures the per-block cost of the processing thread.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use murmur_core::{block_ring, BufferQueue, EffectChain, EffectSettings, StreamConfig};

fn all_enabled() -> EffectSettings {
    let mut settings = EffectSettings::default();
    settings.gate.enabled = true;
    settings.eq.enabled = true;
    settings.de_esser.enabled = true;
    settings.limiter.enabled = true;
    settings
}

fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_chain");

    // Typical hardware block sizes
    for buffer_size in [256u32, 512, 1024, 2048] {
        let stream = StreamConfig {
            sample_rate: 48000,
            channels: 2,
            buffer_size,
        };
        let mut chain = match EffectChain::new(&stream, &all_enabled()) {
            Ok(chain) => chain,
            Err(_) => continue,
        };

        let samples = stream.samples_per_block();
        let input: Vec<f32> = (0..samples).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let mut output = vec![0.0; samples];

        group.throughput(Throughput::Elements(buffer_size as u64));
        group.bench_function(format!("interleaved_{}_frames", buffer_size), |b| {
            b.iter(|| chain.process_interleaved(black_box(&input), black_box(&mut output)));
        });
    }

    group.finish();
}

fn benchmark_handoff(c: &mut Criterion) {
    let block = vec![0.25_f32; 2048];

    c.bench_function("ring_push_pop_2048", |b| {
        let (mut tx, mut rx) = block_ring(block.len() * 4);
        let mut out = vec![0.0; block.len()];
        b.iter(|| {
            let _ = tx.try_push(black_box(&block));
            let _ = rx.try_pop_into(black_box(&mut out));
        })
    });

    c.bench_function("queue_push_pop_2048", |b| {
        let queue = BufferQueue::new(4);
        b.iter(|| {
            queue.push(black_box(block.clone()));
            black_box(queue.pop());
        })
    });
}

criterion_group!(benches, benchmark_chain, benchmark_handoff);
criterion_main!(benches);
