//! Mixer Throughput Benchmark
//!
//! Measures one device request worth of mixing with many in-memory sounds
//! playing at once.
//!
//! **Goal:** A 1024-frame request must mix far faster than its 21 ms of audio

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rtmix_common::config::StreamingConfig;
use rtmix_common::Category;
use rtmix_engine::playback::{DecodeWorkerPool, PlaybackHandle};
use rtmix_engine::resource::InMemoryResource;
use rtmix_engine::{AudioFormat, AudioManager, ResourceKey};
use std::sync::Arc;

const BUFFER_FRAMES: u32 = 1024;

fn manager_with_sounds(count: usize) -> (AudioManager, Vec<PlaybackHandle>) {
    let workers = Arc::new(DecodeWorkerPool::new(1).unwrap());
    let manager = AudioManager::headless(
        AudioFormat::stereo(48_000, BUFFER_FRAMES),
        workers,
        StreamingConfig::default(),
    )
    .unwrap();

    // 10 s of stereo per sound
    let samples: Vec<i16> = (0..48_000 * 10 * 2).map(|i| ((i % 2000) as i16) - 1000).collect();

    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let category = Category::ALL[id % Category::COUNT];
        let key = ResourceKey::new(category, id as i32);
        manager.insert_resource(Arc::new(InMemoryResource::new(key, samples.clone())));

        let handle = manager.get_sound(category, id as i32).unwrap();
        handle.set_looping(true);
        handle.set_volume(0.5);
        handle.play().unwrap();
        handles.push(handle);
    }

    (manager, handles)
}

fn bench_mix_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_request");

    for count in [1usize, 8, 32, 128] {
        let (manager, _handles) = manager_with_sounds(count);
        let mut out = vec![0i16; BUFFER_FRAMES as usize * 2];

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                manager.render(&mut out);
                black_box(&out);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mix_request);
criterion_main!(benches);
