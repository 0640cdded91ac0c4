use criterion::{criterion_group, criterion_main, Criterion};
use jamroom_session::engine::{MixerConfig, MixingEngine};
use jamroom_session::protocol::{ClientEvent, ServerEvent};
use jamroom_session::SessionArchive;
use std::hint::black_box;
use uuid::Uuid;

fn engine_with(performers: usize) -> (MixingEngine, Vec<Uuid>) {
    let mut engine = MixingEngine::new(MixerConfig::default()).unwrap();
    let ids: Vec<Uuid> = (0..performers).map(|_| Uuid::new_v4()).collect();
    for id in &ids {
        engine.add_performer(*id).unwrap();
    }
    (engine, ids)
}

fn bench_mix_cycle(c: &mut Criterion) {
    for performers in [2usize, 8] {
        let (mut engine, ids) = engine_with(performers);
        let block = vec![0.1f32; engine.config().block_size];

        c.bench_function(&format!("mix_cycle_{performers}_performers"), |b| {
            b.iter(|| {
                let mut mixed = None;
                for id in &ids {
                    mixed = engine.buffer_and_process(*id, black_box(&block)).unwrap();
                }
                black_box(mixed);
            })
        });
    }
}

fn bench_partial_packets(c: &mut Criterion) {
    let (mut engine, ids) = engine_with(4);
    // Typical browser capture size, four packets per block
    let packet = vec![0.1f32; 256];

    c.bench_function("buffer_256_sample_packets", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(engine.buffer_and_process(*id, black_box(&packet)).unwrap());
            }
        })
    });
}

fn bench_export(c: &mut Criterion) {
    let mut archive = SessionArchive::new();
    // ~10 seconds at 44.1 kHz
    let block: Vec<f32> = (0..1024).map(|i| ((i as f32) * 0.01).sin() * 1.2).collect();
    for _ in 0..430 {
        archive.append(&block);
    }

    c.bench_function("export_pcm16_10s", |b| {
        b.iter(|| {
            black_box(black_box(&archive).export());
        })
    });
}

fn bench_audio_codec(c: &mut Criterion) {
    let send = ClientEvent::SendAudio {
        samples: vec![0.25; 1024],
    };
    let play = ServerEvent::PlayAudio(vec![0.25; 1024]).encode().unwrap();

    c.bench_function("send_audio_encode_1024", |b| {
        b.iter(|| black_box(black_box(&send).encode().unwrap()))
    });
    c.bench_function("play_audio_decode_1024", |b| {
        b.iter(|| black_box(ServerEvent::decode(black_box(&play)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_mix_cycle,
    bench_partial_packets,
    bench_export,
    bench_audio_codec,
);
criterion_main!(benches);
