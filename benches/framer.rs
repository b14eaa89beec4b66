use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::RngCore;
use tempfile::TempDir;

use cft::{ChunkFramer, Config, InlineFlag, Reassembler, Sentinel, Step, MAX_CHUNK};

fn bench_framer(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("framer");

    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);
        let path = dir.path().join(format!("src_{size}.bin"));
        std::fs::write(&path, &data).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("split", size), &path, |b, path| {
            b.iter(|| {
                let framer = ChunkFramer::open(path, MAX_CHUNK, Sentinel).unwrap();
                let mut total = 0usize;
                for chunk in framer {
                    total += chunk.unwrap().len();
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let src_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let config = Config::default().with_output_dir(out_dir.path());

    let size = 1024 * 1024;
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    let path = src_dir.path().join("round_trip.bin");
    std::fs::write(&path, &data).unwrap();

    let mut group = c.benchmark_group("reassembler");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("inline_flag_buffered", |b| {
        b.iter(|| {
            let framer = ChunkFramer::open(&path, MAX_CHUNK, InlineFlag).unwrap();
            let mut reassembler =
                Reassembler::new(InlineFlag, &config, &config.rpc_prefix).buffered();
            reassembler.begin("round_trip.bin", None).unwrap();

            for chunk in framer {
                if let Step::Done(received) = reassembler.push(chunk.unwrap()).unwrap() {
                    return black_box(received.bytes);
                }
            }
            0
        });
    });

    group.finish();
}

criterion_group!(benches, bench_framer, bench_round_trip);
criterion_main!(benches);
