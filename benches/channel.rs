//! Guarded write/read latency on a single channel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use semshm::{Channel, ChannelConfig};

fn bench_key(salt: i32) -> i32 {
    (((std::process::id() % 0x7FFFF) as i32) << 11) | 0x600 | (salt & 0x1FF)
}

fn guarded_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded");

    for (salt, size) in [(1, 16usize), (2, 256), (3, 4096)] {
        let chan = Channel::open_with(bench_key(salt), size, ChannelConfig::exclusive())
            .expect("open bench channel");
        let payload = vec![0xA5u8; size];
        let mut buf = vec![0u8; size];

        group.bench_with_input(BenchmarkId::new("write", size), &size, |b, _| {
            b.iter(|| chan.write(black_box(&payload)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("read", size), &size, |b, _| {
            b.iter(|| chan.read(black_box(&mut buf)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("read_modify_write", size), &size, |b, _| {
            b.iter(|| {
                chan.read_modify_write(&mut buf, |bytes| bytes[0] = bytes[0].wrapping_add(1))
                    .unwrap()
            })
        });

        chan.remove().expect("remove bench channel");
    }

    group.finish();
}

criterion_group!(benches, guarded_ops);
criterion_main!(benches);
