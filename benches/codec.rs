use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use saunalink::protocol::{CMD_CONTROL, CMD_DP_QUERY, build_frame, try_parse_one_frame};

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let payload = vec![0xA5u8; 112];
    let prefix = [0x33u8, 0x2E, 0x33, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0];
    group.throughput(Throughput::Bytes((payload.len() + prefix.len()) as u64));
    group.bench_function("build_control_frame", |b| {
        b.iter(|| {
            black_box(build_frame(1, CMD_CONTROL, &payload, &prefix));
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    // Worst realistic case: the frame sits behind a page of garbage.
    let frame = build_frame(1, CMD_DP_QUERY, &vec![0xA5u8; 112], &[]);
    let mut stream = vec![0x17u8; 1024];
    stream.extend_from_slice(&frame);
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("scan_after_garbage", |b| {
        b.iter(|| {
            black_box(try_parse_one_frame(&stream).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_scan);
criterion_main!(benches);
