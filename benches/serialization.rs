//! Serialization benchmarks
//!
//! Measures message building, encoding and decoding without network I/O.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mlc_tracking_rust::protocol::{FrameMetadata, SessionGeometry, TrackingMessage};
use ndarray::{ArrayD, IxDyn};

const SIDE: usize = 256;

fn metadata() -> (FrameMetadata, SessionGeometry) {
    let frame = FrameMetadata {
        slice_position_sagittal: 1.0,
        slice_position_coronal: -2.0,
        slice_position_transverse: 30.0,
        width: SIDE / 4,
        height: SIDE / 4,
    };
    let session = SessionGeometry {
        fov_x: 256.0,
        fov_y: 256.0,
        fov_z: 5.0,
    };
    (frame, session)
}

fn image() -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[SIDE, SIDE, 1, 1]), |idx| {
        ((idx[0] * SIDE + idx[1]) % 4096) as f32
    })
}

fn bench_build(c: &mut Criterion) {
    let (frame, session) = metadata();
    let image = image();

    c.bench_function("message_from_parts_256", |b| {
        b.iter(|| {
            let msg = TrackingMessage::from_parts(&frame, &session, image.view(), 4).unwrap();
            black_box(msg)
        });
    });
}

fn bench_encode_decode(c: &mut Criterion) {
    let (frame, session) = metadata();
    let msg = TrackingMessage::from_parts(&frame, &session, image().view(), 4).unwrap();
    let encoded = msg.encode();

    let mut group = c.benchmark_group("message_256");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode", |b| b.iter(|| black_box(msg.encode())));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(TrackingMessage::decode(&encoded, SIDE).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_encode_decode);

criterion_main!(benches);
