use bt_serial::{Encoding, LineCodec};
use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;
use tokio_util::codec::Decoder;

fn sample(lines: usize, width: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(lines * (width + 1));
    for i in 0..lines {
        data.extend(std::iter::repeat(b'a' + (i % 26) as u8).take(width));
        data.push(b'\n');
    }
    data
}

fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> usize {
    let mut count = 0;
    while let Ok(Some(line)) = codec.decode(buf) {
        black_box(line);
        count += 1;
    }
    count
}

pub fn bench_line_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_decode");

    for width in [16usize, 256, 4096] {
        let data = sample(256, width);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("utf8", width), &data, |b, data| {
            b.iter(|| {
                let mut codec = LineCodec::new(Encoding::Utf8);
                let mut buf = BytesMut::from(&data[..]);
                decode_all(&mut codec, &mut buf)
            })
        });
    }

    // Worst case for rescanning: input arrives a few bytes at a time.
    let data = sample(64, 512);
    group.bench_function("chunked_arrival", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new(Encoding::Latin1);
            let mut buf = BytesMut::new();
            let mut count = 0;
            for chunk in data.chunks(7) {
                buf.extend_from_slice(chunk);
                count += decode_all(&mut codec, &mut buf);
            }
            count
        })
    });

    group.finish();
}

pub fn bench_encoding(c: &mut Criterion) {
    let text = "température 21.5°C, humidité 40%\n".repeat(32);
    c.bench_function("encode_latin1", |b| {
        b.iter(|| black_box(Encoding::Latin1.encode(black_box(&text))))
    });
    c.bench_function("encode_ascii", |b| {
        b.iter(|| black_box(Encoding::Ascii.encode(black_box(&text))))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_line_decoding, bench_encoding
}
criterion_main!(benches);
