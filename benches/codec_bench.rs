//! Throughput of line framing and command parsing.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use andino_protocol::{EventTag, LineCodec, Sequencer, parse_line};
use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

const COMMANDS: &[&str] = &[
    "REL1 1",
    "RPU3 500",
    "POLL 20",
    "DISP TXT t0 Hello World",
    "OLED <{Temp}{21.5}><{Hum}{40}>",
    "CHNP 110000",
];

fn bench_decode_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let wire: Vec<u8> = COMMANDS
        .iter()
        .flat_map(|line| format!("{line}\r\n").into_bytes())
        .collect();
    group.throughput(Throughput::Elements(COMMANDS.len() as u64));

    group.bench_function("decode_command_burst", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut buffer = BytesMut::from(&wire[..]);
            while let Some(line) = codec.decode(&mut buffer).unwrap() {
                black_box(line);
            }
        });
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(COMMANDS.len() as u64));

    group.bench_function("parse_line", |b| {
        b.iter(|| {
            for line in COMMANDS {
                black_box(parse_line(black_box(line)));
            }
        });
    });
    group.finish();
}

fn bench_encode_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    let seq = Sequencer::new();

    group.bench_function("encode_rfid_event", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut buffer = BytesMut::new();
            let line = seq.tagged(EventTag::Rfid, black_box("04A1B2C3D4"));
            codec.encode(line, &mut buffer).unwrap();
            black_box(buffer);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode_burst, bench_parse, bench_encode_events);
criterion_main!(benches);
