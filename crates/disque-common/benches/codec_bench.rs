// Criterion benchmarks for the disque-common RESP codec
//
// Run benchmarks with:
//   cargo bench -p disque-common
//
// For detailed output with plots:
//   cargo bench -p disque-common -- --save-baseline main

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use disque_common::transport::RespCodec;
use disque_common::{Command, Reply};

fn bench_command_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_encoding");

    group.bench_function("ping", |b| {
        let cmd = Command::new("PING");
        let mut buf = BytesMut::with_capacity(64);
        b.iter(|| {
            buf.clear();
            RespCodec::encode_command(black_box(&cmd), &mut buf);
        });
    });

    group.bench_function("addjob_1k_payload", |b| {
        let body = "x".repeat(1024);
        let cmd = Command::new("ADDJOB")
            .arg("queue")
            .arg(body)
            .arg(0u64)
            .arg("MAXLEN")
            .arg(100u64);
        let mut buf = BytesMut::with_capacity(2048);
        b.iter(|| {
            buf.clear();
            RespCodec::encode_command(black_box(&cmd), &mut buf);
        });
    });

    group.finish();
}

fn bench_reply_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_decoding");

    group.bench_function("status", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&b"+PONG\r\n"[..]);
            RespCodec::decode_reply(black_box(&mut buf)).unwrap()
        });
    });

    group.bench_function("getjob_batch_of_100", |b| {
        let jobs = (0..100)
            .map(|i| {
                Reply::array(vec![
                    Reply::bulk_str("queue"),
                    Reply::bulk_str(&format!("D-0f0c644f-{:024}-05a1", i)),
                    Reply::bulk_str("payload"),
                ])
            })
            .collect();
        let mut wire = BytesMut::new();
        RespCodec::encode_reply(&Reply::array(jobs), &mut wire);
        b.iter(|| {
            let mut buf = wire.clone();
            RespCodec::decode_reply(black_box(&mut buf)).unwrap()
        });
    });

    group.bench_function("incomplete_frame", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&b"*3\r\n$5\r\nqueue\r\n$40\r\nD-0f0c"[..]);
            RespCodec::decode_reply(black_box(&mut buf)).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_command_encoding, bench_reply_decoding);
criterion_main!(benches);
