//! Micro benchmarks for the result path of a probe-daemon session:
//! uudecoding a data block and decoding the records it carries.
//! Pure CPU - no sockets.
//!
//! ```bash
//! cargo bench --bench bench_warts
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use revtr_lib::model::Ping;
use revtr_lib::uuencode;
use revtr_lib::warts::{self, Record, RecordType};
use std::net::Ipv4Addr;

#[path = "../tests/helpers.rs"]
mod helpers;

const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DST: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
const FILTER: &[RecordType] = &[RecordType::Ping, RecordType::Traceroute];

/// Header records followed by a ten-reply ping, as one session sees them.
fn session_stream() -> Vec<u8> {
    let rtts: Vec<u32> = (1..=10).map(|i| i * 1_250).collect();
    [
        helpers::list_record("default"),
        helpers::cycle_start_record(1_700_000_000),
        helpers::ping_record(1, SRC, DST, &rtts),
    ]
    .concat()
}

fn bench_warts_parse(c: &mut Criterion) {
    let data = session_stream();
    match warts::parse(&data, FILTER) {
        Ok(records) if records.len() == 1 => {}
        Ok(records) => panic!("fixture produced {} measurements", records.len()),
        Err(e) => panic!("fixture parse error: {e}"),
    }

    c.bench_function("warts_parse_ping_ten_replies", |b| {
        b.iter(|| warts::parse(std::hint::black_box(&data), FILTER));
    });
}

fn bench_data_block(c: &mut Criterion) {
    let encoded = uuencode::encode(&session_stream());

    c.bench_function("uudecode_and_convert_ping", |b| {
        b.iter(|| {
            let bytes = uuencode::decode(std::hint::black_box(&encoded)).unwrap_or_default();
            warts::parse(&bytes, FILTER)
                .unwrap_or_default()
                .iter()
                .filter_map(|r| match r {
                    Record::Ping(p) => Some(Ping::from(p)),
                    _ => None,
                })
                .count()
        });
    });
}

criterion_group!(warts_benches, bench_warts_parse, bench_data_block);
criterion_main!(warts_benches);
