mod helpers;

use helpers::{cycle_start_record, list_record, ping_record, record, trace_record, TestResult};
use revtr_lib::model::{Ping, Traceroute};
use revtr_lib::uuencode;
use revtr_lib::warts::{self, Record, RecordType, WartsError};
use std::net::Ipv4Addr;

const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DST: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

fn stream(records: &[Vec<u8>]) -> Vec<u8> {
    records.concat()
}

#[test]
fn test_filter_keeps_measurements_only() -> TestResult {
    let data = stream(&[
        list_record("default"),
        cycle_start_record(1_700_000_000),
        record(0x42, &[1, 2, 3]),
        ping_record(7, SRC, DST, &[1000, 3000]),
        trace_record(8, SRC, DST),
    ]);

    let all = warts::parse(&data, &[RecordType::List, RecordType::CycleStart, RecordType::Ping, RecordType::Traceroute])?;
    assert_eq!(all.len(), 4);
    assert!(matches!(&all[0], Record::List(l) if l.name == "default"));
    assert!(matches!(&all[1], Record::CycleStart(c) if c.start_time == 1_700_000_000));

    let measurements = warts::parse(&data, &[RecordType::Ping, RecordType::Traceroute])?;
    let ids: Vec<_> = measurements.iter().filter_map(Record::user_id).collect();
    assert_eq!(ids, vec![7, 8]);
    Ok(())
}

#[test]
fn test_ping_converts_to_result() -> TestResult {
    let data = ping_record(7, SRC, DST, &[1000, 3000]);
    let records = warts::parse(&data, &[RecordType::Ping])?;
    let Some(Record::Ping(raw)) = records.first() else {
        return Err("no ping".into());
    };

    let ping = Ping::from(raw);
    assert_eq!(ping.src, SRC);
    assert_eq!(ping.dst, DST);
    assert_eq!(ping.user_id, 7);
    assert_eq!(ping.responses.len(), 2);
    assert!(ping.responses.iter().all(|r| r.from == DST && r.reply_ttl == 54));
    let stats = ping.statistics.ok_or("no statistics")?;
    assert_eq!(stats.replies, 2);
    assert!((stats.min - 1.0).abs() < f32::EPSILON);
    assert!((stats.max - 3.0).abs() < f32::EPSILON);
    assert!((stats.avg - 2.0).abs() < f32::EPSILON);
    Ok(())
}

#[test]
fn test_traceroute_converts_to_result() -> TestResult {
    let records = warts::parse(&trace_record(8, SRC, DST), &[RecordType::Traceroute])?;
    let Some(Record::Traceroute(raw)) = records.first() else {
        return Err("no traceroute".into());
    };
    let trace = Traceroute::from(raw);
    assert_eq!(trace.user_id, 8);
    assert_eq!(trace.src, SRC);
    assert_eq!(trace.dst, DST);
    assert!(trace.hops.is_empty());
    assert_eq!(trace.stop_reason, "COMPLETED");
    Ok(())
}

#[test]
fn test_bad_magic() {
    let mut data = ping_record(1, SRC, DST, &[]);
    data[0] = 0xFF;
    assert!(matches!(warts::parse(&data, &[RecordType::Ping]), Err(WartsError::BadMagic(_))));
}

#[test]
fn test_truncated_record_names_its_user_id() {
    let full = ping_record(42, SRC, DST, &[1000]);
    // keep the header length honest but cut the reply short
    let body = &full[8..full.len() - 3];
    let data = record(0x07, body);
    let err = warts::parse(&data, &[RecordType::Ping]).err();
    assert_eq!(err.as_ref().and_then(WartsError::user_id), Some(42));
}

#[test]
fn test_record_longer_than_stream() {
    let mut data = ping_record(1, SRC, DST, &[]);
    data.truncate(data.len() - 1);
    assert!(matches!(warts::parse(&data, &[RecordType::Ping]), Err(WartsError::Truncated(_))));
}

#[test]
fn test_uuencoded_stream_round_trip() -> TestResult {
    let data = stream(&[list_record("default"), ping_record(3, SRC, DST, &[500])]);
    let decoded = uuencode::decode(&uuencode::encode(&data))?;
    assert_eq!(decoded, data);
    assert_eq!(warts::parse(&decoded, &[RecordType::Ping])?.len(), 1);
    Ok(())
}
