//! 日志存储集成测试
//!
//! 写入 → 关闭 → 新的读取器读回，覆盖往返、排序、过滤、注册和回放校验。

use proptest::prelude::*;
use rover_log::*;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write_log(dir: &TempDir, prefix: &str, f: impl FnOnce(&LogWriter)) -> PathBuf {
    let log = LogWriter::create(dir.path().join(prefix), prefix).unwrap();
    f(&log);
    log.filename().to_path_buf()
}

#[test]
fn test_context_manager_semantics() {
    let dir = TempDir::new().unwrap();
    let log = LogWriter::create(dir.path().join("tmpp"), "1st test").unwrap();
    let filename = log.filename().to_path_buf();
    let start_time = log.start_time();
    log.write(10, b"\x01\x02\x02\x04").unwrap();
    std::thread::sleep(Duration::from_millis(10));
    log.write(10, b"\x05\x06\x07\x08").unwrap();
    drop(log);

    let mut reader = LogReader::open(&filename).unwrap();
    assert_eq!(reader.start_time(), start_time);

    // 第一条记录是 stream 0 上的 note
    let first = reader.next_record(&StreamFilter::All).unwrap().unwrap();
    assert_eq!(first.stream_id, INFO_STREAM_ID);
    assert_eq!(
        InfoRecord::from_bytes(&first.payload),
        Some(InfoRecord::Note("1st test".to_string()))
    );

    // 多次调用之间接续读取
    let second = reader.next_record(&StreamFilter::All).unwrap().unwrap();
    assert_eq!(second.stream_id, 10);
    assert_eq!(second.payload, b"\x01\x02\x02\x04");

    let third = reader.next_record(&StreamFilter::All).unwrap().unwrap();
    assert!(third.elapsed > second.elapsed);
    assert!(third.elapsed.as_micros() > 100);

    assert!(reader.next_record(&StreamFilter::All).unwrap().is_none());
    // 结束后再次调用仍然是结束，而不是错误
    assert!(reader.next_record(&StreamFilter::All).unwrap().is_none());
}

#[test]
fn test_read_two_streams_in_write_order() {
    let dir = TempDir::new().unwrap();
    let mut times = Vec::new();
    let filename = write_log(&dir, "tmp2", |log| {
        times.push(log.write(1, b"\x01\x02\x02\x04").unwrap());
        std::thread::sleep(Duration::from_millis(1));
        times.push(log.write(3, b"\x05\x06").unwrap());
        std::thread::sleep(Duration::from_millis(1));
        times.push(log.write(2, b"\x07\x08").unwrap());
    });

    let mut reader = LogReader::open(&filename).unwrap();
    let arr: Vec<_> = reader
        .records(StreamFilter::AnyOf(vec![1, 2]))
        .map(|r| r.map(|r| (r.elapsed, r.stream_id)))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(arr, vec![(times[0], 1), (times[2], 2)]);
}

#[test]
fn test_register_writes_names_snapshots() {
    let dir = TempDir::new().unwrap();
    let filename = write_log(&dir, "tmp2", |log| {
        assert_eq!(log.register("raw").unwrap(), 1);
        assert!(matches!(log.register("raw"), Err(LogError::DuplicateStream(_))));
        assert_eq!(log.register("gps.position").unwrap(), 2);
    });

    let mut reader = LogReader::open(&filename).unwrap();
    let snapshots: Vec<InfoRecord> = reader
        .records(StreamFilter::Only(INFO_STREAM_ID))
        .filter_map(|r| InfoRecord::from_bytes(&r.unwrap().payload))
        .filter(|info| matches!(info, InfoRecord::Names(_)))
        .collect();
    assert_eq!(
        snapshots,
        vec![
            InfoRecord::Names(vec!["raw".into()]),
            InfoRecord::Names(vec!["raw".into(), "gps.position".into()]),
        ]
    );
    assert_eq!(reader.stream_names(), ["raw", "gps.position"]);
}

#[test]
fn test_round_trip_special_payloads() {
    let dir = TempDir::new().unwrap();
    let all_bytes: Vec<u8> = (0..=255u8).collect();
    let large: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let filename = write_log(&dir, "special", |log| {
        log.write(1, b"").unwrap();
        log.write(1, &all_bytes).unwrap();
        log.write(1, &large).unwrap();
    });

    let mut reader = LogReader::open(&filename).unwrap();
    let payloads: Vec<Vec<u8>> = reader
        .records(StreamFilter::Only(1))
        .map(|r| r.unwrap().payload)
        .collect();
    assert_eq!(payloads, vec![Vec::new(), all_bytes, large]);
}

#[test]
fn test_log_asserter_replay() {
    let dir = TempDir::new().unwrap();
    let mut times = Vec::new();
    let filename = write_log(&dir, "tmp3", |log| {
        times.push(log.write(1, b"\x01\x02").unwrap());
        std::thread::sleep(Duration::from_millis(1));
        times.push(log.write(2, b"\x05").unwrap());
        std::thread::sleep(Duration::from_millis(1));
        times.push(log.write(1, b"\x07\x08").unwrap());
    });

    let mut log = LogAsserter::open(&filename).unwrap().with_assert_stream(2);
    let mut arr = Vec::new();
    let filter = StreamFilter::AnyOf(vec![1, 2]);
    while let Some(record) = log.next_record(&filter).unwrap() {
        assert!([1, 2].contains(&record.stream_id));
        if record.stream_id == 2 {
            log.write(2, b"\x05").unwrap();
        }
        arr.push((record.elapsed, record.stream_id));
    }
    assert_eq!(arr, vec![(times[0], 1), (times[1], 2), (times[2], 1)]);
    assert!(log.mismatches().is_empty());
}

#[test]
fn test_concurrent_writers_are_ordered() {
    let dir = TempDir::new().unwrap();
    let log = std::sync::Arc::new(LogWriter::create(dir.path().join("mt"), "").unwrap());

    let handles: Vec<_> = (1..=4u16)
        .map(|stream| {
            let log = log.clone();
            std::thread::spawn(move || {
                for i in 0..100u32 {
                    log.write(stream, &i.to_le_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let filename = log.filename().to_path_buf();
    drop(log);

    let mut reader = LogReader::open(&filename).unwrap();
    let records: Vec<_> = reader.records(StreamFilter::All).map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1 + 4 * 100);
    assert!(records.windows(2).all(|w| w[0].elapsed <= w[1].elapsed));

    // 每个 stream 内部顺序保持
    for stream in 1..=4u16 {
        let seq: Vec<u32> = records
            .iter()
            .filter(|r| r.stream_id == stream)
            .map(|r| u32::from_le_bytes([r.payload[0], r.payload[1], r.payload[2], r.payload[3]]))
            .collect();
        assert_eq!(seq, (0..100).collect::<Vec<_>>());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_payload_round_trip(payloads in proptest::collection::vec(
        (1u16..8, proptest::collection::vec(any::<u8>(), 0..1024)), 0..16)
    ) {
        let dir = TempDir::new().unwrap();
        let log = LogWriter::create(dir.path().join("prop"), "").unwrap();
        for (stream, payload) in &payloads {
            log.write(*stream, payload).unwrap();
        }
        let filename = log.filename().to_path_buf();
        drop(log);

        let mut reader = LogReader::open(&filename).unwrap();
        let read: Vec<(u16, Vec<u8>)> = reader
            .records(StreamFilter::AnyOf((1..8).collect()))
            .map(|r| r.map(|r| (r.stream_id, r.payload)))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(read, payloads);
    }
}
