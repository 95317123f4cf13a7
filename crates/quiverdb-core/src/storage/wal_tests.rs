//! Tests for the write-ahead log

use super::wal::*;
use tempfile::tempdir;

fn record(seq: u64, kind: WalRecordKind, payload: &[u8]) -> WalRecord {
    WalRecord {
        seq,
        kind,
        payload: payload.to_vec(),
    }
}

fn committed_batch(wal: &Wal, begin_seq: u64, payloads: &[&[u8]]) {
    wal.append(&record(begin_seq, WalRecordKind::Begin, b"")).unwrap();
    for (i, payload) in payloads.iter().enumerate() {
        wal.append(&record(begin_seq + 1 + i as u64, WalRecordKind::PageWrite, payload))
            .unwrap();
    }
    wal.append(&record(
        begin_seq + 1 + payloads.len() as u64,
        WalRecordKind::Commit,
        b"",
    ))
    .unwrap();
}

#[test]
fn test_append_and_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"page one", b"page two"]);
    wal.flush().unwrap();

    let records = Wal::replay(&path).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].kind, WalRecordKind::Begin);
    assert_eq!(records[1].payload, b"page one");
    assert_eq!(records[2].payload, b"page two");
    assert_eq!(records[3].kind, WalRecordKind::Commit);
}

#[test]
fn test_replay_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let records = Wal::replay(&dir.path().join("missing.wal")).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_uncommitted_tail_is_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"committed"]);
    // A batch that never commits.
    wal.append(&record(10, WalRecordKind::Begin, b"")).unwrap();
    wal.append(&record(11, WalRecordKind::PageWrite, b"torn"))
        .unwrap();
    wal.flush().unwrap();

    let records = Wal::replay(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.payload != b"torn"));
}

#[test]
fn test_truncated_record_stops_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"first"]);
    committed_batch(&wal, 10, &[b"second"]);
    wal.flush().unwrap();
    drop(wal);

    // Chop into the middle of the second batch.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let records = Wal::replay(&path).unwrap();
    // First batch survives intact; the damaged tail is gone entirely.
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].payload, b"first");
}

#[test]
fn test_corrupt_crc_stops_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"aaaa"]);
    committed_batch(&wal, 10, &[b"bbbb"]);
    wal.flush().unwrap();
    drop(wal);

    let mut bytes = std::fs::read(&path).unwrap();
    // Flip a payload byte inside the second batch.
    let target = bytes.len() - 30;
    bytes[target] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let records = Wal::replay(&path).unwrap();
    assert!(records.iter().all(|r| r.payload != b"bbbb"));
}

#[test]
fn test_checkpoint_drops_prior_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"old"]);
    wal.append(&record(5, WalRecordKind::Checkpoint, b"")).unwrap();
    committed_batch(&wal, 6, &[b"new"]);
    wal.flush().unwrap();

    let records = Wal::replay(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].payload, b"new");
}

#[test]
fn test_reset_truncates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();
    committed_batch(&wal, 1, &[b"data"]);
    wal.flush().unwrap();
    wal.reset().unwrap();

    assert!(Wal::replay(&path).unwrap().is_empty());

    // The log keeps working after a reset.
    committed_batch(&wal, 20, &[b"after"]);
    wal.flush().unwrap();
    let records = Wal::replay(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].payload, b"after");
}
