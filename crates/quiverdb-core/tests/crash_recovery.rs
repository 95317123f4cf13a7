//! Crash consistency: log replay after a torn page file.

use quiverdb_core::collection::{Collection, CollectionConfig};
use quiverdb_core::{CancelToken, DistanceMetric, EngineConfig, IndexKind, SearchRequest, VectorRecord};
use tempfile::tempdir;

fn engine() -> EngineConfig {
    let mut engine = EngineConfig::default();
    engine.io.async_workers = 2;
    engine.io.flush_interval_ms = 10;
    engine
}

#[test]
fn replay_restores_all_records_after_page_file_truncation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docs");
    let cancel = CancelToken::never();

    {
        let docs = Collection::create(
            path.clone(),
            CollectionConfig::new("docs", 4, DistanceMetric::Euclidean, IndexKind::Flat),
            &engine(),
        )
        .unwrap();

        for i in 0..100 {
            docs.insert(
                VectorRecord::without_metadata(
                    format!("v{i}"),
                    vec![i as f32, 1.0, 2.0, 3.0],
                ),
                &cancel,
            )
            .unwrap();
        }

        // Drain buffers so the log holds every committed batch, then
        // "crash": no close, no checkpoint, no index snapshot.
        docs.sync(&cancel).unwrap();
        std::mem::forget(docs);
    }

    // Tear the page file down to a page boundary well before the last
    // record; the log is now the only complete source.
    let page_file = path.join("pages.dat");
    let torn_len = 4096 * 10; // header + free list + the first few records
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&page_file)
        .unwrap();
    file.set_len(torn_len).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let recovered = Collection::open(path, &engine()).unwrap();
    assert_eq!(recovered.count(), 100, "replay must restore every record");

    // No duplicates, no torn vectors.
    for i in 0..100 {
        let record = recovered.get(&format!("v{i}"), true).unwrap();
        assert_eq!(record.vector, vec![i as f32, 1.0, 2.0, 3.0], "v{i} is torn");
    }

    // And the restored state is searchable.
    let hits = recovered
        .search(&SearchRequest::new(vec![50.0, 1.0, 2.0, 3.0], 1), &cancel)
        .unwrap();
    assert_eq!(hits[0].id, "v50");
}

#[test]
fn truncated_log_tail_drops_only_the_torn_batch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docs");
    let cancel = CancelToken::never();

    {
        let docs = Collection::create(
            path.clone(),
            CollectionConfig::new("docs", 2, DistanceMetric::Euclidean, IndexKind::Flat),
            &engine(),
        )
        .unwrap();
        for i in 0..20 {
            docs.insert(
                VectorRecord::without_metadata(format!("v{i}"), vec![i as f32, 0.0]),
                &cancel,
            )
            .unwrap();
        }
        docs.sync(&cancel).unwrap();
        std::mem::forget(docs);
    }

    // Damage both: truncate the page file entirely past the header pages
    // and chop the last bytes off the log (a torn final record).
    let page_file = path.join("pages.dat");
    let file = std::fs::OpenOptions::new().write(true).open(&page_file).unwrap();
    file.set_len(4096 * 2).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let wal_file = path.join("pages.wal");
    let wal_len = std::fs::metadata(&wal_file).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&wal_file).unwrap();
    file.set_len(wal_len - 7).unwrap();
    file.sync_all().unwrap();
    drop(file);

    // Recovery keeps exactly the batches that committed before the tear:
    // possibly fewer records, but never a torn or duplicated one.
    let recovered = Collection::open(path.clone(), &engine()).unwrap();
    let count = recovered.count();
    assert!(count <= 20);

    for i in 0..20 {
        if let Ok(record) = recovered.get(&format!("v{i}"), true) {
            assert_eq!(record.vector, vec![i as f32, 0.0], "v{i} is torn");
        }
    }

    // The recovered collection accepts new writes.
    recovered
        .insert(
            VectorRecord::without_metadata("after-recovery", vec![99.0, 0.0]),
            &cancel,
        )
        .unwrap();
    assert!(recovered.get("after-recovery", true).is_ok());
}

#[test]
fn clean_checkpoint_then_reopen_needs_no_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docs");
    let cancel = CancelToken::never();

    {
        let docs = Collection::create(
            path.clone(),
            CollectionConfig::new("docs", 2, DistanceMetric::Euclidean, IndexKind::Flat),
            &engine(),
        )
        .unwrap();
        for i in 0..30 {
            docs.insert(
                VectorRecord::without_metadata(format!("v{i}"), vec![i as f32, 0.0]),
                &cancel,
            )
            .unwrap();
        }
        docs.close().unwrap();
    }

    // After a checkpoint the log is empty.
    let wal_len = std::fs::metadata(path.join("pages.wal")).unwrap().len();
    assert_eq!(wal_len, 0);

    let recovered = Collection::open(path, &engine()).unwrap();
    assert_eq!(recovered.count(), 30);
}
