//! JSONL import: one record per line, vectors or text.

use anyhow::{Context, Result};
use quiverdb_core::{CancelToken, Collection, VectorRecord};
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::warn;

/// Outcome of an import run.
pub struct ImportReport {
    /// Records inserted.
    pub inserted: usize,
    /// Lines skipped (parse errors, duplicate ids, failed embeddings).
    pub failed: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

/// Imports a JSONL file into `collection`.
///
/// Each line is an object with `id` and either `vector` (array of
/// numbers) or `text` (embedded via the collection's vectorizer), plus
/// optional `metadata`. Bad lines are logged and skipped.
pub fn import_jsonl(collection: &Collection, path: &Path) -> Result<ImportReport> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    let cancel = CancelToken::never();
    let start = Instant::now();

    let mut inserted = 0usize;
    let mut failed = 0usize;
    let mut text_items: Vec<(String, String, Option<Value>)> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let doc: Value = match serde_json::from_str(&line) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(line = line_no + 1, %err, "skipping unparsable line");
                failed += 1;
                continue;
            }
        };

        let Some(id) = doc.get("id").and_then(Value::as_str).map(String::from) else {
            warn!(line = line_no + 1, "skipping line without an id");
            failed += 1;
            continue;
        };
        let metadata = doc.get("metadata").cloned();

        if let Some(vector) = doc.get("vector").and_then(Value::as_array) {
            let vector: Option<Vec<f32>> = vector
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            let Some(vector) = vector else {
                warn!(line = line_no + 1, "skipping non-numeric vector");
                failed += 1;
                continue;
            };
            match collection.insert(VectorRecord::new(id, vector, metadata), &cancel) {
                Ok(()) => inserted += 1,
                Err(err) => {
                    warn!(line = line_no + 1, %err, "insert failed");
                    failed += 1;
                }
            }
        } else if let Some(text) = doc.get("text").and_then(Value::as_str) {
            // Text rows go through the batch pipeline at the end.
            text_items.push((id, text.to_string(), metadata));
        } else {
            warn!(line = line_no + 1, "skipping line without vector or text");
            failed += 1;
        }
    }

    if !text_items.is_empty() {
        let total = text_items.len();
        let stats = collection.insert_text_batch(text_items, &cancel)?;
        inserted += stats.successful_texts;
        failed += total - stats.successful_texts;
    }

    Ok(ImportReport {
        inserted,
        failed,
        elapsed: start.elapsed(),
    })
}
