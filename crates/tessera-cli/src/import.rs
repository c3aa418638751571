//! JSON Lines import for the `insert` command.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tessera_core::{Error, HnswIndex};
use uuid::Uuid;

/// JSON Lines record structure
#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(default)]
    id: Option<Uuid>,
    vector: Vec<f32>,
}

/// Outcome of an import.
#[derive(Debug, Default)]
pub struct ImportStats {
    pub total: usize,
    pub imported: usize,
    pub errors: usize,
    pub duration_ms: u64,
    /// Internal id of the first and last inserted vector.
    pub id_range: Option<(u64, u64)>,
}

impl ImportStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn records_per_sec(&self) -> f64 {
        if self.duration_ms == 0 {
            return self.imported as f64;
        }
        self.imported as f64 * 1000.0 / self.duration_ms as f64
    }
}

/// Parses a query vector given as a JSON array or comma-separated list.
pub fn parse_vector(input: &str) -> Result<Vec<f32>> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON vector");
    }
    trimmed
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid vector component: {:?}", s.trim()))
        })
        .collect()
}

/// Streams a JSONL file into the index, one insert per line.
///
/// Malformed lines and rejected vectors are counted and logged, not fatal.
/// I/O errors from the index abort the import.
pub fn import_jsonl(index: &HnswIndex, path: &Path) -> Result<ImportStats> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSONL file {}", path.display()))?;
    let reader = BufReader::with_capacity(128 * 1024, file);
    let started = Instant::now();
    let mut stats = ImportStats::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.total += 1;

        let record: JsonRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed line");
                stats.errors += 1;
                continue;
            }
        };
        let external_id = record.id.unwrap_or_else(Uuid::new_v4);
        match index.insert(&record.vector, external_id) {
            Ok(id) => {
                stats.imported += 1;
                stats.id_range = Some(stats.id_range.map_or((id, id), |(first, _)| (first, id)));
            }
            Err(e @ (Error::DimensionMismatch { .. } | Error::InvalidVector(_))) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping rejected vector");
                stats.errors += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if stats.total == 0 {
        anyhow::bail!("Empty file");
    }
    stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(stats)
}

