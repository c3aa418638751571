//! Table rendering for command results.

use crate::import::ImportStats;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::Path;
use tessera_core::{CompactionStats, IndexStats, RecoveryReport, SearchHit};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn key_value(rows: Vec<(&str, String)>) -> Table {
    let mut table = table();
    table.set_header(vec![
        Cell::new("Property").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Cyan),
    ]);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

pub fn hits_json(hits: &[SearchHit]) -> serde_json::Value {
    hits.iter()
        .map(|h| {
            serde_json::json!({
                "id": h.internal_id,
                "external_id": h.external_id,
                "distance": h.distance,
            })
        })
        .collect()
}

pub fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results");
        return;
    }
    let mut table = table();
    table.set_header(vec![
        Cell::new("rank").fg(Color::Cyan),
        Cell::new("id").fg(Color::Cyan),
        Cell::new("external_id").fg(Color::Cyan),
        Cell::new("distance").fg(Color::Cyan),
    ]);
    for (rank, hit) in hits.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(hit.internal_id),
            Cell::new(hit.external_id),
            Cell::new(format!("{:.6}", hit.distance)),
        ]);
    }
    println!("{table}");
}

pub fn print_stats(path: &Path, stats: &IndexStats) {
    println!("Tessera index: {}", path.display());
    let entry = stats
        .entry_point
        .map_or("-".to_string(), |e| format!("{} (level {})", e.id, e.level));
    println!(
        "{}",
        key_value(vec![
            ("dimension", stats.dimension.to_string()),
            ("metric", stats.metric.to_string()),
            ("live", stats.live.to_string()),
            ("tombstoned", stats.tombstoned.to_string()),
            ("nodes", stats.nodes.to_string()),
            ("max level", stats.max_level.to_string()),
            ("entry point", entry),
            ("last sequence", stats.last_sequence.to_string()),
            ("snapshot sequence", stats.last_snapshot_sequence.to_string()),
            ("wal bytes since snapshot", stats.wal_bytes_since_snapshot.to_string()),
            ("retired ids", stats.retired_ids.to_string()),
        ])
    );
}

pub fn print_report(report: &RecoveryReport) {
    let snapshot = report
        .snapshot_path
        .as_ref()
        .map_or("none".to_string(), |p| p.display().to_string());
    let truncated = report.truncated.as_ref().map_or("no".to_string(), |t| {
        format!("{} at {} ({})", t.segment.display(), t.offset, t.reason)
    });
    println!(
        "{}",
        key_value(vec![
            ("snapshot", snapshot),
            ("snapshot sequence", report.snapshot_sequence.to_string()),
            ("replayed", report.replayed.to_string()),
            ("skipped", report.skipped.to_string()),
            ("truncated", truncated),
            ("last sequence", report.last_sequence.to_string()),
            ("live", report.live.to_string()),
            ("tombstoned", report.tombstoned.to_string()),
            ("elapsed", format!("{} ms", report.duration.as_millis())),
        ])
    );
    println!("OK");
}

pub fn print_compaction(stats: &CompactionStats) {
    println!(
        "{}",
        key_value(vec![
            ("removed", stats.removed.to_string()),
            ("lists repaired", stats.lists_repaired.to_string()),
            ("batches", stats.batches.to_string()),
            ("remaining", stats.remaining.to_string()),
            ("elapsed", format!("{} ms", stats.duration.as_millis())),
        ])
    );
}

pub fn print_import_stats(stats: &ImportStats) {
    println!("Import Summary");
    println!("  Total records:    {}", stats.total);
    println!("  Imported:         {}", stats.imported);
    if stats.errors > 0 {
        println!("  Errors:           {}", stats.errors);
    }
    if let Some((first, last)) = stats.id_range {
        println!("  Internal ids:     {}..={}", first, last);
    }
    println!("  Duration:         {} ms", stats.duration_ms);
    println!(
        "  Throughput:       {:.0} records/sec",
        stats.records_per_sec()
    );
}
