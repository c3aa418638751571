//! Fuzz target for WAL replay.
//!
//! The bytes become a single segment. Replay must either apply a prefix of
//! valid records and cut the rest as a torn tail, or report `CorruptWal`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::fs;
use tessera_core::storage::wal;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let segment = dir.path().join(format!("{:020}.wal", 1));
    if fs::write(&segment, data).is_err() {
        return;
    }

    if let Ok(outcome) = wal::replay(dir.path(), 0, |_| Ok(())) {
        if let Some(truncation) = outcome.truncation {
            let len = fs::metadata(&segment).map(|m| m.len()).unwrap_or(0);
            assert_eq!(len, truncation.offset);
        }
    }
});
