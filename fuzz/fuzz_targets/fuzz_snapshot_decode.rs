//! Fuzz target for snapshot decoding.
//!
//! Snapshot files are read back through mmap on every open. A damaged file
//! must be rejected with `CorruptSnapshot`, never a panic, so recovery can
//! fall back to an older snapshot.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::storage::snapshot;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = snapshot::decode(data) {
        // Anything that decodes must survive a re-encode.
        let _ = snapshot::encode(&body);
    }
});
