#![no_main]

use libfuzzer_sys::fuzz_target;
use spantab::index::StoredTable;

fuzz_target!(|data: &[u8]| {
    // Loading untrusted bytes may fail but must not panic once validated
    let Ok(mut table) = serde_json::from_slice::<StoredTable>(data) else {
        return;
    };
    if table.validate().is_err() {
        return;
    }
    let _ = table.expand_all(false);
});
