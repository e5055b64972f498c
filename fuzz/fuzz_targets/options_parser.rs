#![no_main]

use libfuzzer_sys::fuzz_target;
use querystat::CollectorOptions;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed bags and bad patterns must surface as errors, never panics
        if let Ok(options) = CollectorOptions::from_json(input) {
            let _ = options.into_config();
        }
    }
});
