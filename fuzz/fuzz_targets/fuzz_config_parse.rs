#![no_main]

use libfuzzer_sys::fuzz_target;
use mailtrace::fuzz_api::parse_config;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = parse_config(s);
    }
});
