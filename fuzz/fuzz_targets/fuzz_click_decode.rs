#![no_main]

use libfuzzer_sys::fuzz_target;
use mailtrace::fuzz_api::decode_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let target = decode_target(s);
        let lower = target.to_ascii_lowercase();
        assert!(target == "/" || lower.starts_with("http://") || lower.starts_with("https://"));
    }
});
