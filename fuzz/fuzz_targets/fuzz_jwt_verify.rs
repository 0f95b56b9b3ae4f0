#![no_main]

use libfuzzer_sys::fuzz_target;
use mailtrace::fuzz_api::verify_token;

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        let _ = verify_token(token);
    }
});
