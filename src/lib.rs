#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: format!("{}", x) over format!("{x}")
#![allow(clippy::uninlined_format_args)]
// Counts and timestamps cross between SQLite i64 and u64/usize
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cli;
pub mod compose;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod injector;
pub mod interceptor;
pub mod relay;
pub mod stats;
pub mod store;
pub(crate) mod utils;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    pub use crate::gateway::tracking::decode_target;

    /// Parse a config document the way `load_config` does, minus the file.
    pub fn parse_config(input: &str) -> bool {
        serde_json::from_str::<crate::config::Config>(input)
            .is_ok_and(|config| config.validate().is_ok())
    }

    /// Verify a bearer token against a fixed secret.
    pub fn verify_token(token: &str) -> bool {
        crate::auth::JwtKeys::new("fuzz-secret").is_ok_and(|keys| keys.verify(token).is_ok())
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
