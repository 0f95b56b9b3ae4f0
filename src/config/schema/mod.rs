use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            : printed normally via `&self.field_name`
/// - `redact(field_name)`    : `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    // Internal: emit a single .field() call
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    // Internal: recursive TT muncher
    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    // Entry point
    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_public_base_url() -> String {
    "http://localhost:4000".to_string()
}

/// Backend HTTP server settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base used when building pixel and click URLs handed back to clients.
    #[serde(default = "default_public_base_url", rename = "publicBaseUrl")]
    pub public_base_url: String,
    /// HS256 secret for bearer credentials.
    #[serde(default, rename = "jwtSecret")]
    pub jwt_secret: String,
}

redact_debug!(ServerConfig, host, port, public_base_url, redact(jwt_secret),);

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            jwt_secret: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Empty means `$MAILTRACE_HOME/mailtrace.sqlite3`.
    #[serde(default)]
    pub path: String,
}

// ---------------------------------------------------------------------------
// Client (page / bridge / background contexts)
// ---------------------------------------------------------------------------

fn default_api_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_relay_timeout_ms() -> u64 {
    crate::relay::DEFAULT_RELAY_TIMEOUT.as_millis() as u64
}

fn default_debounce_ms() -> u64 {
    crate::compose::driver::DEFAULT_DEBOUNCE.as_millis() as u64
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url", rename = "apiBaseUrl")]
    pub api_base_url: String,
    /// Bound on every relay hop before the waiting side gives up.
    #[serde(default = "default_relay_timeout_ms", rename = "relayTimeoutMs")]
    pub relay_timeout_ms: u64,
    /// Coalescing window for document-change batches.
    #[serde(default = "default_debounce_ms", rename = "debounceMs")]
    pub debounce_ms: u64,
    #[serde(default = "default_true", rename = "trackingEnabled")]
    pub tracking_enabled: bool,
    /// Bearer credential presented to the backend.
    #[serde(default)]
    pub credential: String,
}

redact_debug!(
    ClientConfig,
    api_base_url,
    relay_timeout_ms,
    debounce_ms,
    tracking_enabled,
    redact(credential),
);

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            relay_timeout_ms: default_relay_timeout_ms(),
            debounce_ms: default_debounce_ms(),
            tracking_enabled: true,
            credential: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn relay_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Resolved database file location.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_empty() {
            crate::utils::get_mailtrace_home()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("mailtrace.sqlite3")
        } else {
            crate::utils::expand_home(&self.database.path)
        }
    }

    pub fn validate(&self) -> Result<(), crate::errors::MailTraceError> {
        use crate::errors::MailTraceError;

        if self.server.port == 0 {
            return Err(MailTraceError::Config(
                "server.port must be non-zero".into(),
            ));
        }
        check_base_url("server.publicBaseUrl", &self.server.public_base_url)?;
        check_base_url("client.apiBaseUrl", &self.client.api_base_url)?;
        if !(100..=60_000).contains(&self.client.relay_timeout_ms) {
            return Err(MailTraceError::Config(format!(
                "client.relayTimeoutMs must be between 100 and 60000, got {}",
                self.client.relay_timeout_ms
            )));
        }
        if self.client.debounce_ms > 2000 {
            return Err(MailTraceError::Config(format!(
                "client.debounceMs must be at most 2000, got {}",
                self.client.debounce_ms
            )));
        }
        Ok(())
    }
}

fn check_base_url(field: &str, value: &str) -> Result<(), crate::errors::MailTraceError> {
    let parsed = url::Url::parse(value).map_err(|e| {
        crate::errors::MailTraceError::Config(format!("{} is not a valid URL: {}", field, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(crate::errors::MailTraceError::Config(format!(
            "{} must use http or https, got {}",
            field,
            parsed.scheme()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
