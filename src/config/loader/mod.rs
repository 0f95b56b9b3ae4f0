use crate::config::Config;
use crate::utils::{ensure_dir, get_mailtrace_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_mailtrace_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        // Acquire shared (read) lock; concurrent readers, blocked during writes
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config at {}", path.display()))?;
        file.lock_shared()
            .with_context(|| "Failed to acquire shared lock on config file")?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        // Lock released when `file` drops at end of scope

        check_file_permissions(path);

        serde_json::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
    } else {
        Config::default()
    };

    // env > config.json
    crate::config::credentials::apply_env_overrides(&mut config);

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Warn if the config file has overly permissive permissions.
/// Only emits the warning once per process.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}, recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    // A separate lock file survives the rename done by atomic_write().
    let lock_path = path.with_extension("json.lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire exclusive lock on config lock file")?;

    let content = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
