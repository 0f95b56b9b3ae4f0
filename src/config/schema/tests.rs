use super::*;

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.client.relay_timeout_ms, 4500);
    assert_eq!(config.client.debounce_ms, 180);
    assert!(config.client.tracking_enabled);
}

#[test]
fn test_camel_case_keys_deserialize() {
    let json = serde_json::json!({
        "server": {"publicBaseUrl": "https://t.example.com", "jwtSecret": "s3cret"},
        "client": {"relayTimeoutMs": 1000, "debounceMs": 150, "trackingEnabled": false}
    });
    let config: Config = serde_json::from_value(json).unwrap();
    assert_eq!(config.server.public_base_url, "https://t.example.com");
    assert_eq!(config.server.jwt_secret, "s3cret");
    assert_eq!(config.client.relay_timeout_ms, 1000);
    assert!(!config.client.tracking_enabled);
    // untouched sections keep defaults
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn test_debug_redacts_secrets() {
    let mut config = Config::default();
    config.server.jwt_secret = "top-secret".to_string();
    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("top-secret"));
    assert!(rendered.contains("[REDACTED]"));
    // empty credential renders as [empty]
    assert!(rendered.contains("[empty]"));
}

#[test]
fn test_zero_port_rejected() {
    let mut config = Config::default();
    config.server.port = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_relay_timeout_bounds() {
    let mut config = Config::default();
    config.client.relay_timeout_ms = 50;
    assert!(config.validate().is_err());
    config.client.relay_timeout_ms = 60_001;
    assert!(config.validate().is_err());
    config.client.relay_timeout_ms = 5000;
    assert!(config.validate().is_ok());
}

#[test]
fn test_debounce_upper_bound() {
    let mut config = Config::default();
    config.client.debounce_ms = 2500;
    assert!(config.validate().is_err());
}

#[test]
fn test_non_http_base_url_rejected() {
    let mut config = Config::default();
    config.server.public_base_url = "ftp://example.com".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("http or https"));

    config.server.public_base_url = "not a url".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_explicit_database_path_used() {
    let mut config = Config::default();
    config.database.path = "/var/lib/mailtrace/db.sqlite3".to_string();
    assert_eq!(
        config.database_path(),
        PathBuf::from("/var/lib/mailtrace/db.sqlite3")
    );
}
