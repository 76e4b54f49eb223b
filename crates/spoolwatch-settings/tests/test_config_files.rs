use spoolwatch_settings::{Config, ConfigError, PrinterSettings, SettingsError};
use std::fs;
use tempfile::TempDir;

fn sample() -> Config {
    Config {
        printers: vec![PrinterSettings {
            name: "garage".to_string(),
            host: "10.0.0.7".to_string(),
            access_code: "abcd1234".to_string(),
            serial: "01P00A000000001".to_string(),
            ..PrinterSettings::default()
        }],
        ..Config::default()
    }
}

#[test]
fn test_minimal_toml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[[printers]]
host = "10.0.0.7"
access_code = "abcd1234"
serial = "01P00A000000001"
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.printers.len(), 1);
    let printer = &config.printers[0];
    assert_eq!(printer.port, 8883);
    assert_eq!(printer.username, "bblp");
    assert!(printer.accept_invalid_certs);
    assert_eq!(config.monitor.inbound_queue_capacity, 128);
    assert_eq!(config.decode.nozzle_threshold, 500.0);
}

#[test]
fn test_decode_overrides_are_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[decode]
chamber_threshold = 90.0

[[printers]]
host = "10.0.0.7"
access_code = "abcd1234"
serial = "01P00A000000001"
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.decode.chamber_threshold, 90.0);
    assert_eq!(config.decode.bed_threshold, 200.0);
}

#[test]
fn test_save_and_reload_toml_and_json() {
    let dir = TempDir::new().unwrap();
    let config = sample();

    for name in ["nested/config.toml", "config.json"] {
        let path = dir.path().join(name);
        config.save_to_file(&path).unwrap();
        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }
}

#[test]
fn test_invalid_file_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::Config(ConfigError::NoPrinters)));
}

#[test]
fn test_invalid_config_not_saved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    assert!(Config::default().save_to_file(&path).is_err());
    assert!(!path.exists());
}

#[test]
fn test_missing_file_and_bad_syntax() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        Config::load_from_file(&missing),
        Err(SettingsError::LoadError(_))
    ));

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[[printers]\nhost = ").unwrap();
    assert!(matches!(
        Config::load_from_file(&broken),
        Err(SettingsError::TomlError(_))
    ));
}
