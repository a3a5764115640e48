use std::path::PathBuf;

use strata_config::{ConfigError, LoadMode, StrataConfig};
use strata_core::DocumentUri;

#[test]
fn loads_full_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    std::fs::write(
        &path,
        r#"
[logging]
level = "debug"
json = true

[workspace]
workspace_files = ["**/ws.toml"]
manifest_files = ["deps.lock"]
mode = "adhoc"
preload_concurrency = 4
allow_network = true

[cache]
dir = "/tmp/strata-cache"
"#,
    )
    .unwrap();

    let config = StrataConfig::load_from_path(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.workspace.mode, LoadMode::Adhoc);
    assert_eq!(config.workspace.preload_concurrency, 4);
    assert!(config.workspace.allow_network);
    assert_eq!(config.workspace.vendor_dir, "vendor");
    assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/strata-cache")));

    assert!(config
        .workspace
        .is_workspace_file(&DocumentUri::new("file:///repo/ws.toml")));
    assert!(!config
        .workspace
        .is_workspace_file(&DocumentUri::new("file:///repo/strata.work")));
    assert!(config
        .workspace
        .is_manifest_file(&DocumentUri::new("file:///repo/a/deps.lock")));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StrataConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = StrataConfig::load_from_str("[workspace]\npreload = 3\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}
