//! Configuration loading and discovery
//!
//! Tests that touch OLAP_CONFIG or XDG_CONFIG_HOME are marked #[serial] so
//! they never race on the process environment.

use olap_common::config::{EngineConfig, StorageBackend, CONFIG_ENV_VAR};
use olap_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_resolves_relative_database_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "olap.toml",
        "storage = \"sqlite\"\ndatabase_path = \"data/olap.db\"\n",
    );

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.storage, StorageBackend::Sqlite);
    assert_eq!(config.database_path, Some(dir.path().join("data/olap.db")));
}

#[test]
fn test_load_keeps_absolute_database_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "olap.toml",
        "storage = \"sqlite\"\ndatabase_path = \"/srv/olap/olap.db\"\n",
    );

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.database_path, Some(PathBuf::from("/srv/olap/olap.db")));
}

#[test]
fn test_load_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = EngineConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_load_invalid_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "broken.toml", "storage = [unterminated");
    let err = EngineConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_discover_prefers_env_var() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "explicit.toml",
        "max_resolution_depth = 12\nevent_capacity = 8\n",
    );

    env::set_var(CONFIG_ENV_VAR, &path);
    let result = EngineConfig::discover();
    env::remove_var(CONFIG_ENV_VAR);

    let config = result.unwrap();
    assert_eq!(config.max_resolution_depth, 12);
    assert_eq!(config.event_capacity, 8);
}

#[test]
#[serial]
fn test_discover_env_var_to_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    env::set_var(CONFIG_ENV_VAR, dir.path().join("nope.toml"));
    let result = EngineConfig::discover();
    env::remove_var(CONFIG_ENV_VAR);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_discover_platform_config_dir() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("olap")).unwrap();
    fs::write(
        dir.path().join("olap").join("config.toml"),
        "[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    let previous = env::var_os("XDG_CONFIG_HOME");
    env::set_var("XDG_CONFIG_HOME", dir.path());
    let result = EngineConfig::discover();
    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    #[cfg(target_os = "linux")]
    assert_eq!(result.unwrap().logging.level, "warn");
    #[cfg(not(target_os = "linux"))]
    let _ = result;
}

#[test]
#[serial]
fn test_discover_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    let previous = env::var_os("XDG_CONFIG_HOME");
    env::set_var("XDG_CONFIG_HOME", dir.path());
    let result = EngineConfig::discover();
    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    #[cfg(target_os = "linux")]
    {
        let config = result.unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.max_resolution_depth, 256);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = result;
}
