//! Configuration loading from the process environment
//!
//! These tests set `PEAL_*` variables, so each one is marked #[serial] to
//! keep them from racing each other.

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

use peal_common::config::{
    Config, ENV_CONFIG, ENV_DATABASE_URL, ENV_PASSWORD, ENV_PORT, ENV_USE_RELATIONAL,
};
use peal_common::Error;

const ALL_VARS: [&str; 5] = [
    ENV_CONFIG,
    ENV_DATABASE_URL,
    ENV_PASSWORD,
    ENV_PORT,
    ENV_USE_RELATIONAL,
];

fn clear_env() {
    for var in ALL_VARS {
        std::env::remove_var(var);
    }
}

fn toml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ============================================================================
// Resolution order
// ============================================================================

#[test]
#[serial]
fn test_explicit_file_then_env_overrides() {
    clear_env();
    let file = toml_file(
        r#"
        [server]
        port = 9000

        [auth]
        password = "from-file"
        "#,
    );
    std::env::set_var(ENV_PORT, "9100");

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.auth.password.as_ref().unwrap().expose(), "from-file");
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_config_path_from_env() {
    clear_env();
    let file = toml_file("[storage]\nuse_relational = true\n");
    std::env::set_var(ENV_CONFIG, file.path());
    std::env::set_var(ENV_DATABASE_URL, "sqlite://peal.db");
    std::env::set_var(ENV_PASSWORD, "pw");

    let config = Config::load(None).unwrap();
    assert!(config.storage.use_relational);
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let result = Config::load(Some(&missing));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_relational_without_url_fails_validation() {
    clear_env();
    let file = toml_file("");
    std::env::set_var(ENV_USE_RELATIONAL, "1");
    std::env::set_var(ENV_PASSWORD, "pw");

    let config = Config::load(Some(file.path())).unwrap();
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    clear_env();
}
