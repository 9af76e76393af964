//! Configuration resolution and graceful degradation
//!
//! Covers:
//! - Resolution priority (CLI argument > FIELDKIT_CONFIG > platform default)
//! - Missing config files fall back to compiled defaults
//! - Environment overrides for secrets
//!
//! Note: Uses serial_test to prevent ENV variable race conditions. Tests that
//! manipulate FIELDKIT_* variables are marked with #[serial].

use fieldkit_common::config::{
    resolve_config_path, EngineConfig, API_KEY_ENV_VAR, CONFIG_ENV_VAR, ENDPOINT_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(API_KEY_ENV_VAR);
    env::remove_var(ENDPOINT_ENV_VAR);
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_argument_takes_precedence() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/fieldkit-from-env.toml");

    let path = resolve_config_path(Some("/tmp/fieldkit-from-cli.toml"));
    assert_eq!(path, Some(PathBuf::from("/tmp/fieldkit-from-cli.toml")));

    clear_env();
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/fieldkit-from-env.toml");

    let path = resolve_config_path(None);
    assert_eq!(path, Some(PathBuf::from("/tmp/fieldkit-from-env.toml")));

    clear_env();
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();

    let config = EngineConfig::resolve(Some("/nonexistent/fieldkit/config.toml")).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
#[serial]
fn test_file_is_loaded() {
    clear_env();
    let file = write_config(
        r#"
        [remote]
        endpoint = "https://validation.example.test/rpc"
        api_key = "from-file"

        [binding]
        change_poll_ms = 250

        [logging]
        verbose_diagnostics = true
        "#,
    );

    let config = EngineConfig::resolve(file.path().to_str()).unwrap();
    assert_eq!(config.remote.endpoint, "https://validation.example.test/rpc");
    assert_eq!(config.remote.api_key.as_deref(), Some("from-file"));
    assert_eq!(config.binding.change_poll_ms, 250);
    assert_eq!(config.binding.input_poll_ms, 10);
    assert!(config.logging.verbose_diagnostics);
}

#[test]
#[serial]
fn test_env_overrides_secrets() {
    clear_env();
    let file = write_config(
        r#"
        [remote]
        endpoint = "https://file.example.test/rpc"
        api_key = "from-file"
        "#,
    );
    env::set_var(API_KEY_ENV_VAR, "from-env");
    env::set_var(ENDPOINT_ENV_VAR, "https://env.example.test/rpc");

    let config = EngineConfig::resolve(file.path().to_str()).unwrap();
    assert_eq!(config.remote.api_key.as_deref(), Some("from-env"));
    assert_eq!(config.remote.endpoint, "https://env.example.test/rpc");

    clear_env();
}

#[test]
#[serial]
fn test_blank_env_override_is_ignored() {
    clear_env();
    env::set_var(API_KEY_ENV_VAR, "   ");

    let mut config = EngineConfig::default();
    config.apply_env_overrides();
    assert!(config.remote.api_key.is_none());

    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    clear_env();
    let file = write_config("[check\nauto_apply_attempt = ");

    assert!(EngineConfig::resolve(file.path().to_str()).is_err());
}
