//! Config file resolution, validation, and secret lookup

use anyhow::Result;
use libnewscast::config::{resolve_config_path, Config, CONFIG_ENV};
use libnewscast::error::{ConfigError, NewscastError};
use libnewscast::Orchestrator;
use secrecy::ExposeSecret;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("config.toml");
    fs::write(&path, body)?;
    Ok(path)
}

fn full_config(dir: &TempDir) -> String {
    format!(
        r#"
[ledger]
path = "{ledger}"
retention_days = 30

[feeds]
urls = ["https://wire.example/rss", "https://other.example/atom.xml"]
timeout_secs = 5

[schedule]
interval_secs = 900

[classifier]
endpoint = "https://llm.example/v1"
model = "small-model"
api_key_env = "TEST_NEWSCAST_LLM_KEY"
requests_per_minute = 2
requests_per_day = 200
response_format = "plain"

[publisher]
access_token_env = "TEST_NEWSCAST_X_TOKEN"
posts_per_day = 3

[notifier]
bot_token_env = "TEST_NEWSCAST_BOT_TOKEN"
chat_id_env = "TEST_NEWSCAST_CHAT_ID"
"#,
        ledger = dir.path().join("ledger.txt").display().to_string().replace('\\', "/")
    )
}

fn set_secrets() {
    std::env::set_var("TEST_NEWSCAST_LLM_KEY", "llm-key");
    std::env::set_var("TEST_NEWSCAST_X_TOKEN", "x-token");
    std::env::set_var("TEST_NEWSCAST_BOT_TOKEN", "bot-token");
    std::env::set_var("TEST_NEWSCAST_CHAT_ID", "-100123");
}

fn clear_secrets() {
    for name in [
        "TEST_NEWSCAST_LLM_KEY",
        "TEST_NEWSCAST_X_TOKEN",
        "TEST_NEWSCAST_BOT_TOKEN",
        "TEST_NEWSCAST_CHAT_ID",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_config_env_var_overrides_default_path() -> Result<()> {
    std::env::set_var(CONFIG_ENV, "/tmp/newscast-test/config.toml");
    let path = resolve_config_path()?;
    std::env::remove_var(CONFIG_ENV);

    assert_eq!(path, std::path::PathBuf::from("/tmp/newscast-test/config.toml"));
    Ok(())
}

#[test]
#[serial]
fn test_default_path_is_under_config_dir() -> Result<()> {
    std::env::remove_var(CONFIG_ENV);
    let path = resolve_config_path()?;
    assert!(path.ends_with("newscast/config.toml"));
    Ok(())
}

#[test]
#[serial]
fn test_load_full_config() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, &full_config(&dir))?;

    std::env::set_var(CONFIG_ENV, &path);
    let config = Config::load();
    std::env::remove_var(CONFIG_ENV);
    let config = config?;

    assert_eq!(config.feeds.urls.len(), 2);
    assert_eq!(config.schedule.interval_secs, 900);
    assert_eq!(config.classifier.requests_per_minute, 2);
    assert_eq!(config.publisher.posts_per_day, 3);
    assert_eq!(config.ledger_path(), dir.path().join("ledger.txt"));
    Ok(())
}

#[test]
fn test_missing_file_is_config_error() {
    let err = Config::load_from_path(std::path::Path::new("/nonexistent/newscast.toml")).unwrap_err();
    assert!(matches!(err, NewscastError::Config(ConfigError::ReadError(_))));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_malformed_toml_is_parse_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[feeds\nurls = 3")?;

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, NewscastError::Config(ConfigError::ParseError(_))));
    Ok(())
}

#[test]
#[serial]
fn test_secrets_are_resolved_from_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::load_from_path(&write_config(&dir, &full_config(&dir))?)?;

    set_secrets();
    let secrets = config.secrets();
    clear_secrets();
    let secrets = secrets?;

    assert_eq!(secrets.classifier_api_key.expose_secret(), "llm-key");
    assert_eq!(secrets.publisher_access_token.expose_secret(), "x-token");
    let (bot, chat) = secrets.telegram.expect("notifier configured");
    assert_eq!(bot.expose_secret(), "bot-token");
    assert_eq!(chat, "-100123");
    Ok(())
}

#[test]
#[serial]
fn test_missing_secret_is_config_error() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::load_from_path(&write_config(&dir, &full_config(&dir))?)?;
    clear_secrets();

    match config.secrets() {
        Err(NewscastError::Config(ConfigError::MissingField(field))) => {
            assert!(field.contains("TEST_NEWSCAST_LLM_KEY"));
        }
        Err(other) => panic!("expected missing field, got {:?}", other),
        Ok(_) => panic!("expected missing field, got secrets"),
    }
    Ok(())
}

#[test]
#[serial]
fn test_orchestrator_builds_from_config() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::load_from_path(&write_config(&dir, &full_config(&dir))?)?;

    set_secrets();
    let orchestrator = Orchestrator::from_config(&config);
    clear_secrets();
    let orchestrator = orchestrator?;

    assert_eq!(orchestrator.interval(), std::time::Duration::from_secs(900));
    assert_eq!(orchestrator.quotas().publisher.limit(), 3);
    assert_eq!(orchestrator.quotas().classifier.minute.limit(), 2);
    Ok(())
}
