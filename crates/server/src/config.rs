use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use storage::StorageBackend;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub storage: StorageBackend,
    pub database_url: String,
    pub jwt_secret: String,
    pub session_ttl_seconds: i64,
    pub request_timeout_seconds: u64,
    pub seed_demo_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            storage: StorageBackend::Memory,
            database_url: "sqlite://./data/tracking.db".into(),
            jwt_secret: "devsecret".into(),
            session_ttl_seconds: 8 * 60 * 60,
            request_timeout_seconds: 10,
            seed_demo_data: true,
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let env: Map<String, String> = std::env::vars().collect();
    load_settings_from(Path::new(SETTINGS_FILE), &env)
}

/// Layers, lowest first: defaults, the optional TOML file, the legacy
/// `SERVER_BIND` / `DATABASE_URL` variables, then `APP__*` variables.
pub fn load_settings_from(path: &Path, env: &Map<String, String>) -> anyhow::Result<Settings> {
    let defaults = serde_json::to_string(&Settings::default())?;

    let mut legacy = serde_json::Map::new();
    if let Some(bind) = env.get("SERVER_BIND") {
        legacy.insert("bind_addr".into(), bind.clone().into());
    }
    if let Some(url) = env.get("DATABASE_URL") {
        legacy.insert("database_url".into(), url.clone().into());
    }
    let legacy = serde_json::Value::Object(legacy).to_string();

    let settings: Settings = Config::builder()
        .add_source(File::from_str(&defaults, FileFormat::Json))
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(File::from_str(&legacy, FileFormat::Json))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        )
        .build()
        .with_context(|| format!("failed to load settings from '{}'", path.display()))?
        .try_deserialize()
        .context("invalid server settings")?;

    Ok(Settings {
        database_url: normalize_database_url(&settings.database_url),
        ..settings
    })
}

pub(crate) fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
