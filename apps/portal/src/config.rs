use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use client_core::ClientSettings;
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            user_agent: None,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    base_url: Option<String>,
    user_agent: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn client_settings(&self) -> anyhow::Result<ClientSettings> {
        let base_url = Url::parse(self.base_url.trim())
            .with_context(|| format!("invalid base url '{}'", self.base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "base url '{}' must use http or https, got '{}'",
                self.base_url,
                base_url.scheme()
            );
        }

        Ok(ClientSettings {
            base_url,
            user_agent: self.user_agent.clone(),
            timeout: self.request_timeout_secs.map(Duration::from_secs),
        })
    }
}

pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(config_path, |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then environment overrides.
///
/// An explicitly named config file must exist; `portal.toml` in the working
/// directory is read only when present.
pub fn load_settings_with(
    config_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file_cfg = match config_path {
        Some(path) => Some(read_file_settings(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Some(read_file_settings(Path::new(DEFAULT_CONFIG_FILE))?)
        }
        None => None,
    };
    if let Some(file_cfg) = file_cfg {
        if let Some(v) = file_cfg.base_url {
            settings.base_url = v;
        }
        if let Some(v) = file_cfg.user_agent {
            settings.user_agent = Some(v);
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = Some(v);
        }
    }

    if let Some(v) = env("PORTAL_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("APP__USER_AGENT") {
        settings.user_agent = Some(v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = Some(parsed),
            Err(err) => warn!("ignoring APP__REQUEST_TIMEOUT_SECS={v}: {err}"),
        }
    }

    Ok(settings)
}

fn read_file_settings(path: &Path) -> anyhow::Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
