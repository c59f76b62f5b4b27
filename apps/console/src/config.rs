use std::{fs, path::PathBuf, time::Duration};

use client_core::ConnectionConfig;
use serde::Deserialize;

const SETTINGS_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub page_url: String,
    pub layout_path: PathBuf,
    pub retry_limit: u32,
    pub retry_wait_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            page_url: "http://127.0.0.1:33000/".into(),
            layout_path: "./data/console.json".into(),
            retry_limit: connection.retry_limit,
            retry_wait_ms: saturating_millis(connection.retry_wait),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            retry_limit: self.retry_limit,
            retry_wait: Duration::from_millis(self.retry_wait_ms),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    page_url: Option<String>,
    layout_path: Option<PathBuf>,
    retry_limit: Option<u32>,
    retry_wait_ms: Option<u64>,
    log_filter: Option<String>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            // Logging is not up yet.
            eprintln!("ignoring unreadable {SETTINGS_FILE}: {err}");
            return;
        }
    };
    if let Some(v) = file_cfg.page_url {
        settings.page_url = v;
    }
    if let Some(v) = file_cfg.layout_path {
        settings.layout_path = v;
    }
    if let Some(v) = file_cfg.retry_limit {
        settings.retry_limit = v;
    }
    if let Some(v) = file_cfg.retry_wait_ms {
        settings.retry_wait_ms = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CONSOLE_PAGE_URL") {
        settings.page_url = v;
    }
    if let Some(v) = var("APP__PAGE_URL") {
        settings.page_url = v;
    }

    if let Some(v) = var("APP__LAYOUT_PATH") {
        settings.layout_path = v.into();
    }

    if let Some(v) = var("APP__RETRY_LIMIT") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.retry_limit = parsed;
        }
    }
    if let Some(v) = var("APP__RETRY_WAIT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.retry_wait_ms = parsed;
        }
    }

    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
