//! Configuration loaded from `tourdesk.toml` and the environment.
//!
//! Environment variables win over the file. Durations accept either an
//! integer number of seconds or a unit-suffixed string such as `90s`, `5m`
//! or `1500ms`.

use crate::cache::{CacheSettings, Clock};
use crate::cache::resource::{
    DEFAULT_DETAIL_TTL, DEFAULT_LIST_TTL, MAX_DETAIL_CACHE_SIZE, MAX_LIST_CACHE_SIZE,
};
use anyhow::Context;
use custom_debug_derive::Debug;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_FILE: &str = "tourdesk.toml";

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Bearer token for the admin API.
    #[serde(default)]
    #[debug(with = crate::fmt::redacted)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_list_ttl", deserialize_with = "deserialize_duration")]
    pub list_ttl: Duration,
    #[serde(default = "default_detail_ttl", deserialize_with = "deserialize_duration")]
    pub detail_ttl: Duration,
    #[serde(default = "default_max_list_cache_size")]
    pub max_list_cache_size: usize,
    #[serde(default = "default_max_detail_cache_size")]
    pub max_detail_cache_size: usize,
    /// Where persisted UI state lives. Nothing is persisted when unset.
    #[serde(default)]
    #[debug(skip_if = Option::is_none, with = crate::fmt::opt)]
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// File first, then the environment on top.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::figment().extract().context("Failed to load config")
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            list_ttl: self.list_ttl,
            detail_ttl: self.detail_ttl,
            max_list_entries: self.max_list_cache_size,
            max_detail_entries: self.max_detail_cache_size,
            clock: Clock::system(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:3000/".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_list_ttl() -> Duration {
    DEFAULT_LIST_TTL
}

fn default_detail_ttl() -> Duration {
    DEFAULT_DETAIL_TTL
}

fn default_max_list_cache_size() -> usize {
    MAX_LIST_CACHE_SIZE
}

fn default_max_detail_cache_size() -> usize {
    MAX_DETAIL_CACHE_SIZE
}

/// Parse `90s`, `5m`, `1h`, `250ms`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);
    let parsed = parser
        .parse(input)
        .map_err(|e| format!("invalid duration {input:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
