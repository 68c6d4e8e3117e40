//! Runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the pattern source tree
    pub patterns_dir: PathBuf,
    /// Directory of captured sample pages
    pub samples_dir: PathBuf,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns_dir: PathBuf::from("patterns"),
            samples_dir: PathBuf::from("samples"),
            user_agent: format!("descry/{}", env!("CARGO_PKG_VERSION")),
            fetch_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Defaults overridden by `PATTERNS_DIR`, `SAMPLES_DIR`,
    /// `DESCRY_USER_AGENT` and `DESCRY_FETCH_TIMEOUT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("PATTERNS_DIR").filter(|v| !v.is_empty()) {
            config.patterns_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SAMPLES_DIR").filter(|v| !v.is_empty()) {
            config.samples_dir = PathBuf::from(dir);
        }
        if let Some(agent) = lookup("DESCRY_USER_AGENT").filter(|v| !v.is_empty()) {
            config.user_agent = agent;
        }
        if let Some(secs) = lookup("DESCRY_FETCH_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            config.fetch_timeout_secs = secs;
        }
        config
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Blocking HTTP agent for sample capture
    pub fn http_agent(&self) -> ureq::Agent {
        ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(self.fetch_timeout_secs)))
                .user_agent(self.user_agent.as_str())
                .build(),
        )
    }
}
