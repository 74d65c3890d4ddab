//! Process configuration.
//!
//! Read once at startup from the environment (after loading `.env`). Numeric
//! values that do not parse are reported instead of silently defaulted.

use crate::error::{Result, Text2SqlError};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "mrm8488/t5-base-finetuned-wikiSQL";
pub const DEFAULT_MODEL_CACHE_DIR: &str = "./model_cache";
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;
pub const DEFAULT_NUM_BEAMS: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub engine_url: Option<String>,
    pub model: String,
    pub model_cache_dir: PathBuf,
    pub max_new_tokens: usize,
    pub num_beams: usize,
    pub timeout_secs: u64,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_url: None,
            model: DEFAULT_MODEL.to_string(),
            model_cache_dir: PathBuf::from(DEFAULT_MODEL_CACHE_DIR),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            num_beams: DEFAULT_NUM_BEAMS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            engine_url: value("TEXT2SQL_ENGINE_URL"),
            model: value("TEXT2SQL_MODEL").unwrap_or(defaults.model),
            model_cache_dir: value("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_cache_dir),
            max_new_tokens: parse_positive("TEXT2SQL_MAX_NEW_TOKENS", value("TEXT2SQL_MAX_NEW_TOKENS"), defaults.max_new_tokens)?,
            num_beams: parse_positive("TEXT2SQL_NUM_BEAMS", value("TEXT2SQL_NUM_BEAMS"), defaults.num_beams)?,
            timeout_secs: parse_positive("TEXT2SQL_TIMEOUT_SECS", value("TEXT2SQL_TIMEOUT_SECS"), defaults.timeout_secs)?,
            bind: value("TEXT2SQL_BIND").unwrap_or(defaults.bind),
        })
    }

    /// The local fine-tuned model directory, if it holds a saved model.
    pub fn local_model(&self) -> Option<&PathBuf> {
        let has_model = self.model_cache_dir.join("config.json").is_file();
        has_model.then_some(&self.model_cache_dir)
    }
}

/// Integer settings must parse and be non-zero.
fn parse_positive<T: FromStr + Default + PartialEq>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(Text2SqlError::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_new_tokens, 256);
        assert_eq!(config.num_beams, 5);
        assert_eq!(config.bind, "0.0.0.0:5000");
        assert!(config.engine_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TEXT2SQL_ENGINE_URL", "http://localhost:8000/generate"),
            ("TEXT2SQL_NUM_BEAMS", " 3 "),
            ("MODEL_CACHE_DIR", "/tmp/models"),
            ("TEXT2SQL_BIND", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert_eq!(config.engine_url.as_deref(), Some("http://localhost:8000/generate"));
        assert_eq!(config.num_beams, 3);
        assert_eq!(config.model_cache_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.bind, "127.0.0.1:9000");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("TEXT2SQL_ENGINE_URL", "  "), ("TEXT2SQL_MODEL", "")]).unwrap();
        assert!(config.engine_url.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = config_from(&[("TEXT2SQL_MAX_NEW_TOKENS", "lots")]).unwrap_err();
        assert!(matches!(err, Text2SqlError::Config(_)));
        assert!(err.to_string().contains("TEXT2SQL_MAX_NEW_TOKENS"));
    }

    #[test]
    fn test_zero_is_rejected() {
        for key in ["TEXT2SQL_MAX_NEW_TOKENS", "TEXT2SQL_NUM_BEAMS", "TEXT2SQL_TIMEOUT_SECS"] {
            let err = config_from(&[(key, "0")]).unwrap_err();
            assert!(matches!(err, Text2SqlError::Config(_)), "{}", key);
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_missing_local_model() {
        let config = config_from(&[("MODEL_CACHE_DIR", "/nonexistent/text2sql/model")]).unwrap();
        assert!(config.local_model().is_none());
    }
}
