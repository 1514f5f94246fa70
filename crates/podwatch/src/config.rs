use std::time::Duration;

use adaptive_backoff::prelude::{BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use podwatch_model::LabelSelector;
use podwatch_types::defaults::{
    DEFAULT_NAMESPACE, RECONNECT_BACKOFF_FACTOR, RECONNECT_BACKOFF_MAX_DURATION,
    RECONNECT_BACKOFF_MIN_DURATION, OWNER_CHAIN_MAX_DEPTH, OWNER_CACHE_CAPACITY,
    OWNER_RETRY_LIMIT,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("default namespace must not be empty")]
    EmptyNamespace,
    #[error("backoff min {min:?} is larger than max {max:?}")]
    InvalidBackoffRange { min: Duration, max: Duration },
    #[error("backoff factor must be at least 1, got {0}")]
    InvalidBackoffFactor(f64),
    #[error("owner chain depth must be positive")]
    ZeroOwnerDepth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodWatchConfig {
    /// always watched, extra selectors without an entity namespace resolve here
    pub default_namespace: String,
    #[serde(with = "humantime_serde")]
    pub backoff_min: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
    pub backoff_factor: f64,
    pub owner_chain_max_depth: usize,
    pub owner_cache_capacity: usize,
    pub owner_retry_limit: u32,
    /// passed to every list and watch call
    pub label_selector: Option<LabelSelector>,
}

impl Default for PodWatchConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_owned(),
            backoff_min: RECONNECT_BACKOFF_MIN_DURATION,
            backoff_max: RECONNECT_BACKOFF_MAX_DURATION,
            backoff_factor: RECONNECT_BACKOFF_FACTOR,
            owner_chain_max_depth: OWNER_CHAIN_MAX_DEPTH,
            owner_cache_capacity: OWNER_CACHE_CAPACITY,
            owner_retry_limit: OWNER_RETRY_LIMIT,
            label_selector: None,
        }
    }
}

impl PodWatchConfig {
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.backoff_min > self.backoff_max {
            return Err(ConfigError::InvalidBackoffRange {
                min: self.backoff_min,
                max: self.backoff_max,
            });
        }
        if self.backoff_factor < 1.0 || self.backoff_factor.is_nan() {
            return Err(ConfigError::InvalidBackoffFactor(self.backoff_factor));
        }
        if self.owner_chain_max_depth == 0 {
            return Err(ConfigError::ZeroOwnerDepth);
        }
        Ok(())
    }

    /// capped exponential backoff used between reconnect attempts
    pub(crate) fn create_backoff(&self) -> anyhow::Result<ExponentialBackoff> {
        ExponentialBackoffBuilder::default()
            .factor(self.backoff_factor)
            .min(self.backoff_min)
            .max(self.backoff_max)
            .build()
    }
}

#[cfg(test)]
mod test {
    use podwatch_types::SaveLoadConfig;

    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PodWatchConfig::default();
        assert_eq!(config.default_namespace, "default");
        assert!(config.validate().is_ok());
        assert!(config.create_backoff().is_ok());
    }

    #[test]
    fn test_invalid_backoff_range() {
        let config = PodWatchConfig::default()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBackoffRange {
                min: Duration::from_secs(10),
                max: Duration::from_secs(1)
            })
        );
    }

    #[test]
    fn test_invalid_factor_and_depth() {
        let config = PodWatchConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBackoffFactor(0.5)));

        let config = PodWatchConfig {
            owner_chain_max_depth: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroOwnerDepth));
    }

    #[test]
    fn test_load_partial_toml() {
        let config = PodWatchConfig::load_str(
            r#"
            default_namespace = "dev"
            backoff_min = "250ms"
            backoff_max = "1m"

            [label_selector.matchLabels]
            "app.kubernetes.io/managed-by" = "podwatch"
            "#,
        )
        .expect("parse");

        assert_eq!(config.default_namespace, "dev");
        assert_eq!(config.backoff_min, Duration::from_millis(250));
        assert_eq!(config.backoff_max, Duration::from_secs(60));
        assert_eq!(config.owner_chain_max_depth, OWNER_CHAIN_MAX_DEPTH);
        assert_eq!(config.owner_retry_limit, OWNER_RETRY_LIMIT);
        assert_eq!(
            config.label_selector.expect("selector").to_string(),
            "app.kubernetes.io/managed-by=podwatch"
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(podwatch_types::defaults::CONFIG_FILE_NAME);
        let config = PodWatchConfig::default().with_default_namespace("staging");

        config.save_to(&path).expect("saved");
        let loaded = PodWatchConfig::load_from(&path).expect("loaded");
        assert_eq!(loaded, config);
    }
}
