use std::time::Duration;

/// namespace that is always watched, even when no manifest asks for it
pub const DEFAULT_NAMESPACE: &str = "default";

pub const RECONNECT_BACKOFF_MIN_DURATION: Duration = Duration::from_millis(100);
pub const RECONNECT_BACKOFF_MAX_DURATION: Duration = Duration::from_secs(30);
pub const RECONNECT_BACKOFF_FACTOR: f64 = 2.0;

pub const OWNER_CHAIN_MAX_DEPTH: usize = 10;
pub const OWNER_CACHE_CAPACITY: usize = 4096;
/// reconciles that retry a failed owner resolution before waiting for the next pod event
pub const OWNER_RETRY_LIMIT: u32 = 5;

/// label carrying the hash of the pod template, set by deployment controllers
pub const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";

pub const CONFIG_FILE_NAME: &str = "podwatch.toml";
