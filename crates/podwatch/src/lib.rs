pub mod config;
pub mod client;
pub mod owner;
pub mod registry;
pub mod matcher;
pub mod dedup;
pub mod cache;
pub mod normalize;
pub mod dispatcher;
pub mod state;
mod subscription;
pub mod watcher;
pub mod memory;

pub use config::{PodWatchConfig, ConfigError};
pub use client::{PodWatchClient, ObjectLookup, WatchError, PodList, SharedClient};
pub use owner::{OwnerResolver, OwnerFetcher};
pub use dispatcher::ActionSink;
pub use normalize::{PodNormalizer, DefaultPodNormalizer};
pub use watcher::PodWatcher;
pub use memory::MemoryPodClient;

pub mod model {
    pub use podwatch_model::*;
}
