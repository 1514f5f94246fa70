pub mod defaults;
pub mod config_file;
pub mod event;

pub use config_file::{SaveLoadConfig, LoadConfigError};

//
// Types
//
pub type ManifestName = String;
pub type Namespace = String;
pub type PodUid = String;
pub type Labels = std::collections::HashMap<String, String>;
