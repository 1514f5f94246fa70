use std::fmt::Debug;
use std::io::Error as IoError;
use std::io::Write;
use std::path::Path;
use std::fs::{File, read_to_string};

use tracing::debug;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("config io error: {0}")]
    IoError(#[from] IoError),
    #[error("config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

/// Read and write any serde type as a toml file
pub trait SaveLoadConfig {
    fn save_to<T: AsRef<Path>>(&self, path: T) -> Result<(), LoadConfigError>;
    fn load_from<T: AsRef<Path>>(path: T) -> Result<Self, LoadConfigError>
    where
        Self: Sized;
    fn load_str(config: &str) -> Result<Self, LoadConfigError>
    where
        Self: Sized;

    /// load from path if it exists, otherwise fall back to default value
    fn load_or_default<T: AsRef<Path>>(path: T) -> Result<Self, LoadConfigError>
    where
        Self: Sized + Default,
    {
        if path.as_ref().exists() {
            Self::load_from(path)
        } else {
            debug!(path = ?path.as_ref(), "no config file, using defaults");
            Ok(Self::default())
        }
    }
}

impl<S> SaveLoadConfig for S
where
    S: Serialize + DeserializeOwned + Debug,
{
    fn save_to<T: AsRef<Path>>(&self, path: T) -> Result<(), LoadConfigError> {
        let path_ref = path.as_ref();
        debug!("saving config: {:#?} to: {:#?}", self, path_ref);
        let toml = toml::to_string(self)?;

        let mut file = File::create(path_ref)?;
        file.write_all(toml.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn load_from<T: AsRef<Path>>(path: T) -> Result<Self, LoadConfigError> {
        let path_ref = path.as_ref();
        debug!(?path_ref, "loading from");

        let file_str = read_to_string(path_ref)?;
        Self::load_str(&file_str)
    }

    fn load_str(config: &str) -> Result<Self, LoadConfigError> {
        Ok(toml::from_str(config)?)
    }
}

#[cfg(test)]
mod test {
    use serde::{Serialize, Deserialize};

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        namespace: String,
        depth: u32,
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sample.toml");
        let sample = Sample {
            namespace: "dev".to_owned(),
            depth: 3,
        };

        sample.save_to(&path).expect("saved");
        let loaded = Sample::load_from(&path).expect("loaded");
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loaded = Sample::load_or_default(dir.path().join("nope.toml")).expect("default");
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_bad_toml() {
        let err = Sample::load_str("namespace = ").expect_err("should fail");
        assert!(matches!(err, LoadConfigError::TomlError(_)));
    }
}
