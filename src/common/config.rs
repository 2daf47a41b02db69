//! # Configuration Utilities
//!
//! TOML loading shared by every daemon. Each daemon defines its own config
//! struct with `#[serde(default)]` so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: IndexConfig = load_config("config/index.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
    let config: T =
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path))?;
    Ok(config)
}

/// Load `path` if given, otherwise fall back to the type's defaults.
pub fn load_or_default<T>(path: Option<&str>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match path {
        Some(path) => load_config(path),
        None => Ok(T::default()),
    }
}

pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct Sample {
        name: String,
        port: u16,
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 42").unwrap();

        let sample: Sample = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(sample.port, 42);
        assert_eq!(sample.name, "");
    }

    #[test]
    fn missing_path_uses_defaults() {
        let sample: Sample = load_or_default(None).unwrap();
        assert_eq!(sample.port, 0);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let result: Result<Sample> = load_config("/definitely/not/here.toml");
        assert!(result.is_err());
    }
}
