//! Relay configuration
//!
//! Settings come from an optional TOML file, overridden by command line
//! flags.
use std::io::Read;
use std::path::{Path, PathBuf};

use eyre::Context;
use serde::Deserialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to accept a single TCP connection on, stdio when unset
    pub listen: Option<String>,
    /// Commands answered with an event of the same name
    pub events: Vec<String>,
}

impl Config {
    /// Apply command line overrides: `listen` replaces, `events` extend
    pub fn with_overrides(mut self, listen: Option<String>, events: Vec<String>) -> Self {
        if listen.is_some() {
            self.listen = listen;
        }
        for event in events {
            if !self.events.contains(&event) {
                self.events.push(event);
            }
        }
        self
    }
}

/// Location of the per-user config file
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("debug-relay").join("config.toml"))
}

pub fn load(mut r: impl Read) -> eyre::Result<Config> {
    let mut contents = String::new();
    r.read_to_string(&mut contents)
        .wrap_err("reading configuration contents")?;
    toml::from_str(&contents).wrap_err("parsing configuration")
}

pub fn load_from_path(path: impl AsRef<Path>) -> eyre::Result<Config> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .wrap_err_with(|| format!("opening config file {}", path.display()))?;
    load(f)
}

/// Load the explicitly requested config file, or the per-user file if it
/// exists, or fall back to defaults
pub fn resolve(explicit: Option<&Path>) -> eyre::Result<Config> {
    if let Some(path) = explicit {
        tracing::debug!(path = %path.display(), "loading requested config");
        return load_from_path(path);
    }

    match default_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "loading user config");
            load_from_path(path)
        }
        _ => {
            tracing::debug!("no config file, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() -> eyre::Result<()> {
        let config = load(
            r#"
listen = "127.0.0.1:9229"
events = ["log", "breakForCommand"]
"#
            .as_bytes(),
        )?;
        assert_eq!(
            config,
            Config {
                listen: Some("127.0.0.1:9229".to_string()),
                events: vec!["log".to_string(), "breakForCommand".to_string()],
            }
        );
        Ok(())
    }

    #[test]
    fn empty_config() -> eyre::Result<()> {
        assert_eq!(load("".as_bytes())?, Config::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(load("port = 5858".as_bytes()).is_err());
    }

    #[test]
    fn missing_explicit_file() {
        let path = std::env::temp_dir().join("debug-relay-missing").join("config.toml");
        assert!(resolve(Some(path.as_path())).is_err());
    }

    #[test]
    fn overrides() {
        let config = Config {
            listen: Some("127.0.0.1:1".to_string()),
            events: vec!["log".to_string()],
        }
        .with_overrides(
            Some("127.0.0.1:2".to_string()),
            vec!["log".to_string(), "afterCompile".to_string()],
        );

        assert_eq!(config.listen.as_deref(), Some("127.0.0.1:2"));
        assert_eq!(config.events, vec!["log", "afterCompile"]);

        let unchanged = config.clone().with_overrides(None, Vec::new());
        assert_eq!(unchanged, config);
    }
}
