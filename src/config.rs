//! Session configuration.
//!
//! Loaded from TOML; every key is optional and falls back to the defaults below.

use crate::error::ConfigError;
use crate::logging;
use serde::Deserialize;
use std::path::Path;

/// What [`World::create`](crate::World::create) does with an unregistered kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKinds {
    /// Log a warning and create a plain element.
    #[default]
    Fallback,
    /// Refuse to create the entity.
    Reject,
}

/// Initial container size, until the first `windowResized`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Extent {
            width: 1024.,
            height: 768.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scope for session-wide messages (participants, resizes).
    pub session_id: String,
    pub container: Extent,
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    pub log_filter: String,
    /// Whether the first tick repaints everything.
    pub full_refresh_on_start: bool,
    /// How many consecutive ticks deferred view initializers may keep asking for another round.
    pub initializer_rounds: usize,
    pub unknown_kinds: UnknownKinds,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            session_id: "session".to_string(),
            container: Extent::default(),
            log_filter: "cards=info".to_string(),
            full_refresh_on_start: true,
            initializer_rounds: 4,
            unknown_kinds: UnknownKinds::Fallback,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Config::from_toml_str(&text)
    }

    /// Installs the global log subscriber with [`Config::log_filter`] as its default filter.
    ///
    /// Returns false if a subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        logging::init(&self.log_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_config() {
        let config = Config::from_toml_str(
            r#"
            session_id = "room-7"
            unknown_kinds = "reject"

            [container]
            width = 640.0
            "#,
        )
        .unwrap();

        assert_eq!(config.session_id, "room-7");
        assert_eq!(config.unknown_kinds, UnknownKinds::Reject);
        assert_eq!(
            config.container,
            Extent {
                width: 640.,
                height: 768.
            }
        );
        assert!(config.full_refresh_on_start);
        assert_eq!(config.initializer_rounds, 4);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn logging_uses_the_configured_filter() {
        let config = Config::from_toml_str("log_filter = \"cards=trace\"").unwrap();
        assert_eq!(config.log_filter, "cards=trace");
        config.init_logging();
        assert!(!config.init_logging());
    }

    #[test]
    fn bad_config() {
        assert!(matches!(
            Config::from_toml_str("initializer_rounds = \"many\""),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            Config::load("/nonexistent/cards.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
