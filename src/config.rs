//! Desk configuration loaded from YAML.
//!
//! Every key is optional; anything omitted takes the built-in default. Table
//! names end up inside SQL text, so they must be plain identifiers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "closer-targets.yaml";
pub const DEFAULT_WAREHOUSE: &str = "targets.db";
pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "https://i.ibb.co/ZNK5xmN/pdycc8-1-removebg-preview.png";
pub const NO_MARKET: &str = "No Market";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub targets: String,
    pub markets: String,
    pub users: String,
    pub appointments: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            targets: "closer_targets".to_string(),
            markets: "markets".to_string(),
            users: "users".to_string(),
            appointments: "appointments".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub warehouse: PathBuf,
    pub tables: Tables,
    pub channel_types: Vec<String>,
    pub default_channel_type: String,
    pub placeholder_image: String,
    pub no_market: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warehouse: PathBuf::from(DEFAULT_WAREHOUSE),
            tables: Tables::default(),
            channel_types: vec![
                "Hybrid".to_string(),
                "Field Marketing".to_string(),
                "Web To Home".to_string(),
            ],
            default_channel_type: "Hybrid".to_string(),
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
            no_market: NO_MARKET.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("Opening config {path:?}"))?;
        let config: Config =
            serde_yaml::from_str(&raw).with_context(|| format!("Parsing config {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` when given, else the default file if it exists, else
    /// the built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    debug!("Using config from {fallback:?}");
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (role, name) in [
            ("targets", &self.tables.targets),
            ("markets", &self.tables.markets),
            ("users", &self.tables.users),
            ("appointments", &self.tables.appointments),
        ] {
            if !is_identifier(name) {
                return Err(anyhow!(
                    "Table name '{name}' for {role} must contain only letters, digits, '_' or '.'"
                ));
            }
        }
        if self.channel_types.is_empty() {
            return Err(anyhow!("At least one channel type must be configured"));
        }
        if !self.channel_types.contains(&self.default_channel_type) {
            return Err(anyhow!(
                "Default channel type '{}' is not one of the configured channel types",
                self.default_channel_type
            ));
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "warehouse: other.db\ntables:\n  markets: lm_markets\n",
        )
        .unwrap();
        assert_eq!(config.warehouse, PathBuf::from("other.db"));
        assert_eq!(config.tables.markets, "lm_markets");
        assert_eq!(config.tables.targets, "closer_targets");
        assert_eq!(config.default_channel_type, "Hybrid");
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unsafe_table_names() {
        let mut config = Config::default();
        config.tables.targets = "targets; DROP TABLE users".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_default_channel_in_set() {
        let config = Config {
            default_channel_type: "Door".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
