//! Backend configuration, loaded from TOML.
//!
//! ```toml
//! flag_scopes = ["core", "world", "dnd5e"]
//!
//! [[packs]]
//! name = "world.monsters"
//! document_name = "Actor"
//!
//! [packs.ownership]
//! PLAYER = "OBSERVER"
//! ASSISTANT = "OWNER"
//! ```

use crate::document::ownership::{CompendiumOwnership, OwnershipLevel, UserRole};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("duplicate pack '{0}'")]
    DuplicatePack(String),

    #[error("invalid pack name '{0}'")]
    InvalidPackName(String),

    #[error("invalid flag scope '{0}'")]
    InvalidScope(String),

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pack '{pack}': {message}")]
    Ownership { pack: String, message: String },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

///
/// BackendConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub flag_scopes: Vec<String>,
    pub packs: Vec<PackConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            flag_scopes: vec!["core".to_string(), "world".to_string()],
            packs: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;

        Self::from_toml(&text)
    }

    #[must_use]
    pub fn with_pack(mut self, pack: PackConfig) -> Self {
        self.packs.push(pack);
        self
    }

    #[must_use]
    pub fn with_flag_scope(mut self, scope: impl Into<String>) -> Self {
        self.flag_scopes.push(scope.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for scope in &self.flag_scopes {
            if scope.is_empty() || scope.contains('.') {
                return Err(ConfigError::InvalidScope(scope.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        for pack in &self.packs {
            if pack.name.is_empty() || pack.name.starts_with('.') || pack.name.ends_with('.') {
                return Err(ConfigError::InvalidPackName(pack.name.clone()));
            }
            if !seen.insert(pack.name.as_str()) {
                return Err(ConfigError::DuplicatePack(pack.name.clone()));
            }
            pack.ownership()?;
        }

        Ok(())
    }

    #[must_use]
    pub fn pack(&self, name: &str) -> Option<&PackConfig> {
        self.packs.iter().find(|pack| pack.name == name)
    }

    #[must_use]
    pub fn pack_names(&self) -> Vec<String> {
        self.packs.iter().map(|pack| pack.name.clone()).collect()
    }
}

///
/// PackConfig
///
/// One compendium pack. `ownership` maps role names to ownership level
/// names; an empty map means the default compendium rules.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PackConfig {
    pub name: String,
    pub document_name: String,
    #[serde(default)]
    pub ownership: BTreeMap<String, String>,
}

impl PackConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, document_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document_name: document_name.into(),
            ownership: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_ownership(mut self, role: UserRole, level: OwnershipLevel) -> Self {
        self.ownership
            .insert(role.as_str().to_string(), level.as_str().to_string());
        self
    }

    pub fn ownership(&self) -> Result<CompendiumOwnership, ConfigError> {
        if self.ownership.is_empty() {
            return Ok(CompendiumOwnership::default());
        }

        let invalid = |message: String| ConfigError::Ownership {
            pack: self.name.clone(),
            message,
        };
        let roles = self
            .ownership
            .iter()
            .map(|(role, level)| {
                let role = role.parse::<UserRole>().map_err(invalid)?;
                let level = level.parse::<OwnershipLevel>().map_err(invalid)?;

                Ok((role, level))
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(CompendiumOwnership { roles })
    }
}
