use std::path::Path;

use ahx_diff::CategoryLabel;
use ahx_history::HistoryConfig;
use ahx_types::EnumerationOptions;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Top-level configuration of a diff session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub diff: DiffConfig,
    pub history: HistoryConfig,
}

impl SessionConfig {
    /// Parse a TOML document. Missing tables and keys take their defaults.
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot describe a usable session.
    pub fn validate(&self) -> SessionResult<()> {
        if self.diff.max_depth == Some(0) {
            return Err(SessionError::Config(
                "diff.max_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> SessionResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> SessionResult<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }
}

/// How differences are computed and grouped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub category_label: String,
    pub category_tooltip: String,
    /// Compare arrays as whole values.
    pub atomic_arrays: bool,
    /// Deepest property nesting compared individually.
    pub max_depth: Option<usize>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        let category = CategoryLabel::default();
        Self {
            category_label: category.label,
            category_tooltip: category.tooltip,
            atomic_arrays: false,
            max_depth: None,
        }
    }
}

impl DiffConfig {
    pub fn category(&self) -> CategoryLabel {
        CategoryLabel {
            label: self.category_label.clone(),
            tooltip: self.category_tooltip.clone(),
        }
    }

    pub fn enumeration(&self) -> EnumerationOptions {
        EnumerationOptions {
            atomic_arrays: self.atomic_arrays,
            max_depth: self.max_depth,
        }
    }
}
