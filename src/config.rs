//! Toolkit configuration.
//!
//! Loaded from an optional `.liftmap.toml` next to the analyzed project;
//! every field has a default so an absent file means default behavior.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LiftmapConfig {
    #[serde(default)]
    pub pattern: PatternConfig,
    #[serde(default)]
    pub lift: LiftConfig,
}

/// Pattern-engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    /// Whether pattern text may use variants that consult type-checker
    /// results.
    #[serde(default = "default_true")]
    pub allow_type_info: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            allow_type_info: true,
        }
    }
}

/// Lifter knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiftConfig {
    /// Run the information-refinement subpass after lifting.
    #[serde(default = "default_true")]
    pub refine: bool,
    /// Fold all-constant composites after lifting.
    #[serde(default = "default_true")]
    pub fold: bool,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            refine: true,
            fold: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load configuration from `dir/.liftmap.toml`, falling back to defaults
/// when the file does not exist.
pub fn load_config(dir: &Path) -> Result<LiftmapConfig> {
    let path = dir.join(".liftmap.toml");
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(LiftmapConfig::default());
    }
    let contents = fs::read_to_string(&path)?;
    let config = toml::from_str::<LiftmapConfig>(&contents)
        .map_err(|e| Error::Configuration(format!("failed to parse {}: {}", path.display(), e)))?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}
