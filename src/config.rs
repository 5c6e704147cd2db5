//! Run settings.
//!
//! Everything has a default, so a settings file only needs the keys it
//! changes:
//!
//! ```json
//! {
//!   "valleys": { "prominence": 3.0 },
//!   "import": { "operator": "lab-2", "target_root": "/data/MeasurementData" }
//! }
//! ```

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::{BandwidthParams, ValleyParams};
use crate::error::{Error, Result};

/// Session bookkeeping written alongside every imported file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDefaults {
    pub operator: String,
    pub system_version: String,
    pub notes: String,
    /// Root of the `wafer/doe/cage/device/dieN/session` tree. When unset the
    /// tree is placed next to the output store as `MeasurementData`.
    pub target_root: Option<PathBuf>,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            operator: "T&P".into(),
            system_version: "CM300v1.0".into(),
            notes: String::new(),
            target_root: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub valleys: ValleyParams,
    pub bandwidth: BandwidthParams,
    pub import: ImportDefaults,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings = serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Defaults when `path` is `None`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
