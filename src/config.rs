//! Application settings.
//!
//! Settings are loaded from an optional TOML file plus environment variables
//! prefixed with `MULTIMAZE_` (e.g. `MULTIMAZE_DATA_ROOT=/mnt/labserver/MD`),
//! with environment overriding the file. Every field has a default so the
//! tool starts without any configuration present.

use crate::error::AppResult;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of trailing blank rows kept in the metadata table.
pub const DEFAULT_PAD_ROWS: usize = 10;

/// Runtime settings for the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Lab data root; all experiment folders live underneath it. Typically a
    /// network share, so it may be unreachable at any time.
    pub data_root: PathBuf,
    /// Directory holding named metadata templates (one JSON file each).
    pub template_dir: PathBuf,
    /// Path of the experiment-type registry file.
    pub registry_file: PathBuf,
    /// Trailing blank rows maintained at the bottom of the table.
    pub pad_rows: usize,
}

impl Settings {
    /// Load settings from `config_path` (if given and present) and the
    /// environment.
    pub fn new(config_path: Option<&Path>) -> AppResult<Self> {
        let default_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multimaze");

        let mut builder = Config::builder()
            .set_default("data_root", default_root.to_string_lossy().to_string())?
            .set_default("template_dir", "Metadata_Templates")?
            .set_default("registry_file", "experiments.json")?
            .set_default("pad_rows", DEFAULT_PAD_ROWS as i64)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        } else {
            builder = builder.add_source(File::with_name("multimaze").required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("MULTIMAZE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
