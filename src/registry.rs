//! Experiment-type registry.
//!
//! An experiment type names a category of experiments (e.g. "BallPushing",
//! "Standard") and fixes where its data folders live under the lab data root,
//! which metadata template seeds new tables, which camera preset to load, and
//! the declared folder/table shape. The catalog is persisted as a flat JSON
//! array in `experiments.json` in the working directory.
//!
//! Types are created by explicit user action and never deleted; there is no
//! delete operation by design.

use crate::error::{AppResult, RecorderError};
use crate::fsio;
use crate::layout::{SubdirShape, TableLayout};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A named category of experiments.
///
/// Behavioral branches (folder shape, default table layout) are declared
/// fields, so adding a new experiment type never requires new conditionals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentType {
    /// Unique name, shown in the type selector.
    pub name: String,
    /// Data folder location, relative to the lab data root.
    pub path: PathBuf,
    /// Name of the metadata template seeding new tables, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_template: Option<String>,
    /// Camera preset file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_settings: Option<PathBuf>,
    /// Declared subdirectory shape of this type's data folders.
    #[serde(default)]
    pub subdir_shape: SubdirShape,
    /// Table layout pre-selected for new folders of this type.
    #[serde(default)]
    pub default_layout: TableLayout,
}

impl ExperimentType {
    /// Absolute root for this type's folders under `data_root`.
    pub fn root_under(&self, data_root: &Path) -> PathBuf {
        data_root.join(&self.path)
    }
}

/// The persistent catalog of experiment types.
#[derive(Debug)]
pub struct ExperimentRegistry {
    file: PathBuf,
    experiments: Vec<ExperimentType>,
}

impl ExperimentRegistry {
    /// Load the registry from `file`, or start empty if the file does not
    /// exist yet.
    pub fn load(file: &Path) -> AppResult<Self> {
        let experiments = match fsio::read_json::<Vec<ExperimentType>>(file) {
            Ok(list) => list,
            Err(RecorderError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            file: file.to_path_buf(),
            experiments,
        })
    }

    /// All registered experiment types, in registration order.
    pub fn experiments(&self) -> &[ExperimentType] {
        &self.experiments
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<&ExperimentType> {
        self.experiments.iter().find(|e| e.name == name)
    }

    /// Register a new experiment type and persist the catalog.
    ///
    /// `chosen_path` may be absolute (as returned by a folder picker) or
    /// already relative; an absolute path must lie under `data_root`, matching
    /// the original folder-picker validation.
    pub fn add(
        &mut self,
        data_root: &Path,
        name: &str,
        chosen_path: &Path,
        metadata_template: Option<String>,
        camera_settings: Option<PathBuf>,
        subdir_shape: SubdirShape,
    ) -> AppResult<&ExperimentType> {
        if self.get(name).is_some() {
            return Err(RecorderError::AlreadyExists(name.to_string()));
        }

        let relative = if chosen_path.is_absolute() {
            chosen_path
                .strip_prefix(data_root)
                .map_err(|_| RecorderError::PathOutsideDataRoot(chosen_path.to_path_buf()))?
                .to_path_buf()
        } else {
            // A relative path with `..` could still resolve above the root.
            if chosen_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(RecorderError::PathOutsideDataRoot(chosen_path.to_path_buf()));
            }
            chosen_path.to_path_buf()
        };

        let default_layout = subdir_shape.default_layout();
        self.experiments.push(ExperimentType {
            name: name.to_string(),
            path: relative,
            metadata_template,
            camera_settings,
            subdir_shape,
            default_layout,
        });
        self.save()?;
        log::info!("Registered experiment type '{name}'");
        Ok(&self.experiments[self.experiments.len() - 1])
    }

    fn save(&self) -> AppResult<()> {
        fsio::write_json_atomic(&self.file, &self.experiments)
    }
}
