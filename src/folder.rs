//! On-disk experiment folders.
//!
//! An experiment folder holds `metadata.json`, the per-arena (and optionally
//! per-corridor) subdirectories the recording scripts write into, the
//! acquisition-parameter sidecar, and eventually the recorded media
//! (`*.mp4`, raw `*.jpg` frames) and processed output (`*.h5`).
//!
//! The folder's state is derived by scanning the directory tree, never stored:
//! a recording in progress is a property of the running process, and anything
//! that survives a restart is readable from disk.

use crate::error::{AppResult, RecorderError};
use crate::fsio;
use crate::layout::SubdirShape;
use crate::metadata::METADATA_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the acquisition-parameter sidecar.
///
/// The original tooling kept two numpy scalars (`duration.npy`, `fps.npy`);
/// the binary format is private to this tool, so both scalars live in one
/// JSON sidecar here.
pub const PARAMS_FILE: &str = "acquisition.json";

/// Derived state of an experiment folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    /// Directory structure only, no metadata yet.
    Empty,
    /// `metadata.json` present, no recorded media.
    HasMetadata,
    /// Recorded media present (`*.mp4` or `*.jpg` anywhere in the tree).
    HasRecording,
    /// Processed output present (`*.h5` anywhere in the tree).
    HasProcessedOutput,
}

/// Acquisition parameters used for a folder's recording, read back to
/// pre-fill the UI when the folder is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    /// Frames per second.
    pub fps: u32,
    /// Recording duration in seconds.
    pub duration_secs: u32,
}

/// One experiment data folder and its declared shape.
#[derive(Debug, Clone)]
pub struct ExperimentFolder {
    path: PathBuf,
    shape: SubdirShape,
}

impl ExperimentFolder {
    /// Handle to an existing (or about-to-be-created) folder. No I/O.
    pub fn new(path: &Path, shape: SubdirShape) -> Self {
        Self {
            path: path.to_path_buf(),
            shape,
        }
    }

    /// Create the folder and its declared subdirectory layout on disk.
    ///
    /// Fails with `AlreadyExists` if the target path exists; the caller is
    /// expected to offer opening the existing folder instead.
    pub fn create(path: &Path, shape: SubdirShape) -> AppResult<Self> {
        if path.exists() {
            return Err(RecorderError::AlreadyExists(path.display().to_string()));
        }
        fs::create_dir_all(path)?;
        for dir in shape.expected_dirs() {
            fs::create_dir_all(path.join(dir))?;
        }
        log::info!("Created experiment folder {}", path.display());
        Ok(Self::new(path, shape))
    }

    /// Folder root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared subdirectory shape.
    pub fn shape(&self) -> SubdirShape {
        self.shape
    }

    /// Path of this folder's `metadata.json`.
    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    /// Check that every declared subdirectory exists.
    ///
    /// `InvalidStructure` is advisory: the caller may let the user confirm
    /// opening the folder anyway.
    pub fn validate_structure(&self) -> AppResult<()> {
        let missing: Vec<PathBuf> = self
            .shape
            .expected_dirs()
            .into_iter()
            .filter(|dir| !self.path.join(dir).is_dir())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RecorderError::InvalidStructure {
                path: self.path.clone(),
                missing,
            })
        }
    }

    /// Derive the folder state by scanning the tree.
    pub fn scan_state(&self) -> AppResult<FolderState> {
        let mut found = MediaScan::default();
        scan_tree(&self.path, &mut found)?;
        if found.processed {
            Ok(FolderState::HasProcessedOutput)
        } else if found.media {
            Ok(FolderState::HasRecording)
        } else if self.metadata_path().is_file() {
            Ok(FolderState::HasMetadata)
        } else {
            Ok(FolderState::Empty)
        }
    }

    /// Write the acquisition-parameter sidecar.
    pub fn save_params(&self, params: &AcquisitionParams) -> AppResult<()> {
        fsio::write_json_atomic(&self.path.join(PARAMS_FILE), params)
    }

    /// Read the acquisition-parameter sidecar, `None` if not recorded yet.
    pub fn load_params(&self) -> AppResult<Option<AcquisitionParams>> {
        match fsio::read_json(&self.path.join(PARAMS_FILE)) {
            Ok(params) => Ok(Some(params)),
            Err(RecorderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Default)]
struct MediaScan {
    media: bool,
    processed: bool,
}

fn scan_tree(dir: &Path, found: &mut MediaScan) -> AppResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_tree(&path, found)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext {
                "mp4" | "jpg" => found.media = true,
                "h5" => found.processed = true,
                _ => {}
            }
        }
        if found.media && found.processed {
            break;
        }
    }
    Ok(())
}
