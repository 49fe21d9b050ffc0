//! Small JSON file helpers shared by the persistence layers.
//!
//! Every persisted file (metadata, templates, registry, sidecars) is small
//! and written infrequently, but the GUI can be closed mid-write, so all
//! writes go through write-temp-then-rename. A crash can leave a stray
//! `*.tmp` file behind but never a truncated file that parses as valid.

use crate::error::{AppResult, RecorderError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as pretty-printed JSON to `path` atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| RecorderError::CorruptFile {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and parse a JSON file.
///
/// Returns `NotFound` if the file is absent and `CorruptFile` if it exists
/// but cannot be parsed; no partial parse is attempted.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RecorderError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|source| RecorderError::CorruptFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_json_atomic(&path, &vec!["a".to_string(), "b".to_string()]).unwrap();
        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, vec!["a", "b"]);
        // No temp file left behind.
        assert!(!dir.path().join("data.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_json::<Vec<String>>(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, RecorderError::NotFound(_)));
    }

    #[test]
    fn test_malformed_json_is_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = read_json::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, RecorderError::CorruptFile { .. }));
    }
}
