//! Named metadata templates.
//!
//! A template is a reusable ordered list of known variable names for an
//! experiment type, used to pre-populate new tables so common fields are not
//! retyped. Each template is one JSON array file in the template directory;
//! one template may be shared by several experiment types.
//!
//! The store never decides whether a template should absorb what a user typed
//! into a table: [`propose_update`] is a pure diff, and the caller chooses to
//! [`TemplateStore::append`], branch to a new template, or do nothing.
//! Silently adding when the diff reports `missing` entries would resurrect
//! rows a user intentionally deleted.

use crate::error::{AppResult, RecorderError};
use crate::fsio;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Diff between a table's variables and a template's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateDiff {
    /// Variables present in the table but absent from the template.
    pub new: BTreeSet<String>,
    /// Variables in the template but absent from the table.
    pub missing: BTreeSet<String>,
}

impl TemplateDiff {
    /// True when table and template agree on the variable set.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.missing.is_empty()
    }
}

/// Compute the variable-set diff between the current table and a template.
///
/// Pure function, no side effects; calling it twice with the same inputs
/// yields the same sets.
pub fn propose_update(current: &[String], template: &[String]) -> TemplateDiff {
    let current_set: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let template_set: BTreeSet<&str> = template.iter().map(String::as_str).collect();
    TemplateDiff {
        new: current
            .iter()
            .filter(|v| !template_set.contains(v.as_str()))
            .cloned()
            .collect(),
        missing: template
            .iter()
            .filter(|v| !current_set.contains(v.as_str()))
            .cloned()
            .collect(),
    }
}

/// Durable store of named templates, one JSON file per name.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    /// Store rooted at `dir`. The directory is created lazily on first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Names of all templates on disk, sorted.
    pub fn list(&self) -> AppResult<Vec<String>> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a template's variable names.
    ///
    /// `NotFound` if no file exists for `name`; an existing-but-empty
    /// template (zero-byte file included) loads as an empty list.
    pub fn load(&self, name: &str) -> AppResult<Vec<String>> {
        let path = self.path_for(name);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => return Ok(Vec::new()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecorderError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        fsio::read_json(&path)
    }

    /// Create a new empty template. `AlreadyExists` if the name is taken.
    pub fn create(&self, name: &str) -> AppResult<()> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(RecorderError::AlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;
        fsio::write_json_atomic(&path, &Vec::<String>::new())
    }

    /// Create a template seeded with `variables`, used when branching off a
    /// table whose variable set diverged from its template.
    pub fn create_from(&self, name: &str, variables: &[String]) -> AppResult<()> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(RecorderError::AlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;
        fsio::write_json_atomic(&path, &variables.to_vec())
    }

    /// Append previously-unseen variables to a template and write it back.
    ///
    /// Idempotent union: variables already present are skipped, order of the
    /// existing entries is preserved, new entries go to the end. Appending to
    /// a template that does not exist yet creates it.
    pub fn append<I, S>(&self, name: &str, new_variables: I) -> AppResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut variables = match self.load(name) {
            Ok(vars) => vars,
            Err(RecorderError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut added = 0;
        for var in new_variables {
            let var = var.as_ref();
            if !variables.iter().any(|v| v == var) {
                variables.push(var.to_string());
                added += 1;
            }
        }
        if added > 0 {
            std::fs::create_dir_all(&self.dir)?;
            fsio::write_json_atomic(&self.path_for(name), &variables)?;
            log::info!("Added {added} variable(s) to template '{name}'");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(&dir.path().join("Metadata_Templates"));
        (dir, store)
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_missing_template() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("nope"),
            Err(RecorderError::NotFound(_))
        ));
    }

    #[test]
    fn test_zero_byte_template_loads_empty() {
        let (_dir, store) = store();
        std::fs::create_dir_all(&store.dir).unwrap();
        std::fs::write(store.path_for("stub"), b"").unwrap();
        assert!(store.load("stub").unwrap().is_empty());
    }

    #[test]
    fn test_create_then_load_empty() {
        let (_dir, store) = store();
        store.create("Standard").unwrap();
        assert!(store.load("Standard").unwrap().is_empty());
        assert!(matches!(
            store.create("Standard"),
            Err(RecorderError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_append_is_idempotent_union() {
        let (_dir, store) = store();
        store.create("BallPushing").unwrap();
        assert_eq!(store.append("BallPushing", ["Genotype", "Date"]).unwrap(), 2);
        assert_eq!(store.append("BallPushing", ["Date", "Sex"]).unwrap(), 1);
        assert_eq!(
            store.load("BallPushing").unwrap(),
            vars(&["Genotype", "Date", "Sex"])
        );
    }

    #[test]
    fn test_propose_update_diff() {
        let current = vars(&["Genotype", "Sex", "Treatment"]);
        let template = vars(&["Genotype", "Date"]);
        let diff = propose_update(&current, &template);
        let expected_new: BTreeSet<String> = vars(&["Sex", "Treatment"]).into_iter().collect();
        let expected_missing: BTreeSet<String> = vars(&["Date"]).into_iter().collect();
        assert_eq!(diff.new, expected_new);
        assert_eq!(diff.missing, expected_missing);

        // Idempotent: same inputs, same sets.
        assert_eq!(diff, propose_update(&current, &template));
    }

    #[test]
    fn test_propose_update_no_drift() {
        let current = vars(&["Genotype"]);
        assert!(propose_update(&current, &current).is_empty());
    }

    #[test]
    fn test_create_from_branches_template() {
        let (_dir, store) = store();
        let current = vars(&["Genotype", "Sex"]);
        store.create_from("BallPushing_v2", &current).unwrap();
        assert_eq!(store.load("BallPushing_v2").unwrap(), current);
        assert_eq!(store.list().unwrap(), vec!["BallPushing_v2"]);
    }
}
