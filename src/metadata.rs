//! The per-folder experiment metadata record.
//!
//! `metadata.json` is an object with a `"Variable"` array of row labels plus
//! one equal-length array of values per table column (`"Arena1"`.. or
//! `"Arena1_Corridor1"`..). The on-disk schema stays a dynamic JSON object,
//! but in memory [`Metadata`] is a thin validated wrapper whose mutators
//! maintain the length invariant: after any mutation, every value column has
//! exactly as many entries as the `Variable` column.
//!
//! Duplicate variable names are defined to be dropped, first occurrence wins.
//! This matches the established behavior downstream processing scripts rely
//! on, even though it means later edits to a duplicate row silently vanish.

use crate::error::{AppResult, RecorderError};
use crate::fsio;
use crate::layout::{TableLayout, VARIABLE_KEY};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// File name of the metadata sidecar inside an experiment folder.
pub const METADATA_FILE: &str = "metadata.json";

/// One open folder's variable/value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    variables: Vec<String>,
    columns: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Empty metadata with all column keys for `layout` present.
    pub fn new(layout: TableLayout) -> Self {
        let columns = layout
            .column_labels()
            .into_iter()
            .map(|label| (label, Vec::new()))
            .collect();
        Self {
            variables: Vec::new(),
            columns,
        }
    }

    /// Build metadata from ordered table rows.
    ///
    /// Rows with an empty variable name are skipped, duplicate variable names
    /// are dropped (first occurrence wins), and values for columns a row does
    /// not mention are filled with empty strings, so the length invariant
    /// holds on the result.
    pub fn from_table<I>(layout: TableLayout, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, HashMap<String, String>)>,
    {
        let mut metadata = Self::new(layout);
        let labels = layout.column_labels();
        for (variable, values) in rows {
            if variable.is_empty() || metadata.variables.contains(&variable) {
                continue;
            }
            metadata.variables.push(variable);
            for label in &labels {
                let value = values.get(label).cloned().unwrap_or_default();
                if let Some(column) = metadata.columns.get_mut(label) {
                    column.push(value);
                }
            }
        }
        metadata
    }

    /// Load metadata from a folder's `metadata.json`.
    ///
    /// `NotFound` if the file is absent, `CorruptFile` if it cannot be
    /// parsed. Ragged arrays in a hand-edited file are normalized by padding
    /// short arrays with empty strings; nothing is truncated.
    pub fn load(path: &Path) -> AppResult<Self> {
        fsio::read_json(path)
    }

    /// Write `metadata.json` pretty-printed, via temp-file-then-rename.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        fsio::write_json_atomic(path, self)
    }

    /// Number of variable rows.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True when no variables have been recorded.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Ordered variable (row label) names.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Value-column labels present in this metadata, sorted.
    pub fn column_labels(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Values of one column, if the label exists.
    pub fn column(&self, label: &str) -> Option<&[String]> {
        self.columns.get(label).map(Vec::as_slice)
    }

    /// Cell value at `(row, label)`; empty string when the row index is past
    /// the column's current length.
    pub fn value(&self, label: &str, row: usize) -> &str {
        self.columns
            .get(label)
            .and_then(|col| col.get(row))
            .map_or("", String::as_str)
    }

    /// Set the variable name of `row`, growing the row set with empty-string
    /// padding if `row` is past the end. Never shrinks.
    pub fn set_variable(&mut self, row: usize, value: &str) {
        grow_to(&mut self.variables, row + 1);
        self.variables[row] = value.to_string();
        self.pad_columns();
    }

    /// Set a value cell, growing the column (and the variable list) with
    /// empty-string padding if `row` is past the end. Never shrinks.
    pub fn set_value(&mut self, label: &str, row: usize, value: &str) -> AppResult<()> {
        let column = self
            .columns
            .get_mut(label)
            .ok_or_else(|| RecorderError::UnknownColumn(label.to_string()))?;
        grow_to(column, row + 1);
        column[row] = value.to_string();
        grow_to(&mut self.variables, row + 1);
        self.pad_columns();
        Ok(())
    }

    /// Layout detection heuristic over the column keys; see
    /// [`TableLayout::detect`] for the documented misclassification case.
    pub fn detect_layout(&self) -> TableLayout {
        TableLayout::detect(self.columns.keys().map(String::as_str))
    }

    /// Insert any of `layout`'s column keys absent from this record, padded
    /// with empty strings to the current row count. Legacy hand-edited files
    /// can be missing whole columns, not just trail short arrays; without
    /// the keys present those cells cannot be edited.
    pub fn ensure_layout_columns(&mut self, layout: TableLayout) {
        let len = self.variables.len();
        for label in layout.column_labels() {
            self.columns
                .entry(label)
                .or_insert_with(|| vec![String::new(); len]);
        }
    }

    /// Pad every array to the longest one. Called after mutations and on
    /// deserialization so the invariant holds even for hand-edited files.
    fn pad_columns(&mut self) {
        let target = self
            .columns
            .values()
            .map(Vec::len)
            .chain(std::iter::once(self.variables.len()))
            .max()
            .unwrap_or(0);
        grow_to(&mut self.variables, target);
        for column in self.columns.values_mut() {
            grow_to(column, target);
        }
    }
}

fn grow_to(values: &mut Vec<String>, len: usize) {
    while values.len() < len {
        values.push(String::new());
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.columns.len()))?;
        map.serialize_entry(VARIABLE_KEY, &self.variables)?;
        for (label, values) in &self.columns {
            map.serialize_entry(label, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut columns = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
        let variables = columns.remove(VARIABLE_KEY).unwrap_or_default();
        let mut metadata = Metadata { variables, columns };
        metadata.pad_columns();
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(m: &Metadata) {
        for label in m.column_labels().map(str::to_string).collect::<Vec<_>>() {
            assert_eq!(m.column(&label).unwrap().len(), m.len(), "column {label}");
        }
    }

    #[test]
    fn test_new_has_all_columns_empty() {
        let m = Metadata::new(TableLayout::Corridors);
        assert_eq!(m.column_labels().count(), 54);
        assert!(m.is_empty());
        assert_invariant(&m);
    }

    #[test]
    fn test_from_table_first_occurrence_wins() {
        let rows = vec![
            ("x".to_string(), HashMap::from([("Arena1".to_string(), "1".to_string())])),
            ("y".to_string(), HashMap::from([("Arena1".to_string(), "2".to_string())])),
            ("x".to_string(), HashMap::from([("Arena1".to_string(), "3".to_string())])),
        ];
        let m = Metadata::from_table(TableLayout::Arenas, rows);
        assert_eq!(m.variables(), ["x", "y"]);
        assert_eq!(m.value("Arena1", 0), "1");
        assert_eq!(m.value("Arena1", 1), "2");
        assert_invariant(&m);
    }

    #[test]
    fn test_from_table_skips_blank_rows_and_fills_missing_values() {
        let rows = vec![
            (String::new(), HashMap::new()),
            ("Genotype".to_string(), HashMap::new()),
        ];
        let m = Metadata::from_table(TableLayout::Arenas, rows);
        assert_eq!(m.variables(), ["Genotype"]);
        assert_eq!(m.value("Arena5", 0), "");
        assert_invariant(&m);
    }

    #[test]
    fn test_set_cell_grows_never_shrinks() {
        let mut m = Metadata::new(TableLayout::Arenas);
        m.set_value("Arena3", 2, "w1118").unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.value("Arena3", 2), "w1118");
        assert_eq!(m.variables()[2], "");
        assert_invariant(&m);

        m.set_variable(0, "Genotype");
        assert_eq!(m.len(), 3);
        assert_invariant(&m);
    }

    #[test]
    fn test_set_value_unknown_column() {
        let mut m = Metadata::new(TableLayout::Arenas);
        let err = m.set_value("Arena1_Corridor1", 0, "x").unwrap_err();
        assert!(matches!(err, RecorderError::UnknownColumn(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);

        let mut m = Metadata::new(TableLayout::Arenas);
        m.set_variable(0, "Genotype");
        m.set_value("Arena1", 0, "w1118").unwrap();
        m.save(&path).unwrap();

        let loaded = Metadata::load(&path).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn test_load_pads_ragged_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        std::fs::write(
            &path,
            r#"{"Variable": ["a", "b"], "Arena1": ["1"], "Arena2": []}"#,
        )
        .unwrap();

        let m = Metadata::load(&path).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.value("Arena1", 0), "1");
        assert_eq!(m.value("Arena1", 1), "");
        assert_invariant(&m);
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        std::fs::write(&path, b"not json at all").unwrap();
        assert!(matches!(
            Metadata::load(&path),
            Err(RecorderError::CorruptFile { .. })
        ));
    }

    #[test]
    fn test_ensure_layout_columns_restores_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        std::fs::write(&path, r#"{"Variable": ["Genotype"], "Arena1": ["w1118"]}"#).unwrap();

        let mut m = Metadata::load(&path).unwrap();
        m.ensure_layout_columns(TableLayout::Arenas);
        assert_eq!(m.column_labels().count(), 9);
        assert_eq!(m.value("Arena1", 0), "w1118");
        assert_eq!(m.value("Arena2", 0), "");
        m.set_value("Arena2", 0, "CS").unwrap();
        assert_invariant(&m);
    }

    #[test]
    fn test_detect_layout() {
        assert_eq!(
            Metadata::new(TableLayout::Corridors).detect_layout(),
            TableLayout::Corridors
        );
        assert_eq!(
            Metadata::new(TableLayout::Arenas).detect_layout(),
            TableLayout::Arenas
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        std::fs::write(&path, r#"{"Variable": []}"#).unwrap();
        assert_eq!(
            Metadata::load(&path).unwrap().detect_layout(),
            TableLayout::Arenas
        );
    }
}
