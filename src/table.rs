//! The editable grid bound to one metadata record.
//!
//! `TableBinding` is the single shared owner of the open folder's metadata
//! while it is being edited. Every cell edit, including the bulk fill
//! operations, goes through the same grow-only update path on the underlying
//! [`Metadata`], so the length invariant holds after any edit sequence and no
//! stale copies of the record exist for a second view to clobber.
//!
//! Rows past the materialized metadata are virtual trailing blanks: the
//! binding always presents `pad_rows` blank rows at the bottom, and typing in
//! one grows the metadata with empty-string padding. Sequences are never
//! shrunk by an edit; blank-variable rows are dropped only when a snapshot is
//! taken for saving.

use crate::error::AppResult;
use crate::layout::TableLayout;
use crate::metadata::Metadata;
use std::collections::HashMap;

/// Editable grid state over a [`Metadata`] record.
#[derive(Debug, Clone)]
pub struct TableBinding {
    layout: TableLayout,
    labels: Vec<String>,
    metadata: Metadata,
    pad_rows: usize,
}

impl TableBinding {
    /// Bind an existing metadata record (typically freshly loaded from disk).
    pub fn bind(metadata: Metadata, layout: TableLayout, pad_rows: usize) -> Self {
        Self {
            labels: layout.column_labels(),
            layout,
            metadata,
            pad_rows,
        }
    }

    /// Fresh binding for a new folder, with the `Variable` column
    /// pre-populated from a template's known variable names.
    pub fn seeded(layout: TableLayout, template_variables: &[String], pad_rows: usize) -> Self {
        let mut binding = Self::bind(Metadata::new(layout), layout, pad_rows);
        for (row, variable) in template_variables.iter().enumerate() {
            binding.metadata.set_variable(row, variable);
        }
        binding
    }

    /// Append template variables that are not in the table yet, each as a new
    /// row with empty values. Used when opening an existing folder whose
    /// template has grown since the folder was created.
    pub fn merge_template(&mut self, template_variables: &[String]) {
        for variable in template_variables {
            if !self.metadata.variables().contains(variable) {
                let row = self.metadata.len();
                self.metadata.set_variable(row, variable);
            }
        }
    }

    /// Active table layout.
    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    /// Value-column labels in table order.
    pub fn column_labels(&self) -> &[String] {
        &self.labels
    }

    /// Displayed row count: materialized rows plus the trailing blank pad.
    pub fn row_count(&self) -> usize {
        self.metadata.len() + self.pad_rows
    }

    /// Variable cell of `row` (empty for virtual trailing rows).
    pub fn variable(&self, row: usize) -> &str {
        self.metadata
            .variables()
            .get(row)
            .map_or("", String::as_str)
    }

    /// Value cell at `(row, label)` (empty for virtual trailing rows).
    pub fn value(&self, row: usize, label: &str) -> &str {
        self.metadata.value(label, row)
    }

    /// Edit the variable cell of `row`.
    pub fn set_variable(&mut self, row: usize, value: &str) {
        self.metadata.set_variable(row, value);
    }

    /// Edit a value cell.
    pub fn set_value(&mut self, row: usize, label: &str, value: &str) -> AppResult<()> {
        self.metadata.set_value(label, row, value)
    }

    /// Fill `value` across every value column of `row`.
    pub fn fill_row(&mut self, row: usize, value: &str) -> AppResult<()> {
        for label in self.labels.clone() {
            self.metadata.set_value(&label, row, value)?;
        }
        Ok(())
    }

    /// Fill `value` across the columns of one arena in `row`. In the
    /// corridors layout this hits the arena's six corridor columns; in the
    /// arenas layout it hits the single arena column.
    pub fn fill_arena(&mut self, row: usize, arena: usize, value: &str) -> AppResult<()> {
        let exact = format!("Arena{arena}");
        let prefix = format!("Arena{arena}_");
        for label in self.labels.clone() {
            if label == exact || label.starts_with(&prefix) {
                self.metadata.set_value(&label, row, value)?;
            }
        }
        Ok(())
    }

    /// The live metadata record backing the grid.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Snapshot for saving or dirty-checking: blank-variable rows dropped,
    /// duplicate variables collapsed (first occurrence wins), all columns
    /// equal length.
    pub fn to_metadata(&self) -> Metadata {
        let rows = (0..self.metadata.len()).map(|row| {
            let values: HashMap<String, String> = self
                .labels
                .iter()
                .map(|label| (label.clone(), self.metadata.value(label, row).to_string()))
                .collect();
            (self.variable(row).to_string(), values)
        });
        Metadata::from_table(self.layout, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_pad_rows() {
        let binding = TableBinding::bind(Metadata::new(TableLayout::Arenas), TableLayout::Arenas, 10);
        assert_eq!(binding.row_count(), 10);
        assert_eq!(binding.variable(7), "");
        assert_eq!(binding.value(7, "Arena4"), "");
    }

    #[test]
    fn test_edit_in_pad_row_grows_metadata() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Arenas), TableLayout::Arenas, 10);
        binding.set_variable(3, "Genotype");
        assert_eq!(binding.metadata().len(), 4);
        // Pad is maintained past the new content.
        assert_eq!(binding.row_count(), 14);
        binding.set_value(3, "Arena2", "w1118").unwrap();
        assert_eq!(binding.value(3, "Arena2"), "w1118");
    }

    #[test]
    fn test_seeded_from_template() {
        let template = vec!["Genotype".to_string(), "Date".to_string()];
        let binding = TableBinding::seeded(TableLayout::Corridors, &template, 10);
        assert_eq!(binding.variable(0), "Genotype");
        assert_eq!(binding.variable(1), "Date");
        assert_eq!(binding.value(1, "Arena9_Corridor6"), "");
    }

    #[test]
    fn test_merge_template_appends_only_unknown() {
        let mut binding = TableBinding::seeded(
            TableLayout::Arenas,
            &["Genotype".to_string()],
            10,
        );
        binding.merge_template(&["Genotype".to_string(), "Sex".to_string()]);
        assert_eq!(binding.metadata().variables(), ["Genotype", "Sex"]);
    }

    #[test]
    fn test_fill_row() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Corridors), TableLayout::Corridors, 5);
        binding.set_variable(0, "Genotype");
        binding.fill_row(0, "w1118").unwrap();
        assert_eq!(binding.value(0, "Arena1_Corridor1"), "w1118");
        assert_eq!(binding.value(0, "Arena9_Corridor6"), "w1118");
    }

    #[test]
    fn test_fill_arena_corridors_layout() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Corridors), TableLayout::Corridors, 5);
        binding.set_variable(0, "Treatment");
        binding.fill_arena(0, 3, "sucrose").unwrap();
        for j in 1..=6 {
            assert_eq!(binding.value(0, &format!("Arena3_Corridor{j}")), "sucrose");
        }
        assert_eq!(binding.value(0, "Arena4_Corridor1"), "");
    }

    #[test]
    fn test_fill_arena_arenas_layout() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Arenas), TableLayout::Arenas, 5);
        binding.set_variable(0, "Treatment");
        binding.fill_arena(0, 2, "starved").unwrap();
        assert_eq!(binding.value(0, "Arena2"), "starved");
        assert_eq!(binding.value(0, "Arena1"), "");
    }

    #[test]
    fn test_to_metadata_drops_blank_and_duplicate_rows() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Arenas), TableLayout::Arenas, 5);
        binding.set_variable(0, "x");
        binding.set_value(0, "Arena1", "1").unwrap();
        // Row 1 left blank via a value-only edit.
        binding.set_value(1, "Arena1", "orphan").unwrap();
        binding.set_variable(2, "y");
        binding.set_value(2, "Arena1", "2").unwrap();
        binding.set_variable(3, "x");
        binding.set_value(3, "Arena1", "3").unwrap();

        let snapshot = binding.to_metadata();
        assert_eq!(snapshot.variables(), ["x", "y"]);
        assert_eq!(snapshot.value("Arena1", 0), "1");
        assert_eq!(snapshot.value("Arena1", 1), "2");
    }

    #[test]
    fn test_invariant_after_edit_sequence() {
        let mut binding =
            TableBinding::bind(Metadata::new(TableLayout::Arenas), TableLayout::Arenas, 10);
        binding.set_value(5, "Arena9", "late").unwrap();
        binding.set_variable(12, "deep");
        binding.fill_row(2, "mid").unwrap();

        let m = binding.metadata();
        for label in binding.column_labels() {
            assert_eq!(m.column(label).unwrap().len(), m.len());
        }
    }
}
