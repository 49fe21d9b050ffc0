//! Table layouts and on-disk folder shapes for the 9-arena rig.
//!
//! The rig always has 9 arenas; ball-pushing experiments subdivide each arena
//! into 6 corridors. A metadata table is laid out either per-arena (9 value
//! columns) or per-arena-per-corridor (54 value columns), and a data folder is
//! laid out either with flat `arena{1..9}` subdirectories or with nested
//! `arena{i}/corridor{j}` subdirectories. Both choices are declared properties
//! of an experiment type, never inferred from its name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of arenas in the recording rig.
pub const ARENA_COUNT: usize = 9;
/// Number of corridors per arena (ball-pushing experiments).
pub const CORRIDOR_COUNT: usize = 6;

/// Key of the row-label column in `metadata.json`.
pub const VARIABLE_KEY: &str = "Variable";

/// Column layout of the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// One value column per arena (`Arena1`..`Arena9`).
    #[default]
    Arenas,
    /// One value column per arena×corridor slot
    /// (`Arena1_Corridor1`..`Arena9_Corridor6`).
    Corridors,
}

impl TableLayout {
    /// Value-column labels for this layout, in table order. Does not include
    /// the leading `Variable` column.
    pub fn column_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.column_count());
        match self {
            TableLayout::Arenas => {
                for i in 1..=ARENA_COUNT {
                    labels.push(format!("Arena{i}"));
                }
            }
            TableLayout::Corridors => {
                for i in 1..=ARENA_COUNT {
                    for j in 1..=CORRIDOR_COUNT {
                        labels.push(format!("Arena{i}_Corridor{j}"));
                    }
                }
            }
        }
        labels
    }

    /// Number of value columns (9 or 54).
    pub fn column_count(&self) -> usize {
        match self {
            TableLayout::Arenas => ARENA_COUNT,
            TableLayout::Corridors => ARENA_COUNT * CORRIDOR_COUNT,
        }
    }

    /// Detect a layout from metadata keys.
    ///
    /// Heuristic, not guaranteed correct: a corridors-style metadata whose
    /// arena-1 columns were stripped would misclassify as `Arenas`. Kept
    /// bug-compatible with the established on-disk data.
    pub fn detect<'a, I>(keys: I) -> TableLayout
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in keys {
            if key.starts_with("Arena1_Corridor") {
                return TableLayout::Corridors;
            }
        }
        // Arena-prefixed keys and no keys at all both mean arenas.
        TableLayout::Arenas
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLayout::Arenas => write!(f, "arenas"),
            TableLayout::Corridors => write!(f, "corridors"),
        }
    }
}

/// Declared subdirectory shape of an experiment type's data folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubdirShape {
    /// `arena1`..`arena9` only.
    #[default]
    Arenas,
    /// `arena{i}/corridor{j}` for every arena and corridor.
    ArenasWithCorridors,
}

impl SubdirShape {
    /// All expected subdirectories, relative to the folder root, parents
    /// before children.
    pub fn expected_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for i in 1..=ARENA_COUNT {
            let arena = PathBuf::from(format!("arena{i}"));
            dirs.push(arena.clone());
            if matches!(self, SubdirShape::ArenasWithCorridors) {
                for j in 1..=CORRIDOR_COUNT {
                    dirs.push(arena.join(format!("corridor{j}")));
                }
            }
        }
        dirs
    }

    /// Default table layout paired with this shape.
    pub fn default_layout(&self) -> TableLayout {
        match self {
            SubdirShape::Arenas => TableLayout::Arenas,
            SubdirShape::ArenasWithCorridors => TableLayout::Corridors,
        }
    }
}
