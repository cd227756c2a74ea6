use serde::{Deserialize, Serialize};

/// Smallest column count a shell is ever launched with.
pub const MIN_COLS: u16 = 10;
/// Smallest row count a shell is ever launched with.
pub const MIN_ROWS: u16 = 5;

/// Columns used when a launch request leaves the width unspecified (0).
pub const DEFAULT_COLS: u16 = 120;
/// Rows used when a launch request leaves the height unspecified (0).
pub const DEFAULT_ROWS: u16 = 30;

/// Character-grid size shared between a pane viewport and a shell's PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

impl Geometry {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Geometry for a new shell: zero means "unspecified" and takes the
    /// default, then both axes are raised to the sane minimums.
    pub fn for_launch(cols: u16, rows: u16) -> Self {
        let cols = if cols == 0 { DEFAULT_COLS } else { cols };
        let rows = if rows == 0 { DEFAULT_ROWS } else { rows };
        Self::new(cols, rows).clamped()
    }

    /// Raise both axes to at least `MIN_COLS` x `MIN_ROWS`.
    pub fn clamped(self) -> Self {
        Self {
            cols: self.cols.max(MIN_COLS),
            rows: self.rows.max(MIN_ROWS),
        }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
