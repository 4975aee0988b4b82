/// Casting tables — named matrices of stage transition probabilities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("cell ({row},{col}) is outside the {rows}x{cols} bounds of the table")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("expected {expected} values for the table shape, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("'{0}' is not a finite probability value")]
    NotFinite(f32),
}

/// Tolerance on a row's deviation from summing to exactly 1.0 before
/// it is flagged as leaking population.
pub const ROW_SUM_TOLERANCE: f32 = 0.001;

/// A named probability matrix governing how a stage's incoming
/// population splits across its children: one column per child stage,
/// one row per observed distribution to bootstrap-sample from.
///
/// The shape is fixed once filled; changing it means building a new
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastingTable {
    name: String,
    rows: usize,
    cols: usize,
    /// Row-major cell values.
    cells: Vec<f32>,
}

impl CastingTable {
    /// Create a table of the given shape filled with zeroes.
    pub fn zeroed(name: impl Into<String>, rows: usize, cols: usize) -> CastingTable {
        CastingTable {
            name: name.into(),
            rows,
            cols,
            cells: vec![0.0; rows * cols],
        }
    }

    /// Create a table with the same shape and values as `source`.
    pub fn from_copy(source: &CastingTable, name: impl Into<String>) -> CastingTable {
        CastingTable {
            name: name.into(),
            rows: source.rows,
            cols: source.cols,
            cells: source.cells.clone(),
        }
    }

    /// Create a table from raw row-major values. The values are taken
    /// as-is: raw external data is not clamped, the consistency check
    /// reports rows that leak instead.
    pub fn from_raw(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        values: &[f32],
    ) -> Result<CastingTable, TableError> {
        if values.len() != rows * cols {
            return Err(TableError::ShapeMismatch {
                expected: rows * cols,
                actual: values.len(),
            });
        }
        Ok(CastingTable {
            name: name.into(),
            rows,
            cols,
            cells: values.to_vec(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Read the cell at (row, col).
    pub fn read_cell(&self, row: usize, col: usize) -> Result<f32, TableError> {
        self.check_bounds(row, col)?;
        Ok(self.cells[row * self.cols + col])
    }

    /// Write the cell at (row, col), clamped so that no cell leaves
    /// [0, 1] and the row's sum never exceeds 1.0: a write past the
    /// row's remaining headroom is capped at that headroom. Other
    /// cells in the row are never touched. Returns the value actually
    /// stored.
    pub fn write_cell(&mut self, row: usize, col: usize, value: f32) -> Result<f32, TableError> {
        self.check_bounds(row, col)?;
        if !value.is_finite() {
            return Err(TableError::NotFinite(value));
        }
        let mut value = value.clamp(0.0, 1.0);
        let others = self.row_sum(row)? - self.cells[row * self.cols + col];
        let headroom = (1.0 - others).max(0.0);
        if value > headroom {
            value = headroom;
        }
        self.cells[row * self.cols + col] = value;
        Ok(value)
    }

    /// Sum of the cells in a row.
    pub fn row_sum(&self, row: usize) -> Result<f32, TableError> {
        self.check_bounds(row, 0)?;
        Ok(self.cells[row * self.cols..(row + 1) * self.cols]
            .iter()
            .sum())
    }

    /// Rows whose sum deviates from 1.0 beyond [`ROW_SUM_TOLERANCE`],
    /// in row order. A non-finite sum always counts as deviating.
    pub fn leaking_rows(&self) -> Vec<(usize, f32)> {
        (0..self.rows)
            .filter_map(|r| {
                let sum: f32 = self.cells[r * self.cols..(r + 1) * self.cols].iter().sum();
                // Negated so a NaN sum is flagged rather than skipped
                (!((1.0 - sum).abs() <= ROW_SUM_TOLERANCE)).then_some((r, sum))
            })
            .collect()
    }

    /// Cell values in row-major order.
    pub fn values(&self) -> &[f32] {
        &self.cells
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<(), TableError> {
        if row >= self.rows || col >= self.cols {
            return Err(TableError::OutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}
