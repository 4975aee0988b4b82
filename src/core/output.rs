/// The simulation output log — a fixed-size grid of formatted values,
/// with row-major dumps for export.

use serde::{Deserialize, Serialize};

/// Output of one simulation run: three header rows (run parameters,
/// hierarchical ids, stage names) followed by one row per iteration.
/// Column 0 carries the iteration index; each further column is one
/// reported stage. Sized once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLog {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

impl OutputLog {
    pub(crate) fn new(rows: usize, cols: usize) -> OutputLog {
        OutputLog {
            rows,
            cols,
            cells: vec![String::new(); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(&self.cells[row * self.cols + col])
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: String) {
        self.cells[row * self.cols + col] = value;
    }

    /// Tab-separated text: columns joined by tabs, rows by newlines.
    pub fn to_tsv(&self) -> String {
        let mut text = String::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                text.push_str(&self.cells[row * self.cols + col]);
                text.push(if col < self.cols - 1 { '\t' } else { '\n' });
            }
        }
        text
    }

    /// A minimal HTML table of the cell contents.
    pub fn to_html(&self) -> String {
        let mut text = String::from("<html><body><table>\n");
        for row in 0..self.rows {
            text.push_str("<tr>");
            for col in 0..self.cols {
                text.push_str("<td>");
                text.push_str(&escape(&self.cells[row * self.cols + col]));
                text.push_str("</td>");
            }
            text.push_str("</tr>\n");
        }
        text.push_str("</table></body></html>\n");
        text
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
