//! Spreadsheet document capability
//!
//! The pipeline only needs a handful of operations on a workbook. Concrete
//! formats live behind [`SpreadsheetBackend`]; `.xlsx` is in [`crate::xlsx`].

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to open document '{path}': {message}")]
    Open { path: PathBuf, message: String },

    #[error("Failed to embed picture '{image}' at {cell}: {message}")]
    Embed {
        image: PathBuf,
        cell: CellRef,
        message: String,
    },

    #[error("Failed to save document '{path}': {message}")]
    Save { path: PathBuf, message: String },

    #[error("Sheet index {0} out of range")]
    NoSuchSheet(usize),
}

/// 1-based cell position, column then row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub column: u32,
    pub row: u32,
}

impl CellRef {
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Parse `"B3"` style references. Absolute markers (`$`) are ignored.
    pub fn parse_a1(text: &str) -> Option<Self> {
        let text: String = text.chars().filter(|c| *c != '$').collect();
        let split = text.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut column: u32 = 0;
        for c in letters.chars() {
            let value = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
            column = column.checked_mul(26)?.checked_add(value)?;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self { column, row })
    }

    pub fn to_a1(&self) -> String {
        let mut letters = Vec::new();
        let mut n = self.column;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect::<String>() + &self.row.to_string()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Pixel size of an embedded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSize {
    pub width: u32,
    pub height: u32,
}

/// Opens documents of one format.
pub trait SpreadsheetBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn SpreadsheetDocument>, DocumentError>;
}

/// An open workbook. Owned by a single substitution pass.
pub trait SpreadsheetDocument {
    fn sheet_count(&self) -> usize;

    /// Non-empty text cells of the sheet's used range, in row-major order.
    fn text_cells(&self, sheet: usize) -> Result<Vec<(CellRef, String)>, DocumentError>;

    fn set_cell_text(&mut self, sheet: usize, cell: CellRef, text: &str)
        -> Result<(), DocumentError>;

    /// Embed a picture with its top-left corner at `anchor`.
    fn add_picture(
        &mut self,
        sheet: usize,
        anchor: CellRef,
        image: &Path,
        size: PictureSize,
    ) -> Result<(), DocumentError>;

    /// Write to `path`; the opened file is left untouched.
    fn save_as(&mut self, path: &Path) -> Result<(), DocumentError>;
}
