//! `.xlsx` documents via umya-spreadsheet

use std::path::Path;

use umya_spreadsheet::structs::drawing::spreadsheet::MarkerType;
use umya_spreadsheet::structs::Image;
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::spreadsheet::{
    CellRef, DocumentError, PictureSize, SpreadsheetBackend, SpreadsheetDocument,
};

/// DrawingML extents are in EMUs; 9525 per pixel at 96 DPI.
const EMU_PER_PIXEL: i64 = 9525;

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxBackend;

impl SpreadsheetBackend for XlsxBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn SpreadsheetDocument>, DocumentError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| DocumentError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Box::new(XlsxDocument { book }))
    }
}

pub struct XlsxDocument {
    book: Spreadsheet,
}

impl XlsxDocument {
    fn sheet(&self, index: usize) -> Result<&Worksheet, DocumentError> {
        self.book
            .get_sheet_collection()
            .get(index)
            .ok_or(DocumentError::NoSuchSheet(index))
    }

    fn sheet_mut(&mut self, index: usize) -> Result<&mut Worksheet, DocumentError> {
        self.book
            .get_sheet_collection_mut()
            .get_mut(index)
            .ok_or(DocumentError::NoSuchSheet(index))
    }
}

impl SpreadsheetDocument for XlsxDocument {
    fn sheet_count(&self) -> usize {
        self.book.get_sheet_collection().len()
    }

    fn text_cells(&self, sheet: usize) -> Result<Vec<(CellRef, String)>, DocumentError> {
        let mut cells: Vec<(CellRef, String)> = self
            .sheet(sheet)?
            .get_cell_collection()
            .into_iter()
            .filter_map(|cell| {
                let value = cell.get_value().to_string();
                if value.is_empty() {
                    return None;
                }
                let coordinate = cell.get_coordinate().get_coordinate();
                CellRef::parse_a1(&coordinate).map(|at| (at, value))
            })
            .collect();
        cells.sort_by_key(|(at, _)| (at.row, at.column));
        Ok(cells)
    }

    fn set_cell_text(
        &mut self,
        sheet: usize,
        cell: CellRef,
        text: &str,
    ) -> Result<(), DocumentError> {
        let a1 = cell.to_a1();
        self.sheet_mut(sheet)?
            .get_cell_mut(a1.as_str())
            .set_value(text);
        Ok(())
    }

    fn add_picture(
        &mut self,
        sheet: usize,
        anchor: CellRef,
        image: &Path,
        size: PictureSize,
    ) -> Result<(), DocumentError> {
        let embed_error = |message: String| DocumentError::Embed {
            image: image.to_path_buf(),
            cell: anchor,
            message,
        };
        let image_path = image
            .to_str()
            .ok_or_else(|| embed_error("picture path is not valid UTF-8".to_string()))?;
        // umya panics on unreadable pictures; read the header first.
        image::image_dimensions(image).map_err(|e| embed_error(e.to_string()))?;

        let mut marker = MarkerType::default();
        marker.set_coordinate(anchor.to_a1());

        let mut picture = Image::default();
        picture.new_image(image_path, marker);
        let one_cell = picture
            .get_one_cell_anchor_mut()
            .ok_or_else(|| embed_error("picture has no one-cell anchor".to_string()))?;
        one_cell
            .get_extent_mut()
            .set_cx(i64::from(size.width) * EMU_PER_PIXEL)
            .set_cy(i64::from(size.height) * EMU_PER_PIXEL);

        self.sheet_mut(sheet)?.add_image(picture);
        tracing::debug!(
            cell = %anchor,
            width = size.width,
            height = size.height,
            "embedded picture"
        );
        Ok(())
    }

    fn save_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        umya_spreadsheet::writer::xlsx::write(&self.book, path).map_err(|e| DocumentError::Save {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
