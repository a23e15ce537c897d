use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single scalar cell as produced by the spreadsheet reader.
///
/// Briefs carry no schema, so a cell can hold anything: free text, numbers
/// (which may secretly be serial dates), native date values or booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl CellValue {
    /// Empty, or text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the cell as the string downstream comparisons operate on.
    /// Integral numbers drop their fractional part so `174.0` reads `174`.
    pub fn to_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Date(d) => d.format("%m/%d/%Y").to_string(),
            CellValue::DateTime(dt) => dt.format("%m/%d/%Y").to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }

    /// Case-insensitive substring test against the textual content.
    pub fn contains_ci(&self, needle: &str) -> bool {
        match self.as_text() {
            Some(s) => s.to_lowercase().contains(&needle.to_lowercase()),
            None => false,
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// An ordered, rectangular-ish grid of cells read from one brief document.
/// Rows may have uneven widths; out-of-range access yields an empty cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BriefGrid {
    rows: Vec<Vec<CellValue>>,
}

impl BriefGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Build a grid from raw strings, sniffing numbers. Blank strings become
    /// empty cells. Date strings stay text; normalization happens later.
    pub fn from_strings(rows: Vec<Vec<String>>) -> Self {
        let parsed = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| {
                        let trimmed = s.trim();
                        // "nan"/"inf" parse as floats; keep anything with
                        // letters as text.
                        let numeric_shaped = !trimmed.is_empty()
                            && !trimmed.chars().any(|c| c.is_alphabetic());
                        if trimmed.is_empty() {
                            CellValue::Empty
                        } else if numeric_shaped && trimmed.parse::<f64>().is_ok() {
                            CellValue::Number(trimmed.parse::<f64>().unwrap_or(0.0))
                        } else {
                            CellValue::Text(trimmed.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows: parsed }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, idx: usize) -> &[CellValue] {
        self.rows.get(idx).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_is_blank(&self, idx: usize) -> bool {
        self.row(idx).iter().all(|c| c.is_blank())
    }

    /// First row index at or after `start` (and before `end`, when given)
    /// where any cell's text contains one of the markers, case-insensitive.
    pub fn find_row_containing(
        &self,
        markers: &[&str],
        start: usize,
        end: Option<usize>,
    ) -> Option<usize> {
        let stop = end.unwrap_or(self.rows.len()).min(self.rows.len());
        (start..stop).find(|&idx| {
            self.row(idx)
                .iter()
                .any(|cell| markers.iter().any(|m| cell.contains_ci(m)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_blank_detection() {
        assert!(CellValue::Empty.is_blank());
        assert!(text("   ").is_blank());
        assert!(!text("x").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_display_drops_trailing_zero() {
        assert_eq!(CellValue::Number(174.0).to_display(), "174");
        assert_eq!(CellValue::Number(2.4).to_display(), "2.4");
        assert_eq!(text("  padded  ").to_display(), "padded");
    }

    #[test]
    fn test_out_of_range_access_is_empty() {
        let grid = BriefGrid::new(vec![vec![text("a")]]);
        assert_eq!(*grid.cell(0, 5), CellValue::Empty);
        assert_eq!(*grid.cell(9, 0), CellValue::Empty);
        assert!(grid.row_is_blank(9));
    }

    #[test]
    fn test_find_row_containing() {
        let grid = BriefGrid::new(vec![
            vec![text("intro")],
            vec![CellValue::Empty, text("BV Placement Name")],
            vec![text("data")],
        ]);
        assert_eq!(
            grid.find_row_containing(&["placement name", "bvp"], 0, None),
            Some(1)
        );
        assert_eq!(grid.find_row_containing(&["missing"], 0, None), None);
        assert_eq!(grid.find_row_containing(&["placement name"], 2, None), None);
    }

    #[test]
    fn test_from_strings_sniffs_numbers() {
        let grid = BriefGrid::from_strings(vec![vec![
            "BVT123456789".to_string(),
            "1200000".to_string(),
            "".to_string(),
        ]]);
        assert_eq!(*grid.cell(0, 0), text("BVT123456789"));
        assert_eq!(*grid.cell(0, 1), CellValue::Number(1200000.0));
        assert!(grid.cell(0, 2).is_blank());
    }
}
