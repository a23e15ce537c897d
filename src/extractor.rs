use crate::dates::normalize_date;
use crate::error::{BriefQaError, Result};
use crate::grid::{BriefGrid, CellValue};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// How many leading rows are scanned for account/campaign key-value fields.
const HEADER_SCAN_ROWS: usize = 30;

/// Table sections (placement, target) never start before this row.
const TABLE_SCAN_START: usize = 20;

/// A measurement fragment ends within this many rows of its marker.
const MEASUREMENT_WINDOW: usize = 15;

/// Account-level fields harvested from the top of the brief.
const ACCOUNT_FIELDS: &[&str] = &[
    "Today's Date",
    "Account Name",
    "Campaign Name",
    "Business Consultant",
    "Campaign Specialist",
    "Business Account Manager",
    "Ad Ops Specialist",
    "Product Type",
];

/// Campaign-level fields with their accepted spellings. Order matters: a
/// cell is attributed to the first not-yet-found field whose variant
/// matches, so the plain field must precede its "Notes" sibling.
const CAMPAIGN_FIELDS: &[(&str, &[&str])] = &[
    ("IO Campaign Start Date", &["io campaign start date"]),
    (
        "IO Campaign End Date",
        &["io campaign end date", "io campaign  end date"],
    ),
    (
        "Apply Dairy-Milk Restrictions",
        &["apply dairy-milk restrictions", "apply dairy milk restrictions"],
    ),
    ("LDA or Age Compliant", &["lda or age compliant"]),
    ("LDA or Age Compliant Notes", &["lda or age compliant notes"]),
    ("BV Budget", &["bv budget"]),
    ("Measurement Type", &["measurement type"]),
    ("Viewability Contracted", &["viewability contracted"]),
    ("Viewability Goal", &["viewability goal"]),
];

/// Ordered field/value pairs, the shape account and campaign sections take.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValues {
    pairs: Vec<(String, String)>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, value: &str) {
        self.pairs.push((field.to_string(), value.to_string()));
    }

    /// Set a field, replacing an earlier occurrence.
    pub fn upsert(&mut self, field: &str, value: &str) {
        if let Some(pair) = self.pairs.iter_mut().find(|(f, _)| f.as_str() == field) {
            pair.1 = value.to_string();
        } else {
            self.push(field, value);
        }
    }

    /// First value whose field name contains `pattern`, case-insensitive.
    pub fn get(&self, pattern: &str) -> Option<&str> {
        let needle = pattern.to_lowercase();
        self.pairs
            .iter()
            .find(|(f, _)| f.to_lowercase().contains(&needle))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    pub fn extend_from(&mut self, other: &FieldValues) {
        for (f, v) in other.iter() {
            self.push(f, v);
        }
    }
}

/// A table-shaped section: synthesized headers plus stringly data rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSection {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSection {
    /// Locate a column by any of its known names (trimmed, case-insensitive
    /// exact match).
    pub fn find_col(&self, candidates: &[&str]) -> Option<usize> {
        for cand in candidates {
            let needle = cand.trim().to_lowercase();
            if let Some(idx) = self
                .headers
                .iter()
                .position(|h| h.trim().to_lowercase() == needle)
            {
                return Some(idx);
            }
        }
        None
    }

    pub fn value(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

/// A located brief fragment in whichever shape it was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Section {
    Table(TableSection),
    KeyValue(FieldValues),
}

/// The structured view of one brief document. Every section is
/// independently nullable; a missing section degrades, it does not abort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredBrief {
    pub account: Option<FieldValues>,
    pub campaign: Option<FieldValues>,
    pub placement: Option<TableSection>,
    pub target: Option<TableSection>,
    /// Kept distinct only when the measurement fragment was table-shaped and
    /// could not be folded into the campaign key-value section.
    pub measurement: Option<Section>,
}

impl StructuredBrief {
    pub fn section_count(&self) -> usize {
        [
            self.account.is_some(),
            self.campaign.is_some(),
            self.placement.is_some(),
            self.target.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Scan a raw brief grid and produce the four logical sections. A document
/// that yields no section at all is a terminal extraction failure; anything
/// partial is valid output.
pub fn extract_structured_brief(grid: &BriefGrid) -> Result<StructuredBrief> {
    let mut brief = StructuredBrief {
        account: extract_account(grid),
        campaign: extract_campaign(grid),
        placement: extract_placement(grid),
        target: extract_target(grid),
        measurement: None,
    };

    merge_measurement(grid, &mut brief);

    if brief.account.is_none() {
        warn!("No account-level data located in brief");
    }
    if brief.campaign.is_none() {
        warn!("No campaign-level data located in brief");
    }
    if brief.placement.is_none() {
        warn!("No placement table located in brief");
    }
    if brief.target.is_none() {
        warn!("No target table located in brief");
    }

    if brief.section_count() == 0 {
        return Err(BriefQaError::ExtractionFailed(
            "no recognizable section found in brief document".to_string(),
        ));
    }

    Ok(brief)
}

fn extract_account(grid: &BriefGrid) -> Option<FieldValues> {
    let mut account = FieldValues::new();

    for row_idx in 0..HEADER_SCAN_ROWS.min(grid.n_rows()) {
        let row = grid.row(row_idx);
        for (col_idx, cell) in row.iter().enumerate() {
            for field in ACCOUNT_FIELDS {
                if cell.contains_ci(field) {
                    // Value sits in the next column, or the one after when a
                    // merged cell leaves a gap.
                    let value = [col_idx + 1, col_idx + 2]
                        .iter()
                        .map(|&c| grid.cell(row_idx, c))
                        .find(|c| !c.is_blank())
                        .map(|c| c.to_display());
                    if let Some(v) = value {
                        if !v.is_empty() {
                            account.upsert(field, &v);
                        }
                    }
                    break;
                }
            }
        }
    }

    if account.is_empty() {
        None
    } else {
        debug!("Extracted {} account fields", account.len());
        Some(account)
    }
}

fn extract_campaign(grid: &BriefGrid) -> Option<FieldValues> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for row_idx in 0..HEADER_SCAN_ROWS.min(grid.n_rows()) {
        if grid.row_is_blank(row_idx) {
            continue;
        }
        let row = grid.row(row_idx);
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_blank() {
                continue;
            }
            let cell_text = cell.to_display().to_lowercase();
            for (field_idx, (field, variants)) in CAMPAIGN_FIELDS.iter().enumerate() {
                if found.iter().any(|(idx, _)| *idx == field_idx) {
                    continue;
                }
                if variants.iter().any(|v| cell_text.contains(v)) {
                    let next = grid.cell(row_idx, col_idx + 1);
                    let value = if next.is_blank() {
                        String::new()
                    } else if field.to_lowercase().contains("date") {
                        normalize_date(next)
                    } else {
                        next.to_display()
                    };
                    debug!("Found campaign field {field}: {value}");
                    found.push((field_idx, value));
                    break;
                }
            }
        }
    }

    if found.is_empty() {
        return None;
    }

    // Emit in the canonical field order, not discovery order.
    found.sort_by_key(|(idx, _)| *idx);
    let mut campaign = FieldValues::new();
    for (field_idx, value) in found {
        campaign.push(CAMPAIGN_FIELDS[field_idx].0, &value);
    }
    Some(campaign)
}

/// Carry the last non-blank header forward across merged cells, numbering
/// the repeats; headers with nothing to carry get a positional placeholder.
fn synthesize_headers(cells: &[CellValue]) -> Vec<String> {
    let mut headers = Vec::with_capacity(cells.len());
    let mut last: Option<String> = None;
    let mut repeat = 0usize;

    for (i, cell) in cells.iter().enumerate() {
        if !cell.is_blank() {
            let text = cell.to_display();
            last = Some(text.clone());
            repeat = 0;
            headers.push(text);
        } else if let Some(prev) = &last {
            repeat += 1;
            headers.push(format!("{prev}_{repeat}"));
        } else {
            headers.push(format!("Column_{i}"));
        }
    }
    headers
}

/// Build a table from `[header_row, header_row+1, end)`, normalizing any
/// date-bearing column and skipping fully blank rows.
fn build_table(grid: &BriefGrid, header_row: usize, end: usize) -> TableSection {
    let headers = synthesize_headers(grid.row(header_row));
    let date_cols: Vec<bool> = headers
        .iter()
        .map(|h| h.to_lowercase().contains("date"))
        .collect();

    let mut rows = Vec::new();
    for row_idx in (header_row + 1)..end.min(grid.n_rows()) {
        if grid.row_is_blank(row_idx) {
            continue;
        }
        let row: Vec<String> = (0..headers.len())
            .map(|col| {
                let cell = grid.cell(row_idx, col);
                if date_cols.get(col).copied().unwrap_or(false) && !cell.is_blank() {
                    normalize_date(cell)
                } else {
                    cell.to_display()
                }
            })
            .collect();
        rows.push(row);
    }

    TableSection { headers, rows }
}

fn extract_placement(grid: &BriefGrid) -> Option<TableSection> {
    let header_idx =
        grid.find_row_containing(&["placement name", "bvp"], TABLE_SCAN_START, None)?;

    // The placement block ends at a blank row or where the target header
    // ("BV ID" in the second column) begins.
    let end = ((header_idx + 1)..grid.n_rows()).find(|&idx| {
        grid.row_is_blank(idx) || grid.cell(idx, 1).contains_ci("bv id")
    })?;

    let table = build_table(grid, header_idx, end);
    if table.rows.is_empty() {
        warn!("Placement header found at row {header_idx} but no data rows followed");
        return None;
    }
    debug!("Extracted {} placement rows", table.rows.len());
    Some(table)
}

fn extract_target(grid: &BriefGrid) -> Option<TableSection> {
    let header_idx = (TABLE_SCAN_START..grid.n_rows()).find(|&idx| {
        grid.cell(idx, 1).contains_ci("bv id")
            && grid.cell(idx, 2).contains_ci("bvp")
            && grid.cell(idx, 3).contains_ci("bvt")
    })?;

    let end = ((header_idx + 1)..grid.n_rows())
        .find(|&idx| grid.row_is_blank(idx))
        .unwrap_or(grid.n_rows());

    let table = build_table(grid, header_idx, end);
    if table.rows.is_empty() {
        warn!("Target header found at row {header_idx} but no data rows followed");
        return None;
    }
    debug!("Extracted {} target rows", table.rows.len());
    Some(table)
}

/// Locate a measurement/viewability fragment and fold it into the campaign
/// section when both are key-value shaped; a table-shaped fragment stays a
/// distinct section.
fn merge_measurement(grid: &BriefGrid, brief: &mut StructuredBrief) {
    let header_idx = grid
        .find_row_containing(&["measurement", "viewability"], 0, None)
        .or_else(|| grid.find_row_containing(&["moat", "ias"], 0, None));

    let Some(header_idx) = header_idx else {
        return;
    };

    let window_end = (header_idx + 1 + MEASUREMENT_WINDOW).min(grid.n_rows());
    let end = ((header_idx + 1)..window_end)
        .find(|&idx| {
            grid.row_is_blank(idx)
                || grid.row(idx).iter().any(|cell| {
                    ["placement", "target", "bv id", "product"]
                        .iter()
                        .any(|m| cell.contains_ci(m))
                })
        })
        .unwrap_or(window_end);

    // Table shape first; key-value pairs as the fallback. A row with fewer
    // than three populated cells is a field/value pair, not a header row.
    let marker_cells = grid
        .row(header_idx)
        .iter()
        .filter(|c| !c.is_blank())
        .count();
    let table = build_table(grid, header_idx, end);
    let section = if marker_cells >= 3 && !table.rows.is_empty() {
        Section::Table(table)
    } else {
        match extract_key_value(grid, header_idx, end) {
            Some(pairs) => Section::KeyValue(pairs),
            None => return,
        }
    };

    match section {
        Section::KeyValue(pairs) => {
            debug!("Merging {} measurement fields into campaign section", pairs.len());
            match brief.campaign.take() {
                Some(mut campaign) => {
                    campaign.extend_from(&pairs);
                    brief.campaign = Some(campaign);
                }
                None => brief.campaign = Some(pairs),
            }
        }
        Section::Table(table) => {
            debug!("Keeping table-shaped measurement section distinct");
            brief.measurement = Some(Section::Table(table));
        }
    }
}

/// Each row contributes the first non-blank cell as a field name and the
/// next non-blank cell as its value.
fn extract_key_value(grid: &BriefGrid, start: usize, end: usize) -> Option<FieldValues> {
    let mut pairs = FieldValues::new();

    for row_idx in start..end.min(grid.n_rows()) {
        let row = grid.row(row_idx);
        let mut field: Option<String> = None;
        let mut value: Option<String> = None;
        for cell in row {
            if cell.is_blank() {
                continue;
            }
            if field.is_none() {
                field = Some(cell.to_display());
            } else {
                value = Some(cell.to_display());
                break;
            }
        }
        if let Some(f) = field {
            pairs.push(&f, value.as_deref().unwrap_or(""));
        }
    }

    if pairs.is_empty() {
        None
    } else {
        Some(pairs)
    }
}
