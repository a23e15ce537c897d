use crate::creative::{CreativeRowResult, CREATIVE_CHECK_COLUMNS};
use crate::flights::FlightRowResult;
use crate::naming::{NamingRowResult, NAMING_CHECK_COLUMNS};
use crate::reconciler::{MergedRow, NA};
use crate::targeting::{TargetingRowResult, GENERAL_CHECK_COLUMNS, TARGETING_CHECK_COLUMNS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One check cell: a plain boolean, or a set of tags identifying which
/// entity levels failed. An empty tag set is a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CheckOutcome {
    Bool(bool),
    Tags(BTreeSet<&'static str>),
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Bool(true) => write!(f, "TRUE"),
            CheckOutcome::Bool(false) => write!(f, "FALSE"),
            CheckOutcome::Tags(tags) if tags.is_empty() => write!(f, "FALSE"),
            CheckOutcome::Tags(tags) => {
                let joined = tags.iter().copied().collect::<Vec<_>>().join(", ");
                write!(f, "TRUE - {joined}")
            }
        }
    }
}

/// One row of an annotated table, keyed by the same identity as the merged
/// input so the renderer can line families up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub line_item_id: u64,
    pub creative_id: Option<u64>,
    pub cells: Vec<String>,
}

/// An annotated table for one validation family. Rendering, coloring and
/// workbook assembly live outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// Naming family: brief context plus one tag-set column per check and the
/// aggregate flag. Check cells are issue flags: TRUE means a failure.
pub fn naming_report(rows: &[MergedRow], results: &[NamingRowResult]) -> ReportTable {
    let mut columns = vec![
        "campaign_id".to_string(),
        "campaign_name".to_string(),
        "line_item_id".to_string(),
        "line_item_name".to_string(),
        "line_item_alternative_id".to_string(),
        "creative_id".to_string(),
        "creative_name".to_string(),
        "brief_bvt_id".to_string(),
        "brief_bvp_id".to_string(),
        "brief_geo_required".to_string(),
        "brief_platform_media".to_string(),
    ];
    columns.extend(NAMING_CHECK_COLUMNS.iter().map(|c| c.to_string()));
    columns.push("hub_creative_sharing".to_string());
    columns.push("has_issues".to_string());

    let table_rows = rows
        .iter()
        .zip(results.iter())
        .map(|(row, result)| {
            let mut cells = vec![
                row.campaign.as_ref().map(|c| c.id.to_string()).unwrap_or_else(|| NA.to_string()),
                row.campaign_name().to_string(),
                row.line_item.id.to_string(),
                row.line_item.name.clone(),
                row.line_item.alternative_id.to_uppercase(),
                row.creative
                    .as_ref()
                    .map(|c| c.id.to_string())
                    .unwrap_or_default(),
                row.creative.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
                row.brief_bvt_id.to_uppercase(),
                row.brief_bvp_id.to_uppercase(),
                row.brief_geo_required.clone(),
                row.brief_platform_media.clone(),
            ];
            for check in NAMING_CHECK_COLUMNS {
                let tags = result.checks.get(check).cloned().unwrap_or_default();
                cells.push(CheckOutcome::Tags(tags).to_string());
            }
            cells.push(CheckOutcome::Bool(result.hub_creative_sharing).to_string());
            cells.push(CheckOutcome::Bool(result.has_issues).to_string());
            ReportRow {
                line_item_id: row.line_item.id,
                creative_id: row.creative.as_ref().map(|c| c.id),
                cells,
            }
        })
        .collect();

    ReportTable {
        title: "Naming Check Results".to_string(),
        columns,
        rows: table_rows,
    }
}

/// Targeting family, one row per line item. Check cells are pass flags:
/// TRUE means the configuration is correct (the original convention for
/// this family, kept as-is).
pub fn targeting_report(rows: &[MergedRow], results: &[TargetingRowResult]) -> ReportTable {
    let mut columns = vec![
        "line_item_id".to_string(),
        "line_item_name".to_string(),
        "advertiser_id".to_string(),
        "campaign_id".to_string(),
        "alt_id".to_string(),
        "brief_bvp_id".to_string(),
        "brief_platform_media".to_string(),
        "brief_impressions".to_string(),
        "brief_geo_required".to_string(),
        "brief_traffic_info".to_string(),
        "budget_split_pct".to_string(),
        "target_required".to_string(),
        "line_buffer_pct".to_string(),
        "campaign_imps_required".to_string(),
        "campaign_buffer_pct".to_string(),
        "bidding_values_check".to_string(),
        "budget_split_check".to_string(),
    ];
    columns.extend(GENERAL_CHECK_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(TARGETING_CHECK_COLUMNS.iter().map(|c| c.to_string()));
    columns.push("has_issues".to_string());

    let table_rows = results
        .iter()
        .map(|result| {
            let row = rows
                .iter()
                .find(|r| r.line_item.id == result.line_item_id);
            let mut cells = match row {
                Some(row) => vec![
                    row.line_item.id.to_string(),
                    row.line_item.name.clone(),
                    row.advertiser_id.map(|id| id.to_string()).unwrap_or_else(|| NA.to_string()),
                    row.campaign.as_ref().map(|c| c.id.to_string()).unwrap_or_else(|| NA.to_string()),
                    row.line_item.alternative_id.to_uppercase(),
                    row.brief_bvp_id.to_uppercase(),
                    row.brief_platform_media.clone(),
                    row.brief_impressions.clone(),
                    row.brief_geo_required.clone(),
                    row.brief_traffic_info.clone(),
                ],
                None => vec![result.line_item_id.to_string(); 10],
            };
            cells.push(result.budget.split_display.clone());
            cells.push(
                result
                    .budget
                    .target_required
                    .map(|t| format!("{}", t.round() as i64))
                    .unwrap_or_else(|| NA.to_string()),
            );
            cells.push(result.budget.line_buffer_display.clone());
            cells.push(
                result
                    .campaign_budget
                    .imps_required
                    .map(|t| format!("{}", t.round() as i64))
                    .unwrap_or_else(|| NA.to_string()),
            );
            cells.push(result.campaign_budget.buffer_display.clone());
            cells.push(CheckOutcome::Bool(result.cpm.passed).to_string());
            cells.push(CheckOutcome::Bool(result.budget.split_group_check).to_string());
            for (_, passed) in &result.general {
                cells.push(CheckOutcome::Bool(*passed).to_string());
            }
            for (_, verdict) in &result.checks {
                cells.push(CheckOutcome::Bool(verdict.passed).to_string());
            }
            cells.push(CheckOutcome::Bool(result.has_issues).to_string());
            ReportRow {
                line_item_id: result.line_item_id,
                creative_id: None,
                cells,
            }
        })
        .collect();

    ReportTable {
        title: "Targeting Check Results".to_string(),
        columns,
        rows: table_rows,
    }
}

/// Flight family: date agreement per line item. TRUE means dates agree.
pub fn flight_report(results: &[FlightRowResult]) -> ReportTable {
    let columns = vec![
        "line_item_id".to_string(),
        "campaign_id".to_string(),
        "matched_bvp".to_string(),
        "c_start_date_match".to_string(),
        "c_end_date_match".to_string(),
        "li_start_date_match".to_string(),
        "li_end_date_match".to_string(),
        "all_dates_match".to_string(),
    ];

    let rows = results
        .iter()
        .map(|r| ReportRow {
            line_item_id: r.line_item_id,
            creative_id: None,
            cells: vec![
                r.line_item_id.to_string(),
                r.campaign_id.map(|id| id.to_string()).unwrap_or_else(|| NA.to_string()),
                r.matched_bvp.clone().unwrap_or_else(|| NA.to_string()),
                CheckOutcome::Bool(r.campaign_start_match).to_string(),
                CheckOutcome::Bool(r.campaign_end_match).to_string(),
                CheckOutcome::Bool(r.line_item_start_match).to_string(),
                CheckOutcome::Bool(r.line_item_end_match).to_string(),
                CheckOutcome::Bool(r.all_dates_match).to_string(),
            ],
        })
        .collect();

    ReportTable {
        title: "Flight Check Results".to_string(),
        columns,
        rows,
    }
}

/// Creative family: one row per (line item, creative). TRUE means pass.
pub fn creative_report(results: &[CreativeRowResult]) -> ReportTable {
    let mut columns = vec!["line_item_id".to_string(), "creative_id".to_string()];
    columns.extend(CREATIVE_CHECK_COLUMNS.iter().map(|c| c.to_string()));
    columns.push("has_issues".to_string());

    let rows = results
        .iter()
        .map(|r| {
            let mut cells = vec![r.line_item_id.to_string(), r.creative_id.to_string()];
            for (_, verdict) in &r.checks {
                cells.push(CheckOutcome::Bool(verdict.passed).to_string());
            }
            cells.push(CheckOutcome::Bool(r.has_issues).to_string());
            ReportRow {
                line_item_id: r.line_item_id,
                creative_id: Some(r.creative_id),
                cells,
            }
        })
        .collect();

    ReportTable {
        title: "Creative Check Results".to_string(),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_outcome_rendering() {
        assert_eq!(CheckOutcome::Bool(true).to_string(), "TRUE");
        assert_eq!(CheckOutcome::Bool(false).to_string(), "FALSE");
        assert_eq!(CheckOutcome::Tags(BTreeSet::new()).to_string(), "FALSE");

        let tags: BTreeSet<&'static str> = BTreeSet::from(["Li", "C", "Cr"]);
        // BTreeSet iterates in lexicographic order.
        assert_eq!(CheckOutcome::Tags(tags).to_string(), "TRUE - C, Cr, Li");
    }
}
