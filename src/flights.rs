use crate::dates::parse_date_str;
use crate::extractor::StructuredBrief;
use crate::keys::normalize_key;
use crate::reconciler::{build_placement_map, build_target_map, BriefContext, MergedRow};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Flight-date verdict for one line item: platform dates against the brief's
/// campaign section and the placement resolved through BVT → BVP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightRowResult {
    pub line_item_id: u64,
    pub campaign_id: Option<u64>,
    pub matched_bvp: Option<String>,
    pub brief_campaign_start: Option<NaiveDate>,
    pub brief_campaign_end: Option<NaiveDate>,
    pub brief_line_item_start: Option<NaiveDate>,
    pub brief_line_item_end: Option<NaiveDate>,
    pub campaign_start_match: bool,
    pub campaign_end_match: bool,
    pub line_item_start_match: bool,
    pub line_item_end_match: bool,
    pub all_dates_match: bool,
}

fn dates_match(platform: Option<&str>, brief: Option<NaiveDate>) -> bool {
    match (platform.and_then(parse_date_str), brief) {
        (Some(p), Some(b)) => p == b,
        // A missing side can never be confirmed as matching.
        _ => false,
    }
}

/// Compare campaign and line-item flight dates between the platform snapshot
/// and the brief. One result per distinct line item; creative fan-out rows
/// collapse to the first occurrence.
pub fn evaluate_flights(
    rows: &[MergedRow],
    brief: &StructuredBrief,
    ctx: &BriefContext,
) -> Vec<FlightRowResult> {
    let target_map = brief
        .target
        .as_ref()
        .map(build_target_map)
        .unwrap_or_default();
    let placement_map = brief
        .placement
        .as_ref()
        .map(build_placement_map)
        .unwrap_or_default();

    let mut seen = BTreeSet::new();
    let mut results = Vec::new();

    for row in rows {
        if !seen.insert(row.line_item.id) {
            continue;
        }

        let bvt = normalize_key(&row.line_item.alternative_id);
        let matched_bvp = target_map.get(&bvt).map(|t| t.bvp.clone());
        let placement = matched_bvp
            .as_deref()
            .and_then(|bvp| placement_map.get(&normalize_key(bvp)));
        if matched_bvp.is_none() && !bvt.is_empty() {
            warn!(
                "No BVP mapping in target data for line item alternate id '{}'",
                row.line_item.alternative_id
            );
        }

        let brief_li_start = placement.and_then(|p| parse_date_str(&p.start_date));
        let brief_li_end = placement.and_then(|p| parse_date_str(&p.end_date));

        let campaign_start_match = dates_match(
            row.campaign.as_ref().and_then(|c| c.start_date.as_deref()),
            ctx.campaign_start,
        );
        let campaign_end_match = dates_match(
            row.campaign.as_ref().and_then(|c| c.end_date.as_deref()),
            ctx.campaign_end,
        );
        let line_item_start_match =
            dates_match(row.line_item.start_date.as_deref(), brief_li_start);
        let line_item_end_match = dates_match(row.line_item.end_date.as_deref(), brief_li_end);

        results.push(FlightRowResult {
            line_item_id: row.line_item.id,
            campaign_id: row.campaign.as_ref().map(|c| c.id),
            matched_bvp,
            brief_campaign_start: ctx.campaign_start,
            brief_campaign_end: ctx.campaign_end,
            brief_line_item_start: brief_li_start,
            brief_line_item_end: brief_li_end,
            campaign_start_match,
            campaign_end_match,
            line_item_start_match,
            line_item_end_match,
            all_dates_match: campaign_start_match
                && campaign_end_match
                && line_item_start_match
                && line_item_end_match,
        });
    }

    let matching = results.iter().filter(|r| r.all_dates_match).count();
    debug!("{matching} of {} line items have all flight dates matching", results.len());
    results
}
