use crate::dates::parse_date_str;
use crate::error::{BriefQaError, Result};
use crate::extractor::{StructuredBrief, TableSection};
use crate::keys::{is_line_item_alt_id, looks_like_bvt, normalize_key};
use crate::naming::{extract_viewability_percentage, split_product_types};
use crate::schema::{PlatformCampaign, PlatformCreative, PlatformLineItem, PlatformSnapshot};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel for brief-context columns whose join leg failed. Downstream
/// rules match against this string, never against a host-language null.
pub const NA: &str = "N/A";

/// Campaign-level facts derived once per run from the Account and Campaign
/// sections. Everything the rule engines need that is not row-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefContext {
    pub product_type: String,
    pub product_short_forms: Vec<String>,
    pub measurement_type: String,
    pub is_hub: bool,
    pub is_ifo: bool,
    pub viewability_goal: String,
    pub viewability_contracted: String,
    pub viewability_perc: Option<u32>,
    pub lda_compliant: String,
    pub is_lda_required: bool,
    pub dairy_milk_restrictions: String,
    pub campaign_start: Option<NaiveDate>,
    pub campaign_end: Option<NaiveDate>,
    pub campaign_year: Option<i32>,
}

impl Default for BriefContext {
    fn default() -> Self {
        Self {
            product_type: NA.to_string(),
            product_short_forms: Vec::new(),
            measurement_type: NA.to_string(),
            is_hub: false,
            is_ifo: false,
            viewability_goal: NA.to_string(),
            viewability_contracted: NA.to_string(),
            viewability_perc: None,
            lda_compliant: NA.to_string(),
            is_lda_required: false,
            dairy_milk_restrictions: NA.to_string(),
            campaign_start: None,
            campaign_end: None,
            campaign_year: None,
        }
    }
}

impl BriefContext {
    pub fn from_brief(brief: &StructuredBrief) -> Self {
        let mut ctx = Self::default();

        if let Some(account) = &brief.account {
            if let Some(pt) = account.get("Product Type") {
                if !pt.trim().is_empty() {
                    ctx.product_type = pt.trim().to_string();
                    ctx.product_short_forms = split_product_types(pt);
                    debug!(
                        "Product type '{}' -> short forms {:?}",
                        ctx.product_type, ctx.product_short_forms
                    );
                }
            }
        }

        if let Some(campaign) = &brief.campaign {
            if let Some(start) = campaign.get("IO Campaign Start Date") {
                ctx.campaign_start = parse_date_str(start);
                ctx.campaign_year = ctx.campaign_start.map(|d| d.year());
            }
            if let Some(end) = campaign.get("IO Campaign End Date") {
                ctx.campaign_end = parse_date_str(end);
            }
            if let Some(mt) = campaign.get("Measurement Type") {
                if !mt.trim().is_empty() {
                    ctx.measurement_type = mt.trim().to_string();
                    let upper = ctx.measurement_type.to_uppercase();
                    ctx.is_hub = upper.contains("HUB:");
                    ctx.is_ifo =
                        upper.contains("IFO:") || upper.contains("IN-FLIGHT OPTIMIZATION");
                }
            }
            if let Some(goal) = campaign.get("Viewability Goal") {
                if !goal.trim().is_empty() {
                    ctx.viewability_goal = goal.trim().to_string();
                    ctx.viewability_perc = extract_viewability_percentage(goal);
                }
            }
            if let Some(contracted) = campaign.get("Viewability Contracted") {
                if !contracted.trim().is_empty() {
                    ctx.viewability_contracted = contracted.trim().to_string();
                }
            }
            if let Some(lda) = campaign.get("LDA or Age Compliant") {
                if !lda.trim().is_empty() {
                    ctx.lda_compliant = lda.trim().to_string();
                    ctx.is_lda_required = lda.trim().eq_ignore_ascii_case("yes");
                }
            }
            if let Some(dairy) = campaign.get("Apply Dairy-Milk Restrictions") {
                if !dairy.trim().is_empty() {
                    ctx.dairy_milk_restrictions = dairy.trim().to_string();
                }
            }
        }

        ctx
    }
}

/// One targeting line from the brief, keyed by its BVT code.
#[derive(Debug, Clone, Default)]
pub struct TargetRow {
    pub bvp: String,
    pub platform_media: String,
    pub impressions: String,
}

/// One placement line from the brief, keyed by its BVP code.
#[derive(Debug, Clone, Default)]
pub struct PlacementRow {
    pub geo_required: String,
    pub traffic_info: String,
    pub start_date: String,
    pub end_date: String,
}

/// One row of the merged table: a (line item, creative) pair with its
/// campaign, advertiser and resolved brief context. The unit every rule
/// engine operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRow {
    pub advertiser_id: Option<u64>,
    pub advertiser_name: Option<String>,
    pub campaign: Option<PlatformCampaign>,
    pub line_item: PlatformLineItem,
    pub creative: Option<PlatformCreative>,

    pub brief_bvt_id: String,
    pub brief_bvp_id: String,
    pub brief_platform_media: String,
    pub brief_impressions: String,
    pub brief_geo_required: String,
    pub brief_traffic_info: String,
}

impl MergedRow {
    pub fn campaign_name(&self) -> &str {
        self.campaign.as_ref().map(|c| c.name.as_str()).unwrap_or("")
    }
}

/// Build the BVT → target-row map from the Target section. The first
/// occurrence of a BVT wins; duplicates are reported and ignored.
pub fn build_target_map(target: &TableSection) -> BTreeMap<String, TargetRow> {
    let mut map = BTreeMap::new();

    let bvt_col = target.find_col(&["bvt", "bvt id", "bv id"]);
    let Some(bvt_col) = bvt_col else {
        warn!("Target section has no BVT column; target joins disabled");
        return map;
    };
    let bvp_col = target.find_col(&["bvp", "bvp id"]);
    let imps_col = target.find_col(&["impressions", "impression", "imp"]);
    let platform_col = target
        .find_col(&[
            "platform/media type",
            "platform / media type",
            "platform",
            "media type",
            "platform media type",
        ])
        .or_else(|| {
            // Positional fallback: briefs without a usable header keep
            // platform/media in the seventh column.
            if target.headers.len() > 6 {
                Some(6)
            } else {
                None
            }
        });

    for row_idx in 0..target.n_rows() {
        let bvt_raw = target.value(row_idx, bvt_col);
        let key = normalize_key(bvt_raw);
        if key.is_empty() {
            continue;
        }
        if !looks_like_bvt(bvt_raw) {
            warn!("Target row {row_idx} key '{bvt_raw}' does not look like a BVT code");
        }
        if map.contains_key(&key) {
            warn!("Duplicate BVT '{bvt_raw}' in target section; keeping first occurrence");
            continue;
        }
        map.insert(
            key,
            TargetRow {
                bvp: bvp_col.map(|c| target.value(row_idx, c).to_string()).unwrap_or_default(),
                platform_media: platform_col
                    .map(|c| target.value(row_idx, c).to_string())
                    .unwrap_or_default(),
                impressions: imps_col
                    .map(|c| target.value(row_idx, c).to_string())
                    .unwrap_or_default(),
            },
        );
    }

    debug!("Built {} BVT mappings from target section", map.len());
    map
}

/// Build the BVP → placement-row map from the Placement section.
pub fn build_placement_map(placement: &TableSection) -> BTreeMap<String, PlacementRow> {
    let mut map = BTreeMap::new();

    let bvp_col = placement.find_col(&[
        "bvp",
        "bvp id",
        "bv placement id",
        "placement id",
        "bvp placement id",
    ]);
    let Some(bvp_col) = bvp_col else {
        warn!("Placement section has no BVP column; placement joins disabled");
        return map;
    };
    let geo_col = placement
        .find_col(&[
            "geo required",
            "geo targeting",
            "geo",
            "geo required? yes/no",
            "geo required?yes/no",
            "geo required yes no",
            "geo required?\nyes/no",
        ])
        .or_else(|| {
            if placement.headers.len() > 3 {
                Some(3)
            } else {
                None
            }
        });
    let traffic_col = placement.find_col(&["traffic information", "traffic info", "traffic"]);
    let start_col = placement.find_col(&["projected start date", "start date"]);
    let end_col = placement.find_col(&["end date"]);

    for row_idx in 0..placement.n_rows() {
        let bvp_raw = placement.value(row_idx, bvp_col);
        let key = normalize_key(bvp_raw);
        if key.is_empty() {
            continue;
        }
        if map.contains_key(&key) {
            warn!("Duplicate BVP '{bvp_raw}' in placement section; keeping first occurrence");
            continue;
        }
        map.insert(
            key,
            PlacementRow {
                geo_required: geo_col
                    .map(|c| placement.value(row_idx, c).to_string())
                    .unwrap_or_default(),
                traffic_info: traffic_col
                    .map(|c| placement.value(row_idx, c).to_string())
                    .unwrap_or_default(),
                start_date: start_col
                    .map(|c| placement.value(row_idx, c).to_string())
                    .unwrap_or_default(),
                end_date: end_col
                    .map(|c| placement.value(row_idx, c).to_string())
                    .unwrap_or_default(),
            },
        );
    }

    debug!("Built {} BVP mappings from placement section", map.len());
    map
}

fn sentinel(value: &str) -> String {
    if value.trim().is_empty() {
        NA.to_string()
    } else {
        value.trim().to_string()
    }
}

/// Join the platform snapshot against the brief: one row per (line item,
/// creative) pair, or per line item with empty creative fields when it has
/// none. Pure transform; join misses degrade to "N/A", never error.
pub fn build_merged_rows(
    snapshot: &PlatformSnapshot,
    brief: &StructuredBrief,
) -> Result<Vec<MergedRow>> {
    if snapshot.line_items.is_empty() {
        return Err(BriefQaError::EmptySnapshot);
    }

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

    let mut rows = Vec::new();

    for line_item in &snapshot.line_items {
        if !is_line_item_alt_id(&line_item.alternative_id) {
            warn!(
                "Line item {} alternate id '{}' does not match the BVT format",
                line_item.id, line_item.alternative_id
            );
        }
        let campaign = snapshot.campaign(line_item.campaign_id).cloned();
        if campaign.is_none() {
            warn!(
                "Line item {} references unknown campaign {}",
                line_item.id, line_item.campaign_id
            );
        }
        let advertiser = campaign
            .as_ref()
            .and_then(|c| snapshot.advertiser(c.advertiser_id));

        let bvt = line_item.alternative_id.trim().to_string();
        let target = target_map.get(&normalize_key(&bvt));
        if target.is_none() && !bvt.is_empty() {
            warn!("No target row in brief for line item alternate id '{bvt}'");
        }

        let placement = target.and_then(|t| {
            let hit = placement_map.get(&normalize_key(&t.bvp));
            if hit.is_none() && !t.bvp.trim().is_empty() {
                warn!("No placement row in brief for BVP '{}'", t.bvp);
            }
            hit
        });

        let base = MergedRow {
            advertiser_id: advertiser.map(|a| a.id),
            advertiser_name: advertiser.map(|a| a.name.clone()),
            campaign,
            line_item: line_item.clone(),
            creative: None,
            brief_bvt_id: sentinel(&bvt),
            brief_bvp_id: target.map(|t| sentinel(&t.bvp)).unwrap_or_else(|| NA.to_string()),
            brief_platform_media: target
                .map(|t| sentinel(&t.platform_media))
                .unwrap_or_else(|| NA.to_string()),
            brief_impressions: target
                .map(|t| sentinel(&t.impressions))
                .unwrap_or_else(|| NA.to_string()),
            brief_geo_required: placement
                .map(|p| sentinel(&p.geo_required))
                .unwrap_or_else(|| NA.to_string()),
            brief_traffic_info: placement
                .map(|p| sentinel(&p.traffic_info))
                .unwrap_or_else(|| NA.to_string()),
        };

        let creatives = snapshot.creatives_for_line_item(line_item.id);
        if creatives.is_empty() {
            rows.push(base);
        } else {
            for creative in creatives {
                let mut row = base.clone();
                row.creative = Some(creative.clone());
                rows.push(row);
            }
        }
    }

    debug!("Merged {} rows from {} line items", rows.len(), snapshot.line_items.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::TableSection;
    use crate::schema::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> TableSection {
        TableSection {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn snapshot_one_line_item() -> PlatformSnapshot {
        PlatformSnapshot {
            advertisers: vec![PlatformAdvertiser {
                id: 7,
                name: "Acme".to_string(),
            }],
            campaigns: vec![PlatformCampaign {
                id: 10,
                advertiser_id: 7,
                alternative_id: "BVI0123456789".to_string(),
                name: "SBV_Q1_2024".to_string(),
                active: true,
                start_date: None,
                end_date: None,
                budget_type: None,
                impressions_budget: None,
            }],
            line_items: vec![PlatformLineItem {
                id: 100,
                campaign_id: 10,
                alternative_id: "BVT123456789".to_string(),
                name: "MOA_SBV_Q1_24_Geo_BA".to_string(),
                active: false,
                start_date: None,
                end_date: None,
                budget: Some(600_000.0),
                delivery: DeliverySettings::default(),
                targeting: TargetingProfile::default(),
            }],
            creatives: Vec::new(),
            line_item_creatives: BTreeMap::new(),
        }
    }

    fn brief_with_tables() -> StructuredBrief {
        StructuredBrief {
            account: None,
            campaign: None,
            placement: Some(table(
                &["BV Placement Name", "BVP", "Projected Start Date", "Geo Required", "End Date", "Traffic Information"],
                &[&["Spring", "BVP111222333", "03/01/2024", "Yes", "06/30/2024", "No"]],
            )),
            target: Some(table(
                &["#", "BV ID", "BVP", "BVT", "Impressions", "CPM", "Platform/Media Type"],
                &[&["1", "BV0001", "BVP111222333", "BVT123456789", "1200000", "2.4", "Mobile/Banner"]],
            )),
            measurement: None,
        }
    }

    #[test]
    fn test_two_hop_join_resolves_context() {
        let rows = build_merged_rows(&snapshot_one_line_item(), &brief_with_tables()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.brief_bvt_id, "BVT123456789");
        assert_eq!(row.brief_bvp_id, "BVP111222333");
        assert_eq!(row.brief_platform_media, "Mobile/Banner");
        assert_eq!(row.brief_impressions, "1200000");
        assert_eq!(row.brief_geo_required, "Yes");
        assert_eq!(row.brief_traffic_info, "No");
        assert_eq!(row.advertiser_id, Some(7));
        assert!(row.creative.is_none());
    }

    #[test]
    fn test_join_is_case_insensitive() {
        let mut snapshot = snapshot_one_line_item();
        snapshot.line_items[0].alternative_id = " bvt123456789 ".to_string();
        let rows = build_merged_rows(&snapshot, &brief_with_tables()).unwrap();
        assert_eq!(rows[0].brief_bvp_id, "BVP111222333");
    }

    #[test]
    fn test_unresolved_join_degrades_to_sentinel() {
        let mut snapshot = snapshot_one_line_item();
        snapshot.line_items[0].alternative_id = "BVT999999999".to_string();
        let rows = build_merged_rows(&snapshot, &brief_with_tables()).unwrap();
        let row = &rows[0];
        assert_eq!(row.brief_bvp_id, NA);
        assert_eq!(row.brief_geo_required, NA);
        assert_eq!(row.brief_platform_media, NA);
    }

    #[test]
    fn test_duplicate_bvt_keeps_first() {
        let target = table(
            &["BVT", "BVP"],
            &[&["BVT123456789", "BVP111111111"], &["BVT123456789", "BVP222222222"]],
        );
        let map = build_target_map(&target);
        assert_eq!(map.len(), 1);
        assert_eq!(map["bvt123456789"].bvp, "BVP111111111");
    }

    #[test]
    fn test_one_row_per_creative() {
        let mut snapshot = snapshot_one_line_item();
        snapshot.creatives = vec![
            PlatformCreative {
                id: 1000,
                alternative_id: "BVP111222333".to_string(),
                name: "MOA_SBV_Q1_24_Geo_BA_300x250".to_string(),
                active: true,
                secure: Some(1),
                template_id: None,
                creative_type: Some("banner".to_string()),
                width: Some(300),
                height: Some(250),
                click_url: None,
                pixels: None,
                scripts: None,
                click_trackers: None,
                content_munge: None,
                thumbnail_url: None,
                attributes: CreativeAttributes::default(),
            },
            PlatformCreative {
                id: 1001,
                alternative_id: "BVP111222333".to_string(),
                name: "MOA_SBV_Q1_24_Geo_BA_320x50".to_string(),
                active: true,
                secure: Some(1),
                template_id: None,
                creative_type: Some("banner".to_string()),
                width: Some(320),
                height: Some(50),
                click_url: None,
                pixels: None,
                scripts: None,
                click_trackers: None,
                content_munge: None,
                thumbnail_url: None,
                attributes: CreativeAttributes::default(),
            },
        ];
        snapshot.line_item_creatives.insert(100, vec![1000, 1001]);

        let rows = build_merged_rows(&snapshot, &brief_with_tables()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].creative.as_ref().unwrap().id, 1000);
        assert_eq!(rows[1].creative.as_ref().unwrap().id, 1001);
    }

    #[test]
    fn test_empty_snapshot_is_error() {
        let snapshot = PlatformSnapshot::default();
        assert!(matches!(
            build_merged_rows(&snapshot, &brief_with_tables()),
            Err(BriefQaError::EmptySnapshot)
        ));
    }

    #[test]
    fn test_context_derivation_from_brief() {
        let mut campaign = crate::extractor::FieldValues::new();
        campaign.push("IO Campaign Start Date", "03/01/2024");
        campaign.push("Measurement Type", "HUB: Retail Rollup");
        campaign.push("Viewability Goal", "80%");
        campaign.push("LDA or Age Compliant", "Yes");
        let mut account = crate::extractor::FieldValues::new();
        account.push("Product Type", "BV - Standard");

        let brief = StructuredBrief {
            account: Some(account),
            campaign: Some(campaign),
            placement: None,
            target: None,
            measurement: None,
        };
        let ctx = BriefContext::from_brief(&brief);
        assert_eq!(ctx.campaign_year, Some(2024));
        assert!(ctx.is_hub);
        assert!(!ctx.is_ifo);
        assert!(ctx.is_lda_required);
        assert_eq!(ctx.viewability_perc, Some(80));
        assert_eq!(ctx.product_short_forms, vec!["SBV".to_string()]);
    }
}
