use crate::keys::{compare_lists, is_effectively_empty, normalize_key};
use crate::reconciler::{BriefContext, MergedRow, NA};
use crate::schema::DeliverySettings;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Content categories excluded for every advertiser unless a more specific
/// table applies.
pub const DEFAULT_CONTENT_CATEGORIES: &str = "IAB1_2;IAB8_5;IAB8_18;IAB7_3;IAB7_5;IAB7_28;IAB7_30;IAB7_39;IAB7_42;IAB26_4;IAB26;IAB26_1;IAB26_2;IAB26_3;IAB11_5;IAB25;IAB25_1;IAB25_2;IAB25_3;IAB25_4;IAB25_5;IAB25_6;IAB25_7;IAB23;IAB23_1;IAB23_10;IAB23_2;IAB23_3;IAB23_4;IAB23_5;IAB23_6;IAB23_7;IAB23_8;IAB23_9;IAB15_1;IAB15_5;IAB14_1;IAB14_3;IAB18_2;IAB19_3;IAB19_19;IAB19_20;IAB19_22;IAB19_30;IAB19_33;IAB24;-1;IAB11;IAB11_1;IAB11_2;IAB11_4;IAB11_3";

/// Advertiser 90 carries an extended exclusion set.
pub const ADVERTISER_90_CONTENT_CATEGORIES: &str = "IAB1_2;IAB8_5;IAB8_18;IAB7_3;IAB7_5;IAB7_28;IAB7_30;IAB7_39;IAB7_42;IAB26_4;IAB26;IAB26_1;IAB26_3;IAB26_2;IAB11;IAB11_1;IAB11_2;IAB11_3;IAB11_4;IAB11_5;IAB25_2;IAB25_5;IAB25_7;IAB25_3;IAB25_4;IAB25_6;IAB25_1;IAB25;IAB23;IAB23_1;IAB23_2;IAB23_3;IAB23_4;IAB23_5;IAB23_6;IAB23_7;IAB23_8;IAB23_9;IAB23_10;IAB15_1;IAB15_5;IAB14_1;IAB14_3;IAB18_2;IAB19_3;IAB19_19;IAB19_20;IAB19_22;IAB19_30;IAB19_33;IAB12_1;IAB12_2;IAB12_3;IAB12;IAB13_3";

/// Retail-media CTV apps every CTV line item must exclude.
pub const CTV_EXCLUDED_APPS: &str = "Atmosphere;NRS TV;My NRS Store;VideoElephantTV;Loop for Retail;Loop;Grocery TV;VideoElephant TV;Loop TV;Retail Media TV";

/// Targeting check columns in report order.
pub const TARGETING_CHECK_COLUMNS: &[&str] = &[
    "Country Check",
    "App Bundle Check",
    "Domain List Check",
    "Environment Type Check",
    "OS/Device Check",
    "Segment Check",
    "Creatives Check",
    "Inventory Source Check",
    "Content Category Check",
    "CTV Apps Check",
    "Geo Targeting Check",
    "Deal ID List Check",
    "Video Placement Type Check",
];

/// General single-value checks over the delivery settings, in report order.
pub const GENERAL_CHECK_COLUMNS: &[&str] = &[
    "Programmatic Guaranteed",
    "Budget Type",
    "Bidding Strategy",
    "Pacing",
    "Pacing Behavior",
    "Multiplier",
    "Catchup Behavior",
    "Bid Shading",
    "Use Custom Bidding Agent",
    "Frequency Cap ID Type",
    "Frequency Duration",
    "Use Fallback",
];

/// Line-item type derived from the name prefix; drives the branch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineItemType {
    Moa,
    Mow,
    De,
    Ctv,
}

impl LineItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemType::Moa => "MOA",
            LineItemType::Mow => "MOW",
            LineItemType::De => "DE",
            LineItemType::Ctv => "CTV",
        }
    }
}

/// Classify a line item by its name prefix, plus whether it is a rich-media
/// line (`_RM_` in the name).
pub fn classify_line_item(name: &str) -> (Option<LineItemType>, bool) {
    let upper = name.trim().to_uppercase();
    let is_rm = upper.contains("_RM_");
    let line_type = if upper.starts_with("MOA_") {
        Some(LineItemType::Moa)
    } else if upper.starts_with("CTV_") {
        Some(LineItemType::Ctv)
    } else if upper.starts_with("MOW_") {
        Some(LineItemType::Mow)
    } else if upper.starts_with("DE_") {
        Some(LineItemType::De)
    } else {
        None
    };
    (line_type, is_rm)
}

/// Pass/fail plus the reason a human reads in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub passed: bool,
    pub reason: String,
}

impl RuleVerdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }

    pub fn from_bool(passed: bool, reason: impl Into<String>) -> Self {
        Self {
            passed,
            reason: reason.into(),
        }
    }
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

fn is_lda(ctx: &BriefContext) -> bool {
    ctx.lda_compliant.trim().eq_ignore_ascii_case("yes")
}

fn validate_country(row: &MergedRow) -> RuleVerdict {
    let country = opt(&row.line_item.targeting.include_country).to_uppercase();
    let passed = country.split(';').any(|c| c.trim() == "USA");
    RuleVerdict::from_bool(passed, "Include Country must contain USA")
}

fn validate_app_bundle(row: &MergedRow, ctx: &BriefContext) -> RuleVerdict {
    let (line_type, is_rm) = classify_line_item(&row.line_item.name);
    let app_bundle = opt(&row.line_item.targeting.exclude_app_bundle_list);

    match line_type {
        Some(LineItemType::Moa) | Some(LineItemType::Ctv) => {
            if is_lda(ctx) {
                let passed = compare_lists(app_bundle, "353");
                RuleVerdict::from_bool(passed, "LDA app exclusion list must be 353")
            } else {
                let mut expected = vec!["174"];
                if is_rm && line_type == Some(LineItemType::Moa) {
                    expected.push("1351");
                }
                if row.advertiser_id == Some(90) {
                    expected.push("1358");
                }
                let expected = expected.join(";");
                let passed = compare_lists(app_bundle, &expected);
                RuleVerdict::from_bool(passed, format!("App exclusion list must be {expected}"))
            }
        }
        Some(LineItemType::Mow) | Some(LineItemType::De) => RuleVerdict::from_bool(
            is_effectively_empty(app_bundle),
            "Web/desktop lines must not carry an app bundle list",
        ),
        None => RuleVerdict::fail("No recognizable line type prefix"),
    }
}

fn validate_domain_list(row: &MergedRow, ctx: &BriefContext) -> RuleVerdict {
    let (line_type, is_rm) = classify_line_item(&row.line_item.name);
    let domain_list = opt(&row.line_item.targeting.exclude_domain_list_id);

    match line_type {
        Some(LineItemType::Mow) | Some(LineItemType::De) => {
            if is_lda(ctx) {
                let passed = compare_lists(domain_list, "352");
                RuleVerdict::from_bool(passed, "LDA domain exclusion list must be 352")
            } else {
                let mut expected = vec!["94"];
                if is_rm && line_type == Some(LineItemType::Mow) {
                    expected.push("1352");
                }
                if row.advertiser_id == Some(90) {
                    expected.push("1357");
                }
                let expected = expected.join(";");
                let passed = compare_lists(domain_list, &expected);
                RuleVerdict::from_bool(passed, format!("Domain exclusion list must be {expected}"))
            }
        }
        Some(LineItemType::Moa) | Some(LineItemType::Ctv) => RuleVerdict::from_bool(
            is_effectively_empty(domain_list),
            "App/CTV lines must not carry a domain list",
        ),
        None => RuleVerdict::fail("No recognizable line type prefix"),
    }
}

fn validate_environment_type(row: &MergedRow) -> RuleVerdict {
    let (line_type, _) = classify_line_item(&row.line_item.name);
    let env = opt(&row.line_item.targeting.include_environment_type);
    match line_type {
        Some(LineItemType::Moa) | Some(LineItemType::Ctv) => {
            RuleVerdict::from_bool(env == "1", "App environment (1) required")
        }
        Some(LineItemType::Mow) | Some(LineItemType::De) => {
            RuleVerdict::from_bool(env == "0", "Web environment (0) required")
        }
        None => RuleVerdict::fail("No recognizable line type prefix"),
    }
}

/// Exactly one of operating system / device type may be populated, and its
/// value is fixed per line type. Order never matters.
fn validate_os_device(row: &MergedRow) -> RuleVerdict {
    let (line_type, _) = classify_line_item(&row.line_item.name);
    let os = opt(&row.line_item.targeting.include_operating_system);
    let device = opt(&row.line_item.targeting.include_device_type);

    match line_type {
        Some(LineItemType::Ctv) => {
            if !is_effectively_empty(os) {
                return RuleVerdict::fail("CTV lines must not set an operating system");
            }
            if is_effectively_empty(device) {
                return RuleVerdict::fail("CTV lines must set a device type");
            }
            RuleVerdict::from_bool(compare_lists(device, "6;3;8;7"), "Device type must be 6;3;8;7")
        }
        Some(LineItemType::Moa) | Some(LineItemType::Mow) => {
            if !is_effectively_empty(device) {
                return RuleVerdict::fail("Mobile lines must not set a device type");
            }
            if is_effectively_empty(os) {
                return RuleVerdict::fail("Mobile lines must set an operating system");
            }
            RuleVerdict::from_bool(compare_lists(os, "android;ios"), "OS must be Android;iOS")
        }
        Some(LineItemType::De) => {
            if !is_effectively_empty(device) {
                return RuleVerdict::fail("Desktop lines must not set a device type");
            }
            if is_effectively_empty(os) {
                return RuleVerdict::fail("Desktop lines must set an operating system");
            }
            RuleVerdict::from_bool(
                compare_lists(os, "os x;windows;chrome os"),
                "OS must be OS X;Windows;Chrome OS",
            )
        }
        None => RuleVerdict::fail("No recognizable line type prefix"),
    }
}

fn validate_segment(row: &MergedRow) -> RuleVerdict {
    let segment = opt(&row.line_item.targeting.include_segment);
    let passed = !segment.is_empty() && segment.to_lowercase().contains("catalina-");
    RuleVerdict::from_bool(passed, "Include Segment must carry a catalina- segment")
}

fn creatives_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\(\d+;"";"";\d+\)"#).unwrap())
}

fn validate_creatives(row: &MergedRow) -> RuleVerdict {
    let creatives = opt(&row.line_item.targeting.creatives);
    let passed = !creatives.is_empty() && creatives_field_re().is_match(creatives);
    RuleVerdict::from_bool(passed, "Creatives field must list at least one attached creative")
}

fn validate_inventory_source(row: &MergedRow) -> RuleVerdict {
    let (_, is_rm) = classify_line_item(&row.line_item.name);
    if !is_rm {
        return RuleVerdict::pass("Not a rich-media line");
    }
    let source = opt(&row.line_item.targeting.exclude_inventory_source);
    RuleVerdict::from_bool(
        compare_lists(source, "ap;out"),
        "Rich-media lines must exclude inventory sources ap;out",
    )
}

fn validate_content_category(row: &MergedRow) -> RuleVerdict {
    let category = opt(&row.line_item.targeting.exclude_content_category);
    let expected = if row.advertiser_id == Some(90) {
        ADVERTISER_90_CONTENT_CATEGORIES
    } else {
        DEFAULT_CONTENT_CATEGORIES
    };
    RuleVerdict::from_bool(
        compare_lists(category, expected),
        "Excluded content categories must match the advertiser's table",
    )
}

fn validate_ctv_apps(row: &MergedRow) -> RuleVerdict {
    let (line_type, _) = classify_line_item(&row.line_item.name);
    let app_names = opt(&row.line_item.targeting.exclude_app_name);

    if line_type != Some(LineItemType::Ctv) {
        return RuleVerdict::from_bool(
            is_effectively_empty(app_names),
            "Non-CTV lines must not exclude app names",
        );
    }
    if app_names.is_empty() {
        return RuleVerdict::fail("CTV line missing required app exclusions");
    }

    let actual: BTreeSet<String> = app_names.split(';').map(normalize_key).collect();
    let missing: Vec<&str> = CTV_EXCLUDED_APPS
        .split(';')
        .filter(|app| !actual.contains(&normalize_key(app)))
        .collect();
    if missing.is_empty() {
        RuleVerdict::pass("All required CTV app exclusions present")
    } else {
        RuleVerdict::fail(format!("Missing CTV app exclusions: {}", missing.join(", ")))
    }
}

fn validate_geo_targeting(row: &MergedRow) -> RuleVerdict {
    if !row.brief_geo_required.trim().eq_ignore_ascii_case("yes") {
        return RuleVerdict::pass("Geo targeting not required by brief");
    }
    let t = &row.line_item.targeting;
    let geo_fields = [
        &t.include_lat_long_list,
        &t.exclude_lat_long_list,
        &t.include_metro,
        &t.exclude_metro,
        &t.include_region,
        &t.exclude_region,
        &t.include_zip_code_list,
        &t.exclude_zip_code_list,
    ];
    let passed = geo_fields.iter().any(|f| !is_effectively_empty(opt(f)));
    RuleVerdict::from_bool(
        passed,
        "Brief requires geo targeting but no geo include/exclude column is populated",
    )
}

fn validate_deal_id_list(row: &MergedRow, ctx: &BriefContext) -> RuleVerdict {
    let deal_ids = opt(&row.line_item.targeting.include_deal_id_list);
    if !is_lda(ctx) {
        return RuleVerdict::from_bool(
            is_effectively_empty(deal_ids),
            "Deal ID list must be empty for non-LDA campaigns",
        );
    }
    let (line_type, _) = classify_line_item(&row.line_item.name);
    if line_type == Some(LineItemType::Ctv) {
        RuleVerdict::from_bool(compare_lists(deal_ids, "1454"), "LDA CTV deal ID list must be 1454")
    } else {
        RuleVerdict::from_bool(compare_lists(deal_ids, "194"), "LDA deal ID list must be 194")
    }
}

fn validate_video_placement_type(row: &MergedRow) -> RuleVerdict {
    let placement_type = opt(&row.line_item.targeting.include_video_placement_type);
    // Case-sensitive on purpose: the brief writes "Video" with a capital V.
    let is_video_line = row.brief_platform_media.contains("Video");

    if is_video_line {
        let passed = placement_type == "1" || placement_type == "1.0";
        RuleVerdict::from_bool(
            passed,
            "Video lines must set Include Video Placement Type to exactly 1",
        )
    } else {
        RuleVerdict::from_bool(
            is_effectively_empty(placement_type),
            "Non-video lines must leave Include Video Placement Type empty",
        )
    }
}

// --- CPM bidding formula ---------------------------------------------------

/// Base CPM by platform/media, geo requirement and LDA compliance.
pub fn base_cpm(platform_media: &str, geo_required: &str, lda_compliant: &str) -> Option<f64> {
    let pm = platform_media.trim().to_lowercase();
    let geo = geo_required.trim().eq_ignore_ascii_case("yes");
    let lda = lda_compliant.trim().eq_ignore_ascii_case("yes");

    if pm.starts_with("mobile") {
        if pm.contains("rich media") {
            Some(3.15)
        } else if pm.contains("banner") {
            Some(if geo { 2.34 } else { 2.00 })
        } else if pm.contains("video") {
            Some(6.30)
        } else {
            None
        }
    } else if pm.starts_with("desktop") {
        if pm.contains("rich media") {
            Some(2.89)
        } else if pm.contains("banner") {
            Some(if geo { 2.89 } else { 2.36 })
        } else if pm.contains("video") {
            Some(7.35)
        } else {
            None
        }
    } else if pm.starts_with("ctv") {
        Some(if lda { 19.00 } else { 17.00 })
    } else {
        None
    }
}

/// Viewability goal to a 0-100 number; decimals below 1 are fractions.
pub fn normalize_viewability_goal(goal: &str) -> Option<f64> {
    let cleaned = goal.trim().replace('%', "");
    let value: f64 = cleaned.parse().ok()?;
    Some(if value < 1.0 { value * 100.0 } else { value })
}

type AddonTable = &'static [((u32, u32), f64)];

const MOBILE_BANNER_ADDONS: AddonTable =
    &[((60, 74), 0.15), ((75, 84), 0.40), ((85, 94), 1.43), ((95, 100), 2.47)];
const MOBILE_GEO_ADDONS: AddonTable =
    &[((60, 74), 0.15), ((75, 84), 0.47), ((85, 94), 1.67), ((95, 100), 2.90)];
const MOBILE_RM_ADDONS: AddonTable =
    &[((60, 74), 0.15), ((75, 84), 0.63), ((85, 94), 2.25), ((95, 100), 3.90)];
const MOBILE_VIDEO_ADDONS: AddonTable =
    &[((60, 74), 2.45), ((75, 84), 3.90), ((85, 94), 4.50), ((95, 100), 7.80)];
const DESKTOP_BANNER_ADDONS: AddonTable =
    &[((60, 74), 0.45), ((75, 84), 0.83), ((85, 94), 2.95), ((95, 100), 5.06)];
const DESKTOP_GEO_ADDONS: AddonTable =
    &[((60, 74), 0.45), ((75, 84), 1.02), ((85, 94), 3.60), ((95, 100), 6.19)];
const DESKTOP_RM_ADDONS: AddonTable =
    &[((60, 74), 0.45), ((75, 84), 1.02), ((85, 94), 3.60), ((95, 100), 6.19)];
const DESKTOP_VIDEO_ADDONS: AddonTable =
    &[((60, 74), 2.45), ((75, 84), 4.55), ((85, 94), 9.17), ((95, 100), 15.75)];

/// Viewability add-on CPM for the platform/media and goal. Returns the
/// add-on (zero when no bucket applies) and the normalized goal for display.
pub fn viewability_addon_cpm(platform_media: &str, viewability_goal: &str) -> (f64, String) {
    let pm = platform_media.trim().to_lowercase();
    let Some(viewability) = normalize_viewability_goal(viewability_goal) else {
        return (0.0, NA.to_string());
    };
    let display = format!("{viewability:.1}%");

    const TABLES: &[(&str, AddonTable)] = &[
        ("mobile/banner", MOBILE_BANNER_ADDONS),
        ("mobile/geo-targeting", MOBILE_GEO_ADDONS),
        ("mobile/rich media", MOBILE_RM_ADDONS),
        ("mobile/video", MOBILE_VIDEO_ADDONS),
        ("desktop/banner", DESKTOP_BANNER_ADDONS),
        ("desktop/geo-targeting", DESKTOP_GEO_ADDONS),
        ("desktop/rich media", DESKTOP_RM_ADDONS),
        ("desktop/video", DESKTOP_VIDEO_ADDONS),
    ];

    for (key, table) in TABLES {
        if pm.starts_with(key) {
            for ((min, max), addon) in *table {
                if viewability >= *min as f64 && viewability <= *max as f64 {
                    return (*addon, display);
                }
            }
        }
    }
    (0.0, display)
}

/// Pull the CPM bid out of the bidding-values blob. Proper JSON is handled
/// first; the lenient path covers the platform's quasi-JSON export.
pub fn extract_cpm_bid(blob: &str) -> Option<f64> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(blob) {
        if let Some(cpm) = value.get("cpm_bid").and_then(|v| v.as_f64()) {
            return Some(cpm);
        }
    }
    let cleaned = blob.trim().trim_matches(['{', '}']).replace('"', "");
    let (key, value) = cleaned.split_once(':')?;
    if key.contains("cpm_bid") {
        value.trim().parse().ok()
    } else {
        None
    }
}

/// CPM verdict: expected = base + viewability add-on, compared to the
/// extracted bid with EXACT equality. CPM is a contract number; a rounding
/// mismatch is a real discrepancy, unlike the tolerance-based budget checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpmVerdict {
    pub passed: bool,
    pub expected: Option<f64>,
    pub actual: Option<f64>,
    pub explanation: String,
}

pub fn validate_bidding_value(row: &MergedRow, ctx: &BriefContext) -> CpmVerdict {
    let blob = opt(&row.line_item.delivery.bidding_values);
    let actual = extract_cpm_bid(blob);
    let Some(actual) = actual else {
        return CpmVerdict {
            passed: false,
            expected: None,
            actual: None,
            explanation: format!("Could not extract CPM from bidding value: {blob}"),
        };
    };

    let base = base_cpm(
        &row.brief_platform_media,
        &row.brief_geo_required,
        &ctx.lda_compliant,
    );
    let Some(base) = base else {
        return CpmVerdict {
            passed: false,
            expected: None,
            actual: Some(actual),
            explanation: format!(
                "No base CPM rule for platform/media: {}",
                row.brief_platform_media
            ),
        };
    };

    let (addon, viewability) = viewability_addon_cpm(&row.brief_platform_media, &ctx.viewability_goal);
    let expected = base + addon;
    let passed = expected == actual;

    CpmVerdict {
        passed,
        expected: Some(expected),
        actual: Some(actual),
        explanation: format!(
            "Platform: {}, Geo: {}, LDA: {}, Viewability: {}, Expected: ${:.2} (Base ${:.2} + Addon ${:.2}), Actual: ${:.2}",
            row.brief_platform_media,
            row.brief_geo_required,
            ctx.lda_compliant,
            viewability,
            expected,
            base,
            addon,
            actual
        ),
    }
}

// --- Budget split & buffer -------------------------------------------------

/// Tolerances: line budgets are estimates (±1%), splits must close to 100%
/// within 0.2 points, buffers match 3%/6% within 0.1.
const LINE_TOLERANCE_PCT: f64 = 1.0;
const SPLIT_TOLERANCE_PCT: f64 = 0.2;
const BUFFER_TOLERANCE_PCT: f64 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetOutcome {
    pub split_display: String,
    pub split_pct: Option<f64>,
    pub target_required: Option<f64>,
    pub line_buffer_display: String,
    /// Line budget within ±1% of its proportional target.
    pub budget_check: bool,
    /// Line buffer equals the expected 3%/6% for the traffic-info flag.
    pub line_buffer_check: bool,
    /// Group-level closure: splits sum to 100%, LDA splits are 50%/100%.
    pub split_group_check: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignBudgetOutcome {
    pub imps_required: Option<f64>,
    pub buffer_display: String,
    pub buffer_check: bool,
    /// campaign_budget_type must be "impressions".
    pub budget_type_check: bool,
    /// impressions budget blob shaped {"lifetime":N,"daily":None}.
    pub budget_format_check: bool,
}

fn parse_impressions(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("n/a") {
        return None;
    }
    cleaned.parse().ok()
}

/// Lifetime impressions out of the campaign budget blob, which arrives as
/// quasi-JSON like {'lifetime': 1200000, 'daily': None}.
pub fn extract_campaign_budget(blob: &str) -> Option<i64> {
    let cleaned = blob.trim().trim_matches(['{', '}']).replace(['\'', '"'], "");
    for part in cleaned.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        if key.contains("lifetime") {
            let value = value.trim();
            if value.eq_ignore_ascii_case("none") {
                return None;
            }
            return value.parse().ok();
        }
    }
    None
}

fn campaign_budget_format_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\{"lifetime":\d+,"daily":None\}$"#).unwrap())
}

pub fn check_campaign_budget_format(blob: &str) -> bool {
    let cleaned = blob.replace(' ', "").replace('\'', "\"");
    campaign_budget_format_re().is_match(&cleaned)
}

/// Expected buffer percentage from the placement's traffic-information flag.
fn expected_buffer(traffic_info: &str) -> f64 {
    if traffic_info.trim().eq_ignore_ascii_case("yes") {
        6.0
    } else {
        3.0
    }
}

/// Validate one alternate-id group's splits: they must close to 100% within
/// 0.2 points, and an LDA-compliant group only allows 50% or 100% members.
pub fn validate_split_group(splits: &[f64], lda_compliant: bool) -> bool {
    if splits.is_empty() {
        return false;
    }
    let sum: f64 = splits.iter().sum();
    let mut valid = if splits.len() == 1 {
        (splits[0] - 100.0).abs() < SPLIT_TOLERANCE_PCT
    } else {
        (sum - 100.0).abs() < SPLIT_TOLERANCE_PCT
    };
    if lda_compliant {
        let all_half_or_full = splits.iter().all(|s| {
            (s - 50.0).abs() < SPLIT_TOLERANCE_PCT || (s - 100.0).abs() < SPLIT_TOLERANCE_PCT
        });
        if !all_half_or_full {
            valid = false;
        }
    }
    valid
}

/// Compute per-line-item budget outcomes. Rows sharing one alternate id
/// form a group; the whole group is aggregated before any member is scored.
fn compute_budget_outcomes(
    line_items: &[&MergedRow],
    ctx: &BriefContext,
) -> BTreeMap<u64, BudgetOutcome> {
    let mut outcomes: BTreeMap<u64, BudgetOutcome> = BTreeMap::new();

    let mut groups: BTreeMap<String, Vec<&MergedRow>> = BTreeMap::new();
    for row in line_items {
        groups
            .entry(normalize_key(&row.line_item.alternative_id))
            .or_default()
            .push(*row);
    }

    for (alt_id, group) in &groups {
        let is_mobile_group = group
            .iter()
            .any(|r| r.brief_platform_media.to_lowercase().contains("mobile"));
        let brief_imps = group
            .iter()
            .find_map(|r| parse_impressions(&r.brief_impressions));
        let traffic_info = group
            .iter()
            .map(|r| r.brief_traffic_info.trim())
            .find(|t| !t.is_empty() && *t != NA)
            .unwrap_or("");

        let Some(brief_imps) = brief_imps else {
            warn!("Missing brief impressions for alternate id {alt_id}");
            for row in group {
                outcomes.insert(
                    row.line_item.id,
                    BudgetOutcome {
                        split_display: "Error".to_string(),
                        line_buffer_display: "Error".to_string(),
                        ..BudgetOutcome::default()
                    },
                );
            }
            continue;
        };

        let total_budget: f64 = group.iter().filter_map(|r| r.line_item.budget).sum();
        let mut splits = Vec::new();

        for row in group {
            let budget = row.line_item.budget.unwrap_or(0.0);
            let mut outcome = BudgetOutcome::default();

            if is_mobile_group {
                if total_budget > 0.0 {
                    let split_pct = budget / total_budget * 100.0;
                    let target = split_pct / 100.0 * brief_imps;
                    outcome.split_pct = Some(split_pct);
                    outcome.split_display = format!("{split_pct:.1}%");
                    outcome.target_required = Some(target);
                    if target > 0.0 {
                        let diff = (budget - target) / target * 100.0;
                        outcome.line_buffer_display = format!("{diff:+.1}%");
                        outcome.budget_check = diff.abs() <= LINE_TOLERANCE_PCT;
                        outcome.line_buffer_check =
                            (diff - expected_buffer(traffic_info)).abs() < BUFFER_TOLERANCE_PCT;
                    } else {
                        outcome.line_buffer_display = "Error".to_string();
                    }
                    splits.push(split_pct);
                } else {
                    outcome.split_display = "Error: Zero Total".to_string();
                    outcome.line_buffer_display = "Error".to_string();
                }
            } else {
                // Non-mobile lines each carry the full goal.
                outcome.split_pct = Some(100.0);
                outcome.split_display = "100%".to_string();
                outcome.target_required = Some(brief_imps);
                let diff = (budget - brief_imps) / brief_imps * 100.0;
                outcome.line_buffer_display = format!("{diff:+.1}%");
                outcome.budget_check = diff.abs() <= LINE_TOLERANCE_PCT;
                outcome.line_buffer_check =
                    (diff - expected_buffer(traffic_info)).abs() < BUFFER_TOLERANCE_PCT;
                splits.push(100.0);
            }

            outcomes.insert(row.line_item.id, outcome);
        }

        // Group barrier: score closure only after every member is in.
        let group_ok = validate_split_group(&splits, is_lda(ctx));
        for row in group {
            if let Some(outcome) = outcomes.get_mut(&row.line_item.id) {
                outcome.split_group_check = group_ok && outcome.split_pct.is_some();
            }
        }
    }

    outcomes
}

/// Compute campaign-level buffer outcomes, one per campaign id, summing the
/// brief impressions of each distinct alternate id exactly once.
fn compute_campaign_outcomes(
    line_items: &[&MergedRow],
) -> BTreeMap<u64, CampaignBudgetOutcome> {
    let mut outcomes = BTreeMap::new();

    let mut groups: BTreeMap<u64, Vec<&MergedRow>> = BTreeMap::new();
    for row in line_items {
        if let Some(campaign) = &row.campaign {
            groups.entry(campaign.id).or_default().push(*row);
        }
    }

    for (campaign_id, group) in &groups {
        let mut seen_alt_ids = BTreeSet::new();
        let mut total_imps = 0.0;
        let mut any_imps = false;
        for row in group {
            if seen_alt_ids.insert(normalize_key(&row.line_item.alternative_id)) {
                if let Some(imps) = parse_impressions(&row.brief_impressions) {
                    total_imps += imps;
                    any_imps = true;
                }
            }
        }

        let campaign = group[0].campaign.as_ref();
        let budget_blob = campaign
            .and_then(|c| c.impressions_budget.as_deref())
            .unwrap_or("");
        let budget_type = campaign.and_then(|c| c.budget_type.as_deref()).unwrap_or("");
        let traffic_info = group
            .iter()
            .map(|r| r.brief_traffic_info.trim())
            .find(|t| !t.is_empty() && *t != NA)
            .unwrap_or("");

        let mut outcome = CampaignBudgetOutcome {
            budget_type_check: budget_type.trim().eq_ignore_ascii_case("impressions"),
            budget_format_check: check_campaign_budget_format(budget_blob),
            ..CampaignBudgetOutcome::default()
        };

        match (any_imps, extract_campaign_budget(budget_blob)) {
            (true, Some(budget)) => {
                let buffer = (budget as f64 - total_imps) / total_imps * 100.0;
                outcome.imps_required = Some(total_imps);
                outcome.buffer_display = format!("{buffer:+.1}%");
                outcome.buffer_check =
                    (buffer - expected_buffer(traffic_info)).abs() < BUFFER_TOLERANCE_PCT;
            }
            _ => {
                outcome.buffer_display = "Error".to_string();
            }
        }

        outcomes.insert(*campaign_id, outcome);
    }

    outcomes
}

// --- General value battery -------------------------------------------------

fn check_exact(value: &str, expected: &str) -> bool {
    value.trim().eq_ignore_ascii_case(expected)
}

/// Fixed-value delivery settings every line item must carry.
pub fn evaluate_general_checks(delivery: &DeliverySettings) -> Vec<(&'static str, bool)> {
    let freq = opt(&delivery.frequency_duration).to_lowercase();
    vec![
        (
            "Programmatic Guaranteed",
            check_exact(opt(&delivery.programmatic_guaranteed), "false"),
        ),
        ("Budget Type", check_exact(opt(&delivery.budget_type), "impressions")),
        (
            "Bidding Strategy",
            check_exact(opt(&delivery.bidding_strategy), "CPM_PACED"),
        ),
        ("Pacing", check_exact(opt(&delivery.pacing), "lifetime")),
        ("Pacing Behavior", check_exact(opt(&delivery.pacing_behavior), "even")),
        ("Multiplier", {
            let m = opt(&delivery.multiplier);
            m == "1" || m == "1.0"
        }),
        ("Catchup Behavior", check_exact(opt(&delivery.catchup_behavior), "even")),
        ("Bid Shading", is_effectively_empty(opt(&delivery.bid_shading))),
        (
            "Use Custom Bidding Agent",
            check_exact(opt(&delivery.use_custom_bidding_agent), "false"),
        ),
        (
            "Frequency Cap ID Type",
            check_exact(opt(&delivery.frequency_cap_id_type), "STANDARD"),
        ),
        (
            "Frequency Duration",
            ["(1;1;week)", "(2;1;week)", "(3;1;week)"].contains(&freq.as_str()),
        ),
        ("Use Fallback", check_exact(opt(&delivery.use_fallback), "true")),
    ]
}

// --- Engine ----------------------------------------------------------------

/// Per-line-item targeting verdict with every check family attached.
#[derive(Debug, Clone, Serialize)]
pub struct TargetingRowResult {
    pub line_item_id: u64,
    pub checks: Vec<(&'static str, RuleVerdict)>,
    pub general: Vec<(&'static str, bool)>,
    pub cpm: CpmVerdict,
    pub budget: BudgetOutcome,
    pub campaign_budget: CampaignBudgetOutcome,
    pub has_issues: bool,
}

pub struct TargetingRuleEngine<'a> {
    ctx: &'a BriefContext,
}

impl<'a> TargetingRuleEngine<'a> {
    pub fn new(ctx: &'a BriefContext) -> Self {
        Self { ctx }
    }

    /// Evaluate the merged table at line-item granularity: creative fan-out
    /// rows collapse to one targeting row per line item. Campaign and
    /// split-group aggregates are computed over complete groups before any
    /// member row is scored.
    pub fn evaluate(&self, rows: &[MergedRow]) -> Vec<TargetingRowResult> {
        let mut seen = BTreeSet::new();
        let line_items: Vec<&MergedRow> = rows
            .iter()
            .filter(|row| seen.insert(row.line_item.id))
            .collect();

        let budget_outcomes = compute_budget_outcomes(&line_items, self.ctx);
        let campaign_outcomes = compute_campaign_outcomes(&line_items);

        line_items
            .iter()
            .map(|row| {
                let checks: Vec<(&'static str, RuleVerdict)> = vec![
                    ("Country Check", validate_country(row)),
                    ("App Bundle Check", validate_app_bundle(row, self.ctx)),
                    ("Domain List Check", validate_domain_list(row, self.ctx)),
                    ("Environment Type Check", validate_environment_type(row)),
                    ("OS/Device Check", validate_os_device(row)),
                    ("Segment Check", validate_segment(row)),
                    ("Creatives Check", validate_creatives(row)),
                    ("Inventory Source Check", validate_inventory_source(row)),
                    ("Content Category Check", validate_content_category(row)),
                    ("CTV Apps Check", validate_ctv_apps(row)),
                    ("Geo Targeting Check", validate_geo_targeting(row)),
                    ("Deal ID List Check", validate_deal_id_list(row, self.ctx)),
                    (
                        "Video Placement Type Check",
                        validate_video_placement_type(row),
                    ),
                ];
                let general = evaluate_general_checks(&row.line_item.delivery);
                let cpm = validate_bidding_value(row, self.ctx);
                let budget = budget_outcomes
                    .get(&row.line_item.id)
                    .cloned()
                    .unwrap_or_default();
                let campaign_budget = row
                    .campaign
                    .as_ref()
                    .and_then(|c| campaign_outcomes.get(&c.id))
                    .cloned()
                    .unwrap_or_default();

                let has_issues = checks.iter().any(|(_, v)| !v.passed)
                    || general.iter().any(|(_, ok)| !ok)
                    || !cpm.passed
                    || !budget.line_buffer_check
                    || !budget.split_group_check
                    || !campaign_budget.buffer_check;

                if has_issues {
                    debug!(
                        "Targeting issues for line item {} ({})",
                        row.line_item.id, row.line_item.name
                    );
                }

                TargetingRowResult {
                    line_item_id: row.line_item.id,
                    checks,
                    general,
                    cpm,
                    budget,
                    campaign_budget,
                    has_issues,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        DeliverySettings, PlatformCampaign, PlatformLineItem, TargetingProfile,
    };

    fn ctx() -> BriefContext {
        BriefContext::default()
    }

    fn lda_ctx() -> BriefContext {
        BriefContext {
            lda_compliant: "Yes".to_string(),
            is_lda_required: true,
            ..BriefContext::default()
        }
    }

    fn line_item(name: &str) -> PlatformLineItem {
        PlatformLineItem {
            id: 100,
            campaign_id: 10,
            alternative_id: "BVT123456789".to_string(),
            name: name.to_string(),
            active: false,
            start_date: None,
            end_date: None,
            budget: Some(600_000.0),
            delivery: DeliverySettings::default(),
            targeting: TargetingProfile::default(),
        }
    }

    fn row(name: &str) -> MergedRow {
        MergedRow {
            advertiser_id: Some(7),
            advertiser_name: Some("Acme".to_string()),
            campaign: Some(PlatformCampaign {
                id: 10,
                advertiser_id: 7,
                alternative_id: "BVI0123456789".to_string(),
                name: "SBV_Q1_2024".to_string(),
                active: true,
                start_date: None,
                end_date: None,
                budget_type: Some("impressions".to_string()),
                impressions_budget: Some("{'lifetime': 1236000, 'daily': None}".to_string()),
            }),
            line_item: line_item(name),
            creative: None,
            brief_bvt_id: "BVT123456789".to_string(),
            brief_bvp_id: "BVP111222333".to_string(),
            brief_platform_media: "Mobile/Banner".to_string(),
            brief_impressions: "1200000".to_string(),
            brief_geo_required: "No".to_string(),
            brief_traffic_info: "No".to_string(),
        }
    }

    #[test]
    fn test_classify_line_item() {
        assert_eq!(
            classify_line_item("MOA_SBV_Q1_24_BA"),
            (Some(LineItemType::Moa), false)
        );
        assert_eq!(
            classify_line_item("MOW_SBV_Q1_24_RM_x"),
            (Some(LineItemType::Mow), true)
        );
        assert_eq!(classify_line_item("CTV_x"), (Some(LineItemType::Ctv), false));
        assert_eq!(classify_line_item("banner_x"), (None, false));
    }

    #[test]
    fn test_app_bundle_branches() {
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.exclude_app_bundle_list = Some("174".to_string());
        assert!(validate_app_bundle(&r, &ctx()).passed);

        // Rich-media app lines add list 1351, any order.
        let mut r = row("MOA_SBV_Q1_24_RM_x");
        r.line_item.targeting.exclude_app_bundle_list = Some("1351;174".to_string());
        assert!(validate_app_bundle(&r, &ctx()).passed);

        // LDA overrides everything.
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.exclude_app_bundle_list = Some("353".to_string());
        assert!(validate_app_bundle(&r, &lda_ctx()).passed);
        r.line_item.targeting.exclude_app_bundle_list = Some("174".to_string());
        assert!(!validate_app_bundle(&r, &lda_ctx()).passed);

        // Web lines must not carry an app bundle list at all.
        let mut r = row("MOW_SBV_Q1_24_BA");
        r.line_item.targeting.exclude_app_bundle_list = Some("nan".to_string());
        assert!(validate_app_bundle(&r, &ctx()).passed);
        r.line_item.targeting.exclude_app_bundle_list = Some("174".to_string());
        assert!(!validate_app_bundle(&r, &ctx()).passed);
    }

    #[test]
    fn test_os_device_exclusivity() {
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.include_operating_system = Some("iOS;Android".to_string());
        assert!(validate_os_device(&r).passed);

        r.line_item.targeting.include_device_type = Some("6".to_string());
        assert!(!validate_os_device(&r).passed);

        let mut r = row("CTV_SBV_Q1_24_VI");
        r.line_item.targeting.include_device_type = Some("3;6;7;8".to_string());
        assert!(validate_os_device(&r).passed);
    }

    #[test]
    fn test_content_category_by_advertiser() {
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.exclude_content_category =
            Some(DEFAULT_CONTENT_CATEGORIES.to_string());
        assert!(validate_content_category(&r).passed);

        r.advertiser_id = Some(90);
        assert!(!validate_content_category(&r).passed);
        r.line_item.targeting.exclude_content_category =
            Some(ADVERTISER_90_CONTENT_CATEGORIES.to_string());
        assert!(validate_content_category(&r).passed);
    }

    #[test]
    fn test_geo_targeting_presence() {
        let mut r = row("MOA_SBV_Q1_24_Geo_BA");
        r.brief_geo_required = "Yes".to_string();
        assert!(!validate_geo_targeting(&r).passed);

        r.line_item.targeting.include_zip_code_list = Some("90210".to_string());
        assert!(validate_geo_targeting(&r).passed);

        // Not required: trivially passes, including for the N/A sentinel.
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.brief_geo_required = NA.to_string();
        assert!(validate_geo_targeting(&r).passed);
    }

    #[test]
    fn test_video_placement_type() {
        let mut r = row("MOA_SBV_Q1_24_VI");
        r.brief_platform_media = "Mobile/Video".to_string();
        r.line_item.targeting.include_video_placement_type = Some("1".to_string());
        assert!(validate_video_placement_type(&r).passed);

        r.line_item.targeting.include_video_placement_type = Some("1;3".to_string());
        assert!(!validate_video_placement_type(&r).passed);

        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.include_video_placement_type = Some("1".to_string());
        assert!(!validate_video_placement_type(&r).passed);
        r.line_item.targeting.include_video_placement_type = None;
        assert!(validate_video_placement_type(&r).passed);
    }

    #[test]
    fn test_cpm_exactness() {
        // Mobile/Banner, no geo, 80% viewability: 2.00 + 0.40 = 2.40.
        let mut r = row("MOA_SBV_Q1_24_BA");
        let mut context = ctx();
        context.viewability_goal = "80%".to_string();

        r.line_item.delivery.bidding_values = Some("{\"cpm_bid\": 2.40}".to_string());
        let verdict = validate_bidding_value(&r, &context);
        assert!(verdict.passed, "{}", verdict.explanation);
        assert_eq!(verdict.expected, Some(2.40));

        r.line_item.delivery.bidding_values = Some("{\"cpm_bid\": 2.41}".to_string());
        let verdict = validate_bidding_value(&r, &context);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_cpm_malformed_blob_fails_with_reason() {
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.delivery.bidding_values = Some("not json at all".to_string());
        let verdict = validate_bidding_value(&r, &ctx());
        assert!(!verdict.passed);
        assert!(verdict.explanation.contains("Could not extract CPM"));
    }

    #[test]
    fn test_extract_cpm_bid_lenient() {
        assert_eq!(extract_cpm_bid("{\"cpm_bid\": 2.4}"), Some(2.4));
        assert_eq!(extract_cpm_bid("{cpm_bid: 17}"), Some(17.0));
        assert_eq!(extract_cpm_bid("{other: 1}"), None);
    }

    #[test]
    fn test_split_group_validation() {
        assert!(validate_split_group(&[100.0], false));
        assert!(validate_split_group(&[60.0, 40.0], false));
        assert!(!validate_split_group(&[60.0, 50.0], false));
        // LDA: members must each be 50% or 100%.
        assert!(validate_split_group(&[50.0, 50.0], true));
        assert!(!validate_split_group(&[60.0, 40.0], true));
    }

    #[test]
    fn test_mobile_budget_split_and_campaign_buffer() {
        // Two mobile line items share one alternate id, splitting 1.2M
        // impressions 50/50 with a 3% buffer each.
        let mut app = row("MOA_SBV_Q1_24_BA");
        app.line_item.id = 100;
        app.line_item.budget = Some(618_000.0);
        let mut web = row("MOW_SBV_Q1_24_BA");
        web.line_item.id = 101;
        web.line_item.budget = Some(618_000.0);

        let context = ctx();
        let engine = TargetingRuleEngine::new(&context);
        let results = engine.evaluate(&[app, web]);
        assert_eq!(results.len(), 2);

        for result in &results {
            assert_eq!(result.budget.split_display, "50.0%");
            assert!(result.budget.split_group_check);
            assert!(!result.budget.budget_check, "3% over target exceeds ±1%");
            assert!(result.budget.line_buffer_check, "buffer should match 3%");
            // Campaign: 1236000 budget vs 1200000 required = +3.0%.
            assert_eq!(result.campaign_budget.buffer_display, "+3.0%");
            assert!(result.campaign_budget.buffer_check);
            assert!(result.campaign_budget.budget_type_check);
            assert!(result.campaign_budget.budget_format_check);
        }
    }

    #[test]
    fn test_general_checks_battery() {
        let delivery = DeliverySettings {
            programmatic_guaranteed: Some("FALSE".to_string()),
            budget_type: Some("impressions".to_string()),
            daily_budget: None,
            bidding_strategy: Some("CPM_PACED".to_string()),
            pacing: Some("lifetime".to_string()),
            pacing_behavior: Some("even".to_string()),
            multiplier: Some("1".to_string()),
            catchup_behavior: Some("even".to_string()),
            bidding_values: None,
            bid_shading: None,
            use_custom_bidding_agent: Some("FALSE".to_string()),
            frequency_cap_id_type: Some("STANDARD".to_string()),
            frequency_duration: Some("(1;1;week)".to_string()),
            use_fallback: Some("TRUE".to_string()),
        };
        let results = evaluate_general_checks(&delivery);
        assert_eq!(results.len(), GENERAL_CHECK_COLUMNS.len());
        assert!(results.iter().all(|(_, ok)| *ok));

        let empty = DeliverySettings::default();
        let results = evaluate_general_checks(&empty);
        // Bid shading passes on empty; everything else fails.
        let passing: Vec<&str> = results
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(passing, vec!["Bid Shading"]);
    }

    #[test]
    fn test_deal_id_list_branches() {
        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.include_deal_id_list = None;
        assert!(validate_deal_id_list(&r, &ctx()).passed);

        r.line_item.targeting.include_deal_id_list = Some("194".to_string());
        assert!(!validate_deal_id_list(&r, &ctx()).passed);
        assert!(validate_deal_id_list(&r, &lda_ctx()).passed);

        let mut r = row("CTV_SBV_Q1_24_VI");
        r.line_item.targeting.include_deal_id_list = Some("1454".to_string());
        assert!(validate_deal_id_list(&r, &lda_ctx()).passed);
    }

    #[test]
    fn test_ctv_app_exclusions() {
        let mut r = row("CTV_SBV_Q1_24_VI");
        r.line_item.targeting.exclude_app_name = Some(CTV_EXCLUDED_APPS.to_string());
        assert!(validate_ctv_apps(&r).passed);

        // A superset still passes; a missing app fails.
        r.line_item.targeting.exclude_app_name =
            Some(format!("{CTV_EXCLUDED_APPS};Another App"));
        assert!(validate_ctv_apps(&r).passed);
        r.line_item.targeting.exclude_app_name = Some("Atmosphere".to_string());
        assert!(!validate_ctv_apps(&r).passed);

        let mut r = row("MOA_SBV_Q1_24_BA");
        r.line_item.targeting.exclude_app_name = Some("Atmosphere".to_string());
        assert!(!validate_ctv_apps(&r).passed);
    }
}
