use crate::reconciler::{BriefContext, MergedRow, NA};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Entity tags used to attribute one failing check to the entity levels it
/// failed for. Sets of these render as `"TRUE - C, Li"` in reports.
pub const TAG_CAMPAIGN: &str = "C";
pub const TAG_LINE_ITEM: &str = "Li";
pub const TAG_CREATIVE: &str = "Cr";
pub const TAG_CREATIVE_ACTIVE: &str = "Cr_A";
pub const TAG_CREATIVE_SECURE: &str = "Cr_S";

/// Column keys for the per-row naming checks, in report order.
pub const NAMING_CHECK_COLUMNS: &[&str] = &[
    "has_spaces",
    "has_special_chars",
    "missing_quarter",
    "missing_year",
    "missing_product_type",
    "missing_hub_ifo_tag",
    "missing_lda",
    "missing_viewability",
    "geo_mismatch",
    "platform_mismatch",
    "media_type_mismatch",
    "check_active_status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Mobile,
    Desktop,
    Ctv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Banner,
    RichMedia,
    Video,
}

/// Valid name prefixes for a platform. Mobile allows the app/web specific
/// prefixes plus the generic one.
pub fn platform_prefixes(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Mobile => &["MOA_", "MOW_", "MO_"],
        Platform::Desktop => &["DE_"],
        Platform::Ctv => &["CTV_"],
    }
}

pub fn media_type_code(media: MediaType) -> &'static str {
    match media {
        MediaType::Banner => "_BA_",
        MediaType::RichMedia => "_RM_",
        MediaType::Video => "_VI_",
    }
}

/// Parse a brief "Platform/Media Type" string. Slash-separated is the
/// common shape; keyword search covers the rest.
pub fn parse_platform_media(raw: &str) -> (Option<Platform>, Option<MediaType>) {
    let text = raw.trim().to_lowercase();
    if text.is_empty() || text == "n/a" {
        return (None, None);
    }

    let (platform_part, media_part) = match text.split_once('/') {
        Some((p, m)) => (p.to_string(), m.to_string()),
        None => (text.clone(), text.clone()),
    };

    let platform = if platform_part.contains("mobile") {
        Some(Platform::Mobile)
    } else if platform_part.contains("desktop") {
        Some(Platform::Desktop)
    } else if platform_part.contains("ctv") || platform_part.contains("connected tv") {
        Some(Platform::Ctv)
    } else {
        None
    };

    let media = if media_part.contains("rich media") {
        Some(MediaType::RichMedia)
    } else if media_part.contains("banner") {
        Some(MediaType::Banner)
    } else if media_part.contains("video") {
        Some(MediaType::Video)
    } else {
        None
    };

    (platform, media)
}

/// Product-type string to its naming short code. Circular-personalizer
/// variants take precedence over the generic entry.
pub fn product_type_short_code(product_type: &str) -> Option<&'static str> {
    let pt = product_type.trim().to_lowercase();
    if pt.is_empty() {
        return None;
    }
    if pt.contains("price promoter") {
        return Some("CircP_PP");
    }
    if pt.contains("trip driver") {
        return Some("CircP_TD");
    }

    const TABLE: &[(&str, &str)] = &[
        ("all outlet rewards", "AOR"),
        ("ad2ecomm", "A2E"),
        ("ad2survey", "A2S"),
        ("connected tv", "CTV"),
        ("sequential", "SQ"),
        ("volume maximizer", "VMR"),
        ("standard bv", "SBV"),
        ("post campaign measurement", "PCM"),
        ("circular personalizer", "CircP"),
    ];
    for (key, code) in TABLE {
        if pt.contains(key) {
            return Some(code);
        }
    }
    // "BV - Standard" and friends.
    if pt.contains("bv") && pt.contains("standard") {
        return Some("SBV");
    }

    warn!("No short form found for product type: {product_type}");
    None
}

/// A brief may list several products separated by punctuation; each maps to
/// its own required short code.
pub fn split_product_types(raw: &str) -> Vec<String> {
    let mut forms = Vec::new();
    for part in raw.split([';', ',', '|', '/', '+']) {
        if let Some(code) = product_type_short_code(part) {
            if !forms.iter().any(|f| f == code) {
                forms.push(code.to_string());
            }
        }
    }
    forms
}

/// Pull a 0-100 viewability percentage out of free text. Decimals in (0, 1]
/// are fractions; whole numbers up to 100 are already percentages.
pub fn extract_viewability_percentage(raw: &str) -> Option<u32> {
    let input = raw.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(v) = input.parse::<f64>() {
        if v > 0.0 && v <= 1.0 {
            return Some((v * 100.0) as u32);
        }
        if v > 1.0 && v <= 100.0 && v.fract() == 0.0 {
            return Some(v as u32);
        }
    }

    static PCT_RE: OnceLock<Regex> = OnceLock::new();
    let pct_re = PCT_RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").unwrap());
    if let Some(cap) = pct_re.captures(input) {
        if let Ok(p) = cap[1].parse::<u32>() {
            if p <= 100 {
                return Some(p);
            }
        }
    }

    static BARE_RE: OnceLock<Regex> = OnceLock::new();
    let bare_re = BARE_RE.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").unwrap());
    if let Some(cap) = bare_re.captures(input) {
        if let Ok(p) = cap[1].parse::<u32>() {
            if p <= 100 {
                return Some(p);
            }
        }
    }

    warn!("Could not extract percentage from viewability text: {raw}");
    None
}

/// Entity-type-specific naming requirements for one name.
#[derive(Debug, Clone)]
pub enum NameRules<'a> {
    Campaign {
        product_short_forms: &'a [String],
        is_hub: bool,
        is_ifo: bool,
        is_lda_required: bool,
        viewability_perc: Option<u32>,
    },
    LineItem {
        viewability_perc: Option<u32>,
        is_geo_required: Option<bool>,
        platform: Option<Platform>,
        media: Option<MediaType>,
    },
    Creative {
        li_has_geo: bool,
        li_platform_prefix: Option<&'a str>,
        li_platform: Option<Platform>,
        li_media_type_code: Option<&'static str>,
        measurement_type: &'a str,
    },
}

/// Result of checking one name. Booleans are "issue found" flags.
#[derive(Debug, Clone, Default)]
pub struct NameCheckResult {
    pub has_spaces: bool,
    pub has_special_chars: bool,
    pub missing_quarter: bool,
    pub missing_year: bool,
    pub missing_product_type: bool,
    pub missing_hub_ifo: BTreeSet<&'static str>,
    pub missing_lda: bool,
    pub missing_viewability: bool,
    pub geo_mismatch: bool,
    pub platform_mismatch: bool,
    pub media_type_mismatch: bool,
    pub errors: Vec<String>,
}

impl NameCheckResult {
    pub fn has_issues(&self) -> bool {
        self.has_spaces
            || self.has_special_chars
            || self.missing_quarter
            || self.missing_year
            || self.missing_product_type
            || !self.missing_hub_ifo.is_empty()
            || self.missing_lda
            || self.missing_viewability
            || self.geo_mismatch
            || self.platform_mismatch
            || self.media_type_mismatch
    }
}

fn allowed_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_ ]+$").unwrap())
}

fn quarter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_Q[1-4]_").unwrap())
}

fn has_viewability_token(name_upper: &str, perc: u32) -> bool {
    let p = perc.to_string();
    name_upper.contains(&format!("_{p}_VIEWABILITY_"))
        || name_upper.contains(&format!("_{p}VIEWABILITY_"))
        || name_upper.contains(&format!("_{p}_"))
}

/// Check one entity name against its rules. Quarter and year tokens apply
/// to every entity type; the rest is scoped by the rules variant.
pub fn check_name(name: &str, campaign_year: Option<i32>, rules: &NameRules) -> NameCheckResult {
    let mut result = NameCheckResult::default();

    let trimmed = name.trim();
    if trimmed.is_empty() {
        result.errors.push("Name is missing or empty.".to_string());
        result.has_spaces = true;
        return result;
    }
    let name_upper = trimmed.to_uppercase();

    if trimmed.contains(' ') {
        result.has_spaces = true;
        result.errors.push("Name contains spaces.".to_string());
    }

    if !allowed_chars_re().is_match(trimmed) {
        result.has_special_chars = true;
        let invalid: BTreeSet<char> = trimmed
            .chars()
            .filter(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ' '))
            .collect();
        result.errors.push(format!(
            "Name contains invalid characters: {}.",
            invalid.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
        ));
    }

    if !quarter_re().is_match(&name_upper) {
        result.missing_quarter = true;
        result
            .errors
            .push("Name missing Quarter format (e.g., _Q1_).".to_string());
    }

    if let Some(year) = campaign_year {
        let full = format!("_{year}");
        let short = format!("_{:02}", year % 100);
        if !name_upper.contains(&full) && !name_upper.contains(&short) {
            result.missing_year = true;
            result
                .errors
                .push(format!("Name missing Year format (e.g., {full} or {short})."));
        }
    }

    match rules {
        NameRules::Campaign {
            product_short_forms,
            is_hub,
            is_ifo,
            is_lda_required,
            viewability_perc,
        } => {
            if !product_short_forms.is_empty() {
                let found = product_short_forms
                    .iter()
                    .any(|form| name_upper.contains(&format!("_{}_", form.to_uppercase())));
                if !found {
                    result.missing_product_type = true;
                    result.errors.push(format!(
                        "Name missing Product Type code (e.g., _{}_).",
                        product_short_forms.join("_ or _")
                    ));
                }
            }
            if *is_hub && !name_upper.contains("_INFMT_") {
                result.missing_hub_ifo.insert("INFMT");
                result
                    .errors
                    .push("Name missing HUB indicator ('_INFMT_') when required.".to_string());
            }
            if *is_ifo && !name_upper.contains("_IFO_") {
                result.missing_hub_ifo.insert("IFO");
                result
                    .errors
                    .push("Name missing IFO indicator ('_IFO_') when required.".to_string());
            }
            if *is_lda_required && !name_upper.contains("_LDA_") {
                result.missing_lda = true;
                result
                    .errors
                    .push("Name missing LDA indicator ('_LDA_') when required by brief.".to_string());
            }
            if let Some(perc) = viewability_perc {
                if *perc != 0 && !has_viewability_token(&name_upper, *perc) {
                    result.missing_viewability = true;
                    result
                        .errors
                        .push(format!("Campaign Name missing Viewability ({perc}%) indicator."));
                }
            }
        }

        NameRules::LineItem {
            viewability_perc,
            is_geo_required,
            platform,
            media,
        } => {
            if let Some(perc) = viewability_perc {
                if *perc != 0 && !has_viewability_token(&name_upper, *perc) {
                    result.missing_viewability = true;
                    result
                        .errors
                        .push(format!("Line Item Name missing Viewability ({perc}%) indicator."));
                }
            }

            let has_geo = name_upper.contains("_GEO_");
            match is_geo_required {
                Some(true) if !has_geo => {
                    result.geo_mismatch = true;
                    result.errors.push(
                        "Name missing Geo indicator ('_Geo_') but brief requires it.".to_string(),
                    );
                }
                Some(false) if has_geo => {
                    result.geo_mismatch = true;
                    result.errors.push(
                        "Name includes Geo indicator ('_Geo_') but brief does not require it."
                            .to_string(),
                    );
                }
                _ => {}
            }

            if let Some(platform) = platform {
                let prefixes = platform_prefixes(*platform);
                if !prefixes.iter().any(|p| name_upper.starts_with(p)) {
                    result.platform_mismatch = true;
                    result.errors.push(format!(
                        "Name does not start with expected Platform prefix ({}).",
                        prefixes.join(" or ")
                    ));
                }
            }

            if let Some(media) = media {
                let code = media_type_code(*media);
                if !name_upper.contains(code) {
                    result.media_type_mismatch = true;
                    result
                        .errors
                        .push(format!("Name missing expected Media Type code ('{code}')."));
                }
            }
        }

        NameRules::Creative {
            li_has_geo,
            li_platform_prefix,
            li_platform,
            li_media_type_code,
            measurement_type,
        } => {
            let creative_has_geo = name_upper.contains("_GEO_");
            if *li_has_geo && !creative_has_geo {
                result.geo_mismatch = true;
                result.errors.push(
                    "Creative name missing Geo indicator ('_Geo_') expected from Line Item."
                        .to_string(),
                );
            } else if !li_has_geo && creative_has_geo {
                result.geo_mismatch = true;
                result.errors.push(
                    "Creative name has Geo indicator ('_Geo_') but Line Item does not.".to_string(),
                );
            }

            if let Some(prefix) = li_platform_prefix {
                let prefix_upper = prefix.to_uppercase();
                let starts_with_li = name_upper.starts_with(&prefix_upper);
                // Non-HUB mobile creatives are shared across sub-platforms,
                // so the generic MO_ prefix also satisfies the check.
                let non_hub_mobile = *li_platform == Some(Platform::Mobile)
                    && !measurement_type.to_uppercase().contains("HUB");
                let passes = if non_hub_mobile && (prefix_upper == "MOA_" || prefix_upper == "MOW_")
                {
                    starts_with_li || name_upper.starts_with("MO_")
                } else {
                    starts_with_li
                };
                if !passes {
                    result.platform_mismatch = true;
                    result.errors.push(format!(
                        "Creative name does not start with expected Line Item Platform prefix ('{prefix}')."
                    ));
                }
            }

            if let Some(code) = li_media_type_code {
                if !name_upper.contains(code) {
                    result.media_type_mismatch = true;
                    result.errors.push(format!(
                        "Creative name missing expected Line Item Media Type code ('{code}')."
                    ));
                }
            }
        }
    }

    result
}

/// Per-row naming verdict: each check column holds the set of entity tags
/// that failed it (empty set means pass).
#[derive(Debug, Clone, Serialize)]
pub struct NamingRowResult {
    pub line_item_id: u64,
    pub creative_id: Option<u64>,
    pub checks: BTreeMap<&'static str, BTreeSet<&'static str>>,
    pub hub_creative_sharing: bool,
    pub has_issues: bool,
    pub errors: Vec<String>,
}

impl NamingRowResult {
    fn new(line_item_id: u64, creative_id: Option<u64>) -> Self {
        let checks = NAMING_CHECK_COLUMNS
            .iter()
            .map(|col| (*col, BTreeSet::new()))
            .collect();
        Self {
            line_item_id,
            creative_id,
            checks,
            hub_creative_sharing: false,
            has_issues: false,
            errors: Vec::new(),
        }
    }

    fn add(&mut self, column: &'static str, tag: &'static str) {
        if let Some(set) = self.checks.get_mut(column) {
            set.insert(tag);
        }
    }

    fn recompute_has_issues(&mut self) {
        self.has_issues =
            self.checks.values().any(|set| !set.is_empty()) || self.hub_creative_sharing;
    }
}

fn apply_result(row: &mut NamingRowResult, result: &NameCheckResult, tag: &'static str) {
    let flags: &[(&'static str, bool)] = &[
        ("has_spaces", result.has_spaces),
        ("has_special_chars", result.has_special_chars),
        ("missing_quarter", result.missing_quarter),
        ("missing_year", result.missing_year),
        ("missing_product_type", result.missing_product_type),
        ("missing_lda", result.missing_lda),
        ("missing_viewability", result.missing_viewability),
        ("geo_mismatch", result.geo_mismatch),
        ("platform_mismatch", result.platform_mismatch),
        ("media_type_mismatch", result.media_type_mismatch),
    ];
    for (column, failed) in flags {
        if *failed {
            row.add(column, tag);
        }
    }
    // The HUB/IFO column accumulates missing tag names, not entity tags.
    for missing in &result.missing_hub_ifo {
        row.add("missing_hub_ifo_tag", missing);
    }
    row.errors.extend(result.errors.iter().cloned());
}

fn parse_geo_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "y" | "1" => Some(true),
        "no" | "false" | "n" | "0" | "" => Some(false),
        _ => None,
    }
}

pub struct NamingRuleEngine<'a> {
    ctx: &'a BriefContext,
}

impl<'a> NamingRuleEngine<'a> {
    pub fn new(ctx: &'a BriefContext) -> Self {
        Self { ctx }
    }

    /// Evaluate the whole merged table. The HUB creative-sharing check needs
    /// every row, so it runs as a second pass over the accumulated results.
    pub fn evaluate(&self, rows: &[MergedRow]) -> Vec<NamingRowResult> {
        let mut results: Vec<NamingRowResult> =
            rows.iter().map(|row| self.evaluate_row(row)).collect();

        if self.ctx.is_hub {
            self.apply_hub_sharing_check(rows, &mut results);
        }

        for result in &mut results {
            result.recompute_has_issues();
        }
        results
    }

    pub fn evaluate_row(&self, row: &MergedRow) -> NamingRowResult {
        let mut result =
            NamingRowResult::new(row.line_item.id, row.creative.as_ref().map(|c| c.id));
        let year = self.ctx.campaign_year;

        // Campaign name.
        let campaign_name = row.campaign_name().to_string();
        if !campaign_name.is_empty() {
            let rules = NameRules::Campaign {
                product_short_forms: &self.ctx.product_short_forms,
                is_hub: self.ctx.is_hub,
                is_ifo: self.ctx.is_ifo,
                is_lda_required: self.ctx.is_lda_required,
                viewability_perc: self.ctx.viewability_perc,
            };
            let check = check_name(&campaign_name, year, &rules);
            apply_result(&mut result, &check, TAG_CAMPAIGN);
        }

        // Line item name, with platform/media derived from this row's brief
        // context rather than campaign-level fields.
        let (platform, media) = if row.brief_platform_media != NA {
            parse_platform_media(&row.brief_platform_media)
        } else {
            (None, None)
        };
        // An unresolved join leaves the geo flag unknown; neither requiring
        // nor forbidding the tag. Flagged as fail-open in DESIGN.md.
        let geo_required = if row.brief_geo_required == NA {
            None
        } else {
            parse_geo_flag(&row.brief_geo_required)
        };

        let li_name = row.line_item.name.clone();
        if !li_name.is_empty() {
            let rules = NameRules::LineItem {
                viewability_perc: self.ctx.viewability_perc,
                is_geo_required: geo_required,
                platform,
                media,
            };
            let check = check_name(&li_name, year, &rules);
            apply_result(&mut result, &check, TAG_LINE_ITEM);
        }

        // Creative checks compare against what the line item's name actually
        // carries, not against the brief directly.
        if let Some(creative) = &row.creative {
            let li_upper = li_name.to_uppercase();
            let li_has_geo = li_upper.contains("_GEO_");
            let li_prefix = platform
                .map(platform_prefixes)
                .and_then(|prefixes| prefixes.iter().find(|p| li_upper.starts_with(**p)))
                .copied();
            let li_code = media
                .map(media_type_code)
                .filter(|code| li_upper.contains(*code));

            if !creative.name.is_empty() {
                let rules = NameRules::Creative {
                    li_has_geo,
                    li_platform_prefix: li_prefix,
                    li_platform: platform,
                    li_media_type_code: li_code,
                    measurement_type: &self.ctx.measurement_type,
                };
                let check = check_name(&creative.name, year, &rules);
                apply_result(&mut result, &check, TAG_CREATIVE);
            }
        }

        // Pre-launch state: campaign on, line items off, creatives on and
        // secure.
        match &row.campaign {
            Some(c) if c.active => {}
            _ => result.add("check_active_status", TAG_CAMPAIGN),
        }
        if row.line_item.active {
            result.add("check_active_status", TAG_LINE_ITEM);
        }
        if let Some(creative) = &row.creative {
            if !creative.active {
                result.add("check_active_status", TAG_CREATIVE_ACTIVE);
            }
            if creative.secure != Some(1) {
                result.add("check_active_status", TAG_CREATIVE_SECURE);
            }
        }

        result.recompute_has_issues();
        result
    }

    /// A creative shared by more than one line item breaks HUB reporting.
    fn apply_hub_sharing_check(&self, rows: &[MergedRow], results: &mut [NamingRowResult]) {
        let mut line_items_per_creative: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
        for row in rows {
            if let Some(creative) = &row.creative {
                line_items_per_creative
                    .entry(creative.id)
                    .or_default()
                    .insert(row.line_item.id);
            }
        }
        let shared: BTreeSet<u64> = line_items_per_creative
            .into_iter()
            .filter(|(_, line_items)| line_items.len() > 1)
            .map(|(creative_id, _)| creative_id)
            .collect();

        if shared.is_empty() {
            debug!("HUB creative uniqueness check passed");
            return;
        }
        warn!("Found {} creatives shared across multiple line items", shared.len());
        for result in results.iter_mut() {
            if let Some(creative_id) = result.creative_id {
                if shared.contains(&creative_id) {
                    result.hub_creative_sharing = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_short_codes() {
        assert_eq!(product_type_short_code("BV - Standard"), Some("SBV"));
        assert_eq!(product_type_short_code("Standard BV"), Some("SBV"));
        assert_eq!(product_type_short_code("Trip Driver"), Some("CircP_TD"));
        assert_eq!(product_type_short_code("Circular Personalizer"), Some("CircP"));
        assert_eq!(
            product_type_short_code("Circular Personalizer - Price Promoter"),
            Some("CircP_PP")
        );
        assert_eq!(product_type_short_code("Connected TV"), Some("CTV"));
        assert_eq!(product_type_short_code("unheard of"), None);
    }

    #[test]
    fn test_split_product_types() {
        assert_eq!(split_product_types("BV - Standard"), vec!["SBV"]);
        assert_eq!(
            split_product_types("Standard BV; Connected TV"),
            vec!["SBV", "CTV"]
        );
    }

    #[test]
    fn test_viewability_percentage_extraction() {
        assert_eq!(extract_viewability_percentage("80%"), Some(80));
        assert_eq!(extract_viewability_percentage("0.7"), Some(70));
        assert_eq!(extract_viewability_percentage("70"), Some(70));
        assert_eq!(extract_viewability_percentage("goal of 85 %"), Some(85));
        assert_eq!(extract_viewability_percentage("goal is 85"), Some(85));
        assert_eq!(extract_viewability_percentage("none"), None);
    }

    #[test]
    fn test_parse_platform_media() {
        assert_eq!(
            parse_platform_media("Mobile/Banner"),
            (Some(Platform::Mobile), Some(MediaType::Banner))
        );
        assert_eq!(
            parse_platform_media("Desktop/Rich Media"),
            (Some(Platform::Desktop), Some(MediaType::RichMedia))
        );
        assert_eq!(
            parse_platform_media("CTV"),
            (Some(Platform::Ctv), None)
        );
        assert_eq!(parse_platform_media("N/A"), (None, None));
    }

    #[test]
    fn test_campaign_name_checks() {
        let forms = vec!["SBV".to_string()];
        let rules = NameRules::Campaign {
            product_short_forms: &forms,
            is_hub: true,
            is_ifo: false,
            is_lda_required: true,
            viewability_perc: Some(80),
        };

        let good = check_name("Acme_SBV_Q1_2024_INFMT_LDA_80_Push", Some(2024), &rules);
        assert!(!good.has_issues(), "unexpected issues: {:?}", good.errors);

        let bad = check_name("Acme_Q3_2023_Push", Some(2024), &rules);
        assert!(bad.missing_product_type);
        assert!(bad.missing_year);
        assert!(bad.missing_lda);
        assert!(bad.missing_viewability);
        assert_eq!(bad.missing_hub_ifo, BTreeSet::from(["INFMT"]));
    }

    #[test]
    fn test_line_item_geo_is_required_or_forbidden() {
        let rules_required = NameRules::LineItem {
            viewability_perc: None,
            is_geo_required: Some(true),
            platform: Some(Platform::Mobile),
            media: Some(MediaType::Banner),
        };
        let missing = check_name("MOA_SBV_Q1_24_BA_Push", Some(2024), &rules_required);
        assert!(missing.geo_mismatch);

        let rules_forbidden = NameRules::LineItem {
            viewability_perc: None,
            is_geo_required: Some(false),
            platform: Some(Platform::Mobile),
            media: Some(MediaType::Banner),
        };
        let extra = check_name("MOA_SBV_Q1_24_Geo_BA_Push", Some(2024), &rules_forbidden);
        assert!(extra.geo_mismatch);

        let ok = check_name("MOA_SBV_Q1_24_Geo_BA_Push", Some(2024), &rules_required);
        assert!(!ok.geo_mismatch);
        assert!(!ok.platform_mismatch);
        assert!(!ok.media_type_mismatch);
    }

    #[test]
    fn test_creative_non_hub_mobile_accepts_generic_prefix() {
        let rules = NameRules::Creative {
            li_has_geo: false,
            li_platform_prefix: Some("MOA_"),
            li_platform: Some(Platform::Mobile),
            li_media_type_code: Some("_BA_"),
            measurement_type: "Standard",
        };
        let generic = check_name("MO_SBV_Q1_24_BA_300x250", Some(2024), &rules);
        assert!(!generic.platform_mismatch);

        let hub_rules = NameRules::Creative {
            li_has_geo: false,
            li_platform_prefix: Some("MOA_"),
            li_platform: Some(Platform::Mobile),
            li_media_type_code: Some("_BA_"),
            measurement_type: "HUB: Retail",
        };
        let strict = check_name("MO_SBV_Q1_24_BA_300x250", Some(2024), &hub_rules);
        assert!(strict.platform_mismatch);
    }

    #[test]
    fn test_special_characters_and_spaces() {
        let rules = NameRules::LineItem {
            viewability_perc: None,
            is_geo_required: None,
            platform: None,
            media: None,
        };
        let checked = check_name("MOA_SBV Q1-24", Some(2024), &rules);
        assert!(checked.has_spaces);
        assert!(checked.has_special_chars);
    }
}
