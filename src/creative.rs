use crate::reconciler::MergedRow;
use crate::schema::PlatformCreative;
use crate::targeting::RuleVerdict;
use log::debug;
use serde::Serialize;

/// Creative check columns in report order.
pub const CREATIVE_CHECK_COLUMNS: &[&str] = &[
    "Naming Check",
    "Landing Page Check",
    "Technology Vendor Check",
    "Size Check",
    "Video Attributes Check",
    "Addons Check",
    "Secure URLs Check",
    "Dimension In Name Check",
];

/// Click-through tags the platform accepts for each creative type.
const BANNER_ADDONS: &str = "[4]";
const VIDEO_ADDONS: &str = "[7]";

/// The only approved creative technology vendor.
const APPROVED_TECHNOLOGY_VENDOR: &str = "632";

const MOBILE_PREFIXES: &[&str] = &["MOA_", "MOW_", "MO_"];
const MOBILE_SIZES: &[(i64, i64)] = &[(320, 50), (728, 90), (300, 250)];
const DESKTOP_PREFIXES: &[&str] = &["DE_"];
const DESKTOP_SIZES: &[(i64, i64)] = &[(300, 600), (160, 600), (300, 250), (728, 90)];

fn opt(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

fn is_video_type(creative_type: &str) -> bool {
    creative_type.to_lowercase().contains("video")
}

fn is_banner_type(creative_type: &str) -> bool {
    let t = creative_type.to_lowercase();
    t.contains("banner") || t.contains("display")
}

/// A creative's name must embed its line item's name, or failing that the
/// campaign name.
pub fn check_creative_naming(
    creative_name: &str,
    line_item_name: &str,
    campaign_name: &str,
) -> RuleVerdict {
    if creative_name.trim().is_empty() {
        return RuleVerdict::fail("Creative name is missing");
    }
    if line_item_name.trim().is_empty() && campaign_name.trim().is_empty() {
        return RuleVerdict::fail("Both line item name and campaign name are missing");
    }
    let creative_lower = creative_name.to_lowercase();
    if !line_item_name.trim().is_empty()
        && creative_lower.contains(&line_item_name.trim().to_lowercase())
    {
        return RuleVerdict::pass("Creative name contains line item name");
    }
    if !campaign_name.trim().is_empty()
        && creative_lower.contains(&campaign_name.trim().to_lowercase())
    {
        return RuleVerdict::pass("Creative name contains campaign name");
    }
    RuleVerdict::fail(format!(
        "Creative name does not contain either line item or campaign name. Line Item: '{line_item_name}' Campaign: '{campaign_name}' Creative: '{creative_name}'"
    ))
}

fn extract_domain(url: &str) -> String {
    let mut url = url.trim().to_lowercase();
    if let Some((_, rest)) = url.split_once("://") {
        url = rest.to_string();
    }
    if let Some((host, _)) = url.split_once('/') {
        url = host.to_string();
    }
    if let Some((host, _)) = url.split_once('?') {
        url = host.to_string();
    }
    url
}

/// Click URL and landing page URL must land on the same domain. Templates 4
/// and 6 carry no click URL and only need the landing page; tracking and
/// redirect click URLs cannot be matched by domain and are skipped.
pub fn check_landing_page(
    click_url: &str,
    landing_page_url: &str,
    template_id: Option<i64>,
) -> RuleVerdict {
    if matches!(template_id, Some(4) | Some(6)) {
        if landing_page_url.trim().is_empty() {
            return RuleVerdict::fail("Landing page URL is missing for template ID 4 or 6");
        }
        return RuleVerdict::pass("Template only requires a landing page URL");
    }

    if click_url.trim().is_empty() {
        return RuleVerdict::fail("Click URL is missing");
    }
    if landing_page_url.trim().is_empty() {
        return RuleVerdict::fail("Landing page URL is missing");
    }

    let click_lower = click_url.to_lowercase();
    if click_lower.contains("redirect") || click_lower.contains("track") {
        return RuleVerdict::pass("Click URL is a tracking redirect; domain match skipped");
    }

    let click_domain = extract_domain(click_url);
    let landing_domain = extract_domain(landing_page_url);
    if !click_domain.is_empty() && click_domain == landing_domain {
        RuleVerdict::pass("Domains match")
    } else {
        RuleVerdict::fail(format!(
            "Click URL domain and landing page URL domain do not match. Click: '{click_domain}', Landing: '{landing_domain}'"
        ))
    }
}

pub fn check_technology_vendor(vendor_id: &str) -> RuleVerdict {
    if vendor_id.trim().is_empty() {
        return RuleVerdict::fail("Technology vendor ID is missing");
    }
    if vendor_id.trim() == APPROVED_TECHNOLOGY_VENDOR {
        RuleVerdict::pass("Approved technology vendor")
    } else {
        RuleVerdict::fail(format!(
            "Technology vendor ID should be {APPROVED_TECHNOLOGY_VENDOR}, but found '{}'",
            vendor_id.trim()
        ))
    }
}

/// Size must belong to the allow-list the name prefix implies. Video
/// creatives and unprefixed names are out of scope for this check.
pub fn check_size_by_prefix(
    creative_name: &str,
    width: Option<i64>,
    height: Option<i64>,
    creative_type: &str,
) -> RuleVerdict {
    if is_video_type(creative_type) {
        return RuleVerdict::pass("Size check skipped for video creative");
    }
    if creative_name.trim().is_empty() {
        return RuleVerdict::fail("Creative name is missing");
    }
    let (Some(width), Some(height)) = (width, height) else {
        return RuleVerdict::fail("Creative dimensions are missing");
    };

    let name = creative_name.trim();
    for prefix in MOBILE_PREFIXES {
        if name.starts_with(prefix) {
            return RuleVerdict::from_bool(
                MOBILE_SIZES.contains(&(width, height)),
                format!("Mobile size {width}x{height}; allowed: 320x50, 728x90, 300x250"),
            );
        }
    }
    for prefix in DESKTOP_PREFIXES {
        if name.starts_with(prefix) {
            return RuleVerdict::from_bool(
                DESKTOP_SIZES.contains(&(width, height)),
                format!("Desktop size {width}x{height}; allowed: 300x600, 160x600, 300x250, 728x90"),
            );
        }
    }
    RuleVerdict::pass("No prefix match for size validation")
}

/// Video creatives must declare a duration and be non-skippable.
pub fn check_video_attributes(
    creative_type: &str,
    video_duration: &str,
    skippable: &str,
) -> RuleVerdict {
    if !is_video_type(creative_type) {
        return RuleVerdict::pass("Not a video creative");
    }
    let mut issues = Vec::new();
    if video_duration.trim().is_empty() {
        issues.push("Video duration is missing for video creative".to_string());
    }
    if skippable.trim().is_empty() {
        issues.push("Skippable flag is missing for video creative".to_string());
    } else if !skippable.trim().eq_ignore_ascii_case("false") {
        issues.push(format!(
            "Skippable should be 'False' for video creative, found '{}'",
            skippable.trim()
        ));
    }
    if issues.is_empty() {
        RuleVerdict::pass("Valid video attributes")
    } else {
        RuleVerdict::fail(issues.join("; "))
    }
}

pub fn check_addons(creative_type: &str, addons: &str) -> RuleVerdict {
    if creative_type.trim().is_empty() {
        return RuleVerdict::fail("Creative type is missing");
    }
    if addons.trim().is_empty() {
        return RuleVerdict::fail("Creative addons value is missing");
    }
    let addons = addons.trim();
    if is_banner_type(creative_type) {
        RuleVerdict::from_bool(
            addons == BANNER_ADDONS,
            format!("Banner creative should have addons value '{BANNER_ADDONS}', found '{addons}'"),
        )
    } else if is_video_type(creative_type) {
        RuleVerdict::from_bool(
            addons == VIDEO_ADDONS,
            format!("Video creative should have addons value '{VIDEO_ADDONS}', found '{addons}'"),
        )
    } else {
        RuleVerdict::pass("Addons check not applicable for this creative type")
    }
}

/// Every URL-bearing field must be https-only.
pub fn check_secure_urls(creative: &PlatformCreative) -> RuleVerdict {
    let fields: &[(&str, &Option<String>)] = &[
        ("creative_click_url", &creative.click_url),
        ("creative_pixels", &creative.pixels),
        ("creative_scripts", &creative.scripts),
        ("creative_click_trackers", &creative.click_trackers),
        ("creative_content_munge", &creative.content_munge),
        ("landing_page_url", &creative.attributes.landing_page_url),
    ];
    let insecure: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| opt(value).contains("http:"))
        .map(|(name, _)| *name)
        .collect();
    if insecure.is_empty() {
        RuleVerdict::pass("All URLs are secure (https)")
    } else {
        RuleVerdict::fail(format!("Non-secure URLs found in: {}", insecure.join(", ")))
    }
}

/// Banners must carry their WxH dimensions in the name/markup fields; videos
/// must carry their duration as a `_NN` token in the name.
pub fn check_dimension_in_name(creative: &PlatformCreative) -> RuleVerdict {
    let creative_type = opt(&creative.creative_type);

    if is_banner_type(creative_type) {
        let (Some(width), Some(height)) = (creative.width, creative.height) else {
            return RuleVerdict::fail("Missing width or height dimensions for banner creative");
        };
        let pattern = format!("{width}x{height}");
        let pattern_lower = pattern.to_lowercase();

        // Template 4 with celtra markup embeds sizes dynamically; skip the
        // content munge there.
        let skip_munge = creative.template_id == Some(4)
            && opt(&creative.content_munge).contains("celtra.com");

        let mut fields: Vec<(&str, &str)> = vec![("creative_name", creative.name.as_str())];
        if !skip_munge {
            fields.push(("creative_content_munge", opt(&creative.content_munge)));
        }
        fields.push(("creative_thumbnail_url", opt(&creative.thumbnail_url)));

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| !value.to_lowercase().contains(&pattern_lower))
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            RuleVerdict::pass(format!("Banner dimensions {pattern} found in all checked fields"))
        } else {
            RuleVerdict::fail(format!(
                "Banner dimensions {pattern} not found in: {}",
                missing.join(", ")
            ))
        }
    } else if is_video_type(creative_type) {
        let duration = opt(&creative.attributes.video_duration);
        if duration.is_empty() {
            return RuleVerdict::fail("Missing duration for video creative");
        }
        let Ok(duration) = duration.parse::<f64>() else {
            return RuleVerdict::fail(format!("Invalid duration format: {duration}"));
        };
        let token = format!("_{}", duration as i64);
        RuleVerdict::from_bool(
            creative.name.contains(&token),
            format!("Video duration {token} must appear in creative_name"),
        )
    } else {
        RuleVerdict::pass("Not a banner or video creative")
    }
}

/// Per-creative verdict across the whole check battery.
#[derive(Debug, Clone, Serialize)]
pub struct CreativeRowResult {
    pub line_item_id: u64,
    pub creative_id: u64,
    pub checks: Vec<(&'static str, RuleVerdict)>,
    pub has_issues: bool,
}

/// Evaluate every merged row that carries a creative. Rows without one are
/// skipped; the naming engine already covers line-item-only rows.
pub fn evaluate_creatives(rows: &[MergedRow]) -> Vec<CreativeRowResult> {
    let mut results = Vec::new();

    for row in rows {
        let Some(creative) = &row.creative else {
            continue;
        };
        let creative_type = opt(&creative.creative_type);

        let checks: Vec<(&'static str, RuleVerdict)> = vec![
            (
                "Naming Check",
                check_creative_naming(&creative.name, &row.line_item.name, row.campaign_name()),
            ),
            (
                "Landing Page Check",
                check_landing_page(
                    opt(&creative.click_url),
                    opt(&creative.attributes.landing_page_url),
                    creative.template_id,
                ),
            ),
            (
                "Technology Vendor Check",
                check_technology_vendor(opt(&creative.attributes.technology_vendor)),
            ),
            (
                "Size Check",
                check_size_by_prefix(&creative.name, creative.width, creative.height, creative_type),
            ),
            (
                "Video Attributes Check",
                check_video_attributes(
                    creative_type,
                    opt(&creative.attributes.video_duration),
                    opt(&creative.attributes.skippable),
                ),
            ),
            (
                "Addons Check",
                check_addons(creative_type, opt(&creative.attributes.addons)),
            ),
            ("Secure URLs Check", check_secure_urls(creative)),
            ("Dimension In Name Check", check_dimension_in_name(creative)),
        ];

        let has_issues = checks.iter().any(|(_, v)| !v.passed);
        if has_issues {
            debug!("Creative {} has check issues", creative.id);
        }
        results.push(CreativeRowResult {
            line_item_id: row.line_item.id,
            creative_id: creative.id,
            checks,
            has_issues,
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creative_naming_containment() {
        assert!(
            check_creative_naming("MOA_SBV_Q1_24_BA_300x250", "MOA_SBV_Q1_24_BA", "SBV_Q1").passed
        );
        assert!(check_creative_naming("Other_Q1", "MOA_SBV_Q1_24_BA", "SBV_Q1").passed);
        assert!(!check_creative_naming("Nothing_Here", "MOA_SBV_Q1_24_BA", "SBV_Q1").passed);
        assert!(!check_creative_naming("", "MOA_SBV_Q1_24_BA", "").passed);
    }

    #[test]
    fn test_landing_page_domains() {
        assert!(check_landing_page(
            "https://shop.acme.com/promo?id=1",
            "https://shop.acme.com/landing",
            None
        )
        .passed);
        assert!(!check_landing_page(
            "https://shop.acme.com/promo",
            "https://other.example.com",
            None
        )
        .passed);
        // Tracking redirects skip the domain comparison.
        assert!(check_landing_page(
            "https://adclick.tracker.net/redirect?u=x",
            "https://shop.acme.com",
            None
        )
        .passed);
        // Template 4 only needs the landing page.
        assert!(check_landing_page("", "https://shop.acme.com", Some(4)).passed);
        assert!(!check_landing_page("", "", Some(4)).passed);
    }

    #[test]
    fn test_technology_vendor() {
        assert!(check_technology_vendor("632").passed);
        assert!(!check_technology_vendor("631").passed);
        assert!(!check_technology_vendor("").passed);
    }

    #[test]
    fn test_size_by_prefix() {
        assert!(check_size_by_prefix("MOA_x", Some(320), Some(50), "banner").passed);
        assert!(!check_size_by_prefix("MOA_x", Some(300), Some(600), "banner").passed);
        assert!(check_size_by_prefix("DE_x", Some(300), Some(600), "banner").passed);
        assert!(check_size_by_prefix("CTV_x", Some(1), Some(1), "banner").passed);
        assert!(check_size_by_prefix("MOA_x", Some(1), Some(1), "video").passed);
    }

    #[test]
    fn test_video_attributes() {
        assert!(check_video_attributes("video", "15", "False").passed);
        assert!(!check_video_attributes("video", "", "False").passed);
        assert!(!check_video_attributes("video", "15", "True").passed);
        assert!(check_video_attributes("banner", "", "").passed);
    }

    #[test]
    fn test_addons_by_type() {
        assert!(check_addons("banner", "[4]").passed);
        assert!(!check_addons("banner", "[7]").passed);
        assert!(check_addons("video", "[7]").passed);
        assert!(check_addons("native", "[9]").passed);
        assert!(!check_addons("banner", "").passed);
    }

    #[test]
    fn test_secure_urls() {
        let mut creative = sample_creative();
        assert!(check_secure_urls(&creative).passed);
        creative.pixels = Some("http://insecure.example.com/pixel".to_string());
        let verdict = check_secure_urls(&creative);
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("creative_pixels"));
    }

    #[test]
    fn test_dimension_in_name() {
        let creative = sample_creative();
        assert!(check_dimension_in_name(&creative).passed);

        let mut wrong = sample_creative();
        wrong.name = "MOA_SBV_Q1_24_BA".to_string();
        assert!(!check_dimension_in_name(&wrong).passed);

        let mut video = sample_creative();
        video.creative_type = Some("video".to_string());
        video.name = "MOA_SBV_Q1_24_VI_15".to_string();
        video.attributes.video_duration = Some("15".to_string());
        assert!(check_dimension_in_name(&video).passed);
    }

    fn sample_creative() -> PlatformCreative {
        PlatformCreative {
            id: 1000,
            alternative_id: "BVP111222333".to_string(),
            name: "MOA_SBV_Q1_24_BA_300x250".to_string(),
            active: true,
            secure: Some(1),
            template_id: None,
            creative_type: Some("banner".to_string()),
            width: Some(300),
            height: Some(250),
            click_url: Some("https://shop.acme.com/promo".to_string()),
            pixels: None,
            scripts: None,
            click_trackers: None,
            content_munge: Some("<div>300x250</div>".to_string()),
            thumbnail_url: Some("https://cdn.acme.com/300x250.png".to_string()),
            attributes: crate::schema::CreativeAttributes {
                advertiser_category: None,
                landing_page_url: Some("https://shop.acme.com/landing".to_string()),
                technology_vendor: Some("632".to_string()),
                video_duration: None,
                skippable: None,
                addons: Some("[4]".to_string()),
            },
        }
    }
}
