use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Canonical join key: trimmed and case-folded. All alternate-id joins go
/// through this so `BVT123` and ` bvt123 ` land on the same key.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Collapse numeric strings to a canonical form: `"174.0"` becomes `"174"`,
/// non-numeric tokens are trimmed and lowercased as-is.
pub fn normalize_numeric_token(raw: &str) -> String {
    let token = raw.trim().to_lowercase();
    match token.parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", n as i64)
            } else {
                format!("{}", n)
            }
        }
        _ => token,
    }
}

/// True for values that count as "nothing configured": empty, whitespace,
/// or the literal artifacts a spreadsheet round-trip leaves behind.
pub fn is_effectively_empty(raw: &str) -> bool {
    let v = raw.trim();
    v.is_empty() || v.eq_ignore_ascii_case("nan") || v == "-" || v == "None"
}

/// Split a `;`-separated list into normalized tokens, dropping empties.
pub fn normalize_list(raw: &str) -> BTreeSet<String> {
    if is_effectively_empty(raw) {
        return BTreeSet::new();
    }
    raw.split(';')
        .map(normalize_numeric_token)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Order-independent list equality after numeric-string normalization.
/// `compare_lists("174;1351", "1351.0;174") == true`.
pub fn compare_lists(actual: &str, expected: &str) -> bool {
    normalize_list(actual) == normalize_list(expected)
}

fn campaign_alt_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^BVI\d{10}$").unwrap())
}

fn line_item_alt_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^BVT\d{9}$").unwrap())
}

fn creative_alt_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^BVP\d{9}$").unwrap())
}

fn bvt_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^BVT\d+").unwrap())
}

/// Campaign alternate ids embed a `BVI` code with ten digits.
pub fn is_campaign_alt_id(raw: &str) -> bool {
    campaign_alt_id_re().is_match(raw.trim())
}

/// Line-item ("target") alternate ids embed a `BVT` code with nine digits.
pub fn is_line_item_alt_id(raw: &str) -> bool {
    line_item_alt_id_re().is_match(raw.trim())
}

/// Creative ("placement") alternate ids embed a `BVP` code with nine digits.
pub fn is_creative_alt_id(raw: &str) -> bool {
    creative_alt_id_re().is_match(raw.trim())
}

/// Looser check used when harvesting BVT→BVP pairs from the brief, where
/// trailing digits vary but the prefix is trustworthy.
pub fn looks_like_bvt(raw: &str) -> bool {
    bvt_prefix_re().is_match(raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_token_normalization() {
        assert_eq!(normalize_numeric_token("174.0"), "174");
        assert_eq!(normalize_numeric_token("174"), "174");
        assert_eq!(normalize_numeric_token("2.5"), "2.5");
        assert_eq!(normalize_numeric_token(" Android "), "android");
    }

    #[test]
    fn test_compare_lists_order_independent() {
        assert!(compare_lists("174;1351", "1351;174"));
        assert!(compare_lists("174.0", "174"));
        assert!(compare_lists("", ""));
        assert!(compare_lists("nan", ""));
        assert!(!compare_lists("174", "174;1351"));
        assert!(compare_lists("Android;iOS", "ios;android"));
    }

    #[test]
    fn test_effectively_empty() {
        assert!(is_effectively_empty(""));
        assert!(is_effectively_empty("  "));
        assert!(is_effectively_empty("NaN"));
        assert!(is_effectively_empty("-"));
        assert!(is_effectively_empty("None"));
        assert!(!is_effectively_empty("0"));
    }

    #[test]
    fn test_alternate_id_formats() {
        assert!(is_campaign_alt_id("BVI0123456789"));
        assert!(!is_campaign_alt_id("BVI123"));
        assert!(is_line_item_alt_id("BVT123456789"));
        assert!(!is_line_item_alt_id("BVT1234567890"));
        assert!(is_creative_alt_id("BVP987654321"));
        assert!(looks_like_bvt(" bvt42 "));
        assert!(!looks_like_bvt("BVP42"));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  BVT123456789  "), "bvt123456789");
    }
}
