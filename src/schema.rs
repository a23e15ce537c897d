use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Advertiser record from the platform feed. Only the fields the engines
/// consume are modeled; everything else stays with the fetch layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformAdvertiser {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformCampaign {
    pub id: u64,

    /// Parent advertiser; resolves the Campaign→Advertiser hop.
    pub advertiser_id: u64,

    #[schemars(description = "Brief-facing business key, format BVI followed by ten digits")]
    pub alternative_id: String,

    pub name: String,
    pub active: bool,

    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub budget_type: Option<String>,

    #[serde(default)]
    #[schemars(description = "Raw impressions-budget blob, e.g. {\"lifetime\": 1200000, \"daily\": None}")]
    pub impressions_budget: Option<String>,
}

/// Line-item delivery and bidding settings, as flat strings the way the
/// platform export serializes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DeliverySettings {
    pub programmatic_guaranteed: Option<String>,
    pub budget_type: Option<String>,
    pub daily_budget: Option<String>,
    pub bidding_strategy: Option<String>,
    pub pacing: Option<String>,
    pub pacing_behavior: Option<String>,
    pub multiplier: Option<String>,
    pub catchup_behavior: Option<String>,

    #[schemars(description = "Raw bidding-value blob, e.g. {\"cpm_bid\": 2.40}")]
    pub bidding_values: Option<String>,

    pub bid_shading: Option<String>,
    pub use_custom_bidding_agent: Option<String>,
    pub frequency_cap_id_type: Option<String>,
    pub frequency_duration: Option<String>,
    pub use_fallback: Option<String>,
}

/// The slice of a line item's targeting profile the rule battery inspects.
/// All list-valued fields are `;`-separated strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TargetingProfile {
    pub include_country: Option<String>,
    pub exclude_app_bundle_list: Option<String>,
    pub exclude_domain_list_id: Option<String>,
    pub include_environment_type: Option<String>,
    pub include_operating_system: Option<String>,
    pub include_device_type: Option<String>,
    pub include_segment: Option<String>,
    pub exclude_inventory_source: Option<String>,
    pub include_deal_id_list: Option<String>,
    pub exclude_content_category: Option<String>,
    pub exclude_app_name: Option<String>,
    pub include_video_placement_type: Option<String>,
    pub include_lat_long_list: Option<String>,
    pub exclude_lat_long_list: Option<String>,
    pub include_metro: Option<String>,
    pub exclude_metro: Option<String>,
    pub include_region: Option<String>,
    pub exclude_region: Option<String>,
    pub include_zip_code_list: Option<String>,
    pub exclude_zip_code_list: Option<String>,

    #[schemars(description = "Attached creatives in the export format (id;\"\";\"\";weight)")]
    pub creatives: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformLineItem {
    pub id: u64,

    /// Parent campaign; resolves the LineItem→Campaign hop.
    pub campaign_id: u64,

    #[schemars(description = "Brief-facing business key, format BVT followed by nine digits")]
    pub alternative_id: String,

    pub name: String,
    pub active: bool,

    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub budget: Option<f64>,

    #[serde(default)]
    pub delivery: DeliverySettings,

    #[serde(default)]
    pub targeting: TargetingProfile,
}

/// Attributes extracted from the creative's free-form attributes blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CreativeAttributes {
    pub advertiser_category: Option<String>,
    pub landing_page_url: Option<String>,
    pub technology_vendor: Option<String>,
    pub video_duration: Option<String>,
    pub skippable: Option<String>,
    pub addons: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformCreative {
    pub id: u64,

    #[schemars(description = "Brief-facing business key, format BVP followed by nine digits")]
    pub alternative_id: String,

    pub name: String,
    pub active: bool,

    #[serde(default)]
    #[schemars(description = "Secure flag; 1 means the creative serves over https only")]
    pub secure: Option<i64>,

    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub creative_type: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,

    #[serde(default)]
    pub click_url: Option<String>,
    #[serde(default)]
    pub pixels: Option<String>,
    #[serde(default)]
    pub scripts: Option<String>,
    #[serde(default)]
    pub click_trackers: Option<String>,
    #[serde(default)]
    pub content_munge: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub attributes: CreativeAttributes,
}

/// One immutable snapshot of the platform hierarchy, fetched by the external
/// API layer before a run. The engines never mutate it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlatformSnapshot {
    #[serde(default)]
    pub advertisers: Vec<PlatformAdvertiser>,
    pub campaigns: Vec<PlatformCampaign>,
    pub line_items: Vec<PlatformLineItem>,
    #[serde(default)]
    pub creatives: Vec<PlatformCreative>,

    #[serde(default)]
    #[schemars(description = "Creative ids attached to each line item id")]
    pub line_item_creatives: BTreeMap<u64, Vec<u64>>,
}

impl PlatformSnapshot {
    pub fn advertiser(&self, id: u64) -> Option<&PlatformAdvertiser> {
        self.advertisers.iter().find(|a| a.id == id)
    }

    pub fn campaign(&self, id: u64) -> Option<&PlatformCampaign> {
        self.campaigns.iter().find(|c| c.id == id)
    }

    pub fn creative(&self, id: u64) -> Option<&PlatformCreative> {
        self.creatives.iter().find(|c| c.id == id)
    }

    pub fn creatives_for_line_item(&self, line_item_id: u64) -> Vec<&PlatformCreative> {
        self.line_item_creatives
            .get(&line_item_id)
            .map(|ids| ids.iter().filter_map(|id| self.creative(*id)).collect())
            .unwrap_or_default()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PlatformSnapshot)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = PlatformSnapshot::schema_as_json().unwrap();
        assert!(schema_json.contains("line_items"));
        assert!(schema_json.contains("alternative_id"));
        assert!(schema_json.contains("line_item_creatives"));
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{
            "campaigns": [{
                "id": 10, "advertiser_id": 1, "alternative_id": "BVI0123456789",
                "name": "MOA_SBV_Q1_24", "active": true
            }],
            "line_items": [{
                "id": 100, "campaign_id": 10, "alternative_id": "BVT123456789",
                "name": "MOA_SBV_Q1_24_Geo_BA", "active": false
            }]
        }"#;
        let snapshot: PlatformSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.line_items.len(), 1);
        assert!(snapshot.line_items[0].targeting.include_country.is_none());
        assert!(snapshot.creatives_for_line_item(100).is_empty());
        assert_eq!(snapshot.campaign(10).unwrap().advertiser_id, 1);
    }
}
