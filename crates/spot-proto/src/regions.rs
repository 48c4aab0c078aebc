//! Region classification and display names.

use serde::{Deserialize, Serialize};

/// Geographic bucket used for traffic accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geography {
    /// Mainland China.
    Domestic,
    /// Everything else, including Hong Kong.
    International,
}

impl std::fmt::Display for Geography {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domestic => write!(f, "Mainland China"),
            Self::International => write!(f, "Outside Mainland China"),
        }
    }
}

/// Known mainland regions, including the finance zones.
pub const DOMESTIC_REGIONS: &[&str] = &[
    "cn-qingdao",
    "cn-beijing",
    "cn-zhangjiakou",
    "cn-huhehaote",
    "cn-wulanchabu",
    "cn-hangzhou",
    "cn-shanghai",
    "cn-nanjing",
    "cn-fuzhou",
    "cn-shenzhen",
    "cn-heyuan",
    "cn-guangzhou",
    "cn-chengdu",
    "cn-nanjing-finance",
    "cn-shanghai-finance-1",
    "cn-shenzhen-finance-1",
];

const DOMESTIC_PREFIX: &str = "cn-";

/// Shares the `cn-` prefix but is billed as international traffic.
pub const HONG_KONG: &str = "cn-hongkong";

/// Classify a region: the explicit list, then any `cn-` region except Hong Kong.
pub fn classify_region(region_id: &str) -> Geography {
    if DOMESTIC_REGIONS.contains(&region_id) {
        return Geography::Domestic;
    }
    if region_id.starts_with(DOMESTIC_PREFIX) && region_id != HONG_KONG {
        return Geography::Domestic;
    }
    Geography::International
}

/// Human-friendly region name; unknown identifiers are returned unchanged.
pub fn region_display_name(region_id: &str) -> &str {
    match region_id {
        "cn-qingdao" => "Qingdao",
        "cn-beijing" => "Beijing",
        "cn-zhangjiakou" => "Zhangjiakou",
        "cn-huhehaote" => "Hohhot",
        "cn-wulanchabu" => "Ulanqab",
        "cn-hangzhou" => "Hangzhou",
        "cn-shanghai" => "Shanghai",
        "cn-nanjing" => "Nanjing",
        "cn-fuzhou" => "Fuzhou",
        "cn-shenzhen" => "Shenzhen",
        "cn-heyuan" => "Heyuan",
        "cn-guangzhou" => "Guangzhou",
        "cn-chengdu" => "Chengdu",
        "cn-hongkong" => "Hong Kong",
        "ap-northeast-1" => "Japan (Tokyo)",
        "ap-northeast-2" => "South Korea (Seoul)",
        "ap-southeast-1" => "Singapore",
        "ap-southeast-2" => "Australia (Sydney)",
        "ap-southeast-3" => "Malaysia (Kuala Lumpur)",
        "ap-southeast-5" => "Indonesia (Jakarta)",
        "ap-southeast-6" => "Philippines (Manila)",
        "ap-southeast-7" => "Thailand (Bangkok)",
        "ap-south-1" => "India (Mumbai)",
        "us-east-1" => "US (Virginia)",
        "us-west-1" => "US (Silicon Valley)",
        "eu-west-1" => "UK (London)",
        "eu-central-1" => "Germany (Frankfurt)",
        "me-east-1" => "UAE (Dubai)",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hong_kong_is_international() {
        assert_eq!(classify_region("cn-hongkong"), Geography::International);
    }

    #[test]
    fn test_every_listed_region_is_domestic() {
        for region in DOMESTIC_REGIONS {
            assert_eq!(classify_region(region), Geography::Domestic, "{region}");
        }
    }

    #[test]
    fn test_unlisted_cn_prefix_is_domestic() {
        assert_eq!(classify_region("cn-wuhan-lr"), Geography::Domestic);
        assert_eq!(classify_region("cn-hongkong-2"), Geography::Domestic);
    }

    #[test]
    fn test_other_prefixes_are_international() {
        assert_eq!(classify_region("ap-southeast-1"), Geography::International);
        assert_eq!(classify_region("us-west-1"), Geography::International);
        assert_eq!(classify_region("cn"), Geography::International);
        assert_eq!(classify_region(""), Geography::International);
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(region_display_name("cn-hongkong"), "Hong Kong");
        assert_eq!(region_display_name("ap-southeast-1"), "Singapore");
        assert_eq!(region_display_name("xx-nowhere-9"), "xx-nowhere-9");
    }
}
