//! Sovereign cloud endpoint table.
//!
//! Every known cloud maps to exactly one Resource Graph API base URL and one
//! portal URL. Lookups are exact: unknown identifiers are an error, never a
//! fallback to the public cloud.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sovereign Azure cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudEnvironment {
    Public,
    China,
    UsGovernment,
    Germany,
}

struct CloudEndpoints {
    cloud: CloudEnvironment,
    /// Accepted identifiers; the first is canonical.
    ids: &'static [&'static str],
    api_url: &'static str,
    portal_url: &'static str,
}

const CLOUDS: &[CloudEndpoints] = &[
    CloudEndpoints {
        cloud: CloudEnvironment::Public,
        ids: &["public", "AzureCloud"],
        api_url: "https://management.azure.com",
        portal_url: "https://portal.azure.com",
    },
    CloudEndpoints {
        cloud: CloudEnvironment::China,
        ids: &["china", "AzureChinaCloud"],
        api_url: "https://management.chinacloudapi.cn",
        portal_url: "https://portal.azure.cn",
    },
    CloudEndpoints {
        cloud: CloudEnvironment::UsGovernment,
        ids: &["us-government", "AzureUSGovernment"],
        api_url: "https://management.usgovcloudapi.net",
        portal_url: "https://portal.azure.us",
    },
    CloudEndpoints {
        cloud: CloudEnvironment::Germany,
        ids: &["germany", "AzureGermanCloud"],
        api_url: "https://management.microsoftazure.de",
        portal_url: "https://portal.microsoftazure.de",
    },
];

impl CloudEnvironment {
    pub const ALL: [CloudEnvironment; 4] = [
        CloudEnvironment::Public,
        CloudEnvironment::China,
        CloudEnvironment::UsGovernment,
        CloudEnvironment::Germany,
    ];

    fn endpoints(self) -> &'static CloudEndpoints {
        // CLOUDS is ordered like the enum.
        match self {
            CloudEnvironment::Public => &CLOUDS[0],
            CloudEnvironment::China => &CLOUDS[1],
            CloudEnvironment::UsGovernment => &CLOUDS[2],
            CloudEnvironment::Germany => &CLOUDS[3],
        }
    }

    /// Canonical identifier, e.g. `us-government`.
    pub fn id(self) -> &'static str {
        self.endpoints().ids[0]
    }

    /// Resource Graph API base URL.
    pub fn api_url(self) -> &'static str {
        self.endpoints().api_url
    }

    /// Portal base URL.
    pub fn portal_url(self) -> &'static str {
        self.endpoints().portal_url
    }
}

impl FromStr for CloudEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CLOUDS
            .iter()
            .find(|e| e.ids.contains(&s))
            .map(|e| e.cloud)
            .ok_or_else(|| Error::UnsupportedCloud(s.to_string()))
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Resolve the portal URL for a cloud identifier.
pub fn portal_url(cloud_id: &str) -> Result<&'static str> {
    cloud_id.parse::<CloudEnvironment>().map(CloudEnvironment::portal_url)
}

/// Resolve the Resource Graph API base URL for a cloud identifier.
pub fn api_url(cloud_id: &str) -> Result<&'static str> {
    cloud_id.parse::<CloudEnvironment>().map(CloudEnvironment::api_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_urls() {
        let expected = [
            ("public", "https://portal.azure.com"),
            ("china", "https://portal.azure.cn"),
            ("us-government", "https://portal.azure.us"),
            ("germany", "https://portal.microsoftazure.de"),
        ];
        for (cloud, url) in expected {
            assert_eq!(portal_url(cloud).unwrap(), url, "portal for {cloud}");
        }
    }

    #[test]
    fn test_settings_style_ids_resolve() {
        assert_eq!(portal_url("AzureCloud").unwrap(), "https://portal.azure.com");
        assert_eq!(portal_url("AzureChinaCloud").unwrap(), "https://portal.azure.cn");
        assert_eq!(
            portal_url("AzureUSGovernment").unwrap(),
            "https://portal.azure.us"
        );
        assert_eq!(
            portal_url("AzureGermanCloud").unwrap(),
            "https://portal.microsoftazure.de"
        );
    }

    #[test]
    fn test_unknown_cloud_is_an_error() {
        for bad in ["", "Public", "azure", "public ", "mars"] {
            match portal_url(bad) {
                Err(Error::UnsupportedCloud(id)) => assert_eq!(id, bad),
                other => panic!("expected UnsupportedCloud for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_api_urls() {
        assert_eq!(api_url("public").unwrap(), "https://management.azure.com");
        assert_eq!(
            api_url("china").unwrap(),
            "https://management.chinacloudapi.cn"
        );
        assert!(api_url("nowhere").is_err());
    }

    #[test]
    fn test_every_variant_round_trips_through_its_id() {
        for cloud in CloudEnvironment::ALL {
            assert_eq!(cloud.id().parse::<CloudEnvironment>().unwrap(), cloud);
            assert_eq!(cloud.to_string(), cloud.id());
        }
    }
}
