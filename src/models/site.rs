use serde::{Deserialize, Serialize};

pub type SiteId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub host: String,
    pub settings: SiteSettings,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Client IPs whose hits are accepted but never recorded
    #[serde(default)]
    pub ignore_ips: Vec<String>,
    #[serde(default)]
    pub collect: Collect,
}

/// Per-site collection toggles for optional enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collect {
    #[serde(default = "enabled")]
    pub location: bool,
    /// Keep the subdivision part of the location (`US-CA` rather than `US`)
    #[serde(default = "enabled")]
    pub location_region: bool,
    #[serde(default = "enabled")]
    pub language: bool,
}

const fn enabled() -> bool {
    true
}

impl Default for Collect {
    fn default() -> Self {
        Self {
            location: true,
            location_region: true,
            language: true,
        }
    }
}

impl SiteSettings {
    /// Return the ignore rule matching `ip`, compared as exact strings
    pub fn ignored_ip(&self, ip: &str) -> Option<&str> {
        self.ignore_ips
            .iter()
            .find(|rule| rule.as_str() == ip)
            .map(String::as_str)
    }
}
