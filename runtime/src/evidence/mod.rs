//! Evidence records produced by the collection tool.
//!
//! Only the sections the aggregation engine merges are typed. Everything
//! else the tool emits rides along in `extra` so a report seeded from a
//! payload keeps it verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Storage entries: origin -> key -> stored value.
pub type StorageMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Link sets keyed by category (`firstParty`, `thirdParty`, ...).
pub type LinkSets = BTreeMap<String, Vec<Link>>;

/// Host sets keyed by category, then party.
pub type HostSets = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Evidence gathered for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    #[serde(rename = "url")]
    pub target: String,
    #[serde(rename = "results")]
    pub payload: EvidencePayload,
}

impl EvidenceRecord {
    pub fn new(target: impl Into<String>, payload: EvidencePayload) -> Self {
        Self {
            target: target.into(),
            payload,
        }
    }
}

/// Structured output of one collector run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub browsing_history: Vec<String>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default, rename = "localStorage")]
    pub local_storage: StorageMap,
    #[serde(default)]
    pub beacons: Vec<Beacon>,
    #[serde(default)]
    pub links: LinkSets,
    #[serde(default)]
    pub hosts: HostSets,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub session: bool,
    #[serde(default, rename = "expiresDays", skip_serializing_if = "Option::is_none")]
    pub expires_days: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `(name, domain, path)`.
pub type CookieKey = (String, String, String);

impl Cookie {
    /// Cookies are the same cookie when name, domain and path agree.
    pub fn identity(&self) -> CookieKey {
        (self.name.clone(), self.domain.clone(), self.path.clone())
    }
}

/// An outbound tracking request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub url: String,
    #[serde(default, rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    // Spelled the way the collector spells it.
    #[serde(default)]
    pub occurrances: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Link {
    pub fn identity(&self) -> String {
        self.href.clone()
    }
}
