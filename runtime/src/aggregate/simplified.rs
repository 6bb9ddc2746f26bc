//! Simplified report: cookies, storage keys and beacon endpoints only.

use crate::aggregate::endpoint::normalize_endpoint;
use crate::aggregate::merge::{merge_by_key, merge_order};
use crate::evidence::{Cookie, EvidenceRecord};
use serde::{Serialize, Serializer};
use serde_json::Number;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimplifiedReport {
    pub cookies: Vec<CookieSummary>,
    #[serde(rename = "localStorage")]
    pub local_storage: Vec<StorageKey>,
    pub beacons: Vec<BeaconEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CookieSummary {
    pub name: String,
    pub domain: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<CookieExpiry>,
}

/// Either a session cookie or a lifetime in days.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieExpiry {
    Session,
    Days(Number),
}

impl Serialize for CookieExpiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CookieExpiry::Session => serializer.serialize_str("session"),
            CookieExpiry::Days(days) => days.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageKey {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeaconEndpoint {
    pub url: String,
}

impl From<&Cookie> for CookieSummary {
    fn from(cookie: &Cookie) -> Self {
        let expires = if cookie.session {
            Some(CookieExpiry::Session)
        } else {
            cookie.expires_days.clone().map(CookieExpiry::Days)
        };
        Self {
            name: cookie.name.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires,
        }
    }
}

/// Summarize every record, the primary included.
///
/// Storage keys lose their origin and beacons lose their counts. On a
/// cookie collision the primary's attributes win, then the lowest target.
pub fn build_simplified_report(records: &[EvidenceRecord], primary: &str) -> SimplifiedReport {
    let mut report = SimplifiedReport::default();

    for record in merge_order(records, primary) {
        let payload = &record.payload;

        merge_by_key(
            &mut report.cookies,
            payload.cookies.iter().map(CookieSummary::from),
            |c| (c.name.clone(), c.domain.clone(), c.path.clone()),
        );

        let keys = payload
            .local_storage
            .values()
            .flat_map(|entries| entries.keys())
            .map(|key| StorageKey { key: key.clone() });
        merge_by_key(&mut report.local_storage, keys, |s| s.key.clone());

        let endpoints = payload.beacons.iter().map(|b| BeaconEndpoint {
            url: normalize_endpoint(&b.url),
        });
        merge_by_key(&mut report.beacons, endpoints, |b| b.url.clone());
    }

    report
        .cookies
        .sort_by(|a, b| (&a.domain, &a.name, &a.path).cmp(&(&b.domain, &b.name, &b.path)));
    report.local_storage.sort_by(|a, b| a.key.cmp(&b.key));
    report.beacons.sort_by(|a, b| a.url.cmp(&b.url));
    report
}
