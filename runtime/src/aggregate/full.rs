//! Full cross-target report, seeded from the primary target's evidence.

use crate::aggregate::endpoint::normalize_endpoint;
use crate::aggregate::merge::{
    dedup_by_key, merge_by_key, merge_host_sets, merge_link_sets, merge_or_combine, merge_order,
    merge_storage,
};
use crate::error::{BatchError, Result};
use crate::evidence::{Beacon, Cookie, EvidencePayload, EvidenceRecord, HostSets, LinkSets};
use chrono::{DateTime, Utc};

/// The full report has the same shape as a single evidence payload.
pub type FullReport = EvidencePayload;

/// Wall-clock bounds of the scheduler run, stamped onto the full report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Merge every record into the primary target's payload.
///
/// The seed's own sections are deduplicated first, so the seed takes
/// precedence for every identity key it carries. The other records are
/// merged in target order; arrival order never affects the result.
pub fn build_full_report(
    records: &[EvidenceRecord],
    primary: &str,
    window: &RunWindow,
) -> Result<FullReport> {
    let seed = records
        .iter()
        .find(|r| r.target == primary)
        .ok_or_else(|| BatchError::PrimaryResultMissing(primary.to_string()))?;

    let mut report = seed.payload.clone();
    report.start_time = Some(window.started_at);
    report.end_time = Some(window.finished_at);

    let mut history: Vec<String> = records.iter().map(|r| r.target.clone()).collect();
    history.sort();
    report.browsing_history = history;

    dedup_by_key(&mut report.cookies, Cookie::identity);
    report.beacons = merge_beacons(Vec::new(), std::mem::take(&mut report.beacons));
    for links in report.links.values_mut() {
        dedup_by_key(links, |l| l.identity());
    }
    for hosts in report.hosts.values_mut().flat_map(|parties| parties.values_mut()) {
        dedup_by_key(hosts, |h| h.clone());
    }

    for record in merge_order(records, primary).into_iter().filter(|r| r.target != primary) {
        let other = record.payload.clone();
        merge_link_sets(&mut report.links, other.links);
        merge_by_key(&mut report.cookies, other.cookies, Cookie::identity);
        merge_storage(&mut report.local_storage, other.local_storage);
        report.beacons = merge_beacons(std::mem::take(&mut report.beacons), other.beacons);
        merge_host_sets(&mut report.hosts, other.hosts);
    }

    sort_report(&mut report);
    Ok(report)
}

/// Fold `from` into `into` by normalized endpoint, summing occurrences.
///
/// New entries get the normalized endpoint as `url` and keep the first raw
/// URL seen as `fullUrl`.
pub fn merge_beacons(mut into: Vec<Beacon>, from: Vec<Beacon>) -> Vec<Beacon> {
    let normalized = from.into_iter().map(|mut beacon| {
        let endpoint = normalize_endpoint(&beacon.url);
        let raw = std::mem::replace(&mut beacon.url, endpoint);
        beacon.full_url.get_or_insert(raw);
        beacon
    });

    merge_or_combine(
        &mut into,
        normalized,
        |b| b.url.clone(),
        |existing, new| existing.occurrances += new.occurrances,
    );
    into
}

fn sort_report(report: &mut FullReport) {
    sort_links(&mut report.links);
    report
        .cookies
        .sort_by(|a, b| (&a.domain, &a.name, &a.path).cmp(&(&b.domain, &b.name, &b.path)));
    report.beacons.sort_by(|a, b| a.url.cmp(&b.url));
    sort_hosts(&mut report.hosts);
}

fn sort_links(links: &mut LinkSets) {
    for list in links.values_mut() {
        list.sort_by(|a, b| a.href.cmp(&b.href));
    }
}

fn sort_hosts(hosts: &mut HostSets) {
    for list in hosts.values_mut().flat_map(|parties| parties.values_mut()) {
        list.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(target: &str, payload: serde_json::Value) -> EvidenceRecord {
        EvidenceRecord::new(target, serde_json::from_value(payload).unwrap())
    }

    fn window() -> RunWindow {
        let t = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        RunWindow {
            started_at: t,
            finished_at: t,
        }
    }

    #[test]
    fn test_primary_missing() {
        let records = vec![record("https://b.example/", json!({}))];
        let err = build_full_report(&records, "https://a.example/", &window()).unwrap_err();
        assert!(matches!(err, BatchError::PrimaryResultMissing(t) if t == "https://a.example/"));
    }

    #[test]
    fn test_primary_cookie_takes_precedence() {
        let records = vec![
            record(
                "https://b.example/",
                json!({"cookies": [{"name": "sid", "domain": "a.example", "path": "/", "session": false, "expiresDays": 30}]}),
            ),
            record(
                "https://a.example/",
                json!({"cookies": [{"name": "sid", "domain": "a.example", "path": "/", "session": true}]}),
            ),
        ];

        let report = build_full_report(&records, "https://a.example/", &window()).unwrap();
        assert_eq!(report.cookies.len(), 1);
        assert!(report.cookies[0].session);
        assert!(report.cookies[0].expires_days.is_none());
    }

    #[test]
    fn test_beacon_occurrences_summed() {
        let records = vec![
            record(
                "https://a.example/",
                json!({"beacons": [{"url": "https://cdn.example/px?x=1", "occurrances": 2}]}),
            ),
            record(
                "https://b.example/",
                json!({"beacons": [{"url": "https://cdn.example/px?x=2", "occurrances": 3}]}),
            ),
        ];

        let report = build_full_report(&records, "https://a.example/", &window()).unwrap();
        assert_eq!(report.beacons.len(), 1);
        let beacon = &report.beacons[0];
        assert_eq!(beacon.url, "https://cdn.example/px");
        assert_eq!(beacon.full_url.as_deref(), Some("https://cdn.example/px?x=1"));
        assert_eq!(beacon.occurrances, 5);
    }

    #[test]
    fn test_sections_sorted_and_history_recorded() {
        let records = vec![
            record(
                "https://b.example/",
                json!({
                    "cookies": [{"name": "z", "domain": "a.example", "path": "/"}],
                    "links": {"firstParty": [{"href": "https://a.example/0"}]},
                    "hosts": {"requests": {"thirdParty": ["b.example"]}},
                    "localStorage": {"https://a.example": {"b": 1, "a": 2}}
                }),
            ),
            record(
                "https://a.example/",
                json!({
                    "cookies": [
                        {"name": "y", "domain": "b.example", "path": "/"},
                        {"name": "a", "domain": "b.example", "path": "/"}
                    ],
                    "links": {"firstParty": [{"href": "https://a.example/z"}]},
                    "hosts": {"requests": {"thirdParty": ["z.example"]}},
                    "uri_ins": "https://a.example/"
                }),
            ),
        ];

        let report = build_full_report(&records, "https://a.example/", &window()).unwrap();
        let cookies: Vec<_> = report
            .cookies
            .iter()
            .map(|c| (c.domain.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            cookies,
            vec![("a.example", "z"), ("b.example", "a"), ("b.example", "y")]
        );
        assert_eq!(report.links["firstParty"][0].href, "https://a.example/0");
        assert_eq!(
            report.hosts["requests"]["thirdParty"],
            vec!["b.example", "z.example"]
        );
        let keys: Vec<_> = report.local_storage["https://a.example"].keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(
            report.browsing_history,
            vec!["https://a.example/", "https://b.example/"]
        );
        assert_eq!(report.extra["uri_ins"], json!("https://a.example/"));
        assert_eq!(report.start_time, Some(window().started_at));
    }

    #[test]
    fn test_aggregation_is_order_independent_for_keys() {
        let a = record(
            "https://a.example/",
            json!({"beacons": [{"url": "https://t.example/p", "occurrances": 1}]}),
        );
        let b = record(
            "https://b.example/",
            json!({"beacons": [{"url": "https://t.example/q", "occurrances": 1}]}),
        );
        let c = record(
            "https://c.example/",
            json!({"beacons": [{"url": "https://t.example/p/", "occurrances": 4}]}),
        );

        let one = build_full_report(&[a.clone(), b.clone(), c.clone()], "https://a.example/", &window())
            .unwrap();
        let two = build_full_report(&[c, b, a], "https://a.example/", &window()).unwrap();
        assert_eq!(
            serde_json::to_string(&one).unwrap(),
            serde_json::to_string(&two).unwrap()
        );
        assert_eq!(one.beacons[0].occurrances, 5);
    }
}
