use assert_json_diff::{assert_json_eq, assert_json_include};
use async_trait::async_trait;
use evidence_batch::aggregate::build_full_report;
use evidence_batch::collector::Collector;
use evidence_batch::config::ConfigFile;
use evidence_batch::evidence::EvidencePayload;
use evidence_batch::pool::Scheduler;
use evidence_batch::targets::{TargetList, TargetResolver};
use evidence_batch::{BatchRunner, ToolInvocationError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Panics on one target, answers an empty payload everywhere else.
struct CrashOn(&'static str);

#[async_trait]
impl Collector for CrashOn {
    async fn collect(&self, target: &str) -> Result<EvidencePayload, ToolInvocationError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if target == self.0 {
            panic!("collector crashed on {target}");
        }
        Ok(EvidencePayload::default())
    }
}

/// Canned evidence for a small two-page site.
struct Site;

#[async_trait]
impl Collector for Site {
    async fn collect(&self, target: &str) -> Result<EvidencePayload, ToolInvocationError> {
        let payload = match target {
            "https://a.example/" => json!({
                "uri_ins": target,
                "cookies": [{"name": "sid", "domain": "a.example", "path": "/", "session": true}],
                "localStorage": {"https://a.example": {"theme": {"value": "dark"}}},
                "beacons": [{"url": "https://t.example/collect?id=1", "occurrances": 2}],
                "links": {"firstParty": [{"href": "https://a.example/b"}]},
                "hosts": {"requests": {"firstParty": ["a.example"], "thirdParty": ["t.example"]}}
            }),
            "https://a.example/b" => json!({
                "uri_ins": target,
                "cookies": [
                    {"name": "sid", "domain": "a.example", "path": "/", "session": true, "httpOnly": true},
                    {"name": "_ga", "domain": ".a.example", "path": "/", "session": false, "expiresDays": 365}
                ],
                "localStorage": {"https://a.example": {"consent": {"value": "1"}}},
                "beacons": [{"url": "https://t.example/collect/?id=2", "occurrances": 3}],
                "links": {"firstParty": [{"href": "https://a.example/c"}, {"href": "https://a.example/b"}]},
                "hosts": {"requests": {"firstParty": [], "thirdParty": ["cdn.example", "t.example"]}}
            }),
            other => {
                return Err(ToolInvocationError::Exit {
                    program: "site".into(),
                    code: Some(1),
                    stderr: format!("unknown page {other}"),
                })
            }
        };
        Ok(serde_json::from_value(payload).unwrap())
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn crashed_worker_loses_its_target_but_report_is_built() {
    let targets = TargetList::from_unsorted(
        (1..=4)
            .map(|i| format!("https://a.example/p{i}"))
            .chain(std::iter::once("https://a.example/".to_string()))
            .collect(),
    );

    let scheduler = Scheduler::new(Arc::new(CrashOn("https://a.example/p2")), 2);
    let outcome = scheduler.run(targets, "https://a.example/").await.unwrap();

    assert!(outcome.records.len() <= 4);
    assert!(outcome.records.iter().all(|r| r.target != "https://a.example/p2"));
    assert!(outcome.dropped.contains(&"https://a.example/p2".to_string()));

    let full = build_full_report(&outcome.records, "https://a.example/", &outcome.window).unwrap();
    assert!(full.start_time.is_some());
    assert!(full.browsing_history.contains(&"https://a.example/".to_string()));
}

#[tokio::test]
async fn end_to_end_from_local_sitemap() {
    let dir = tempfile::tempdir().unwrap();
    let sitemap = dir.path().join("sitemap.xml");
    std::fs::write(
        &sitemap,
        r#"<urlset>
  <url><loc>https://a.example/b</loc></url>
  <url><loc>https://a.example/gone</loc></url>
  <url><loc>https://a.example/doc.PDF</loc></url>
</urlset>"#,
    )
    .unwrap();
    let output = dir.path().join("out");

    let yaml = format!(
        r#"
output: {output}
workers: 2
firstPartyUri: https://a.example/
urls:
  - https://a.example/
sitemaps:
  - file: {sitemap}
    exclude: "\\.pdf$"
"#,
        output = output.display(),
        sitemap = sitemap.display()
    );
    let cfg = ConfigFile::from_yaml(&yaml).unwrap().validate().unwrap();

    let summary = BatchRunner::new(cfg)
        .with_collector(Arc::new(Site))
        .with_resolver(TargetResolver::new().unwrap())
        .without_html()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.targets, 3);
    assert_eq!(summary.collected, 2);
    assert_eq!(summary.dropped, vec!["https://a.example/gone".to_string()]);

    let full = read_json(&output.join("report.json"));
    assert_json_include!(
        actual: full.clone(),
        expected: json!({
            "uri_ins": "https://a.example/",
            "browsing_history": ["https://a.example/", "https://a.example/b"],
            "cookies": [
                {"name": "_ga", "domain": ".a.example", "expiresDays": 365},
                {"name": "sid", "domain": "a.example", "session": true}
            ],
            "localStorage": {"https://a.example": {"consent": {"value": "1"}, "theme": {"value": "dark"}}},
            "beacons": [{
                "url": "https://t.example/collect",
                "fullUrl": "https://t.example/collect?id=1",
                "occurrances": 5
            }],
            "links": {"firstParty": [{"href": "https://a.example/b"}, {"href": "https://a.example/c"}]},
            "hosts": {"requests": {"firstParty": ["a.example"], "thirdParty": ["cdn.example", "t.example"]}}
        })
    );
    assert_eq!(full["cookies"].as_array().unwrap().len(), 2);
    assert!(full["cookies"][1].get("httpOnly").is_none());

    let simplified = read_json(&output.join("report_simplified.json"));
    assert_json_eq!(
        simplified,
        json!({
            "cookies": [
                {"name": "_ga", "domain": ".a.example", "path": "/", "expires": 365},
                {"name": "sid", "domain": "a.example", "path": "/", "expires": "session"}
            ],
            "localStorage": [{"key": "consent"}, {"key": "theme"}],
            "beacons": [{"url": "https://t.example/collect"}]
        })
    );

    assert!(output.join("full_results").join("https_a_example_b.json").exists());
    assert!(!output.join("report.html").exists());
}
