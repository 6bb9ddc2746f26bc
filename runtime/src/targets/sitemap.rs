//! Sitemap document parsing.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

/// Extract every `<url><loc>` location from a sitemap document.
///
/// Only `<loc>` elements whose direct parent is `<url>` count, so sitemap
/// index files (`<sitemap><loc>`) yield nothing. Parsing stops quietly at the
/// first malformed construct and returns what was read so far.
pub fn parse_sitemap(xml: &str) -> Vec<String> {
    let mut locations = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.name().as_ref());
                if name == "loc" {
                    current.clear();
                }
                stack.push(name);
            }
            Ok(Event::Text(ref e)) => {
                if in_url_loc(&stack) {
                    current.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::CData(ref e)) => {
                if in_url_loc(&stack) {
                    current.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                if in_url_loc(&stack) {
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locations.push(loc.to_string());
                    }
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    locations
}

/// Drop every location matched by `exclude`.
pub fn filter_excluded(locations: Vec<String>, exclude: Option<&Regex>) -> Vec<String> {
    match exclude {
        Some(re) => locations.into_iter().filter(|l| !re.is_match(l)).collect(),
        None => locations,
    }
}

fn in_url_loc(stack: &[String]) -> bool {
    matches!(stack, [.., parent, last] if parent == "url" && last == "loc")
}

// Strip any namespace prefix (`sm:loc` -> `loc`).
fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/</loc>
    <lastmod>2024-01-01</lastmod>
  </url>
  <url>
    <loc> https://example.com/about?a=1&amp;b=2 </loc>
  </url>
  <url><loc><![CDATA[https://example.com/blog/post]]></loc></url>
</urlset>"#;

    #[test]
    fn test_parse_sitemap() {
        let locs = parse_sitemap(SITEMAP);
        assert_eq!(
            locs,
            vec![
                "https://example.com/",
                "https://example.com/about?a=1&b=2",
                "https://example.com/blog/post",
            ]
        );
    }

    #[test]
    fn test_sitemap_index_yields_nothing() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
        </sitemapindex>"#;
        assert!(parse_sitemap(xml).is_empty());
    }

    #[test]
    fn test_prefixed_elements() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sm:url><sm:loc>https://example.com/x</sm:loc></sm:url>
        </sm:urlset>"#;
        assert_eq!(parse_sitemap(xml), vec!["https://example.com/x"]);
    }

    #[test]
    fn test_truncated_document_keeps_prefix() {
        let xml = "<urlset><url><loc>https://example.com/a</loc></url><url><loc>https://exa";
        assert_eq!(parse_sitemap(xml), vec!["https://example.com/a"]);
    }

    #[test]
    fn test_filter_excluded_is_case_insensitive() {
        let re = RegexBuilder::new("/BLOG/")
            .case_insensitive(true)
            .build()
            .unwrap();
        let kept = filter_excluded(parse_sitemap(SITEMAP), Some(&re));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|l| !l.contains("/blog/")));
    }
}
