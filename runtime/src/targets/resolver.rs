//! Target-list resolution: sitemap ingestion, merge, sort, dedup.

use crate::error::{BatchError, Result};
use crate::targets::sitemap::{filter_excluded, parse_sitemap};
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Sitemaps fetched at once, whatever the worker count.
pub const SITEMAP_FAN_OUT: usize = 5;

/// Retries after the first failed fetch of a remote sitemap.
pub const FETCH_RETRIES: u32 = 5;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a sitemap document comes from.
#[derive(Debug, Clone)]
pub enum SitemapLocation {
    Remote(Url),
    Local(PathBuf),
}

/// One configured sitemap, with an optional exclusion pattern.
#[derive(Debug, Clone)]
pub struct SitemapSource {
    pub location: SitemapLocation,
    pub exclude: Option<Regex>,
}

impl SitemapSource {
    pub fn remote(url: Url) -> Self {
        Self {
            location: SitemapLocation::Remote(url),
            exclude: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            location: SitemapLocation::Local(path.into()),
            exclude: None,
        }
    }

    pub fn with_exclude(mut self, exclude: Regex) -> Self {
        self.exclude = Some(exclude);
        self
    }

    /// Human-readable name for logs and errors.
    pub fn name(&self) -> String {
        match &self.location {
            SitemapLocation::Remote(url) => url.to_string(),
            SitemapLocation::Local(path) => path.display().to_string(),
        }
    }
}

/// Sorted, duplicate-free list of targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList(Vec<String>);

impl TargetList {
    /// Sort ascending and collapse adjacent duplicates.
    pub fn from_unsorted(mut targets: Vec<String>) -> Self {
        targets.sort();
        targets.dedup();
        Self(targets)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0.binary_search_by(|t| t.as_str().cmp(target)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Hand the list over as a pop-from-front work queue.
    pub fn into_queue(self) -> VecDeque<String> {
        VecDeque::from(self.0)
    }
}

/// Turns literal targets and sitemap sources into a [`TargetList`].
pub struct TargetResolver {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl TargetResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| BatchError::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retries: FETCH_RETRIES,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the base back-off between fetch attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Resolve literals and sitemaps into the final target list.
    pub async fn resolve(&self, literals: &[String], sources: &[SitemapSource]) -> Result<TargetList> {
        let extracted: Vec<Vec<String>> = stream::iter(sources)
            .map(|source| self.load_source(source))
            .buffered(SITEMAP_FAN_OUT)
            .try_collect()
            .await?;

        let mut all = literals.to_vec();
        for locations in extracted {
            all.extend(locations);
        }

        let list = TargetList::from_unsorted(all);
        if list.is_empty() {
            warn!("no targets found in any source");
        }
        info!(
            "resolved {} targets from {} literals and {} sitemaps",
            list.len(),
            literals.len(),
            sources.len()
        );
        Ok(list)
    }

    async fn load_source(&self, source: &SitemapSource) -> Result<Vec<String>> {
        let document = match &source.location {
            SitemapLocation::Remote(url) => self.fetch_remote(url).await?,
            SitemapLocation::Local(path) => read_local(path).await?,
        };

        let found = parse_sitemap(&document);
        let total = found.len();
        let kept = filter_excluded(found, source.exclude.as_ref());
        debug!(
            "sitemap {}: {} locations, {} excluded",
            source.name(),
            total,
            total - kept.len()
        );
        Ok(kept)
    }

    async fn fetch_remote(&self, url: &Url) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => last_error = e.to_string(),
                },
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}");
                    if !is_retryable(status) {
                        break;
                    }
                }
                Err(e) => last_error = e.to_string(),
            }
            warn!("fetching sitemap {url} failed (attempt {}): {last_error}", attempt + 1);
        }

        Err(BatchError::SourceUnavailable {
            source_name: url.to_string(),
            reason: last_error,
        })
    }
}

async fn read_local(path: &Path) -> Result<String> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| BatchError::io("resolve", path, e))?
            .join(path)
    };

    tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| BatchError::SourceUnavailable {
            source_name: resolved.display().to_string(),
            reason: e.to_string(),
        })
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn user_agent() -> String {
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}
