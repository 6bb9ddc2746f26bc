//! Run configuration: file loading and validation.
//!
//! [`ConfigFile`] mirrors the file as written; [`ConfigFile::validate`]
//! turns it into a [`RunConfig`] with every default applied, or fails with
//! `ConfigurationInvalid` before anything is spawned or fetched.

use crate::collector::tool::{DEFAULT_COLLECTOR, DEFAULT_REPORTER};
use crate::collector::CollectorOptions;
use crate::error::{BatchError, Result};
use crate::pool::{CollapsePolicy, RetryPolicy, SchedulerPolicy};
use crate::targets::SitemapSource;
use regex::RegexBuilder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The configuration file as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub output: Option<PathBuf>,
    pub workers: Option<usize>,
    #[serde(default)]
    pub dnt: bool,
    pub set_cookie: Option<String>,
    pub first_party_uri: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub sitemaps: Vec<SitemapEntry>,
    pub timeout_ms: Option<u64>,
    pub render_timeout_ms: Option<u64>,
    pub sleep_ms: Option<u64>,
    pub collector: Option<String>,
    pub reporter: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub respawn_on_collapse: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SitemapEntry {
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub exclude: Option<String>,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output: PathBuf,
    pub workers: usize,
    pub primary: String,
    pub urls: Vec<String>,
    pub sitemaps: Vec<SitemapSource>,
    pub collector: CollectorOptions,
    pub reporter: String,
    pub render_timeout: Duration,
    pub policy: SchedulerPolicy,
}

impl ConfigFile {
    /// Load a YAML or JSON configuration file, picked by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatchError::config(format!("the file '{}' is unreachable: {e}", path.display()))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content)
                .map_err(|e| BatchError::config(format!("{}: {e}", path.display()))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| BatchError::config(format!("{}: {e}", path.display()))),
            other => Err(BatchError::config(format!(
                "unsupported configuration format '{other}' for {}",
                path.display()
            ))),
        }
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Check every option and apply defaults.
    pub fn validate(self) -> Result<RunConfig> {
        let output = self
            .output
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| BatchError::config("\"output\" is required"))?;

        let primary = self
            .first_party_uri
            .ok_or_else(|| BatchError::config("\"firstPartyUri\" is required"))?;
        check_uri("firstPartyUri", &primary)?;

        if self.urls.is_empty() && self.sitemaps.is_empty() {
            return Err(BatchError::config(
                "please provide a sitemap and/or an URLs list",
            ));
        }
        for (i, url) in self.urls.iter().enumerate() {
            check_uri(&format!("urls[{i}]"), url)?;
        }

        let sitemaps = self
            .sitemaps
            .into_iter()
            .enumerate()
            .map(|(i, entry)| entry.into_source(i))
            .collect::<Result<Vec<_>>>()?;

        let workers = match self.workers {
            Some(n) if n > 0 => n,
            _ => num_cpus::get(),
        };

        let collector = CollectorOptions {
            program: self.collector.unwrap_or_else(|| DEFAULT_COLLECTOR.to_string()),
            first_party_uri: primary.clone(),
            dnt: self.dnt,
            set_cookie: self.set_cookie.filter(|c| !c.is_empty()),
            sleep_ms: self.sleep_ms.unwrap_or(crate::collector::tool::DEFAULT_SLEEP_MS),
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        };

        let policy = SchedulerPolicy {
            collapse: if self.respawn_on_collapse {
                CollapsePolicy::Respawn
            } else {
                CollapsePolicy::Finalize
            },
            retry: RetryPolicy {
                max_retries: self.retries,
            },
        };

        Ok(RunConfig {
            output,
            workers,
            primary,
            urls: self.urls,
            sitemaps,
            collector,
            reporter: self.reporter.unwrap_or_else(|| DEFAULT_REPORTER.to_string()),
            render_timeout: Duration::from_millis(
                self.render_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            policy,
        })
    }
}

impl SitemapEntry {
    fn into_source(self, index: usize) -> Result<SitemapSource> {
        let mut source = match (self.url, self.file) {
            (Some(url), None) => SitemapSource::remote(check_uri(&format!("sitemaps[{index}].url"), &url)?),
            (None, Some(file)) => SitemapSource::local(file),
            (Some(_), Some(_)) => {
                return Err(BatchError::config(format!(
                    "sitemaps[{index}] must set either \"url\" or \"file\", not both"
                )))
            }
            (None, None) => {
                return Err(BatchError::config(format!(
                    "sitemaps[{index}] needs a \"url\" or a \"file\""
                )))
            }
        };

        if let Some(pattern) = self.exclude {
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    BatchError::config(format!("sitemaps[{index}].exclude is not a valid pattern: {e}"))
                })?;
            source = source.with_exclude(re);
        }
        Ok(source)
    }
}

impl RunConfig {
    /// Apply a command-line worker count over the file's.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(n) = workers.filter(|n| *n > 0) {
            self.workers = n;
        }
        self
    }
}

fn check_uri(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| BatchError::config(format!("\"{field}\" must be a valid uri ({value}): {e}")))
}
