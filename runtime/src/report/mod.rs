//! Persisted outputs: full and simplified reports plus one artifact per target.

pub mod filename;
pub mod renderer;

use crate::aggregate::{FullReport, SimplifiedReport};
use crate::error::{BatchError, Result};
use crate::evidence::EvidenceRecord;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::btree_map::{BTreeMap, Entry};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use filename::snake_case;
pub use renderer::ReportRenderer;

pub const FULL_REPORT_JSON: &str = "report.json";
pub const FULL_REPORT_HTML: &str = "report.html";
pub const SIMPLIFIED_REPORT_JSON: &str = "report_simplified.json";
pub const PER_TARGET_DIR: &str = "full_results";

/// Paths and counts of what was written.
#[derive(Debug, Default)]
pub struct WrittenReports {
    pub full_json: PathBuf,
    pub full_html: Option<PathBuf>,
    pub simplified_json: PathBuf,
    pub per_target: usize,
    pub per_target_failed: usize,
}

/// Writes every artifact of a run under one output directory.
pub struct ReportWriter {
    output: PathBuf,
    renderer: Option<ReportRenderer>,
    concurrency: usize,
}

impl ReportWriter {
    /// `renderer = None` skips every HTML artifact.
    pub fn new(output: impl Into<PathBuf>, renderer: Option<ReportRenderer>, concurrency: usize) -> Self {
        Self {
            output: output.into(),
            renderer,
            concurrency: concurrency.max(1),
        }
    }

    /// JSON path of the per-target artifact for `target`.
    pub fn per_target_path(&self, target: &str, extension: &str) -> PathBuf {
        self.output
            .join(PER_TARGET_DIR)
            .join(format!("{}.{extension}", snake_case(target)))
    }

    pub async fn write_all(
        &self,
        full: &FullReport,
        simplified: &SimplifiedReport,
        records: &[EvidenceRecord],
    ) -> Result<WrittenReports> {
        let mut written = WrittenReports::default();

        info!("generating JSON report");
        written.full_json = self.output.join(FULL_REPORT_JSON);
        write_json(&written.full_json, full).await?;

        if let Some(renderer) = &self.renderer {
            info!("generating HTML report");
            let path = self.output.join(FULL_REPORT_HTML);
            match renderer.render(&written.full_json).await {
                Ok(html) => {
                    write_text(&path, &html).await?;
                    written.full_html = Some(path);
                }
                Err(e) => error!("failed to render the full report: {e}"),
            }
        }

        info!("generating simplified JSON report");
        written.simplified_json = self.output.join(SIMPLIFIED_REPORT_JSON);
        write_json(&written.simplified_json, simplified).await?;

        info!("generating individual reports");
        let (unique, shadowed) = split_stem_collisions(records);
        for (kept, skipped) in &shadowed {
            warn!(
                "{skipped} maps to the same file name as {kept}, skipping its individual report"
            );
        }

        let outcomes: Vec<bool> = stream::iter(unique)
            .map(|record| async move {
                match self.write_per_target(record).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("failed to create the report for {}: {e}", record.target);
                        false
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        written.per_target = outcomes.iter().filter(|ok| **ok).count();
        written.per_target_failed = outcomes.len() - written.per_target + shadowed.len();
        Ok(written)
    }

    async fn write_per_target(&self, record: &EvidenceRecord) -> Result<()> {
        debug!("generating individual report for {}", record.target);
        let json_path = self.per_target_path(&record.target, "json");
        write_json(&json_path, &record.payload).await?;

        if let Some(renderer) = &self.renderer {
            let html = renderer.render(&json_path).await?;
            write_text(&self.per_target_path(&record.target, "html"), &html).await?;
        }
        Ok(())
    }
}

/// Keep one record per artifact stem so no two writes race on the same
/// file. The lowest target wins; the rest come back as `(kept, skipped)`.
fn split_stem_collisions(records: &[EvidenceRecord]) -> (Vec<&EvidenceRecord>, Vec<(String, String)>) {
    let mut ordered: Vec<&EvidenceRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.target.cmp(&b.target));

    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut unique = Vec::with_capacity(ordered.len());
    let mut shadowed = Vec::new();
    for record in ordered {
        match owners.entry(snake_case(&record.target)) {
            Entry::Vacant(slot) => {
                slot.insert(&record.target);
                unique.push(record);
            }
            Entry::Occupied(slot) => {
                shadowed.push((slot.get().to_string(), record.target.clone()));
            }
        }
    }
    (unique, shadowed)
}

/// Write `value` as pretty-printed JSON, creating parent directories.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    write_text(path, &body).await
}

async fn write_text(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BatchError::io("create", parent, e))?;
    }
    tokio::fs::write(path, body)
        .await
        .map_err(|e| BatchError::io("write", path, e))
}
