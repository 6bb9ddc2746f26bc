//! One end-to-end run: resolve, collect, aggregate, write.

use crate::aggregate::{build_full_report, build_simplified_report};
use crate::collector::{preflight, Collector, ToolCollector};
use crate::config::RunConfig;
use crate::error::Result;
use crate::pool::Scheduler;
use crate::report::{ReportRenderer, ReportWriter, WrittenReports};
use crate::targets::TargetResolver;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a finished run did.
#[derive(Debug)]
pub struct BatchSummary {
    pub targets: usize,
    pub collected: usize,
    pub dropped: Vec<String>,
    pub unassigned: Vec<String>,
    pub elapsed: Duration,
    pub reports: WrittenReports,
}

/// Drives a run from a validated [`RunConfig`].
pub struct BatchRunner {
    config: RunConfig,
    collector: Option<Arc<dyn Collector>>,
    resolver: Option<TargetResolver>,
    render_html: bool,
    progress: bool,
}

impl BatchRunner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            collector: None,
            resolver: None,
            render_html: true,
            progress: false,
        }
    }

    /// Use `collector` instead of the external tool. Its preflight check is skipped.
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_resolver(mut self, resolver: TargetResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Write JSON artifacts only.
    pub fn without_html(mut self) -> Self {
        self.render_html = false;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(self) -> Result<BatchSummary> {
        let cfg = &self.config;

        let mut programs = Vec::new();
        if self.collector.is_none() {
            programs.push(cfg.collector.program.as_str());
        }
        if self.render_html {
            programs.push(cfg.reporter.as_str());
        }
        for status in preflight(&programs).await? {
            info!("using {} {}", status.program, status.version);
        }

        let collector: Arc<dyn Collector> = match &self.collector {
            Some(c) => Arc::clone(c),
            None => Arc::new(ToolCollector::new(cfg.collector.clone())),
        };
        let renderer = self
            .render_html
            .then(|| ReportRenderer::new(cfg.reporter.clone(), cfg.render_timeout));

        let resolver = match self.resolver {
            Some(r) => r,
            None => TargetResolver::new()?,
        };
        let targets = resolver.resolve(&cfg.urls, &cfg.sitemaps).await?;
        let total = targets.len();
        info!("{total} targets to process with {} workers", cfg.workers);

        let mut scheduler =
            Scheduler::new(collector, cfg.workers).with_policy(cfg.policy);
        if self.progress {
            scheduler = scheduler.with_progress(progress_bar(total as u64));
        }

        let outcome = scheduler.run(targets, &cfg.primary).await?;

        if !outcome.dropped.is_empty() {
            warn!("{} targets dropped after worker failures", outcome.dropped.len());
        }
        if !outcome.unassigned.is_empty() {
            warn!("{} targets never assigned", outcome.unassigned.len());
        }

        info!("generating reports");
        let full = build_full_report(&outcome.records, &cfg.primary, &outcome.window)?;
        let simplified = build_simplified_report(&outcome.records, &cfg.primary);

        let writer = ReportWriter::new(&cfg.output, renderer, cfg.workers);
        let reports = writer.write_all(&full, &simplified, &outcome.records).await?;

        let elapsed = (outcome.window.finished_at - outcome.window.started_at)
            .to_std()
            .unwrap_or_default();

        Ok(BatchSummary {
            targets: total,
            collected: outcome.records.len(),
            dropped: outcome.dropped,
            unassigned: outcome.unassigned,
            elapsed,
            reports,
        })
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("  {spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} {wide_msg}")
        .map(|s| s.progress_chars("\u{2588}\u{2591} "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
