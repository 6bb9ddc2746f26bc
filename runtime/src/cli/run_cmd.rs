//! `evidence-batch run`: one complete batch from a configuration file.

use crate::batch::{BatchRunner, BatchSummary};
use crate::cli::output::{self, Styled};
use crate::config::ConfigFile;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

pub struct RunArgs<'a> {
    pub config: &'a Path,
    pub workers: Option<usize>,
    pub skip_html: bool,
}

pub async fn run(args: RunArgs<'_>) -> Result<()> {
    let cfg = ConfigFile::from_file(args.config)
        .and_then(ConfigFile::validate)
        .with_context(|| format!("cannot use {}", args.config.display()))?
        .with_workers(args.workers);

    info!("evidence-batch v{} writing to {}", env!("CARGO_PKG_VERSION"), cfg.output.display());

    let mut runner = BatchRunner::new(cfg).with_progress(!output::is_quiet());
    if args.skip_html {
        runner = runner.without_html();
    }
    let output_dir = runner.config().output.clone();

    let summary = runner.run().await.context("batch run failed")?;

    if !output::is_quiet() {
        print_summary(&Styled::new(), &summary, &output_dir);
    }
    Ok(())
}

fn print_summary(s: &Styled, summary: &BatchSummary, output_dir: &Path) {
    let missing = summary.dropped.len() + summary.unassigned.len();
    let symbol = if missing == 0 { s.ok_sym() } else { s.warn_sym() };

    eprintln!();
    eprintln!(
        "  {symbol} collected {}/{} targets in {}",
        summary.collected,
        summary.targets,
        output::format_duration(summary.elapsed.as_secs())
    );
    for target in &summary.dropped {
        output::print_detail(&s.dim(&format!("dropped: {target}")));
    }
    for target in &summary.unassigned {
        output::print_detail(&s.dim(&format!("not assigned: {target}")));
    }
    if summary.reports.per_target_failed > 0 {
        eprintln!(
            "  {} {} individual reports failed",
            s.warn_sym(),
            summary.reports.per_target_failed
        );
    }
    eprintln!("  Reports in {}", s.bold(&output_dir.display().to_string()));
}
