//! Environment readiness check.
//!
//! Verifies the host, the external collector and reporter, and (given a
//! configuration file) the configuration itself and its output directory.

use crate::cli::output::{self, Styled};
use crate::collector::tool::{probe, DEFAULT_COLLECTOR, DEFAULT_REPORTER};
use crate::config::{ConfigFile, RunConfig};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Run every check. Returns `Ok(false)` when something blocks a run.
pub async fn run(config: Option<&Path>) -> Result<bool> {
    let s = Styled::new();
    let mut ready = true;
    let mut has_warning = false;

    output::print_header(&s);

    output::print_section(&s, "System");
    output::print_check(
        s.ok_sym(),
        "OS:",
        &format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH),
    );
    output::print_check(
        s.ok_sym(),
        "Cores:",
        &format!("{} (default worker count)", num_cpus::get()),
    );
    eprintln!();

    let loaded = match config {
        Some(path) => {
            output::print_section(&s, "Configuration");
            match ConfigFile::from_file(path).and_then(ConfigFile::validate) {
                Ok(cfg) => {
                    output::print_check(s.ok_sym(), "File:", &path.display().to_string());
                    output::print_check(
                        s.ok_sym(),
                        "Targets:",
                        &format!("{} urls, {} sitemaps", cfg.urls.len(), cfg.sitemaps.len()),
                    );
                    output::print_check(s.ok_sym(), "Workers:", &cfg.workers.to_string());
                    if !check_output_dir(&s, &cfg.output) {
                        ready = false;
                    }
                    Some(cfg)
                }
                Err(e) => {
                    output::print_check(s.fail_sym(), "File:", &e.to_string());
                    ready = false;
                    None
                }
            }
        }
        None => None,
    };
    if config.is_some() {
        eprintln!();
    }

    output::print_section(&s, "Tools");
    let (collector, reporter) = tool_names(loaded.as_ref());
    for (label, program) in [("Collector:", collector), ("Reporter:", reporter)] {
        match probe(&program).await {
            Ok(status) => output::print_check(
                s.ok_sym(),
                label,
                &format!("{} at {}", status.version, status.path.display()),
            ),
            Err(e) => {
                output::print_check(s.fail_sym(), label, &format!("{program}: NOT USABLE"));
                output::print_detail(&e.to_string());
                if label == "Reporter:" {
                    output::print_detail("Runs with --skip-html do not need it.");
                    has_warning = true;
                } else {
                    ready = false;
                }
            }
        }
    }

    if ready && !has_warning {
        output::print_status(&s, &s.green("READY"), "start with 'evidence-batch run'");
    } else if ready {
        output::print_status(&s, &s.yellow("READY"), "some warnings above");
    } else {
        output::print_status(&s, &s.red("NOT READY"), "fix issues above");
    }

    Ok(ready)
}

fn tool_names(cfg: Option<&RunConfig>) -> (String, String) {
    match cfg {
        Some(cfg) => (cfg.collector.program.clone(), cfg.reporter.clone()),
        None => (DEFAULT_COLLECTOR.to_string(), DEFAULT_REPORTER.to_string()),
    }
}

/// The output directory must exist as a directory or be creatable.
fn check_output_dir(s: &Styled, dir: &Path) -> bool {
    if dir.is_dir() {
        output::print_check(s.ok_sym(), "Output:", &format!("{} (exists)", dir.display()));
        return true;
    }
    if dir.exists() {
        output::print_check(s.fail_sym(), "Output:", &format!("{} is not a directory", dir.display()));
        return false;
    }

    match nearest_existing_ancestor(dir) {
        Some(base) if is_writable(&base) => {
            output::print_check(s.ok_sym(), "Output:", &format!("{} (will be created)", dir.display()));
            true
        }
        Some(base) => {
            output::print_check(s.fail_sym(), "Output:", &format!("{} is not writable", base.display()));
            false
        }
        None => {
            output::print_check(s.fail_sym(), "Output:", &format!("{} cannot be created", dir.display()));
            false
        }
    }
}

fn nearest_existing_ancestor(dir: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(dir).ok()?;
    absolute.ancestors().find(|p| p.is_dir()).map(Path::to_path_buf)
}

fn is_writable(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
