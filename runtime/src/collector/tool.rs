//! External-process invocation for the collector and reporter tools.

use crate::collector::Collector;
use crate::error::{BatchError, ToolInvocationError};
use crate::evidence::EvidencePayload;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_COLLECTOR: &str = "website-evidence-collector";
pub const DEFAULT_REPORTER: &str = "website-evidence-reporter";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SLEEP_MS: u64 = 3000;

const STDERR_TAIL: usize = 400;

/// Run-wide options handed to every collector invocation.
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub program: String,
    pub first_party_uri: String,
    pub dnt: bool,
    pub set_cookie: Option<String>,
    pub sleep_ms: u64,
    pub timeout: Duration,
}

impl CollectorOptions {
    pub fn new(first_party_uri: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_COLLECTOR.to_string(),
            first_party_uri: first_party_uri.into(),
            dnt: false,
            set_cookie: None,
            sleep_ms: DEFAULT_SLEEP_MS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Command-line arguments for collecting `target`.
    pub fn args(&self, target: &str) -> Vec<String> {
        let mut args = vec![
            target.to_string(),
            format!("--first-party-uri={}", self.first_party_uri),
        ];
        if self.dnt {
            args.push("--dnt-js".into());
        }
        if let Some(cookie) = &self.set_cookie {
            args.push("--set-cookie".into());
            args.push(cookie.clone());
        }
        args.push(format!("--sleep={}", self.sleep_ms));
        args.extend(
            [
                "--overwrite",
                "--quiet",
                "--no-output",
                "--json",
                "--headless",
                "--",
                "--disable-gpu",
                "--ignore-certificate-errors",
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
            ]
            .map(String::from),
        );
        args
    }
}

/// Collects evidence by running the collector program once per target.
pub struct ToolCollector {
    options: CollectorOptions,
}

impl ToolCollector {
    pub fn new(options: CollectorOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Collector for ToolCollector {
    async fn collect(&self, target: &str) -> Result<EvidencePayload, ToolInvocationError> {
        let stdout = run_tool(
            &self.options.program,
            &self.options.args(target),
            self.options.timeout,
        )
        .await?;

        serde_json::from_str(&stdout).map_err(|source| ToolInvocationError::MalformedOutput {
            program: self.options.program.clone(),
            source,
        })
    }
}

/// Run `program` to completion within `timeout` and return its stdout.
///
/// The child is killed if the timeout elapses.
pub async fn run_tool(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, ToolInvocationError> {
    debug!("running {program} {}", args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolInvocationError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ToolInvocationError::Timeout {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| ToolInvocationError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolInvocationError::Exit {
            program: program.to_string(),
            code: output.status.code(),
            stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// An external tool found on this machine.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub program: String,
    pub path: PathBuf,
    pub version: String,
}

/// Check that `program` is installed and answers `--version`.
pub async fn probe(program: &str) -> Result<ToolStatus, BatchError> {
    let path = which::which(program)
        .map_err(|_| BatchError::config(format!("Please install {program} before!")))?;

    let version = run_tool(program, &["--version".to_string()], Duration::from_secs(10))
        .await
        .map_err(|e| BatchError::config(format!("{program} is not usable: {e}")))?;

    Ok(ToolStatus {
        program: program.to_string(),
        path,
        version: version.trim().to_string(),
    })
}

/// Probe the external tools a run needs before anything else runs.
pub async fn preflight(programs: &[&str]) -> Result<Vec<ToolStatus>, BatchError> {
    let mut found = Vec::new();
    for &program in programs {
        let status = probe(program).await?;
        debug!("{} version {} at {}", status.program, status.version, status.path.display());
        found.push(status);
    }
    Ok(found)
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_args() {
        let mut opts = CollectorOptions::new("https://a.example/");
        opts.dnt = true;
        opts.set_cookie = Some("consent=yes".into());

        let args = opts.args("https://a.example/page");
        assert_eq!(args[0], "https://a.example/page");
        assert_eq!(args[1], "--first-party-uri=https://a.example/");
        assert!(args.contains(&"--dnt-js".to_string()));
        let i = args.iter().position(|a| a == "--set-cookie").unwrap();
        assert_eq!(args[i + 1], "consent=yes");
        assert!(args.contains(&"--sleep=3000".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--disable-dev-shm-usage"));
    }

    #[test]
    fn test_minimal_args_skip_optional_flags() {
        let args = CollectorOptions::new("https://a.example/").args("https://a.example/");
        assert!(!args.contains(&"--dnt-js".to_string()));
        assert!(!args.contains(&"--set-cookie".to_string()));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("aé", 1), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let out = run_tool(
            "sh",
            &["-c".into(), "echo '{\"cookies\": []}'".into()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.trim(), "{\"cookies\": []}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_nonzero_exit() {
        let err = run_tool(
            "sh",
            &["-c".into(), "echo nope >&2; exit 3".into()],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        match err {
            ToolInvocationError::Exit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_timeout() {
        let err = run_tool("sleep", &["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvocationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_tool("definitely-not-a-real-tool-xyz", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvocationError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_preflight_without_tools() {
        assert!(preflight(&[]).await.unwrap().is_empty());
        assert!(preflight(&["definitely-not-a-real-tool-xyz"]).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_missing_program_is_config_error() {
        let err = probe("definitely-not-a-real-tool-xyz").await.unwrap_err();
        assert!(matches!(err, BatchError::ConfigurationInvalid(_)));
    }
}
