//! Error taxonomy for a batch run.
//!
//! Only [`BatchError`] ever reaches the caller. Per-target collection
//! failures are [`ToolInvocationError`]s and stay inside the worker that hit
//! them; they end that worker and drop the target.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors that abort a run.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Missing or malformed options. Raised before any worker spawns.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A sitemap could not be fetched or read.
    #[error("sitemap source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The primary target never produced an evidence record.
    #[error("no evidence record for primary target {0}")]
    PrimaryResultMissing(String),

    #[error("failed to {operation} {path}: {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// An external tool failed outside a worker, e.g. while rendering.
    #[error(transparent)]
    Tool(#[from] ToolInvocationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(msg.into())
    }

    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Failure to obtain evidence (or HTML) from an external tool.
#[derive(Error, Debug)]
pub enum ToolInvocationError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unparseable output from {program}: {source}")]
    MalformedOutput {
        program: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_error_display() {
        let err = ToolInvocationError::Exit {
            program: "collector".into(),
            code: Some(2),
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "collector exited with 2: boom");

        let killed = ToolInvocationError::Exit {
            program: "collector".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_timeout_display() {
        let err = ToolInvocationError::Timeout {
            program: "collector".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "collector timed out after 1500ms");
    }
}
