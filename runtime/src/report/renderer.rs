//! HTML rendering through the external reporter tool.

use crate::collector::tool::run_tool;
use crate::error::ToolInvocationError;
use std::path::Path;
use std::time::Duration;

/// Keeps long code blocks in the rendered report from taking over the page.
const PRE_STYLE: &str = ".markdown-body pre { max-height: 150px; }";

#[derive(Debug, Clone)]
pub struct ReportRenderer {
    program: String,
    timeout: Duration,
}

impl ReportRenderer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Render the evidence document at `path` to HTML.
    pub async fn render(&self, path: &Path) -> Result<String, ToolInvocationError> {
        let html = run_tool(
            &self.program,
            &[path.display().to_string()],
            self.timeout,
        )
        .await?;
        Ok(inject_style(&html))
    }
}

fn inject_style(html: &str) -> String {
    html.replacen("</style>", &format!("{PRE_STYLE}</style>"), 1)
}
