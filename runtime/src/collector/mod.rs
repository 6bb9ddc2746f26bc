//! Evidence collection: the seam between workers and the external tool.

pub mod tool;

use crate::error::ToolInvocationError;
use crate::evidence::EvidencePayload;
use async_trait::async_trait;

pub use tool::{preflight, CollectorOptions, ToolCollector};

/// Produces one evidence payload for a target.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collect evidence for `target`. Any error drops the target.
    async fn collect(&self, target: &str) -> Result<EvidencePayload, ToolInvocationError>;
}
