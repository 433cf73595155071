pub mod driver;
pub mod executor;
pub mod retry;
pub mod timer;

#[cfg(test)]
pub mod testutil;

use serde::Serialize;
use uuid::Uuid;

pub const REASON_NOT_DUE: &str = "skipped_not_due";
pub const REASON_ALREADY_CHARGED: &str = "skipped_already_charged";
pub const REASON_CONCURRENT_UPDATE: &str = "skipped_concurrent_update";
pub const REASON_INFRASTRUCTURE: &str = "infrastructure_error";

/// Per-pledge result returned to the batch caller
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttemptResult {
    pub pledge_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AttemptResult {
    pub fn charged(pledge_id: Uuid) -> Self {
        Self {
            pledge_id,
            success: true,
            reason: None,
        }
    }

    /// No-op result: the pledge was already handled or no longer eligible
    pub fn skipped(pledge_id: Uuid, reason: &str) -> Self {
        Self {
            pledge_id,
            success: false,
            reason: Some(reason.to_string()),
        }
    }

    pub fn failed(pledge_id: Uuid, reason: String) -> Self {
        Self {
            pledge_id,
            success: false,
            reason: Some(reason),
        }
    }

    pub fn is_skip(&self) -> bool {
        self.reason
            .as_deref()
            .map_or(false, |r| r.starts_with("skipped"))
    }
}
