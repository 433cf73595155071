pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

/// Whether a declined charge is worth retrying unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Result of one gateway charge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved {
        reference: String,
    },
    Declined {
        class: ErrorClass,
        detail: String,
    },
}

/// External capability that attempts to move money.
///
/// May be slow, may fail transiently or permanently. Transport-level failures
/// (timeouts, connection errors) surface as `Err`; the executor records any
/// `Err` from this trait as a transient failure, so one bad pledge can never
/// abort a batch.
#[async_trait]
pub trait ChargeGateway: Send + Sync {
    async fn attempt_charge(
        &self,
        pledge_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<ChargeOutcome>;
}
