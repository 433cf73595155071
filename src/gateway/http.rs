use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{ChargeGateway, ChargeOutcome, ErrorClass};
use crate::error::{AppResult, GatewayError};

/// HTTP adapter for the external charge provider.
///
/// The provider's free-form error payload is normalized into the
/// transient/permanent taxonomy here, at the adapter boundary, so the
/// executor never inspects provider-specific strings.
pub struct HttpChargeGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChargeRequest<'a> {
    pledge_id: Uuid,
    amount: Decimal,
    currency: &'a str,
}

#[derive(Deserialize)]
struct ChargeResponse {
    success: bool,
    reference: Option<String>,
    error_class: Option<String>,
    error_detail: Option<String>,
}

impl HttpChargeGateway {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

/// Map the provider's error taxonomy onto ours.
///
/// Anything not explicitly known to be permanent is treated as transient:
/// pausing a healthy pledge is worse than one extra retry.
pub fn classify_decline(error_class: Option<&str>) -> ErrorClass {
    match error_class {
        Some("permanent")
        | Some("card_declined")
        | Some("invalid_payment_method")
        | Some("account_closed")
        | Some("fraud_rejected") => ErrorClass::Permanent,
        _ => ErrorClass::Transient,
    }
}

#[async_trait]
impl ChargeGateway for HttpChargeGateway {
    async fn attempt_charge(
        &self,
        pledge_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<ChargeOutcome> {
        let url = format!("{}/v1/charges", self.base_url);
        let request = ChargeRequest {
            pledge_id,
            amount,
            currency,
        };

        // Transport failures (timeout, connection refused) surface as
        // GatewayError; the executor records them as transient failures
        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        let body: ChargeResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::MalformedResponse(format!("http {}: {}", status, err)))?;

        if body.success {
            let reference = body.reference.unwrap_or_default();
            info!(%pledge_id, %reference, "charge approved");
            Ok(ChargeOutcome::Approved { reference })
        } else {
            let class = classify_decline(body.error_class.as_deref());
            Ok(ChargeOutcome::Declined {
                class,
                detail: body
                    .error_detail
                    .or(body.error_class)
                    .unwrap_or_else(|| format!("declined (http {})", status)),
            })
        }
    }
}
