use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gateway_trait::{ChargeOutcome, ChargeRequest, PaymentGateway};
use crate::core::{AppError, Result};

/// REST client for the card/debit gateway's charge endpoint
pub struct HttpGatewayClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    reference_id: &'a str,
    customer_id: &'a str,
    amount: String,
    currency: &'a str,
    payment_method_type: &'a str,
    payment_method_id: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    merchant_id: &'a str,
}

#[derive(Deserialize)]
struct ChargeResponse {
    id: String,
    status: String,
    #[serde(default)]
    failure_code: Option<String>,
    #[serde(default)]
    failure_message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpGatewayClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Invalid gateway client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 408, 429 and 5xx are transient; every other non-2xx is a decline
    fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }
}

#[async_trait]
impl PaymentGateway for HttpGatewayClient {
    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome> {
        let url = format!("{}/v1/charges", self.base_url);

        let body = ChargeBody {
            reference_id: &request.order_reference,
            customer_id: &request.customer_id,
            amount: request.currency.round(request.amount).to_string(),
            currency: request.currency.as_str(),
            payment_method_type: &request.payment_method,
            payment_method_id: &request.payment_method_id,
            description: &request.description,
            customer_email: request.customer_email.as_deref(),
            merchant_id: &request.merchant_id,
        };

        let response = match self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(""))
            // gateway-side dedupe on the same order reference
            .header("Idempotency-Key", &request.order_reference)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            // never reached the gateway, so nothing was charged
            Err(e) if e.is_connect() => {
                return Ok(ChargeOutcome::declined(
                    "GATEWAY_UNAVAILABLE",
                    format!("Gateway unreachable: {}", e),
                    true,
                ));
            }
            Err(e) if e.is_timeout() => {
                return Err(AppError::gateway(format!(
                    "Gateway timed out, charge outcome unknown: {}",
                    e
                )));
            }
            Err(e) => return Err(AppError::gateway(format!("Gateway request failed: {}", e))),
        };

        let status = response.status();
        if !status.is_success() {
            let error: Option<ErrorResponse> = response.json().await.ok();
            let (code, message) = error
                .map(|e| (e.error_code, e.message))
                .unwrap_or((None, None));

            return Ok(ChargeOutcome::declined(
                code.unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
                message.unwrap_or_else(|| format!("Gateway returned {}", status)),
                Self::is_retryable_status(status),
            ));
        }

        let charge: ChargeResponse = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to parse gateway response: {}", e)))?;

        match charge.status.to_uppercase().as_str() {
            "SUCCEEDED" | "CAPTURED" => Ok(ChargeOutcome::approved(charge.id)),
            // accepted but unsettled: a new charge could capture twice
            "PENDING" => Err(AppError::gateway(format!(
                "Charge {} still pending at gateway, outcome unknown",
                charge.id
            ))),
            _ => Ok(ChargeOutcome::declined(
                charge.failure_code.unwrap_or_else(|| "DECLINED".to_string()),
                charge
                    .failure_message
                    .unwrap_or_else(|| "Charge declined".to_string()),
                false,
            )),
        }
    }

    fn name(&self) -> &str {
        "http-gateway"
    }
}
