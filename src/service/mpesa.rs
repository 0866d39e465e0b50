// service/mpesa.rs
// Safaricom Daraja STK push client and the bounded status poller.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{config::MpesaConfig, service::error::ServiceError};

#[derive(Debug, Clone, Serialize)]
pub struct StkPushRequest {
    pub phone_number: String,
    /// Whole shillings.
    pub amount: i64,
    pub account_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StkPushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PushStatus {
    Pending,
    Succeeded { receipt: Option<String> },
    Failed { code: i64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded { receipt: Option<String> },
    Failed { code: i64, reason: String },
    TimedOut { attempts: u32 },
}

#[async_trait]
pub trait PushPaymentGateway: Send + Sync {
    async fn initiate(&self, request: &StkPushRequest) -> Result<StkPushAccepted, ServiceError>;

    async fn query(&self, checkout_request_id: &str) -> Result<PushStatus, ServiceError>;
}

/// Daraja's result codes arrive as strings from the query API and as numbers
/// from callbacks.
fn result_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn status_from_result(code: i64, desc: &str, receipt: Option<String>) -> PushStatus {
    if code == 0 {
        PushStatus::Succeeded { receipt }
    } else {
        PushStatus::Failed {
            code,
            reason: desc.to_string(),
        }
    }
}

pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    // Daraja expects East Africa Time (UTC+3).
    (now + chrono::Duration::hours(3)).format("%Y%m%d%H%M%S").to_string()
}

pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    general_purpose::STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    pub checkout_request_id: String,
    pub status: PushStatus,
}

/// Extracts the outcome from a Daraja STK callback body.
pub fn parse_callback(body: &Value) -> Result<CallbackResult, ServiceError> {
    let callback = &body["Body"]["stkCallback"];

    let checkout_request_id = callback["CheckoutRequestID"]
        .as_str()
        .ok_or_else(|| ServiceError::Validation("Callback is missing CheckoutRequestID".to_string()))?
        .to_string();

    let code = result_code(&callback["ResultCode"])
        .ok_or_else(|| ServiceError::Validation("Callback is missing ResultCode".to_string()))?;
    let desc = callback["ResultDesc"].as_str().unwrap_or_default();

    let receipt = callback["CallbackMetadata"]["Item"]
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .find(|item| item["Name"] == "MpesaReceiptNumber")
                .and_then(|item| item["Value"].as_str())
        })
        .map(|s| s.to_string());

    Ok(CallbackResult {
        checkout_request_id,
        status: status_from_result(code, desc, receipt),
    })
}

pub struct DarajaGateway {
    config: MpesaConfig,
    client: reqwest::Client,
    token: Mutex<Option<(String, Instant)>>,
}

impl DarajaGateway {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = self
            .client
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("OAuth request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(format!("Invalid OAuth response: {}", e)))?;

        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| ServiceError::Gateway("OAuth response has no access token".to_string()))?
            .to_string();
        let expires_in = result_code(&body["expires_in"]).unwrap_or(3599).max(60) as u64;

        // Refresh a minute early.
        *cached = Some((token.clone(), Instant::now() + Duration::from_secs(expires_in - 60)));
        Ok(token)
    }
}

#[async_trait]
impl PushPaymentGateway for DarajaGateway {
    async fn initiate(&self, request: &StkPushRequest) -> Result<StkPushAccepted, ServiceError> {
        let token = self.access_token().await?;
        let timestamp = stk_timestamp(Utc::now());

        let payload = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": stk_password(&self.config.shortcode, &self.config.passkey, &timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount,
            "PartyA": request.phone_number,
            "PartyB": self.config.shortcode,
            "PhoneNumber": request.phone_number,
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.account_reference,
            "TransactionDesc": request.description,
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("STK push request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(format!("Invalid STK push response: {}", e)))?;

        if result_code(&body["ResponseCode"]) != Some(0) {
            let message = body["errorMessage"]
                .as_str()
                .or_else(|| body["ResponseDescription"].as_str())
                .unwrap_or("STK push was rejected");
            return Err(ServiceError::Gateway(message.to_string()));
        }

        Ok(StkPushAccepted {
            merchant_request_id: body["MerchantRequestID"].as_str().unwrap_or_default().to_string(),
            checkout_request_id: body["CheckoutRequestID"]
                .as_str()
                .ok_or_else(|| ServiceError::Gateway("STK push response has no CheckoutRequestID".to_string()))?
                .to_string(),
            customer_message: body["CustomerMessage"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn query(&self, checkout_request_id: &str) -> Result<PushStatus, ServiceError> {
        let token = self.access_token().await?;
        let timestamp = stk_timestamp(Utc::now());

        let payload = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": stk_password(&self.config.shortcode, &self.config.passkey, &timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(format!("STK query failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(format!("Invalid STK query response: {}", e)))?;

        // Daraja answers with an error body while the customer has not acted yet.
        if body.get("errorCode").is_some() {
            return Ok(PushStatus::Pending);
        }

        match result_code(&body["ResultCode"]) {
            Some(code) => Ok(status_from_result(
                code,
                body["ResultDesc"].as_str().unwrap_or_default(),
                None,
            )),
            None => Ok(PushStatus::Pending),
        }
    }
}

/// Queries the gateway every `interval` until it reports a final result or
/// `max_attempts` queries have been made. Query errors count as attempts.
pub async fn poll_until_resolved(
    gateway: &dyn PushPaymentGateway,
    checkout_request_id: &str,
    interval: Duration,
    max_attempts: u32,
) -> PollOutcome {
    for attempt in 1..=max_attempts {
        tokio::time::sleep(interval).await;

        match gateway.query(checkout_request_id).await {
            Ok(PushStatus::Succeeded { receipt }) => return PollOutcome::Succeeded { receipt },
            Ok(PushStatus::Failed { code, reason }) => return PollOutcome::Failed { code, reason },
            Ok(PushStatus::Pending) => {}
            Err(e) => {
                tracing::warn!(
                    "Status query {} for {} failed: {}",
                    attempt,
                    checkout_request_id,
                    e
                );
            }
        }
    }

    PollOutcome::TimedOut {
        attempts: max_attempts,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports pending until `resolve_after` queries, then `outcome`.
    pub(crate) struct FakeGateway {
        pub queries: AtomicU32,
        pub resolve_after: u32,
        pub outcome: PushStatus,
    }

    impl FakeGateway {
        pub(crate) fn new(resolve_after: u32, outcome: PushStatus) -> Self {
            Self {
                queries: AtomicU32::new(0),
                resolve_after,
                outcome,
            }
        }
    }

    #[async_trait]
    impl PushPaymentGateway for FakeGateway {
        async fn initiate(&self, _request: &StkPushRequest) -> Result<StkPushAccepted, ServiceError> {
            Ok(StkPushAccepted {
                merchant_request_id: "29115-34620561-1".to_string(),
                checkout_request_id: format!("ws_CO_{}", uuid::Uuid::new_v4().simple()),
                customer_message: "Success. Request accepted for processing".to_string(),
            })
        }

        async fn query(&self, _checkout_request_id: &str) -> Result<PushStatus, ServiceError> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.resolve_after {
                Ok(self.outcome.clone())
            } else if n % 2 == 0 {
                Err(ServiceError::Gateway("timeout".to_string()))
            } else {
                Ok(PushStatus::Pending)
            }
        }
    }

    #[tokio::test]
    async fn poller_stops_on_success() {
        let gateway = FakeGateway::new(3, PushStatus::Succeeded { receipt: Some("NLJ7RT61SV".into()) });
        let outcome = poll_until_resolved(&gateway, "ws_CO_1", Duration::from_millis(1), 90).await;

        assert_eq!(outcome, PollOutcome::Succeeded { receipt: Some("NLJ7RT61SV".into()) });
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poller_stops_on_failure_code() {
        let gateway = FakeGateway::new(
            1,
            PushStatus::Failed { code: 1032, reason: "Request cancelled by user".into() },
        );
        let outcome = poll_until_resolved(&gateway, "ws_CO_1", Duration::from_millis(1), 90).await;

        assert!(matches!(outcome, PollOutcome::Failed { code: 1032, .. }));
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poller_gives_up_after_max_attempts() {
        let gateway = FakeGateway::new(u32::MAX, PushStatus::Pending);
        let outcome = poll_until_resolved(&gateway, "ws_CO_1", Duration::from_millis(1), 5).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let password = stk_password("174379", "passkey", "20260301110000");
        let decoded = general_purpose::STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20260301110000");
    }

    #[test]
    fn timestamp_is_in_nairobi_time() {
        let utc = DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(stk_timestamp(utc), "20260301110000");
    }

    #[test]
    fn parses_successful_callback() {
        let body = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1000 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "PhoneNumber", "Value": 254712345678u64 }
                        ]
                    }
                }
            }
        });

        let result = parse_callback(&body).unwrap();
        assert_eq!(result.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(result.status, PushStatus::Succeeded { receipt: Some("NLJ7RT61SV".into()) });
    }

    #[test]
    fn parses_cancelled_callback() {
        let body = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        });

        let result = parse_callback(&body).unwrap();
        assert_eq!(
            result.status,
            PushStatus::Failed { code: 1032, reason: "Request cancelled by user".into() }
        );
    }

    #[test]
    fn rejects_malformed_callback() {
        assert!(parse_callback(&serde_json::json!({ "Body": {} })).is_err());
    }

    #[test]
    fn result_codes_accept_strings_and_numbers() {
        assert_eq!(result_code(&serde_json::json!("0")), Some(0));
        assert_eq!(result_code(&serde_json::json!(1037)), Some(1037));
        assert_eq!(result_code(&serde_json::json!(null)), None);
    }
}
