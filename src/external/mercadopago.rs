//! Thin JSON client for the Mercado Pago payments API. One instance is
//! built per request from whichever credential the order resolves to
//! (platform or merchant-delegated), so credential selection stays a
//! plain parameter instead of process-global state.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct CreatePaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub transaction_amount: Decimal,
    pub description: String,
    /// "pix" or a card brand identifier such as "visa".
    pub payment_method_id: String,
    pub payer: PaymentPayer,
    pub notification_url: String,
    /// Local order id; comes back on the payment resource and is the only
    /// way webhook notifications are correlated to orders.
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installments: Option<i32>,
    /// Platform commission, only set on merchant-delegated payments.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub application_fee: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct PaymentPayer {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payment resource as returned by the gateway. Every field the gateway
/// might omit is optional; callers check for what they need and treat a
/// missing required field as a malformed response.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentResource {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointOfInteraction {
    #[serde(default)]
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_base64: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

impl PaymentResource {
    /// Gateway payment ids arrive as JSON numbers; normalize to a string.
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn transaction_data(&self) -> Option<&TransactionData> {
        self.point_of_interaction
            .as_ref()?
            .transaction_data
            .as_ref()
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
}

impl OAuthTokenResponse {
    pub fn account_id(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct MercadoPagoClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("delivery-backend/payments")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Create a payment intent for an order's frozen total.
    pub async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> AppResult<PaymentResource> {
        let url = format!("{}/v1/payments", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("create payment: {e}")))?;

        Self::parse_payment_response(response, "create payment").await
    }

    /// Authoritative fetch of a payment's current state. Webhook bodies
    /// are only hints; this is the truth the reconciler acts on.
    pub async fn get_payment(&self, payment_id: &str) -> AppResult<PaymentResource> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("get payment {payment_id}: {e}")))?;

        Self::parse_payment_response(response, "get payment").await
    }

    /// Exchange a merchant's authorization code for a delegated credential.
    pub async fn exchange_oauth_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> AppResult<OAuthTokenResponse> {
        let url = format!("{}/oauth/token", self.base_url);

        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": client_id,
            "client_secret": client_secret,
            "code": code,
            "redirect_uri": redirect_uri,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("oauth exchange: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("oauth exchange: {e}")))?;

        if !status.is_success() {
            return Err(Self::status_error(status, &text, "oauth exchange"));
        }

        serde_json::from_str(&text).map_err(|e| {
            AppError::MalformedGatewayResponse(format!("oauth exchange: {e}: {text}"))
        })
    }

    async fn parse_payment_response(
        response: reqwest::Response,
        context: &str,
    ) -> AppResult<PaymentResource> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("{context}: {e}")))?;

        if !status.is_success() {
            return Err(Self::status_error(status, &text, context));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::MalformedGatewayResponse(format!("{context}: {e}: {text}")))
    }

    fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> AppError {
        if status.is_server_error() {
            AppError::GatewayUnavailable(format!("{context}: HTTP {status}: {body}"))
        } else {
            // 4xx means the gateway understood and refused the request
            // (bad card token, expired code); actionable by the caller.
            AppError::ValidationError(format!("Payment gateway rejected the request: {body}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_serializes_amount_as_number() {
        let request = CreatePaymentRequest {
            transaction_amount: dec!(25.50),
            description: "Pedido 42".to_string(),
            payment_method_id: "pix".to_string(),
            payer: PaymentPayer {
                email: "ana@example.com".to_string(),
                name: Some("Ana".to_string()),
            },
            notification_url: "https://api.example.com/webhook/payments".to_string(),
            external_reference: "b2c9".to_string(),
            token: None,
            installments: None,
            application_fee: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["transaction_amount"], serde_json::json!(25.5));
        assert!(json.get("token").is_none());
        assert!(json.get("application_fee").is_none());
    }

    #[test]
    fn create_request_carries_application_fee_when_delegated() {
        let request = CreatePaymentRequest {
            transaction_amount: dec!(25.50),
            description: "Pedido 42".to_string(),
            payment_method_id: "pix".to_string(),
            payer: PaymentPayer {
                email: "ana@example.com".to_string(),
                name: None,
            },
            notification_url: "https://api.example.com/webhook/payments".to_string(),
            external_reference: "b2c9".to_string(),
            token: None,
            installments: None,
            application_fee: Some(dec!(2.55)),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["application_fee"], serde_json::json!(2.55));
        // The payer-facing amount stays the full total.
        assert_eq!(json["transaction_amount"], serde_json::json!(25.5));
    }

    #[test]
    fn parses_pix_payment_resource() {
        let body = r#"{
            "id": 987654321,
            "status": "pending",
            "status_detail": "pending_waiting_transfer",
            "payment_method_id": "pix",
            "external_reference": "3f8a",
            "point_of_interaction": {
                "transaction_data": {
                    "qr_code": "00020126580014br.gov.bcb.pix",
                    "qr_code_base64": "aGVsbG8=",
                    "ticket_url": "https://gateway.example/ticket/1"
                }
            }
        }"#;

        let resource: PaymentResource = serde_json::from_str(body).unwrap();
        assert_eq!(resource.id_string().as_deref(), Some("987654321"));
        assert_eq!(resource.status.as_deref(), Some("pending"));
        let data = resource.transaction_data().unwrap();
        assert_eq!(data.qr_code.as_deref(), Some("00020126580014br.gov.bcb.pix"));
    }

    #[test]
    fn tolerates_missing_artifacts() {
        let resource: PaymentResource =
            serde_json::from_str(r#"{"id": 1, "status": "approved"}"#).unwrap();
        assert!(resource.transaction_data().is_none());
        assert_eq!(resource.external_reference, None);
    }

    #[test]
    fn oauth_response_account_id_from_number() {
        let response: OAuthTokenResponse =
            serde_json::from_str(r#"{"access_token": "APP_USR-1", "user_id": 246}"#).unwrap();
        assert_eq!(response.account_id().as_deref(), Some("246"));
    }
}
