use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{OrderStatus, PaymentStatus};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePixPaymentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCardPaymentRequest {
    pub order_id: Uuid,
    /// Tokenized card reference produced client-side; raw card data never
    /// reaches this service.
    pub card_token: String,
    /// Card brand identifier understood by the gateway, e.g. "visa".
    pub payment_method_id: String,
    #[serde(default)]
    pub installments: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PixPaymentResponse {
    pub order_id: Uuid,
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    /// Copy-and-paste PIX payload.
    pub qr_code: String,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CardPaymentResponse {
    pub order_id: Uuid,
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Gateway diagnostic detail, passed through for declined cards.
    pub status_detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectMerchantRequest {
    pub restaurant_id: Uuid,
    /// Authorization code obtained by the merchant on the gateway's
    /// consent screen.
    pub authorization_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectMerchantResponse {
    pub restaurant_id: Uuid,
    pub delegated_account_id: String,
}

/// Inbound webhook notification body. The gateway sends `data.id` as a
/// string or a number depending on the notification type, so it is kept
/// loose here and coerced on access.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl WebhookNotification {
    pub fn is_payment(&self) -> bool {
        self.kind.as_deref() == Some("payment")
    }

    /// External payment id referenced by the notification, if present.
    pub fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_notification_with_numeric_id() {
        let n: WebhookNotification =
            serde_json::from_str(r#"{"type":"payment","data":{"id":12345}}"#).unwrap();
        assert!(n.is_payment());
        assert_eq!(n.payment_id().as_deref(), Some("12345"));
    }

    #[test]
    fn payment_notification_with_string_id() {
        let n: WebhookNotification =
            serde_json::from_str(r#"{"type":"payment","data":{"id":"abc-1"}}"#).unwrap();
        assert_eq!(n.payment_id().as_deref(), Some("abc-1"));
    }

    #[test]
    fn irrelevant_notification_type() {
        let n: WebhookNotification =
            serde_json::from_str(r#"{"type":"plan","data":{"id":"p-1"}}"#).unwrap();
        assert!(!n.is_payment());
    }

    #[test]
    fn missing_data_block() {
        let n: WebhookNotification = serde_json::from_str(r#"{"type":"payment"}"#).unwrap();
        assert!(n.is_payment());
        assert_eq!(n.payment_id(), None);
    }
}
