use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::AppError;
use crate::models::WebhookNotification;
use crate::services::PaymentService;

/// Gateway notification endpoint. Answers 200 for every structurally
/// valid notification this service cannot act on (wrong type, unknown
/// payment, unknown order), because anything else makes the gateway
/// redeliver forever. A failed authoritative fetch or a database error
/// propagates as a non-2xx on purpose: the gateway's at-least-once
/// redelivery is the retry mechanism for this path.
pub async fn payment_webhook(
    payment_service: web::Data<PaymentService>,
    body: web::Json<WebhookNotification>,
) -> Result<HttpResponse, AppError> {
    payment_service.handle_webhook(&body).await?;

    Ok(HttpResponse::Ok().json(json!({
        "received": true
    })))
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/payments", web::post().to(payment_webhook)));
}
