use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::PaymentService;

fn auth_user(req: &HttpRequest) -> Result<AuthUser, AppError> {
    use actix_web::HttpMessage;
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::AuthError("Missing authenticated user".to_string()))
}

#[utoipa::path(
    post,
    path = "/payments/pix",
    tag = "payment",
    request_body = CreatePixPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "PIX intent created, QR payload returned"),
        (status = 404, description = "Unknown order"),
        (status = 502, description = "Gateway unavailable or malformed response")
    )
)]
pub async fn create_pix_payment(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    body: web::Json<CreatePixPaymentRequest>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match payment_service.create_pix_payment(user.id, &body).await {
        Ok(payment) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": payment
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/payments/card",
    tag = "payment",
    request_body = CreateCardPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Card charged (or declined) synchronously"),
        (status = 404, description = "Unknown order"),
        (status = 502, description = "Gateway unavailable or malformed response")
    )
)]
pub async fn create_card_payment(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    body: web::Json<CreateCardPaymentRequest>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match payment_service.create_card_payment(user.id, &body).await {
        Ok(payment) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": payment
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payments/{order_id}/status",
    tag = "payment",
    params(("order_id" = Uuid, Path, description = "Order id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current ledger view of the payment", body = PaymentStatusResponse),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn get_payment_status(
    payment_service: web::Data<PaymentService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match payment_service.get_payment_status(path.into_inner()).await {
        Ok(status) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": status
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/payments/oauth/connect",
    tag = "payment",
    request_body = ConnectMerchantRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Delegated credential stored on the restaurant"),
        (status = 403, description = "Caller does not own the restaurant"),
        (status = 404, description = "Unknown restaurant")
    )
)]
pub async fn connect_merchant(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    body: web::Json<ConnectMerchantRequest>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match payment_service.connect_merchant(user.id, &body).await {
        Ok(connection) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": connection
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/pix", web::post().to(create_pix_payment))
            .route("/card", web::post().to(create_card_payment))
            .route("/oauth/connect", web::post().to(connect_merchant))
            .route("/{order_id}/status", web::get().to(get_payment_status)),
    );
}
