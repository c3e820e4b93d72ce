use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::OrderService;

fn auth_user(req: &HttpRequest) -> Result<AuthUser, AppError> {
    use actix_web::HttpMessage;
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::AuthError("Missing authenticated user".to_string()))
}

#[utoipa::path(
    post,
    path = "/orders",
    tag = "order",
    request_body = CreateOrderRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Order created with a frozen price snapshot"),
        (status = 404, description = "Unknown restaurant or product"),
        (status = 409, description = "Items from more than one restaurant")
    )
)]
pub async fn create_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match order_service.create_order(user.id, &body).await {
        Ok(order) => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/orders/my-orders",
    tag = "order",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's orders, newest first"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_my_orders(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match order_service.get_user_orders(user.id).await {
        Ok(orders) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": orders
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "order",
    params(("id" = Uuid, Path, description = "Order id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Order with items"),
        (status = 403, description = "Caller is neither payer nor owner"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn get_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match order_service.get_order(path.into_inner(), user.id).await {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/orders/restaurant/{restaurant_id}",
    tag = "order",
    params(("restaurant_id" = Uuid, Path, description = "Restaurant id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Orders for the restaurant"),
        (status = 403, description = "Caller does not own the restaurant"),
        (status = 404, description = "Unknown restaurant")
    )
)]
pub async fn get_restaurant_orders(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match order_service
        .get_restaurant_orders(path.into_inner(), user.id)
        .await
    {
        Ok(orders) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": orders
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    tag = "order",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fulfillment status updated"),
        (status = 403, description = "Caller does not own the restaurant"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn update_order_status(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse> {
    let user = match auth_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match order_service
        .update_order_status(path.into_inner(), user.id, body.status)
        .await
    {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn order_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(create_order))
            .route("/my-orders", web::get().to(get_my_orders))
            .route("/restaurant/{restaurant_id}", web::get().to(get_restaurant_orders))
            .route("/{id}/status", web::patch().to(update_order_status))
            .route("/{id}", web::get().to(get_order)),
    );
}
