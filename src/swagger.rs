use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::order::create_order,
        handlers::order::get_my_orders,
        handlers::order::get_order,
        handlers::order::get_restaurant_orders,
        handlers::order::update_order_status,
        handlers::payment::create_pix_payment,
        handlers::payment::create_card_payment,
        handlers::payment::get_payment_status,
        handlers::payment::connect_merchant,
    ),
    components(
        schemas(
            OrderStatus,
            PaymentStatus,
            CartItem,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderItemResponse,
            OrderResponse,
            CreatePixPaymentRequest,
            CreateCardPaymentRequest,
            PixPaymentResponse,
            CardPaymentResponse,
            PaymentStatusResponse,
            ConnectMerchantRequest,
            ConnectMerchantResponse,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "order", description = "Order creation and fulfillment API"),
        (name = "payment", description = "Payment initiation and status API"),
    ),
    info(
        title = "Delivery Backend API",
        version = "0.1.0",
        description = "Food-ordering marketplace backend REST API documentation",
    ),
    servers(
        (url = "/api", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
