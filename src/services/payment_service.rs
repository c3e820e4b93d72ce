//! Payment initiation and reconciliation against the external gateway.
//!
//! The remote payment state is authoritative. Local state is updated on
//! two paths: synchronously when a payment intent is created, and
//! asynchronously when the gateway notifies us and we re-fetch the
//! payment. Both paths funnel every order mutation through the same
//! guarded, row-scoped transition so repeated or out-of-order
//! notifications cannot corrupt an order.

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::external::mercadopago::{
    CreatePaymentRequest, MercadoPagoClient, PaymentPayer, PaymentResource,
};
use crate::models::*;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, user_id, restaurant_id, total, status, payment_status, payment_id, payment_method, created_at";

/// Credential set a payment call must use, resolved per order.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCredential {
    pub access_token: String,
    /// Platform commission on this payment. Present only for
    /// merchant-delegated credentials; never subtracted from the amount
    /// the payer sees.
    pub application_fee: Option<Decimal>,
}

/// Pick the credential for a restaurant: a merchant that connected its
/// own gateway account gets commission-bearing payments through it,
/// everyone else routes through the platform account with no commission.
/// Pure function of restaurant state.
pub fn resolve_credential(
    restaurant: &Restaurant,
    platform_token: &str,
    commission_percent: u32,
    order_total: Decimal,
) -> GatewayCredential {
    match restaurant.delegated_access_token.as_deref() {
        Some(token) if !token.is_empty() => {
            let fee =
                (order_total * Decimal::from(commission_percent) / Decimal::from(100)).round_dp(2);
            GatewayCredential {
                access_token: token.to_string(),
                application_fee: Some(fee),
            }
        }
        _ => GatewayCredential {
            access_token: platform_token.to_string(),
            application_fee: None,
        },
    }
}

/// Single exhaustive mapping from gateway payment status to local state.
/// Adding a new gateway status is an edit here, nowhere else.
pub fn map_gateway_status(status: &str) -> (PaymentStatus, Option<OrderStatus>) {
    match status {
        "approved" => (PaymentStatus::Approved, Some(OrderStatus::Preparing)),
        "rejected" => (PaymentStatus::Rejected, Some(OrderStatus::Canceled)),
        "in_process" => (PaymentStatus::InProcess, None),
        // "pending" and anything unrecognized
        _ => (PaymentStatus::Pending, None),
    }
}

/// Fulfillment status after a reconciliation proposal. Only PENDING and
/// PREPARING orders may be moved; DELIVERING, DELIVERED and CANCELED are
/// floors the reconciler never regresses or resurrects.
pub fn fulfillment_after(current: OrderStatus, proposed: Option<OrderStatus>) -> OrderStatus {
    match (current, proposed) {
        (OrderStatus::Pending | OrderStatus::Preparing, Some(next)) => next,
        (current, _) => current,
    }
}

#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    gateway: GatewayConfig,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: GatewayConfig) -> Self {
        Self { pool, gateway }
    }

    fn client_for(&self, access_token: &str) -> MercadoPagoClient {
        MercadoPagoClient::new(
            &self.gateway.base_url,
            access_token,
            Duration::from_secs(self.gateway.timeout_secs),
        )
    }

    /// Create a PIX payment intent for an order and hand the scannable
    /// payload back to the payer. The order stays PENDING until the
    /// webhook (or poller-visible reconciliation) confirms the transfer.
    pub async fn create_pix_payment(
        &self,
        user_id: Uuid,
        request: &CreatePixPaymentRequest,
    ) -> AppResult<PixPaymentResponse> {
        let (order, user, restaurant) = self.load_payment_context(request.order_id, user_id).await?;

        let credential = resolve_credential(
            &restaurant,
            &self.gateway.access_token,
            self.gateway.commission_percent,
            order.total,
        );
        let client = self.client_for(&credential.access_token);

        let payment = client
            .create_payment(&CreatePaymentRequest {
                transaction_amount: order.total,
                description: format!("{} - pedido {}", restaurant.name, order.id),
                payment_method_id: "pix".to_string(),
                payer: PaymentPayer {
                    email: user.email,
                    name: Some(user.name),
                },
                notification_url: self.gateway.notification_url.clone(),
                external_reference: order.id.to_string(),
                token: None,
                installments: None,
                application_fee: credential.application_fee,
            })
            .await?;

        let payment_id = payment.id_string().ok_or_else(|| {
            AppError::MalformedGatewayResponse("PIX payment response missing id".to_string())
        })?;
        let qr_code = payment
            .transaction_data()
            .and_then(|d| d.qr_code.clone())
            .ok_or_else(|| {
                AppError::MalformedGatewayResponse(format!(
                    "PIX payment {payment_id} missing QR payload"
                ))
            })?;
        let qr_code_base64 = payment.transaction_data().and_then(|d| d.qr_code_base64.clone());
        let ticket_url = payment.transaction_data().and_then(|d| d.ticket_url.clone());

        // Re-invocation overwrites the previous attempt's payment id; the
        // stale gateway-side intent is left to expire (known limitation).
        sqlx::query(
            "UPDATE orders SET payment_id = $2, payment_status = $3, payment_method = $4 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(&payment_id)
        .bind(PaymentStatus::Pending)
        .bind("pix")
        .execute(&self.pool)
        .await?;

        log::info!(
            "Created PIX payment {} for order {} (total {}, fee {:?})",
            payment_id,
            order.id,
            order.total,
            credential.application_fee
        );

        Ok(PixPaymentResponse {
            order_id: order.id,
            payment_id,
            payment_status: PaymentStatus::Pending,
            qr_code,
            qr_code_base64,
            ticket_url,
        })
    }

    /// Create a card payment with a client-tokenized card. The gateway
    /// answers synchronously; an immediate approval moves the order into
    /// the kitchen queue, a decline leaves it PENDING so the payer can
    /// retry with another card.
    pub async fn create_card_payment(
        &self,
        user_id: Uuid,
        request: &CreateCardPaymentRequest,
    ) -> AppResult<CardPaymentResponse> {
        if request.card_token.is_empty() {
            return Err(AppError::ValidationError(
                "card_token is required".to_string(),
            ));
        }

        let (order, user, restaurant) = self.load_payment_context(request.order_id, user_id).await?;

        let credential = resolve_credential(
            &restaurant,
            &self.gateway.access_token,
            self.gateway.commission_percent,
            order.total,
        );
        let client = self.client_for(&credential.access_token);

        let payment = client
            .create_payment(&CreatePaymentRequest {
                transaction_amount: order.total,
                description: format!("{} - pedido {}", restaurant.name, order.id),
                payment_method_id: request.payment_method_id.clone(),
                payer: PaymentPayer {
                    email: user.email,
                    name: Some(user.name),
                },
                notification_url: self.gateway.notification_url.clone(),
                external_reference: order.id.to_string(),
                token: Some(request.card_token.clone()),
                installments: Some(request.installments.unwrap_or(1)),
                application_fee: credential.application_fee,
            })
            .await?;

        let payment_id = payment.id_string().ok_or_else(|| {
            AppError::MalformedGatewayResponse("Card payment response missing id".to_string())
        })?;
        let gateway_status = payment.status.clone().ok_or_else(|| {
            AppError::MalformedGatewayResponse(format!(
                "Card payment {payment_id} missing status"
            ))
        })?;

        let (payment_status, _) = map_gateway_status(&gateway_status);
        // Only confirmed money moves the order forward at initiation
        // time. A synchronous decline does not cancel: the webhook owns
        // terminal transitions and the payer may retry meanwhile.
        let target = match payment_status {
            PaymentStatus::Approved => Some(OrderStatus::Preparing),
            _ => None,
        };

        sqlx::query(
            "UPDATE orders SET payment_id = $2, payment_status = $3, payment_method = $4, \
             status = CASE WHEN $5::varchar IS NOT NULL AND status IN ('PENDING', 'PREPARING') \
                           THEN $5 ELSE status END \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(&payment_id)
        .bind(payment_status)
        .bind(&request.payment_method_id)
        .bind(target)
        .execute(&self.pool)
        .await?;

        log::info!(
            "Created card payment {} for order {}: {} ({})",
            payment_id,
            order.id,
            gateway_status,
            payment.status_detail.as_deref().unwrap_or("-")
        );

        Ok(CardPaymentResponse {
            order_id: order.id,
            payment_id,
            payment_status,
            order_status: fulfillment_after(order.status, target),
            status_detail: payment.status_detail,
        })
    }

    /// Reconcile local state from a gateway notification. The body is a
    /// hint only; the payment is re-fetched from the gateway before any
    /// state is touched. Irrelevant or unmatchable notifications are
    /// swallowed so the gateway stops redelivering them; a failed
    /// authoritative fetch propagates so it retries later.
    pub async fn handle_webhook(&self, notification: &WebhookNotification) -> AppResult<()> {
        if !notification.is_payment() {
            log::info!(
                "Ignoring webhook notification of type {:?}",
                notification.kind
            );
            return Ok(());
        }

        let payment_id = match notification.payment_id() {
            Some(id) => id,
            None => {
                log::warn!("Payment webhook without a payment id, acknowledging");
                return Ok(());
            }
        };

        let client = self.client_for(&self.gateway.access_token);
        let payment = client.get_payment(&payment_id).await?;

        let order_id = match Self::correlate(&payment) {
            Some(id) => id,
            None => {
                log::warn!(
                    "Payment {} carries no usable order reference ({:?}), acknowledging",
                    payment_id,
                    payment.external_reference
                );
                return Ok(());
            }
        };

        let gateway_status = payment.status.as_deref().unwrap_or("pending");
        let (payment_status, proposed) = map_gateway_status(gateway_status);

        let applied = self
            .apply_transition(
                order_id,
                payment_status,
                proposed,
                payment.payment_method_id.as_deref(),
            )
            .await?;

        if applied {
            log::info!(
                "Reconciled order {} from payment {}: gateway status {} -> payment_status {:?}",
                order_id,
                payment_id,
                gateway_status,
                payment_status
            );
        } else {
            log::warn!(
                "Payment {} references unknown order {}, acknowledging",
                payment_id,
                order_id
            );
        }

        Ok(())
    }

    /// Client-facing pull fallback for delayed or dropped webhooks.
    /// Reflects the ledger only; never calls the gateway.
    pub async fn get_payment_status(&self, order_id: Uuid) -> AppResult<PaymentStatusResponse> {
        let order: Order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        Ok(PaymentStatusResponse {
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            payment_id: order.payment_id,
        })
    }

    /// OAuth delegation: exchange a merchant's authorization code and
    /// store the delegated credential on the restaurant. Subsequent
    /// payments for that restaurant route through its own account.
    pub async fn connect_merchant(
        &self,
        acting_user: Uuid,
        request: &ConnectMerchantRequest,
    ) -> AppResult<ConnectMerchantResponse> {
        if self.gateway.client_id.is_empty() || self.gateway.client_secret.is_empty() {
            return Err(AppError::ConfigError(
                "Gateway OAuth application credentials are not configured".to_string(),
            ));
        }

        let restaurant: Restaurant = sqlx::query_as(
            "SELECT id, owner_id, name, delegated_access_token, delegated_account_id \
             FROM restaurants WHERE id = $1",
        )
        .bind(request.restaurant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Restaurant {} not found", request.restaurant_id))
        })?;

        if restaurant.owner_id != acting_user {
            return Err(AppError::Forbidden);
        }

        let client = self.client_for(&self.gateway.access_token);
        let token = client
            .exchange_oauth_code(
                &self.gateway.client_id,
                &self.gateway.client_secret,
                &request.authorization_code,
                &self.gateway.oauth_redirect_uri,
            )
            .await?;

        let access_token = token.access_token.clone().ok_or_else(|| {
            AppError::MalformedGatewayResponse("OAuth response missing access_token".to_string())
        })?;
        let account_id = token.account_id().ok_or_else(|| {
            AppError::MalformedGatewayResponse("OAuth response missing user_id".to_string())
        })?;

        sqlx::query(
            "UPDATE restaurants SET delegated_access_token = $2, delegated_account_id = $3 \
             WHERE id = $1",
        )
        .bind(restaurant.id)
        .bind(&access_token)
        .bind(&account_id)
        .execute(&self.pool)
        .await?;

        log::info!(
            "Connected restaurant {} to gateway account {}",
            restaurant.id,
            account_id
        );

        Ok(ConnectMerchantResponse {
            restaurant_id: restaurant.id,
            delegated_account_id: account_id,
        })
    }

    /// Extract the local order id a payment was created for.
    fn correlate(payment: &PaymentResource) -> Option<Uuid> {
        payment
            .external_reference
            .as_deref()
            .and_then(|r| Uuid::parse_str(r).ok())
    }

    /// Apply a reconciliation result to a single order row. One guarded
    /// UPDATE: payment_status always follows the latest authoritative
    /// fetch, the fulfillment status only moves while the order is
    /// PENDING or PREPARING. Safe under redelivery and reordering, since
    /// re-applying the same authoritative state is a no-op and terminal
    /// fulfillment states never change. Returns false when no such order
    /// exists.
    async fn apply_transition(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        proposed: Option<OrderStatus>,
        payment_method: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, \
             payment_method = COALESCE($3, payment_method), \
             status = CASE WHEN $4::varchar IS NOT NULL AND status IN ('PENDING', 'PREPARING') \
                           THEN $4 ELSE status END \
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(payment_status)
        .bind(payment_method)
        .bind(proposed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load the order plus its payer and restaurant for a payment
    /// attempt, enforcing that the caller owns the order.
    async fn load_payment_context(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<(Order, User, Restaurant)> {
        let order: Order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        if order.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        let user: User = sqlx::query_as("SELECT id, name, email, role FROM users WHERE id = $1")
            .bind(order.user_id)
            .fetch_one(&self.pool)
            .await?;

        let restaurant: Restaurant = sqlx::query_as(
            "SELECT id, owner_id, name, delegated_access_token, delegated_account_id \
             FROM restaurants WHERE id = $1",
        )
        .bind(order.restaurant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((order, user, restaurant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn restaurant(delegated: Option<&str>) -> Restaurant {
        Restaurant {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Cantina".to_string(),
            delegated_access_token: delegated.map(str::to_string),
            delegated_account_id: delegated.map(|_| "246".to_string()),
        }
    }

    #[test]
    fn platform_credential_without_delegation() {
        let credential =
            resolve_credential(&restaurant(None), "PLATFORM-TOKEN", 10, dec!(25.50));
        assert_eq!(credential.access_token, "PLATFORM-TOKEN");
        assert_eq!(credential.application_fee, None);
    }

    #[test]
    fn delegated_credential_carries_commission() {
        let credential = resolve_credential(
            &restaurant(Some("MERCHANT-TOKEN")),
            "PLATFORM-TOKEN",
            10,
            dec!(25.50),
        );
        assert_eq!(credential.access_token, "MERCHANT-TOKEN");
        assert_eq!(credential.application_fee, Some(dec!(2.55)));
    }

    #[test]
    fn commission_is_rounded_to_cents() {
        let credential = resolve_credential(
            &restaurant(Some("MERCHANT-TOKEN")),
            "PLATFORM-TOKEN",
            10,
            dec!(19.99),
        );
        assert_eq!(credential.application_fee, Some(dec!(2.00)));
    }

    #[test]
    fn empty_delegated_token_falls_back_to_platform() {
        let credential =
            resolve_credential(&restaurant(Some("")), "PLATFORM-TOKEN", 10, dec!(25.50));
        assert_eq!(credential.access_token, "PLATFORM-TOKEN");
        assert_eq!(credential.application_fee, None);
    }

    #[test]
    fn status_table_covers_all_gateway_states() {
        assert_eq!(
            map_gateway_status("approved"),
            (PaymentStatus::Approved, Some(OrderStatus::Preparing))
        );
        assert_eq!(
            map_gateway_status("rejected"),
            (PaymentStatus::Rejected, Some(OrderStatus::Canceled))
        );
        assert_eq!(
            map_gateway_status("in_process"),
            (PaymentStatus::InProcess, None)
        );
        assert_eq!(map_gateway_status("pending"), (PaymentStatus::Pending, None));
        assert_eq!(
            map_gateway_status("something_new"),
            (PaymentStatus::Pending, None)
        );
    }

    #[test]
    fn approval_moves_pending_order_to_preparing() {
        let (_, proposed) = map_gateway_status("approved");
        assert_eq!(
            fulfillment_after(OrderStatus::Pending, proposed),
            OrderStatus::Preparing
        );
    }

    #[test]
    fn reapplying_approval_is_idempotent() {
        let (_, proposed) = map_gateway_status("approved");
        let once = fulfillment_after(OrderStatus::Pending, proposed);
        let twice = fulfillment_after(once, proposed);
        assert_eq!(once, twice);
        assert_eq!(twice, OrderStatus::Preparing);
    }

    #[test]
    fn delivered_is_a_floor() {
        let (_, rejected) = map_gateway_status("rejected");
        assert_eq!(
            fulfillment_after(OrderStatus::Delivered, rejected),
            OrderStatus::Delivered
        );
        let (_, approved) = map_gateway_status("approved");
        assert_eq!(
            fulfillment_after(OrderStatus::Delivered, approved),
            OrderStatus::Delivered
        );
    }

    #[test]
    fn canceled_order_is_not_resurrected_by_late_approval() {
        let (_, approved) = map_gateway_status("approved");
        assert_eq!(
            fulfillment_after(OrderStatus::Canceled, approved),
            OrderStatus::Canceled
        );
    }

    #[test]
    fn delivering_is_never_regressed() {
        let (_, rejected) = map_gateway_status("rejected");
        assert_eq!(
            fulfillment_after(OrderStatus::Delivering, rejected),
            OrderStatus::Delivering
        );
    }
}
