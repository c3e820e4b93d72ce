use crate::error::{AppError, AppResult};
use crate::models::*;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, user_id, restaurant_id, total, status, payment_status, payment_id, payment_method, created_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price";

#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
}

/// Immutable per-item price snapshot produced at order creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// Resolve a cart against the current catalog: every product must exist,
/// belong to the declared restaurant and be requested with a positive
/// quantity. Returns the frozen total and the per-item snapshots.
pub fn snapshot_cart(
    restaurant_id: Uuid,
    items: &[CartItem],
    products: &HashMap<Uuid, Product>,
) -> AppResult<(Decimal, Vec<ItemSnapshot>)> {
    if items.is_empty() {
        return Err(AppError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut total = Decimal::ZERO;
    let mut snapshots = Vec::with_capacity(items.len());

    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::ValidationError(format!(
                "Invalid quantity {} for product {}",
                item.quantity, item.product_id
            )));
        }

        let product = products.get(&item.product_id).ok_or_else(|| {
            AppError::NotFound(format!("Product {} not found", item.product_id))
        })?;

        if product.restaurant_id != restaurant_id {
            return Err(AppError::Conflict(
                "All items must be from the same restaurant".to_string(),
            ));
        }

        total += product.price * Decimal::from(item.quantity);
        snapshots.push(ItemSnapshot {
            product_id: product.id,
            quantity: item.quantity,
            price: product.price,
        });
    }

    Ok((total, snapshots))
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an order with a frozen price snapshot. Product resolution
    /// and the order/items insert happen in one transaction, so either
    /// the fully priced order persists or nothing does.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: &CreateOrderRequest,
    ) -> AppResult<OrderResponse> {
        let mut tx = self.pool.begin().await?;

        let restaurant_exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM restaurants WHERE id = $1")
                .bind(request.restaurant_id)
                .fetch_optional(&mut *tx)
                .await?;
        if restaurant_exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Restaurant {} not found",
                request.restaurant_id
            )));
        }

        // Share-lock the product rows so a concurrent catalog price edit
        // cannot land between pricing and the order insert.
        let product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let products: Vec<Product> = sqlx::query_as(
            "SELECT id, restaurant_id, name, price FROM products WHERE id = ANY($1) FOR SHARE",
        )
        .bind(&product_ids[..])
        .fetch_all(&mut *tx)
        .await?;
        let products: HashMap<Uuid, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();

        let (total, snapshots) = snapshot_cart(request.restaurant_id, &request.items, &products)?;

        let order: Order = sqlx::query_as(&format!(
            "INSERT INTO orders (id, user_id, restaurant_id, total) \
             VALUES ($1, $2, $3, $4) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.restaurant_id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let item: OrderItem = sqlx::query_as(&format!(
                "INSERT INTO order_items (order_id, product_id, quantity, price) \
                 VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
            ))
            .bind(order.id)
            .bind(snapshot.product_id)
            .bind(snapshot.quantity)
            .bind(snapshot.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        tx.commit().await?;

        log::info!(
            "Created order {} for user {} with total {}",
            order.id,
            user_id,
            order.total
        );

        Ok(OrderResponse::from_order(order, items))
    }

    /// Single order with items, visible to the payer and the restaurant
    /// owner only.
    pub async fn get_order(&self, order_id: Uuid, acting_user: Uuid) -> AppResult<OrderResponse> {
        let order: Order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        if order.user_id != acting_user {
            let owner: Option<(Uuid,)> =
                sqlx::query_as("SELECT owner_id FROM restaurants WHERE id = $1")
                    .bind(order.restaurant_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if owner.map(|o| o.0) != Some(acting_user) {
                return Err(AppError::Forbidden);
            }
        }

        let items = self.items_for(&[order.id]).await?;
        Ok(OrderResponse::from_order(order, items))
    }

    /// Orders placed by the given user, newest first.
    pub async fn get_user_orders(&self, user_id: Uuid) -> AppResult<Vec<OrderResponse>> {
        let orders: Vec<Order> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(orders).await
    }

    /// Orders for a restaurant, restricted to its owner.
    pub async fn get_restaurant_orders(
        &self,
        restaurant_id: Uuid,
        acting_user: Uuid,
    ) -> AppResult<Vec<OrderResponse>> {
        let owner: Option<(Uuid,)> =
            sqlx::query_as("SELECT owner_id FROM restaurants WHERE id = $1")
                .bind(restaurant_id)
                .fetch_optional(&self.pool)
                .await?;
        match owner {
            None => {
                return Err(AppError::NotFound(format!(
                    "Restaurant {restaurant_id} not found"
                )))
            }
            Some((owner_id,)) if owner_id != acting_user => return Err(AppError::Forbidden),
            Some(_) => {}
        }

        let orders: Vec<Order> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE restaurant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(orders).await
    }

    /// Manual fulfillment advancement by the restaurant owner
    /// (PREPARING -> DELIVERING -> DELIVERED). Shares the status column
    /// with payment reconciliation but is driven by the merchant.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        acting_user: Uuid,
        status: OrderStatus,
    ) -> AppResult<OrderResponse> {
        let order: Order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        let owner: Option<(Uuid,)> =
            sqlx::query_as("SELECT owner_id FROM restaurants WHERE id = $1")
                .bind(order.restaurant_id)
                .fetch_optional(&self.pool)
                .await?;
        if owner.map(|o| o.0) != Some(acting_user) {
            return Err(AppError::Forbidden);
        }

        let updated: Order = sqlx::query_as(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        log::info!("Order {} status set to {:?} by owner", order_id, status);

        let items = self.items_for(&[updated.id]).await?;
        Ok(OrderResponse::from_order(updated, items))
    }

    async fn items_for(&self, order_ids: &[Uuid]) -> AppResult<Vec<OrderItem>> {
        let items: Vec<OrderItem> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn with_items(&self, orders: Vec<Order>) -> AppResult<Vec<OrderResponse>> {
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in self.items_for(&ids).await? {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderResponse::from_order(order, items)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(restaurant_id: Uuid, price: Decimal) -> Product {
        Product {
            id: Uuid::new_v4(),
            restaurant_id,
            name: "item".to_string(),
            price,
        }
    }

    fn catalog(products: &[Product]) -> HashMap<Uuid, Product> {
        products.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn totals_sum_of_price_times_quantity() {
        let restaurant_id = Uuid::new_v4();
        let a = product(restaurant_id, dec!(10.00));
        let b = product(restaurant_id, dec!(5.50));
        let items = vec![
            CartItem {
                product_id: a.id,
                quantity: 2,
            },
            CartItem {
                product_id: b.id,
                quantity: 1,
            },
        ];

        let (total, snapshots) =
            snapshot_cart(restaurant_id, &items, &catalog(&[a.clone(), b.clone()])).unwrap();

        assert_eq!(total, dec!(25.50));
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].price, dec!(10.00));
        assert_eq!(snapshots[1].price, dec!(5.50));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let restaurant_id = Uuid::new_v4();
        let items = vec![CartItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
        }];

        let err = snapshot_cart(restaurant_id, &items, &HashMap::new()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn cross_merchant_cart_is_conflict() {
        let restaurant_id = Uuid::new_v4();
        let ours = product(restaurant_id, dec!(10.00));
        let theirs = product(Uuid::new_v4(), dec!(3.00));
        let items = vec![
            CartItem {
                product_id: ours.id,
                quantity: 1,
            },
            CartItem {
                product_id: theirs.id,
                quantity: 1,
            },
        ];

        let err =
            snapshot_cart(restaurant_id, &items, &catalog(&[ours, theirs])).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let restaurant_id = Uuid::new_v4();
        let a = product(restaurant_id, dec!(10.00));
        let items = vec![CartItem {
            product_id: a.id,
            quantity: 0,
        }];

        let err = snapshot_cart(restaurant_id, &items, &catalog(&[a])).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = snapshot_cart(Uuid::new_v4(), &[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
