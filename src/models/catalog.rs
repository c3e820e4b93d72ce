//! Row types for collaborators owned by the wider application. The
//! payment subsystem only reads these; catalog and profile management
//! live elsewhere.

use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct Restaurant {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub delegated_access_token: Option<String>,
    pub delegated_account_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}
