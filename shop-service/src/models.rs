use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Order, OrderStatus, Product};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::products)]
#[diesel(primary_key(product_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub product_id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::products)]
pub struct NewProduct {
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(primary_key(order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub order_id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.product_id,
            name: row.name,
            price: row.price,
            stock: row.stock,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = crate::ShopError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse()?;

        Ok(Self {
            id: row.order_id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            sum: row.total,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            payment_handle: None,
        })
    }
}
