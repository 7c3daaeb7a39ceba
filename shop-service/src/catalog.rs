//! Catalog Store: read-only access to product records.
//!
//! Stock is never written from here; every mutation of `products.stock`
//! goes through the inventory manager.

use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::Product;

use crate::db::{with_deadline, DbPool};
use crate::error::{Result, ShopError};
use crate::models::ProductRow;
use crate::schema::products;

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Products ascending by id. A non-positive `limit` falls back to the
    /// store's default page size.
    async fn list_products(&self, limit: i32, offset: i32) -> Result<Vec<Product>>;

    async fn product(&self, product_id: i64) -> Result<Product>;
}

/// Resolves the page size actually queried for a caller-supplied limit.
pub fn effective_limit(limit: i32, default_page_size: i64) -> i64 {
    if limit <= 0 {
        default_page_size
    } else {
        i64::from(limit)
    }
}

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: DbPool,
    default_page_size: i64,
    deadline: Duration,
}

impl PgCatalogStore {
    pub fn new(pool: DbPool, default_page_size: i64, deadline: Duration) -> Self {
        Self {
            pool,
            default_page_size,
            deadline,
        }
    }
}

#[async_trait]
impl CatalogReader for PgCatalogStore {
    async fn list_products(&self, limit: i32, offset: i32) -> Result<Vec<Product>> {
        let limit = effective_limit(limit, self.default_page_size);
        let offset = i64::from(offset.max(0));

        let rows = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;
            let rows = products::table
                .order(products::product_id.asc())
                .limit(limit)
                .offset(offset)
                .select(ProductRow::as_select())
                .load::<ProductRow>(&mut conn)
                .await?;
            Ok::<_, ShopError>(rows)
        })
        .await
        .inspect_err(|e| tracing::error!(limit, offset, error = %e, "failed to list products"))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn product(&self, product_id: i64) -> Result<Product> {
        let row = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;
            let row = products::table
                .find(product_id)
                .select(ProductRow::as_select())
                .first::<ProductRow>(&mut conn)
                .await
                .optional()?;
            Ok::<_, ShopError>(row)
        })
        .await
        .inspect_err(|e| tracing::error!(product_id, error = %e, "failed to load product"))?;

        row.map(Product::from)
            .ok_or(ShopError::ProductNotFound(product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_limit_uses_default_page_size() {
        assert_eq!(effective_limit(0, 10), 10);
        assert_eq!(effective_limit(-3, 25), 25);
        assert_eq!(effective_limit(4, 10), 4);
    }
}
