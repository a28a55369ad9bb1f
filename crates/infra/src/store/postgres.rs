//! Postgres-backed inventory store.
//!
//! Expects the tables in `sql/schema.sql`; schema management is left to the operator.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `23505` (unique violation) | `Conflict` | duplicate SKU or warehouse/product pair |
//! | `23503` (foreign key violation) | `NotFound` | parent row missing or deleted concurrently |
//! | any other / pool / network | `Backend` | |
//!
//! Ledger units of work take `SELECT ... FOR UPDATE` on the inventory row, so concurrent
//! movements on one row queue behind each other until the holder commits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockflow_core::{InventoryId, MovementId, ProductId, WarehouseId};
use stockflow_inventory::{
    InventoryFilter, InventoryRecord, MovementFilter, MovementRecord, MovementType, NewInventory,
    NewMovement, NewProduct, NewWarehouse, Product, ProductFilter, Warehouse, WarehouseFilter,
};

use super::{InventoryStore, StoreCounts, StoreError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn count(&self, sql: &str, operation: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(sql)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let n: i64 = row.try_get(0).map_err(|e| map_sqlx_error(operation, e))?;
        Ok(n.max(0) as u64)
    }
}

const WAREHOUSE_COLUMNS: &str = "id, name, location, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, sku, created_at";
const INVENTORY_COLUMNS: &str = "id, warehouse_id, product_id, quantity, created_at, updated_at";
const MOVEMENT_COLUMNS: &str = "id, inventory_id, type, quantity, timestamp";

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self), fields(warehouse_id = %id), err)]
    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_warehouse", e))?;
        row.as_ref().map(warehouse_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_warehouses(&self, filter: &WarehouseFilter) -> Result<Vec<Warehouse>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WAREHOUSE_COLUMNS}
            FROM warehouses
            WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
                AND ($2::text IS NULL OR location ILIKE '%' || $2 || '%')
            ORDER BY id ASC
            "#
        ))
        .bind(filter.name.as_deref())
        .bind(filter.location.as_deref())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_warehouses", e))?;
        rows.iter().map(warehouse_from_row).collect()
    }

    #[instrument(skip(self, new), err)]
    async fn create_warehouse(&self, new: NewWarehouse) -> Result<Warehouse, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO warehouses (name, location) VALUES ($1, $2) RETURNING {WAREHOUSE_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.location)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_warehouse", e))?;
        warehouse_from_row(&row)
    }

    #[instrument(skip(self), fields(warehouse_id = %id), err)]
    async fn delete_warehouse(&self, id: WarehouseId) -> Result<bool, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(false);
        };
        // inventory and transactions go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_warehouse", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
                AND ($2::text IS NULL OR sku ILIKE '%' || $2 || '%')
            ORDER BY id ASC
            "#
        ))
        .bind(filter.name.as_deref())
        .bind(filter.sku.as_deref())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, new), fields(sku = %new.sku), err)]
    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (name, description, sku) VALUES ($1, $2, $3) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.sku)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("sku '{}' already exists", new.sku))
            } else {
                map_sqlx_error("create_product", e)
            }
        })?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn get_inventory(&self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {INVENTORY_COLUMNS} FROM inventory WHERE id = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_inventory", e))?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_inventory(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        let (Some(warehouse_id), Some(product_id)) = (
            optional_sql_id(filter.warehouse_id.map(WarehouseId::get)),
            optional_sql_id(filter.product_id.map(ProductId::get)),
        ) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INVENTORY_COLUMNS}
            FROM inventory
            WHERE ($1::bigint IS NULL OR warehouse_id = $1)
                AND ($2::bigint IS NULL OR product_id = $2)
            ORDER BY id ASC
            "#
        ))
        .bind(warehouse_id)
        .bind(product_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_inventory", e))?;
        rows.iter().map(inventory_from_row).collect()
    }

    #[instrument(
        skip(self, new),
        fields(warehouse_id = %new.warehouse_id, product_id = %new.product_id),
        err
    )]
    async fn create_inventory(&self, new: NewInventory) -> Result<InventoryRecord, StoreError> {
        let (Some(warehouse_key), Some(product_key)) = (sql_id(new.warehouse_id.get()), sql_id(new.product_id.get()))
        else {
            return Err(StoreError::NotFound(format!(
                "warehouse {} or product {}",
                new.warehouse_id, new.product_id
            )));
        };
        let row = sqlx::query(&format!(
            "INSERT INTO inventory (warehouse_id, product_id, quantity) VALUES ($1, $2, 0) RETURNING {INVENTORY_COLUMNS}"
        ))
        .bind(warehouse_key)
        .bind(product_key)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "inventory for warehouse {} and product {} already exists",
                    new.warehouse_id, new.product_id
                ))
            } else if is_foreign_key_violation(&e) {
                StoreError::NotFound(format!(
                    "warehouse {} or product {}",
                    new.warehouse_id, new.product_id
                ))
            } else {
                map_sqlx_error("create_inventory", e)
            }
        })?;
        inventory_from_row(&row)
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn delete_inventory(&self, id: InventoryId) -> Result<bool, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM inventory WHERE id = $1")
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_inventory", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn get_movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {MOVEMENT_COLUMNS} FROM transactions WHERE id = $1"))
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_movement", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, StoreError> {
        let Some(inventory_id) = optional_sql_id(filter.inventory_id.map(InventoryId::get)) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM transactions
            WHERE ($1::bigint IS NULL OR inventory_id = $1)
                AND ($2::text IS NULL OR type = $2)
            ORDER BY id ASC
            "#
        ))
        .bind(inventory_id)
        .bind(filter.movement_type.map(MovementType::as_str))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn recent_movements(&self, limit: usize) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM transactions ORDER BY timestamp DESC, id DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        Ok(StoreCounts {
            warehouses: self.count("SELECT COUNT(*) FROM warehouses", "count_warehouses").await?,
            products: self.count("SELECT COUNT(*) FROM products", "count_products").await?,
            inventory: self.count("SELECT COUNT(*) FROM inventory", "count_inventory").await?,
            transactions: self.count("SELECT COUNT(*) FROM transactions", "count_transactions").await?,
            zero_quantity: self
                .count("SELECT COUNT(*) FROM inventory WHERE quantity = 0", "count_zero_quantity")
                .await?,
        })
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError> {
        let Some(key) = sql_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE id = $1 FOR UPDATE"
        ))
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_inventory", e))?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn set_quantity(
        &mut self,
        id: InventoryId,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = sql_id(id.get()).ok_or_else(|| StoreError::NotFound(format!("inventory {id}")))?;
        let result = sqlx::query("UPDATE inventory SET quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(key)
            .bind(quantity)
            .bind(updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_quantity", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("inventory {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, movement), fields(inventory_id = %movement.inventory_id), err)]
    async fn insert_movement(
        &mut self,
        movement: NewMovement,
        timestamp: DateTime<Utc>,
    ) -> Result<MovementRecord, StoreError> {
        let inventory_key = sql_id(movement.inventory_id.get())
            .ok_or_else(|| StoreError::NotFound(format!("inventory {}", movement.inventory_id)))?;
        let row = sqlx::query(&format!(
            "INSERT INTO transactions (inventory_id, type, quantity, timestamp) VALUES ($1, $2, $3, $4) RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(inventory_key)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(timestamp)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::NotFound(format!("inventory {}", movement.inventory_id))
            } else {
                map_sqlx_error("insert_movement", e)
            }
        })?;
        movement_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Ids are BIGSERIAL; one beyond `i64::MAX` cannot name a stored row.
fn sql_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

/// `Some(None)` for an absent filter, `None` for one no row can match.
fn optional_sql_id(id: Option<u64>) -> Option<Option<i64>> {
    match id {
        None => Some(None),
        Some(id) => sql_id(id).map(Some),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to decode column '{name}': {e}")))
}

fn serial(row: &PgRow, name: &str) -> Result<u64, StoreError> {
    let value: i64 = column(row, name)?;
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("negative id in column '{name}'")))
}

fn warehouse_from_row(row: &PgRow) -> Result<Warehouse, StoreError> {
    Ok(Warehouse {
        id: WarehouseId::new(serial(row, "id")?),
        name: column(row, "name")?,
        location: column(row, "location")?,
        created_at: column(row, "created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::new(serial(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        sku: column(row, "sku")?,
        created_at: column(row, "created_at")?,
    })
}

fn inventory_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    Ok(InventoryRecord::restore(
        InventoryId::new(serial(row, "id")?),
        WarehouseId::new(serial(row, "warehouse_id")?),
        ProductId::new(serial(row, "product_id")?),
        column(row, "quantity")?,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    ))
}

fn movement_from_row(row: &PgRow) -> Result<MovementRecord, StoreError> {
    let movement_type: String = column(row, "type")?;
    Ok(MovementRecord {
        id: MovementId::new(serial(row, "id")?),
        inventory_id: InventoryId::new(serial(row, "inventory_id")?),
        movement_type: movement_type
            .parse()
            .map_err(|e| StoreError::Backend(format!("bad movement type in row: {e}")))?,
        quantity: column(row, "quantity")?,
        timestamp: column(row, "timestamp")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn sqlstate_is(err: &sqlx::Error, code: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(actual) = db_err.code() {
            return actual.as_ref() == code;
        }
    }
    false
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate_is(err, "23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate_is(err, "23503")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_beyond_bigint_never_reach_the_database() {
        assert_eq!(sql_id(42), Some(42));
        assert_eq!(sql_id(i64::MAX as u64), Some(i64::MAX));
        assert_eq!(sql_id(i64::MAX as u64 + 1), None);
        assert_eq!(sql_id(u64::MAX), None);
    }

    #[test]
    fn out_of_range_filter_matches_nothing() {
        assert_eq!(optional_sql_id(None), Some(None));
        assert_eq!(optional_sql_id(Some(7)), Some(Some(7)));
        assert_eq!(optional_sql_id(Some(u64::MAX)), None);
    }
}
