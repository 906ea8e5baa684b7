//! Full-replace loaders for the small reference tables. These tables are
//! cheap to rebuild, so each run clears them in `prepare` and re-inserts
//! the current source snapshot.

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::extract::TimeWindow;
use crate::records::{ServiceRecord, ShopRecord, StaffRecord};

use super::{LoadOutcome, Loader};

async fn clear_table(pool: &DbPool, table: &str) -> Result<u64> {
    let deleted = sqlx::query(&format!("DELETE FROM {table}"))
        .execute(pool)
        .await
        .map_err(|e| EtlError::Load(format!("clear {table}: {e}")))?
        .rows_affected();
    Ok(deleted)
}

pub struct ShopLoader {
    pool: DbPool,
}

impl ShopLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for ShopLoader {
    type Record = ShopRecord;

    fn table(&self) -> &'static str {
        "shops"
    }

    async fn prepare(&self, _window: Option<&TimeWindow>) -> Result<u64> {
        clear_table(&self.pool, self.table()).await
    }

    async fn load(&self, chunk: &[ShopRecord]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin shops tx: {e}")))?;

        for row in chunk {
            sqlx::query(
                "INSERT INTO shops (shop_id, name, address, phone, updated_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(row.shop_id)
            .bind(&row.name)
            .bind(&row.address)
            .bind(&row.phone)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::Load(format!("insert shop {}: {e}", row.shop_id)))?;
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit shops tx: {e}")))?;

        Ok(LoadOutcome {
            inserted: chunk.len() as u64,
            ..LoadOutcome::default()
        })
    }
}

pub struct ServiceLoader {
    pool: DbPool,
}

impl ServiceLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for ServiceLoader {
    type Record = ServiceRecord;

    fn table(&self) -> &'static str {
        "services"
    }

    async fn prepare(&self, _window: Option<&TimeWindow>) -> Result<u64> {
        clear_table(&self.pool, self.table()).await
    }

    async fn load(&self, chunk: &[ServiceRecord]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin services tx: {e}")))?;

        for row in chunk {
            sqlx::query(
                "INSERT INTO services (service_id, name, category, price, duration_minutes, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(row.service_id)
            .bind(&row.name)
            .bind(&row.category)
            .bind(row.price)
            .bind(row.duration_minutes)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::Load(format!("insert service {}: {e}", row.service_id)))?;
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit services tx: {e}")))?;

        Ok(LoadOutcome {
            inserted: chunk.len() as u64,
            ..LoadOutcome::default()
        })
    }
}

pub struct StaffLoader {
    pool: DbPool,
}

impl StaffLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for StaffLoader {
    type Record = StaffRecord;

    fn table(&self) -> &'static str {
        "staff"
    }

    async fn prepare(&self, _window: Option<&TimeWindow>) -> Result<u64> {
        clear_table(&self.pool, self.table()).await
    }

    async fn load(&self, chunk: &[StaffRecord]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin staff tx: {e}")))?;

        for row in chunk {
            sqlx::query(
                "INSERT INTO staff (staff_id, name, shop_id, role, updated_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(row.staff_id)
            .bind(&row.name)
            .bind(row.shop_id)
            .bind(&row.role)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::Load(format!("insert staff {}: {e}", row.staff_id)))?;
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit staff tx: {e}")))?;

        Ok(LoadOutcome {
            inserted: chunk.len() as u64,
            ..LoadOutcome::default()
        })
    }
}
