use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;

use super::{fold_name, validate_all, StoreError, VehicleFilter, VehicleStore};
use crate::model::VehicleMake;

// make_name_folded holds the Unicode-lowercased name for filtering
const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS vehicle_makes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        make_id INTEGER NOT NULL CHECK (make_id > 0),
        make_name TEXT NOT NULL CHECK (length(trim(make_name)) > 0),
        make_name_folded TEXT NOT NULL,
        vehicle_types TEXT NOT NULL DEFAULT '[]'
    )";

const SELECT_PAGE: &str = "
    SELECT make_id, make_name, vehicle_types
    FROM vehicle_makes
    WHERE (?1 IS NULL OR instr(make_name_folded, ?1) > 0)
    ORDER BY id
    LIMIT ?2 OFFSET ?3";

// One document per row; vehicle types are kept as a JSON array
pub struct SqliteVehicleStore {
    pool: SqlitePool,
}

impl SqliteVehicleStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if url.contains(":memory:") || url.contains("mode=memory") {
            // each connection to an in-memory database sees its own database
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        tracing::debug!("vehicle_makes table ready");
        Ok(Self { pool })
    }
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    makes: &[VehicleMake],
) -> Result<usize, StoreError> {
    if makes.is_empty() {
        return Ok(0);
    }

    let mut rows = Vec::with_capacity(makes.len());
    for make in makes {
        let vehicle_types = serde_json::to_string(&make.vehicle_types)?;
        rows.push((
            make.make_id,
            make.make_name.as_str(),
            fold_name(&make.make_name),
            vehicle_types,
        ));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO vehicle_makes (make_id, make_name, make_name_folded, vehicle_types) ",
    );
    builder.push_values(
        rows,
        |mut row, (make_id, make_name, make_name_folded, vehicle_types)| {
            row.push_bind(make_id)
                .push_bind(make_name)
                .push_bind(make_name_folded)
                .push_bind(vehicle_types);
        },
    );

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() as usize)
}

#[async_trait]
impl VehicleStore for SqliteVehicleStore {
    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM vehicle_makes")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_many(&self, makes: &[VehicleMake]) -> Result<usize, StoreError> {
        validate_all(makes)?;
        let mut conn = self.pool.acquire().await?;
        insert_rows(&mut *conn, makes).await
    }

    async fn replace_all(
        &self,
        makes: &[VehicleMake],
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        // dropping the transaction on any error rolls the delete back
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM vehicle_makes")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut batches = 0;
        for batch in makes.chunks(batch_size.max(1)) {
            validate_all(batch)?;
            insert_rows(&mut *tx, batch).await?;
            batches += 1;
        }

        tx.commit().await?;
        tracing::debug!(deleted, batches, "vehicle_makes replaced");
        Ok(batches)
    }

    async fn find(&self, filter: &VehicleFilter) -> Result<Vec<VehicleMake>, StoreError> {
        let mut rows = sqlx::query(SELECT_PAGE)
            .bind(filter.folded_name())
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch(&self.pool);

        let mut makes = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let vehicle_types: String = row.try_get("vehicle_types")?;
            makes.push(VehicleMake {
                make_id: row.try_get("make_id")?,
                make_name: row.try_get("make_name")?,
                vehicle_types: serde_json::from_str(&vehicle_types)?,
            });
        }
        Ok(makes)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vehicle_makes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
