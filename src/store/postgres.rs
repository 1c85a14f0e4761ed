use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::info;

use super::{CounterStore, LockToken, StoreError, WindowCount};

/// Counter store backed by unlogged PostgreSQL tables.
///
/// Every operation is a single statement, so the row lock taken by the upsert
/// is what makes increment-and-arm-expiry indivisible across processes.
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE UNLOGGED TABLE IF NOT EXISTS store_counters (
        key TEXT PRIMARY KEY,
        count BIGINT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNLOGGED TABLE IF NOT EXISTS store_locks (
        key TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNLOGGED TABLE IF NOT EXISTS store_cache (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing tables if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("Counter store schema ready");
        Ok(())
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment_with_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError> {
        // Live row: count + 1, expiry untouched. Expired row: restart at 1 and re-arm.
        let row = sqlx::query(
            r#"
            INSERT INTO store_counters (key, count, expires_at)
            VALUES ($1, 1, now() + $2 * interval '1 millisecond')
            ON CONFLICT (key) DO UPDATE SET
                count = CASE WHEN store_counters.expires_at <= now()
                             THEN 1 ELSE store_counters.count + 1 END,
                expires_at = CASE WHEN store_counters.expires_at <= now()
                                  THEN EXCLUDED.expires_at ELSE store_counters.expires_at END
            RETURNING count,
                GREATEST(EXTRACT(EPOCH FROM (expires_at - now())) * 1000, 0)::BIGINT AS ttl_ms
            "#,
        )
        .bind(key)
        .bind(millis(window))
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        let ttl_ms: i64 = row.try_get("ttl_ms")?;
        Ok(WindowCount {
            count,
            ttl_remaining: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn get_count(&self, key: &str) -> Result<i64, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM store_counters WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM store_counters WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let token = LockToken::generate();
        // The conflict branch only fires for an expired holder; a live one yields no row.
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO store_locks (key, token, expires_at)
            VALUES ($1, $2, now() + $3 * interval '1 millisecond')
            ON CONFLICT (key) DO UPDATE SET
                token = EXCLUDED.token,
                expires_at = EXCLUDED.expires_at
            WHERE store_locks.expires_at <= now()
            RETURNING token
            "#,
        )
        .bind(key)
        .bind(token.as_str())
        .bind(millis(ttl))
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.map(|_| token))
    }

    async fn release_lock(&self, key: &str, token: &LockToken) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM store_locks WHERE key = $1 AND token = $2 AND expires_at > now()",
        )
        .bind(key)
        .bind(token.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO store_cache (key, value, expires_at)
            VALUES ($1, $2, now() + $3 * interval '1 millisecond')
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(millis(ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar(
            "SELECT value FROM store_cache WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn cache_delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM store_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut removed = 0;
        for table in ["store_counters", "store_locks", "store_cache"] {
            let sql = format!("DELETE FROM {} WHERE expires_at <= now()", table);
            removed += sqlx::query(&sql).execute(&self.pool).await?.rows_affected();
        }
        Ok(removed)
    }
}
