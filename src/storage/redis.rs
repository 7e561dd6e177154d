//! Redis-backed work-queue storage
//!
//! # Example
//!
//! ```rust,ignore
//! use resgrep::config::RedisConfig;
//! use resgrep::storage::RedisStore;
//!
//! let store = RedisStore::connect(&RedisConfig::default()).await?;
//! store.list_push("crawler:pending_urls", &[url]).await?;
//! ```

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::num::NonZeroUsize;

use super::QueueStore;
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Work-queue storage over a pooled Redis connection
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build the pool and verify the server answers PING
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let pool = Self::build_pool(config)?;
        let store = Self { pool };
        store.ping().await?;

        tracing::info!(url = %config.url, "Connected to Redis");
        Ok(store)
    }

    /// Build a connection pool without touching the network
    pub fn build_pool(config: &RedisConfig) -> Result<Pool> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| Error::config(format!("Failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Redis connection pool: {e}")))?;
        Ok(pool)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let added: usize = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        Ok(conn.scard(key).await?)
    }

    async fn list_push(&self, key: &str, values: &[String]) -> Result<usize> {
        if values.is_empty() {
            return self.list_len(key).await;
        }
        let mut conn = self.pool.get().await?;
        Ok(conn.rpush(key, values).await?)
    }

    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await?;
        Ok(conn.lrange(key, 0, count as isize - 1).await?)
    }

    async fn list_trim_front(&self, key: &str, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        conn.ltrim::<_, ()>(key, count as isize, -1).await?;
        Ok(())
    }

    async fn list_pop_front(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.get().await?;
        let values: Option<Vec<String>> = conn.lpop(key, Some(count)).await?;
        Ok(values.unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        Ok(conn.llen(key).await?)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hset_nx(key, field, value).await?)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let reply: String = redis::cmd("PING").query_async(&mut *conn).await?;
        if reply != "PONG" {
            return Err(Error::connectivity("redis", format!("unexpected PING reply: {reply}")));
        }
        Ok(())
    }
}
