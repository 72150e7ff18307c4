//! Redis-backed key-value store
//!
//! Uses one multiplexed async connection shared by all callers. TTLs are
//! written with `PSETEX` so sub-second remainders are not rounded up. Every
//! command carries the configured response timeout.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{
    AsyncCommands, AsyncConnectionConfig, Client, ConnectionAddr, ConnectionInfo, RedisError,
    RedisConnectionInfo,
};
use secrecy::ExposeSecret;
use tracing::{debug, info, trace};

use super::{KeyValueStore, StoreError};
use crate::config::RedisConfig;

/// Redis [`KeyValueStore`]
///
/// A handle built from a configuration with `enable = false` holds no
/// connection and answers every call with [`StoreError::Disabled`].
#[derive(Clone)]
pub struct RedisStore {
    conn: Option<MultiplexedConnection>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("enabled", &self.conn.is_some())
            .finish()
    }
}

impl RedisStore {
    /// Connect according to `config`
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] when the client cannot be created, the
    /// connection fails or times out, or the server does not answer `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        if !config.enable {
            info!("Redis disabled by configuration; token revocation and email verification are off");
            return Ok(Self::disabled());
        }

        let client = Client::open(connection_info(config)).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let conn_config = AsyncConnectionConfig::new()
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout());
        let mut conn = client
            .get_multiplexed_async_connection_with_config(&conn_config)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis ping failed: {}", e)))?;

        debug!(host = %config.host, port = config.port, db = config.db, "Redis connection established");
        Ok(Self { conn: Some(conn) })
    }

    /// Handle that reports itself disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn.clone().ok_or(StoreError::Disabled)
    }
}

/// Address and credentials as structured fields, so passwords need no URL escaping
fn connection_info(config: &RedisConfig) -> ConnectionInfo {
    let password = config
        .password
        .as_ref()
        .map(|p| p.expose_secret().clone())
        .filter(|p| !p.is_empty());
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db,
            password,
            ..RedisConnectionInfo::default()
        },
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let millis = (ttl.as_millis() as u64).max(1);
        let _: () = conn
            .pset_ex(key, value, millis)
            .await
            .map_err(map_redis_error)?;
        trace!(key, ttl_ms = millis, "redis set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: i64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }
}
