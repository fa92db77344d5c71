#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Redis-backed [`StateStore`] for the `paymcp` middleware.
//!
//! Suitable for multi-instance deployments where payment state has to
//! survive a process restart and be visible behind a load balancer.
//!
//! # Key schema
//!
//! - Primary entries: `paymcp:<session_key>` → JSON-serialized state
//! - Index entries: `paymcp:idx:payment:<payment_id>` → session key
//!
//! Both carry the same TTL; Redis handles expiry. The prefix is
//! configurable to isolate tenants sharing one Redis.
//!
//! # Consistency
//!
//! Writes go primary-then-index and deletes index-then-primary, so a crash
//! between the two operations leaves at worst a dangling index entry,
//! which reads as a miss, never as wrong data. Read failures surface as
//! absence, per the store contract: the flow recovers by creating a new
//! payment.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use paymcp::error::StoreError;
use paymcp::provider::BoxFuture;
use paymcp::store::{PaymentState, StateStore};
use paymcp::timestamp::UnixTimestamp;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "paymcp";

/// Default entry TTL in seconds (30 minutes).
pub const DEFAULT_TTL_SECONDS: u64 = 30 * 60;

fn primary_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}

fn index_key(prefix: &str, payment_id: &str) -> String {
    format!("{prefix}:idx:payment:{payment_id}")
}

/// [`StateStore`] over a shared Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
    ttl_seconds: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis and builds a store with the default prefix and TTL.
    ///
    /// The connection is established eagerly so a bad address fails fast,
    /// at startup, not on the first payment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the URL is invalid or the
    /// server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = ConnectionManager::new(client).await.map_err(backend)?;
        tracing::info!(url, "connected to redis state store");
        Ok(Self {
            connection,
            prefix: DEFAULT_PREFIX.to_owned(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        })
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn with_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            prefix: DEFAULT_PREFIX.to_owned(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    /// Overrides the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Overrides the entry TTL.
    #[must_use]
    pub const fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    async fn read(&self, redis_key: &str) -> Option<String> {
        let mut connection = self.connection.clone();
        match connection.get::<_, Option<String>>(redis_key).await {
            Ok(value) => value,
            Err(err) => {
                // Read failures surface as absence.
                tracing::warn!(key = redis_key, error = %err, "redis read failed");
                None
            }
        }
    }

    async fn read_state(&self, redis_key: &str) -> Option<PaymentState> {
        let raw = self.read(redis_key).await?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!(key = redis_key, error = %err, "corrupt payment state in redis");
                None
            }
        }
    }
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(Box::new(err))
}

impl StateStore for RedisStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        mut state: PaymentState,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            state.timestamp = UnixTimestamp::now();
            let redis_key = primary_key(&self.prefix, key);
            let payment_id = state.payment_id.clone();
            let serialized = serde_json::to_string(&state)?;

            let mut connection = self.connection.clone();

            // An overwrite may carry a new payment id; drop the stale index
            // entry before the primary write lands.
            if let Some(previous) = self.read_state(&redis_key).await {
                if previous.payment_id != payment_id {
                    let stale = index_key(&self.prefix, &previous.payment_id);
                    if let Err(err) = connection.del::<_, ()>(&stale).await {
                        tracing::warn!(key = %stale, error = %err, "failed to drop stale index");
                    }
                }
            }

            // Writes go primary-then-index; a crash in between leaves at
            // worst a dangling index entry, which reads as a miss.
            connection
                .set_ex::<_, _, ()>(&redis_key, serialized, self.ttl_seconds)
                .await
                .map_err(backend)?;

            let idx = index_key(&self.prefix, &payment_id);
            if let Err(err) = connection
                .set_ex::<_, _, ()>(&idx, key, self.ttl_seconds)
                .await
            {
                // Non-fatal: the entry stays reachable by session key.
                tracing::warn!(key = %idx, error = %err, "failed to write payment index");
            }
            tracing::debug!(key, payment_id = %payment_id, "stored payment state in redis");
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<PaymentState>> {
        Box::pin(async move { self.read_state(&primary_key(&self.prefix, key)).await })
    }

    fn get_by_payment_id<'a>(
        &'a self,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Option<PaymentState>> {
        Box::pin(async move {
            let key = self.read(&index_key(&self.prefix, payment_id)).await?;
            // A dangling index entry reads as a miss.
            self.read_state(&primary_key(&self.prefix, &key)).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let redis_key = primary_key(&self.prefix, key);
            let mut connection = self.connection.clone();

            // Deletes go index-then-primary, mirroring the write order.
            if let Some(state) = self.read_state(&redis_key).await {
                let idx = index_key(&self.prefix, &state.payment_id);
                if let Err(err) = connection.del::<_, ()>(&idx).await {
                    tracing::warn!(key = %idx, error = %err, "failed to delete payment index");
                }
            }

            connection.del::<_, ()>(&redis_key).await.map_err(backend)?;
            tracing::debug!(key, "deleted payment state from redis");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paymcp::constants::PaymentStatus;

    #[test]
    fn test_key_namespace() {
        assert_eq!(primary_key("paymcp", "session_abc"), "paymcp:session_abc");
        assert_eq!(
            index_key("paymcp", "pay_xyz"),
            "paymcp:idx:payment:pay_xyz"
        );
        assert_eq!(primary_key("tenant42", "s"), "tenant42:s");
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut args = serde_json::Map::new();
        args.insert("prompt".into(), serde_json::json!("a blue car"));
        let state = PaymentState::new(
            Some("session_abc".into()),
            "pay_xyz",
            "https://pay.example/p/xyz",
            "generate_image",
            args,
            PaymentStatus::Pending,
        );

        let serialized = serde_json::to_string(&state).unwrap();
        // The TTL anchor keeps its legacy wire name.
        assert!(serialized.contains("\"_timestamp\""));

        let back: PaymentState = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_missing_args_deserialize_to_empty() {
        let raw = serde_json::json!({
            "session_id": "s",
            "payment_id": "p",
            "payment_url": "https://pay.example",
            "tool_name": "t",
            "status": "requested",
            "created_at": "1699123456",
            "_timestamp": "1699123456",
        });
        let state: PaymentState = serde_json::from_value(raw).unwrap();
        assert!(state.tool_args.is_empty());
    }
}
