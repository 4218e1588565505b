//! Production `SharedStore` backend over Redis.
//!
//! One lazily-established multiplexed connection sits behind a mutex slot;
//! connection-class failures invalidate the slot so the next call
//! reconnects. Every call is bounded by `op_timeout` and gated by the
//! circuit breaker.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::{SharedStore, StoreCommand, StoreHealth, Subscription};
use crate::domain::config::StoreSettings;
use crate::infrastructure::breaker::{BreakerConfig, BreakerState, CircuitBreaker};

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub op_timeout: Duration,
}

impl RedisConfig {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            url: settings.url.clone(),
            op_timeout: Duration::from_millis(settings.op_timeout_ms),
        }
    }
}

pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    breaker: CircuitBreaker,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(config: RedisConfig, breaker: BreakerConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            breaker: CircuitBreaker::new("shared-store", breaker),
            op_timeout: config.op_timeout,
        })
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Reuse the pooled connection, reconnecting if the slot was invalidated.
    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        debug!("establishing store connection");
        let connect = self.client.get_multiplexed_async_connection();
        let conn = match tokio::time::timeout(self.op_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connect timed out",
                )))
            }
        };
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn invalidate(&self) {
        *self.conn.lock().await = None;
    }

    /// Breaker/timeout wrapper shared by every single-command operation.
    async fn query(&self, cmd: redis::Cmd) -> Option<redis::Value> {
        if !self.breaker.allow_request() {
            return None;
        }
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "store connection failed");
                self.breaker.record_failure();
                return None;
            }
        };

        let fut = cmd.query_async(&mut conn);
        let outcome: Result<redis::RedisResult<redis::Value>, _> =
            tokio::time::timeout(self.op_timeout, fut).await;
        match outcome {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Some(value)
            }
            Ok(Err(e)) if is_connectivity(&e) => {
                warn!(error = %e, "store connection dropped");
                self.invalidate().await;
                self.breaker.record_failure();
                None
            }
            Ok(Err(e)) => {
                // Server replied; the connection itself is healthy.
                warn!(error = %e, "store command rejected");
                self.breaker.record_success();
                None
            }
            Err(_) => {
                warn!(timeout = ?self.op_timeout, "store operation timed out");
                self.invalidate().await;
                self.breaker.record_failure();
                None
            }
        }
    }
}

fn is_connectivity(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn as_string(value: redis::Value) -> Option<String> {
    redis::from_redis_value::<Option<String>>(&value)
        .ok()
        .flatten()
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Option<String> {
        let value = self.query(redis::cmd("GET").arg(key).to_owned()).await?;
        as_string(value)
    }

    async fn set(&self, key: &str, value: &str) -> bool {
        self.query(redis::cmd("SET").arg(key).arg(value).to_owned())
            .await
            .is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        match self.query(redis::cmd("DEL").arg(key).to_owned()).await {
            Some(value) => redis::from_redis_value::<i64>(&value).unwrap_or(0) > 0,
            None => false,
        }
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        match self.query(redis::cmd("KEYS").arg(pattern).to_owned()).await {
            Some(value) => redis::from_redis_value(&value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Option<String> {
        let value = self
            .query(redis::cmd("HGET").arg(key).arg(field).to_owned())
            .await?;
        as_string(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> bool {
        self.query(
            redis::cmd("HSET")
                .arg(key)
                .arg(field)
                .arg(value)
                .to_owned(),
        )
        .await
        .is_some()
    }

    async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        match self.query(redis::cmd("HGETALL").arg(key).to_owned()).await {
            Some(value) => redis::from_redis_value(&value).unwrap_or_default(),
            None => HashMap::new(),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> bool {
        self.query(redis::cmd("LPUSH").arg(key).arg(value).to_owned())
            .await
            .is_some()
    }

    async fn rpush(&self, key: &str, value: &str) -> bool {
        self.query(redis::cmd("RPUSH").arg(key).arg(value).to_owned())
            .await
            .is_some()
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        match self
            .query(
                redis::cmd("LRANGE")
                    .arg(key)
                    .arg(start)
                    .arg(stop)
                    .to_owned(),
            )
            .await
        {
            Some(value) => redis::from_redis_value(&value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> bool {
        self.query(redis::cmd("PUBLISH").arg(channel).arg(payload).to_owned())
            .await
            .is_some()
    }

    async fn subscribe(&self, channel: &str) -> Option<Subscription> {
        if !self.breaker.allow_request() {
            return None;
        }
        let pubsub = tokio::time::timeout(self.op_timeout, self.client.get_async_pubsub()).await;
        let mut pubsub = match pubsub {
            Ok(Ok(pubsub)) => pubsub,
            Ok(Err(e)) => {
                warn!(error = %e, "pub/sub connection failed");
                self.breaker.record_failure();
                return None;
            }
            Err(_) => {
                warn!("pub/sub connection timed out");
                self.breaker.record_failure();
                return None;
            }
        };
        if let Err(e) = pubsub.subscribe(channel).await {
            warn!(error = %e, channel, "subscribe failed");
            self.breaker.record_failure();
            return None;
        }
        self.breaker.record_success();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Some(Subscription::new(channel.to_string(), rx))
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> bool {
        if !self.breaker.allow_request() {
            return false;
        }
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "store connection failed");
                self.breaker.record_failure();
                return false;
            }
        };

        let mut pipe = redis::pipe();
        for command in &commands {
            match command {
                StoreCommand::Set { key, value } => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                StoreCommand::Delete { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
                StoreCommand::HSet { key, field, value } => {
                    pipe.cmd("HSET").arg(key).arg(field).arg(value).ignore();
                }
                StoreCommand::LPush { key, value } => {
                    pipe.cmd("LPUSH").arg(key).arg(value).ignore();
                }
                StoreCommand::RPush { key, value } => {
                    pipe.cmd("RPUSH").arg(key).arg(value).ignore();
                }
            }
        }

        let fut = pipe.query_async(&mut conn);
        let outcome: Result<redis::RedisResult<()>, _> =
            tokio::time::timeout(self.op_timeout, fut).await;
        match outcome {
            Ok(Ok(())) => {
                self.breaker.record_success();
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, batch = commands.len(), "pipeline failed");
                if is_connectivity(&e) {
                    self.invalidate().await;
                }
                // One failure for the whole batch.
                self.breaker.record_failure();
                false
            }
            Err(_) => {
                warn!(batch = commands.len(), "pipeline timed out");
                self.invalidate().await;
                self.breaker.record_failure();
                false
            }
        }
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            connected: self.conn.lock().await.is_some(),
            breaker: self.breaker.state(),
        }
    }
}
