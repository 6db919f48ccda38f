//! Redis 캐시 백엔드.
//!
//! `ConnectionManager`를 사용하며 연결은 첫 명령 시점에 생성됩니다.
//! 서버가 내려가 있어도 생성은 성공하고, 이후 명령마다 재연결을 시도합니다.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stockcache_core::RedisSettings;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use crate::error::{DataError, Result};

/// Redis 연결 래퍼.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    command_timeout: Duration,
}

impl RedisCache {
    /// 연결 없이 클라이언트만 생성합니다.
    ///
    /// URL 형식이 잘못된 경우에만 실패합니다.
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        let client = Client::open(settings.url.as_str())
            .map_err(|e| DataError::Config(format!("invalid redis url: {}", e)))?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            command_timeout: settings.command_timeout(),
        })
    }

    /// 클라이언트를 생성하고 즉시 연결을 시도합니다.
    ///
    /// 연결 실패는 경고만 남기며, 다음 명령에서 다시 연결합니다.
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        let cache = Self::new(settings)?;

        info!("Redis 연결 중...");
        match cache.connection().await {
            Ok(_) => info!("Redis 연결 완료"),
            Err(e) => warn!(error = %e, "Redis 연결 실패, 다음 명령에서 재시도"),
        }

        Ok(cache)
    }

    /// 현재 연결을 반환하거나 새로 연결합니다.
    async fn connection(&self) -> Result<ConnectionManager> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        // 다른 태스크가 먼저 연결했을 수 있음
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let manager = tokio::time::timeout(
            self.command_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .map_err(|_| DataError::CacheUnavailable("redis connect timed out".to_string()))?
        .map_err(|e| DataError::CacheUnavailable(e.to_string()))?;

        debug!("Redis connection manager 생성");
        *slot = Some(manager.clone());
        Ok(manager)
    }

    /// 명령 타임아웃을 적용해 명령을 실행합니다.
    async fn run<T, F, Fut>(&self, command: &str, op: F) -> Result<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;

        match tokio::time::timeout(self.command_timeout, op(conn)).await {
            Ok(result) => result.map_err(DataError::from),
            Err(_) => Err(DataError::Timeout(format!(
                "redis {} exceeded {:?}",
                command, self.command_timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(DataError::Cache(format!("unexpected PING reply: {}", pong)))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run("GET", |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        match ttl {
            // SETEX는 0초를 허용하지 않음
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                self.run("SETEX", |mut conn| async move {
                    conn.set_ex::<_, _, ()>(key, value, secs).await
                })
                .await
            }
            None => {
                self.run("SET", |mut conn| async move {
                    conn.set::<_, _, ()>(key, value).await
                })
                .await
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run("DEL", |mut conn| async move {
            conn.del::<_, usize>(keys).await
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.run("EXISTS", |mut conn| async move {
            conn.exists::<_, bool>(key).await
        })
        .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.run("SADD", |mut conn| async move {
            conn.sadd::<_, _, ()>(key, member).await
        })
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.run("SMEMBERS", |mut conn| async move {
            conn.smembers::<_, Vec<String>>(key).await
        })
        .await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        self.run("SREM", |mut conn| async move {
            conn.srem::<_, _, usize>(key, members).await
        })
        .await
    }
}
