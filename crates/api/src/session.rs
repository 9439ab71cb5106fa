//! # 会话存储
//!
//! 登录成功后签发不透明令牌，保存在注入的 `Cache` 中并按空闲时间过期。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use tickvault_core::cache::error::CacheError;
use tickvault_core::cache::port::{Cache, CacheExt};

/// 会话令牌所在的 Cookie 名
pub const SESSION_COOKIE: &str = "tv_session";

/// 默认空闲过期时间 30 分钟
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

const KEY_PREFIX: &str = "session:";

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    created_at: DateTime<Utc>,
}

/// # Summary
/// 基于 KV 缓存的会话表。
///
/// # Invariants
/// - 令牌为随机 UUID，不携带任何凭证信息。
/// - 每次成功校验都会刷新空闲期限；超过期限未使用的令牌视为失效。
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn Cache>,
    idle: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn Cache>, idle: Duration) -> Self {
        Self { cache, idle }
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// # Summary
    /// 为已通过密钥校验的调用方签发新令牌。
    ///
    /// # Returns
    /// 新令牌；缓存写入失败时返回 `CacheError`。
    pub async fn create(&self) -> Result<String, CacheError> {
        let token = Uuid::new_v4().simple().to_string();
        let record = SessionRecord {
            created_at: Utc::now(),
        };
        self.cache
            .set(&storage_key(&token), &record, Some(self.idle))
            .await?;
        debug!("session created");
        Ok(token)
    }

    /// # Summary
    /// 校验令牌是否有效，有效时顺带刷新空闲期限。
    ///
    /// # Returns
    /// 缓存故障按无效处理并记录告警。
    pub async fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        match self.cache.get_raw(&storage_key(token)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("session lookup failed: {e}");
                false
            }
        }
    }

    /// 注销令牌，令牌存在时返回 true
    pub async fn revoke(&self, token: &str) -> bool {
        match self.cache.del(&storage_key(token)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("session revoke failed: {e}");
                false
            }
        }
    }
}

fn storage_key(token: &str) -> String {
    format!("{KEY_PREFIX}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickvault_cache::mem::MemCache;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemCache::new()), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_idle_timeout_is_refreshed_on_use() {
        let sessions = store();
        let token = sessions.create().await.unwrap();
        assert!(sessions.validate(&token).await);

        // 使用过的会话重新计时
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(sessions.validate(&token).await);
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(sessions.validate(&token).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!sessions.validate(&token).await);
    }

    #[tokio::test]
    async fn test_revoke_and_unknown_tokens() {
        let sessions = store();
        let token = sessions.create().await.unwrap();
        assert!(!sessions.validate("").await);
        assert!(!sessions.validate("not-a-token").await);

        assert!(sessions.revoke(&token).await);
        assert!(!sessions.revoke(&token).await);
        assert!(!sessions.validate(&token).await);
    }
}
