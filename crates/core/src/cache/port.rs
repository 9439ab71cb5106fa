use crate::cache::error::CacheError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// # Summary
/// 业务无关的异步 KV 存储接口 (Port)，支持按空闲时间过期。
///
/// # Invariants
/// - 处理原始字节，确保 Trait 是对象安全的 (Object Safe)。
/// - 设置了空闲期限的条目，超过期限未被读取即视为不存在；每次成功读取都会刷新期限。
#[async_trait]
pub trait Cache: Send + Sync {
    /// # Summary
    /// 设置原始字节数据。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `value`: 原始字节数组。
    /// * `idle`: 空闲过期期限，`None` 表示永不过期。
    ///
    /// # Returns
    /// 成功返回 Ok，失败返回 `CacheError`。
    async fn set_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        idle: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// # Summary
    /// 获取原始字节数据并刷新空闲期限。
    ///
    /// # Logic
    /// 1. 根据键检索存储内容。
    /// 2. 已过期的条目就地删除并返回 `None`。
    ///
    /// # Returns
    /// 存在则返回 `Some(Vec<u8>)`，否则返回 `None`。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// # Summary
    /// 删除指定键。
    ///
    /// # Returns
    /// 键存在并被删除时返回 true。
    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    /// # Summary
    /// 清理所有已过期条目。
    ///
    /// # Returns
    /// 被清理的条目数。
    async fn evict_expired(&self) -> Result<usize, CacheError>;
}

/// # Summary
/// 缓存泛型扩展接口，提供便捷的序列化支持。
///
/// # Invariants
/// - 自动为所有实现 `Cache` 的类型提供支持。
#[async_trait]
pub trait CacheExt: Cache {
    /// # Summary
    /// 存入强类型对象。
    ///
    /// # Logic
    /// 1. 使用 JSON 序列化对象。
    /// 2. 调用底层 `set_raw` 写入。
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        idle: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialize(e.to_string()))?;
        self.set_raw(key, bytes, idle).await
    }

    /// # Summary
    /// 取出强类型对象。
    ///
    /// # Logic
    /// 1. 调用底层 `get_raw` 获取字节。
    /// 2. 使用 JSON 反序列化为目标类型。
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_raw(key).await? {
            Some(bytes) => {
                let val = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Deserialize(e.to_string()))?;
                Ok(Some(val))
            }
            None => Ok(None),
        }
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}
