use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tickvault_core::cache::error::CacheError;
use tickvault_core::cache::port::Cache;
use tokio::time::Instant;

/// 单个缓存条目
struct Entry {
    value: Vec<u8>,
    // 空闲过期期限，None 表示常驻
    idle: Option<Duration>,
    last_access: Instant,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.idle
            .is_some_and(|idle| now.saturating_duration_since(self.last_access) > idle)
    }
}

/// # Summary
/// 基于 DashMap 的内存缓存实现。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 过期采用惰性判定：读取时发现过期即删除；`evict_expired` 负责批量清理无人读取的条目。
/// - 时间取自 `tokio::time::Instant`，测试中可通过暂停时钟精确推进。
pub struct MemCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Entry>,
}

impl MemCache {
    /// # Summary
    /// 创建一个新的 MemCache 实例。
    ///
    /// # Returns
    /// * `Self` - 初始化的缓存实例。
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// 当前条目数 (包括尚未被清理的过期条目)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemCache {
    /// # Summary
    /// 设置原始字节数据。
    ///
    /// # Logic
    /// 将 Key 转换为 String 后与 Value 一并插入哈希表。若存在同名 Key 则覆盖并重置空闲计时。
    async fn set_raw(
        &self,
        key: &str,
        value: Vec<u8>,
        idle: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.storage.insert(
            key.to_string(),
            Entry {
                value,
                idle,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    /// # Summary
    /// 获取原始字节数据。
    ///
    /// # Logic
    /// 1. 持有条目的写引用，判断是否过期。
    /// 2. 未过期则刷新 `last_access` 并克隆数据返回。
    /// 3. 已过期则释放引用后按条件删除，避免误删并发写入的新值。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(mut entry) = self.storage.get_mut(key) {
            if !entry.expired(now) {
                entry.last_access = now;
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.storage.remove_if(key, |_, entry| entry.expired(now));
        Ok(None)
    }

    /// # Summary
    /// 删除指定键。
    ///
    /// # Returns
    /// * 键存在时返回 true。
    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.storage.remove(key).is_some())
    }

    async fn evict_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let before = self.storage.len();
        self.storage.retain(|_, entry| !entry.expired(now));
        Ok(before.saturating_sub(self.storage.len()))
    }
}
