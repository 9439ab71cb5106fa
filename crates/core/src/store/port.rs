use super::entity::{MergeResult, RawSeries, SeriesDescriptor, SeriesKey, SeriesPage, StoreStats};
use super::error::StoreError;
use crate::common::Symbol;
use crate::market::entity::{Bar, Tick};
use async_trait::async_trait;

/// # Summary
/// 时间序列存储接口，负责 K 线文件与实时快照的持久化与读取。
///
/// # Invariants
/// - 读者只会看到完整提交的快照：写入先落临时文件，再原子替换。
/// - 同一个键上的合并严格串行，不同键之间互不影响。
/// - 文件中的时间戳严格递增，不存在重复时间点。
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// # Summary
    /// 将新抓取的 K 线合并进已提交的文件。
    ///
    /// # Logic
    /// 1. 获取该键的写锁。
    /// 2. 读取当前快照，按时间戳建立索引。
    /// 3. 不存在的时间点追加，数值不同的覆盖，完全一致的跳过；同批次内后出现的胜出。
    /// 4. 若有追加或覆盖，写临时文件并原子替换；否则不触碰文件。
    ///
    /// # Arguments
    /// * `key`: 目标序列。
    /// * `bars`: 新数据，`symbol` / `period` 必须与键一致。
    ///
    /// # Returns
    /// 成功返回各类时间点数量。
    async fn merge(&self, key: &SeriesKey, bars: &[Bar]) -> Result<MergeResult, StoreError>;

    /// # Summary
    /// 读取从最早一行开始计数的有序窗口。
    ///
    /// # Arguments
    /// * `key`: 目标序列。
    /// * `offset`: 跳过的最早行数。
    /// * `limit`: 最多返回行数，`None` 表示读到末尾。
    ///
    /// # Returns
    /// 文件不存在时返回 `StoreError::NotFound`。
    async fn read(
        &self,
        key: &SeriesKey,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<SeriesPage, StoreError>;

    /// # Summary
    /// 读取同一快照中最新的 `min(limit, total)` 行，按时间升序返回。
    async fn read_tail(&self, key: &SeriesKey, limit: usize) -> Result<SeriesPage, StoreError>;

    /// # Summary
    /// 列出数据目录中所有可识别的文件。
    ///
    /// # Returns
    /// 按证券、周期 (实时快照在前)、复权类型排序的描述列表。
    async fn list(&self) -> Result<Vec<SeriesDescriptor>, StoreError>;

    /// # Summary
    /// 按文件名解析出描述，名字非法或文件不存在时返回 `None`。
    async fn resolve(&self, name: &str) -> Result<Option<SeriesDescriptor>, StoreError>;

    /// # Summary
    /// 打开文件用于字节直通输出。
    ///
    /// # Returns
    /// 名字非法或文件不存在时返回 `StoreError::NotFound`。
    async fn open_raw(&self, name: &str) -> Result<RawSeries, StoreError>;

    /// # Summary
    /// 原子覆盖某证券的实时快照。
    async fn save_tick(&self, tick: &Tick) -> Result<(), StoreError>;

    /// # Summary
    /// 读取某证券最新的实时快照。
    async fn latest_tick(&self, symbol: &Symbol) -> Result<Option<Tick>, StoreError>;

    /// # Summary
    /// 统计数据目录中的文件数量与总大小。
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
