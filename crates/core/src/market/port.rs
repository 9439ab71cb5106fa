use crate::common::{Adjustment, Period, Symbol};
use crate::market::entity::{Bar, Tick};
use crate::market::error::FetchError;
use async_trait::async_trait;

/// # Summary
/// 外部行情源的抓取端口。
///
/// # Invariants
/// - 这是唯一的规范化边界：实现者必须把任意形态的原始数据转换为 `Bar` / `Tick`，
///   无法转换的记录在边界内隔离丢弃，下游永远只看到固定结构。
/// - 返回的 `Bar` 其 `symbol` / `period` 必须与请求参数一致。
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// # Summary
    /// 批量抓取实时行情快照。
    ///
    /// # Arguments
    /// * `symbols`: 需要刷新的证券列表。
    ///
    /// # Returns
    /// 成功返回规范化后的快照列表，未知证券会被跳过。
    async fn fetch_realtime(&self, symbols: &[Symbol]) -> Result<Vec<Tick>, FetchError>;

    /// # Summary
    /// 抓取单个证券单个周期的 K 线。
    ///
    /// # Arguments
    /// * `symbol`: 证券。
    /// * `period`: K 线周期。
    /// * `adjustment`: 复权类型。
    ///
    /// # Returns
    /// 成功返回按时间升序排列的 K 线列表。
    async fn fetch_kline(
        &self,
        symbol: &Symbol,
        period: Period,
        adjustment: Adjustment,
    ) -> Result<Vec<Bar>, FetchError>;
}
