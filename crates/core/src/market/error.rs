use thiserror::Error;

/// # Summary
/// 行情抓取错误，属于可恢复错误：调度器记录后按正常节奏顺延，不会中止循环。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 实现 `Clone` 以便测试替身重复返回同一错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    // 网络层错误，包含底层 HTTP 客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 行情源不认识该证券
    #[error("Symbol not found: {0}")]
    NotFound(String),
    // 行情源返回空数据
    #[error("Empty payload")]
    Empty,
    // 数据全部无法通过规范化校验
    #[error("Malformed payload: {0}")]
    Malformed(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
