use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理文件读写、解析失败等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 任何写入失败都不会破坏此前已提交的文件。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 写入或原子替换失败
    #[error("Write error: {0}")]
    Write(String),
    /// 读取文件失败
    #[error("Read error: {0}")]
    Read(String),
    /// 文件内容无法解析
    #[error("Corrupt series {name}: {reason}")]
    Corrupt { name: String, reason: String },
    /// 文件不存在或名字无法识别
    #[error("Not found: {0}")]
    NotFound(String),
    /// 待写入的数据不属于目标序列
    #[error("Rejected: {0}")]
    Rejected(String),
}
