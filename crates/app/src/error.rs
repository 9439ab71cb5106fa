use thiserror::Error;
use tickvault_core::config::ConfigError;
use tickvault_core::market::error::FetchError;
use tickvault_core::store::error::StoreError;

/// # Summary
/// 进程级错误，决定退出码。
///
/// # Invariants
/// - 配置问题退出码为 2，其余启动或运行期故障为 1。
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    // 数据目录无法创建或访问
    #[error("Failed to open data directory: {0}")]
    Store(#[from] StoreError),
    // 行情源客户端构建失败
    #[error("Failed to set up feed: {0}")]
    Feed(#[from] FetchError),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Server(std::io::Error),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config = AppError::from(ConfigError::Invalid("server.port must not be 0".into()));
        assert_eq!(config.exit_code(), 2);
        let bind = AppError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.exit_code(), 1);
        assert!(bind.to_string().contains("0.0.0.0:80"));
    }
}
