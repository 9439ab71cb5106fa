//! # `tickvault-core`
//!
//! 行情采集与分发服务的核心契约层。
//!
//! - `common`: 证券代码、K 线周期、复权类型、交易时段与时钟
//! - `market`: Bar / Tick 实体与行情抓取端口 (`FetchAdapter`)
//! - `store`: 时间序列文件描述与存储端口 (`SeriesStore`)
//! - `cache`: 会话存储所依赖的通用 KV 端口
//! - `config`: 全局配置与校验
//!
//! 本 crate 不包含任何 I/O 实现，具体实现由 `store` / `feed` / `cache` 等 crate 注入。

pub mod cache;
pub mod common;
pub mod config;
pub mod market;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// 为 rustls 安装进程级加密后端 (ring)。
///
/// reqwest 以 `rustls-no-provider` 方式编译，进程内首次建立 HTTP 客户端前必须调用一次。
/// 重复调用是安全的。
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }
}
