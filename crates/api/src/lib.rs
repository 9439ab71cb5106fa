//! # `tickvault-api` - HTTP 分发网关
//!
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 按 Bearer 头、`api_key` 查询参数、`tv_session` Cookie 的顺序鉴权
//! - 列出、读取、下载数据目录中的 K 线文件与实时快照
//! - 对外暴露统计、调度状态与即时刷新接口
//!
//! 本 crate 只依赖 `core` 中的端口，存储与会话缓存的实现由 `crates/app` 注入。

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;
pub mod types;
