//! # `tickvault-feed`
//!
//! `FetchAdapter` 的 HTTP 实现：通过行情桥接服务获取 K 线与实时快照，
//! 并在此处完成全部数据规范化。

pub mod bridge;
mod normalize;
