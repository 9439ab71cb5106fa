//! # `tickvault-scheduler`
//!
//! 采集调度：按周期维护到期表，在并发上限内派发抓取并把结果合并进存储。
//!
//! - `registry`: 进行中抓取的登记表，调度器与即时刷新共享
//! - `table`: 到期表、健康状态与运维快照
//! - `scheduler`: `tick` / `run` 调度循环
//! - `collector`: 绕过节奏与交易时段的即时刷新

pub mod collector;
pub mod registry;
pub mod scheduler;
pub mod table;
