//! # `tickvault-cache`
//!
//! `Cache` 端口的内存实现，当前用于网关的登录会话存储。

pub mod mem;
