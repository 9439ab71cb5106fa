//! # `tickvault-store`
//!
//! `SeriesStore` 的平面文件实现：每个序列一个 CSV 文件，每个证券一个实时快照 JSON 文件，
//! 全部写入经由临时文件原子替换。

mod codec;
pub mod csv_store;
