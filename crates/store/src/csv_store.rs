use crate::codec::{decode_bars, decode_tick, encode_bars, encode_tick};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tickvault_core::common::Symbol;
use tickvault_core::market::entity::{Bar, Tick};
use tickvault_core::store::entity::{
    MergeResult, REALTIME_PERIOD, RawSeries, SeriesDescriptor, SeriesKey, SeriesName, SeriesPage,
    StoreStats,
};
use tickvault_core::store::error::StoreError;
use tickvault_core::store::port::SeriesStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// SeriesStore 的平面文件实现，采用"一序列一文件"策略。
///
/// # Summary
/// 每个 (证券, 周期, 复权) 对应数据目录下的一个 CSV 文件，实时快照对应一个 JSON 文件。
///
/// # Invariants
/// * 所有写入先写同目录临时文件，`sync_all` 后原子 `rename` 覆盖正式文件。
/// * 同一文件名上的写入由 `locks` 中的异步互斥锁串行化。
/// * 文件 I/O 全部在阻塞线程池中执行，不占用异步工作线程。
pub struct CsvSeriesStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CsvSeriesStore {
    /// 创建新的 CsvSeriesStore 实例。
    ///
    /// # Logic
    /// 1. 确保数据目录存在。
    ///
    /// # Arguments
    /// * `root` - 数据目录。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或错误。
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StoreError::Write(format!("create {}: {e}", root.display())))?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    /// 数据目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, file_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(file_name.to_string())
            .or_default()
            .value()
            .clone()
    }

    async fn read_all(&self, key: &SeriesKey) -> Result<Vec<Bar>, StoreError> {
        let path = self.root.join(key.file_name());
        let key = key.clone();
        blocking(move || {
            load_bars(&path, &key)?.ok_or_else(|| StoreError::NotFound(key.file_name()))
        })
        .await
    }
}

/// 在阻塞线程池中执行文件操作
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Read(format!("blocking task failed: {e}")))?
}

/// 读取 K 线文件，文件不存在时返回 `None`
fn load_bars(path: &Path, key: &SeriesKey) -> Result<Option<Vec<Bar>>, StoreError> {
    match File::open(path) {
        Ok(file) => decode_bars(key, BufReader::new(file)).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Read(format!("{}: {e}", path.display()))),
    }
}

/// # Summary
/// 原子替换目标文件。
///
/// # Logic
/// 1. 在同目录创建临时文件 (保证 rename 不跨文件系统)。
/// 2. 写入内容并 `sync_all` 落盘。
/// 3. `persist` 原子覆盖正式文件；任何一步失败时临时文件随 drop 删除，正式文件保持原样。
fn commit<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), StoreError>,
{
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Write(format!("{} has no parent", path.display())))?;
    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| StoreError::Write(format!("temp file: {e}")))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|e| StoreError::Write(format!("flush: {e}")))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::Write(format!("sync: {e}")))?;
    tmp.persist(path)
        .map_err(|e| StoreError::Write(format!("rename to {}: {}", path.display(), e.error)))?;
    Ok(())
}

/// # Summary
/// 合并的纯计算部分与提交。
///
/// # Logic
/// 1. 同批次内按时间戳去重，后出现的胜出。
/// 2. 与已提交数据逐个比较，分类计数。
/// 3. 有变化才重写文件。
fn merge_blocking(path: &Path, key: &SeriesKey, bars: Vec<Bar>) -> Result<MergeResult, StoreError> {
    let mut series: BTreeMap<i64, Bar> = load_bars(path, key)?
        .unwrap_or_default()
        .into_iter()
        .map(|b| (b.time_key(), b))
        .collect();

    let incoming: BTreeMap<i64, Bar> = bars.into_iter().map(|b| (b.time_key(), b)).collect();

    let mut result = MergeResult::default();
    for (ts, bar) in incoming {
        match series.get(&ts) {
            None => {
                result.appended += 1;
                series.insert(ts, bar);
            }
            Some(existing) if existing.same_values(&bar) => result.unchanged += 1,
            Some(_) => {
                result.updated += 1;
                series.insert(ts, bar);
            }
        }
    }

    if result.changed() {
        commit(path, |w| encode_bars(key, series.values(), w))?;
    }
    Ok(result)
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_default()
}

/// 数据行数 = 换行数 - 表头
fn count_rows(path: &Path) -> Result<u64, StoreError> {
    let mut file = File::open(path).map_err(|e| StoreError::Read(e.to_string()))?;
    let mut buf = [0u8; 64 * 1024];
    let mut lines: usize = 0;
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| StoreError::Read(e.to_string()))?;
        if n == 0 {
            break;
        }
        lines += buf.iter().take(n).filter(|b| **b == b'\n').count();
    }
    Ok(u64::try_from(lines.saturating_sub(1)).unwrap_or(u64::MAX))
}

/// 描述单个文件，不存在时返回 `None`
fn describe(root: &Path, name: &SeriesName) -> Result<Option<SeriesDescriptor>, StoreError> {
    let file_name = name.file_name();
    let path = root.join(&file_name);
    let meta = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Read(format!("{file_name}: {e}"))),
    };
    let (period, adjustment, rows) = match name {
        SeriesName::Kline(key) => (
            key.period.as_str().to_string(),
            Some(key.adjustment),
            count_rows(&path)?,
        ),
        SeriesName::Realtime(_) => (REALTIME_PERIOD.to_string(), None, 1),
    };
    Ok(Some(SeriesDescriptor {
        name: file_name,
        symbol: name.symbol().to_string(),
        period,
        adjustment,
        rows,
        size_bytes: meta.len(),
        last_modified: modified_at(&meta),
    }))
}

fn list_blocking(root: &Path) -> Result<Vec<SeriesDescriptor>, StoreError> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| StoreError::Read(format!("{}: {e}", root.display())))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::Read(e.to_string()))?;
        let file_name = entry.file_name();
        // 临时文件、非 UTF-8 文件名及其它无关文件一律忽略
        let Some(name) = file_name.to_str().and_then(SeriesName::parse) else {
            continue;
        };
        match describe(root, &name) {
            Ok(Some(descriptor)) => out.push(descriptor),
            Ok(None) => {}
            // 单个文件在列举期间被替换或删除不影响整体结果
            Err(e) => warn!(file = %name.file_name(), error = %e, "skip unreadable series"),
        }
    }
    out.sort_by_key(|d| d.sort_key());
    Ok(out)
}

#[async_trait]
impl SeriesStore for CsvSeriesStore {
    async fn merge(&self, key: &SeriesKey, bars: &[Bar]) -> Result<MergeResult, StoreError> {
        if let Some(bar) = bars
            .iter()
            .find(|b| b.symbol != key.symbol || b.period != key.period)
        {
            return Err(StoreError::Rejected(format!(
                "bar {} {} does not belong to {}",
                bar.symbol,
                bar.period,
                key.file_name()
            )));
        }
        if bars.is_empty() {
            return Ok(MergeResult::default());
        }

        let file_name = key.file_name();
        let lock = self.lock_for(&file_name);
        let _guard = lock.lock().await;

        let path = self.root.join(&file_name);
        let owned_key = key.clone();
        let bars = bars.to_vec();
        let result = blocking(move || merge_blocking(&path, &owned_key, bars)).await?;

        debug!(
            symbol = %key.symbol,
            period = %key.period,
            adjustment = %key.adjustment,
            appended = result.appended,
            updated = result.updated,
            unchanged = result.unchanged,
            "series merged"
        );
        Ok(result)
    }

    async fn read(
        &self,
        key: &SeriesKey,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<SeriesPage, StoreError> {
        let bars = self.read_all(key).await?;
        let total_rows = bars.len();
        let bars = bars
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(SeriesPage { total_rows, bars })
    }

    async fn read_tail(&self, key: &SeriesKey, limit: usize) -> Result<SeriesPage, StoreError> {
        let mut bars = self.read_all(key).await?;
        let total_rows = bars.len();
        let start = total_rows.saturating_sub(limit);
        let bars = bars.split_off(start);
        Ok(SeriesPage { total_rows, bars })
    }

    async fn list(&self) -> Result<Vec<SeriesDescriptor>, StoreError> {
        let root = self.root.clone();
        blocking(move || list_blocking(&root)).await
    }

    async fn resolve(&self, name: &str) -> Result<Option<SeriesDescriptor>, StoreError> {
        let Some(name) = SeriesName::parse(name) else {
            return Ok(None);
        };
        let root = self.root.clone();
        blocking(move || describe(&root, &name)).await
    }

    async fn open_raw(&self, name: &str) -> Result<RawSeries, StoreError> {
        let parsed =
            SeriesName::parse(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let path = self.root.join(parsed.file_name());
        blocking(move || {
            let file = File::open(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StoreError::NotFound(parsed.file_name()),
                _ => StoreError::Read(format!("{}: {e}", path.display())),
            })?;
            let size_bytes = file
                .metadata()
                .map_err(|e| StoreError::Read(e.to_string()))?
                .len();
            Ok(RawSeries {
                name: parsed,
                size_bytes,
                file,
            })
        })
        .await
    }

    async fn save_tick(&self, tick: &Tick) -> Result<(), StoreError> {
        let file_name = SeriesName::Realtime(tick.symbol.clone()).file_name();
        let lock = self.lock_for(&file_name);
        let _guard = lock.lock().await;

        let path = self.root.join(&file_name);
        let tick = tick.clone();
        blocking(move || commit(&path, |w| encode_tick(&tick, w))).await
    }

    async fn latest_tick(&self, symbol: &Symbol) -> Result<Option<Tick>, StoreError> {
        let file_name = SeriesName::Realtime(symbol.clone()).file_name();
        let path = self.root.join(&file_name);
        blocking(move || match File::open(&path) {
            Ok(file) => decode_tick(&file_name, BufReader::new(file)).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Read(format!("{file_name}: {e}"))),
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let files = self.list().await?;
        let realtime_files = files.iter().filter(|d| d.is_realtime()).count();
        Ok(StoreStats {
            total_files: files.len(),
            kline_files: files.len() - realtime_files,
            realtime_files,
            total_size_bytes: files.iter().map(|d| d.size_bytes).sum(),
        })
    }
}
