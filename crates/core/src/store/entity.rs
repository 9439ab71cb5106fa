use crate::common::{Adjustment, Period, Symbol};
use crate::market::entity::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// K 线文件名后缀
pub const KLINE_SUFFIX: &str = "_kline.csv";
/// 实时快照文件名后缀
pub const REALTIME_SUFFIX: &str = "_real_time_price.json";
/// 实时快照在文件列表中的周期标记
pub const REALTIME_PERIOD: &str = "realtime";

/// # Summary
/// 时间序列键，唯一标识一个 K 线文件。
///
/// # Invariants
/// - 文件名形如 `000001_SH_1d_front_kline.csv`，由键唯一决定。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: Symbol,
    pub period: Period,
    pub adjustment: Adjustment,
}

impl SeriesKey {
    pub fn new(symbol: Symbol, period: Period, adjustment: Adjustment) -> Self {
        Self {
            symbol,
            period,
            adjustment,
        }
    }

    /// 对应的文件名
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}{}",
            self.symbol.file_stem(),
            self.period.as_str(),
            self.adjustment.as_str(),
            KLINE_SUFFIX
        )
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.symbol, self.period, self.adjustment)
    }
}

/// # Summary
/// 数据目录中一个可被服务的文件名。
///
/// # Invariants
/// - 只能由 `parse` 从外部字符串构造，且解析结果必须能原样还原为输入，
///   因此任何带目录分隔符、`..` 或非规范写法的名字都无法通过。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SeriesName {
    Kline(SeriesKey),
    Realtime(Symbol),
}

impl SeriesName {
    /// # Summary
    /// 严格解析文件名。
    ///
    /// # Logic
    /// 1. 按后缀区分 K 线文件与实时快照文件。
    /// 2. 拆出 `代码_交易所[_周期_复权]` 各段并逐段解析。
    /// 3. 重新生成文件名并与输入比较，不一致即拒绝。
    ///
    /// # Returns
    /// 无法识别时返回 `None`。
    pub fn parse(name: &str) -> Option<Self> {
        let parsed = if let Some(stem) = name.strip_suffix(REALTIME_SUFFIX) {
            Symbol::parse(stem).ok().map(SeriesName::Realtime)?
        } else {
            let stem = name.strip_suffix(KLINE_SUFFIX)?;
            let mut parts = stem.rsplitn(3, '_');
            let adjustment: Adjustment = parts.next()?.parse().ok()?;
            let period: Period = parts.next()?.parse().ok()?;
            let symbol = Symbol::parse(parts.next()?).ok()?;
            SeriesName::Kline(SeriesKey::new(symbol, period, adjustment))
        };
        (parsed.file_name() == name).then_some(parsed)
    }

    pub fn file_name(&self) -> String {
        match self {
            SeriesName::Kline(key) => key.file_name(),
            SeriesName::Realtime(symbol) => format!("{}{}", symbol.file_stem(), REALTIME_SUFFIX),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            SeriesName::Kline(key) => &key.symbol,
            SeriesName::Realtime(symbol) => symbol,
        }
    }
}

/// # Summary
/// 文件列表中的单个条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SeriesDescriptor {
    // 文件名
    pub name: String,
    // 证券，如 `600689.SH`
    pub symbol: String,
    // 周期标记，实时快照为 `realtime`
    pub period: String,
    // 复权类型，实时快照为空
    pub adjustment: Option<Adjustment>,
    // 数据行数 (不含表头)，实时快照恒为 1
    pub rows: u64,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

impl SeriesDescriptor {
    /// # Summary
    /// 文件列表排序键：证券、周期 (实时快照在前，其后从细到粗)、复权类型。
    pub fn sort_key(&self) -> (String, usize, Option<Adjustment>) {
        let rank = self
            .period
            .parse::<Period>()
            .ok()
            .and_then(|p| Period::ALL.iter().position(|x| *x == p))
            .map_or(0, |i| i + 1);
        (self.symbol.clone(), rank, self.adjustment)
    }

    pub fn is_realtime(&self) -> bool {
        self.period == REALTIME_PERIOD
    }
}

/// # Summary
/// 一次合并的结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MergeResult {
    // 新增的时间点
    pub appended: usize,
    // 已存在但数值变化被覆盖的时间点
    pub updated: usize,
    // 已存在且完全一致的时间点
    pub unchanged: usize,
}

impl MergeResult {
    /// 是否需要重写文件
    pub fn changed(&self) -> bool {
        self.appended > 0 || self.updated > 0
    }
}

/// # Summary
/// 一次读取得到的有序窗口，最新的数据在最后。
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPage {
    // 读取时文件中的总行数
    pub total_rows: usize,
    pub bars: Vec<Bar>,
}

/// # Summary
/// 以字节形式直通输出的已提交快照。
///
/// # Invariants
/// - `file` 在打开时即固定了当时的已提交版本，后续的原子替换不会影响其内容。
#[derive(Debug)]
pub struct RawSeries {
    pub name: SeriesName,
    pub size_bytes: u64,
    pub file: std::fs::File,
}

/// # Summary
/// 数据目录统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoreStats {
    pub total_files: usize,
    pub kline_files: usize,
    pub realtime_files: usize,
    pub total_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SeriesKey {
        SeriesKey::new(
            Symbol::parse("000001.SH").unwrap(),
            Period::Day1,
            Adjustment::Front,
        )
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(key().file_name(), "000001_SH_1d_front_kline.csv");
        let monthly = SeriesKey::new(key().symbol, Period::Month1, Adjustment::Raw);
        assert_eq!(monthly.file_name(), "000001_SH_1month_none_kline.csv");
    }

    #[test]
    fn test_parse_round_trips_canonical_names_only() {
        assert_eq!(
            SeriesName::parse("000001_SH_1d_front_kline.csv"),
            Some(SeriesName::Kline(key()))
        );
        assert!(matches!(
            SeriesName::parse("600689_SH_real_time_price.json"),
            Some(SeriesName::Realtime(_))
        ));
        for bad in [
            "../000001_SH_1d_front_kline.csv",
            "000001_sh_1d_front_kline.csv",
            "000001_SH_1M_front_kline.csv",
            "000001_SH_1d_raw_kline.csv",
            "000001_SH_1d_kline.csv",
            "000001.SH_1d_front_kline.csv",
            "sub/000001_SH_real_time_price.json",
            "passwd",
        ] {
            assert_eq!(SeriesName::parse(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_descriptor_sort_key_puts_realtime_first() {
        let make = |period: &str, adjustment| SeriesDescriptor {
            name: String::new(),
            symbol: "000001.SH".into(),
            period: period.into(),
            adjustment,
            rows: 0,
            size_bytes: 0,
            last_modified: Utc::now(),
        };
        let mut list = vec![
            make("1month", Some(Adjustment::Front)),
            make("1m", Some(Adjustment::Front)),
            make(REALTIME_PERIOD, None),
            make("1d", Some(Adjustment::Front)),
        ];
        list.sort_by_key(|d| d.sort_key());
        let periods: Vec<_> = list.iter().map(|d| d.period.as_str()).collect();
        assert_eq!(periods, vec!["realtime", "1m", "1d", "1month"]);
    }
}
