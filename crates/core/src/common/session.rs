use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};

/// 交易所所在时区相对 UTC 的偏移 (北京时间)
pub const EXCHANGE_UTC_OFFSET_HOURS: i32 = 8;

/// 交易所本地时区
pub fn exchange_offset() -> FixedOffset {
    offset_from_hours(EXCHANGE_UTC_OFFSET_HOURS).unwrap_or_else(|| Utc.fix())
}

pub(crate) fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    hours
        .checked_mul(3_600)
        .and_then(FixedOffset::east_opt)
}

/// 交易所本地时间的展示格式 `YYYY-MM-DD HH:MM:SS`
pub fn format_exchange_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&exchange_offset())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// # Summary
/// 简化的交易活跃窗口：周一至周五、本地时间 `[open, close]` 闭区间。
///
/// # Invariants
/// - 不依赖节假日日历，法定假日仍视为工作日。
/// - 判断始终基于传入时刻，便于注入虚拟时钟测试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingSession {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
}

impl TradingSession {
    pub fn new(open: NaiveTime, close: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            open,
            close,
            offset,
        }
    }

    /// # Summary
    /// 判断给定时刻是否处于活跃窗口。
    ///
    /// # Logic
    /// 1. 将 UTC 时刻换算为交易所本地时间。
    /// 2. 周六、周日直接返回 false。
    /// 3. 判断本地时间是否位于 `[open, close]`。
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let now = local.time();
        self.open <= now && now <= self.close
    }
}

impl Default for TradingSession {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
            offset: exchange_offset(),
        }
    }
}
