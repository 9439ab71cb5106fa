use crate::common::{Period, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 盘口档位数量
pub const BOOK_DEPTH: usize = 5;

/// # Summary
/// 单根 K 线样本。
///
/// # Invariants
/// - 同一 (symbol, period, adjustment) 序列内 `timestamp` 唯一。
/// - 经过抓取边界规范化后，价格均为有限正数且 `high >= low`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub period: Period,
    // K 线开始时间 (毫秒精度)
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    // 成交量 (股)
    pub volume: f64,
    // 成交额 (元)
    pub turnover: f64,
}

impl Bar {
    /// 时间键：毫秒时间戳
    pub fn time_key(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// 判断两根 K 线的行情数值是否完全一致 (不比较身份字段)
    pub fn same_values(&self, other: &Bar) -> bool {
        self.open == other.open
            && self.high == other.high
            && self.low == other.low
            && self.close == other.close
            && self.volume == other.volume
            && self.turnover == other.turnover
    }
}

/// 单个盘口档位
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

/// # Summary
/// 实时行情快照。
///
/// # Invariants
/// - 只保留每个证券最新的一份，刷新即覆盖。
/// - `bid[0]` / `ask[0]` 为最优档位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    // 涨跌额
    pub change: f64,
    // 涨跌幅 (%)
    pub change_pct: f64,
    pub volume: f64,
    pub turnover: f64,
    // 换手率 (%)，行情源未提供时为空
    pub turnover_rate: Option<f64>,
    pub bid: [Level; BOOK_DEPTH],
    pub ask: [Level; BOOK_DEPTH],
    // 委比 (%)
    pub bid_ask_ratio: f64,
}

/// 保留两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// # Summary
/// 计算相对昨收的涨跌额与涨跌幅。
///
/// # Returns
/// `(change, change_pct)`；昨收为 0 时两者均为 0。
pub fn price_change(last_price: f64, pre_close: f64) -> (f64, f64) {
    if pre_close == 0.0 {
        return (0.0, 0.0);
    }
    let change = last_price - pre_close;
    (round2(change), round2(change / pre_close * 100.0))
}

/// # Summary
/// 计算委比：`(Σ买量 − Σ卖量) / (Σ买量 + Σ卖量) × 100`。
///
/// # Returns
/// 两侧均为空时返回 0。
pub fn bid_ask_ratio(bid: &[Level], ask: &[Level]) -> f64 {
    let bid_volume: f64 = bid.iter().map(|l| l.volume).sum();
    let ask_volume: f64 = ask.iter().map(|l| l.volume).sum();
    let total = bid_volume + ask_volume;
    if total == 0.0 {
        return 0.0;
    }
    round2((bid_volume - ask_volume) / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_change() {
        assert_eq!(price_change(11.0, 10.0), (1.0, 10.0));
        assert_eq!(price_change(9.876, 10.0), (-0.12, -1.24));
        assert_eq!(price_change(5.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_bid_ask_ratio() {
        let bid = [Level { price: 10.0, volume: 300.0 }, Level::default()];
        let ask = [Level { price: 10.01, volume: 100.0 }];
        assert_eq!(bid_ask_ratio(&bid, &ask), 50.0);
        assert_eq!(bid_ask_ratio(&[], &[]), 0.0);
    }
}
