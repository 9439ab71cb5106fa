//! 行情源原始记录到领域实体的转换与隔离规则。

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tickvault_core::common::{Period, Symbol};
use tickvault_core::market::entity::{
    BOOK_DEPTH, Bar, Level, Tick, bid_ask_ratio, price_change, round2,
};
use tickvault_core::market::error::FetchError;
use tracing::warn;

/// 行情源的单根 K 线记录，字段均可能缺失
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct RawKline {
    time: Option<i64>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
}

/// 行情源的单个证券快照记录
#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawTick {
    time: Option<i64>,
    last_price: Option<f64>,
    last_close: Option<f64>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
    turnover_rate: Option<f64>,
    bid_price: Vec<Option<f64>>,
    bid_vol: Vec<Option<f64>>,
    ask_price: Vec<Option<f64>>,
    ask_vol: Vec<Option<f64>>,
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// # Summary
/// 将单条 K 线记录转换为 `Bar`。
///
/// # Returns
/// 不满足以下任一条件时返回隔离原因：
/// 时间有效、OHLC 均为有限值、收盘价为正、`high >= low`、成交量非负。
fn kline_to_bar(symbol: &Symbol, period: Period, raw: RawKline) -> Result<Bar, String> {
    let timestamp = raw
        .time
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or("missing or invalid time")?;
    let (Some(open), Some(high), Some(low), Some(close)) = (
        finite(raw.open),
        finite(raw.high),
        finite(raw.low),
        finite(raw.close),
    ) else {
        return Err("missing or non-finite price".to_string());
    };
    if close <= 0.0 {
        return Err(format!("non-positive close {close}"));
    }
    if high < low {
        return Err(format!("high {high} below low {low}"));
    }
    let volume = raw.volume.unwrap_or(0.0);
    if !volume.is_finite() || volume < 0.0 {
        return Err(format!("invalid volume {volume}"));
    }
    Ok(Bar {
        symbol: symbol.clone(),
        period,
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        turnover: finite(raw.amount).unwrap_or(0.0),
    })
}

/// # Summary
/// K 线负载的规范化边界。
///
/// # Logic
/// 1. 空负载返回 `FetchError::Empty`。
/// 2. 逐条反序列化并校验，失败的记录记 `warn` 后丢弃。
/// 3. 全部记录都被隔离时返回 `FetchError::Malformed`。
/// 4. 结果按时间升序排列。
pub(crate) fn normalize_klines(
    symbol: &Symbol,
    period: Period,
    records: Vec<Value>,
) -> Result<Vec<Bar>, FetchError> {
    if records.is_empty() {
        return Err(FetchError::Empty);
    }
    let total = records.len();
    let mut bars: Vec<Bar> = records
        .into_iter()
        .filter_map(|value| {
            let outcome = serde_json::from_value::<RawKline>(value)
                .map_err(|e| e.to_string())
                .and_then(|raw| kline_to_bar(symbol, period, raw));
            match outcome {
                Ok(bar) => Some(bar),
                Err(reason) => {
                    warn!(symbol = %symbol, period = %period, reason = %reason, "quarantined kline record");
                    None
                }
            }
        })
        .collect();
    if bars.is_empty() {
        return Err(FetchError::Malformed(format!(
            "all {total} kline records for {symbol} {period} were rejected"
        )));
    }
    bars.sort_by_key(Bar::time_key);
    Ok(bars)
}

fn book_side(prices: &[Option<f64>], volumes: &[Option<f64>]) -> [Level; BOOK_DEPTH] {
    let mut side = [Level::default(); BOOK_DEPTH];
    for (i, level) in side.iter_mut().enumerate() {
        let price = finite(prices.get(i).copied().flatten()).unwrap_or(0.0);
        let volume = finite(volumes.get(i).copied().flatten())
            .filter(|v| *v >= 0.0)
            .unwrap_or(0.0);
        *level = Level { price, volume };
    }
    side
}

/// # Summary
/// 将单个证券的快照记录转换为 `Tick`。
///
/// # Logic
/// 1. 最新价必须为正的有限值，成交量不得为负。
/// 2. 盘口不足五档时以零值补齐。
/// 3. 涨跌额、涨跌幅、委比按昨收与盘口计算。
pub(crate) fn tick_from_raw(
    symbol: &Symbol,
    raw: RawTick,
    fetched_at: DateTime<Utc>,
) -> Result<Tick, String> {
    let last_price = finite(raw.last_price)
        .filter(|p| *p > 0.0)
        .ok_or("missing or non-positive lastPrice")?;
    let volume = finite(raw.volume).unwrap_or(0.0);
    if volume < 0.0 {
        return Err(format!("negative volume {volume}"));
    }
    let pre_close = finite(raw.last_close).unwrap_or(0.0);
    let (change, change_pct) = price_change(last_price, pre_close);
    let bid = book_side(&raw.bid_price, &raw.bid_vol);
    let ask = book_side(&raw.ask_price, &raw.ask_vol);
    Ok(Tick {
        symbol: symbol.clone(),
        timestamp: raw
            .time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(fetched_at),
        last_price,
        open: finite(raw.open).unwrap_or(0.0),
        high: finite(raw.high).unwrap_or(0.0),
        low: finite(raw.low).unwrap_or(0.0),
        pre_close,
        change,
        change_pct,
        volume,
        turnover: finite(raw.amount).unwrap_or(0.0),
        turnover_rate: finite(raw.turnover_rate).map(round2),
        bid_ask_ratio: bid_ask_ratio(&bid, &ask),
        bid,
        ask,
    })
}

/// # Summary
/// 实时快照负载的规范化边界。
///
/// # Logic
/// 1. 负载为空返回 `FetchError::Empty`。
/// 2. 请求的证券在负载中缺失时记 `warn` 跳过；全部缺失返回 `FetchError::NotFound`。
/// 3. 存在但无法转换的记录被隔离；全部被隔离返回 `FetchError::Malformed`。
pub(crate) fn normalize_ticks(
    symbols: &[Symbol],
    mut payload: serde_json::Map<String, Value>,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Tick>, FetchError> {
    if payload.is_empty() {
        return Err(FetchError::Empty);
    }
    let mut ticks = Vec::with_capacity(symbols.len());
    let mut present = 0usize;
    for symbol in symbols {
        let Some(value) = payload.remove(&symbol.to_string()) else {
            warn!(symbol = %symbol, "symbol missing from realtime payload");
            continue;
        };
        present += 1;
        let outcome = serde_json::from_value::<RawTick>(value)
            .map_err(|e| e.to_string())
            .and_then(|raw| tick_from_raw(symbol, raw, fetched_at));
        match outcome {
            Ok(tick) => ticks.push(tick),
            Err(reason) => warn!(symbol = %symbol, reason = %reason, "quarantined realtime record"),
        }
    }
    if present == 0 {
        let wanted: Vec<String> = symbols.iter().map(Symbol::to_string).collect();
        return Err(FetchError::NotFound(wanted.join(",")));
    }
    if ticks.is_empty() {
        return Err(FetchError::Malformed(
            "all realtime records were rejected".to_string(),
        ));
    }
    Ok(ticks)
}
