//! 文件格式：K 线 CSV 行与实时快照 JSON 文档。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tickvault_core::common::Symbol;
use tickvault_core::common::session::format_exchange_local;
use tickvault_core::market::entity::{BOOK_DEPTH, Bar, Level, Tick};
use tickvault_core::store::entity::SeriesKey;
use tickvault_core::store::error::StoreError;

/// CSV 中的一行。
///
/// 列顺序即表头顺序：
/// `timestamp,datetime,open,high,low,close,volume,turnover,symbol,period,adjustment`
#[derive(Debug, Serialize, Deserialize)]
struct BarRecord {
    // 毫秒时间戳
    timestamp: i64,
    // 交易所本地时间，仅供阅读
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    turnover: f64,
    symbol: String,
    period: String,
    adjustment: String,
}

impl BarRecord {
    fn from_bar(key: &SeriesKey, bar: &Bar) -> Self {
        Self {
            timestamp: bar.time_key(),
            datetime: format_exchange_local(bar.timestamp),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            turnover: bar.turnover,
            symbol: key.symbol.to_string(),
            period: key.period.as_str().to_string(),
            adjustment: key.adjustment.as_str().to_string(),
        }
    }

    fn into_bar(self, key: &SeriesKey) -> Option<Bar> {
        Some(Bar {
            symbol: key.symbol.clone(),
            period: key.period,
            timestamp: DateTime::from_timestamp_millis(self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            turnover: self.turnover,
        })
    }
}

fn corrupt(key: &SeriesKey, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        name: key.file_name(),
        reason: reason.to_string(),
    }
}

/// # Summary
/// 解析整份 K 线 CSV。
///
/// # Returns
/// 行格式错误或时间戳未严格递增时返回 `StoreError::Corrupt`。
pub(crate) fn decode_bars<R: Read>(key: &SeriesKey, reader: R) -> Result<Vec<Bar>, StoreError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars: Vec<Bar> = Vec::new();
    for record in csv_reader.deserialize::<BarRecord>() {
        let record = record.map_err(|e| corrupt(key, e))?;
        let ts = record.timestamp;
        let bar = record
            .into_bar(key)
            .ok_or_else(|| corrupt(key, format!("timestamp {ts} out of range")))?;
        if bars.last().is_some_and(|prev| prev.time_key() >= ts) {
            return Err(corrupt(key, format!("timestamp {ts} is not increasing")));
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// 写出带表头的 K 线 CSV
pub(crate) fn encode_bars<'a, W: Write>(
    key: &SeriesKey,
    bars: impl IntoIterator<Item = &'a Bar>,
    writer: W,
) -> Result<(), StoreError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for bar in bars {
        csv_writer
            .serialize(BarRecord::from_bar(key, bar))
            .map_err(|e| StoreError::Write(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| StoreError::Write(e.to_string()))
}

/// 实时快照文件的 JSON 文档
#[derive(Debug, Serialize, Deserialize)]
struct TickDocument {
    stock_info: StockInfo,
    price_data: PriceData,
    trading_data: TradingData,
    time_info: TimeInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct StockInfo {
    stock_code: Symbol,
    code: String,
    market: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceData {
    last_price: f64,
    open: f64,
    high: f64,
    low: f64,
    pre_close: f64,
    change: f64,
    change_pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TradingData {
    volume: f64,
    turnover: f64,
    turnover_rate: Option<f64>,
    bid: [Level; BOOK_DEPTH],
    ask: [Level; BOOK_DEPTH],
    bid_ask_ratio: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TimeInfo {
    // 毫秒时间戳
    timestamp: i64,
    // 交易所本地时间
    datetime: String,
    // 写入快照的时间
    saved_at: DateTime<Utc>,
}

pub(crate) fn encode_tick<W: Write>(tick: &Tick, writer: W) -> Result<(), StoreError> {
    let doc = TickDocument {
        stock_info: StockInfo {
            stock_code: tick.symbol.clone(),
            code: tick.symbol.code().to_string(),
            market: tick.symbol.exchange().as_str().to_string(),
        },
        price_data: PriceData {
            last_price: tick.last_price,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            pre_close: tick.pre_close,
            change: tick.change,
            change_pct: tick.change_pct,
        },
        trading_data: TradingData {
            volume: tick.volume,
            turnover: tick.turnover,
            turnover_rate: tick.turnover_rate,
            bid: tick.bid,
            ask: tick.ask,
            bid_ask_ratio: tick.bid_ask_ratio,
        },
        time_info: TimeInfo {
            timestamp: tick.timestamp.timestamp_millis(),
            datetime: format_exchange_local(tick.timestamp),
            saved_at: Utc::now(),
        },
    };
    serde_json::to_writer_pretty(writer, &doc).map_err(|e| StoreError::Write(e.to_string()))
}

pub(crate) fn decode_tick<R: Read>(name: &str, reader: R) -> Result<Tick, StoreError> {
    let doc: TickDocument = serde_json::from_reader(reader).map_err(|e| StoreError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    let timestamp =
        DateTime::from_timestamp_millis(doc.time_info.timestamp).ok_or_else(|| {
            StoreError::Corrupt {
                name: name.to_string(),
                reason: "timestamp out of range".to_string(),
            }
        })?;
    Ok(Tick {
        symbol: doc.stock_info.stock_code,
        timestamp,
        last_price: doc.price_data.last_price,
        open: doc.price_data.open,
        high: doc.price_data.high,
        low: doc.price_data.low,
        pre_close: doc.price_data.pre_close,
        change: doc.price_data.change,
        change_pct: doc.price_data.change_pct,
        volume: doc.trading_data.volume,
        turnover: doc.trading_data.turnover,
        turnover_rate: doc.trading_data.turnover_rate,
        bid: doc.trading_data.bid,
        ask: doc.trading_data.ask,
        bid_ask_ratio: doc.trading_data.bid_ask_ratio,
    })
}
