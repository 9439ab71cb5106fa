//! 测试替身：可编程的行情抓取器与样本数据构造函数。
//!
//! 仅在启用 `test-utils` feature 时编译，供各 crate 的测试共享。

use crate::common::{Adjustment, Period, Symbol};
use crate::market::entity::{BOOK_DEPTH, Bar, Level, Tick, bid_ask_ratio, price_change};
use crate::market::error::FetchError;
use crate::market::port::FetchAdapter;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

type KlineReply = Result<Vec<Bar>, FetchError>;
type TickReply = Result<Vec<Tick>, FetchError>;

/// # Summary
/// 可编程的行情抓取器。
///
/// # Logic
/// - 每个 (证券, 周期) 先依次消费排队的应答，队列耗尽后使用固定应答，
///   两者都没有时返回 `FetchError::NotFound`。
/// - 可选的闸门 (`gated`) 让抓取停在半途，测试通过 `release` 逐个放行，
///   以此构造"抓取进行中"的状态。
/// - 记录调用次数与观测到的最大并发数。
#[derive(Default)]
pub struct ScriptedFetchAdapter {
    queued: DashMap<(Symbol, Period), VecDeque<KlineReply>>,
    fixed: DashMap<(Symbol, Period), KlineReply>,
    realtime: Mutex<VecDeque<TickReply>>,
    realtime_fixed: Mutex<Option<TickReply>>,
    kline_calls: DashMap<(Symbol, Period), usize>,
    realtime_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
    latency: Option<Duration>,
}

impl ScriptedFetchAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有抓取都会阻塞，直到测试调用 `release`
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// 每次抓取先等待固定时长
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// 放行 `n` 个被闸门挡住的抓取
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// 为某个 (证券, 周期) 追加一次性应答
    pub fn push_kline(&self, symbol: &Symbol, period: Period, reply: KlineReply) {
        self.queued
            .entry((symbol.clone(), period))
            .or_default()
            .push_back(reply);
    }

    /// 设置某个 (证券, 周期) 的固定应答
    pub fn set_kline(&self, symbol: &Symbol, period: Period, reply: KlineReply) {
        self.fixed.insert((symbol.clone(), period), reply);
    }

    pub fn push_realtime(&self, reply: TickReply) {
        self.realtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    pub fn set_realtime(&self, reply: TickReply) {
        *self
            .realtime_fixed
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(reply);
    }

    pub fn kline_calls(&self, symbol: &Symbol, period: Period) -> usize {
        self.kline_calls
            .get(&(symbol.clone(), period))
            .map_or(0, |c| *c)
    }

    pub fn total_kline_calls(&self) -> usize {
        self.kline_calls.iter().map(|c| *c.value()).sum()
    }

    pub fn realtime_calls(&self) -> usize {
        self.realtime_calls.load(Ordering::SeqCst)
    }

    /// 当前仍在进行中的抓取数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 观测到的最大同时抓取数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(gate) = &self.gate {
            // 闸门关闭意味着测试已结束，直接放行
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FetchAdapter for ScriptedFetchAdapter {
    async fn fetch_realtime(&self, symbols: &[Symbol]) -> Result<Vec<Tick>, FetchError> {
        self.realtime_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        let queued = self
            .realtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(reply) = queued {
            return reply;
        }
        let fixed = self
            .realtime_fixed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match fixed {
            Some(reply) => reply,
            None => Ok(symbols
                .iter()
                .map(|s| sample_tick(s, Utc::now(), 10.0))
                .collect()),
        }
    }

    async fn fetch_kline(
        &self,
        symbol: &Symbol,
        period: Period,
        _adjustment: Adjustment,
    ) -> Result<Vec<Bar>, FetchError> {
        let key = (symbol.clone(), period);
        *self.kline_calls.entry(key.clone()).or_insert(0) += 1;
        let _guard = self.enter().await;
        let queued = self
            .queued
            .get_mut(&key)
            .and_then(|mut queue| queue.pop_front());
        if let Some(reply) = queued {
            return reply;
        }
        match self.fixed.get(&key) {
            Some(reply) => reply.clone(),
            None => Err(FetchError::NotFound(symbol.to_string())),
        }
    }
}

/// 测试用基准时间：2026-10-19 (周一) 北京时间 09:30
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 1, 30, 0)
        .single()
        .unwrap_or_default()
}

/// 构造一根 K 线，时间为 `base_time() + index 个周期`
pub fn sample_bar(symbol: &Symbol, period: Period, index: u32, close: f64) -> Bar {
    let step = i64::try_from(period.default_refresh().as_secs()).unwrap_or(60);
    Bar {
        symbol: symbol.clone(),
        period,
        timestamp: base_time() + chrono::Duration::seconds(step * i64::from(index)),
        open: close - 0.1,
        high: close + 0.2,
        low: close - 0.3,
        close,
        volume: 1_000.0 + f64::from(index),
        turnover: close * 1_000.0,
    }
}

/// 构造一份五档盘口齐全的实时快照
pub fn sample_tick(symbol: &Symbol, at: DateTime<Utc>, last_price: f64) -> Tick {
    let pre_close = 10.0;
    let spreads: [f64; BOOK_DEPTH] = [0.01, 0.02, 0.03, 0.04, 0.05];
    let bid = spreads.map(|s| Level {
        price: last_price - s,
        volume: 100.0,
    });
    let ask = spreads.map(|s| Level {
        price: last_price + s,
        volume: 100.0,
    });
    let (change, change_pct) = price_change(last_price, pre_close);
    Tick {
        symbol: symbol.clone(),
        timestamp: at,
        last_price,
        open: pre_close,
        high: last_price.max(pre_close),
        low: last_price.min(pre_close),
        pre_close,
        change,
        change_pct,
        volume: 50_000.0,
        turnover: 500_000.0,
        turnover_rate: Some(0.35),
        bid_ask_ratio: bid_ask_ratio(&bid, &ask),
        bid,
        ask,
    }
}
