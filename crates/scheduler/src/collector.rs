use crate::registry::{FetchTarget, InFlightRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_core::market::entity::{Bar, Tick};
use tickvault_core::market::port::FetchAdapter;
use tickvault_core::store::entity::{MergeResult, SeriesKey, SeriesName};
use tickvault_core::store::error::StoreError;
use tickvault_core::store::port::SeriesStore;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// 预览行数的默认值
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

/// 即时刷新的请求参数
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub symbol: Symbol,
    pub adjustment: Adjustment,
    // 为空表示只刷新实时快照
    pub periods: Vec<Period>,
    pub include_realtime: bool,
    pub preview_limit: usize,
}

impl RefreshRequest {
    /// 默认刷新全部周期与实时快照
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            adjustment: Adjustment::Front,
            periods: Period::ALL.to_vec(),
            include_realtime: true,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

/// 单项刷新结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Updated,
    // 同一目标已有抓取在进行，未等待
    Busy,
    Failed,
}

/// 单个周期的刷新结果与文件预览
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeriodReport {
    pub period: String,
    pub file: String,
    pub status: RefreshStatus,
    pub merge: Option<MergeResult>,
    pub error: Option<String>,
    pub total_rows: usize,
    /// 文件末尾的若干行，按时间升序
    #[schema(value_type = Vec<Object>)]
    pub preview: Vec<Bar>,
}

/// 实时快照的刷新结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RealtimeReport {
    pub file: String,
    pub status: RefreshStatus,
    pub error: Option<String>,
    /// 最新快照；忙碌或失败时为已落盘的上一份
    #[schema(value_type = Option<Object>)]
    pub tick: Option<Tick>,
}

/// 一次即时刷新的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RefreshReport {
    pub symbol: String,
    pub adjustment: Adjustment,
    /// 没有任何一项失败
    pub success: bool,
    pub periods: Vec<PeriodReport>,
    pub realtime: Option<RealtimeReport>,
}

enum Fetched {
    Kline(Period, Result<MergeResult, String>),
    Realtime(Result<Tick, String>),
}

/// # Summary
/// 即时刷新服务。
///
/// # Invariants
/// - 绕过调度节奏与交易时段，但遵守进行中登记表：已被占用的目标直接报告 `busy`。
/// - 各周期与实时快照并发抓取，互不阻塞。
#[derive(Clone)]
pub struct Collector {
    adapter: Arc<dyn FetchAdapter>,
    store: Arc<dyn SeriesStore>,
    registry: InFlightRegistry,
}

impl Collector {
    pub fn new(
        adapter: Arc<dyn FetchAdapter>,
        store: Arc<dyn SeriesStore>,
        registry: InFlightRegistry,
    ) -> Self {
        Self {
            adapter,
            store,
            registry,
        }
    }

    /// # Summary
    /// 立即刷新单个证券的若干周期与实时快照。
    ///
    /// # Logic
    /// 1. 周期去重并排序，逐个尝试占用；占用失败记为 `busy`。
    /// 2. 已占用的周期与实时快照各自作为任务并发执行：抓取后合并或覆盖写入。
    /// 3. 全部任务结束后读取每个文件末尾 `preview_limit` 行作为预览。
    ///
    /// # Arguments
    /// * `request`: 刷新参数。
    ///
    /// # Returns
    /// 各周期及实时快照的结果；单项失败不影响其余项。
    pub async fn refresh_symbol(&self, request: RefreshRequest) -> RefreshReport {
        let RefreshRequest {
            symbol,
            adjustment,
            mut periods,
            include_realtime,
            preview_limit,
        } = request;
        periods.sort();
        periods.dedup();

        let mut outcomes: HashMap<Period, (RefreshStatus, Option<MergeResult>, Option<String>)> =
            HashMap::new();
        let mut realtime: Option<(RefreshStatus, Result<Tick, String>)> = None;
        let mut tasks: JoinSet<Fetched> = JoinSet::new();
        let mut task_periods: HashMap<Id, Option<Period>> = HashMap::new();

        for period in &periods {
            let key = SeriesKey::new(symbol.clone(), *period, adjustment);
            let Some(guard) = self.registry.try_claim(FetchTarget::Kline(key.clone())) else {
                outcomes.insert(*period, (RefreshStatus::Busy, None, None));
                continue;
            };
            let adapter = self.adapter.clone();
            let store = self.store.clone();
            let period = *period;
            let handle = tasks.spawn(async move {
                let _guard = guard;
                Fetched::Kline(period, fetch_kline(adapter, store, key).await)
            });
            task_periods.insert(handle.id(), Some(period));
        }

        if include_realtime {
            match self
                .registry
                .try_claim(FetchTarget::Realtime(symbol.clone()))
            {
                Some(guard) => {
                    let adapter = self.adapter.clone();
                    let store = self.store.clone();
                    let symbol = symbol.clone();
                    let handle = tasks.spawn(async move {
                        let _guard = guard;
                        Fetched::Realtime(fetch_tick(adapter, store, symbol).await)
                    });
                    task_periods.insert(handle.id(), None);
                }
                None => {
                    realtime = Some((RefreshStatus::Busy, Err(String::new())));
                }
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Fetched::Kline(period, Ok(merge)))) => {
                    outcomes.insert(period, (RefreshStatus::Updated, Some(merge), None));
                }
                Ok((_, Fetched::Kline(period, Err(reason)))) => {
                    warn!(symbol = %symbol, period = %period, reason = %reason, "instant refresh failed");
                    outcomes.insert(period, (RefreshStatus::Failed, None, Some(reason)));
                }
                Ok((_, Fetched::Realtime(Ok(tick)))) => {
                    realtime = Some((RefreshStatus::Updated, Ok(tick)));
                }
                Ok((_, Fetched::Realtime(Err(reason)))) => {
                    warn!(symbol = %symbol, reason = %reason, "instant realtime refresh failed");
                    realtime = Some((RefreshStatus::Failed, Err(reason)));
                }
                Err(e) => {
                    error!(symbol = %symbol, "instant refresh task aborted: {e}");
                    let reason = "refresh task aborted".to_string();
                    match task_periods.get(&e.id()).copied().flatten() {
                        Some(period) => {
                            outcomes.insert(period, (RefreshStatus::Failed, None, Some(reason)));
                        }
                        None => realtime = Some((RefreshStatus::Failed, Err(reason))),
                    }
                }
            }
        }

        let mut reports = Vec::with_capacity(periods.len());
        for period in periods {
            let key = SeriesKey::new(symbol.clone(), period, adjustment);
            let (status, merge, error) = outcomes
                .remove(&period)
                .unwrap_or_else(|| (RefreshStatus::Failed, None, Some("no outcome".to_string())));
            let (total_rows, preview) = self.preview(&key, preview_limit).await;
            reports.push(PeriodReport {
                period: period.as_str().to_string(),
                file: key.file_name(),
                status,
                merge,
                error,
                total_rows,
                preview,
            });
        }

        let realtime = match realtime {
            Some((status, outcome)) => Some(self.realtime_report(&symbol, status, outcome).await),
            None => None,
        };

        let success = reports.iter().all(|r| r.status != RefreshStatus::Failed)
            && realtime
                .as_ref()
                .is_none_or(|r| r.status != RefreshStatus::Failed);
        info!(
            symbol = %symbol,
            periods = reports.len(),
            realtime = realtime.is_some(),
            success,
            "instant refresh finished"
        );

        RefreshReport {
            symbol: symbol.to_string(),
            adjustment,
            success,
            periods: reports,
            realtime,
        }
    }

    /// 读取文件末尾若干行；文件尚不存在时为空
    async fn preview(&self, key: &SeriesKey, limit: usize) -> (usize, Vec<Bar>) {
        match self.store.read_tail(key, limit).await {
            Ok(page) => (page.total_rows, page.bars),
            Err(StoreError::NotFound(_)) => (0, Vec::new()),
            Err(e) => {
                warn!(file = %key.file_name(), "preview read failed: {e}");
                (0, Vec::new())
            }
        }
    }

    async fn realtime_report(
        &self,
        symbol: &Symbol,
        status: RefreshStatus,
        outcome: Result<Tick, String>,
    ) -> RealtimeReport {
        let file = SeriesName::Realtime(symbol.clone()).file_name();
        let (tick, error) = match outcome {
            Ok(tick) => (Some(tick), None),
            Err(reason) => {
                let previous = match self.store.latest_tick(symbol).await {
                    Ok(tick) => tick,
                    Err(e) => {
                        warn!(file = %file, "snapshot read failed: {e}");
                        None
                    }
                };
                (previous, (!reason.is_empty()).then_some(reason))
            }
        };
        RealtimeReport {
            file,
            status,
            error,
            tick,
        }
    }
}

async fn fetch_kline(
    adapter: Arc<dyn FetchAdapter>,
    store: Arc<dyn SeriesStore>,
    key: SeriesKey,
) -> Result<MergeResult, String> {
    let bars = adapter
        .fetch_kline(&key.symbol, key.period, key.adjustment)
        .await
        .map_err(|e| format!("fetch: {e}"))?;
    store
        .merge(&key, &bars)
        .await
        .map_err(|e| format!("store: {e}"))
}

async fn fetch_tick(
    adapter: Arc<dyn FetchAdapter>,
    store: Arc<dyn SeriesStore>,
    symbol: Symbol,
) -> Result<Tick, String> {
    let ticks = adapter
        .fetch_realtime(std::slice::from_ref(&symbol))
        .await
        .map_err(|e| format!("fetch: {e}"))?;
    let tick = ticks
        .into_iter()
        .find(|t| t.symbol == symbol)
        .ok_or_else(|| format!("fetch: {symbol} missing from realtime payload"))?;
    store
        .save_tick(&tick)
        .await
        .map_err(|e| format!("store: {e}"))?;
    Ok(tick)
}
