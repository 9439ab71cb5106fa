use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tickvault_core::common::Adjustment;
use tickvault_core::store::entity::{REALTIME_PERIOD, SeriesKey};
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// # Summary
/// 调度器跟踪的一项作业。
///
/// 每个 K 线 Pair 一项；所有实时证券共用一项批量作业。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {
    Kline(SeriesKey),
    Realtime,
}

impl Job {
    /// 日志与状态快照中使用的标签
    pub fn label(&self) -> String {
        match self {
            Job::Kline(key) => key.to_string(),
            Job::Realtime => REALTIME_PERIOD.to_string(),
        }
    }
}

/// 作业健康状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Healthy,
    // 连续失败次数达到阈值
    Degraded,
}

#[derive(Debug, Clone)]
struct PairState {
    cadence: TimeDelta,
    next_due: DateTime<Utc>,
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    health: Health,
    last_error: Option<String>,
    in_flight: bool,
}

/// 单项作业的运维视图
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PairStatus {
    pub job: String,
    pub symbol: Option<String>,
    /// K 线周期，实时作业为 `realtime`
    pub period: String,
    pub adjustment: Option<Adjustment>,
    pub cadence_secs: i64,
    pub next_due: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub health: Health,
    pub last_error: Option<String>,
    pub in_flight: bool,
}

/// 调度器整体运维快照
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SchedulerStatus {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub in_flight: usize,
    pub pairs: Vec<PairStatus>,
}

/// # Summary
/// 作业到期表。
///
/// # Invariants
/// - 调度循环与 HTTP 状态查询共享同一份数据，克隆只增加引用计数。
/// - 无论成功失败，下一次到期时间都从抓取完成时刻起算一个节奏。
/// - 连续失败达到阈值时标记为 `Degraded`，任何一次成功都恢复为 `Healthy`。
#[derive(Clone)]
pub struct DueTable {
    inner: Arc<Mutex<BTreeMap<Job, PairState>>>,
    max_failures: u32,
}

fn to_delta(cadence: Duration) -> TimeDelta {
    TimeDelta::from_std(cadence).unwrap_or(TimeDelta::MAX)
}

fn after(at: DateTime<Utc>, cadence: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(cadence)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl DueTable {
    pub fn new(max_failures: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
            max_failures: max_failures.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Job, PairState>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记作业，首次到期时间为 `first_due`；已存在的作业保持不变
    pub fn insert(&self, job: Job, cadence: Duration, first_due: DateTime<Utc>) {
        self.lock().entry(job).or_insert_with(|| PairState {
            cadence: to_delta(cadence),
            next_due: first_due,
            last_attempt: None,
            last_success: None,
            consecutive_failures: 0,
            health: Health::Healthy,
            last_error: None,
            in_flight: false,
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// # Summary
    /// 计算当前到期的作业。
    ///
    /// # Logic
    /// 1. 过滤出 `next_due <= now`、未在本调度器中运行、且满足 `eligible` 的作业。
    /// 2. 按到期时间升序排列，到期越早越优先；同一时刻按作业键排序。
    pub fn due(&self, now: DateTime<Utc>, eligible: impl Fn(&Job) -> bool) -> Vec<Job> {
        let table = self.lock();
        let mut due: Vec<(DateTime<Utc>, Job)> = table
            .iter()
            .filter(|(job, state)| state.next_due <= now && !state.in_flight && eligible(job))
            .map(|(job, state)| (state.next_due, job.clone()))
            .collect();
        due.sort();
        due.into_iter().map(|(_, job)| job).collect()
    }

    /// 标记作业已派发
    pub fn mark_dispatched(&self, job: &Job, at: DateTime<Utc>) {
        if let Some(state) = self.lock().get_mut(job) {
            state.in_flight = true;
            state.last_attempt = Some(at);
        }
    }

    /// # Summary
    /// 记录一次成功抓取。
    ///
    /// # Logic
    /// 1. 清零连续失败计数，恢复为 `Healthy` (若之前已降级则记 `info`)。
    /// 2. `next_due = finished_at + cadence`。
    pub fn record_success(&self, job: &Job, finished_at: DateTime<Utc>) {
        let mut table = self.lock();
        let Some(state) = table.get_mut(job) else {
            return;
        };
        if state.health == Health::Degraded {
            info!(job = %job.label(), "job recovered");
        }
        state.in_flight = false;
        state.last_success = Some(finished_at);
        state.consecutive_failures = 0;
        state.health = Health::Healthy;
        state.last_error = None;
        state.next_due = after(finished_at, state.cadence);
    }

    /// # Summary
    /// 记录一次失败抓取。
    ///
    /// # Logic
    /// 1. 失败以 `warn` 记录，并按正常节奏推迟下一次到期。
    /// 2. 连续失败次数恰好达到阈值时标记 `Degraded` 并记 `error`。
    ///
    /// # Returns
    /// 作业当前的健康状态。
    pub fn record_failure(&self, job: &Job, finished_at: DateTime<Utc>, reason: &str) -> Health {
        let mut table = self.lock();
        let Some(state) = table.get_mut(job) else {
            return Health::Healthy;
        };
        state.in_flight = false;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(reason.to_string());
        state.next_due = after(finished_at, state.cadence);
        warn!(
            job = %job.label(),
            failures = state.consecutive_failures,
            reason = %reason,
            "fetch failed"
        );
        if state.consecutive_failures >= self.max_failures && state.health == Health::Healthy {
            state.health = Health::Degraded;
            error!(
                job = %job.label(),
                failures = state.consecutive_failures,
                "job degraded after consecutive failures"
            );
        }
        state.health
    }

    /// 单项作业的快照
    pub fn get(&self, job: &Job) -> Option<PairStatus> {
        self.lock().get(job).map(|state| to_status(job, state))
    }

    /// # Summary
    /// 生成整张表的运维快照，按作业键排序。
    pub fn status(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let table = self.lock();
        let pairs: Vec<PairStatus> = table
            .iter()
            .map(|(job, state)| to_status(job, state))
            .collect();
        let degraded = pairs
            .iter()
            .filter(|p| p.health == Health::Degraded)
            .count();
        SchedulerStatus {
            generated_at: now,
            total: pairs.len(),
            healthy: pairs.len() - degraded,
            degraded,
            in_flight: pairs.iter().filter(|p| p.in_flight).count(),
            pairs,
        }
    }
}

fn to_status(job: &Job, state: &PairState) -> PairStatus {
    let (symbol, period, adjustment) = match job {
        Job::Kline(key) => (
            Some(key.symbol.to_string()),
            key.period.as_str().to_string(),
            Some(key.adjustment),
        ),
        Job::Realtime => (None, REALTIME_PERIOD.to_string(), None),
    };
    PairStatus {
        job: job.label(),
        symbol,
        period,
        adjustment,
        cadence_secs: state.cadence.num_seconds(),
        next_due: state.next_due,
        last_attempt: state.last_attempt,
        last_success: state.last_success,
        consecutive_failures: state.consecutive_failures,
        health: state.health,
        last_error: state.last_error.clone(),
        in_flight: state.in_flight,
    }
}
