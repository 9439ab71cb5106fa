use crate::registry::{ClaimGuard, FetchTarget, InFlightRegistry};
use crate::table::{DueTable, Job, SchedulerStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickvault_core::common::Symbol;
use tickvault_core::common::session::TradingSession;
use tickvault_core::common::time::TimeProvider;
use tickvault_core::config::{AppConfig, ConfigError, SchedulerConfig};
use tickvault_core::market::port::FetchAdapter;
use tickvault_core::store::entity::{MergeResult, SeriesKey};
use tickvault_core::store::port::SeriesStore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 调度循环的运行参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub max_concurrency: usize,
    pub max_consecutive_failures: u32,
    pub shutdown_grace: Duration,
    pub realtime_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            max_concurrency: config.max_concurrency.max(1),
            max_consecutive_failures: config.max_consecutive_failures,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            realtime_interval: Duration::from_secs(config.realtime_interval_secs),
        }
    }
}

/// 单次 `tick` 的执行结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    // 本次回收的已完成任务
    pub reaped: usize,
    // 新派发的抓取
    pub dispatched: usize,
    // 因目标已在抓取中而跳过
    pub busy: usize,
    // 因并发上限留待下次
    pub deferred: usize,
}

/// 抓取任务共享的依赖
struct JobContext {
    adapter: Arc<dyn FetchAdapter>,
    store: Arc<dyn SeriesStore>,
    clock: Arc<dyn TimeProvider>,
    table: DueTable,
}

/// 派发前取得的占用
enum Claim {
    Kline(SeriesKey, ClaimGuard),
    Realtime(Vec<Symbol>, Vec<ClaimGuard>),
}

impl JobContext {
    /// # Summary
    /// 抓取一个 Pair 并合并进存储，结果写回到期表。
    ///
    /// # Logic
    /// 1. 通过抓取端口获取 K 线。
    /// 2. 合并进存储。
    /// 3. 以抓取结束时的时钟读数记录成功或失败。
    async fn run_kline(&self, key: SeriesKey) {
        let job = Job::Kline(key.clone());
        let outcome = self.fetch_and_merge(&key).await;
        let finished_at = self.clock.now();
        match outcome {
            Ok(result) => {
                debug!(
                    symbol = %key.symbol,
                    period = %key.period,
                    adjustment = %key.adjustment,
                    appended = result.appended,
                    updated = result.updated,
                    unchanged = result.unchanged,
                    "kline merged"
                );
                self.table.record_success(&job, finished_at);
            }
            Err(reason) => {
                self.table.record_failure(&job, finished_at, &reason);
            }
        }
    }

    async fn fetch_and_merge(&self, key: &SeriesKey) -> Result<MergeResult, String> {
        let bars = self
            .adapter
            .fetch_kline(&key.symbol, key.period, key.adjustment)
            .await
            .map_err(|e| format!("fetch: {e}"))?;
        self.store
            .merge(key, &bars)
            .await
            .map_err(|e| format!("store: {e}"))
    }

    /// # Summary
    /// 批量刷新实时快照。
    ///
    /// # Logic
    /// 1. 一次请求抓取全部已占用的证券。
    /// 2. 逐个覆盖写入快照文件，只接受本批次请求的证券。
    async fn run_realtime(&self, symbols: Vec<Symbol>) {
        let outcome = self.fetch_and_save(&symbols).await;
        let finished_at = self.clock.now();
        match outcome {
            Ok(saved) => {
                if saved < symbols.len() {
                    warn!(requested = symbols.len(), saved, "realtime payload missing symbols");
                } else {
                    debug!(requested = symbols.len(), saved, "realtime snapshots saved");
                }
                self.table.record_success(&Job::Realtime, finished_at);
            }
            Err(reason) => {
                self.table
                    .record_failure(&Job::Realtime, finished_at, &reason);
            }
        }
    }

    async fn fetch_and_save(&self, symbols: &[Symbol]) -> Result<usize, String> {
        let ticks = self
            .adapter
            .fetch_realtime(symbols)
            .await
            .map_err(|e| format!("fetch: {e}"))?;
        let mut saved = 0;
        for tick in ticks.iter().filter(|t| symbols.contains(&t.symbol)) {
            self.store
                .save_tick(tick)
                .await
                .map_err(|e| format!("store {}: {e}", tick.symbol))?;
            saved += 1;
        }
        Ok(saved)
    }
}

/// # Summary
/// 采集调度器。
///
/// # Invariants
/// - 每个 Pair 至多一个进行中的抓取：调度器与即时刷新共用 `InFlightRegistry`。
/// - 同时进行的抓取数不超过 `max_concurrency`，超出的到期作业留待下一次 `tick`。
/// - 日内周期与实时作业只在交易时段内派发。
/// - 抓取与存储的错误只写入到期表，不会从调度循环中传播出去。
pub struct Scheduler {
    ctx: Arc<JobContext>,
    settings: SchedulerSettings,
    session: TradingSession,
    registry: InFlightRegistry,
    realtime_symbols: Vec<Symbol>,
    tasks: JoinSet<()>,
    task_jobs: HashMap<Id, Job>,
}

impl Scheduler {
    /// # Summary
    /// 创建一个空的调度器，随后通过 `add_pair` / `set_realtime_symbols` 登记作业。
    ///
    /// # Arguments
    /// * `adapter`: 行情抓取端口。
    /// * `store`: 时间序列存储。
    /// * `clock`: 时钟，测试中注入虚拟时钟。
    /// * `registry`: 与即时刷新共享的进行中登记表。
    /// * `session`: 交易活跃窗口。
    /// * `settings`: 运行参数。
    pub fn new(
        adapter: Arc<dyn FetchAdapter>,
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn TimeProvider>,
        registry: InFlightRegistry,
        session: TradingSession,
        settings: SchedulerSettings,
    ) -> Self {
        let table = DueTable::new(settings.max_consecutive_failures);
        Self {
            ctx: Arc::new(JobContext {
                adapter,
                store,
                clock,
                table,
            }),
            settings,
            session,
            registry,
            realtime_symbols: Vec::new(),
            tasks: JoinSet::new(),
            task_jobs: HashMap::new(),
        }
    }

    /// # Summary
    /// 按配置构造调度器并登记全部作业。
    ///
    /// # Logic
    /// 1. 每个证券与每个周期组成一个 Pair，节奏取配置覆盖值或周期默认值。
    /// 2. 实时证券列表非空时登记批量实时作业。
    ///
    /// # Returns
    /// 证券代码或交易时段配置非法时返回 `ConfigError`。
    pub fn from_config(
        config: &AppConfig,
        adapter: Arc<dyn FetchAdapter>,
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn TimeProvider>,
        registry: InFlightRegistry,
    ) -> Result<Self, ConfigError> {
        let session = config.trading_session()?;
        let mut scheduler = Self::new(
            adapter,
            store,
            clock,
            registry,
            session,
            SchedulerSettings::from(&config.scheduler),
        );
        let adjustment = config.scheduler.adjustment;
        for symbol in config.symbols()? {
            for period in &config.scheduler.periods {
                scheduler.add_pair(
                    SeriesKey::new(symbol.clone(), *period, adjustment),
                    config.refresh_interval(*period),
                );
            }
        }
        scheduler.set_realtime_symbols(config.realtime_symbols()?);
        Ok(scheduler)
    }

    /// 登记一个 K 线 Pair，立即到期
    pub fn add_pair(&mut self, key: SeriesKey, cadence: Duration) {
        self.ctx
            .table
            .insert(Job::Kline(key), cadence, self.ctx.clock.now());
    }

    /// 设置实时快照的证券列表，非空时登记批量实时作业
    pub fn set_realtime_symbols(&mut self, symbols: Vec<Symbol>) {
        if !symbols.is_empty() {
            self.ctx.table.insert(
                Job::Realtime,
                self.settings.realtime_interval,
                self.ctx.clock.now(),
            );
        }
        self.realtime_symbols = symbols;
    }

    /// 与 HTTP 层共享的到期表句柄
    pub fn table(&self) -> DueTable {
        self.ctx.table.clone()
    }

    /// 运维快照
    pub fn status(&self) -> SchedulerStatus {
        self.ctx.table.status(self.ctx.clock.now())
    }

    /// 本调度器当前进行中的抓取数
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn needs_session(job: &Job) -> bool {
        match job {
            Job::Kline(key) => key.period.is_intraday(),
            Job::Realtime => true,
        }
    }

    /// # Summary
    /// 调度循环的单步。
    ///
    /// # Logic
    /// 1. 不等待地回收已完成的抓取任务。
    /// 2. 取出 `next_due <= now` 且满足交易时段规则的作业，到期越早越优先。
    /// 3. 目标已被占用 (如即时刷新正在进行) 的作业跳过，不排队。
    /// 4. 在并发上限内派发，超出上限的作业保持到期状态。
    ///
    /// # Arguments
    /// * `now`: 当前时刻，由调用方从时钟读取。
    ///
    /// # Returns
    /// 本步的派发统计。
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            reaped: self.reap_finished(),
            ..TickReport::default()
        };

        let session_open = self.session.is_open(now);
        let due = self
            .ctx
            .table
            .due(now, |job| session_open || !Self::needs_session(job));

        for job in due {
            if self.tasks.len() >= self.settings.max_concurrency {
                report.deferred += 1;
                continue;
            }
            match self.claim(&job) {
                Some(claim) => {
                    self.dispatch(job, claim, now);
                    report.dispatched += 1;
                }
                None => {
                    debug!(job = %job.label(), "skipped, fetch already in flight");
                    report.busy += 1;
                }
            }
        }
        report
    }

    fn claim(&self, job: &Job) -> Option<Claim> {
        match job {
            Job::Kline(key) => self
                .registry
                .try_claim(FetchTarget::Kline(key.clone()))
                .map(|guard| Claim::Kline(key.clone(), guard)),
            Job::Realtime => {
                let mut symbols = Vec::with_capacity(self.realtime_symbols.len());
                let mut guards = Vec::with_capacity(self.realtime_symbols.len());
                for symbol in &self.realtime_symbols {
                    if let Some(guard) = self
                        .registry
                        .try_claim(FetchTarget::Realtime(symbol.clone()))
                    {
                        symbols.push(symbol.clone());
                        guards.push(guard);
                    }
                }
                (!symbols.is_empty()).then_some(Claim::Realtime(symbols, guards))
            }
        }
    }

    fn dispatch(&mut self, job: Job, claim: Claim, now: DateTime<Utc>) {
        self.ctx.table.mark_dispatched(&job, now);
        let ctx = self.ctx.clone();
        let handle = match claim {
            Claim::Kline(key, guard) => self.tasks.spawn(async move {
                let _guard = guard;
                ctx.run_kline(key).await;
            }),
            Claim::Realtime(symbols, guards) => self.tasks.spawn(async move {
                let _guards = guards;
                ctx.run_realtime(symbols).await;
            }),
        };
        self.task_jobs.insert(handle.id(), job);
    }

    fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.on_joined(joined);
            reaped += 1;
        }
        reaped
    }

    /// 任务异常退出时也要把作业从进行中状态释放出来
    fn on_joined(&mut self, joined: Result<(Id, ()), JoinError>) {
        match joined {
            Ok((id, ())) => {
                self.task_jobs.remove(&id);
            }
            Err(e) => {
                let Some(job) = self.task_jobs.remove(&e.id()) else {
                    return;
                };
                let reason = if e.is_panic() {
                    "fetch task panicked"
                } else {
                    "fetch task cancelled"
                };
                error!(job = %job.label(), "{reason}");
                self.ctx
                    .table
                    .record_failure(&job, self.ctx.clock.now(), reason);
            }
        }
    }

    /// # Summary
    /// 等待本调度器所有进行中的抓取结束。
    ///
    /// # Returns
    /// 回收的任务数。
    pub async fn wait_in_flight(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.on_joined(joined);
            reaped += 1;
        }
        reaped
    }

    /// # Summary
    /// 驱动调度循环直到收到关闭信号。
    ///
    /// # Logic
    /// 1. 按固定节拍读取时钟并调用 `tick`。
    /// 2. 关闭信号触发后停止派发。
    /// 3. 在宽限期内等待进行中的抓取；超时后中止剩余任务。
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            jobs = self.ctx.table.len(),
            max_concurrency = self.settings.max_concurrency,
            "scheduler started"
        );
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = self.ctx.clock.now();
                    let report = self.tick(now);
                    if report.dispatched > 0 || report.deferred > 0 {
                        debug!(
                            dispatched = report.dispatched,
                            deferred = report.deferred,
                            busy = report.busy,
                            in_flight = self.tasks.len(),
                            "scheduler tick"
                        );
                    }
                }
            }
        }

        self.drain().await;
    }

    async fn drain(&mut self) {
        let pending = self.tasks.len();
        if pending > 0 {
            info!(
                pending,
                grace_secs = self.settings.shutdown_grace.as_secs(),
                "waiting for in-flight fetches"
            );
            let grace = self.settings.shutdown_grace;
            if tokio::time::timeout(grace, self.wait_in_flight())
                .await
                .is_err()
            {
                warn!(
                    remaining = self.tasks.len(),
                    "grace period elapsed, aborting remaining fetches"
                );
                self.tasks.shutdown().await;
                self.task_jobs.clear();
            }
        }
        info!("scheduler stopped");
    }
}
