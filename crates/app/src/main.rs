mod cli;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tickvault_api::middleware::auth::ApiKey;
use tickvault_api::server::{AppState, serve};
use tickvault_api::session::SessionStore;
use tickvault_cache::mem::MemCache;
use tickvault_core::cache::port::Cache;
use tickvault_core::common::time::{RealTimeProvider, TimeProvider};
use tickvault_core::config::AppConfig;
use tickvault_core::market::port::FetchAdapter;
use tickvault_core::store::port::SeriesStore;
use tickvault_feed::bridge::HttpBridgeProvider;
use tickvault_scheduler::collector::Collector;
use tickvault_scheduler::registry::InFlightRegistry;
use tickvault_scheduler::scheduler::Scheduler;
use tickvault_store::csv_store::CsvSeriesStore;

use crate::cli::Cli;
use crate::error::AppError;

/// 过期会话的清理间隔
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// # Summary
/// 进程入口：解析命令行、加载配置，再交给 `run` 装配并运行。
///
/// # Returns
/// 正常关闭返回 0，配置错误返回 2，绑定或运行期故障返回 1。
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 日志目录来自配置，配置错误只能直接打到标准错误
    let config = match settings::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tickvault: {e}");
            return ExitCode::from(AppError::from(e).exit_code());
        }
    };
    let _log_guard = logging::init(cli.debug, config.logging.file_dir.as_deref());

    match run(config).await {
        Ok(()) => {
            info!("tickvault stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("tickvault failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// # Summary
/// 纯粹的装配过程：实例化各端口实现并通过 `Arc<dyn Trait>` 注入。
///
/// # Logic
/// 1. 实例化基础设施层 (存储、会话缓存、行情源)。
/// 2. 按配置构造调度器，并取出到期表句柄供网关查询。
/// 3. 绑定端口并启动网关；Ctrl-C 触发统一的取消信号。
/// 4. 网关退出后等待调度器在宽限期内收尾。
async fn run(config: AppConfig) -> Result<(), AppError> {
    info!(data_dir = %config.storage.data_dir, "tickvault starting");
    tickvault_core::install_crypto_provider();

    // 1. 基础设施层
    let store: Arc<dyn SeriesStore> = Arc::new(CsvSeriesStore::new(&config.storage.data_dir)?);
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let cache: Arc<dyn Cache> = Arc::new(MemCache::new());
    let registry = InFlightRegistry::new();

    let adapter: Option<Arc<dyn FetchAdapter>> = match config.feed.base_url.as_deref() {
        Some(url) => {
            info!(feed = %url, "using vendor HTTP bridge");
            Some(Arc::new(HttpBridgeProvider::new(
                url,
                Duration::from_secs(config.feed.timeout_secs),
            )?))
        }
        None => {
            warn!("no feed configured, serving existing files only");
            None
        }
    };

    // 2. 调度器与即时刷新
    let shutdown = CancellationToken::new();
    let collector = adapter
        .as_ref()
        .map(|a| Collector::new(a.clone(), store.clone(), registry.clone()));

    let scheduler = match (&adapter, config.scheduler.enabled) {
        (Some(adapter), true) => Some(Scheduler::from_config(
            &config,
            adapter.clone(),
            store.clone(),
            clock.clone(),
            registry.clone(),
        )?),
        (None, true) => {
            warn!("scheduler enabled but no feed configured, scheduler disabled");
            None
        }
        (_, false) => {
            info!("scheduler disabled");
            None
        }
    };
    let table = scheduler.as_ref().map(Scheduler::table);
    let scheduler_task = scheduler.map(|s| {
        info!(jobs = s.table().len(), "scheduler started");
        tokio::spawn(s.run(shutdown.clone()))
    });

    tokio::spawn(sweep_sessions(cache.clone(), shutdown.clone()));
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    // 3. 网关
    let state = AppState {
        store,
        sessions: SessionStore::new(
            cache,
            Duration::from_secs(config.server.session_idle_secs),
        ),
        api_key: config.api_key().map(ApiKey::new),
        max_rows: config.server.max_rows,
        collector,
        scheduler: table,
        clock,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => {
            shutdown.cancel();
            return Err(AppError::Bind { addr, source });
        }
    };
    let served = serve(state, listener, shutdown.clone()).await;

    // 4. 收尾
    shutdown.cancel();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            error!("scheduler task ended abnormally: {e}");
        }
    }
    served.map_err(AppError::Server)
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => {
                    info!("shutdown signal received");
                    shutdown.cancel();
                }
                Err(e) => error!("failed to listen for ctrl-c: {e}"),
            }
        }
        _ = shutdown.cancelled() => {}
    }
}

/// 定期清理空闲过期的会话
async fn sweep_sessions(cache: Arc<dyn Cache>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => match cache.evict_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(evicted = n, "expired sessions removed"),
                Err(e) => warn!("session sweep failed: {e}"),
            },
        }
    }
}
