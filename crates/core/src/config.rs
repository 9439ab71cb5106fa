use crate::common::session::{TradingSession, offset_from_hours};
use crate::common::{Adjustment, Period, Symbol};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// API Key 的最短长度
pub const MIN_API_KEY_LEN: usize = 8;

/// # Summary
/// 配置加载与校验错误。
#[derive(Error, Debug)]
pub enum ConfigError {
    // 配置源读取或反序列化失败
    #[error("Failed to load config: {0}")]
    Load(String),
    // 配置值不合法
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    // 未配置时网关以开放模式运行
    pub api_key: Option<String>,
    // 登录会话的空闲过期时间
    pub session_idle_secs: u64,
    // JSON 格式单次返回的最大行数
    pub max_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            api_key: None,
            session_idle_secs: 30 * 60,
            max_rows: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    // 行情桥接服务地址，未配置时不启动采集
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_interval_ms: u64,
    pub max_concurrency: usize,
    pub max_consecutive_failures: u32,
    pub shutdown_grace_secs: u64,
    pub realtime_interval_secs: u64,
    // K 线采集的证券列表
    pub symbols: Vec<String>,
    // 实时行情采集的证券列表
    pub realtime_symbols: Vec<String>,
    pub periods: Vec<Period>,
    pub adjustment: Adjustment,
    // 按周期覆盖默认刷新间隔 (秒)，键为 `1m` / `1d` / `1month` 等规范标记
    pub refresh_overrides: BTreeMap<Period, u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: 1_000,
            max_concurrency: 4,
            max_consecutive_failures: 5,
            shutdown_grace_secs: 10,
            realtime_interval_secs: 5,
            symbols: Vec::new(),
            realtime_symbols: Vec::new(),
            periods: Period::ALL.to_vec(),
            adjustment: Adjustment::Front,
            refresh_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // 本地开盘时间 `HH:MM`
    pub open: String,
    // 本地收盘时间 `HH:MM`
    pub close: String,
    pub utc_offset_hours: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open: "09:00".to_string(),
            close: "15:30".to_string(),
            utc_offset_hours: crate::common::session::EXCHANGE_UTC_OFFSET_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    // 滚动日志目录，未配置时只输出到终端
    pub file_dir: Option<String>,
}

impl AppConfig {
    /// # Summary
    /// 校验整份配置。
    ///
    /// # Logic
    /// 1. 监听地址：端口非 0，主机非空。
    /// 2. API Key：若配置则至少 8 位且不含空白字符。
    /// 3. 调度参数：并发上限、节拍间隔、实时间隔均须大于 0。
    /// 4. 证券代码与交易时段均须可解析。
    ///
    /// # Returns
    /// 第一处不合法的配置项对应的 `ConfigError::Invalid`。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must not be 0"));
        }
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }
        if let Some(key) = self.api_key() {
            if key.len() < MIN_API_KEY_LEN {
                return Err(invalid(format!(
                    "server.api_key must be at least {MIN_API_KEY_LEN} characters"
                )));
            }
            if key.chars().any(char::is_whitespace) {
                return Err(invalid("server.api_key must not contain whitespace"));
            }
        }
        if self.server.max_rows == 0 {
            return Err(invalid("server.max_rows must be positive"));
        }
        if self.server.session_idle_secs == 0 {
            return Err(invalid("server.session_idle_secs must be positive"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(invalid("storage.data_dir must not be empty"));
        }

        let scheduler = &self.scheduler;
        if scheduler.max_concurrency == 0 {
            return Err(invalid("scheduler.max_concurrency must be positive"));
        }
        if scheduler.tick_interval_ms == 0 {
            return Err(invalid("scheduler.tick_interval_ms must be positive"));
        }
        if scheduler.realtime_interval_secs == 0 {
            return Err(invalid("scheduler.realtime_interval_secs must be positive"));
        }
        if scheduler.max_consecutive_failures == 0 {
            return Err(invalid("scheduler.max_consecutive_failures must be positive"));
        }
        if let Some((period, _)) = scheduler.refresh_overrides.iter().find(|(_, s)| **s == 0) {
            return Err(invalid(format!(
                "scheduler.refresh_overrides.{period} must be positive"
            )));
        }
        self.symbols()?;
        self.realtime_symbols()?;
        self.trading_session()?;
        Ok(())
    }

    /// 生效的 API Key，空字符串视为未配置
    pub fn api_key(&self) -> Option<&str> {
        self.server
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// K 线采集证券列表 (已去重)
    pub fn symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
        parse_symbols("scheduler.symbols", &self.scheduler.symbols)
    }

    /// 实时行情采集证券列表 (已去重)
    pub fn realtime_symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
        parse_symbols("scheduler.realtime_symbols", &self.scheduler.realtime_symbols)
    }

    /// # Summary
    /// 构造交易活跃窗口。
    ///
    /// # Returns
    /// 时间格式非法、收盘早于开盘或时区偏移越界时返回 `ConfigError::Invalid`。
    pub fn trading_session(&self) -> Result<TradingSession, ConfigError> {
        let open = parse_clock("session.open", &self.session.open)?;
        let close = parse_clock("session.close", &self.session.close)?;
        if close < open {
            return Err(invalid("session.close must not be earlier than session.open"));
        }
        let offset = (-23..=23)
            .contains(&self.session.utc_offset_hours)
            .then(|| offset_from_hours(self.session.utc_offset_hours))
            .flatten()
            .ok_or_else(|| invalid("session.utc_offset_hours must be within -23..=23"))?;
        Ok(TradingSession::new(open, close, offset))
    }

    /// 某周期的最小刷新间隔，优先使用配置覆盖值
    pub fn refresh_interval(&self, period: Period) -> Duration {
        self.scheduler
            .refresh_overrides
            .get(&period)
            .map_or_else(|| period.default_refresh(), |s| Duration::from_secs(*s))
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn parse_symbols(field: &str, raw: &[String]) -> Result<Vec<Symbol>, ConfigError> {
    let mut out: Vec<Symbol> = Vec::with_capacity(raw.len());
    for item in raw {
        let symbol = Symbol::parse(item).map_err(|e| invalid(format!("{field}: {e}")))?;
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    Ok(out)
}

fn parse_clock(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .map_err(|_| invalid(format!("{field} `{raw}` is not a HH:MM time")))
}
