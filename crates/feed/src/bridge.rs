use crate::normalize::{normalize_klines, normalize_ticks};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_core::market::entity::{Bar, Tick};
use tickvault_core::market::error::FetchError;
use tickvault_core::market::port::FetchAdapter;
use tracing::debug;

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// # Summary
/// 行情桥接服务的 HTTP 抓取实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯。
/// - 所有返回值都已通过 `normalize` 模块的校验，调用方无需再做字段检查。
#[derive(Clone)]
pub struct HttpBridgeProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    /// 桥接服务地址，不含末尾 `/`
    base_url: String,
}

/// K 线接口的响应体
#[derive(Deserialize, Debug)]
struct KlineResponse {
    #[serde(default)]
    data: Vec<Value>,
}

impl HttpBridgeProvider {
    /// # Summary
    /// 创建一个新的 HttpBridgeProvider 实例。
    ///
    /// # Logic
    /// 1. 配置请求超时。
    /// 2. 初始化 reqwest 客户端 (进程内须已调用 `install_crypto_provider`)。
    ///
    /// # Arguments
    /// * `base_url`: 桥接服务地址，如 `http://127.0.0.1:8000`。
    /// * `timeout`: 单次请求超时。
    ///
    /// # Returns
    /// 客户端构建失败时返回 `FetchError::Unknown`。
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tickvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 发起 GET 请求并把状态码映射为抓取错误
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(subject.to_string())),
            status if !status.is_success() => {
                return Err(FetchError::Network(format!("HTTP {status}")));
            }
            _ => {}
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl FetchAdapter for HttpBridgeProvider {
    /// # Summary
    /// 批量抓取实时快照。
    ///
    /// # Logic
    /// 1. 以逗号拼接证券代码请求 `/full_tick`。
    /// 2. 响应为以证券代码为键的对象，交给规范化边界逐个转换。
    async fn fetch_realtime(&self, symbols: &[Symbol]) -> Result<Vec<Tick>, FetchError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<String> = symbols.iter().map(Symbol::to_string).collect();
        let codes = codes.join(",");
        let payload: Value = self
            .get_json("full_tick", &[("stock_codes", codes.clone())], &codes)
            .await?;
        let Value::Object(map) = payload else {
            return Err(FetchError::Malformed(
                "full_tick payload is not an object".to_string(),
            ));
        };
        let ticks = normalize_ticks(symbols, map, Utc::now())?;
        debug!(requested = symbols.len(), received = ticks.len(), "realtime fetched");
        Ok(ticks)
    }

    /// # Summary
    /// 抓取单个证券单个周期的 K 线。
    ///
    /// # Logic
    /// 1. 周期按行情源代码发送 (月线为 `1M`)。
    /// 2. 分钟级周期附带 `count`，日线及以上不带，表示全量历史。
    /// 3. 响应中的 `data` 数组交给规范化边界。
    async fn fetch_kline(
        &self,
        symbol: &Symbol,
        period: Period,
        adjustment: Adjustment,
    ) -> Result<Vec<Bar>, FetchError> {
        let mut query = vec![
            ("stock_code", symbol.to_string()),
            ("period", period.vendor_code().to_string()),
            ("dividend_type", adjustment.as_str().to_string()),
        ];
        if let Some(count) = period.fetch_count() {
            query.push(("count", count.to_string()));
        }
        let resp: KlineResponse = self
            .get_json("kline", &query, &symbol.to_string())
            .await?;
        let bars = normalize_klines(symbol, period, resp.data)?;
        debug!(symbol = %symbol, period = %period, bars = bars.len(), "kline fetched");
        Ok(bars)
    }
}
