use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_core::market::error::FetchError;
use tickvault_core::market::port::FetchAdapter;
use tickvault_feed::bridge::HttpBridgeProvider;

/// 模拟行情桥接服务
///
/// - `600689.SH` 返回两根正常 K 线与一根坏数据
/// - `000002.SZ` 返回空数组
/// - `000003.SZ` 返回 404
/// - 其余返回 500
type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn kline(
    State(seen): State<Seen>,
    Query(q): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let code = q.get("stock_code").cloned().unwrap_or_default();
    seen.lock().unwrap().push(q);
    match code.as_str() {
        "600689.SH" => (
            StatusCode::OK,
            Json(json!({
                "data": [
                    {"time": 1_760_000_060_000_i64, "open": 10.0, "high": 10.5, "low": 9.9, "close": 10.2, "volume": 1000.0, "amount": 10200.0},
                    {"time": 1_760_000_000_000_i64, "open": 9.8, "high": 10.1, "low": 9.7, "close": 10.0, "volume": 800.0, "amount": 8000.0},
                    {"time": 1_760_000_120_000_i64, "open": null, "high": 10.5, "low": 9.9, "close": 10.2}
                ]
            })),
        ),
        "000002.SZ" => (StatusCode::OK, Json(json!({"data": []}))),
        "000003.SZ" => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown"}))),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
    }
}

async fn full_tick(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    let codes = q.get("stock_codes").cloned().unwrap_or_default();
    let mut out = serde_json::Map::new();
    for code in codes.split(',') {
        if code == "600689.SH" {
            out.insert(
                code.to_string(),
                json!({
                    "time": 1_760_000_000_000_i64,
                    "lastPrice": 10.5, "lastClose": 10.0,
                    "open": 10.1, "high": 10.6, "low": 10.0,
                    "volume": 5000.0, "amount": 52000.0,
                    "bidPrice": [10.49, 10.48, 10.47, 10.46, 10.45],
                    "bidVol": [100.0, 100.0, 100.0, 100.0, 100.0],
                    "askPrice": [10.51, 10.52, 10.53, 10.54, 10.55],
                    "askVol": [100.0, 100.0, 100.0, 100.0, 100.0]
                }),
            );
        }
    }
    Json(serde_json::Value::Object(out))
}

/// 在随机端口启动模拟服务，返回地址与记录下来的 K 线请求参数
async fn spawn_vendor() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/kline", get(kline))
        .route("/full_tick", get(full_tick))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), seen)
}

fn provider(base: &str) -> HttpBridgeProvider {
    tickvault_core::install_crypto_provider();
    HttpBridgeProvider::new(base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_kline_normalizes_and_sorts() {
    let (base, _) = spawn_vendor().await;
    let provider = provider(&base);
    let symbol = Symbol::parse("600689.SH").unwrap();

    let bars = provider
        .fetch_kline(&symbol, Period::Minute1, Adjustment::Front)
        .await
        .unwrap();

    assert_eq!(bars.len(), 2);
    assert!(bars[0].timestamp < bars[1].timestamp);
    assert_eq!(bars[1].close, 10.2);
    assert_eq!(bars[1].turnover, 10200.0);
    assert!(bars.iter().all(|b| b.symbol == symbol && b.period == Period::Minute1));
}

#[tokio::test]
async fn test_kline_query_parameters() {
    let (base, seen) = spawn_vendor().await;
    let provider = provider(&base);
    let symbol = Symbol::parse("600689.SH").unwrap();

    provider
        .fetch_kline(&symbol, Period::Minute5, Adjustment::Back)
        .await
        .unwrap();
    provider
        .fetch_kline(&symbol, Period::Month1, Adjustment::Raw)
        .await
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0]["stock_code"], "600689.SH");
    assert_eq!(seen[0]["period"], "5m");
    assert_eq!(seen[0]["dividend_type"], "back");
    assert!(seen[0].contains_key("count"));
    assert_eq!(seen[1]["period"], "1M");
    assert_eq!(seen[1]["dividend_type"], "none");
    assert!(!seen[1].contains_key("count"));
}

#[tokio::test]
async fn test_fetch_kline_error_mapping() {
    let (base, _) = spawn_vendor().await;
    let provider = provider(&base);

    let empty = Symbol::parse("000002.SZ").unwrap();
    assert_eq!(
        provider
            .fetch_kline(&empty, Period::Day1, Adjustment::Front)
            .await,
        Err(FetchError::Empty)
    );

    let missing = Symbol::parse("000003.SZ").unwrap();
    assert!(matches!(
        provider
            .fetch_kline(&missing, Period::Day1, Adjustment::Front)
            .await,
        Err(FetchError::NotFound(_))
    ));

    let broken = Symbol::parse("000004.SZ").unwrap();
    assert!(matches!(
        provider
            .fetch_kline(&broken, Period::Day1, Adjustment::Front)
            .await,
        Err(FetchError::Network(_))
    ));
}

#[tokio::test]
async fn test_unreachable_vendor_is_network_error() {
    // 绑定后立即释放端口，确保无人监听
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = provider(&format!("http://{addr}"));
    let symbol = Symbol::parse("600689.SH").unwrap();
    assert!(matches!(
        provider.fetch_realtime(&[symbol]).await,
        Err(FetchError::Network(_))
    ));
}

#[tokio::test]
async fn test_fetch_realtime_batch() {
    let (base, _) = spawn_vendor().await;
    let provider = provider(&base);
    let known = Symbol::parse("600689.SH").unwrap();
    let unknown = Symbol::parse("000001.SZ").unwrap();

    let ticks = provider
        .fetch_realtime(&[known.clone(), unknown.clone()])
        .await
        .unwrap();
    assert_eq!(ticks.len(), 1);
    let tick = &ticks[0];
    assert_eq!(tick.symbol, known);
    assert_eq!(tick.change, 0.5);
    assert_eq!(tick.change_pct, 5.0);
    assert_eq!(tick.bid_ask_ratio, 0.0);
    assert_eq!(tick.timestamp.timestamp_millis(), 1_760_000_000_000);

    // 负载为空对象
    assert_eq!(
        provider.fetch_realtime(&[unknown]).await,
        Err(FetchError::Empty)
    );
    assert_eq!(provider.fetch_realtime(&[]).await, Ok(vec![]));
}
