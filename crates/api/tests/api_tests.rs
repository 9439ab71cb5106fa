use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tickvault_api::middleware::auth::ApiKey;
use tickvault_api::server::{AppState, serve};
use tickvault_api::session::SessionStore;
use tickvault_cache::mem::MemCache;
use tickvault_core::common::time::FakeClockProvider;
use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_core::store::entity::SeriesKey;
use tickvault_core::store::port::SeriesStore;
use tickvault_core::test_utils::{ScriptedFetchAdapter, base_time, sample_bar, sample_tick};
use tickvault_scheduler::collector::Collector;
use tickvault_scheduler::registry::InFlightRegistry;
use tickvault_scheduler::table::{DueTable, Job};
use tickvault_store::csv_store::CsvSeriesStore;

const KEY: &str = "secret-key-123";
const DAILY: &str = "000001_SH_1d_front_kline.csv";

struct Gateway {
    base: String,
    client: reqwest::Client,
    store: Arc<CsvSeriesStore>,
    adapter: Arc<ScriptedFetchAdapter>,
    tmp: TempDir,
    shutdown: CancellationToken,
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Gateway {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    fn authed(&self, path: &str) -> reqwest::RequestBuilder {
        self.get(path).header(AUTHORIZATION, format!("Bearer {KEY}"))
    }
}

struct Options {
    api_key: Option<&'static str>,
    feed: bool,
    scheduler: bool,
    max_rows: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: Some(KEY),
            feed: true,
            scheduler: true,
            max_rows: 10_000,
        }
    }
}

async fn spawn(options: Options) -> Gateway {
    tickvault_core::install_crypto_provider();
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(CsvSeriesStore::new(tmp.path()).unwrap());
    let adapter = Arc::new(ScriptedFetchAdapter::new());
    let collector = options
        .feed
        .then(|| Collector::new(adapter.clone(), store.clone(), InFlightRegistry::new()));
    let scheduler = options.scheduler.then(|| {
        let table = DueTable::new(3);
        table.insert(Job::Realtime, Duration::from_secs(5), base_time());
        table
    });

    let state = AppState {
        store: store.clone(),
        sessions: SessionStore::new(Arc::new(MemCache::new()), Duration::from_secs(1800)),
        api_key: options.api_key.map(ApiKey::new),
        max_rows: options.max_rows,
        collector,
        scheduler,
        clock: Arc::new(FakeClockProvider::new(base_time())),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(serve(state, listener, shutdown.clone()));

    Gateway {
        base,
        client: reqwest::Client::new(),
        store,
        adapter,
        tmp,
        shutdown,
    }
}

fn symbol() -> Symbol {
    Symbol::parse("000001.SH").unwrap()
}

async fn seed_daily(gw: &Gateway, rows: u32) {
    let s = symbol();
    let key = SeriesKey::new(s.clone(), Period::Day1, Adjustment::Front);
    let bars: Vec<_> = (0..rows)
        .map(|i| sample_bar(&s, Period::Day1, i, 10.0 + f64::from(i) / 100.0))
        .collect();
    gw.store.merge(&key, &bars).await.unwrap();
}

async fn json(resp: reqwest::Response) -> Value {
    resp.json::<Value>().await.unwrap()
}

// ============================================================
//  鉴权
// ============================================================

#[tokio::test]
async fn test_no_credential_is_unauthorized() {
    let gw = spawn(Options::default()).await;
    let resp = gw.get("/api/files").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_auth_channel_precedence() {
    let gw = spawn(Options::default()).await;

    // 合法 Bearer + 错误的 api_key
    let resp = gw
        .authed("/api/files")
        .query(&[("api_key", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // 错误 Bearer + 合法 api_key
    let resp = gw
        .get("/api/files")
        .header(AUTHORIZATION, "Bearer wrong")
        .query(&[("api_key", KEY)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // 两者都错
    let resp = gw
        .get("/api/files")
        .header(AUTHORIZATION, "Bearer wrong")
        .query(&[("api_key", "also-wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_authorization_header() {
    let gw = spawn(Options::default()).await;

    for header in ["Basic abc", "Bearer ", "Token x"] {
        let resp = gw
            .get("/api/files")
            .header(AUTHORIZATION, header)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{header}");
        assert_eq!(json(resp).await["code"], "MALFORMED_CREDENTIAL");
    }

    // 格式错误的头不影响后续通道
    let resp = gw
        .get("/api/files")
        .header(AUTHORIZATION, "Basic abc")
        .query(&[("api_key", KEY)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_cookie_and_logout() {
    let gw = spawn(Options::default()).await;

    let resp = gw
        .client
        .post(gw.url("/login"))
        .json(&serde_json::json!({ "api_key": KEY }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let set_cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("tv_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
    let body = json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["expires_in"], 1800);
    assert!(set_cookie.contains(&token));

    let cookie = format!("tv_session={token}");
    let resp = gw
        .get("/api/stats")
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = gw
        .client
        .post(gw.url("/logout"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

    let resp = gw
        .get("/api/stats")
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_form_and_rejections() {
    let gw = spawn(Options::default()).await;

    let resp = gw
        .client
        .post(gw.url("/login"))
        .form(&[("api_key", KEY)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = gw
        .client
        .post(gw.url("/login"))
        .form(&[("api_key", "nope-nope")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = gw
        .client
        .post(gw.url("/login"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["code"], "INVALID_PARAMETER");
}

#[tokio::test]
async fn test_open_mode_without_api_key() {
    let gw = spawn(Options {
        api_key: None,
        ..Default::default()
    })
    .await;
    let resp = gw.get("/api/files").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================
//  文件
// ============================================================

#[tokio::test]
async fn test_json_tail_on_large_file() {
    let gw = spawn(Options::default()).await;
    seed_daily(&gw, 1500).await;

    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("format", "json"), ("limit", "2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total_rows"], 1500);
    assert_eq!(body["returned_rows"], 2);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);

    let s = symbol();
    let row_1499 = sample_bar(&s, Period::Day1, 1498, 0.0);
    let row_1500 = sample_bar(&s, Period::Day1, 1499, 0.0);
    assert_eq!(data[0]["timestamp"], row_1499.time_key());
    assert_eq!(data[1]["timestamp"], row_1500.time_key());
    assert_eq!(data[1]["adjustment"], "front");

    // 倒序返回同样的两行
    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("format", "json"), ("limit", "2"), ("reverse_time", "true")])
        .send()
        .await
        .unwrap();
    let reversed = json(resp).await;
    assert_eq!(reversed["data"][0]["timestamp"], row_1500.time_key());
    assert_eq!(reversed["data"][1]["timestamp"], row_1499.time_key());
}

#[tokio::test]
async fn test_json_limit_is_clamped_and_validated() {
    let gw = spawn(Options {
        max_rows: 100,
        ..Default::default()
    })
    .await;
    seed_daily(&gw, 150).await;

    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("format", "json")])
        .send()
        .await
        .unwrap();
    let body = json(resp).await;
    assert_eq!(body["total_rows"], 150);
    assert_eq!(body["returned_rows"], 100);

    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("format", "json"), ("limit", "5000")])
        .send()
        .await
        .unwrap();
    assert_eq!(json(resp).await["returned_rows"], 100);

    for bad in ["0", "-3", "ten"] {
        let resp = gw
            .authed(&format!("/api/files/{DAILY}"))
            .query(&[("format", "json"), ("limit", bad)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(json(resp).await["code"], "INVALID_PARAMETER");
    }
}

#[tokio::test]
async fn test_csv_passthrough_and_download() {
    let gw = spawn(Options::default()).await;
    seed_daily(&gw, 3).await;
    let on_disk = std::fs::read(gw.tmp.path().join(DAILY)).unwrap();

    let resp = gw.authed(&format!("/api/files/{DAILY}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    assert_eq!(resp.bytes().await.unwrap().to_vec(), on_disk);

    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("limit", "2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = gw
        .authed(&format!("/api/files/{DAILY}"))
        .query(&[("format", "xlsx")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["code"], "UNSUPPORTED_FORMAT");

    let resp = gw.authed(&format!("/api/download/{DAILY}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[CONTENT_DISPOSITION].to_str().unwrap(),
        format!("attachment; filename=\"{DAILY}\"")
    );
    assert_eq!(resp.bytes().await.unwrap().to_vec(), on_disk);
}

#[tokio::test]
async fn test_unknown_and_unparseable_names() {
    let gw = spawn(Options::default()).await;
    for path in [
        "/api/files/000001_SH_1d_front_kline.csv",
        "/api/files/..%2F..%2Fetc%2Fpasswd",
        "/api/files/notes.txt",
        "/api/download/600000_SH_5m_back_kline.csv",
    ] {
        let resp = gw.authed(path).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        assert_eq!(json(resp).await["code"], "FILE_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_realtime_snapshot_is_served_as_json() {
    let gw = spawn(Options::default()).await;
    let s = symbol();
    gw.store
        .save_tick(&sample_tick(&s, base_time(), 10.5))
        .await
        .unwrap();
    let name = "000001_SH_real_time_price.json";
    let on_disk = std::fs::read(gw.tmp.path().join(name)).unwrap();

    let resp = gw.authed(&format!("/api/files/{name}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    assert_eq!(resp.bytes().await.unwrap().to_vec(), on_disk);

    let resp = gw
        .authed(&format!("/api/files/{name}"))
        .query(&[("format", "csv")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["code"], "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_list_files_and_stats() {
    let gw = spawn(Options::default()).await;
    seed_daily(&gw, 4).await;
    gw.store
        .save_tick(&sample_tick(&symbol(), base_time(), 10.5))
        .await
        .unwrap();

    let body = json(gw.authed("/api/files").send().await.unwrap()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    let files = body["files"].as_array().unwrap();
    // 实时快照排在 K 线之前
    assert_eq!(files[0]["name"], "000001_SH_real_time_price.json");
    assert_eq!(files[1]["name"], DAILY);
    assert_eq!(files[1]["rows"], 4);
    assert_eq!(files[1]["period"], "1d");

    let body = json(gw.authed("/api/stats").send().await.unwrap()).await;
    assert_eq!(body["stats"]["total_files"], 2);
    assert_eq!(body["stats"]["kline_files"], 1);
    assert_eq!(body["stats"]["realtime_files"], 1);
    assert!(body["stats"]["total_size_bytes"].as_u64().unwrap() > 0);
    assert!(body["stats"]["generated_at"].is_string());
}

// ============================================================
//  运维与即时刷新
// ============================================================

#[tokio::test]
async fn test_scheduler_status() {
    let gw = spawn(Options::default()).await;
    let body = json(gw.authed("/api/scheduler/status").send().await.unwrap()).await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["status"]["total"], 1);
    assert_eq!(body["status"]["pairs"][0]["period"], "realtime");
    assert_eq!(body["status"]["pairs"][0]["health"], "healthy");

    let gw = spawn(Options {
        scheduler: false,
        ..Default::default()
    })
    .await;
    let body = json(gw.authed("/api/scheduler/status").send().await.unwrap()).await;
    assert_eq!(body["enabled"], false);
    assert!(body["status"].is_null());
}

#[tokio::test]
async fn test_instant_query() {
    let gw = spawn(Options::default()).await;
    let s = Symbol::parse("600689.SH").unwrap();
    let bars: Vec<_> = (0..3u32)
        .map(|i| sample_bar(&s, Period::Day1, i, 10.0 + f64::from(i)))
        .collect();
    gw.adapter.set_kline(&s, Period::Day1, Ok(bars));

    let resp = gw
        .authed("/api/instant_query")
        .query(&[
            ("stock_code", "600689.SH"),
            ("periods", "1d"),
            ("preview_limit", "2"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert_eq!(body["success"], true);
    let day = &body["result"]["periods"][0];
    assert_eq!(day["status"], "updated");
    assert_eq!(day["file"], "600689_SH_1d_front_kline.csv");
    assert_eq!(day["total_rows"], 3);
    assert_eq!(day["preview"].as_array().unwrap().len(), 2);
    assert_eq!(body["result"]["realtime"]["status"], "updated");

    // POST JSON
    let resp = gw
        .client
        .post(gw.url("/api/instant_query"))
        .header(AUTHORIZATION, format!("Bearer {KEY}"))
        .json(&serde_json::json!({
            "stock_code": "600689.SH",
            "periods": "",
            "include_realtime": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert!(body["result"]["periods"].as_array().unwrap().is_empty());

    let resp = gw
        .authed("/api/instant_query")
        .query(&[("stock_code", "600689")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["code"], "INVALID_PARAMETER");
}

#[tokio::test]
async fn test_instant_query_without_feed() {
    let gw = spawn(Options {
        feed: false,
        ..Default::default()
    })
    .await;
    let resp = gw
        .authed("/api/instant_query")
        .query(&[("stock_code", "600689.SH")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(resp).await["code"], "FEED_UNAVAILABLE");
}

#[tokio::test]
async fn test_openapi_document_is_public() {
    let gw = spawn(Options::default()).await;
    let resp = gw.get("/api-docs/openapi.json").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = json(resp).await;
    assert!(doc["paths"]["/api/files/{name}"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer_key"].is_object());
}
