//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并在给定监听器上对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的装配代码持有并调用。

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use utoipa::openapi::security::{ApiKey as ApiKeyScheme, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use tickvault_core::common::time::TimeProvider;
use tickvault_core::store::port::SeriesStore;
use tickvault_scheduler::collector::Collector;
use tickvault_scheduler::table::DueTable;

use crate::middleware::auth::ApiKey;
use crate::routes::{auth, files, ops, refresh};
use crate::session::SessionStore;

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有字段在服务启动前由装配代码注入，生命周期与进程等同。
/// - `api_key` 为 `None` 时网关处于开放模式。
#[derive(Clone)]
pub struct AppState {
    /// 时间序列存储
    pub store: Arc<dyn SeriesStore>,
    /// 登录会话
    pub sessions: SessionStore,
    pub api_key: Option<ApiKey>,
    /// JSON 读取的行数上限
    pub max_rows: usize,
    /// 即时刷新服务，未配置行情源时为空
    pub collector: Option<Collector>,
    /// 调度器到期表的只读句柄，未启用调度时为空
    pub scheduler: Option<DueTable>,
    pub clock: Arc<dyn TimeProvider>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tickvault API",
        version = "0.1.0",
        description = "A 股行情采集服务的分发网关。提供 K 线文件与实时快照的浏览、下载、统计与即时刷新。",
        license(name = "MIT")
    ),
    tags(
        (name = "鉴权 (Auth)", description = "API 密钥换取会话 Cookie"),
        (name = "文件 (Files)", description = "文件列表、读取与下载"),
        (name = "运维 (Ops)", description = "数据目录统计与调度器健康状态"),
        (name = "刷新 (Refresh)", description = "绕过调度节奏的即时抓取")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// 为 OpenAPI 文档注入三种鉴权方案：Bearer 头、`api_key` 查询参数与会话 Cookie。
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_key",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("在此处填入 API 密钥（无需 'Bearer ' 前缀）"))
                    .build(),
            ),
        );
        components.add_security_scheme(
            "api_key_query",
            SecurityScheme::ApiKey(ApiKeyScheme::Query(ApiKeyValue::new("api_key"))),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKeyScheme::Cookie(ApiKeyValue::new(
                crate::session::SESSION_COOKIE,
            ))),
        );
    }
}

// ============================================================
//  服务构建与启动
// ============================================================

/// # Summary
/// 构建完整的 axum 应用路由树。
///
/// # Logic
/// 1. `/login`、`/logout` 公开。
/// 2. `/api/*` 统一挂载鉴权中间件。
/// 3. 合并自动收集的 OpenAPI 文档与 Swagger UI，最外层为开放的 CORS。
pub fn build_router(state: AppState) -> Router {
    // 1. 无需鉴权的公开路由
    let public_router = OpenApiRouter::new()
        .routes(routes!(auth::login))
        .routes(routes!(auth::logout, auth::logout_post));

    // 2. 需要任一有效凭证的路由
    let protected_router = OpenApiRouter::new()
        .routes(routes!(files::list_files))
        .routes(routes!(files::get_file))
        .routes(routes!(files::download_file))
        .routes(routes!(ops::get_stats))
        .routes(routes!(ops::scheduler_status))
        .routes(routes!(refresh::instant_query, refresh::instant_query_post))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // 3. 合并所有路由与 OpenAPI 文档
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(public_router)
        .merge(protected_router)
        .with_state(state)
        .split_for_parts();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// # Summary
/// 在已绑定的监听器上提供服务，直到 `shutdown` 被取消。
///
/// # Arguments
/// * `state` - 由装配代码注入的共享状态
/// * `listener` - 已绑定的 TCP 监听器，绑定失败由调用方处理
/// * `shutdown` - 取消后停止接受新连接，并等待进行中的请求完成
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if state.api_key.is_none() {
        tracing::warn!("no API key configured, the gateway is running in open mode");
    }
    let addr = listener.local_addr()?;
    let app = build_router(state);

    tracing::info!("tickvault API listening on {}", addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
