//! # 运维路由控制器

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, SchedulerStatusResponse, StatsBody, StatsResponse};

/// 数据目录统计
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "运维 (Ops)",
    responses(
        (status = 200, description = "文件数量与总大小", body = StatsResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.store.stats().await?;
    Ok(Json(StatsResponse {
        success: true,
        stats: StatsBody::new(stats, state.clock.now()),
    }))
}

/// 调度器状态
///
/// 每个 (证券, 周期, 复权) 作业的节奏、下次到期时间、连续失败次数与健康状态。
#[utoipa::path(
    get,
    path = "/api/scheduler/status",
    tag = "运维 (Ops)",
    responses(
        (status = 200, description = "调度状态快照", body = SchedulerStatusResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatusResponse> {
    let status = state
        .scheduler
        .as_ref()
        .map(|table| table.status(state.clock.now()));
    Json(SchedulerStatusResponse {
        success: true,
        enabled: status.is_some(),
        status,
    })
}
