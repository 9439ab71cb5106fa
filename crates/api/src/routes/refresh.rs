//! # 即时刷新路由控制器
//!
//! 绕过调度节奏立即抓取某个证券的若干周期与实时快照，并返回每个文件的末尾预览。

use axum::Json;
use axum::extract::State;

use tickvault_core::common::{Adjustment, Period, Symbol};
use tickvault_scheduler::collector::RefreshRequest;

use crate::error::ApiError;
use crate::extract::{ApiQuery, JsonOrForm};
use crate::server::AppState;
use crate::types::{ApiErrorResponse, InstantQueryParams, InstantQueryResponse};

/// 即时刷新 (GET)
#[utoipa::path(
    get,
    path = "/api/instant_query",
    tag = "刷新 (Refresh)",
    params(InstantQueryParams),
    responses(
        (status = 200, description = "各周期与实时快照的刷新结果", body = InstantQueryResponse),
        (status = 400, description = "证券代码、周期或复权类型非法", body = ApiErrorResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse),
        (status = 503, description = "未配置行情源", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn instant_query(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<InstantQueryParams>,
) -> Result<Json<InstantQueryResponse>, ApiError> {
    run(&state, params).await
}

/// 即时刷新 (POST)，接受 JSON 或表单
#[utoipa::path(
    post,
    path = "/api/instant_query",
    tag = "刷新 (Refresh)",
    request_body = InstantQueryParams,
    responses(
        (status = 200, description = "各周期与实时快照的刷新结果", body = InstantQueryResponse),
        (status = 400, description = "证券代码、周期或复权类型非法", body = ApiErrorResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse),
        (status = 503, description = "未配置行情源", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn instant_query_post(
    State(state): State<AppState>,
    JsonOrForm(params): JsonOrForm<InstantQueryParams>,
) -> Result<Json<InstantQueryResponse>, ApiError> {
    run(&state, params).await
}

async fn run(
    state: &AppState,
    params: InstantQueryParams,
) -> Result<Json<InstantQueryResponse>, ApiError> {
    let request = build_request(params, state.max_rows)?;
    let Some(collector) = state.collector.as_ref() else {
        return Err(ApiError::FeedUnavailable(
            "no market data feed is configured".to_string(),
        ));
    };

    tracing::info!(symbol = %request.symbol, adjustment = %request.adjustment, periods = request.periods.len(), "instant refresh requested");
    let report = collector.refresh_symbol(request).await;
    Ok(Json(InstantQueryResponse {
        success: report.success,
        result: report,
    }))
}

/// # Summary
/// 将请求参数校验并转换为刷新请求。
///
/// # Logic
/// 1. `stock_code` 必填，按 `600689.SH` 形式解析。
/// 2. `periods` 缺省为全部周期；显式给出空串时只刷新实时快照。
/// 3. `preview_limit` 不超过服务端的最大行数。
fn build_request(params: InstantQueryParams, max_rows: usize) -> Result<RefreshRequest, ApiError> {
    let code = params
        .stock_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::InvalidParameter("stock_code is required".to_string()))?;
    let symbol = Symbol::parse(code).map_err(|e| ApiError::InvalidParameter(e.to_string()))?;

    let mut request = RefreshRequest::new(symbol);
    if let Some(raw) = params.dividend_type.as_deref().map(str::trim) {
        if !raw.is_empty() {
            request.adjustment = raw
                .parse::<Adjustment>()
                .map_err(ApiError::InvalidParameter)?;
        }
    }
    if let Some(raw) = params.periods.as_deref() {
        request.periods = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<Period>().map_err(ApiError::InvalidParameter))
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(include) = params.include_realtime {
        request.include_realtime = include;
    }
    if let Some(limit) = params.preview_limit {
        request.preview_limit = limit.min(max_rows);
    }

    if request.periods.is_empty() && !request.include_realtime {
        return Err(ApiError::InvalidParameter(
            "nothing to refresh: no periods and include_realtime=false".to_string(),
        ));
    }
    Ok(request)
}
