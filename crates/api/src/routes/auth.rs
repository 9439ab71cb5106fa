//! # 登录与注销
//!
//! 浏览器客户端用 API 密钥换取会话 Cookie，之后无需在每个请求中携带密钥。

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::extract::JsonOrForm;
use crate::middleware::auth::session_token;
use crate::server::AppState;
use crate::session::SESSION_COOKIE;
use crate::types::{ApiErrorResponse, LoginRequest, LoginResponse, SuccessResponse};

/// 登录
///
/// 校验 API 密钥并签发会话令牌，令牌同时写入 `tv_session` Cookie。接受 JSON 或表单编码。
#[utoipa::path(
    post,
    path = "/login",
    tag = "鉴权 (Auth)",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功", body = LoginResponse),
        (status = 400, description = "缺少 api_key", body = ApiErrorResponse),
        (status = 401, description = "密钥错误", body = ApiErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<LoginRequest>,
) -> Result<Response, ApiError> {
    let key = req
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::InvalidParameter("api_key is required".to_string()))?;

    if let Some(expected) = state.api_key.as_ref() {
        if !expected.matches(key) {
            tracing::warn!("login rejected: invalid api key");
            return Err(ApiError::Unauthorized("invalid api key".to_string()));
        }
    }

    let token = state
        .sessions
        .create()
        .await
        .map_err(|e| ApiError::Internal(format!("session store: {e}")))?;
    let expires_in = state.sessions.idle().as_secs();
    let cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={expires_in}"
    );
    tracing::info!("session established");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            token,
            expires_in,
        }),
    )
        .into_response())
}

/// 注销 (GET)
///
/// 作废 Cookie 中的会话令牌并清除 Cookie；没有会话时同样返回成功。
#[utoipa::path(
    get,
    path = "/logout",
    tag = "鉴权 (Auth)",
    responses((status = 200, description = "已注销", body = SuccessResponse))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    end_session(&state, &headers).await
}

/// 注销 (POST)
#[utoipa::path(
    post,
    path = "/logout",
    tag = "鉴权 (Auth)",
    responses((status = 200, description = "已注销", body = SuccessResponse))
)]
pub async fn logout_post(State(state): State<AppState>, headers: HeaderMap) -> Response {
    end_session(&state, &headers).await
}

async fn end_session(state: &AppState, headers: &HeaderMap) -> Response {
    if let Some(token) = session_token(headers) {
        if state.sessions.revoke(&token).await {
            tracing::info!("session revoked");
        }
    }
    let cleared = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    ([(SET_COOKIE, cleared)], Json(SuccessResponse { success: true })).into_response()
}
