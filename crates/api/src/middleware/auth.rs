//! # 鉴权中间件
//!
//! 依次检查 `Authorization: Bearer`、`api_key` 查询参数与 `tv_session` 会话 Cookie，
//! 任一通道有效即放行。

use std::collections::HashMap;

use axum::extract::{Query, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::server::AppState;
use crate::session::SESSION_COOKIE;

/// # Summary
/// 服务端配置的 API 密钥，只保留其 SHA-256 摘要。
///
/// # Invariants
/// - 比较在定长摘要上进行，耗时与候选值的内容和长度无关。
#[derive(Clone)]
pub struct ApiKey {
    digest: Vec<u8>,
}

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self {
            digest: Sha256::digest(key.as_bytes()).to_vec(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let other = Sha256::digest(candidate.as_bytes());
        self.digest
            .iter()
            .zip(other.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Authorization 头的解析结果
#[derive(Debug, PartialEq, Eq)]
enum Credential {
    Absent,
    Bearer(String),
    Malformed(&'static str),
}

/// # Summary
/// 按固定优先级鉴权。
///
/// # Logic
/// 1. 未配置密钥时为开放模式，直接放行。
/// 2. Bearer 头、`api_key` 查询参数、`tv_session` Cookie 依次校验，第一个有效的通道即放行。
/// 3. 全部无效时：若 Authorization 头格式错误返回 400，否则返回 401。
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(api_key) = state.api_key.as_ref() else {
        return Ok(next.run(req).await);
    };

    let mut malformed = None;
    match bearer_credential(req.headers()) {
        Credential::Bearer(token) => {
            if api_key.matches(&token) {
                return Ok(next.run(req).await);
            }
            tracing::debug!("bearer credential rejected");
        }
        Credential::Malformed(reason) => malformed = Some(reason),
        Credential::Absent => {}
    }

    if let Some(candidate) = query_api_key(req.uri()) {
        if api_key.matches(&candidate) {
            return Ok(next.run(req).await);
        }
        tracing::debug!("api_key query parameter rejected");
    }

    if let Some(token) = session_token(req.headers()) {
        if state.sessions.validate(&token).await {
            return Ok(next.run(req).await);
        }
        tracing::debug!("session cookie rejected");
    }

    tracing::warn!(path = %req.uri().path(), "request rejected by auth");
    match malformed {
        Some(reason) => Err(ApiError::MalformedCredential(reason.to_string())),
        None => Err(ApiError::Unauthorized(
            "missing or invalid credentials".to_string(),
        )),
    }
}

fn bearer_credential(headers: &HeaderMap) -> Credential {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Credential::Absent;
    };
    let Ok(value) = value.to_str() else {
        return Credential::Malformed("authorization header is not valid UTF-8");
    };
    let value = value.trim();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Credential::Malformed("unsupported authorization scheme, expected Bearer");
    }
    let token = token.trim();
    if token.is_empty() {
        return Credential::Malformed("empty bearer token");
    }
    Credential::Bearer(token.to_string())
}

fn query_api_key(uri: &Uri) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.get("api_key").filter(|v| !v.is_empty()).cloned()
}

/// 从 Cookie 头中取出会话令牌
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: axum::http::HeaderName, value: &[u8]) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_bytes(value).unwrap());
        map
    }

    #[test]
    fn test_api_key_matches_exact_value_only() {
        let key = ApiKey::new("secret-key-123");
        assert!(key.matches("secret-key-123"));
        assert!(!key.matches("secret-key-12"));
        assert!(!key.matches(""));
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_credential(&HeaderMap::new()), Credential::Absent);
        assert_eq!(
            bearer_credential(&headers(AUTHORIZATION, b"Bearer abc")),
            Credential::Bearer("abc".into())
        );
        assert_eq!(
            bearer_credential(&headers(AUTHORIZATION, b"bearer  abc ")),
            Credential::Bearer("abc".into())
        );
        assert!(matches!(
            bearer_credential(&headers(AUTHORIZATION, b"Basic abc")),
            Credential::Malformed(_)
        ));
        assert!(matches!(
            bearer_credential(&headers(AUTHORIZATION, b"Bearer ")),
            Credential::Malformed(_)
        ));
        assert!(matches!(
            bearer_credential(&headers(AUTHORIZATION, b"Bearer \xff\xfe")),
            Credential::Malformed(_)
        ));
    }

    #[test]
    fn test_query_and_cookie_extraction() {
        let uri: Uri = "/api/files?format=json&api_key=k1".parse().unwrap();
        assert_eq!(query_api_key(&uri).as_deref(), Some("k1"));
        let uri: Uri = "/api/files?api_key=".parse().unwrap();
        assert_eq!(query_api_key(&uri), None);

        let map = headers(COOKIE, b"theme=dark; tv_session=tok42; other=1");
        assert_eq!(session_token(&map).as_deref(), Some("tok42"));
        let map = headers(COOKIE, b"tv_session=");
        assert_eq!(session_token(&map), None);
    }
}
