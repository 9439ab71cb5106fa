//! # 文件路由控制器
//!
//! 列出数据目录、按 CSV 原样透传或按 JSON 分页读取单个文件，以及附件下载。

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use tickvault_core::store::entity::SeriesName;

use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, BarRow, FileListResponse, FileQuery, SeriesDataResponse};

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Csv,
    Json,
}

/// 列出全部文件
///
/// 按证券、周期 (实时快照在前，其后从细到粗)、复权类型排序。
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "文件 (Files)",
    responses(
        (status = 200, description = "文件列表", body = FileListResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, ApiError> {
    let files = state.store.list().await?;
    Ok(Json(FileListResponse {
        success: true,
        count: files.len(),
        files,
    }))
}

/// 读取单个文件
///
/// K 线文件默认以 CSV 原样透传；`format=json` 时返回最新的 `limit` 行。
/// 实时快照始终以 JSON 原样返回。
#[utoipa::path(
    get,
    path = "/api/files/{name}",
    tag = "文件 (Files)",
    params(
        ("name" = String, Path, description = "文件名", example = "000001_SH_1d_front_kline.csv"),
        FileQuery
    ),
    responses(
        (status = 200, description = "CSV 原文、实时快照 JSON 或分页 JSON", body = SeriesDataResponse),
        (status = 400, description = "参数错误或不支持的格式", body = ApiErrorResponse),
        (status = 401, description = "未鉴权", body = ApiErrorResponse),
        (status = 404, description = "文件不存在", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiQuery(query): ApiQuery<FileQuery>,
) -> Result<Response, ApiError> {
    let series = SeriesName::parse(&name).ok_or_else(|| ApiError::FileNotFound(name.clone()))?;
    let format = parse_format(query.format.as_deref())?;
    let limit = parse_limit(query.limit.as_deref())?;
    let reverse = parse_flag("reverse_time", query.reverse_time.as_deref())?;

    let key = match series {
        SeriesName::Realtime(_) => {
            if format == Some(OutputFormat::Csv) {
                return Err(ApiError::UnsupportedFormat(
                    "realtime snapshots are only available as json".to_string(),
                ));
            }
            return raw_response(&state, &name, JSON_CONTENT_TYPE, None).await;
        }
        SeriesName::Kline(key) => key,
    };

    match format.unwrap_or(OutputFormat::Csv) {
        OutputFormat::Csv => {
            if limit.is_some() || reverse {
                return Err(ApiError::InvalidParameter(
                    "limit and reverse_time require format=json".to_string(),
                ));
            }
            raw_response(&state, &name, CSV_CONTENT_TYPE, None).await
        }
        OutputFormat::Json => {
            let limit = limit.unwrap_or(state.max_rows).min(state.max_rows);
            let page = state.store.read_tail(&key, limit).await?;
            let mut data: Vec<BarRow> = page
                .bars
                .iter()
                .map(|bar| BarRow::from_bar(bar, key.adjustment))
                .collect();
            if reverse {
                data.reverse();
            }
            tracing::debug!(file = %name, total = page.total_rows, returned = data.len(), "series served as json");
            Ok(Json(SeriesDataResponse {
                success: true,
                name,
                total_rows: page.total_rows,
                returned_rows: data.len(),
                data,
            })
            .into_response())
        }
    }
}

/// 下载文件
///
/// 原样返回文件字节并附带 `Content-Disposition: attachment`。
#[utoipa::path(
    get,
    path = "/api/download/{name}",
    tag = "文件 (Files)",
    params(("name" = String, Path, description = "文件名", example = "000001_SH_1d_front_kline.csv")),
    responses(
        (status = 200, description = "文件原文"),
        (status = 401, description = "未鉴权", body = ApiErrorResponse),
        (status = 404, description = "文件不存在", body = ApiErrorResponse)
    ),
    security(("bearer_key" = []), ("api_key_query" = []), ("session_cookie" = []))
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let content_type = match SeriesName::parse(&name) {
        Some(SeriesName::Kline(_)) => CSV_CONTENT_TYPE,
        Some(SeriesName::Realtime(_)) => JSON_CONTENT_TYPE,
        None => return Err(ApiError::FileNotFound(name)),
    };
    let disposition = format!("attachment; filename=\"{name}\"");
    raw_response(&state, &name, content_type, Some(disposition)).await
}

/// 以流的形式输出已提交快照的原始字节
async fn raw_response(
    state: &AppState,
    name: &str,
    content_type: &str,
    disposition: Option<String>,
) -> Result<Response, ApiError> {
    let raw = state.store.open_raw(name).await?;
    let stream = ReaderStream::new(tokio::fs::File::from_std(raw.file));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, raw.size_bytes);
    if let Some(disposition) = disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(format!("build response for {name}: {e}")))
}

fn parse_format(raw: Option<&str>) -> Result<Option<OutputFormat>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "csv" => Ok(Some(OutputFormat::Csv)),
        "json" => Ok(Some(OutputFormat::Json)),
        other => Err(ApiError::UnsupportedFormat(format!(
            "format must be csv or json, got {other}"
        ))),
    }
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ApiError::InvalidParameter(format!(
            "limit must be a positive integer, got {raw}"
        ))),
    }
}

pub(crate) fn parse_flag(field: &str, raw: Option<&str>) -> Result<bool, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ApiError::InvalidParameter(format!(
            "{field} must be true or false, got {raw}"
        ))),
    }
}
