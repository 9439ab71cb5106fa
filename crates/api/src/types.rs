//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向调用方 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tickvault_core::common::Adjustment;
use tickvault_core::common::session::format_exchange_local;
use tickvault_core::market::entity::Bar;
use tickvault_core::store::entity::{SeriesDescriptor, StoreStats};
use tickvault_scheduler::collector::RefreshReport;
use tickvault_scheduler::table::SchedulerStatus;

// ============================================================
//  通用响应
// ============================================================

/// 失败响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    #[schema(example = "missing or invalid credentials")]
    pub error: String,
    /// 机器可读错误码
    #[schema(example = "UNAUTHORIZED")]
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(msg: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            error: msg.into(),
            code: code.to_string(),
        }
    }
}

/// 不带载荷的成功响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

// ============================================================
//  鉴权 DTO
// ============================================================

/// 登录请求，支持 JSON 与表单两种编码
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "change-me-please")]
    pub api_key: Option<String>,
}

/// 登录成功响应，令牌同时写入 `tv_session` Cookie
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    /// 会话令牌
    pub token: String,
    /// 空闲过期时间 (秒)
    #[schema(example = 1800)]
    pub expires_in: u64,
}

// ============================================================
//  文件 DTO
// ============================================================

/// 文件列表响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub success: bool,
    pub count: usize,
    pub files: Vec<SeriesDescriptor>,
}

/// 文件读取参数
///
/// 数值与布尔参数以原始字符串接收，由控制器统一校验并返回 `INVALID_PARAMETER`。
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FileQuery {
    /// 输出格式：`csv` (默认，原样透传) 或 `json`
    #[param(example = "json")]
    pub format: Option<String>,
    /// 返回最新的若干行，必须为正整数，仅 `json` 格式可用
    #[param(example = "100")]
    pub limit: Option<String>,
    /// 为 `true` 时按时间倒序返回
    #[param(example = "false")]
    pub reverse_time: Option<String>,
}

/// 单行 K 线，字段与 CSV 列一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BarRow {
    /// 毫秒时间戳
    #[schema(example = 1760837400000_i64)]
    pub timestamp: i64,
    /// 交易所本地时间
    #[schema(example = "2026-10-19 09:30:00")]
    pub datetime: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    #[schema(example = "600689.SH")]
    pub symbol: String,
    #[schema(example = "1d")]
    pub period: String,
    pub adjustment: Adjustment,
}

impl BarRow {
    pub fn from_bar(bar: &Bar, adjustment: Adjustment) -> Self {
        Self {
            timestamp: bar.time_key(),
            datetime: format_exchange_local(bar.timestamp),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            turnover: bar.turnover,
            symbol: bar.symbol.to_string(),
            period: bar.period.to_string(),
            adjustment,
        }
    }
}

/// K 线文件的 JSON 视图
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeriesDataResponse {
    pub success: bool,
    #[schema(example = "000001_SH_1d_front_kline.csv")]
    pub name: String,
    pub total_rows: usize,
    /// `min(limit, total_rows)`
    pub returned_rows: usize,
    pub data: Vec<BarRow>,
}

// ============================================================
//  运维 DTO
// ============================================================

/// 数据目录统计
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsBody {
    pub total_files: usize,
    pub kline_files: usize,
    pub realtime_files: usize,
    pub total_size_bytes: u64,
    pub generated_at: DateTime<Utc>,
}

impl StatsBody {
    pub fn new(stats: StoreStats, generated_at: DateTime<Utc>) -> Self {
        Self {
            total_files: stats.total_files,
            kline_files: stats.kline_files,
            realtime_files: stats.realtime_files,
            total_size_bytes: stats.total_size_bytes,
            generated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatsBody,
}

/// 调度器状态响应；以 `--no-scheduler` 启动时 `enabled` 为 false 且 `status` 为空
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerStatusResponse {
    pub success: bool,
    pub enabled: bool,
    pub status: Option<SchedulerStatus>,
}

// ============================================================
//  即时刷新 DTO
// ============================================================

/// 即时刷新参数，GET 走查询串，POST 接受 JSON 或表单
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InstantQueryParams {
    /// 证券代码，如 `600689.SH`
    #[schema(example = "600689.SH")]
    #[param(example = "600689.SH")]
    pub stock_code: Option<String>,
    /// 复权类型 `none` / `front` / `back`，默认 `front`
    #[schema(example = "front")]
    #[param(example = "front")]
    pub dividend_type: Option<String>,
    /// 逗号分隔的周期列表；缺省为全部周期，空串表示只刷新实时快照
    #[schema(example = "1d,5m")]
    #[param(example = "1d,5m")]
    pub periods: Option<String>,
    /// 是否同时刷新实时快照，默认 true
    pub include_realtime: Option<bool>,
    /// 每个周期返回的预览行数，默认 5
    pub preview_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InstantQueryResponse {
    /// 没有任何一项失败
    pub success: bool,
    pub result: RefreshReport,
}
