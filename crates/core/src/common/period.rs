use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use utoipa::ToSchema;

/// # Summary
/// K 线周期枚举。
///
/// # Invariants
/// - 声明顺序即从细到粗的排序顺序，文件列表依此排序。
/// - 月线的文件名标记固定为 `1month`，避免在大小写不敏感的文件系统上与 `1m` 冲突。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "60m")]
    Minute60,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1month", alias = "1M", alias = "1mo")]
    Month1,
}

impl Period {
    /// 全部周期，按从细到粗排列
    pub const ALL: [Period; 8] = [
        Period::Minute1,
        Period::Minute5,
        Period::Minute15,
        Period::Minute30,
        Period::Minute60,
        Period::Day1,
        Period::Week1,
        Period::Month1,
    ];

    /// 文件名与 API 中使用的标记
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Minute1 => "1m",
            Period::Minute5 => "5m",
            Period::Minute15 => "15m",
            Period::Minute30 => "30m",
            Period::Minute60 => "60m",
            Period::Day1 => "1d",
            Period::Week1 => "1w",
            Period::Month1 => "1month",
        }
    }

    /// 行情源识别的周期代码 (月线为 `1M`)
    pub fn vendor_code(&self) -> &'static str {
        match self {
            Period::Month1 => "1M",
            other => other.as_str(),
        }
    }

    /// 日内周期只在交易时段内刷新才有意义
    pub fn is_intraday(&self) -> bool {
        *self < Period::Day1
    }

    /// # Summary
    /// 默认最小刷新间隔。
    ///
    /// # Logic
    /// 分钟级周期与周期长度一致；日线每 30 分钟、周线每 6 小时、月线每 12 小时校正一次。
    pub fn default_refresh(&self) -> Duration {
        let secs = match self {
            Period::Minute1 => 60,
            Period::Minute5 => 300,
            Period::Minute15 => 900,
            Period::Minute30 => 1_800,
            Period::Minute60 => 3_600,
            Period::Day1 => 1_800,
            Period::Week1 => 6 * 3_600,
            Period::Month1 => 12 * 3_600,
        };
        Duration::from_secs(secs)
    }

    /// 单次向行情源请求的根数，`None` 表示全量历史
    pub fn fetch_count(&self) -> Option<u32> {
        match self {
            Period::Minute1 | Period::Minute5 => Some(500),
            Period::Minute15 => Some(300),
            Period::Minute30 => Some(200),
            Period::Minute60 => Some(100),
            Period::Day1 | Period::Week1 | Period::Month1 => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `1M` 必须在转小写之前匹配，否则会被当成 1 分钟
        if s == "1M" {
            return Ok(Period::Month1);
        }
        match s.to_ascii_lowercase().as_str() {
            "1m" | "minute1" => Ok(Period::Minute1),
            "5m" | "minute5" => Ok(Period::Minute5),
            "15m" | "minute15" => Ok(Period::Minute15),
            "30m" | "minute30" => Ok(Period::Minute30),
            "60m" | "1h" | "minute60" => Ok(Period::Minute60),
            "1d" | "day1" => Ok(Period::Day1),
            "1w" | "week1" => Ok(Period::Week1),
            "1month" | "1mo" | "month1" => Ok(Period::Month1),
            _ => Err(format!("Unknown period: {}", s)),
        }
    }
}

/// # Summary
/// 复权类型。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default, ToSchema,
)]
pub enum Adjustment {
    // 不复权
    #[serde(rename = "none")]
    Raw,
    // 前复权
    #[default]
    #[serde(rename = "front")]
    Front,
    // 后复权
    #[serde(rename = "back")]
    Back,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::Raw => "none",
            Adjustment::Front => "front",
            Adjustment::Back => "back",
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adjustment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Adjustment::Raw),
            "front" => Ok(Adjustment::Front),
            "back" => Ok(Adjustment::Back),
            _ => Err(format!("Unknown adjustment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_never_collides_with_minute() {
        assert_eq!("1M".parse::<Period>().unwrap(), Period::Month1);
        assert_eq!("1m".parse::<Period>().unwrap(), Period::Minute1);
        assert_eq!(Period::Month1.as_str(), "1month");
        assert_eq!(Period::Month1.vendor_code(), "1M");
    }

    #[test]
    fn test_period_order_and_session_rule() {
        let mut shuffled = vec![Period::Month1, Period::Minute5, Period::Day1, Period::Minute1];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Period::Minute1, Period::Minute5, Period::Day1, Period::Month1]
        );
        assert!(Period::Minute60.is_intraday());
        assert!(!Period::Day1.is_intraday());
    }

    #[test]
    fn test_serde_tokens() {
        assert_eq!(serde_json::to_string(&Period::Minute15).unwrap(), "\"15m\"");
        let p: Period = serde_json::from_str("\"1M\"").unwrap();
        assert_eq!(p, Period::Month1);
        assert_eq!(serde_json::to_string(&Adjustment::Raw).unwrap(), "\"none\"");
        assert_eq!("FRONT".parse::<Adjustment>().unwrap(), Adjustment::Front);
    }
}
