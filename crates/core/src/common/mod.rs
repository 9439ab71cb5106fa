pub mod period;
pub mod session;
pub mod time;

pub use period::{Adjustment, Period};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// # Summary
/// 证券代码解析错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    // 输入为空
    #[error("stock code must not be empty")]
    Empty,
    // 仅有 6 位数字，不猜测交易所
    #[error("stock code `{0}` is missing its exchange suffix, use 600689.SH / 000001.SZ")]
    MissingExchange(String),
    // 其余无法识别的格式
    #[error("invalid stock code `{0}`, use 600689.SH / 000001.SZ")]
    Invalid(String),
}

/// # Summary
/// 证券所属交易所。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    // 上海证券交易所
    Sh,
    // 深圳证券交易所
    Sz,
}

impl Exchange {
    /// 文件名与展示用的大写后缀
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Sh => "SH",
            Exchange::Sz => "SZ",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "SH" => Some(Exchange::Sh),
            "SZ" => Some(Exchange::Sz),
            _ => None,
        }
    }
}

/// # Summary
/// 证券标的，由 6 位数字代码与交易所组成。
///
/// # Invariants
/// - `code` 恒为 6 位 ASCII 数字。
/// - 规范展示形式为 `600689.SH`，文件名形式为 `600689_SH`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    code: String,
    exchange: Exchange,
}

impl Symbol {
    /// # Summary
    /// 解析宽松格式的证券代码。
    ///
    /// # Logic
    /// 1. 去除首尾空白并转为大写。
    /// 2. 依次尝试 `600689.SH` / `600689SH` / `600689_SH` / `600689-SH` 后缀形式。
    /// 3. 再尝试 `SH600689` / `SH.600689` 前缀形式。
    /// 4. 纯 6 位数字不猜交易所，直接报错。
    ///
    /// # Arguments
    /// * `raw`: 用户或配置提供的代码字符串。
    ///
    /// # Returns
    /// 成功返回规范化后的 `Symbol`。
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(SymbolError::Empty);
        }
        if is_code(&upper) {
            return Err(SymbolError::MissingExchange(raw.trim().to_string()));
        }

        let suffixed = upper
            .len()
            .checked_sub(2)
            .and_then(|split| upper.get(..split).zip(upper.get(split..)))
            .and_then(|(head, tail)| {
                let exchange = Exchange::from_token(tail)?;
                let code = head.strip_suffix(['.', '_', '-']).unwrap_or(head);
                is_code(code).then(|| Self::from_parts(code, exchange))
            });
        if let Some(symbol) = suffixed {
            return Ok(symbol);
        }

        let prefixed = upper
            .get(..2)
            .zip(upper.get(2..))
            .and_then(|(head, tail)| {
                let exchange = Exchange::from_token(head)?;
                let code = tail.strip_prefix(['.', '_', '-']).unwrap_or(tail);
                is_code(code).then(|| Self::from_parts(code, exchange))
            });

        prefixed.ok_or_else(|| SymbolError::Invalid(raw.trim().to_string()))
    }

    fn from_parts(code: &str, exchange: Exchange) -> Self {
        Self {
            code: code.to_string(),
            exchange,
        }
    }

    /// 6 位数字代码
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 所属交易所
    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// 文件名中的证券部分，如 `000001_SH`
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.code, self.exchange.as_str())
    }
}

fn is_code(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.exchange.as_str())
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepted_forms() {
        for raw in [
            "600689.SH",
            "600689sh",
            "600689_sh",
            "600689-SH",
            "SH600689",
            "sh.600689",
            "  600689.SH ",
        ] {
            let symbol = Symbol::parse(raw).unwrap();
            assert_eq!(symbol.to_string(), "600689.SH", "input {raw}");
        }
        assert_eq!(Symbol::parse("000001.SZ").unwrap().exchange(), Exchange::Sz);
    }

    #[test]
    fn test_parse_rejects_bare_code_and_garbage() {
        assert_eq!(
            Symbol::parse("600689"),
            Err(SymbolError::MissingExchange("600689".into()))
        );
        assert!(matches!(Symbol::parse("60068.SH"), Err(SymbolError::Invalid(_))));
        assert!(matches!(Symbol::parse("600689.HK"), Err(SymbolError::Invalid(_))));
        assert!(matches!(Symbol::parse("../etc"), Err(SymbolError::Invalid(_))));
        assert_eq!(Symbol::parse("   "), Err(SymbolError::Empty));
    }

    #[test]
    fn test_file_stem_and_serde() {
        let symbol = Symbol::parse("000001.SH").unwrap();
        assert_eq!(symbol.file_stem(), "000001_SH");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"000001.SH\"");
        let back: Symbol = serde_json::from_str("\"sz000002\"").unwrap();
        assert_eq!(back.to_string(), "000002.SZ");
    }
}
