//! rust-eventsource 统一错误类型

use thiserror::Error;

/// 通过错误回调上报或由构造/启动接口返回的错误
#[derive(Debug, Error)]
pub enum SseError {
    #[cfg(feature = "client")]
    #[error("HTTP 错误: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "client")]
    #[error("服务器返回非成功状态: {} ({})", .status.as_u16(), .status.canonical_reason().unwrap_or("unknown"))]
    Status { status: reqwest::StatusCode },

    #[error("消息解析错误: {0}")]
    Parse(#[from] ParseError),

    #[error("无效的 header 值")]
    InvalidHeaderValue,

    #[error("URL 解析错误: {0}")]
    Url(String),

    #[error("事件源已启动")]
    AlreadyStarted,

    #[error("当前线程不在 tokio 运行时中")]
    NoRuntime,
}

impl SseError {
    /// 触发错误的原始内容（目前只有解析错误携带原始 message 块）
    pub fn raw_context(&self) -> Option<&str> {
        match self {
            Self::Parse(e) => Some(e.raw_block()),
            _ => None,
        }
    }
}

/// message 块解析错误
///
/// 分两级：`MissingColon` 与 `InvalidId` 会丢弃整个块；
/// `InvalidRetry` 与 `UnknownField` 只是警告，块仍然会被投递。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("缺少 ':' 的字段行 {line:?}")]
    MissingColon { line: String, block: String },

    #[error("无效的 id 值 {value:?}")]
    InvalidId { value: String, block: String },

    #[error("无效的 retry 值 {value:?}")]
    InvalidRetry { value: String, block: String },

    #[error("未知字段 {field:?}")]
    UnknownField { field: String, block: String },
}

impl ParseError {
    /// 出错的原始 message 块（不含结尾空行）
    pub fn raw_block(&self) -> &str {
        match self {
            Self::MissingColon { block, .. }
            | Self::InvalidId { block, .. }
            | Self::InvalidRetry { block, .. }
            | Self::UnknownField { block, .. } => block,
        }
    }

    /// 是否导致整个块被丢弃
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingColon { .. } | Self::InvalidId { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_context_only_for_parse_errors() {
        let err = SseError::from(ParseError::UnknownField {
            field: "foo".to_string(),
            block: "foo:bar\ndata:x".to_string(),
        });
        assert_eq!(err.raw_context(), Some("foo:bar\ndata:x"));
        assert_eq!(SseError::AlreadyStarted.raw_context(), None);
    }

    #[test]
    fn fatal_tiers() {
        let missing = ParseError::MissingColon {
            line: "garbage".to_string(),
            block: "garbage".to_string(),
        };
        let retry = ParseError::InvalidRetry {
            value: "soon".to_string(),
            block: "retry:soon".to_string(),
        };
        assert!(missing.is_fatal());
        assert!(!retry.is_fatal());
    }
}
