use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::client::EventSource;
use crate::error::SseError;

/// 默认重连间隔，可被服务端的 `retry` 字段覆盖
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// 默认连接超时；SSE 流本身没有读超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`EventSource`] 的构造配置
///
/// ```rust,no_run
/// use rust_eventsource::EventSource;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), rust_eventsource::SseError> {
/// let source = EventSource::builder("https://example.com/events")
///     .header("Authorization", "Bearer token")
///     .reconnect_delay(Duration::from_secs(1))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EventSourceBuilder {
    url: Result<Url, SseError>,
    headers: HeaderMap,
    invalid_header: bool,
    reconnect_delay: Duration,
    connect_timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
    http: Option<reqwest::Client>,
}

impl EventSourceBuilder {
    /// `url` 可以是字符串或已解析的 [`Url`]
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: Url::parse(url.as_ref()).map_err(|e| SseError::Url(e.to_string())),
            headers: HeaderMap::new(),
            invalid_header: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            cancellation: None,
            http: None,
        }
    }

    /// 添加一个附加在每次请求上的 header（同名覆盖）
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.invalid_header = true,
        }
        self
    }

    /// 合并一组 header
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// 设置初始重连间隔
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// 设置连接超时（不影响流读取）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// 取消连接超时
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// 使用外部的取消信号；此时 [`EventSource::close`] 不产生效果
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// 使用自定义的 reqwest 客户端（其连接超时设置优先）
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<EventSource, SseError> {
        let url = self.url?;
        if self.invalid_header {
            return Err(SseError::InvalidHeaderValue);
        }

        let http = match self.http {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.connect_timeout {
                    builder = builder.connect_timeout(timeout);
                }
                builder.build()?
            }
        };

        let (token, owns_token) = match self.cancellation {
            Some(token) => (token, false),
            None => (CancellationToken::new(), true),
        };

        Ok(EventSource::from_parts(
            url,
            self.headers,
            self.reconnect_delay,
            http,
            token,
            owns_token,
        ))
    }
}
