use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EventSourceBuilder;
use crate::error::SseError;
use crate::event::{Event, ReadyState};
use crate::observers::Observers;
use crate::parser::{Frame, SseParser};

/// 连接循环与外部句柄共享的会话状态
///
/// 只有连接循环会写入；外部句柄和回调只读取。
#[derive(Debug)]
struct Shared {
    url: RwLock<Url>,
    last_event_id: RwLock<Option<i64>>,
    reconnect_delay: RwLock<Duration>,
    state: watch::Sender<ReadyState>,
    observers: Observers,
}

/// SSE 客户端：基于 reqwest 的 streaming body + SseParser，断线后自动重连
///
/// - 每次请求都会带上 `Accept: text/event-stream` 与构造时配置的 header
/// - 重连时带上 `Last-Event-ID`
/// - 服务端的 `retry` 字段会更新之后所有重连的等待时间
/// - 401/403 且最终 URL 与当前 URL 不同（发生了重定向）时，改用新 URL 立即重试
///
/// 所有运行期错误只通过 [`on_error`](Self::on_error) 回调上报，连接循环只会因取消而退出。
#[derive(Debug)]
pub struct EventSource {
    shared: Arc<Shared>,
    headers: HeaderMap,
    http: reqwest::Client,
    token: CancellationToken,
    owns_token: bool,
    started: AtomicBool,
}

impl EventSource {
    /// 创建自带取消信号的事件源，可通过 [`close`](Self::close) 停止
    pub fn new(url: impl AsRef<str>) -> Result<Self, SseError> {
        EventSourceBuilder::new(url).build()
    }

    /// 使用外部取消信号创建事件源，只能由信号的持有者停止
    pub fn with_cancellation(url: impl AsRef<str>, token: CancellationToken) -> Result<Self, SseError> {
        EventSourceBuilder::new(url).cancellation_token(token).build()
    }

    pub fn builder(url: impl AsRef<str>) -> EventSourceBuilder {
        EventSourceBuilder::new(url)
    }

    pub(crate) fn from_parts(
        url: Url,
        headers: HeaderMap,
        reconnect_delay: Duration,
        http: reqwest::Client,
        token: CancellationToken,
        owns_token: bool,
    ) -> Self {
        let (state, _) = watch::channel(ReadyState::Closed);
        Self {
            shared: Arc::new(Shared {
                url: RwLock::new(url),
                last_event_id: RwLock::new(None),
                reconnect_delay: RwLock::new(reconnect_delay),
                state,
                observers: Observers::new(),
            }),
            headers,
            http,
            token,
            owns_token,
            started: AtomicBool::new(false),
        }
    }

    /// 启动连接循环（在当前 tokio 运行时上 spawn）。
    ///
    /// 每个实例只能启动一次，重复调用返回 [`SseError::AlreadyStarted`]；
    /// 不在 tokio 运行时中调用时返回 [`SseError::NoRuntime`]，且不算作已启动。
    /// 返回的 `JoinHandle` 在循环因取消而退出后完成。
    pub fn start(&self) -> Result<JoinHandle<()>, SseError> {
        let runtime = Handle::try_current().map_err(|_| SseError::NoRuntime)?;
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(url = %self.url(), "EventSource already started");
            return Err(SseError::AlreadyStarted);
        }

        let driver = Driver {
            shared: self.shared.clone(),
            headers: self.headers.clone(),
            http: self.http.clone(),
            token: self.token.clone(),
        };
        Ok(runtime.spawn(driver.run()))
    }

    /// 请求关闭。只有取消信号由本实例创建时才生效。
    pub fn close(&self) {
        if self.owns_token {
            info!(url = %self.url(), "Closing SSE connection");
            self.token.cancel();
        } else {
            debug!(url = %self.url(), "Cancellation token is external, close ignored");
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.shared.state.borrow()
    }

    /// 订阅状态变化，适合在异步代码中等待某个状态
    pub fn watch_state(&self) -> watch::Receiver<ReadyState> {
        self.shared.state.subscribe()
    }

    /// 当前目标 URL（重定向后会被更新）
    pub fn url(&self) -> Url {
        self.shared.url.read().clone()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 修改请求 header；只在 [`start`](Self::start) 之前生效
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn last_event_id(&self) -> Option<i64> {
        *self.shared.last_event_id.read()
    }

    pub fn reconnect_delay(&self) -> Duration {
        *self.shared.reconnect_delay.read()
    }

    pub fn owns_cancellation(&self) -> bool {
        self.owns_token
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn on_open(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.observers.add_open(f);
    }

    pub fn on_state_change(&self, f: impl Fn(ReadyState) + Send + Sync + 'static) {
        self.shared.observers.add_state_change(f);
    }

    pub fn on_error(&self, f: impl Fn(&SseError) + Send + Sync + 'static) {
        self.shared.observers.add_error(f);
    }

    pub fn on_message(&self, f: impl Fn(&Event) + Send + Sync + 'static) {
        self.shared.observers.add_message(f);
    }

    /// 以 Stream 的形式消费事件。
    ///
    /// 内部注册一个消息回调转发到无界 channel；事件源与连接循环都结束后 Stream 结束。
    pub fn messages(&self) -> UnboundedReceiverStream<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_message(move |event| {
            let _ = tx.send(event.clone());
        });
        UnboundedReceiverStream::new(rx)
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        // 外部信号的生命周期归调用方
        if self.owns_token {
            self.token.cancel();
        }
    }
}

/// 单次连接尝试的结果
enum Attempt {
    /// 认证失败但发生了重定向：立即用新 URL 重试
    Redirected,
    /// 连接结束或失败：等待重连间隔后重试
    Finished,
    Cancelled,
}

/// 在后台任务中运行的连接循环
struct Driver {
    shared: Arc<Shared>,
    headers: HeaderMap,
    http: reqwest::Client,
    token: CancellationToken,
}

impl Driver {
    async fn run(self) {
        let mut parser = SseParser::new();
        let mut attempts = 0usize;

        info!(url = %self.current_url(), "Starting SSE connection");

        while !self.token.is_cancelled() {
            attempts += 1;
            match self.attempt(&mut parser, attempts).await {
                Attempt::Redirected => continue,
                Attempt::Cancelled => break,
                Attempt::Finished => {}
            }

            if parser.finish() {
                debug!("Discarded unterminated SSE message at end of stream");
            }
            self.set_state(ReadyState::Closed);

            let delay = *self.shared.reconnect_delay.read();
            info!(
                url = %self.current_url(),
                retry = attempts,
                delay_ms = delay.as_millis() as u64,
                "Connection ended, scheduling reconnect"
            );

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(ReadyState::Closed);
        info!(url = %self.current_url(), "SSE connection loop stopped");
    }

    async fn attempt(&self, parser: &mut SseParser, attempt: usize) -> Attempt {
        let url = self.current_url();
        let last_event_id = *self.shared.last_event_id.read();

        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(id) = last_event_id {
            headers.insert(HeaderName::from_static("last-event-id"), HeaderValue::from(id));
            debug!(url = %url, last_event_id = id, "Setting Last-Event-ID header");
        }

        self.set_state(ReadyState::Connecting);
        debug!(url = %url, retry = attempt, "Sending SSE request");

        let request = self.http.get(url.clone()).headers(headers).send();
        let resp = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Attempt::Cancelled,
            resp = request => resp,
        };

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    warn!(url = %url, retry = attempt, "Connection timeout");
                } else {
                    warn!(url = %url, error = %e, retry = attempt, "HTTP request failed");
                }
                self.report(SseError::Http(e));
                return Attempt::Finished;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let redirected = resp.url() != &url;
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) && redirected {
                info!(from = %url, to = %resp.url(), status = %status, "Switching to redirect target");
                *self.shared.url.write() = resp.url().clone();
                return Attempt::Redirected;
            }

            error!(url = %url, status = %status, "SSE request returned non-success status");
            self.report(SseError::Status { status });
            return Attempt::Finished;
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
        {
            warn!(url = %url, content_type = ?content_type, "Unexpected content-type, parsing anyway");
        }

        self.set_state(ReadyState::Open);
        self.shared.observers.notify_open();
        info!(url = %url, "SSE connection established");

        let body = resp.bytes_stream();
        tokio::pin!(body);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Attempt::Cancelled,
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for frame in parser.push(&chunk) {
                        self.apply(frame);
                    }
                }
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "Error reading SSE stream chunk");
                    self.report(SseError::Http(e));
                    return Attempt::Finished;
                }
                None => {
                    debug!(url = %url, "SSE stream ended");
                    return Attempt::Finished;
                }
            }
        }
    }

    fn apply(&self, frame: Frame) {
        match frame {
            Frame::Event(event) => {
                debug!(event = %event.name(), id = ?event.id(), "SSE event received");
                self.shared.observers.notify_message(&event);
            }
            Frame::LastEventId(id) => {
                *self.shared.last_event_id.write() = Some(id);
            }
            Frame::Retry(delay) => {
                debug!(retry_ms = delay.as_millis() as u64, "Server requested retry interval update");
                *self.shared.reconnect_delay.write() = delay;
            }
            Frame::Error(e) => {
                warn!(error = %e, fatal = e.is_fatal(), "Malformed SSE message");
                self.report(SseError::Parse(e));
            }
        }
    }

    fn current_url(&self) -> Url {
        self.shared.url.read().clone()
    }

    fn report(&self, error: SseError) {
        self.shared.observers.notify_error(&error);
    }

    fn set_state(&self, state: ReadyState) {
        let changed = self.shared.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(state = %state, "Ready state changed");
            self.shared.observers.notify_state_change(state);
        }
    }
}
