//! rust-eventsource: 带自动重连的 SSE (Server-Sent Events) 客户端
//!
//! 本库提供:
//! - 增量 SSE 解析器（任意切分的 bytes chunk -> 事件）
//! - 基于回调的 `EventSource` 客户端：连接状态通知、断线重连、`Last-Event-ID` 续传
//!
//! # 功能特性
//!
//! - `client` (默认): 使用 reqwest + tokio 的 `EventSource` 客户端
//!
//! 不启用 `client` 时只提供解析器与事件类型。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use rust_eventsource::{EventSource, ReadyState};
//!
//! # async fn example() -> Result<(), rust_eventsource::SseError> {
//! let source = EventSource::new("https://example.com/events")?;
//!
//! source.on_open(|| println!("已连接"));
//! source.on_state_change(|state: ReadyState| println!("状态: {}", state));
//! source.on_message(|event| println!("事件: {}", event));
//! source.on_error(|e| eprintln!("错误: {}", e));
//!
//! let handle = source.start()?;
//! // ...
//! source.close();
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## 解析器
//!
//! ```rust
//! use rust_eventsource::{Frame, SseParser};
//!
//! let mut parser = SseParser::new();
//! let frames = parser.push(b"event: add\ndata: a\ndata: b\n\n");
//!
//! match &frames[..] {
//!     [Frame::Event(event)] => {
//!         assert_eq!(event.name(), "add");
//!         assert_eq!(event.data(), "ab");
//!     }
//!     other => panic!("unexpected frames: {:?}", other),
//! }
//! ```

// 核心模块（始终可用）
mod error;
mod event;
mod parser;

// 核心类型的重导出
pub use error::{ParseError, SseError};
pub use event::{Event, ReadyState, DEFAULT_EVENT_NAME};
pub use parser::{Frame, SseParser};

// 客户端模块（可选）
#[cfg(feature = "client")]
mod client;

#[cfg(feature = "client")]
mod config;

#[cfg(feature = "client")]
mod observers;

#[cfg(feature = "client")]
pub use client::EventSource;

#[cfg(feature = "client")]
pub use config::{EventSourceBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY};

// 调用方自己持有取消信号时需要这个类型
#[cfg(feature = "client")]
pub use tokio_util::sync::CancellationToken;
