//! 回调注册表：每种通知对应一个按注册顺序排列的订阅者列表

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SseError;
use crate::event::{Event, ReadyState};

type OpenCallback = Arc<dyn Fn() + Send + Sync>;
type StateCallback = Arc<dyn Fn(ReadyState) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SseError) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// 多订阅者回调表
///
/// 通知在连接循环所在的任务上同步执行，顺序与注册顺序一致。
/// 分发前会先复制订阅者列表，因此回调内部再注册新的回调不会死锁，
/// 新回调从下一次通知开始生效。
#[derive(Default)]
pub struct Observers {
    open: RwLock<Vec<OpenCallback>>,
    state: RwLock<Vec<StateCallback>>,
    error: RwLock<Vec<ErrorCallback>>,
    message: RwLock<Vec<MessageCallback>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_open(&self, f: impl Fn() + Send + Sync + 'static) {
        self.open.write().push(Arc::new(f));
    }

    pub fn add_state_change(&self, f: impl Fn(ReadyState) + Send + Sync + 'static) {
        self.state.write().push(Arc::new(f));
    }

    pub fn add_error(&self, f: impl Fn(&SseError) + Send + Sync + 'static) {
        self.error.write().push(Arc::new(f));
    }

    pub fn add_message(&self, f: impl Fn(&Event) + Send + Sync + 'static) {
        self.message.write().push(Arc::new(f));
    }

    pub fn notify_open(&self) {
        for f in snapshot(&self.open) {
            f();
        }
    }

    pub fn notify_state_change(&self, state: ReadyState) {
        for f in snapshot(&self.state) {
            f(state);
        }
    }

    pub fn notify_error(&self, error: &SseError) {
        for f in snapshot(&self.error) {
            f(error);
        }
    }

    pub fn notify_message(&self, event: &Event) {
        for f in snapshot(&self.message) {
            f(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("open", &self.open.read().len())
            .field("state", &self.state.read().len())
            .field("error", &self.error.read().len())
            .field("message", &self.message.read().len())
            .finish()
    }
}

fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().clone()
}
