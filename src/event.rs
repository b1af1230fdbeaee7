//! SSE 事件类型与连接状态

use std::fmt;

/// 未指定 `event` 字段时使用的事件名
pub const DEFAULT_EVENT_NAME: &str = "message";

/// 一条完整解析的 SSE 事件（由一个以空行结束的 message 块组装而来）
///
/// 构造后不可变；`data` 为同一块内所有 `data` 字段按到达顺序直接拼接的结果，
/// 中间不插入换行符。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    id: Option<i64>,
    name: String,
    data: String,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: None,
            name: DEFAULT_EVENT_NAME.to_string(),
            data: String::new(),
        }
    }
}

impl Event {
    /// 使用给定的数据创建新的事件
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// 设置事件名
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置事件 ID
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// 事件 ID（`None` 表示服务端未提供 id）
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name.clear();
        self.name.push_str(name);
    }

    pub(crate) fn append_data(&mut self, data: &str) {
        self.data.push_str(data);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}#{}: {}", self.name, id, self.data),
            None => write!(f, "{}: {}", self.name, self.data),
        }
    }
}

/// 连接的对外可见状态
///
/// `Closed -> Connecting -> Open -> Closed`，也可能 `Connecting -> Closed`
/// 而从未进入 `Open`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadyState {
    #[default]
    Closed,
    Connecting,
    Open,
}

impl ReadyState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
        }
    }
}
