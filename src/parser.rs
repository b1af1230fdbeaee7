use std::time::Duration;

use tracing::trace;

use crate::error::ParseError;
use crate::event::Event;

/// 解析器的一次产出，按其在字节流中出现的顺序排列
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 一个完整且未被丢弃的事件
    Event(Event),
    /// 成功解析的 `id` 字段；即使所在块随后被丢弃也会产出
    LastEventId(i64),
    /// 成功解析的 `retry` 字段（毫秒）
    Retry(Duration),
    /// 块内的格式错误
    Error(ParseError),
}

/// SSE 增量解析器：输入任意切分的 bytes chunk，按 SSE 规则产出 0..N 个 [`Frame`]。
///
/// 三个阶段：
/// - bytes chunk（网络分片） -> line（按 \\n/\\r/\\r\\n 切）
/// - line -> block（非空行累积，空行结束）
/// - block -> field（按第一个 ':' 切分并组装事件）
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    position: usize,
    discard_trailing_newline: bool, // 处理 \\r\\n 跨 chunk
    block: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个 bytes chunk，返回本次解析产生的所有 frame。
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.buffer.is_empty() {
            self.position = 0;
        }
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut line_start = 0usize;

        while self.position < self.buffer.len() {
            // 如果上一轮遇到 \\r，下一字节若为 \\n 则吞掉
            if self.discard_trailing_newline {
                if self.buffer[self.position] == b'\n' {
                    self.position += 1;
                    line_start = self.position;
                }
                self.discard_trailing_newline = false;
                continue;
            }

            // 向前寻找行尾（\\r 或 \\n）
            let mut line_end: Option<usize> = None;
            while self.position < self.buffer.len() && line_end.is_none() {
                match self.buffer[self.position] {
                    b'\r' => {
                        self.discard_trailing_newline = true;
                        line_end = Some(self.position);
                    }
                    b'\n' => line_end = Some(self.position),
                    _ => {}
                }
                self.position += 1;
            }

            let Some(end) = line_end else {
                // 到了 buffer 末尾但没找到行尾：等待下一个 chunk
                break;
            };

            let line = String::from_utf8_lossy(&self.buffer[line_start..end]).into_owned();
            self.on_line(line, &mut out);

            line_start = self.position;
        }

        // 丢弃已处理的前缀，保留未完成的尾部
        if line_start > 0 {
            self.buffer.drain(0..line_start);
            self.position = self.position.saturating_sub(line_start);
        }

        out
    }

    /// 连接结束时调用：丢弃未以空行结束的块以及未完成的行。
    ///
    /// 返回被丢弃的块是否非空。
    pub fn finish(&mut self) -> bool {
        let dropped = !self.block.is_empty();
        if dropped {
            trace!(lines = self.block.len(), "Dropping unterminated SSE block");
        }
        *self = Self::default();
        dropped
    }

    fn on_line(&mut self, line: String, out: &mut Vec<Frame>) {
        if line.is_empty() {
            // 空 buffer 时的空行只是填充
            if !self.block.is_empty() {
                let block = std::mem::take(&mut self.block);
                parse_block(&block, out);
            }
            return;
        }

        // 以 ':' 开头的行同样进入块，字段名为空串
        self.block.push(line);
    }
}

/// 将一个完整的块组装为事件，错误与副作用按顺序写入 `out`。
fn parse_block(lines: &[String], out: &mut Vec<Frame>) {
    let raw = || lines.join("\n");
    let mut event = Event::default();

    for line in lines {
        let Some((field, value)) = line.split_once(':') else {
            out.push(Frame::Error(ParseError::MissingColon {
                line: line.clone(),
                block: raw(),
            }));
            return;
        };
        let value = value.trim();

        match field {
            "id" => match value.parse::<i64>() {
                Ok(id) => {
                    event.set_id(id);
                    out.push(Frame::LastEventId(id));
                }
                Err(_) => {
                    out.push(Frame::Error(ParseError::InvalidId {
                        value: value.to_string(),
                        block: raw(),
                    }));
                    return;
                }
            },
            "event" => event.set_name(value),
            "retry" => match value.parse::<u64>() {
                Ok(ms) => out.push(Frame::Retry(Duration::from_millis(ms))),
                Err(_) => out.push(Frame::Error(ParseError::InvalidRetry {
                    value: value.to_string(),
                    block: raw(),
                })),
            },
            "data" => event.append_data(value),
            _ => out.push(Frame::Error(ParseError::UnknownField {
                field: field.to_string(),
                block: raw(),
            })),
        }
    }

    out.push(Frame::Event(event));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut p = SseParser::new();
        let mut frames = Vec::new();
        for c in chunks {
            frames.extend(p.push(c));
        }
        frames
    }

    fn events(frames: &[Frame]) -> Vec<&Event> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn errors(frames: &[Frame]) -> Vec<&ParseError> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn full_block_concatenates_data_without_separator() {
        let frames = parse_all(&[b"id:5\nevent:foo\ndata:a\ndata:b\n\n"]);

        assert_eq!(
            frames,
            vec![
                Frame::LastEventId(5),
                Frame::Event(Event::new("ab").with_id(5).with_name("foo")),
            ]
        );
    }

    #[test]
    fn data_only_block_uses_default_name() {
        let frames = parse_all(&[b"data:hello\n\n"]);
        let evs = events(&frames);

        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].name(), "message");
        assert_eq!(evs[0].data(), "hello");
        assert_eq!(evs[0].id(), None);
    }

    #[test]
    fn values_are_trimmed() {
        let frames = parse_all(&[b"event:  update \ndata: \tpayload  \n\n"]);
        let evs = events(&frames);

        assert_eq!(evs[0].name(), "update");
        assert_eq!(evs[0].data(), "payload");
    }

    #[test]
    fn splits_on_first_colon_only() {
        let frames = parse_all(&[b"data: http://example.com:8080/x\n\n"]);
        assert_eq!(events(&frames)[0].data(), "http://example.com:8080/x");
    }

    #[test]
    fn line_without_colon_discards_block() {
        let frames = parse_all(&[b"event:foo\ngarbage\ndata:x\n\n"]);

        assert!(events(&frames).is_empty());
        let errs = errors(&frames);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].is_fatal());
        assert_eq!(errs[0].raw_block(), "event:foo\ngarbage\ndata:x");
    }

    #[test]
    fn invalid_id_discards_block_without_advancing_last_id() {
        let frames = parse_all(&[b"id:abc\ndata:x\n\n"]);

        assert!(events(&frames).is_empty());
        assert!(!frames.iter().any(|f| matches!(f, Frame::LastEventId(_))));
        assert!(matches!(
            errors(&frames).as_slice(),
            [ParseError::InvalidId { .. }]
        ));
    }

    #[test]
    fn valid_id_advances_even_if_block_is_later_discarded() {
        let frames = parse_all(&[b"id:9\nbroken\n\n"]);

        assert_eq!(frames[0], Frame::LastEventId(9));
        assert!(events(&frames).is_empty());
        assert_eq!(errors(&frames).len(), 1);
    }

    #[test]
    fn invalid_retry_is_a_warning() {
        let frames = parse_all(&[b"retry:soon\ndata:still here\n\n"]);

        let errs = errors(&frames);
        assert_eq!(errs.len(), 1);
        assert!(!errs[0].is_fatal());
        assert_eq!(events(&frames)[0].data(), "still here");
    }

    #[test]
    fn valid_retry_emits_duration() {
        let frames = parse_all(&[b"retry: 1500\ndata:x\n\n"]);
        assert_eq!(frames[0], Frame::Retry(Duration::from_millis(1500)));
        assert_eq!(events(&frames).len(), 1);
    }

    #[test]
    fn unknown_field_is_a_warning() {
        let frames = parse_all(&[b"foo:bar\ndata:x\n\n"]);

        assert!(matches!(
            errors(&frames).as_slice(),
            [ParseError::UnknownField { field, .. }] if field == "foo"
        ));
        assert_eq!(events(&frames)[0].data(), "x");
    }

    #[test]
    fn extra_blank_lines_never_produce_empty_events() {
        let frames = parse_all(&[b"\n\ndata:one\n\n\n\ndata:two\n\n\n"]);
        let evs = events(&frames);

        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].data(), "one");
        assert_eq!(evs[1].data(), "two");
    }

    #[test]
    fn colon_prefixed_line_is_an_unknown_empty_field() {
        let frames = parse_all(&[b"data:x\n:note\n\n"]);

        assert!(matches!(
            errors(&frames).as_slice(),
            [ParseError::UnknownField { field, block }] if field.is_empty() && block == "data:x\n:note"
        ));
        assert_eq!(events(&frames)[0].data(), "x");
    }

    #[test]
    fn block_of_only_colon_lines_still_delivers_empty_event() {
        let frames = parse_all(&[b":ping\n\n"]);

        assert_eq!(
            frames,
            vec![
                Frame::Error(ParseError::UnknownField {
                    field: String::new(),
                    block: ":ping".to_string(),
                }),
                Frame::Event(Event::default()),
            ]
        );
        let evs = events(&frames);
        assert_eq!(evs[0].name(), "message");
        assert_eq!(evs[0].data(), "");
    }

    #[test]
    fn pipeline_chunk_line_message_with_splits_and_crlf() {
        // 刻意切分：拆行、拆字段、拆 \\r\\n
        let frames = parse_all(&[
            b"id: 1\r".as_slice(),
            b"\n",
            b": note\r\n",
            b"event: greeting\n",
            b"data: hel",
            b"lo\n",
            b"data: world\r",
            b"\n",
            b"\r",
            b"\n",
        ]);

        assert_eq!(
            frames,
            vec![
                Frame::LastEventId(1),
                Frame::Error(ParseError::UnknownField {
                    field: String::new(),
                    block: "id: 1\n: note\nevent: greeting\ndata: hello\ndata: world".to_string(),
                }),
                Frame::Event(Event::new("helloworld").with_id(1).with_name("greeting")),
            ]
        );
    }

    #[test]
    fn lone_cr_terminates_lines() {
        let frames = parse_all(&[b"data:a\rdata:b\r\r"]);
        assert_eq!(events(&frames)[0].data(), "ab");
    }

    #[test]
    fn finish_drops_unterminated_block() {
        let mut p = SseParser::new();
        assert!(p.push(b"data:partial\n").is_empty());
        assert!(p.finish());

        // 新连接上的数据不会与旧块拼接
        let frames = p.push(b"data:fresh\n\n");
        assert_eq!(events(&frames)[0].data(), "fresh");
        assert!(!p.finish());
    }
}
