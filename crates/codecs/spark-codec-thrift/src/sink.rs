//! 解码日志与输出接收器。
//!
//! # 教案目的（Why）
//! - 协议分析需要“每个元素的名称、类型、字节区间与取值”，并且在消息损坏时仍要展示
//!   已解析的部分；值树无法表达半棵树，因此解码器同时把每个元素追加到 [`DecodeLog`]；
//! - 日志在消息结束后整体重放到调用方的 [`DecodeSink`]，Schema 重试时只需截断日志即可回滚。
//!
//! # 交互契约（What）
//! - 记录按字节流顺序排列；容器/结构体记录先于其子元素出现，`depth` 表示嵌套层次；
//! - 诊断与记录交错存放，保持其在字节流中的相对位置；
//! - [`TextSink`] 生成缩进文本，[`TracingSink`] 转发到 `tracing`。

use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::config::BinaryDecodeMode;
use crate::error::{Diagnostic, ThriftError};
use crate::header::MessageHeader;
use crate::reader::ByteSpan;
use crate::types::{Framing, TypeTag};
use crate::value::Value;

/// 元素在父节点中的标签。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Label {
    /// 消息体（顶层参数/结果结构体）。
    Body,
    /// 结构体字段。
    Field {
        /// 字段 id。
        id: i16,
        /// Schema 提供的字段名。
        name: Option<Arc<str>>,
    },
    /// 列表/集合元素下标。
    Element(usize),
    /// 第 n 个映射键。
    Key(usize),
    /// 第 n 个映射值。
    Value(usize),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Body => f.write_str("body"),
            Label::Field {
                id,
                name: Some(name),
            } => write!(f, "{name} (id={id})"),
            Label::Field { id, name: None } => write!(f, "field {id}"),
            Label::Element(idx) => write!(f, "[{idx}]"),
            Label::Key(idx) => write!(f, "key[{idx}]"),
            Label::Value(idx) => write!(f, "value[{idx}]"),
        }
    }
}

/// 一个已解析元素。
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// 嵌套层次，消息体为 0。
    pub depth: u32,
    /// 标签。
    pub label: Label,
    /// 类型。
    pub type_tag: TypeTag,
    /// 字节区间；字段记录包含字段头。
    pub span: ByteSpan,
    /// 标量取值；容器与结构体为 `None`。
    pub value: Option<Value>,
    /// 容器元素个数或结构体字段个数。
    pub count: Option<usize>,
}

/// 日志条目。
#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    /// 元素记录。
    Record(Record),
    /// 非致命诊断。
    Diagnostic(Diagnostic),
}

/// 日志截断点。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LogMark {
    entries: usize,
    open: usize,
}

/// 一条消息的解码日志。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeLog {
    entries: Vec<LogEntry>,
    open: Vec<usize>,
}

impl DecodeLog {
    /// 新建空日志。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部条目。
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// 仅元素记录。
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Record(record) => Some(record),
            LogEntry::Diagnostic(_) => None,
        })
    }

    /// 仅诊断。
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Diagnostic(diagnostic) => Some(diagnostic),
            LogEntry::Record(_) => None,
        })
    }

    /// 是否没有任何条目。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 依序重放到接收器。
    pub fn replay<S: DecodeSink + ?Sized>(&self, sink: &mut S) {
        for entry in &self.entries {
            match entry {
                LogEntry::Record(record) => sink.record(record),
                LogEntry::Diagnostic(diagnostic) => sink.diagnostic(diagnostic),
            }
        }
    }

    /// 打开一个容器/结构体记录，返回其下标。
    pub(crate) fn open(&mut self, label: Label, type_tag: TypeTag, start: usize) -> usize {
        let idx = self.entries.len();
        self.entries.push(LogEntry::Record(Record {
            depth: self.depth(),
            label,
            type_tag,
            span: ByteSpan::new(start, 0),
            value: None,
            count: None,
        }));
        self.open.push(idx);
        idx
    }

    /// 关闭 `open` 返回的记录，补齐区间与计数。
    pub(crate) fn close(&mut self, idx: usize, end: usize, count: usize) {
        if self.open.last() == Some(&idx) {
            self.open.pop();
        }
        if let Some(LogEntry::Record(record)) = self.entries.get_mut(idx) {
            record.span = ByteSpan::between(record.span.offset(), end);
            record.count = Some(count);
        }
    }

    /// 出错时把所有未关闭的记录截止到 `end`。
    pub(crate) fn close_all(&mut self, end: usize) {
        while let Some(idx) = self.open.pop() {
            if let Some(LogEntry::Record(record)) = self.entries.get_mut(idx) {
                record.span = ByteSpan::between(record.span.offset(), end);
            }
        }
    }

    /// 追加一个标量记录。
    pub(crate) fn leaf(&mut self, label: Label, span: ByteSpan, value: &Value) {
        tracing::trace!(label = %label, ty = %value.type_tag(), offset = span.offset(), "decoded value");
        self.entries.push(LogEntry::Record(Record {
            depth: self.depth(),
            label,
            type_tag: value.type_tag(),
            span,
            value: Some(value.clone()),
            count: None,
        }));
    }

    /// 追加诊断并以 WARN 级别输出。
    pub(crate) fn diagnostic(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            kind = %diagnostic.kind(),
            offset = diagnostic.offset(),
            "{}",
            diagnostic.detail()
        );
        self.entries.push(LogEntry::Diagnostic(diagnostic));
    }

    pub(crate) fn mark(&self) -> LogMark {
        LogMark {
            entries: self.entries.len(),
            open: self.open.len(),
        }
    }

    pub(crate) fn rollback(&mut self, mark: LogMark) {
        self.entries.truncate(mark.entries);
        self.open.truncate(mark.open);
    }

    fn depth(&self) -> u32 {
        u32::try_from(self.open.len()).unwrap_or(u32::MAX)
    }
}

/// 解码输出的接收器，由调用方实现。
///
/// 除 [`DecodeSink::record`] 外均有空的默认实现。
pub trait DecodeSink {
    /// 一条消息开始；`header` 在消息头本身损坏时为 `None`。
    fn begin_message(&mut self, span: ByteSpan, framing: Framing, header: Option<&MessageHeader>) {
        let _ = (span, framing, header);
    }

    /// 一个元素。
    fn record(&mut self, record: &Record);

    /// 一条诊断。
    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        let _ = diagnostic;
    }

    /// 终止该消息的错误（在部分输出之后到达）。
    fn error(&mut self, error: &ThriftError) {
        let _ = error;
    }

    /// 一条消息结束。
    fn end_message(&mut self) {}
}

/// 按展示模式渲染标量；容器与结构体返回 `None`。
#[must_use]
pub fn render_scalar(value: &Value, mode: BinaryDecodeMode) -> Option<String> {
    Some(match value {
        Value::Bool(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Uuid(bytes) => format!(
            "{}-{}-{}-{}-{}",
            hex::encode(&bytes[0..4]),
            hex::encode(&bytes[4..6]),
            hex::encode(&bytes[6..8]),
            hex::encode(&bytes[8..10]),
            hex::encode(&bytes[10..16])
        ),
        Value::Binary(bytes) => render_binary(bytes, mode),
        Value::List { .. } | Value::Set { .. } | Value::Map { .. } | Value::Struct(_) => {
            return None;
        }
    })
}

/// 按展示模式渲染字节串。
#[must_use]
pub fn render_binary(bytes: &[u8], mode: BinaryDecodeMode) -> String {
    match mode {
        BinaryDecodeMode::Hex => hex::encode(bytes),
        BinaryDecodeMode::Ascii => bytes
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            })
            .collect(),
        BinaryDecodeMode::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        BinaryDecodeMode::Auto => match std::str::from_utf8(bytes) {
            Ok(text) if is_printable(text) => format!("{text:?}"),
            _ => hex::encode(bytes),
        },
    }
}

/// 可打印：除 `\t \n \r` 外不含控制字符。
pub(crate) fn is_printable(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// 把解码输出渲染为缩进文本。
#[derive(Debug, Default)]
pub struct TextSink {
    out: String,
    mode: BinaryDecodeMode,
}

impl TextSink {
    /// 使用指定字节串展示模式。
    #[must_use]
    pub fn new(mode: BinaryDecodeMode) -> Self {
        Self {
            out: String::new(),
            mode,
        }
    }

    /// 已渲染的文本。
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// 取出文本。
    #[must_use]
    pub fn into_string(self) -> String {
        self.out
    }
}

impl DecodeSink for TextSink {
    fn begin_message(&mut self, span: ByteSpan, framing: Framing, header: Option<&MessageHeader>) {
        let framing = match framing {
            Framing::None => "unframed".to_owned(),
            Framing::LengthPrefixed(len) => format!("framed({len})"),
        };
        let _ = match header {
            Some(header) => writeln!(
                self.out,
                "message {} `{}` seq={} [{}, {}] @{}..{}",
                header.message_type,
                header.method_name,
                header.sequence_id,
                header.encoding,
                framing,
                span.offset(),
                span.end()
            ),
            None => writeln!(
                self.out,
                "message <malformed header> [{framing}] @{}..{}",
                span.offset(),
                span.end()
            ),
        };
    }

    fn record(&mut self, record: &Record) {
        let indent = "  ".repeat(record.depth as usize + 1);
        let _ = write!(self.out, "{indent}{}: {}", record.label, record.type_tag);
        if let Some(count) = record.count {
            let _ = write!(self.out, "[{count}]");
        }
        if let Some(text) = record.value.as_ref().and_then(|v| render_scalar(v, self.mode)) {
            let _ = write!(self.out, " = {text}");
        }
        let _ = writeln!(self.out, " @{}..{}", record.span.offset(), record.span.end());
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        let _ = writeln!(self.out, "  warning: {diagnostic}");
    }

    fn error(&mut self, error: &ThriftError) {
        let _ = writeln!(self.out, "  error: {error}");
    }
}

/// 把解码输出转发到 `tracing`（DEBUG 级别）。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink {
    mode: BinaryDecodeMode,
}

impl TracingSink {
    /// 使用指定字节串展示模式。
    #[must_use]
    pub fn new(mode: BinaryDecodeMode) -> Self {
        Self { mode }
    }
}

impl DecodeSink for TracingSink {
    fn begin_message(&mut self, span: ByteSpan, framing: Framing, header: Option<&MessageHeader>) {
        tracing::debug!(
            offset = span.offset(),
            len = span.len(),
            framing = ?framing,
            method = header.map(|h| h.method_name.as_str()),
            "thrift message"
        );
    }

    fn record(&mut self, record: &Record) {
        let value = record.value.as_ref().and_then(|v| render_scalar(v, self.mode));
        tracing::debug!(
            depth = record.depth,
            label = %record.label,
            ty = %record.type_tag,
            offset = record.span.offset(),
            len = record.span.len(),
            count = record.count,
            value = value.as_deref(),
            "thrift element"
        );
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        tracing::debug!(%diagnostic, "thrift diagnostic");
    }

    fn error(&mut self, error: &ThriftError) {
        tracing::debug!(%error, "thrift message error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rollback_discards_entries_and_open_records() {
        let mut log = DecodeLog::new();
        let outer = log.open(Label::Body, TypeTag::Struct, 0);
        let mark = log.mark();
        log.open(Label::Element(0), TypeTag::List, 3);
        log.leaf(Label::Element(0), ByteSpan::new(4, 4), &Value::I32(1));
        log.rollback(mark);
        log.close(outer, 9, 0);
        assert_eq!(log.entries().len(), 1);
        let record = log.records().next().unwrap();
        assert_eq!(record.span, ByteSpan::new(0, 9));
        assert_eq!(record.count, Some(0));
    }

    #[test]
    fn depth_follows_open_records() {
        let mut log = DecodeLog::new();
        log.open(Label::Body, TypeTag::Struct, 0);
        log.leaf(
            Label::Field { id: 1, name: None },
            ByteSpan::new(1, 5),
            &Value::I32(7),
        );
        log.close_all(6);
        let depths: Vec<u32> = log.records().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1]);
    }

    #[test]
    fn binary_rendering_modes() {
        assert_eq!(render_binary(b"hi", BinaryDecodeMode::Hex), "6869");
        assert_eq!(render_binary(b"a\x01b", BinaryDecodeMode::Ascii), "a.b");
        assert_eq!(render_binary(b"ping", BinaryDecodeMode::Auto), "\"ping\"");
        assert_eq!(render_binary(&[0xff, 0x00], BinaryDecodeMode::Auto), "ff00");
    }

    #[test]
    fn text_sink_indents_by_depth() {
        let mut log = DecodeLog::new();
        let body = log.open(Label::Body, TypeTag::Struct, 0);
        log.leaf(
            Label::Field {
                id: 1,
                name: Some(Arc::from("num")),
            },
            ByteSpan::new(0, 7),
            &Value::I32(5),
        );
        log.diagnostic(Diagnostic::new(ErrorKind::WrongFieldId, 0, "late field"));
        log.close(body, 8, 1);
        let mut sink = TextSink::new(BinaryDecodeMode::Auto);
        log.replay(&mut sink);
        let text = sink.into_string();
        assert!(text.contains("  body: struct[1] @0..8"), "{text}");
        assert!(text.contains("    num (id=1): i32 = 5 @0..7"), "{text}");
        assert!(text.contains("warning: thrift.wrong_field_id"), "{text}");
    }
}
