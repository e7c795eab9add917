//! 消息级与流级解码循环（恢复控制器）。
//!
//! # 教案目的（Why）
//! - 下层解码步骤只报告三态结果；本模块把它们组合成“逐消息”与“逐流”两层循环，
//!   并负责分帧记账：帧长度、帧内剩余字节与帧外续读；
//! - 损坏的消息不会中止整条流：循环保留其部分输出与错误，然后越过它继续。
//!
//! # 交互契约（What）
//! - **未分帧**：每条消息重新探测编码（同一连接可混用旧式与严格二进制）；数据不足时
//!   返回 `Incomplete`，调用方补齐字节后从同一偏移重新调用，控制器本身不保留半截进度；
//!   消息损坏时无法重新同步，报告覆盖窗口剩余部分；
//! - **分帧**：先读 4 字节长度，整帧到齐后才解码，因此传输层只会看到精确的字节缺口；
//!   帧内的 `Incomplete` 是 [`ErrorKind::FrameTooShort`]，消息之后的剩余字节是
//!   [`ErrorKind::FrameTooLong`]；越过错误时以帧边界为准；
//! - [`StreamDecoder`] 拥有重组缓冲区，适合按网络分段逐块喂入。
//!
//! # 风险提示（Trade-offs）
//! - 未分帧流在 `Incomplete` 后会重新解析已见过的字节，换取无状态、易于缓冲的调用契约；
//! - 超过 `max_frame_length` 的帧长度无法信任，只能作为致命错误结束本轮解码。

use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::config::DecoderConfig;
use crate::detect;
use crate::error::{Diagnostic, ErrorKind, ThriftError};
use crate::generic;
use crate::header::{self, MessageHeader};
use crate::outcome::{DecodeOutcome, DecodeResult, Needed, ready};
use crate::reader::{ByteSpan, ByteWindow, DecodeContext, DecodeCursor};
use crate::schema::{
    self, ApplicationException, ReplyOutcome, SchemaRegistry, application_exception_schema,
};
use crate::sink::{DecodeLog, DecodeSink, Label};
use crate::types::{Framing, MIN_MESSAGE_LEN, MessageType};
use crate::value::Value;

/// 一条完整解码的消息。
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// 分帧方式。
    pub framing: Framing,
    /// 消息头。
    pub header: MessageHeader,
    /// 消息体（参数、结果或异常结构体）。
    pub body: Value,
    /// 消息占用的字节区间，分帧时包含长度前缀。
    pub span: ByteSpan,
}

impl Message {
    /// T_REPLY 消息的结果含义；其他消息类型返回 `None`。
    #[must_use]
    pub fn reply_outcome(&self) -> Option<ReplyOutcome<'_>> {
        match self.header.message_type {
            MessageType::Reply => schema::reply_outcome(&self.body),
            _ => None,
        }
    }

    /// T_EXCEPTION 消息携带的框架层异常。
    #[must_use]
    pub fn application_exception(&self) -> Option<ApplicationException> {
        match self.header.message_type {
            MessageType::Exception => ApplicationException::from_value(&self.body),
            _ => None,
        }
    }
}

/// 解码失败的消息：保留已解析的部分。
#[derive(Clone, Debug, PartialEq)]
pub struct MessageFailure {
    /// 已解析的消息头。
    pub header: Option<MessageHeader>,
    /// 消息体已完整解码（例如帧内有多余字节）时保留。
    pub body: Option<Value>,
    /// 导致失败的错误。
    pub error: ThriftError,
}

/// 一条消息的解码报告。
#[derive(Clone, Debug)]
pub struct MessageReport {
    /// 循环越过的字节区间。
    pub span: ByteSpan,
    /// 分帧方式。
    pub framing: Framing,
    /// 解码结果。
    pub result: Result<Message, MessageFailure>,
    /// 逐元素记录与诊断，失败时包含错误之前的部分输出。
    pub log: DecodeLog,
}

impl MessageReport {
    /// 消息头（若已解析）。
    #[must_use]
    pub fn header(&self) -> Option<&MessageHeader> {
        match &self.result {
            Ok(message) => Some(&message.header),
            Err(failure) => failure.header.as_ref(),
        }
    }

    /// 错误（若失败）。
    #[must_use]
    pub fn error(&self) -> Option<&ThriftError> {
        self.result.as_ref().err().map(|failure| &failure.error)
    }

    /// 把报告重放到接收器。
    pub fn emit<S: DecodeSink + ?Sized>(&self, sink: &mut S) {
        sink.begin_message(self.span, self.framing, self.header());
        self.log.replay(sink);
        if let Some(error) = self.error() {
            sink.error(error);
        }
        sink.end_message();
    }
}

/// 一次流解码的进展。
#[derive(Debug, Default)]
pub struct StreamProgress {
    /// 依序产生的消息报告。
    pub reports: Vec<MessageReport>,
    /// 从窗口起点算起已越过的字节数。
    pub consumed: usize,
    /// 末尾半条消息还差的字节。
    pub needed: Option<Needed>,
    /// 使本轮解码停止的致命错误（无法确定消息边界）。
    pub error: Option<ThriftError>,
}

/// Thrift 消息解码器：配置加上只读的 Schema 注册表，可廉价克隆并跨线程共享。
#[derive(Clone, Debug, Default)]
pub struct ThriftDecoder {
    config: Arc<DecoderConfig>,
    registry: Arc<SchemaRegistry>,
}

impl ThriftDecoder {
    /// 仅做通用解码。
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_registry(config, Arc::new(SchemaRegistry::new()))
    }

    /// 携带 Schema 注册表。
    #[must_use]
    pub fn with_registry(config: DecoderConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// 解码配置。
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Schema 注册表。
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// 解码 `offset` 处的一条消息。
    ///
    /// - `Incomplete`：补齐字节后从同一偏移重试；
    /// - `Err`：无法确定消息边界（不是 Thrift、帧长度不可信）；
    /// - `Complete`：报告本身可能携带消息级错误，循环按 `span` 越过它。
    pub fn decode_message(
        &self,
        window: &ByteWindow<'_>,
        offset: usize,
    ) -> DecodeResult<MessageReport> {
        self.decode_at(window, offset, self.config.framed)
    }

    /// 从窗口起点逐条解码，直到数据不足、窗口耗尽或遇到致命错误。
    pub fn decode_stream(&self, window: &ByteWindow<'_>) -> StreamProgress {
        let mut framed = self.config.framed;
        self.drive(window, &mut framed)
    }

    /// `framed` 在流中首次遇到分帧消息后保持为真：一条连接不会混用两种分帧。
    fn drive(&self, window: &ByteWindow<'_>, framed: &mut bool) -> StreamProgress {
        let mut progress = StreamProgress::default();
        let captured = window.captured_len();
        while progress.consumed < captured {
            let offset = progress.consumed;
            match self.decode_at(window, offset, *framed) {
                Ok(DecodeOutcome::Complete(report)) => {
                    *framed |= matches!(report.framing, Framing::LengthPrefixed(_));
                    let next = report.span.end().min(captured);
                    progress.reports.push(report);
                    if next <= offset {
                        break;
                    }
                    progress.consumed = next;
                }
                Ok(DecodeOutcome::Incomplete(needed)) => {
                    progress.needed = Some(needed);
                    break;
                }
                Err(err) => {
                    tracing::debug!(error = %err, offset, "thrift stream decoding stopped");
                    progress.error = Some(err);
                    break;
                }
            }
        }
        progress
    }

    fn decode_at(
        &self,
        window: &ByteWindow<'_>,
        offset: usize,
        framed: bool,
    ) -> DecodeResult<MessageReport> {
        if framed {
            return self.decode_framed(window, offset);
        }
        let detection = ready!(detect::detect_at(window, offset, &self.config));
        match detection.framing {
            Framing::None => self.decode_unframed(window, offset, detection),
            Framing::LengthPrefixed(_) => self.decode_framed(window, offset),
        }
    }

    fn decode_unframed(
        &self,
        window: &ByteWindow<'_>,
        offset: usize,
        detection: detect::Detection,
    ) -> DecodeResult<MessageReport> {
        let mut ctx = DecodeContext::new(*window, detection.encoding, &self.config);
        let mut cursor = DecodeCursor::new(offset);
        let mut header = None;
        match self.decode_payload(&mut ctx, &mut cursor, &mut header) {
            Ok(DecodeOutcome::Complete((header, body))) => {
                let span = ByteSpan::between(offset, cursor.position());
                Ok(DecodeOutcome::Complete(MessageReport {
                    span,
                    framing: Framing::None,
                    result: Ok(Message {
                        framing: Framing::None,
                        header,
                        body,
                        span,
                    }),
                    log: ctx.into_log(),
                }))
            }
            Ok(DecodeOutcome::Incomplete(needed)) => Ok(DecodeOutcome::Incomplete(needed)),
            Err(error) => {
                ctx.log.close_all(error.offset());
                let end = window.captured_len().max(offset + 1);
                Ok(DecodeOutcome::Complete(MessageReport {
                    span: ByteSpan::between(offset, end),
                    framing: Framing::None,
                    result: Err(MessageFailure {
                        header,
                        body: None,
                        error,
                    }),
                    log: ctx.into_log(),
                }))
            }
        }
    }

    fn decode_framed(&self, window: &ByteWindow<'_>, offset: usize) -> DecodeResult<MessageReport> {
        let mut cursor = DecodeCursor::new(offset);
        let len = ready!(window.i32_be(&mut cursor)) as u32;
        if len > self.config.max_frame_length {
            return Err(ThriftError::new(
                ErrorKind::FrameTooLong,
                offset,
                format!(
                    "frame length {len} exceeds the configured maximum {}",
                    self.config.max_frame_length
                ),
            ));
        }
        let payload_at = cursor.position();
        let end = payload_at + len as usize;
        let framing = Framing::LengthPrefixed(len);
        // 未抓全的帧仍按已抓取的部分解码，截断错误在读到缺口时报告。
        if let Ok(DecodeOutcome::Incomplete(needed)) = window.ensure(payload_at, len as usize) {
            return Ok(DecodeOutcome::Incomplete(needed));
        }
        let span = ByteSpan::between(offset, end);
        let failure = |error: ThriftError,
                       header: Option<MessageHeader>,
                       body: Option<Value>,
                       log: DecodeLog|
         -> DecodeResult<MessageReport> {
            Ok(DecodeOutcome::Complete(MessageReport {
                span,
                framing,
                result: Err(MessageFailure {
                    header,
                    body,
                    error,
                }),
                log,
            }))
        };

        if (len as usize) < MIN_MESSAGE_LEN {
            let error = ThriftError::new(
                ErrorKind::FrameTooShort,
                offset,
                format!("frame length {len} cannot hold a message"),
            );
            return failure(error, None, None, DecodeLog::new());
        }
        let frame = window.limit(end);
        let encoding = match detect::payload_encoding(&frame, payload_at, &self.config) {
            Ok(DecodeOutcome::Complete(encoding)) => encoding,
            Ok(DecodeOutcome::Incomplete(_)) => {
                let error = ThriftError::new(
                    ErrorKind::FrameTooShort,
                    end,
                    "frame ends before the message header",
                );
                return failure(error, None, None, DecodeLog::new());
            }
            Err(error) => return failure(error, None, None, DecodeLog::new()),
        };

        let mut ctx = DecodeContext::new(frame, encoding, &self.config);
        let mut header = None;
        match self.decode_payload(&mut ctx, &mut cursor, &mut header) {
            Ok(DecodeOutcome::Complete((header, body))) if cursor.position() == end => {
                Ok(DecodeOutcome::Complete(MessageReport {
                    span,
                    framing,
                    result: Ok(Message {
                        framing,
                        header,
                        body,
                        span,
                    }),
                    log: ctx.into_log(),
                }))
            }
            Ok(DecodeOutcome::Complete((header, body))) => {
                let error = ThriftError::new(
                    ErrorKind::FrameTooLong,
                    cursor.position(),
                    format!(
                        "message ends {} bytes before the end of its frame",
                        end - cursor.position()
                    ),
                );
                failure(error, Some(header), Some(body), ctx.into_log())
            }
            Ok(DecodeOutcome::Incomplete(_)) => {
                ctx.log.close_all(end);
                let error = ThriftError::new(
                    ErrorKind::FrameTooShort,
                    end,
                    "message continues past the end of its frame",
                );
                failure(error, header, None, ctx.into_log())
            }
            Err(error) => {
                ctx.log.close_all(error.offset());
                failure(error, header, None, ctx.into_log())
            }
        }
    }

    /// 解码消息头与消息体；消息头一旦解析就写入 `header_slot`，供失败报告使用。
    fn decode_payload(
        &self,
        ctx: &mut DecodeContext<'_>,
        cursor: &mut DecodeCursor,
        header_slot: &mut Option<MessageHeader>,
    ) -> DecodeResult<(MessageHeader, Value)> {
        let header = ready!(header::decode_message_header(ctx, cursor));
        tracing::debug!(
            method = %header.method_name,
            message_type = %header.message_type,
            sequence_id = header.sequence_id,
            encoding = %header.encoding,
            offset = header.span.offset(),
            "decoded thrift message header"
        );
        let message_type = header.message_type;
        let method = self.registry.method(&header.method_name).cloned();
        *header_slot = Some(header.clone());

        let body_start = cursor.position();
        let body = match (message_type, method) {
            (MessageType::Exception, _) => ready!(schema::decode_struct_labeled(
                ctx,
                cursor,
                Label::Body,
                body_start,
                &application_exception_schema()
            )),
            (MessageType::Call | MessageType::Oneway, Some(method)) => ready!(
                schema::decode_struct_labeled(ctx, cursor, Label::Body, body_start, method.args())
            ),
            (MessageType::Reply, Some(method)) => ready!(schema::decode_struct_labeled(
                ctx,
                cursor,
                Label::Body,
                body_start,
                method.result()
            )),
            (_, None) => ready!(generic::decode_struct_generic(
                ctx,
                cursor,
                Label::Body,
                body_start
            )),
        };

        if message_type == MessageType::Reply {
            let set = body.fields().map_or(0, <[_]>::len);
            if set > 1 {
                ctx.log.diagnostic(Diagnostic::new(
                    ErrorKind::UnexpectedReplyShape,
                    body_start,
                    format!("reply sets {set} fields, expected at most one"),
                ));
            }
        }
        Ok(DecodeOutcome::Complete((header, body)))
    }
}

/// 一次 [`StreamDecoder::feed`] 的结果。
#[derive(Debug)]
pub struct StreamBatch {
    /// 报告中偏移量的基准：本批次开始时流中已越过的字节数。
    pub base_offset: u64,
    /// 新产生的消息报告。
    pub reports: Vec<MessageReport>,
    /// 缓冲区末尾的半条消息还差的字节。
    pub needed: Option<Needed>,
    /// 致命错误；此时缓冲区已被丢弃。
    pub error: Option<ThriftError>,
}

/// 拥有重组缓冲区的流式解码器：按到达顺序喂入字节块，取出完整消息。
#[derive(Debug)]
pub struct StreamDecoder {
    decoder: ThriftDecoder,
    buffer: BytesMut,
    consumed_total: u64,
    framed: bool,
}

impl StreamDecoder {
    /// 使用给定解码器。
    #[must_use]
    pub fn new(decoder: ThriftDecoder) -> Self {
        let framed = decoder.config.framed;
        Self {
            decoder,
            buffer: BytesMut::new(),
            consumed_total: 0,
            framed,
        }
    }

    /// 追加一个字节块并解码所有已完整到达的消息。
    ///
    /// 报告中的偏移量相对于本批次开始时的缓冲区起点，加上 `base_offset` 即流内偏移。
    pub fn feed(&mut self, chunk: &[u8]) -> StreamBatch {
        self.buffer.extend_from_slice(chunk);
        let base_offset = self.consumed_total;
        let progress = self
            .decoder
            .drive(&ByteWindow::new(&self.buffer), &mut self.framed);
        let consumed = if progress.error.is_some() {
            self.buffer.len()
        } else {
            progress.consumed
        };
        self.buffer.advance(consumed);
        self.consumed_total += consumed as u64;
        tracing::trace!(
            consumed,
            buffered = self.buffer.len(),
            reports = progress.reports.len(),
            "fed thrift stream chunk"
        );
        StreamBatch {
            base_offset,
            reports: progress.reports,
            needed: progress.needed,
            error: progress.error,
        }
    }

    /// 等待后续字节的缓冲量。
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 流中已越过的总字节数。
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed_total
    }

    /// 丢弃缓冲区与分帧判断，准备解码新连接。
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.consumed_total = 0;
        self.framed = self.decoder.config.framed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectMode;
    use crate::types::WireEncoding;

    const PING: [u8; 17] = [
        0x80, 0x01, 0x00, 0x01, 0, 0, 0, 4, b'p', b'i', b'n', b'g', 0, 0, 0, 7, 0x00,
    ];

    fn framed(payload: &[u8], len: u32) -> Vec<u8> {
        let mut out = len.to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn decoder() -> ThriftDecoder {
        ThriftDecoder::new(DecoderConfig::default())
    }

    #[test]
    fn strict_ping_consumes_header_and_stop() {
        let report = decoder()
            .decode_message(&ByteWindow::new(&PING), 0)
            .unwrap()
            .complete()
            .unwrap();
        let message = report.result.unwrap();
        assert_eq!(message.header.encoding, WireEncoding::BinaryStrict);
        assert_eq!(message.header.message_type, MessageType::Call);
        assert_eq!(message.header.sequence_id, 7);
        assert_eq!(message.header.method_name, "ping");
        assert_eq!(message.body, Value::Struct(Vec::new()));
        assert_eq!(message.span, ByteSpan::new(0, 17));
    }

    #[test]
    fn short_frame_reports_exact_shortfall() {
        let bytes = [0, 0, 0, 5, 0x82, 0x21, 0x00];
        let outcome = decoder().decode_message(&ByteWindow::new(&bytes), 0).unwrap();
        assert_eq!(outcome.needed(), Some(Needed::new(2)));

        let config = DecoderConfig {
            framed: true,
            ..DecoderConfig::default()
        };
        let outcome = ThriftDecoder::new(config)
            .decode_message(&ByteWindow::new(&bytes[..7]), 0)
            .unwrap();
        assert_eq!(outcome.needed(), Some(Needed::new(2)));
    }

    #[test]
    fn framed_ping_is_detected() {
        let bytes = framed(&PING, 17);
        let report = decoder()
            .decode_message(&ByteWindow::new(&bytes), 0)
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(report.framing, Framing::LengthPrefixed(17));
        assert_eq!(report.span, ByteSpan::new(0, 21));
        assert!(report.result.is_ok());
    }

    #[test]
    fn trailing_bytes_in_frame_are_frame_too_long() {
        let mut payload = PING.to_vec();
        payload.push(0xff);
        let bytes = framed(&payload, 18);
        let report = decoder()
            .decode_message(&ByteWindow::new(&bytes), 0)
            .unwrap()
            .complete()
            .unwrap();
        let failure = report.result.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::FrameTooLong);
        assert_eq!(failure.error.offset(), 21);
        assert_eq!(failure.header.unwrap().method_name, "ping");
        assert_eq!(failure.body, Some(Value::Struct(Vec::new())));
        assert_eq!(report.span, ByteSpan::new(0, 22));
    }

    #[test]
    fn message_cut_by_frame_is_frame_too_short() {
        let bytes = framed(&PING[..16], 16);
        let report = decoder()
            .decode_message(&ByteWindow::new(&bytes), 0)
            .unwrap()
            .complete()
            .unwrap();
        let failure = report.result.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::FrameTooShort);
        assert_eq!(failure.error.offset(), 20);
        assert!(failure.header.is_some());
    }

    #[test]
    fn absurd_frame_length_is_fatal() {
        let config = DecoderConfig {
            framed: true,
            ..DecoderConfig::default()
        };
        let err = ThriftDecoder::new(config)
            .decode_message(&ByteWindow::new(&[0x7f, 0xff, 0xff, 0xff, 0x80]), 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FrameTooLong);
    }

    #[test]
    fn malformed_unframed_message_consumes_the_window() {
        let mut bytes = PING[..16].to_vec();
        // 字段类型 0x11 未定义。
        bytes.extend_from_slice(&[0x11, 0x00, 0x01, 0x00]);
        bytes.extend_from_slice(&PING);
        let progress = decoder().decode_stream(&ByteWindow::new(&bytes));
        assert_eq!(progress.reports.len(), 1);
        assert_eq!(progress.consumed, bytes.len());
        let report = &progress.reports[0];
        assert_eq!(report.error().map(ThriftError::kind), Some(ErrorKind::UnknownType));
        assert_eq!(report.header().map(|h| h.sequence_id), Some(7));
    }

    #[test]
    fn stream_decoder_reassembles_split_messages() {
        let mut stream = StreamDecoder::new(decoder());
        let mut bytes = PING.to_vec();
        bytes.extend_from_slice(&PING);

        let batch = stream.feed(&bytes[..10]);
        assert!(batch.reports.is_empty());
        assert_eq!(batch.needed, Some(Needed::new(2)));
        assert_eq!(stream.buffered(), 10);

        let batch = stream.feed(&bytes[10..20]);
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.base_offset, 0);
        assert_eq!(stream.buffered(), 3);

        let batch = stream.feed(&bytes[20..]);
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.base_offset, 17);
        assert_eq!(batch.needed, None);
        assert_eq!(stream.buffered(), 0);
        assert_eq!(stream.consumed(), 34);
    }

    #[test]
    fn heuristic_stream_keeps_a_split_header_buffered() {
        let config = DecoderConfig {
            detect_mode: DetectMode::Heuristic,
            ..DecoderConfig::default()
        };
        let mut stream = StreamDecoder::new(ThriftDecoder::new(config));

        let batch = stream.feed(&PING[..10]);
        assert!(batch.reports.is_empty());
        assert!(batch.error.is_none());
        assert_eq!(batch.needed, Some(Needed::new(2)));
        assert_eq!(stream.buffered(), 10);

        let batch = stream.feed(&PING[10..]);
        assert!(batch.error.is_none());
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(
            batch.reports[0].header().map(|h| h.method_name.as_str()),
            Some("ping")
        );
        assert!(batch.reports[0].result.is_ok());
        assert_eq!(stream.buffered(), 0);
        assert_eq!(stream.consumed(), 17);
    }

    #[test]
    fn framing_sticks_once_seen() {
        let mut stream = StreamDecoder::new(decoder());
        let batch = stream.feed(&framed(&PING, 17));
        assert_eq!(batch.reports.len(), 1);
        // 同一连接上的未分帧消息会被当作帧长度读取。
        let batch = stream.feed(&PING);
        assert!(batch.reports.is_empty());
        assert_eq!(
            batch.error.map(|err| err.kind()),
            Some(ErrorKind::FrameTooLong)
        );
        assert_eq!(stream.buffered(), 0);

        stream.reset();
        let batch = stream.feed(&PING);
        assert_eq!(batch.reports.len(), 1);
    }
}
