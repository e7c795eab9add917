//! 端到端解码场景
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以手写字节固定几条关键行为：严格二进制空消息、紧凑协议单字段结构体、
//!   分帧时的精确缺口、超大声明个数不触发分配、T_REPLY 异常分支，以及 Schema 命名与文本输出；
//! - **结构说明 (How)**：每个测试直接构造线上字节，调用公开 API，断言值树、消耗字节数与三态结果；
//! - **合同与边界 (What)**：字节均按 Thrift 规范手工排列，不依赖编码器，避免编码/解码同源错误相互掩盖。

use std::sync::Arc;

use spark_codec_thrift::{
    ApplicationExceptionType, ByteSpan, ByteWindow, DecodeContext, DecodeCursor, DecodeOutcome,
    DecoderConfig, ErrorKind, Field, Framing, MessageType, Needed, ReplyOutcome, SchemaRegistry,
    TextSink, ThriftDecoder, TypeTag, Value, WireEncoding, decode_value,
};

fn decoder() -> ThriftDecoder {
    ThriftDecoder::new(DecoderConfig::default())
}

fn strict_header(message_type: u8, name: &str, seq: i32) -> Vec<u8> {
    let mut out = vec![0x80, 0x01, 0x00, message_type];
    out.extend_from_slice(&(name.len() as i32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

#[test]
fn strict_ping_with_empty_body() {
    let mut bytes = strict_header(1, "ping", 7);
    let header_len = bytes.len();
    bytes.push(0x00);

    let report = decoder()
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    let message = report.result.unwrap();
    assert_eq!(message.header.encoding, WireEncoding::BinaryStrict);
    assert_eq!(message.header.message_type, MessageType::Call);
    assert_eq!(message.header.sequence_id, 7);
    assert_eq!(message.header.method_name, "ping");
    assert_eq!(message.header.span, ByteSpan::new(0, header_len));
    assert_eq!(message.body, Value::Struct(Vec::new()));
    assert_eq!(message.span.len(), header_len + 1);
}

#[test]
fn compact_struct_with_negative_i32() {
    let bytes = [0x15, 0x01, 0x00];
    let config = DecoderConfig::default();
    let mut ctx = DecodeContext::new(ByteWindow::new(&bytes), WireEncoding::Compact, &config);
    let mut cursor = DecodeCursor::new(0);
    let value = decode_value(&mut ctx, &mut cursor, TypeTag::Struct)
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(value, Value::Struct(vec![Field::new(1, Value::I32(-1))]));
    assert_eq!(cursor.position(), 3);
}

#[test]
fn framed_message_short_by_two_bytes() {
    let config = DecoderConfig {
        framed: true,
        ..DecoderConfig::default()
    };
    let bytes = [0, 0, 0, 5, 0x82, 0x21, 0x00];
    let outcome = ThriftDecoder::new(config)
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap();
    assert_eq!(outcome.needed(), Some(Needed::new(2)));
}

#[test]
fn huge_declared_list_waits_instead_of_allocating() {
    let mut bytes = vec![10, 0x00, 0x00, 0x4e, 0x20];
    bytes.resize(50, 0);
    let config = DecoderConfig::default();
    let mut ctx = DecodeContext::new(ByteWindow::new(&bytes), WireEncoding::BinaryStrict, &config);
    let outcome = decode_value(&mut ctx, &mut DecodeCursor::new(0), TypeTag::List).unwrap();
    assert_eq!(outcome.needed(), Some(Needed::new(20_000 * 8 - 45)));
}

#[test]
fn huge_declared_list_in_truncated_capture_is_an_error() {
    let mut bytes = vec![10, 0x00, 0x00, 0x4e, 0x20];
    bytes.resize(50, 0);
    let config = DecoderConfig::default();
    let window = ByteWindow::with_reported_len(&bytes, 1500);
    let mut ctx = DecodeContext::new(window, WireEncoding::BinaryStrict, &config);
    let err = decode_value(&mut ctx, &mut DecodeCursor::new(0), TypeTag::List).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CaptureTruncated);
    assert_eq!(err.offset(), 50);
}

#[test]
fn reply_with_exception_field_is_not_void() {
    let mut bytes = strict_header(2, "add", 1);
    // 2: struct { 1: i32 5 }
    bytes.extend_from_slice(&[0x0c, 0x00, 0x02, 0x08, 0x00, 0x01, 0, 0, 0, 5, 0x00, 0x00]);

    let report = decoder()
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    let message = report.result.unwrap();
    let outcome = message.reply_outcome().unwrap();
    assert!(matches!(outcome, ReplyOutcome::Exception(field) if field.id == 2));
    assert_eq!(outcome.exception_id(), Some(2));
}

#[test]
fn application_exception_uses_builtin_schema() {
    let mut bytes = strict_header(3, "nope", 9);
    bytes.extend_from_slice(&[0x0b, 0x00, 0x01, 0, 0, 0, 2, b'n', b'o']);
    bytes.extend_from_slice(&[0x08, 0x00, 0x02, 0, 0, 0, 1, 0x00]);

    let report = decoder()
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    let message = report.result.unwrap();
    let exception = message.application_exception().unwrap();
    assert_eq!(exception.message.as_deref(), Some("no"));
    assert_eq!(exception.kind, ApplicationExceptionType::UnknownMethod);
    assert_eq!(
        message.body.field(1).and_then(|f| f.name.as_deref()),
        Some("message")
    );
}

#[test]
fn old_binary_unframed_is_detected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&6i32.to_be_bytes());
    bytes.extend_from_slice(b"getAll");
    bytes.push(1);
    bytes.extend_from_slice(&3i32.to_be_bytes());
    bytes.push(0x00);

    let report = decoder()
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(report.framing, Framing::None);
    let header = report.header().unwrap();
    assert_eq!(header.encoding, WireEncoding::BinaryOld);
    assert_eq!(header.method_name, "getAll");
    assert_eq!(header.sequence_id, 3);
}

#[test]
fn mixed_strict_and_old_binary_on_one_connection() {
    let mut bytes = strict_header(1, "ping", 1);
    bytes.push(0x00);
    bytes.extend_from_slice(&4i32.to_be_bytes());
    bytes.extend_from_slice(b"pong");
    bytes.push(2);
    bytes.extend_from_slice(&1i32.to_be_bytes());
    bytes.push(0x00);

    let progress = decoder().decode_stream(&ByteWindow::new(&bytes));
    let encodings: Vec<WireEncoding> = progress
        .reports
        .iter()
        .filter_map(|r| r.header().map(|h| h.encoding))
        .collect();
    assert_eq!(
        encodings,
        [WireEncoding::BinaryStrict, WireEncoding::BinaryOld]
    );
    assert_eq!(progress.consumed, bytes.len());
    assert!(progress.needed.is_none() && progress.error.is_none());
}

const CALCULATOR: &str = r#"
    [[struct]]
    name = "Work"
    fields = [
        { id = 1, name = "num1", type = "i32" },
        { id = 2, name = "num2", type = "i32" },
        { id = 4, name = "comment", type = "string", optional = true },
    ]

    [[method]]
    name = "calculate"
    args = [ { id = 1, name = "logid", type = "i32" }, { id = 2, name = "w", type = "Work" } ]
    result = [ { id = 0, name = "success", type = "i32" } ]
"#;

#[test]
fn registered_method_names_fields_and_renders_outline() {
    let registry = SchemaRegistry::from_toml_str(CALCULATOR).unwrap();
    let decoder = ThriftDecoder::with_registry(DecoderConfig::default(), Arc::new(registry));

    let mut bytes = strict_header(1, "calculate", 4);
    bytes.extend_from_slice(&[0x08, 0x00, 0x01, 0, 0, 0, 1]);
    bytes.extend_from_slice(&[0x0c, 0x00, 0x02]);
    bytes.extend_from_slice(&[0x08, 0x00, 0x01, 0, 0, 0, 10]);
    bytes.extend_from_slice(&[0x08, 0x00, 0x02, 0, 0, 0, 32]);
    bytes.extend_from_slice(&[0x00, 0x00]);

    let report = decoder
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    let mut sink = TextSink::default();
    report.emit(&mut sink);

    let message = report.result.unwrap();
    let work = message.body.field(2).unwrap();
    assert_eq!(work.name.as_deref(), Some("w"));
    assert_eq!(
        work.value.field(2).and_then(|f| f.name.as_deref()),
        Some("num2")
    );

    let text = sink.as_str();
    assert!(text.starts_with("message CALL `calculate` seq=4 [binary-strict, unframed]"));
    assert!(text.contains("num1 (id=1): i32 = 10"));
    assert!(!text.contains("error:"));
}

#[test]
fn malformed_message_keeps_partial_output() {
    let mut bytes = strict_header(1, "calculate", 5);
    bytes.extend_from_slice(&[0x08, 0x00, 0x01, 0, 0, 0, 1]);
    // 列表声明个数为负。
    bytes.extend_from_slice(&[0x0f, 0x00, 0x02, 0x08, 0xff, 0xff, 0xff, 0xff]);

    let report = decoder()
        .decode_message(&ByteWindow::new(&bytes), 0)
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(report.error().map(|e| e.kind()), Some(ErrorKind::NegativeLength));
    assert_eq!(report.header().map(|h| h.sequence_id), Some(5));
    assert!(report.log.records().any(|r| r.value == Some(Value::I32(1))));

    let mut sink = TextSink::default();
    report.emit(&mut sink);
    assert!(sink.as_str().contains("error: thrift.negative_length"));
}

#[test]
fn stream_outcome_is_incomplete_not_error_for_a_cut_header() {
    let bytes = strict_header(1, "ping", 1);
    let outcome = decoder()
        .decode_message(&ByteWindow::new(&bytes[..6]), 0)
        .unwrap();
    assert!(matches!(outcome, DecodeOutcome::Incomplete(_)));
}
