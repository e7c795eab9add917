//! 消息头、字段头与容器头的语法。
//!
//! ## 交互契约（What）
//! - 旧式二进制：`name-len(i32 BE) name type(1B) seqid(i32 BE)`；
//! - 严格二进制：`0x80 0x01 reserved type` 版本字 + `name-len name seqid`；
//! - 紧凑协议：`0x82`、`(type << 5) | version`、seqid（32 位 varint，按 i32 重新解释）、
//!   name-len（varint）、name；
//! - 字段头：二进制为 `type(1B) id(i16 BE)`，紧凑协议为 `delta << 4 | type`，
//!   delta 为 0 时后随 zigzag varint 形式的绝对 id；布尔字段把取值放在类型半字节中。
//!
//! ## 实现策略（How）
//! - 所有函数只推进游标，不记录日志；调用方决定如何把头部计入元素区间；
//! - 字段 id 只在字段值成功解码后才提交到游标（见 [`DecodeCursor::commit_field`]）。

use crate::error::{Diagnostic, ErrorKind, ThriftError};
use crate::outcome::{DecodeOutcome, DecodeResult, ready};
use crate::reader::{ByteSpan, ByteWindow, DecodeContext, DecodeCursor};
use crate::types::{
    BINARY_VERSION_1, BINARY_VERSION_MASK, COMPACT_BOOLEAN_FALSE, COMPACT_BOOLEAN_TRUE,
    COMPACT_PROTOCOL_ID, COMPACT_TYPE_SHIFT, COMPACT_VERSION, COMPACT_VERSION_MASK,
    MESSAGE_TYPE_MASK, MessageType, TypeTag, WireEncoding,
};
use crate::varint::{MAX_VARINT16_LEN, MAX_VARINT32_LEN, zigzag_decode};

/// 消息头。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageHeader {
    /// 线上编码。
    pub encoding: WireEncoding,
    /// 消息类型。
    pub message_type: MessageType,
    /// 序列号。
    pub sequence_id: i32,
    /// 方法名；非法 UTF-8 时为有损解码结果，并伴随一条诊断。
    pub method_name: String,
    /// 协议版本：旧式二进制为 0，严格二进制与紧凑协议为 1。
    pub version: u8,
    /// 消息头的字节区间。
    pub span: ByteSpan,
}

/// 字段头。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldHeader {
    /// 字段类型。
    pub type_tag: TypeTag,
    /// 字段 id。
    pub field_id: i16,
    /// 字段头的字节区间。
    pub span: ByteSpan,
    /// 紧凑协议布尔字段直接携带的取值。
    pub inline_bool: Option<bool>,
}

/// 解码消息头。
pub fn decode_message_header(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
) -> DecodeResult<MessageHeader> {
    let start = cursor.position();
    let window = *ctx.window();
    let encoding = ctx.encoding();
    let (message_type, sequence_id, method_name, version) = match encoding {
        WireEncoding::Compact => {
            let protocol_id = ready!(window.u8(cursor));
            if protocol_id != COMPACT_PROTOCOL_ID {
                return Err(ThriftError::new(
                    ErrorKind::ProtocolVersionMismatch,
                    start,
                    format!("expected compact protocol id 0x82, found {protocol_id:#04x}"),
                ));
            }
            let version_and_type = ready!(window.u8(cursor));
            let version = version_and_type & COMPACT_VERSION_MASK;
            if version != COMPACT_VERSION {
                return Err(ThriftError::new(
                    ErrorKind::ProtocolVersionMismatch,
                    start + 1,
                    format!("unsupported compact protocol version {version}"),
                ));
            }
            let message_type =
                parse_message_type(version_and_type >> COMPACT_TYPE_SHIFT, start + 1)?;
            let sequence_id =
                ready!(window.varint(cursor, MAX_VARINT32_LEN, "sequence id")) as u32 as i32;
            let len_at = cursor.position();
            let len = ready!(window.varint(cursor, MAX_VARINT32_LEN, "method name length"))
                as u32 as i32;
            let name = ready!(read_method_name(ctx, cursor, len, len_at));
            (message_type, sequence_id, name, COMPACT_VERSION)
        }
        WireEncoding::BinaryStrict => {
            let word = ready!(window.i32_be(cursor)) as u32;
            if word & BINARY_VERSION_MASK != BINARY_VERSION_1 {
                return Err(ThriftError::new(
                    ErrorKind::ProtocolVersionMismatch,
                    start,
                    format!("unsupported binary protocol version word {word:#010x}"),
                ));
            }
            let message_type = parse_message_type(word.to_be_bytes()[3], start + 3)?;
            let len_at = cursor.position();
            let len = ready!(window.i32_be(cursor));
            let name = ready!(read_method_name(ctx, cursor, len, len_at));
            let sequence_id = ready!(window.i32_be(cursor));
            (message_type, sequence_id, name, 1)
        }
        WireEncoding::BinaryOld => {
            let len = ready!(window.i32_be(cursor));
            let name = ready!(read_method_name(ctx, cursor, len, start));
            let type_at = cursor.position();
            let message_type = parse_message_type(ready!(window.u8(cursor)), type_at)?;
            let sequence_id = ready!(window.i32_be(cursor));
            (message_type, sequence_id, name, 0)
        }
    };
    Ok(DecodeOutcome::Complete(MessageHeader {
        encoding,
        message_type,
        sequence_id,
        method_name,
        version,
        span: ByteSpan::between(start, cursor.position()),
    }))
}

fn parse_message_type(raw: u8, offset: usize) -> Result<MessageType, ThriftError> {
    if raw & !MESSAGE_TYPE_MASK != 0 {
        return Err(ThriftError::new(
            ErrorKind::InvalidMessageType,
            offset,
            format!("reserved bits set in message type byte {raw:#04x}"),
        ));
    }
    MessageType::from_wire(raw).ok_or_else(|| {
        ThriftError::new(
            ErrorKind::InvalidMessageType,
            offset,
            format!("message type {raw} is outside 1..=4"),
        )
    })
}

fn read_method_name(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    len: i32,
    len_at: usize,
) -> DecodeResult<String> {
    let Ok(len) = usize::try_from(len) else {
        return Err(ThriftError::new(
            ErrorKind::NegativeLength,
            len_at,
            format!("method name length {len}"),
        ));
    };
    let limit = ctx.config().max_method_name_len;
    if len > limit {
        return Err(ThriftError::new(
            ErrorKind::MethodNameTooLong,
            len_at,
            format!("method name length {len} exceeds {limit}"),
        ));
    }
    let name_at = cursor.position();
    let raw = ready!(ctx.window().bytes(cursor, len));
    let name = match std::str::from_utf8(raw) {
        Ok(name) => name.to_owned(),
        Err(err) => {
            ctx.log.diagnostic(Diagnostic::new(
                ErrorKind::InvalidUtf8,
                name_at + err.valid_up_to(),
                "method name is not valid UTF-8",
            ));
            String::from_utf8_lossy(raw).into_owned()
        }
    };
    Ok(DecodeOutcome::Complete(name))
}

/// 读取字段头；Stop 标记返回 `None`。
///
/// 紧凑协议的增量 id 以游标中的 `previous_field_id` 为基准，但不会修改它。
pub fn read_field_header(
    window: &ByteWindow<'_>,
    cursor: &mut DecodeCursor,
    encoding: WireEncoding,
) -> DecodeResult<Option<FieldHeader>> {
    let start = cursor.position();
    let byte = ready!(window.u8(cursor));
    if byte == 0 {
        return Ok(DecodeOutcome::Complete(None));
    }
    let (type_tag, field_id, inline_bool) = if encoding.is_compact() {
        let nibble = byte & 0x0f;
        let type_tag = match TypeTag::from_compact(nibble) {
            Some(TypeTag::Stop) | None => {
                return Err(ThriftError::new(
                    ErrorKind::UnknownType,
                    start,
                    format!("unknown compact field type {nibble}"),
                ));
            }
            Some(tag) => tag,
        };
        let delta = byte >> 4;
        let field_id = if delta != 0 {
            cursor.previous_field_id().wrapping_add(i16::from(delta))
        } else {
            zigzag_decode(ready!(window.varint(cursor, MAX_VARINT16_LEN, "field id"))) as i16
        };
        let inline_bool = match nibble {
            COMPACT_BOOLEAN_TRUE => Some(true),
            COMPACT_BOOLEAN_FALSE => Some(false),
            _ => None,
        };
        (type_tag, field_id, inline_bool)
    } else {
        let type_tag = TypeTag::from_binary(byte).ok_or_else(|| {
            ThriftError::new(
                ErrorKind::UnknownType,
                start,
                format!("unknown binary field type {byte}"),
            )
        })?;
        (type_tag, ready!(window.i16_be(cursor)), None)
    };
    Ok(DecodeOutcome::Complete(Some(FieldHeader {
        type_tag,
        field_id,
        span: ByteSpan::between(start, cursor.position()),
        inline_bool,
    })))
}

/// 读取列表/集合头，返回元素类型与声明个数。
pub fn read_list_header(
    window: &ByteWindow<'_>,
    cursor: &mut DecodeCursor,
    encoding: WireEncoding,
) -> DecodeResult<(TypeTag, usize)> {
    let start = cursor.position();
    if encoding.is_compact() {
        let byte = ready!(window.u8(cursor));
        let elem = element_tag(TypeTag::from_compact(byte & 0x0f), byte & 0x0f, start)?;
        let size = byte >> 4;
        let count = if size == 0x0f {
            let at = cursor.position();
            let raw = ready!(window.varint(cursor, MAX_VARINT32_LEN, "list size")) as u32 as i32;
            non_negative(raw, at, "list size")?
        } else {
            usize::from(size)
        };
        Ok(DecodeOutcome::Complete((elem, count)))
    } else {
        let raw_elem = ready!(window.u8(cursor));
        let elem = element_tag(TypeTag::from_binary(raw_elem), raw_elem, start)?;
        let at = cursor.position();
        let raw = ready!(window.i32_be(cursor));
        let count = non_negative(raw, at, "list size")?;
        Ok(DecodeOutcome::Complete((elem, count)))
    }
}

/// 读取映射头，返回键/值类型与声明个数。
///
/// 紧凑协议的空映射不携带类型；二进制协议的空映射容忍任意类型字节。
pub fn read_map_header(
    window: &ByteWindow<'_>,
    cursor: &mut DecodeCursor,
    encoding: WireEncoding,
) -> DecodeResult<(Option<(TypeTag, TypeTag)>, usize)> {
    let start = cursor.position();
    if encoding.is_compact() {
        let raw = ready!(window.varint(cursor, MAX_VARINT32_LEN, "map size")) as u32 as i32;
        let count = non_negative(raw, start, "map size")?;
        if count == 0 {
            return Ok(DecodeOutcome::Complete((None, 0)));
        }
        let types_at = cursor.position();
        let byte = ready!(window.u8(cursor));
        let key = element_tag(TypeTag::from_compact(byte >> 4), byte >> 4, types_at)?;
        let value = element_tag(TypeTag::from_compact(byte & 0x0f), byte & 0x0f, types_at)?;
        Ok(DecodeOutcome::Complete((Some((key, value)), count)))
    } else {
        let [raw_key, raw_value] = ready!(window.array::<2>(cursor));
        let at = cursor.position();
        let raw = ready!(window.i32_be(cursor));
        let count = non_negative(raw, at, "map size")?;
        let key = element_tag(TypeTag::from_binary(raw_key), raw_key, start);
        let value = element_tag(TypeTag::from_binary(raw_value), raw_value, start + 1);
        let types = match (key, value) {
            (Ok(key), Ok(value)) => Some((key, value)),
            _ if count == 0 => None,
            (Err(err), _) | (_, Err(err)) => return Err(err),
        };
        Ok(DecodeOutcome::Complete((types, count)))
    }
}

fn element_tag(tag: Option<TypeTag>, raw: u8, offset: usize) -> Result<TypeTag, ThriftError> {
    match tag {
        Some(TypeTag::Stop) | None => Err(ThriftError::new(
            ErrorKind::UnknownType,
            offset,
            format!("invalid container element type {raw}"),
        )),
        Some(tag) => Ok(tag),
    }
}

fn non_negative(raw: i32, offset: usize, what: &'static str) -> Result<usize, ThriftError> {
    usize::try_from(raw)
        .map_err(|_| ThriftError::new(ErrorKind::NegativeLength, offset, format!("{what} {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;

    fn header(bytes: &[u8], encoding: WireEncoding) -> DecodeResult<MessageHeader> {
        let config = DecoderConfig::default();
        let mut ctx = DecodeContext::new(ByteWindow::new(bytes), encoding, &config);
        decode_message_header(&mut ctx, &mut DecodeCursor::new(0))
    }

    #[test]
    fn strict_binary_header() {
        let bytes = [
            0x80, 0x01, 0x00, 0x01, 0, 0, 0, 4, b'p', b'i', b'n', b'g', 0, 0, 0, 1,
        ];
        let parsed = header(&bytes, WireEncoding::BinaryStrict).unwrap().complete().unwrap();
        assert_eq!(parsed.message_type, MessageType::Call);
        assert_eq!(parsed.method_name, "ping");
        assert_eq!(parsed.sequence_id, 1);
        assert_eq!(parsed.span, ByteSpan::new(0, 16));
    }

    #[test]
    fn compact_sequence_id_is_plain_varint() {
        // seqid 0xffffffff 以 5 字节 varint 写出，按 i32 解释为 -1。
        let bytes = [0x82, 0x41, 0xff, 0xff, 0xff, 0xff, 0x0f, 0x01, b'x'];
        let parsed = header(&bytes, WireEncoding::Compact).unwrap().complete().unwrap();
        assert_eq!(parsed.message_type, MessageType::Reply);
        assert_eq!(parsed.sequence_id, -1);
        assert_eq!(parsed.method_name, "x");
    }

    #[test]
    fn reserved_type_bits_are_invalid() {
        let bytes = [0x80, 0x01, 0x00, 0x09, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = header(&bytes, WireEncoding::BinaryStrict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessageType);
    }

    #[test]
    fn oversized_method_name_is_rejected_before_reading() {
        let bytes = [0x00, 0x10, 0x00, 0x00];
        let err = header(&bytes, WireEncoding::BinaryOld).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNameTooLong);
    }

    #[test]
    fn compact_field_id_delta_and_absolute() {
        let window = ByteWindow::new(&[0x15, 0x05, 0x03, 0x0e]);
        let mut cursor = DecodeCursor::new(0);
        cursor.commit_field(4);
        let delta = read_field_header(&window, &mut cursor, WireEncoding::Compact)
            .unwrap()
            .complete()
            .flatten()
            .unwrap();
        assert_eq!((delta.type_tag, delta.field_id), (TypeTag::I32, 5));
        // 0x05 是第一个字段的值，由调用方读取。
        let mut cursor = DecodeCursor::new(2);
        let absolute = read_field_header(&window, &mut cursor, WireEncoding::Compact)
            .unwrap()
            .complete()
            .flatten()
            .unwrap();
        assert_eq!((absolute.type_tag, absolute.field_id), (TypeTag::I8, 7));
        assert_eq!(absolute.span, ByteSpan::new(2, 2));
    }

    #[test]
    fn compact_bool_field_carries_value() {
        let window = ByteWindow::new(&[0x12]);
        let parsed = read_field_header(&window, &mut DecodeCursor::new(0), WireEncoding::Compact)
            .unwrap()
            .complete()
            .flatten()
            .unwrap();
        assert_eq!(parsed.type_tag, TypeTag::Bool);
        assert_eq!(parsed.inline_bool, Some(false));
    }

    #[test]
    fn negative_binary_list_size() {
        let window = ByteWindow::new(&[8, 0xff, 0xff, 0xff, 0xff]);
        let err = read_list_header(&window, &mut DecodeCursor::new(0), WireEncoding::BinaryStrict)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NegativeLength);
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn compact_list_size_sentinel() {
        let window = ByteWindow::new(&[0xf5, 0x96, 0x01]);
        let parsed = read_list_header(&window, &mut DecodeCursor::new(0), WireEncoding::Compact)
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(parsed, (TypeTag::I32, 150));
    }

    #[test]
    fn empty_compact_map_has_no_types() {
        let window = ByteWindow::new(&[0x00]);
        let parsed = read_map_header(&window, &mut DecodeCursor::new(0), WireEncoding::Compact)
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(parsed, (None, 0));
    }
}
