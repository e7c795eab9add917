//! 与解码器对称的编码器。
//!
//! 协议分析本身只需要解码；编码器用于构造测试输入、基准负载与模糊测试语料，
//! 并为往返性质（编码后再解码得到同一逻辑值、消耗同样多的字节）提供参照。
//!
//! - 紧凑协议字段 id 默认按增量编码（差值 1..=15 时写入半字节），
//!   [`FieldIdStyle::Absolute`] 强制使用长格式，便于覆盖解码器的两条路径；
//! - 未声明类型的映射按第一个条目推断键/值类型；空映射在二进制协议下写 `0, 0`。

use bytes::{BufMut, BytesMut};

use crate::types::{
    BINARY_VERSION_1, COMPACT_BOOLEAN_FALSE, COMPACT_BOOLEAN_TRUE, COMPACT_PROTOCOL_ID,
    COMPACT_TYPE_SHIFT, COMPACT_VERSION, MessageType, TypeTag, WireEncoding,
};
use crate::value::{Field, Value};
use crate::varint::{encode_varint, zigzag_encode_i16, zigzag_encode_i32, zigzag_encode_i64};

/// 紧凑协议字段 id 的写法。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FieldIdStyle {
    /// 差值在 1..=15 内时写入类型字节的高半字节。
    #[default]
    Delta,
    /// 总是写 zigzag varint 形式的完整 id。
    Absolute,
}

/// Thrift 编码器。
#[derive(Clone, Copy, Debug)]
pub struct Encoder {
    encoding: WireEncoding,
    field_ids: FieldIdStyle,
}

impl Encoder {
    /// 指定线上编码。
    #[must_use]
    pub const fn new(encoding: WireEncoding) -> Self {
        Self {
            encoding,
            field_ids: FieldIdStyle::Delta,
        }
    }

    /// 指定紧凑协议字段 id 的写法；对二进制编码无影响。
    #[must_use]
    pub const fn with_field_ids(mut self, style: FieldIdStyle) -> Self {
        self.field_ids = style;
        self
    }

    /// 线上编码。
    #[must_use]
    pub const fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    /// 写入消息头与消息体。
    pub fn message(
        &self,
        message_type: MessageType,
        sequence_id: i32,
        method_name: &str,
        body: &Value,
        out: &mut BytesMut,
    ) {
        let name = method_name.as_bytes();
        match self.encoding {
            WireEncoding::Compact => {
                out.put_u8(COMPACT_PROTOCOL_ID);
                out.put_u8(((message_type as u8) << COMPACT_TYPE_SHIFT) | COMPACT_VERSION);
                encode_varint(u64::from(sequence_id as u32), out);
                encode_varint(name.len() as u64, out);
                out.put_slice(name);
            }
            WireEncoding::BinaryStrict => {
                out.put_u32(BINARY_VERSION_1 | u32::from(message_type as u8));
                out.put_i32(name.len() as i32);
                out.put_slice(name);
                out.put_i32(sequence_id);
            }
            WireEncoding::BinaryOld => {
                out.put_i32(name.len() as i32);
                out.put_slice(name);
                out.put_u8(message_type as u8);
                out.put_i32(sequence_id);
            }
        }
        self.value(body, out);
    }

    /// 写入一个值（不含类型标签）。
    pub fn value(&self, value: &Value, out: &mut BytesMut) {
        let compact = self.encoding.is_compact();
        match value {
            Value::Bool(flag) => match (compact, flag) {
                (true, true) => out.put_u8(COMPACT_BOOLEAN_TRUE),
                (true, false) => out.put_u8(COMPACT_BOOLEAN_FALSE),
                (false, flag) => out.put_u8(u8::from(*flag)),
            },
            Value::I8(v) => out.put_i8(*v),
            Value::I16(v) if compact => encode_varint(u64::from(zigzag_encode_i16(*v)), out),
            Value::I16(v) => out.put_i16(*v),
            Value::I32(v) if compact => encode_varint(u64::from(zigzag_encode_i32(*v)), out),
            Value::I32(v) => out.put_i32(*v),
            Value::I64(v) if compact => encode_varint(zigzag_encode_i64(*v), out),
            Value::I64(v) => out.put_i64(*v),
            Value::Double(v) if compact => out.put_f64_le(*v),
            Value::Double(v) => out.put_f64(*v),
            Value::Uuid(bytes) => out.put_slice(bytes),
            Value::Binary(bytes) => {
                self.length(bytes.len(), out);
                out.put_slice(bytes);
            }
            Value::List { elem, items } | Value::Set { elem, items } => {
                self.list_header(*elem, items.len(), out);
                for item in items {
                    self.value(item, out);
                }
            }
            Value::Map { types, entries } => {
                let types = types.or_else(|| {
                    entries
                        .first()
                        .map(|(key, value)| (key.type_tag(), value.type_tag()))
                });
                self.map_header(types, entries.len(), out);
                for (key, value) in entries {
                    self.value(key, out);
                    self.value(value, out);
                }
            }
            Value::Struct(fields) => self.fields(fields, out),
        }
    }

    fn fields(&self, fields: &[Field], out: &mut BytesMut) {
        let mut previous = 0i16;
        for field in fields {
            let tag = field.value.type_tag();
            if !self.encoding.is_compact() {
                out.put_u8(tag.to_binary());
                out.put_i16(field.id);
                self.value(&field.value, out);
                continue;
            }
            let nibble = match field.value {
                Value::Bool(true) => COMPACT_BOOLEAN_TRUE,
                Value::Bool(false) => COMPACT_BOOLEAN_FALSE,
                _ => tag.to_compact(),
            };
            let delta = i32::from(field.id) - i32::from(previous);
            if self.field_ids == FieldIdStyle::Delta && (1..=15).contains(&delta) {
                out.put_u8(((delta as u8) << 4) | nibble);
            } else {
                out.put_u8(nibble);
                encode_varint(u64::from(zigzag_encode_i16(field.id)), out);
            }
            if !matches!(field.value, Value::Bool(_)) {
                self.value(&field.value, out);
            }
            previous = field.id;
        }
        out.put_u8(TypeTag::Stop.to_binary());
    }

    fn length(&self, len: usize, out: &mut BytesMut) {
        if self.encoding.is_compact() {
            encode_varint(len as u64, out);
        } else {
            out.put_i32(len as i32);
        }
    }

    fn list_header(&self, elem: TypeTag, len: usize, out: &mut BytesMut) {
        if !self.encoding.is_compact() {
            out.put_u8(elem.to_binary());
            out.put_i32(len as i32);
        } else if len < 15 {
            out.put_u8(((len as u8) << 4) | elem.to_compact());
        } else {
            out.put_u8(0xf0 | elem.to_compact());
            encode_varint(len as u64, out);
        }
    }

    fn map_header(&self, types: Option<(TypeTag, TypeTag)>, len: usize, out: &mut BytesMut) {
        if self.encoding.is_compact() {
            encode_varint(len as u64, out);
            if len > 0 {
                let (key, value) = types.unwrap_or((TypeTag::Stop, TypeTag::Stop));
                out.put_u8((key.to_compact() << 4) | value.to_compact());
            }
        } else {
            let (key, value) = types.unwrap_or((TypeTag::Stop, TypeTag::Stop));
            out.put_u8(key.to_binary());
            out.put_u8(value.to_binary());
            out.put_i32(len as i32);
        }
    }
}

/// 以 4 字节大端长度前缀包装一个负载；超过 `u32::MAX` 的负载无法分帧，返回 `None`。
#[must_use]
pub fn frame(payload: &[u8]) -> Option<BytesMut> {
    let len = u32::try_from(payload.len()).ok()?;
    let mut out = BytesMut::with_capacity(payload.len() + 4);
    out.put_u32(len);
    out.put_slice(payload);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(encoder: Encoder, value: &Value) -> Vec<u8> {
        let mut out = BytesMut::new();
        encoder.value(value, &mut out);
        out.to_vec()
    }

    #[test]
    fn compact_field_ids_use_delta_when_small() {
        let body = Value::Struct(vec![
            Field::new(1, Value::I32(-1)),
            Field::new(20, Value::Bool(true)),
        ]);
        let bytes = encode(Encoder::new(WireEncoding::Compact), &body);
        assert_eq!(bytes, [0x15, 0x01, 0x01, 0x28, 0x00]);

        let absolute = Encoder::new(WireEncoding::Compact).with_field_ids(FieldIdStyle::Absolute);
        assert_eq!(encode(absolute, &body), [0x05, 0x02, 0x01, 0x01, 0x28, 0x00]);
    }

    #[test]
    fn strict_message_header_layout() {
        let mut out = BytesMut::new();
        Encoder::new(WireEncoding::BinaryStrict).message(
            MessageType::Call,
            7,
            "ping",
            &Value::Struct(Vec::new()),
            &mut out,
        );
        assert_eq!(
            &out[..],
            [0x80, 0x01, 0x00, 0x01, 0, 0, 0, 4, b'p', b'i', b'n', b'g', 0, 0, 0, 7, 0]
        );
    }

    #[test]
    fn compact_long_list_header() {
        let list = Value::List {
            elem: TypeTag::I8,
            items: vec![Value::I8(0); 15],
        };
        let bytes = encode(Encoder::new(WireEncoding::Compact), &list);
        assert_eq!(&bytes[..2], [0xf3, 15]);
        assert_eq!(bytes.len(), 17);
    }

    #[test]
    fn frame_prefixes_length() {
        assert_eq!(&frame(&[1, 2, 3]).unwrap()[..], [0, 0, 0, 3, 1, 2, 3]);
    }
}
