//! 递归通用值解码器。
//!
//! # 教案目的（Why）
//! - 没有 Schema 时，Thrift 的自描述类型标签足以还原完整值树；
//! - Schema 解码器在容器元素与嵌套结构体处也复用这里的逻辑，区别只在于
//!   [`Shape`]：通用路径只知道线上类型标签，Schema 路径额外携带声明类型。
//!
//! # 实现策略（How）
//! - 标量按编码定宽（二进制）或 zigzag varint（紧凑）读取；
//! - 容器与结构体通过 [`DecodeCursor::nested`] 进入，超过深度上限立即中止；
//! - 读完容器头后先校验“声明个数 × 元素最小线上尺寸”是否超出剩余输入，再分配。

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Diagnostic, ErrorKind, ThriftError};
use crate::header::{self, FieldHeader};
use crate::outcome::{DecodeOutcome, DecodeResult, ready};
use crate::reader::{ByteSpan, ByteWindow, DecodeContext, DecodeCursor};
use crate::schema::{self, SchemaType};
use crate::sink::Label;
use crate::types::{COMPACT_BOOLEAN_TRUE, TypeTag};
use crate::value::{Field, Value};
use crate::varint::{MAX_VARINT16_LEN, MAX_VARINT32_LEN, MAX_VARINT64_LEN, zigzag_decode};

/// 值的期望形状：仅有线上类型标签，或带有声明类型。
#[derive(Clone, Copy, Debug)]
pub(crate) enum Shape<'s> {
    Tag(TypeTag),
    Schema(&'s SchemaType),
}

impl Shape<'_> {
    fn tag(self) -> TypeTag {
        match self {
            Shape::Tag(tag) => tag,
            Shape::Schema(ty) => ty.tag(),
        }
    }
}

/// 按类型标签解码一个值。
///
/// - **前置条件**：`tag` 不是 [`TypeTag::Stop`]；
/// - **后置条件**：`Complete` 时游标恰好越过该值；`Incomplete` 时调用方应从原偏移重试。
pub fn decode_value(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    tag: TypeTag,
) -> DecodeResult<Value> {
    let start = cursor.position();
    decode_shaped(ctx, cursor, Label::Body, start, Shape::Tag(tag))
}

pub(crate) fn decode_shaped(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
    shape: Shape<'_>,
) -> DecodeResult<Value> {
    let window = *ctx.window();
    let compact = ctx.encoding().is_compact();
    let value = match shape.tag() {
        TypeTag::Stop => {
            return Err(ThriftError::new(
                ErrorKind::WrongType,
                cursor.position(),
                "the stop marker is not a value",
            ));
        }
        TypeTag::List | TypeTag::Set => {
            return decode_sequence(ctx, cursor, label, record_start, shape);
        }
        TypeTag::Map => return decode_map(ctx, cursor, label, record_start, shape),
        TypeTag::Struct => {
            return match shape {
                Shape::Schema(SchemaType::Struct(schema)) => {
                    schema::decode_struct_labeled(ctx, cursor, label, record_start, schema)
                }
                _ => decode_struct_generic(ctx, cursor, label, record_start),
            };
        }
        TypeTag::Bool => {
            let raw = ready!(window.u8(cursor));
            Value::Bool(if compact {
                raw == COMPACT_BOOLEAN_TRUE
            } else {
                raw != 0
            })
        }
        TypeTag::I8 => Value::I8(ready!(window.u8(cursor)) as i8),
        TypeTag::I16 => Value::I16(if compact {
            zigzag_decode(ready!(window.varint(cursor, MAX_VARINT16_LEN, "i16"))) as i16
        } else {
            ready!(window.i16_be(cursor))
        }),
        TypeTag::I32 => Value::I32(if compact {
            zigzag_decode(ready!(window.varint(cursor, MAX_VARINT32_LEN, "i32"))) as i32
        } else {
            ready!(window.i32_be(cursor))
        }),
        TypeTag::I64 => Value::I64(if compact {
            zigzag_decode(ready!(window.varint(cursor, MAX_VARINT64_LEN, "i64")))
        } else {
            ready!(window.i64_be(cursor))
        }),
        TypeTag::Double => {
            let raw = ready!(window.array::<8>(cursor));
            Value::Double(if compact {
                f64::from_le_bytes(raw)
            } else {
                f64::from_be_bytes(raw)
            })
        }
        TypeTag::Uuid => Value::Uuid(ready!(window.array::<16>(cursor))),
        TypeTag::Binary => {
            let len = ready!(read_binary_length(&window, cursor, compact));
            Value::Binary(Bytes::copy_from_slice(ready!(window.bytes(cursor, len))))
        }
    };
    if let (Shape::Schema(SchemaType::String), Value::Binary(raw)) = (shape, &value) {
        if let Err(err) = std::str::from_utf8(raw) {
            let at = cursor.position() - raw.len() + err.valid_up_to();
            ctx.log.diagnostic(Diagnostic::new(
                ErrorKind::InvalidUtf8,
                at,
                format!("`{label}` is declared as string but is not valid UTF-8"),
            ));
        }
    }
    ctx.log
        .leaf(label, ByteSpan::between(record_start, cursor.position()), &value);
    Ok(DecodeOutcome::Complete(value))
}

fn read_binary_length(
    window: &ByteWindow<'_>,
    cursor: &mut DecodeCursor,
    compact: bool,
) -> DecodeResult<usize> {
    let at = cursor.position();
    let raw = if compact {
        ready!(window.varint(cursor, MAX_VARINT32_LEN, "binary length")) as u32 as i32
    } else {
        ready!(window.i32_be(cursor))
    };
    match usize::try_from(raw) {
        Ok(len) => Ok(DecodeOutcome::Complete(len)),
        Err(_) => Err(ThriftError::new(
            ErrorKind::NegativeLength,
            at,
            format!("binary length {raw}"),
        )),
    }
}

fn element_mismatch(offset: usize, declared: TypeTag, found: TypeTag) -> ThriftError {
    ThriftError::new(
        ErrorKind::WrongType,
        offset,
        format!("container declared as {declared} elements but encoded as {found}"),
    )
}

fn decode_sequence(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
    shape: Shape<'_>,
) -> DecodeResult<Value> {
    let tag = shape.tag();
    let max_depth = ctx.config().nested_type_depth;
    cursor.nested(max_depth, record_start, |cursor| {
        let window = *ctx.window();
        let encoding = ctx.encoding();
        let header_at = cursor.position();
        let (elem, count) = ready!(header::read_list_header(&window, cursor, encoding));
        let elem_shape = match shape {
            Shape::Schema(SchemaType::List(inner) | SchemaType::Set(inner)) => {
                if inner.tag() != elem {
                    return Err(element_mismatch(header_at, inner.tag(), elem));
                }
                Shape::Schema(&**inner)
            }
            _ => Shape::Tag(elem),
        };
        let min_len = count.saturating_mul(elem.min_wire_size(encoding));
        ready!(window.ensure(cursor.position(), min_len));

        let idx = ctx.log.open(label, tag, record_start);
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let at = cursor.position();
            items.push(ready!(decode_shaped(ctx, cursor, Label::Element(i), at, elem_shape)));
        }
        ctx.log.close(idx, cursor.position(), count);
        Ok(DecodeOutcome::Complete(if tag == TypeTag::Set {
            Value::Set { elem, items }
        } else {
            Value::List { elem, items }
        }))
    })
}

fn decode_map(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
    shape: Shape<'_>,
) -> DecodeResult<Value> {
    let max_depth = ctx.config().nested_type_depth;
    cursor.nested(max_depth, record_start, |cursor| {
        let window = *ctx.window();
        let encoding = ctx.encoding();
        let header_at = cursor.position();
        let (types, count) = ready!(header::read_map_header(&window, cursor, encoding));
        let (key_shape, value_shape) = match (shape, types) {
            (Shape::Schema(SchemaType::Map(key, value)), Some((wire_key, wire_value))) => {
                if key.tag() != wire_key {
                    return Err(element_mismatch(header_at, key.tag(), wire_key));
                }
                if value.tag() != wire_value {
                    return Err(element_mismatch(header_at, value.tag(), wire_value));
                }
                (Shape::Schema(&**key), Shape::Schema(&**value))
            }
            (Shape::Schema(SchemaType::Map(key, value)), None) => {
                (Shape::Schema(&**key), Shape::Schema(&**value))
            }
            (_, Some((key, value))) => (Shape::Tag(key), Shape::Tag(value)),
            // 仅在 count == 0 时出现，元素循环不会执行。
            (_, None) => (Shape::Tag(TypeTag::Binary), Shape::Tag(TypeTag::Binary)),
        };
        let entry_len = key_shape.tag().min_wire_size(encoding)
            + value_shape.tag().min_wire_size(encoding);
        ready!(window.ensure(cursor.position(), count.saturating_mul(entry_len)));

        let idx = ctx.log.open(label, TypeTag::Map, record_start);
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = cursor.position();
            let key = ready!(decode_shaped(ctx, cursor, Label::Key(i), at, key_shape));
            let at = cursor.position();
            let value = ready!(decode_shaped(ctx, cursor, Label::Value(i), at, value_shape));
            entries.push((key, value));
        }
        ctx.log.close(idx, cursor.position(), count);
        Ok(DecodeOutcome::Complete(Value::Map { types, entries }))
    })
}

/// 不依赖 Schema 解码结构体：字段头 + 值，直到 Stop。
pub(crate) fn decode_struct_generic(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
) -> DecodeResult<Value> {
    let max_depth = ctx.config().nested_type_depth;
    cursor.nested(max_depth, record_start, |cursor| {
        let window = *ctx.window();
        let encoding = ctx.encoding();
        let idx = ctx.log.open(label, TypeTag::Struct, record_start);
        let mut fields = Vec::new();
        while let Some(header) = ready!(header::read_field_header(&window, cursor, encoding)) {
            let value = ready!(decode_field(
                ctx,
                cursor,
                &header,
                None,
                Shape::Tag(header.type_tag)
            ));
            cursor.commit_field(header.field_id);
            fields.push(Field::new(header.field_id, value));
        }
        ctx.log.close(idx, cursor.position(), fields.len());
        Ok(DecodeOutcome::Complete(Value::Struct(fields)))
    })
}

/// 解码字段值；字段记录的区间从字段头开始。
pub(crate) fn decode_field(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    header: &FieldHeader,
    name: Option<Arc<str>>,
    shape: Shape<'_>,
) -> DecodeResult<Value> {
    let label = Label::Field {
        id: header.field_id,
        name,
    };
    if let Some(inline) = header.inline_bool {
        let value = Value::Bool(inline);
        ctx.log.leaf(label, header.span, &value);
        return Ok(DecodeOutcome::Complete(value));
    }
    decode_shaped(ctx, cursor, label, header.span.offset(), shape)
}
