#![no_main]

use std::collections::BTreeMap;

use arbitrary::{Arbitrary, Unstructured};
use bytes::{Bytes, BytesMut};
use libfuzzer_sys::fuzz_target;
use spark_codec_thrift::{
    ByteWindow, DecodeContext, DecodeCursor, DecoderConfig, Encoder, Field, FieldIdStyle, TypeTag,
    Value, WireEncoding, decode_value,
};

/// 低于默认嵌套上限，保证生成的值总能完整解码。
const MAX_DEPTH: usize = 12;

#[derive(Arbitrary, Debug)]
enum Shape {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Double,
    Uuid,
    Binary,
    List(Box<Shape>),
    Set(Box<Shape>),
    Map(Box<Shape>, Box<Shape>),
    Struct(Vec<(i16, Shape)>),
}

impl Shape {
    fn tag(&self, depth: usize) -> TypeTag {
        match self {
            _ if depth >= MAX_DEPTH => TypeTag::I32,
            Shape::Bool => TypeTag::Bool,
            Shape::I8 => TypeTag::I8,
            Shape::I16 => TypeTag::I16,
            Shape::I32 => TypeTag::I32,
            Shape::I64 => TypeTag::I64,
            Shape::Double => TypeTag::Double,
            Shape::Uuid => TypeTag::Uuid,
            Shape::Binary => TypeTag::Binary,
            Shape::List(_) => TypeTag::List,
            Shape::Set(_) => TypeTag::Set,
            Shape::Map(..) => TypeTag::Map,
            Shape::Struct(_) => TypeTag::Struct,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    encoding: u8,
    absolute_ids: bool,
    shape: Shape,
    data: &'a [u8],
}

/// 为给定形状生成值；容器元素同构，超过深度的节点退化为 i32。
fn value_of(shape: &Shape, u: &mut Unstructured<'_>, depth: usize) -> arbitrary::Result<Value> {
    if depth >= MAX_DEPTH {
        return Ok(Value::I32(u.arbitrary()?));
    }
    Ok(match shape {
        Shape::Bool => Value::Bool(u.arbitrary()?),
        Shape::I8 => Value::I8(u.arbitrary()?),
        Shape::I16 => Value::I16(u.arbitrary()?),
        Shape::I32 => Value::I32(u.arbitrary()?),
        Shape::I64 => Value::I64(u.arbitrary()?),
        Shape::Double => {
            let v: f64 = u.arbitrary()?;
            Value::Double(if v.is_nan() { 0.0 } else { v })
        }
        Shape::Uuid => Value::Uuid(u.arbitrary()?),
        Shape::Binary => {
            let len = u.int_in_range(0..=16)?;
            Value::Binary(Bytes::copy_from_slice(u.bytes(len)?))
        }
        Shape::List(elem) | Shape::Set(elem) => {
            let count = u.int_in_range(0..=4)?;
            let items = (0..count)
                .map(|_| value_of(elem, u, depth + 1))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            let elem = elem.tag(depth + 1);
            if matches!(shape, Shape::List(_)) {
                Value::List { elem, items }
            } else {
                Value::Set { elem, items }
            }
        }
        Shape::Map(key, value) => {
            let count = u.int_in_range(0..=4)?;
            let entries = (0..count)
                .map(|_| Ok((value_of(key, u, depth + 1)?, value_of(value, u, depth + 1)?)))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            Value::Map {
                types: Some((key.tag(depth + 1), value.tag(depth + 1))),
                entries,
            }
        }
        Shape::Struct(fields) => {
            let unique: BTreeMap<i16, &Shape> = fields.iter().map(|(id, s)| (*id, s)).collect();
            let fields = unique
                .into_iter()
                .map(|(id, s)| Ok(Field::new(id, value_of(s, u, depth + 1)?)))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            Value::Struct(fields)
        }
    })
}

/// 紧凑协议的空映射不携带键/值类型。
fn normalize(value: Value, compact: bool) -> Value {
    match value {
        Value::Map { types, entries } => Value::Map {
            types: if compact && entries.is_empty() { None } else { types },
            entries: entries
                .into_iter()
                .map(|(k, v)| (normalize(k, compact), normalize(v, compact)))
                .collect(),
        },
        Value::List { elem, items } => Value::List {
            elem,
            items: items.into_iter().map(|v| normalize(v, compact)).collect(),
        },
        Value::Set { elem, items } => Value::Set {
            elem,
            items: items.into_iter().map(|v| normalize(v, compact)).collect(),
        },
        Value::Struct(fields) => Value::Struct(
            fields
                .into_iter()
                .map(|f| Field::new(f.id, normalize(f.value, compact)))
                .collect(),
        ),
        scalar => scalar,
    }
}

// 编码任意值后解码：必须得到同一值树，且恰好消耗编码器写出的字节。
fuzz_target!(|input: Input<'_>| {
    let mut u = Unstructured::new(input.data);
    let Ok(value) = value_of(&input.shape, &mut u, 0) else {
        return;
    };
    let encoding = match input.encoding % 3 {
        0 => WireEncoding::BinaryOld,
        1 => WireEncoding::BinaryStrict,
        _ => WireEncoding::Compact,
    };
    let style = if input.absolute_ids {
        FieldIdStyle::Absolute
    } else {
        FieldIdStyle::Delta
    };

    let mut out = BytesMut::new();
    Encoder::new(encoding)
        .with_field_ids(style)
        .value(&value, &mut out);

    let config = DecoderConfig::default();
    let mut ctx = DecodeContext::new(ByteWindow::new(&out), encoding, &config);
    let mut cursor = DecodeCursor::new(0);
    let decoded = decode_value(&mut ctx, &mut cursor, value.type_tag())
        .expect("encoder output must decode")
        .complete()
        .expect("encoder output must be complete");
    assert_eq!(decoded, normalize(value, encoding.is_compact()));
    assert_eq!(cursor.position(), out.len());
});
