//! 解码得到的逻辑值树。
//!
//! 值树只承载语义（类型与取值），字节区间与部分输出记录在
//! [`DecodeLog`](crate::DecodeLog) 中；因此两个编码不同但语义一致的消息会得到相等的 [`Value`]。

use std::sync::Arc;

use bytes::Bytes;

use crate::types::TypeTag;

/// Thrift 值。
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// 布尔。
    Bool(bool),
    /// 8 位整数。
    I8(i8),
    /// 16 位整数。
    I16(i16),
    /// 32 位整数。
    I32(i32),
    /// 64 位整数。
    I64(i64),
    /// 64 位浮点。
    Double(f64),
    /// 16 字节 UUID（网络字节序）。
    Uuid([u8; 16]),
    /// 字节串；`string` 也以字节串保存，展示层按需解释为 UTF-8。
    Binary(Bytes),
    /// 列表。
    List {
        /// 元素类型。
        elem: TypeTag,
        /// 元素。
        items: Vec<Value>,
    },
    /// 集合（保持线上顺序，不去重）。
    Set {
        /// 元素类型。
        elem: TypeTag,
        /// 元素。
        items: Vec<Value>,
    },
    /// 映射（保持线上顺序）。
    Map {
        /// 键/值类型；紧凑协议的空映射不携带类型，此时为 `None`。
        types: Option<(TypeTag, TypeTag)>,
        /// 键值对。
        entries: Vec<(Value, Value)>,
    },
    /// 结构体。
    Struct(Vec<Field>),
}

impl Value {
    /// 值的类型标签。
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::Bool,
            Value::I8(_) => TypeTag::I8,
            Value::I16(_) => TypeTag::I16,
            Value::I32(_) => TypeTag::I32,
            Value::I64(_) => TypeTag::I64,
            Value::Double(_) => TypeTag::Double,
            Value::Uuid(_) => TypeTag::Uuid,
            Value::Binary(_) => TypeTag::Binary,
            Value::List { .. } => TypeTag::List,
            Value::Set { .. } => TypeTag::Set,
            Value::Map { .. } => TypeTag::Map,
            Value::Struct(_) => TypeTag::Struct,
        }
    }

    /// 结构体字段列表。
    #[must_use]
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// 按 id 查找结构体字段。
    #[must_use]
    pub fn field(&self, id: i16) -> Option<&Field> {
        self.fields()?.iter().find(|field| field.id == id)
    }

    /// 字节串按 UTF-8 解释。
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Binary(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// 任意宽度整数提升为 `i64`。
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    /// 布尔值。
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// 结构体字段。
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// 字段 id。
    pub id: i16,
    /// Schema 提供的字段名；通用解码时为 `None`。
    pub name: Option<Arc<str>>,
    /// 字段值。
    pub value: Value,
}

impl Field {
    /// 无名字段。
    #[must_use]
    pub fn new(id: i16, value: Value) -> Self {
        Self {
            id,
            name: None,
            value,
        }
    }

    /// 带名字段。
    #[must_use]
    pub fn named(id: i16, name: impl Into<Arc<str>>, value: Value) -> Self {
        Self {
            id,
            name: Some(name.into()),
            value,
        }
    }
}
