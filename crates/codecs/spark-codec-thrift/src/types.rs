//! Thrift 线协议的静态常量与类型编号表。
//!
//! # 教案目的（Why）
//! - 二进制协议与紧凑协议使用两套不同的类型编号；集中在此处维护不可变的查找表，
//!   解码器只通过 [`TypeTag`] 做穷尽 `match`，避免魔数散落；
//! - 容器元素的“最小线上尺寸”同样属于静态知识，用于在分配前校验声明的元素个数。

use std::fmt;

/// 严格二进制协议版本字（高 16 位）。
pub const BINARY_VERSION_1: u32 = 0x8001_0000;
/// 严格二进制版本掩码。
pub const BINARY_VERSION_MASK: u32 = 0xffff_0000;
/// 紧凑协议标识字节。
pub const COMPACT_PROTOCOL_ID: u8 = 0x82;
/// 紧凑协议版本号。
pub const COMPACT_VERSION: u8 = 1;
/// 紧凑协议第二字节中的版本位。
pub const COMPACT_VERSION_MASK: u8 = 0x1f;
/// 紧凑协议第二字节中消息类型的位移。
pub const COMPACT_TYPE_SHIFT: u8 = 5;
/// 消息类型字节中有效的低 3 位。
pub const MESSAGE_TYPE_MASK: u8 = 0x07;
/// 最短的合法消息（紧凑协议、空方法名、空结构体）：
/// 协议标识 + 类型/版本 + seqid + 名称长度 + Stop。
pub const MIN_MESSAGE_LEN: usize = 5;

/// 线上编码。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WireEncoding {
    /// 无版本字的旧式二进制协议。
    BinaryOld,
    /// 带 `0x8001` 版本字的严格二进制协议。
    BinaryStrict,
    /// 紧凑协议（`0x82`）。
    Compact,
}

impl WireEncoding {
    /// 是否为紧凑协议。
    #[must_use]
    pub const fn is_compact(self) -> bool {
        matches!(self, WireEncoding::Compact)
    }

    /// 展示名称。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WireEncoding::BinaryOld => "binary-old",
            WireEncoding::BinaryStrict => "binary-strict",
            WireEncoding::Compact => "compact",
        }
    }
}

impl fmt::Display for WireEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传输层分帧方式。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Framing {
    /// 消息直接首尾相接。
    None,
    /// 每条消息前带 4 字节大端长度前缀，值为消息字节数。
    LengthPrefixed(u32),
}

/// 消息类型。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    /// 请求。
    Call = 1,
    /// 应答。
    Reply = 2,
    /// 框架层异常（`TApplicationException`）。
    Exception = 3,
    /// 单向请求。
    Oneway = 4,
}

impl MessageType {
    /// 由线上取值（已屏蔽高位）转换。
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::Reply),
            3 => Some(MessageType::Exception),
            4 => Some(MessageType::Oneway),
            _ => None,
        }
    }

    /// 展示名称。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::Call => "CALL",
            MessageType::Reply => "REPLY",
            MessageType::Exception => "EXCEPTION",
            MessageType::Oneway => "ONEWAY",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议无关的类型标签。
///
/// `Stop` 只作为字段头中的结构体终止标记出现，永远不是一个可解码的值。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TypeTag {
    /// 结构体终止标记。
    Stop,
    /// 布尔。
    Bool,
    /// 8 位有符号整数。
    I8,
    /// 64 位浮点。
    Double,
    /// 16 位有符号整数。
    I16,
    /// 32 位有符号整数。
    I32,
    /// 64 位有符号整数。
    I64,
    /// 字节串或 UTF-8 字符串。
    Binary,
    /// 结构体。
    Struct,
    /// 映射。
    Map,
    /// 集合。
    Set,
    /// 列表。
    List,
    /// 16 字节 UUID。
    Uuid,
}

/// 紧凑协议类型半字节 → 类型标签，下标为半字节取值。
///
/// 1/2 分别是 BOOLEAN_TRUE/BOOLEAN_FALSE，都映射到 `Bool`。
static COMPACT_TYPES: [Option<TypeTag>; 16] = [
    Some(TypeTag::Stop),
    Some(TypeTag::Bool),
    Some(TypeTag::Bool),
    Some(TypeTag::I8),
    Some(TypeTag::I16),
    Some(TypeTag::I32),
    Some(TypeTag::I64),
    Some(TypeTag::Double),
    Some(TypeTag::Binary),
    Some(TypeTag::List),
    Some(TypeTag::Set),
    Some(TypeTag::Map),
    Some(TypeTag::Struct),
    Some(TypeTag::Uuid),
    None,
    None,
];

/// 紧凑协议 BOOLEAN_TRUE 半字节，同时也是容器内 `true` 的单字节编码。
pub const COMPACT_BOOLEAN_TRUE: u8 = 1;
/// 紧凑协议 BOOLEAN_FALSE 半字节。
pub const COMPACT_BOOLEAN_FALSE: u8 = 2;

impl TypeTag {
    /// 二进制协议类型编号 → 类型标签。
    #[must_use]
    pub const fn from_binary(id: u8) -> Option<Self> {
        match id {
            0 => Some(TypeTag::Stop),
            2 => Some(TypeTag::Bool),
            3 => Some(TypeTag::I8),
            4 => Some(TypeTag::Double),
            6 => Some(TypeTag::I16),
            8 => Some(TypeTag::I32),
            10 => Some(TypeTag::I64),
            11 => Some(TypeTag::Binary),
            12 => Some(TypeTag::Struct),
            13 => Some(TypeTag::Map),
            14 => Some(TypeTag::Set),
            15 => Some(TypeTag::List),
            16 => Some(TypeTag::Uuid),
            _ => None,
        }
    }

    /// 类型标签 → 二进制协议类型编号。
    #[must_use]
    pub const fn to_binary(self) -> u8 {
        match self {
            TypeTag::Stop => 0,
            TypeTag::Bool => 2,
            TypeTag::I8 => 3,
            TypeTag::Double => 4,
            TypeTag::I16 => 6,
            TypeTag::I32 => 8,
            TypeTag::I64 => 10,
            TypeTag::Binary => 11,
            TypeTag::Struct => 12,
            TypeTag::Map => 13,
            TypeTag::Set => 14,
            TypeTag::List => 15,
            TypeTag::Uuid => 16,
        }
    }

    /// 紧凑协议类型半字节 → 类型标签。
    #[must_use]
    pub fn from_compact(nibble: u8) -> Option<Self> {
        COMPACT_TYPES.get(usize::from(nibble & 0x0f)).copied().flatten()
    }

    /// 类型标签 → 紧凑协议类型半字节；`Bool` 取 BOOLEAN_TRUE（容器元素声明用）。
    #[must_use]
    pub const fn to_compact(self) -> u8 {
        match self {
            TypeTag::Stop => 0,
            TypeTag::Bool => COMPACT_BOOLEAN_TRUE,
            TypeTag::I8 => 3,
            TypeTag::I16 => 4,
            TypeTag::I32 => 5,
            TypeTag::I64 => 6,
            TypeTag::Double => 7,
            TypeTag::Binary => 8,
            TypeTag::List => 9,
            TypeTag::Set => 10,
            TypeTag::Map => 11,
            TypeTag::Struct => 12,
            TypeTag::Uuid => 13,
        }
    }

    /// 是否为容器或结构体（进入时需要增加嵌套深度）。
    #[must_use]
    pub const fn is_nested(self) -> bool {
        matches!(
            self,
            TypeTag::Struct | TypeTag::Map | TypeTag::Set | TypeTag::List
        )
    }

    /// 该类型一个值在给定编码下至少占用的字节数。
    ///
    /// 用于在分配容器前判断“声明个数 × 最小尺寸”是否超出剩余输入。
    #[must_use]
    pub const fn min_wire_size(self, encoding: WireEncoding) -> usize {
        match (self, encoding.is_compact()) {
            (TypeTag::Stop, _) => 0,
            (TypeTag::Bool | TypeTag::I8, _) => 1,
            (TypeTag::Double, _) | (TypeTag::I64, false) => 8,
            (TypeTag::I16, false) => 2,
            (TypeTag::I32, false) => 4,
            (TypeTag::Uuid, _) => 16,
            (TypeTag::Binary, false) => 4,
            (TypeTag::List | TypeTag::Set, false) => 5,
            (TypeTag::Map, false) => 6,
            (
                TypeTag::I16
                | TypeTag::I32
                | TypeTag::I64
                | TypeTag::Binary
                | TypeTag::List
                | TypeTag::Set
                | TypeTag::Map,
                true,
            ) => 1,
            (TypeTag::Struct, _) => 1,
        }
    }

    /// IDL 中的类型名。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TypeTag::Stop => "stop",
            TypeTag::Bool => "bool",
            TypeTag::I8 => "i8",
            TypeTag::Double => "double",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::Binary => "binary",
            TypeTag::Struct => "struct",
            TypeTag::Map => "map",
            TypeTag::Set => "set",
            TypeTag::List => "list",
            TypeTag::Uuid => "uuid",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
