//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义 Thrift 解码过程中的致命错误（[`ThriftError`]）与非致命诊断（[`Diagnostic`]），
//!   让流式解码循环、CLI 与测试以统一的 `kind + offset + detail` 三元组定位问题字节；
//! - 配置与 Schema 加载失败拥有独立的错误域（[`ConfigError`]/[`SchemaError`]），避免与线协议错误混淆。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接接入 `std::error::Error` 生态；
//! - “数据不足”不是错误：它由 [`DecodeOutcome::Incomplete`](crate::DecodeOutcome::Incomplete)
//!   表达，永远不会出现在本模块中；
//! - [`ErrorKind::as_str`] 输出稳定的点分错误码，供日志与告警聚合使用。

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// 解码失败或诊断的分类。
///
/// - **契约 (What)**：除 [`ErrorKind::WrongFieldId`]、[`ErrorKind::InvalidUtf8`] 与
///   [`ErrorKind::UnexpectedReplyShape`] 只作为 [`Diagnostic`] 出现外，其余分类都会终止当前消息；
/// - **风险 (Trade-offs)**：枚举标记为 `non_exhaustive`，新增协议校验不会破坏下游 `match`。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 线上类型与 Schema 声明（或容器元素声明）不一致。
    WrongType,
    /// 字段 id 出现在 Schema 游标之后的位置，即乱序到达；仅告警。
    WrongFieldId,
    /// 字符串或容器长度为负。
    NegativeLength,
    /// varint 超出目标宽度允许的最大字节数。
    VarintTooLarge,
    /// 容器/结构体嵌套超过 `nested_type_depth`。
    TooManyNestedSubtypes,
    /// 帧内消息在帧结束前仍需要更多字节。
    FrameTooShort,
    /// 消息结束后帧内仍有剩余字节，或帧长度超过配置上限。
    FrameTooLong,
    /// 必填字段在 Stop 标记之前未出现。
    StructFieldNotInSequence,
    /// 协议标识或版本号不受支持。
    ProtocolVersionMismatch,
    /// 类型编号不在 Thrift 类型表内。
    UnknownType,
    /// 消息类型不在 1..=4 范围内。
    InvalidMessageType,
    /// 报文在线上存在但未被抓取，无法恢复。
    CaptureTruncated,
    /// 字节流不像 Thrift 消息。
    NotThrift,
    /// 方法名长度超过 `max_method_name_len`。
    MethodNameTooLong,
    /// 方法名或声明为 `string` 的字段不是合法 UTF-8；仅告警。
    InvalidUtf8,
    /// T_REPLY 结果结构体中设置了多个字段；仅告警。
    UnexpectedReplyShape,
}

impl ErrorKind {
    /// 返回稳定的点分错误码。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::WrongType => "thrift.wrong_type",
            ErrorKind::WrongFieldId => "thrift.wrong_field_id",
            ErrorKind::NegativeLength => "thrift.negative_length",
            ErrorKind::VarintTooLarge => "thrift.varint_too_large",
            ErrorKind::TooManyNestedSubtypes => "thrift.too_many_nested_subtypes",
            ErrorKind::FrameTooShort => "thrift.frame_too_short",
            ErrorKind::FrameTooLong => "thrift.frame_too_long",
            ErrorKind::StructFieldNotInSequence => "thrift.struct_field_not_in_sequence",
            ErrorKind::ProtocolVersionMismatch => "thrift.protocol_version_mismatch",
            ErrorKind::UnknownType => "thrift.unknown_type",
            ErrorKind::InvalidMessageType => "thrift.invalid_message_type",
            ErrorKind::CaptureTruncated => "thrift.capture_truncated",
            ErrorKind::NotThrift => "thrift.not_thrift",
            ErrorKind::MethodNameTooLong => "thrift.method_name_too_long",
            ErrorKind::InvalidUtf8 => "thrift.invalid_utf8",
            ErrorKind::UnexpectedReplyShape => "thrift.unexpected_reply_shape",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 终止当前消息解码的协议错误。
///
/// # 教案式说明
/// - **意图 (Why)**：携带分类、出错字节的绝对偏移与人类可读细节，使部分输出与错误能够在
///   展示层对齐到同一字节位置；
/// - **契约 (What)**：`offset` 相对于调用方传入的 [`ByteWindow`](crate::ByteWindow) 起点；
/// - **设计权衡 (Trade-offs)**：`detail` 使用 `Cow<'static, str>`，常见路径零分配，
///   需要拼接上下文时才分配。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind} at offset {offset}: {detail}")]
pub struct ThriftError {
    kind: ErrorKind,
    offset: usize,
    detail: Cow<'static, str>,
}

impl ThriftError {
    /// 构造错误。
    pub fn new(kind: ErrorKind, offset: usize, detail: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            offset,
            detail: detail.into(),
        }
    }

    /// 错误分类。
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 出错字节的偏移。
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 人类可读细节。
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// 非致命的解码发现，例如乱序字段或非法 UTF-8 方法名。
///
/// 诊断不会中断解码：它们写入 [`DecodeLog`](crate::DecodeLog)，并在记录时通过
/// `tracing::warn!` 输出。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    kind: ErrorKind,
    offset: usize,
    detail: Cow<'static, str>,
}

impl Diagnostic {
    /// 构造诊断。
    pub fn new(kind: ErrorKind, offset: usize, detail: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            offset,
            detail: detail.into(),
        }
    }

    /// 诊断分类。
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 相关字节的偏移。
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 人类可读细节。
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}: {}", self.kind, self.offset, self.detail)
    }
}

/// 解码配置校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法或字段类型错误。
    #[error("failed to parse decoder configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值超出允许范围。
    #[error("invalid decoder configuration `{field}`: {reason}")]
    Invalid {
        /// 出错的配置项。
        field: &'static str,
        /// 约束说明。
        reason: String,
    },
}

/// 声明式 Schema 加载失败。
#[derive(Debug, Error)]
pub enum SchemaError {
    /// TOML 语法或结构错误。
    #[error("failed to parse schema description: {0}")]
    Parse(#[from] toml::de::Error),
    /// 类型表达式无法识别。
    #[error("unknown type `{ty}` in `{context}`")]
    UnknownType {
        /// 原始类型表达式。
        ty: String,
        /// 出现位置（结构体或方法名）。
        context: String,
    },
    /// 同一结构体内字段 id 重复。
    #[error("duplicate field id {id} in `{context}`")]
    DuplicateFieldId {
        /// 重复的 id。
        id: i16,
        /// 出现位置。
        context: String,
    },
    /// 同名结构体或方法重复定义。
    #[error("`{name}` is defined more than once")]
    DuplicateDefinition {
        /// 重复的名称。
        name: String,
    },
    /// 结构体直接或间接引用自身。
    #[error("struct `{name}` is recursive; recursive schemas are not supported")]
    RecursiveStruct {
        /// 形成环的结构体。
        name: String,
    },
}
