//! 内置的 `TApplicationException` 声明。
//!
//! `Exception` 类型的消息体总是框架层异常：`1: string message`、`2: i32 type`，
//! 与方法是否注册无关。

use std::sync::{Arc, OnceLock};

use crate::value::Value;

use super::{FieldSchema, SchemaType, StructSchema};

/// 框架层异常类型。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ApplicationExceptionType {
    /// 0
    Unknown,
    /// 1
    UnknownMethod,
    /// 2
    InvalidMessageType,
    /// 3
    WrongMethodName,
    /// 4
    BadSequenceId,
    /// 5
    MissingResult,
    /// 6
    InternalError,
    /// 7
    ProtocolError,
    /// 8
    InvalidTransform,
    /// 9
    InvalidProtocol,
    /// 10
    UnsupportedClientType,
    /// 未公开的取值。
    Other(i32),
}

impl ApplicationExceptionType {
    /// 由线上取值转换。
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            other => Self::Other(other),
        }
    }

    /// 公开名称。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::UnknownMethod => "UNKNOWN_METHOD",
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::WrongMethodName => "WRONG_METHOD_NAME",
            Self::BadSequenceId => "BAD_SEQUENCE_ID",
            Self::MissingResult => "MISSING_RESULT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InvalidTransform => "INVALID_TRANSFORM",
            Self::InvalidProtocol => "INVALID_PROTOCOL",
            Self::UnsupportedClientType => "UNSUPPORTED_CLIENT_TYPE",
            Self::Other(_) => "OTHER",
        }
    }
}

/// 解释后的框架层异常。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplicationException {
    /// 异常描述。
    pub message: Option<String>,
    /// 异常类型；缺省为 `Unknown`。
    pub kind: ApplicationExceptionType,
}

impl ApplicationException {
    /// 从解码后的消息体提取；不是结构体时返回 `None`。
    #[must_use]
    pub fn from_value(body: &Value) -> Option<Self> {
        body.fields()?;
        let message = body
            .field(1)
            .and_then(|f| f.value.as_str())
            .map(str::to_owned);
        let kind = body
            .field(2)
            .and_then(|f| match f.value {
                Value::I32(raw) => Some(ApplicationExceptionType::from_i32(raw)),
                _ => None,
            })
            .unwrap_or(ApplicationExceptionType::Unknown);
        Some(Self { message, kind })
    }
}

/// `TApplicationException` 的结构体声明（进程内共享）。
#[must_use]
pub fn application_exception_schema() -> Arc<StructSchema> {
    static SCHEMA: OnceLock<Arc<StructSchema>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(StructSchema {
                name: Arc::from("TApplicationException"),
                fields: vec![
                    FieldSchema::optional(1, "message", SchemaType::String),
                    FieldSchema::optional(2, "type", SchemaType::I32),
                ],
            })
        })
        .clone()
}
