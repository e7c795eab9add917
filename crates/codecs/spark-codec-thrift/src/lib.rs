#![warn(missing_docs)]

//! # spark-codec-thrift
//!
//! ## 教案目的（Why）
//! - **定位**：Apache Thrift RPC 线协议解码器，服务于协议分析：给定抓包得到的原始字节，
//!   还原消息头、方法名与带完整类型的值树，并在输入损坏或截断时给出部分结果而非崩溃；
//! - **覆盖范围**：旧式二进制、严格二进制与紧凑协议三种编码，分帧（4 字节长度前缀）或未分帧传输，
//!   以及按网络分段逐块到达的增量输入。
//!
//! ## 交互契约（What）
//! - **入口**：[`ThriftDecoder::decode_message`] 解码一条消息，[`ThriftDecoder::decode_stream`]
//!   逐条解码一个窗口，[`StreamDecoder`] 自带重组缓冲区；
//! - **三态结果**：每一步返回 `Result<DecodeOutcome<T>, ThriftError>`，`Incomplete(Needed)` 是
//!   “等待更多字节”，与错误严格区分，任何组件都不得吞掉它；
//! - **扩展点**：调用方以 [`SchemaRegistry`]（可从 TOML 加载）为方法声明参数/结果结构体，
//!   未注册的方法走通用解码；
//! - **输出**：除值树外，每个元素的标签、类型、字节区间与取值记录在 [`DecodeLog`] 中，
//!   可重放到任意 [`DecodeSink`]（[`TextSink`]、[`TracingSink`]）。
//!
//! ## 实现策略（How）
//! - [`detect`] 只读探测编码与分帧；[`header`] 实现两套字段/容器头语法；
//!   [`generic`] 递归解码自描述值；[`schema`] 在其上叠加声明匹配；[`stream`] 组合成消息与流循环；
//! - 嵌套深度、帧长度、方法名长度与容器声明个数都在分配前校验，攻击者控制的长度字段不会
//!   导致过深递归或超大分配。
//!
//! ## 风险提示（Trade-offs）
//! - 旧式二进制没有魔数，与分帧流量的区分依赖方法名可打印性，属于概率性判断；
//! - 本 crate 不做传输 I/O，也不生成代码。

pub mod config;
pub mod detect;
pub mod encode;
pub mod error;
pub mod generic;
pub mod header;
pub mod outcome;
pub mod reader;
pub mod schema;
pub mod sink;
pub mod stream;
pub mod types;
pub mod value;
pub mod varint;

pub use config::{BinaryDecodeMode, DecoderConfig};
pub use detect::{DetectMode, Detection, detect, detect_at};
pub use encode::{Encoder, FieldIdStyle, frame};
pub use error::{ConfigError, Diagnostic, ErrorKind, SchemaError, ThriftError};
pub use generic::decode_value;
pub use header::{FieldHeader, MessageHeader, decode_message_header};
pub use outcome::{DecodeOutcome, DecodeResult, Needed};
pub use reader::{ByteSpan, ByteWindow, DecodeContext, DecodeCursor};
pub use schema::{
    ApplicationException, ApplicationExceptionType, FieldSchema, MethodSchema, ReplyOutcome,
    SchemaRegistry, SchemaType, StructSchema, decode_struct, reply_outcome,
};
pub use sink::{DecodeLog, DecodeSink, Label, LogEntry, Record, TextSink, TracingSink};
pub use stream::{
    Message, MessageFailure, MessageReport, StreamBatch, StreamDecoder, StreamProgress,
    ThriftDecoder,
};
pub use types::{Framing, MessageType, TypeTag, WireEncoding};
pub use value::{Field, Value};
