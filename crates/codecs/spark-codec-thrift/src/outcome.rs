//! 三态解码结果：`Complete` / `Incomplete(Needed)` / `Err`。
//!
//! # 设计背景（Why）
//! - 沿用 `Decoder` 契约中的 `Complete/Incomplete` 语义，让“数据不足”与协议错误在类型层面彻底分离，
//!   调用方无需比较整型返回码；
//! - `Incomplete` 额外携带 [`Needed`]，使重组层能够精确地再攒 `n` 个字节后重试。
//!
//! # 契约说明（What）
//! - **前置条件**：返回 `Incomplete` 的解码函数不得让调用方观察到任何已提交的副作用，
//!   调用方从同一偏移重新解析即可；
//! - **后置条件**：`Needed::Size(n)` 在分帧模式下是精确值，在非分帧模式下是下界。

use std::num::NonZeroUsize;

use crate::error::ThriftError;

/// 继续解码还需要的字节数。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Needed {
    /// 至少还需要这么多字节。
    Size(NonZeroUsize),
    /// 至少还需要 1 个字节，但无法给出更准确的估计。
    Unknown,
}

impl Needed {
    /// 由字节数构造；0 退化为 [`Needed::Unknown`]。
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        NonZeroUsize::new(bytes).map_or(Needed::Unknown, Needed::Size)
    }

    /// 已知的最少字节数（`Unknown` 视为 1）。
    #[must_use]
    pub fn at_least(self) -> usize {
        match self {
            Needed::Size(n) => n.get(),
            Needed::Unknown => 1,
        }
    }
}

/// 一次尝试解码的结果状态。
///
/// # 逻辑解析（How）
/// - `Complete(T)`：成功产出一个对象，游标已推进到对象末尾；
/// - `Incomplete(Needed)`：输入不足，调用方应在收到更多字节后从原偏移重试。
#[must_use]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeOutcome<T> {
    /// 成功解析出完整对象。
    Complete(T),
    /// 数据不足，等待更多输入。
    Incomplete(Needed),
}

impl<T> DecodeOutcome<T> {
    /// 对完整结果做映射，`Incomplete` 原样透传。
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DecodeOutcome<U> {
        match self {
            DecodeOutcome::Complete(value) => DecodeOutcome::Complete(f(value)),
            DecodeOutcome::Incomplete(needed) => DecodeOutcome::Incomplete(needed),
        }
    }

    /// 是否已完整解析。
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, DecodeOutcome::Complete(_))
    }

    /// 取出完整结果。
    #[must_use]
    pub fn complete(self) -> Option<T> {
        match self {
            DecodeOutcome::Complete(value) => Some(value),
            DecodeOutcome::Incomplete(_) => None,
        }
    }

    /// 取出缺口估计。
    #[must_use]
    pub fn needed(&self) -> Option<Needed> {
        match self {
            DecodeOutcome::Complete(_) => None,
            DecodeOutcome::Incomplete(needed) => Some(*needed),
        }
    }
}

/// 解码函数的统一返回类型。
pub type DecodeResult<T> = Result<DecodeOutcome<T>, ThriftError>;

/// 展开 [`DecodeResult`]：完整值继续执行，`Incomplete` 与错误立即向上返回。
macro_rules! ready {
    ($e:expr $(,)?) => {
        match $e {
            Ok($crate::outcome::DecodeOutcome::Complete(value)) => value,
            Ok($crate::outcome::DecodeOutcome::Incomplete(needed)) => {
                return Ok($crate::outcome::DecodeOutcome::Incomplete(needed));
            }
            Err(err) => return Err(err),
        }
    };
}

pub(crate) use ready;
