//! 字节窗口、逻辑区间、解码游标与解码上下文。
//!
//! # 教案目的（Why）
//! - 抓包场景下，“线上存在但未被抓取”的字节与“尚未到达”的字节语义完全不同：
//!   前者永远无法恢复（[`ErrorKind::CaptureTruncated`]），后者只需等待
//!   （[`DecodeOutcome::Incomplete`]）。[`ByteWindow`] 用 `captured`/`reported`
//!   两个长度把二者区分开；
//! - [`DecodeCursor`] 是每次解码独占的可变状态，显式地以 `&mut` 穿过递归，
//!   不依赖任何全局量。
//!
//! # 契约说明（What）
//! - 所有读取在越界前先调用 [`ByteWindow::ensure`]，成功时才推进游标，
//!   因此 `Incomplete` 与错误都不会让游标停在半个值中间；
//! - 偏移一律相对于窗口起点。

use std::num::NonZeroUsize;

use crate::config::{DecoderConfig, MAX_NESTED_TYPE_DEPTH};
use crate::error::{ErrorKind, ThriftError};
use crate::outcome::{DecodeOutcome, DecodeResult, Needed, ready};
use crate::sink::DecodeLog;
use crate::types::WireEncoding;
use crate::varint::{VarintOutcome, decode_varint, target_bits};

/// 元素在原始缓冲中的逻辑位置。
///
/// - **Contract**：`offset + len` 不超过窗口的 reported 长度，`len` 可为 0。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteSpan {
    offset: usize,
    len: usize,
}

impl ByteSpan {
    /// 构造新的 `ByteSpan`。
    #[must_use]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// 由半开区间 `[start, end)` 构造；`end < start` 时长度记为 0。
    #[must_use]
    pub const fn between(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            len: end.saturating_sub(start),
        }
    }

    /// 起始偏移。
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// 跨度长度。
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// 是否为空区间。
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 结束位置（开区间）。
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset.saturating_add(self.len)
    }
}

/// 只读字节窗口：已抓取的数据 + 线上报告的总长度。
#[derive(Clone, Copy, Debug)]
pub struct ByteWindow<'a> {
    data: &'a [u8],
    reported_len: usize,
}

impl<'a> ByteWindow<'a> {
    /// 完整抓取的窗口（reported == captured）。
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            reported_len: data.len(),
        }
    }

    /// 抓取被截断的窗口；`reported_len` 小于数据长度时按数据长度计。
    #[must_use]
    pub fn with_reported_len(data: &'a [u8], reported_len: usize) -> Self {
        Self {
            data,
            reported_len: reported_len.max(data.len()),
        }
    }

    /// 已抓取的字节。
    #[must_use]
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// 已抓取长度。
    #[must_use]
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }

    /// 线上报告长度。
    #[must_use]
    pub fn reported_len(&self) -> usize {
        self.reported_len
    }

    /// 抓取是否完整。
    #[must_use]
    pub fn is_fully_captured(&self) -> bool {
        self.data.len() == self.reported_len
    }

    /// 把窗口的线上长度收紧到 `end`，用于把解码限制在一个帧内。
    ///
    /// `end` 之前未抓取的字节仍按截断处理。
    pub(crate) fn limit(&self, end: usize) -> Self {
        Self {
            data: &self.data[..end.min(self.data.len())],
            reported_len: end,
        }
    }

    /// 确认 `[pos, pos + n)` 可读。
    pub(crate) fn ensure(&self, pos: usize, n: usize) -> DecodeResult<()> {
        let captured = self.data.len();
        let end = match pos.checked_add(n) {
            Some(end) => end,
            None => return Ok(DecodeOutcome::Incomplete(Needed::Unknown)),
        };
        if end <= captured {
            return Ok(DecodeOutcome::Complete(()));
        }
        if captured < self.reported_len {
            return Err(ThriftError::new(
                ErrorKind::CaptureTruncated,
                captured,
                format!(
                    "bytes {pos}..{end} were not captured ({captured} of {} bytes present)",
                    self.reported_len
                ),
            ));
        }
        Ok(DecodeOutcome::Incomplete(Needed::new(end - captured)))
    }

    /// 读取 `n` 字节并推进游标。
    pub(crate) fn bytes(&self, cursor: &mut DecodeCursor, n: usize) -> DecodeResult<&'a [u8]> {
        let pos = cursor.position;
        ready!(self.ensure(pos, n));
        cursor.position += n;
        Ok(DecodeOutcome::Complete(&self.data[pos..pos + n]))
    }

    pub(crate) fn array<const N: usize>(&self, cursor: &mut DecodeCursor) -> DecodeResult<[u8; N]> {
        let raw = ready!(self.bytes(cursor, N));
        let mut out = [0u8; N];
        out.copy_from_slice(raw);
        Ok(DecodeOutcome::Complete(out))
    }

    pub(crate) fn u8(&self, cursor: &mut DecodeCursor) -> DecodeResult<u8> {
        self.array::<1>(cursor).map(|o| o.map(|[b]| b))
    }

    pub(crate) fn i16_be(&self, cursor: &mut DecodeCursor) -> DecodeResult<i16> {
        self.array(cursor).map(|o| o.map(i16::from_be_bytes))
    }

    pub(crate) fn i32_be(&self, cursor: &mut DecodeCursor) -> DecodeResult<i32> {
        self.array(cursor).map(|o| o.map(i32::from_be_bytes))
    }

    pub(crate) fn i64_be(&self, cursor: &mut DecodeCursor) -> DecodeResult<i64> {
        self.array(cursor).map(|o| o.map(i64::from_be_bytes))
    }

    /// 读取 varint；`what` 出现在错误细节中。
    pub(crate) fn varint(
        &self,
        cursor: &mut DecodeCursor,
        max_bytes: usize,
        what: &'static str,
    ) -> DecodeResult<u64> {
        let pos = cursor.position;
        let rest = self.data.get(pos..).unwrap_or_default();
        match decode_varint(rest, max_bytes) {
            VarintOutcome::Consumed { len, value } => {
                cursor.position += len;
                Ok(DecodeOutcome::Complete(value))
            }
            VarintOutcome::TooLarge => Err(ThriftError::new(
                ErrorKind::VarintTooLarge,
                pos,
                format!(
                    "{what} varint does not fit in {} bits ({max_bytes} bytes at most)",
                    target_bits(max_bytes)
                ),
            )),
            // 终止字节之前缓冲耗尽：至少还差一个字节。
            VarintOutcome::NeedMore => {
                ready!(self.ensure(self.data.len(), 1));
                Ok(DecodeOutcome::Incomplete(Needed::Size(NonZeroUsize::MIN)))
            }
        }
    }
}

/// 游标回滚点，供 Schema 解码失败后的通用重试使用。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Checkpoint {
    position: usize,
    previous_field_id: i16,
    nesting_depth: u32,
}

/// 每次解码独占的游标。
///
/// # 契约说明（What）
/// - `position`：下一个待读字节的偏移；每个成功步骤恰好推进其消费的字节数；
/// - `previous_field_id`：紧凑协议字段 id 增量的基准，进入结构体时清零、离开时恢复；
/// - `nesting_depth`：当前容器/结构体嵌套层数，进入时递增且不超过配置上限。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeCursor {
    position: usize,
    previous_field_id: i16,
    nesting_depth: u32,
}

impl DecodeCursor {
    /// 从 `position` 开始的新游标。
    #[must_use]
    pub fn new(position: usize) -> Self {
        Self {
            position,
            previous_field_id: 0,
            nesting_depth: 0,
        }
    }

    /// 当前偏移。
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// 上一个成功解码的字段 id。
    #[must_use]
    pub fn previous_field_id(&self) -> i16 {
        self.previous_field_id
    }

    /// 当前嵌套深度。
    #[must_use]
    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position,
            previous_field_id: self.previous_field_id,
            nesting_depth: self.nesting_depth,
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.position = checkpoint.position;
        self.previous_field_id = checkpoint.previous_field_id;
        self.nesting_depth = checkpoint.nesting_depth;
    }

    /// 字段值解码成功后记录其 id。
    pub(crate) fn commit_field(&mut self, field_id: i16) {
        self.previous_field_id = field_id;
    }

    /// 在一层新的容器/结构体内执行 `f`。
    ///
    /// 超过 `max_depth`（不高于 [`MAX_NESTED_TYPE_DEPTH`]）时返回
    /// [`ErrorKind::TooManyNestedSubtypes`]；无论 `f` 的结果如何，返回前都恢复深度，
    /// 结构体作用域内的 `previous_field_id` 也在此保存与恢复。
    pub(crate) fn nested<T>(
        &mut self,
        max_depth: u32,
        offset: usize,
        f: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        let max_depth = max_depth.min(MAX_NESTED_TYPE_DEPTH);
        if self.nesting_depth >= max_depth {
            return Err(ThriftError::new(
                ErrorKind::TooManyNestedSubtypes,
                offset,
                format!("nesting exceeds the configured depth of {max_depth}"),
            ));
        }
        let saved_field_id = std::mem::replace(&mut self.previous_field_id, 0);
        self.nesting_depth += 1;
        let result = f(self);
        self.nesting_depth -= 1;
        self.previous_field_id = saved_field_id;
        result
    }
}

/// 一条消息的解码上下文：窗口、编码、配置与解码日志。
///
/// - **契约 (What)**：上下文只在一条消息内有效；Schema 与配置以共享引用借入，
///   日志由上下文独占，解码结束后通过 [`DecodeContext::into_log`] 取出；
/// - **风险 (Trade-offs)**：编码在构造时固定，旧式/严格二进制的逐消息重新探测由流式层负责。
#[derive(Debug)]
pub struct DecodeContext<'a> {
    window: ByteWindow<'a>,
    encoding: WireEncoding,
    config: &'a DecoderConfig,
    pub(crate) log: DecodeLog,
}

impl<'a> DecodeContext<'a> {
    /// 构造上下文。
    #[must_use]
    pub fn new(window: ByteWindow<'a>, encoding: WireEncoding, config: &'a DecoderConfig) -> Self {
        Self {
            window,
            encoding,
            config,
            log: DecodeLog::new(),
        }
    }

    /// 字节窗口。
    #[must_use]
    pub fn window(&self) -> &ByteWindow<'a> {
        &self.window
    }

    /// 线上编码。
    #[must_use]
    pub fn encoding(&self) -> WireEncoding {
        self.encoding
    }

    /// 解码配置。
    #[must_use]
    pub fn config(&self) -> &'a DecoderConfig {
        self.config
    }

    /// 已累积的日志。
    #[must_use]
    pub fn log(&self) -> &DecodeLog {
        &self.log
    }

    /// 取出日志。
    #[must_use]
    pub fn into_log(self) -> DecodeLog {
        self.log
    }
}
