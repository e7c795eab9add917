//! 线上编码与分帧探测。
//!
//! # 教案目的（Why）
//! - Thrift 没有统一的魔数：旧式二进制以方法名长度开头，分帧流量以帧长度开头，
//!   二者都是高位为 0 的大端整数。探测器只读不消费，综合版本字、帧长度合理性与
//!   方法名可打印性做出判断；
//! - 可打印性判断是概率性的（一个恰好可打印的帧长度会被误认为方法名），这是协议本身
//!   的歧义，探测结果应视为启发式。
//!
//! # 判定顺序（How）
//! 1. 首字节高位置位：严格二进制（`0x80 0x01`）或紧凑协议（`0x82`），否则版本不匹配；
//! 2. 否则读 4 字节长度 `L`：若 `L` 是合理帧长且偏移 4 处是严格/紧凑消息，判为分帧；
//! 3. 否则在“未分帧旧式二进制”（名称在偏移 4）与“分帧旧式二进制”（名称长度在偏移 4、
//!    名称在偏移 8）之间，以方法名可打印性与其后的消息类型字节裁决。

use serde::Deserialize;

use crate::config::DecoderConfig;
use crate::error::{ErrorKind, ThriftError};
use crate::header;
use crate::outcome::{DecodeOutcome, DecodeResult, ready};
use crate::reader::{ByteWindow, DecodeContext, DecodeCursor};
use crate::sink::is_printable;
use crate::types::{
    COMPACT_PROTOCOL_ID, COMPACT_TYPE_SHIFT, COMPACT_VERSION, COMPACT_VERSION_MASK, Framing,
    MESSAGE_TYPE_MASK, MIN_MESSAGE_LEN, MessageType, WireEncoding,
};

/// 探测模式。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectMode {
    /// 调用方确定流量是 Thrift：严格/紧凑消息只按版本字判定。
    #[default]
    Mandatory,
    /// 在未知端口上试探：已到达的字节与 Thrift 矛盾时报告 `NotThrift`，并对严格/紧凑方法名
    /// 做可打印性检查；字节不足以判断时仍返回 `Incomplete`。
    Heuristic,
}

/// 探测结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Detection {
    /// 线上编码。
    pub encoding: WireEncoding,
    /// 分帧方式。
    pub framing: Framing,
}

/// 探测窗口起点处的消息。
pub fn detect(window: &ByteWindow<'_>, config: &DecoderConfig) -> DecodeResult<Detection> {
    detect_at(window, 0, config)
}

/// 探测 `at` 处的消息；不推进任何游标。
pub fn detect_at(
    window: &ByteWindow<'_>,
    at: usize,
    config: &DecoderConfig,
) -> DecodeResult<Detection> {
    let probe = Probe {
        window,
        at,
        config,
    };
    match config.detect_mode {
        DetectMode::Mandatory => probe.run(),
        DetectMode::Heuristic => match probe.run() {
            Ok(DecodeOutcome::Complete(detection)) => {
                let payload_at = match detection.framing {
                    Framing::None => at,
                    Framing::LengthPrefixed(_) => at + 4,
                };
                if ready!(probe.name_printable(payload_at, detection.encoding)) {
                    Ok(DecodeOutcome::Complete(detection))
                } else {
                    Err(not_thrift(at, "method name is not printable"))
                }
            }
            Ok(DecodeOutcome::Incomplete(needed)) => Ok(DecodeOutcome::Incomplete(needed)),
            Err(err) => Err(not_thrift(at, err.detail().to_owned())),
        },
    }
}

/// 帧边界已知时，识别 `at` 处帧负载的编码。
pub(crate) fn payload_encoding(
    window: &ByteWindow<'_>,
    at: usize,
    config: &DecoderConfig,
) -> DecodeResult<WireEncoding> {
    Probe {
        window,
        at,
        config,
    }
    .payload_encoding(at)
}

fn not_thrift(at: usize, detail: impl Into<std::borrow::Cow<'static, str>>) -> ThriftError {
    ThriftError::new(ErrorKind::NotThrift, at, detail)
}

struct Probe<'p, 'a> {
    window: &'p ByteWindow<'a>,
    at: usize,
    config: &'p DecoderConfig,
}

impl Probe<'_, '_> {
    fn run(&self) -> DecodeResult<Detection> {
        if self.config.framed {
            let len = ready!(self.u32_at(self.at));
            let encoding = ready!(self.payload_encoding(self.at + 4));
            return Ok(DecodeOutcome::Complete(Detection {
                encoding,
                framing: Framing::LengthPrefixed(len),
            }));
        }
        let first = ready!(self.byte(self.at));
        if first & 0x80 != 0 {
            return match ready!(self.versioned(self.at)) {
                Some(encoding) => Ok(DecodeOutcome::Complete(Detection {
                    encoding,
                    framing: Framing::None,
                })),
                None => Err(ThriftError::new(
                    ErrorKind::ProtocolVersionMismatch,
                    self.at,
                    format!("unrecognised protocol id {first:#04x}"),
                )),
            };
        }

        let len = ready!(self.u32_at(self.at));
        let plausible_frame =
            len as usize >= MIN_MESSAGE_LEN && len <= self.config.max_frame_length;
        if plausible_frame && ready!(self.byte(self.at + 4)) & 0x80 != 0 {
            if let Some(encoding) = ready!(self.versioned(self.at + 4)) {
                return Ok(DecodeOutcome::Complete(Detection {
                    encoding,
                    framing: Framing::LengthPrefixed(len),
                }));
            }
        }
        if ready!(self.old_binary_plausible(self.at)) {
            return Ok(DecodeOutcome::Complete(Detection {
                encoding: WireEncoding::BinaryOld,
                framing: Framing::None,
            }));
        }
        if plausible_frame && ready!(self.old_binary_plausible(self.at + 4)) {
            return Ok(DecodeOutcome::Complete(Detection {
                encoding: WireEncoding::BinaryOld,
                framing: Framing::LengthPrefixed(len),
            }));
        }
        Err(not_thrift(self.at, "no known thrift encoding matches"))
    }

    /// 分帧已知时识别帧内负载的编码。
    fn payload_encoding(&self, at: usize) -> DecodeResult<WireEncoding> {
        let first = ready!(self.byte(at));
        if first & 0x80 != 0 {
            return match ready!(self.versioned(at)) {
                Some(encoding) => Ok(DecodeOutcome::Complete(encoding)),
                None => Err(ThriftError::new(
                    ErrorKind::ProtocolVersionMismatch,
                    at,
                    format!("unrecognised protocol id {first:#04x}"),
                )),
            };
        }
        Ok(DecodeOutcome::Complete(WireEncoding::BinaryOld))
    }

    /// 识别 `at` 处的严格二进制/紧凑协议头。
    fn versioned(&self, at: usize) -> DecodeResult<Option<WireEncoding>> {
        let first = ready!(self.byte(at));
        let encoding = match first {
            0x80 => {
                let word = ready!(self.bytes(at, 4));
                let valid = word[1] == 0x01 && word[2] == 0 && valid_type(word[3]);
                valid.then_some(WireEncoding::BinaryStrict)
            }
            COMPACT_PROTOCOL_ID => {
                let second = ready!(self.byte(at + 1));
                let valid = second & COMPACT_VERSION_MASK == COMPACT_VERSION
                    && valid_type(second >> COMPACT_TYPE_SHIFT);
                valid.then_some(WireEncoding::Compact)
            }
            _ => None,
        };
        Ok(DecodeOutcome::Complete(encoding))
    }

    /// `at` 处是否像一条旧式二进制消息：合理的名称长度、可打印名称、合法类型字节。
    fn old_binary_plausible(&self, at: usize) -> DecodeResult<bool> {
        let raw = ready!(self.u32_at(at)) as usize;
        if raw == 0 || raw > self.config.max_method_name_len {
            return Ok(DecodeOutcome::Complete(false));
        }
        let name = ready!(self.bytes(at + 4, raw));
        let printable = std::str::from_utf8(name).is_ok_and(is_printable);
        if !printable {
            return Ok(DecodeOutcome::Complete(false));
        }
        let message_type = ready!(self.byte(at + 4 + raw));
        Ok(DecodeOutcome::Complete(valid_type(message_type)))
    }

    /// 启发式模式下解析消息头并检查方法名；消息头未到齐时返回 `Incomplete`。
    fn name_printable(&self, at: usize, encoding: WireEncoding) -> DecodeResult<bool> {
        let mut ctx = DecodeContext::new(*self.window, encoding, self.config);
        let mut cursor = DecodeCursor::new(at);
        let printable = match header::decode_message_header(&mut ctx, &mut cursor) {
            Ok(DecodeOutcome::Complete(parsed)) => {
                ctx.log().diagnostics().next().is_none() && is_printable(&parsed.method_name)
            }
            Ok(DecodeOutcome::Incomplete(needed)) => return Ok(DecodeOutcome::Incomplete(needed)),
            Err(_) => false,
        };
        Ok(DecodeOutcome::Complete(printable))
    }

    fn bytes(&self, at: usize, n: usize) -> DecodeResult<&[u8]> {
        let mut cursor = DecodeCursor::new(at);
        self.window.bytes(&mut cursor, n)
    }

    fn byte(&self, at: usize) -> DecodeResult<u8> {
        self.bytes(at, 1).map(|o| o.map(|b| b[0]))
    }

    fn u32_at(&self, at: usize) -> DecodeResult<u32> {
        let raw = ready!(self.bytes(at, 4));
        Ok(DecodeOutcome::Complete(u32::from_be_bytes([
            raw[0], raw[1], raw[2], raw[3],
        ])))
    }
}

fn valid_type(raw: u8) -> bool {
    raw & !MESSAGE_TYPE_MASK == 0 && MessageType::from_wire(raw).is_some()
}
