//! 紧凑协议使用的 varint 与 zigzag 编解码。
//!
//! ## 实现策略（How）
//! - varint：每字节 7 位有效数据，小端分组，最高位为续位标记；
//! - zigzag：`(n << 1) ^ (n >> (w - 1))`，把绝对值小的负数映射为小的无符号数；
//! - 解码区分“数据不足”（[`VarintOutcome::NeedMore`]）与“超出目标宽度”
//!   （[`VarintOutcome::TooLarge`]），后者是协议错误：字节数超限，或字节数合法但
//!   携带的有效位超过 16/32/64 位，都不会被静默截断。

use bytes::BufMut;

/// 16 位目标最多 3 字节。
pub const MAX_VARINT16_LEN: usize = 3;
/// 32 位目标最多 5 字节。
pub const MAX_VARINT32_LEN: usize = 5;
/// 64 位目标最多 10 字节。
pub const MAX_VARINT64_LEN: usize = 10;

/// varint 解码结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VarintOutcome {
    /// 成功读取 `len` 字节。
    Consumed {
        /// 消费的字节数。
        len: usize,
        /// 解码出的无符号值，不超过目标宽度。
        value: u64,
    },
    /// 在终止字节出现之前缓冲已耗尽。
    NeedMore,
    /// 前 `max_bytes` 个字节都带续位标记，或值超出目标宽度。
    TooLarge,
}

/// `max_bytes` 对应的目标位宽。
#[must_use]
pub const fn target_bits(max_bytes: usize) -> u32 {
    match max_bytes {
        MAX_VARINT16_LEN => 16,
        MAX_VARINT32_LEN => 32,
        _ => 64,
    }
}

/// 从 `buf` 开头解码一个 varint，结果不超过 [`target_bits`]`(max_bytes)` 位。
#[must_use]
pub fn decode_varint(buf: &[u8], max_bytes: usize) -> VarintOutcome {
    let bits = target_bits(max_bytes);
    let mut value = 0u64;
    for (idx, &byte) in buf.iter().take(max_bytes).enumerate() {
        let shift = 7 * idx as u32;
        let group = u64::from(byte & 0x7f);
        // 本组中落在目标宽度之外的位。
        if group.checked_shr(bits.saturating_sub(shift)).unwrap_or(0) != 0 {
            return VarintOutcome::TooLarge;
        }
        if shift < bits {
            value |= group << shift;
        }
        if byte & 0x80 == 0 {
            return VarintOutcome::Consumed {
                len: idx + 1,
                value,
            };
        }
    }
    if buf.len() >= max_bytes {
        VarintOutcome::TooLarge
    } else {
        VarintOutcome::NeedMore
    }
}

/// 写入一个 varint。
pub fn encode_varint(mut value: u64, dst: &mut impl BufMut) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// zigzag 解码（任意宽度，调用方截断到目标宽度）。
#[must_use]
pub const fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// 16 位 zigzag 编码。
#[must_use]
pub const fn zigzag_encode_i16(n: i16) -> u16 {
    ((n << 1) ^ (n >> 15)) as u16
}

/// 32 位 zigzag 编码。
#[must_use]
pub const fn zigzag_encode_i32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// 64 位 zigzag 编码。
#[must_use]
pub const fn zigzag_encode_i64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_and_multi_byte_values() {
        assert_eq!(
            decode_varint(&[0x00], MAX_VARINT32_LEN),
            VarintOutcome::Consumed { len: 1, value: 0 }
        );
        assert_eq!(
            decode_varint(&[0xac, 0x02], MAX_VARINT32_LEN),
            VarintOutcome::Consumed { len: 2, value: 300 }
        );
    }

    #[test]
    fn continuation_past_limit_is_too_large() {
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0xff], MAX_VARINT16_LEN),
            VarintOutcome::TooLarge
        );
        assert_eq!(
            decode_varint(&[0xff; 11], MAX_VARINT64_LEN),
            VarintOutcome::TooLarge
        );
    }

    #[test]
    fn terminated_value_wider_than_target_is_too_large() {
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0xff, 0xff, 0x7f], MAX_VARINT32_LEN),
            VarintOutcome::TooLarge
        );
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0x04], MAX_VARINT16_LEN),
            VarintOutcome::TooLarge
        );
        let mut wide = [0x80; MAX_VARINT64_LEN];
        wide[9] = 0x02;
        assert_eq!(decode_varint(&wide, MAX_VARINT64_LEN), VarintOutcome::TooLarge);
        // 各宽度的最大值仍然合法。
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0x03], MAX_VARINT16_LEN),
            VarintOutcome::Consumed {
                len: 3,
                value: 0xffff
            }
        );
        assert_eq!(
            decode_varint(&[0xff, 0xff, 0xff, 0xff, 0x0f], MAX_VARINT32_LEN),
            VarintOutcome::Consumed {
                len: 5,
                value: 0xffff_ffff
            }
        );
        let mut widest = [0xff; MAX_VARINT64_LEN];
        widest[9] = 0x01;
        assert_eq!(
            decode_varint(&widest, MAX_VARINT64_LEN),
            VarintOutcome::Consumed {
                len: 10,
                value: u64::MAX
            }
        );
    }

    #[test]
    fn running_out_first_needs_more() {
        assert_eq!(decode_varint(&[0x80, 0x80], MAX_VARINT32_LEN), VarintOutcome::NeedMore);
        assert_eq!(decode_varint(&[], MAX_VARINT16_LEN), VarintOutcome::NeedMore);
    }

    #[test]
    fn zigzag_small_magnitudes() {
        assert_eq!(zigzag_encode_i32(0), 0);
        assert_eq!(zigzag_encode_i32(-1), 1);
        assert_eq!(zigzag_encode_i32(1), 2);
        assert_eq!(zigzag_encode_i32(-2), 3);
        assert_eq!(zigzag_encode_i16(i16::MIN), u16::MAX);
        assert_eq!(zigzag_decode(3), -2);
    }

    proptest! {
        #[test]
        fn i64_survives_zigzag_varint(n in any::<i64>()) {
            let mut buf = Vec::new();
            encode_varint(zigzag_encode_i64(n), &mut buf);
            prop_assert!(buf.len() <= MAX_VARINT64_LEN);
            match decode_varint(&buf, MAX_VARINT64_LEN) {
                VarintOutcome::Consumed { len, value } => {
                    prop_assert_eq!(len, buf.len());
                    prop_assert_eq!(zigzag_decode(value), n);
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn i16_fits_three_bytes(n in any::<i16>()) {
            let mut buf = Vec::new();
            encode_varint(u64::from(zigzag_encode_i16(n)), &mut buf);
            prop_assert!(buf.len() <= MAX_VARINT16_LEN);
            match decode_varint(&buf, MAX_VARINT16_LEN) {
                VarintOutcome::Consumed { value, .. } => prop_assert_eq!(zigzag_decode(value) as i16, n),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
