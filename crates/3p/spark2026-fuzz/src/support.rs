//! 脚本与 fuzz target 共用的小工具：分片切分、十六进制正文收集、选项解析。

use std::collections::BTreeMap;

/// 按给定切点把连续字节拆成若干块，模拟 TCP 分段到达。
///
/// - 切点相对于整段输入，越界或非递增的切点会被忽略；
/// - 返回的各块首尾相接恰好覆盖输入，空输入返回空列表。
#[must_use]
pub fn split_at_points<'a>(bytes: &'a [u8], points: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(points.len() + 1);
    let mut start = 0usize;
    for &point in points {
        if point <= start || point >= bytes.len() {
            continue;
        }
        chunks.push(&bytes[start..point]);
        start = point;
    }
    if start < bytes.len() {
        chunks.push(&bytes[start..]);
    }
    chunks
}

/// 由 fuzzer 提供的字节推导切点：每个字节作为一段长度（0 视为 1）。
#[must_use]
pub fn points_from_lengths(lengths: &[u8], total: usize) -> Vec<usize> {
    let mut points = Vec::with_capacity(lengths.len());
    let mut at = 0usize;
    for &len in lengths {
        at += usize::from(len.max(1));
        if at >= total {
            break;
        }
        points.push(at);
    }
    points
}

/// 收集正文中全部 `hex:` 行并解码；任一行不是合法十六进制即返回 `None`。
pub fn collect_hex_payload(lines: &[&str]) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for raw in lines {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(data) = trimmed.strip_prefix("hex:") {
            let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            bytes.extend(hex::decode(cleaned).ok()?);
        }
    }
    Some(bytes)
}

/// 将 `a,b,c` 形式的文本解析为 usize 列表，跳过无法解析的片段。
#[must_use]
pub fn parse_usize_list(text: &str) -> Vec<usize> {
    text.split(',')
        .filter_map(|segment| segment.trim().parse::<usize>().ok())
        .collect()
}

/// 解析 `key=value` 选项，键统一为小写；遇到 `#` 停止。
pub fn parse_options<'a>(tokens: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    for token in tokens {
        if token.starts_with('#') {
            break;
        }
        if let Some((key, value)) = token.split_once('=') {
            options.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    options
}
