use std::collections::BTreeMap;
use std::str;

use spark_codec_thrift::{
    ByteWindow, DecoderConfig, DetectMode, StreamDecoder, TextSink, ThriftDecoder,
};

use crate::support::{collect_hex_payload, parse_options, parse_usize_list, split_at_points};

/// 一条脚本的执行摘要，供回归测试断言。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    /// 脚本头部 `expect=` 声明的成功消息条数。
    pub expected: Option<usize>,
    /// 整段解码得到的成功消息条数。
    pub whole: usize,
    /// 按 `split=` 分片喂入 [`StreamDecoder`] 得到的成功消息条数。
    pub chunked: usize,
    /// 整段解码是否出现失败报告或致命错误。
    pub failed: bool,
    /// 整段解码越过的字节数。
    pub consumed: usize,
    /// 脚本正文的总字节数。
    pub total: usize,
}

/// 执行单条 `THRIFT` 脚本。
///
/// - **Why**：极限样本以文本维护，便于审阅与追加；同一入口既服务 fuzz target，也服务 CI 回归；
/// - **How**：
///   1. 将输入解析为 UTF-8 文本，跳过空行与注释，首个有效行须以 `THRIFT` 开头；
///   2. 头部选项：`framed=true|false`、`mode=mandatory|heuristic`、`split=3,10`、`expect=N`；
///   3. 正文中的 `hex:` 行拼接为线上字节，先整段解码并渲染到 [`TextSink`]，再按切点分片喂入
///      [`StreamDecoder`]；
/// - **What**：无法解析的脚本返回 `None`；执行中只断言对任意输入都成立的性质，
///   与 `expect=` 的比对留给调用方。
pub fn execute_protocol_script(data: &[u8]) -> Option<ScriptSummary> {
    let text = str::from_utf8(data).ok()?;

    let mut lines = text.lines();
    let header = lines.by_ref().find(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })?;
    let mut tokens = header.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("THRIFT") {
        return None;
    }
    let options = parse_options(tokens);

    let body: Vec<&str> = lines.collect();
    let bytes = collect_hex_payload(&body)?;
    if bytes.is_empty() {
        return None;
    }

    let config = config_from(&options);
    let splits = options
        .get("split")
        .map(|raw| parse_usize_list(raw))
        .unwrap_or_default();
    let mut summary = run_case(config, &bytes, &splits);
    summary.expected = options.get("expect").and_then(|raw| raw.parse().ok());
    Some(summary)
}

/// 对一段线上字节执行整段与分片两遍解码，断言消耗量守恒。
///
/// fuzz target 直接以原始字节调用此函数，绕过脚本文本。
pub fn run_case(config: DecoderConfig, bytes: &[u8], splits: &[usize]) -> ScriptSummary {
    let mode = config.binary_decode_mode;
    let decoder = ThriftDecoder::new(config);

    let progress = decoder.decode_stream(&ByteWindow::new(bytes));
    assert!(
        progress.consumed <= bytes.len(),
        "整段解码越界：{} > {}",
        progress.consumed,
        bytes.len()
    );
    let mut sink = TextSink::new(mode);
    for report in &progress.reports {
        assert!(report.span.offset() < bytes.len().max(1));
        report.emit(&mut sink);
    }
    let whole = progress.reports.iter().filter(|r| r.result.is_ok()).count();
    let failed =
        progress.error.is_some() || progress.reports.iter().any(|r| r.result.is_err());

    let mut stream = StreamDecoder::new(decoder);
    let mut chunked = 0usize;
    for chunk in split_at_points(bytes, splits) {
        let batch = stream.feed(chunk);
        chunked += batch.reports.iter().filter(|r| r.result.is_ok()).count();
    }
    assert_eq!(
        stream.consumed() as usize + stream.buffered(),
        bytes.len(),
        "分片解码的消耗量与缓冲量之和必须等于输入长度"
    );

    ScriptSummary {
        expected: None,
        whole,
        chunked,
        failed,
        consumed: progress.consumed,
        total: bytes.len(),
    }
}

fn config_from(options: &BTreeMap<String, String>) -> DecoderConfig {
    let mut config = DecoderConfig::default();
    if let Some(framed) = options.get("framed") {
        config.framed = framed.eq_ignore_ascii_case("true");
    }
    if let Some(mode) = options.get("mode") {
        config.detect_mode = if mode.eq_ignore_ascii_case("heuristic") {
            DetectMode::Heuristic
        } else {
            DetectMode::Mandatory
        };
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_without_thrift_header_is_skipped() {
        assert_eq!(execute_protocol_script(b"RTP split=1\nhex: 00"), None);
        assert_eq!(execute_protocol_script(b"\xff\xfe"), None);
    }

    #[test]
    fn strict_ping_script_decodes_whole_and_chunked() {
        let script = b"# ping\nTHRIFT split=3,9 expect=1\nhex: 80010001 00000004 70696e67 00000007 00\n";
        let summary = execute_protocol_script(script).unwrap();
        assert_eq!(summary.expected, Some(1));
        assert_eq!(summary.whole, 1);
        assert_eq!(summary.chunked, 1);
        assert!(!summary.failed);
        assert_eq!(summary.consumed, summary.total);
    }
}
