#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark2026_fuzz::scripts::run_case;
use spark2026_fuzz::support::points_from_lengths;
use spark_codec_thrift::{DecoderConfig, DetectMode};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    framed: bool,
    heuristic: bool,
    depth: u8,
    chunk_lengths: Vec<u8>,
    bytes: &'a [u8],
}

// 原始字节直接进入流解码：任何输入都不得 panic、越界或无限循环。
fuzz_target!(|input: Input<'_>| {
    let config = DecoderConfig {
        framed: input.framed,
        detect_mode: if input.heuristic {
            DetectMode::Heuristic
        } else {
            DetectMode::Mandatory
        },
        nested_type_depth: u32::from(input.depth.clamp(1, 64)),
        ..DecoderConfig::default()
    };
    let splits = points_from_lengths(&input.chunk_lengths, input.bytes.len());
    run_case(config, input.bytes, &splits);
});
