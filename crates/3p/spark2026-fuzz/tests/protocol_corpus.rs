//! 回归测试：逐一重放 `protocol_regression` 语料，确保极限样本被稳定解析。
//!
//! - **Why**：CI 中运行常规 `cargo test` 即可验证 fuzz 语料，无需依赖 libFuzzer 运行时；
//! - **How**：遍历语料目录，读取每个样本并调用 [`spark2026_fuzz::execute_protocol_script`]；
//! - **What**：脚本必须可解析；声明了 `expect=` 的样本，整段与分片两种喂法的成功条数都要与之相等。

use std::fs;
use std::path::PathBuf;

#[test]
fn replay_protocol_corpus() {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.push("corpus/protocol_regression");
    let entries = fs::read_dir(&dir).expect("protocol_regression corpus 应存在");
    let mut replayed = 0usize;
    for entry in entries {
        let entry = entry.expect("读取语料目录失败");
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let data = fs::read(&path).expect("读取语料失败");
        let summary = spark2026_fuzz::execute_protocol_script(&data)
            .unwrap_or_else(|| panic!("{} 不是合法的 THRIFT 脚本", path.display()));
        if let Some(expected) = summary.expected {
            assert_eq!(summary.whole, expected, "{}: 整段解码条数", path.display());
            assert_eq!(summary.chunked, expected, "{}: 分片解码条数", path.display());
        }
        replayed += 1;
    }
    assert!(replayed > 0, "语料目录不应为空");
}
