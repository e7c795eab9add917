//! spark2026-fuzz 公共支持库。
//!
//! # 教案式定位
//! - **Why**：fuzz target 与 `cargo test` 共享同一套脚本执行逻辑，手工维护的极限样本既能作为
//!   CI 回归用例，也能作为 LibFuzzer 的种子语料继续变异；
//! - **What**：[`support`] 提供分片与脚本文本解析工具，[`scripts`] 解析并执行 `THRIFT` 脚本；
//! - **How**：全部基于 `spark-codec-thrift` 的公开 API，不触及内部模块。

pub mod scripts;
pub mod support;

pub use scripts::{ScriptSummary, execute_protocol_script};
