#![no_main]

use libfuzzer_sys::fuzz_target;
use spark2026_fuzz::execute_protocol_script;

// Thrift 极限样本回归入口。
//
// - **Why**：手工维护的 `THRIFT` 脚本作为种子，LibFuzzer 在其文本上继续变异；
// - **How**：输入字节按脚本解析后交给 `execute_protocol_script`，无法解析的脚本直接忽略；
// - **What**：脚本内部只断言消耗量守恒等普适性质，`expect=` 的比对由回归测试负责。
fuzz_target!(|data: &[u8]| {
    let _ = execute_protocol_script(data);
});
