//! Thrift 抓包解析工具：读取一段原始字节流，逐条解码并打印缩进大纲。
//!
//! # 使用方法
//! ```bash
//! cargo run --features cli --bin thrift_dump -- capture.bin --framed \
//!     --config decoder.toml --schema calculator.toml
//! ```
//! - `capture.bin`：一条 TCP 连接单方向的负载字节；
//! - `--hex`：输入是十六进制文本（忽略空白），便于从抓包工具中粘贴；
//! - `--framed`：强制按 4 字节长度前缀分帧，覆盖配置文件；
//! - `--config`：可选，TOML 格式的 [`DecoderConfig`]；
//! - `--schema`：可选，TOML 格式的方法声明，见 `SchemaRegistry::from_toml_str`。
//!
//! 日志级别由 `RUST_LOG` 控制，例如 `RUST_LOG=spark_codec_thrift=trace`。

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use spark_codec_thrift::{ByteWindow, DecoderConfig, SchemaRegistry, TextSink, ThriftDecoder};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("thrift_dump 失败: {error}");
        std::process::exit(1);
    }
}

struct Options {
    input: PathBuf,
    hex: bool,
    framed: bool,
    config: Option<PathBuf>,
    schema: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args(env::args().skip(1))?;

    let mut config = match &options.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|error| format!("读取配置 {} 失败: {error}", path.display()))?;
            DecoderConfig::from_toml_str(&text).map_err(|error| format!("配置无效: {error}"))?
        }
        None => DecoderConfig::default(),
    };
    config.framed |= options.framed;

    let registry = match &options.schema {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|error| format!("读取 Schema {} 失败: {error}", path.display()))?;
            SchemaRegistry::from_toml_str(&text).map_err(|error| format!("Schema 无效: {error}"))?
        }
        None => SchemaRegistry::new(),
    };

    let raw = fs::read(&options.input)
        .map_err(|error| format!("读取输入 {} 失败: {error}", options.input.display()))?;
    let bytes = if options.hex {
        let text: String = String::from_utf8_lossy(&raw)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        hex::decode(text).map_err(|error| format!("十六进制输入无效: {error}"))?
    } else {
        raw
    };

    let mode = config.binary_decode_mode;
    let decoder = ThriftDecoder::with_registry(config, Arc::new(registry));
    let progress = decoder.decode_stream(&ByteWindow::new(&bytes));

    let mut sink = TextSink::new(mode);
    for report in &progress.reports {
        report.emit(&mut sink);
    }
    print!("{}", sink.as_str());

    if let Some(needed) = progress.needed {
        println!(
            "incomplete: {} trailing bytes need at least {} more",
            bytes.len() - progress.consumed,
            needed.at_least()
        );
    }
    if let Some(error) = progress.error {
        return Err(format!("解码在偏移 {} 处停止: {error}", progress.consumed));
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut input = None;
    let mut hex = false;
    let mut framed = false;
    let mut config = None;
    let mut schema = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--hex" => hex = true,
            "--framed" => framed = true,
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| usage("--config 之后必须提供文件路径"))?;
                config = Some(PathBuf::from(value));
            }
            "--schema" => {
                let value = args
                    .next()
                    .ok_or_else(|| usage("--schema 之后必须提供文件路径"))?;
                schema = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => {
                return Err(usage(&format!("未知参数: {flag}")));
            }
            path if input.is_none() => input = Some(PathBuf::from(path)),
            extra => return Err(usage(&format!("多余的输入文件: {extra}"))),
        }
    }

    Ok(Options {
        input: input.ok_or_else(|| usage("缺少输入文件路径"))?,
        hex,
        framed,
        config,
        schema,
    })
}

fn usage(reason: &str) -> String {
    format!(
        "{reason}\n用法: thrift_dump <capture-file> [--hex] [--framed] [--config decoder.toml] [--schema schema.toml]"
    )
}
