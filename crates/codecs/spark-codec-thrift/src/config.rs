//! 解码器配置。
//!
//! ## 交互契约（What）
//! - [`DecoderConfig`] 可直接构造，也可通过 [`DecoderConfig::from_toml_str`] 从 TOML 加载；
//!   未出现的键取默认值，未知键视为错误；
//! - 加载后执行 [`DecoderConfig::validate`]，拒绝会让解码器失去意义的取值；
//!   `nested_type_depth` 上限为 [`MAX_NESTED_TYPE_DEPTH`]，直接构造的配置在解码时同样被钳制。
//!
//! ## 示例
//! ```toml
//! nested_type_depth = 32
//! try_generic_if_schema_fails = true
//! framed = false
//! binary_decode_mode = "auto"
//! ```

use serde::Deserialize;

use crate::detect::DetectMode;
use crate::error::ConfigError;
use crate::types::MIN_MESSAGE_LEN;

/// 默认嵌套深度上限。
pub const DEFAULT_NESTED_TYPE_DEPTH: u32 = 25;
/// `nested_type_depth` 允许配置的最大值；解码递归深度与之成正比。
pub const MAX_NESTED_TYPE_DEPTH: u32 = 128;
/// 默认最大帧长度，与 Thrift C++/Java 传输层默认值一致。
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 16_384_000;
/// 默认方法名长度上限。
pub const DEFAULT_MAX_METHOD_NAME_LEN: usize = 1024;

/// 字节串在展示层的渲染方式；不影响解码结果。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryDecodeMode {
    /// 十六进制。
    Hex,
    /// 可打印 ASCII，其余字节显示为 `.`。
    Ascii,
    /// 按 UTF-8 有损解码。
    Utf8,
    /// 合法且可打印的 UTF-8 显示为字符串，否则十六进制。
    #[default]
    Auto,
}

/// 解码器配置。
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// 容器/结构体嵌套深度上限。
    pub nested_type_depth: u32,
    /// Schema 解码失败时是否对该结构体做一次通用重试。
    pub try_generic_if_schema_fails: bool,
    /// 调用方声明流量一定带 4 字节长度前缀，跳过分帧探测。
    pub framed: bool,
    /// 字节串展示方式。
    pub binary_decode_mode: BinaryDecodeMode,
    /// 帧长度上限；超过即视为非法帧。
    pub max_frame_length: u32,
    /// 方法名长度上限。
    pub max_method_name_len: usize,
    /// 协议探测模式。
    pub detect_mode: DetectMode,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            nested_type_depth: DEFAULT_NESTED_TYPE_DEPTH,
            try_generic_if_schema_fails: false,
            framed: false,
            binary_decode_mode: BinaryDecodeMode::Auto,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_method_name_len: DEFAULT_MAX_METHOD_NAME_LEN,
            detect_mode: DetectMode::Mandatory,
        }
    }
}

impl DecoderConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nested_type_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "nested_type_depth",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.nested_type_depth > MAX_NESTED_TYPE_DEPTH {
            return Err(ConfigError::Invalid {
                field: "nested_type_depth",
                reason: format!("must be at most {MAX_NESTED_TYPE_DEPTH}"),
            });
        }
        if (self.max_frame_length as usize) < MIN_MESSAGE_LEN {
            return Err(ConfigError::Invalid {
                field: "max_frame_length",
                reason: format!("must be at least {MIN_MESSAGE_LEN} bytes"),
            });
        }
        if self.max_method_name_len == 0 {
            return Err(ConfigError::Invalid {
                field: "max_method_name_len",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
