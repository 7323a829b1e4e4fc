//! # Error 模块
//!
//! 定义 oice-compiler 中使用的错误类型。
//!
//! 角色引用缺失不是错误：对话区块会静默跳过，编译继续。

use thiserror::Error;

use crate::model::{AssetId, BlockId, MacroId, OiceId};

/// 编辑数据校验错误
///
/// 每个变体都携带机器可读的错误码（见 [`ValidationError::code`]）
/// 以及定位用的区块 ID 和语言。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// 标签区块缺少 name
    #[error("区块 {block_id}：标签缺少 name 属性（语言 {language}）")]
    LabelNameNotFound { block_id: BlockId, language: String },

    /// 选项区块缺少 answers
    #[error("区块 {block_id}：选项缺少 answers 属性（语言 {language}）")]
    OptionAnswersNotFound { block_id: BlockId, language: String },

    /// 选项区块 answers 不是合法的 JSON
    #[error("区块 {block_id}：选项 answers 不是合法的 JSON（语言 {language}） - {message}")]
    OptionAnswersNotInJsonFormat {
        block_id: BlockId,
        language: String,
        message: String,
    },
}

impl ValidationError {
    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::LabelNameNotFound { .. } => "ERR_LABEL_NAME_NOT_FOUND",
            Self::OptionAnswersNotFound { .. } => "ERR_OPTION_BLOCK_ANSWERS_NOT_FOUND",
            Self::OptionAnswersNotInJsonFormat { .. } => {
                "ERR_OPTION_BLOCK_ANSWERS_NOT_IN_JSON_FORMAT"
            }
        }
    }

    /// 出错的区块
    pub fn block_id(&self) -> BlockId {
        match self {
            Self::LabelNameNotFound { block_id, .. }
            | Self::OptionAnswersNotFound { block_id, .. }
            | Self::OptionAnswersNotInJsonFormat { block_id, .. } => *block_id,
        }
    }
}

/// 属性值格式错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// 无法识别的颜色值
    #[error("区块 {block_id}：属性 '{attribute}' 的颜色值无效 - '{value}'")]
    InvalidColor {
        block_id: BlockId,
        attribute: String,
        value: String,
    },

    /// 可缩放属性不是数字
    #[error("区块 {block_id}：属性 '{attribute}' 不是数字 - '{value}'")]
    InvalidNumber {
        block_id: BlockId,
        attribute: String,
        value: String,
    },

    /// 副作用动作负载序列化失败
    #[error("区块 {block_id}：动作负载序列化失败 - {message}")]
    ActionPayload { block_id: BlockId, message: String },
}

/// 外部工具错误（图片尺寸探测）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExternalToolError {
    /// 探测进程执行失败
    #[error("获取图片尺寸失败 '{path}': {message}")]
    ProbeFailed { path: String, message: String },

    /// 探测输出不是 `[width, height]`
    #[error("图片尺寸输出格式无效 '{path}': '{output}'")]
    MalformedProbeOutput { path: String, output: String },
}

/// 故事文档链接错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// 区块引用了不存在的宏
    #[error("剧集 {oice_id} 区块 {block_id}：宏 {macro_id} 不存在")]
    MacroNotFound {
        oice_id: OiceId,
        block_id: BlockId,
        macro_id: MacroId,
    },

    /// 属性名不在宏的属性定义中
    #[error("区块 {block_id}：宏 '{tagname}' 没有属性定义 '{attribute}'")]
    AttributeNotDefined {
        block_id: BlockId,
        tagname: String,
        attribute: String,
    },

    /// 资源 ID 重复
    #[error("资源 {asset_id} 重复定义")]
    DuplicateAsset { asset_id: AssetId },
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 读取失败
    #[error("配置 IO 错误 '{path}': {message}")]
    Io { path: String, message: String },

    /// 解析失败
    #[error("配置解析失败 '{path}': {message}")]
    Parse { path: String, message: String },

    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}

/// oice-compiler 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// 校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),

    /// 格式错误
    #[error("格式错误: {0}")]
    Format(#[from] FormatError),

    /// 外部工具错误
    #[error("外部工具错误: {0}")]
    ExternalTool(#[from] ExternalToolError),

    /// 文档错误
    #[error("文档错误: {0}")]
    Document(#[from] DocumentError),
}

/// Result 类型别名
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        let err = ValidationError::OptionAnswersNotFound {
            block_id: 7,
            language: "en".to_string(),
        };
        assert_eq!(err.code(), "ERR_OPTION_BLOCK_ANSWERS_NOT_FOUND");
        assert_eq!(err.block_id(), 7);

        let err = ValidationError::OptionAnswersNotInJsonFormat {
            block_id: 9,
            language: "en".to_string(),
            message: "EOF".to_string(),
        };
        assert_eq!(err.code(), "ERR_OPTION_BLOCK_ANSWERS_NOT_IN_JSON_FORMAT");
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn test_export_error_from() {
        let err: ExportError = ExternalToolError::ProbeFailed {
            path: "a.png".to_string(),
            message: "exit 1".to_string(),
        }
        .into();
        assert!(matches!(err, ExportError::ExternalTool(_)));
    }
}
