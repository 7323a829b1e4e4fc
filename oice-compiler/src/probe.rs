//! # Probe 模块
//!
//! 图片尺寸探测端口。
//!
//! 编译器只依赖 [`ImageProbe`] trait；默认实现 [`IdentifyProbe`] 调用
//! ImageMagick 的 `identify`，测试中可以替换为内存实现。

use serde_json::Value;
use tracing::debug;
use xshell::{Shell, cmd};

use crate::error::ExternalToolError;

/// 图片尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

/// 图片尺寸探测
pub trait ImageProbe {
    /// 获取 `path` 处图片的尺寸
    fn dimensions(&self, path: &str) -> Result<ImageSize, ExternalToolError>;
}

/// 通过 `identify -format [%w,%h]` 探测
#[derive(Debug, Clone)]
pub struct IdentifyProbe {
    program: String,
}

impl IdentifyProbe {
    pub fn new() -> Self {
        Self {
            program: "identify".to_string(),
        }
    }

    /// 使用指定的可执行文件（如 `magick identify` 的包装脚本）
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for IdentifyProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProbe for IdentifyProbe {
    fn dimensions(&self, path: &str) -> Result<ImageSize, ExternalToolError> {
        let failed = |message: String| ExternalToolError::ProbeFailed {
            path: path.to_string(),
            message,
        };

        let sh = Shell::new().map_err(|e| failed(e.to_string()))?;
        let program = &self.program;
        let output = cmd!(sh, "{program} -format [%w,%h] {path}")
            .quiet()
            .read()
            .map_err(|e| failed(e.to_string()))?;

        debug!(path, output = %output, "图片尺寸探测完成");
        parse_probe_output(path, &output)
    }
}

/// 解析探测输出：必须是两个数字组成的 JSON 数组
pub fn parse_probe_output(path: &str, output: &str) -> Result<ImageSize, ExternalToolError> {
    let malformed = || ExternalToolError::MalformedProbeOutput {
        path: path.to_string(),
        output: output.to_string(),
    };

    let value: Value = serde_json::from_str(output.trim()).map_err(|_| malformed())?;
    match value.as_array().map(Vec::as_slice) {
        Some([width, height]) => Ok(ImageSize {
            width: width.as_f64().ok_or_else(malformed)?,
            height: height.as_f64().ok_or_else(malformed)?,
        }),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let size = parse_probe_output("a.png", "[640,480]").unwrap();
        assert_eq!(size.width, 640.0);
        assert_eq!(size.height, 480.0);

        // 允许末尾换行
        assert!(parse_probe_output("a.png", "[1,2]\n").is_ok());
    }

    #[test]
    fn test_parse_probe_output_malformed() {
        for output in ["", "640x480", "[640]", "[640,480,1]", "[\"a\",1]"] {
            assert!(
                matches!(
                    parse_probe_output("a.png", output),
                    Err(ExternalToolError::MalformedProbeOutput { .. })
                ),
                "{output}"
            );
        }
    }

    #[test]
    fn test_missing_program_is_probe_failure() {
        let probe = IdentifyProbe::with_program("definitely-not-an-identify-binary");
        assert!(matches!(
            probe.dimensions("a.png"),
            Err(ExternalToolError::ProbeFailed { .. })
        ));
    }
}
