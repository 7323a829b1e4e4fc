//! # Config 模块
//!
//! 导出配置，集中管理编译器使用的所有参数。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (ks-export.json)
//! 3. 默认值（最低）

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::staging::StagePosition;

/// 导出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 缩放系数，用于把编辑时的像素坐标适配到目标画布
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// 画布边长（像素），道具居中时使用
    #[serde(default = "default_screen_size")]
    pub screen_size: u32,

    /// 需要按缩放系数换算的属性名
    #[serde(default = "default_scalable_attributes")]
    pub scalable_attributes: BTreeSet<String>,

    /// 覆盖故事主语言
    #[serde(default)]
    pub default_language: Option<String>,

    /// 立绘指令模板
    #[serde(default)]
    pub staging: StagingScripts,
}

/// 三个槽位各自的模板
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTemplates {
    pub left: String,
    pub middle: String,
    pub right: String,
}

impl PositionTemplates {
    /// 按 `<prefix><Pos><suffix>` 生成三个模板
    fn for_each_position(prefix: &str, suffix: &str) -> Self {
        Self {
            left: format!("{prefix}Left{suffix}"),
            middle: format!("{prefix}Middle{suffix}"),
            right: format!("{prefix}Right{suffix}"),
        }
    }

    pub fn get(&self, position: StagePosition) -> &str {
        match position {
            StagePosition::Left => &self.left,
            StagePosition::Middle => &self.middle,
            StagePosition::Right => &self.right,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        [self.left.as_str(), self.middle.as_str(), self.right.as_str()].into_iter()
    }
}

/// 立绘指令模板
///
/// 模板中的 `{key}` 替换为角色立绘键，`{fg}` 替换为立绘资源导出名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingScripts {
    #[serde(default = "default_show_templates")]
    pub show: PositionTemplates,
    #[serde(default = "default_to_dark_templates")]
    pub to_dark: PositionTemplates,
    #[serde(default = "default_to_bright_templates")]
    pub to_bright: PositionTemplates,
    #[serde(default = "default_exit_templates")]
    pub exit: PositionTemplates,
}

// 默认值函数
fn default_scale_factor() -> f64 {
    1.0
}

fn default_screen_size() -> u32 {
    1080
}

fn default_scalable_attributes() -> BTreeSet<String> {
    ["x", "y", "width", "height", "top", "left"]
        .into_iter()
        .map(String::from)
        .collect()
}

const SCENE_ARGS: &str = " key=\"{key}\" fg=\"{fg}\"";

fn default_show_templates() -> PositionTemplates {
    PositionTemplates::for_each_position("@fgShow", SCENE_ARGS)
}

fn default_to_dark_templates() -> PositionTemplates {
    PositionTemplates::for_each_position("@fgToDark", SCENE_ARGS)
}

fn default_to_bright_templates() -> PositionTemplates {
    PositionTemplates::for_each_position("@fgToBright", SCENE_ARGS)
}

fn default_exit_templates() -> PositionTemplates {
    PositionTemplates::for_each_position("@fgExit", "")
}

impl Default for StagingScripts {
    fn default() -> Self {
        Self {
            show: default_show_templates(),
            to_dark: default_to_dark_templates(),
            to_bright: default_to_bright_templates(),
            exit: default_exit_templates(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
            screen_size: default_screen_size(),
            scalable_attributes: default_scalable_attributes(),
            default_language: None,
            staging: StagingScripts::default(),
        }
    }
}

impl ExportConfig {
    /// 加载配置文件
    ///
    /// 文件不存在时返回默认配置并记录警告；文件无法解析时返回错误。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        info!(path = %path.display(), "配置文件加载成功");
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "缩放系数必须为正数: {}",
                self.scale_factor
            )));
        }

        if self.screen_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "画布边长必须大于 0".to_string(),
            ));
        }

        let scene_templates = self
            .staging
            .show
            .iter()
            .chain(self.staging.to_dark.iter())
            .chain(self.staging.to_bright.iter());
        for template in scene_templates {
            if !template.contains("{key}") {
                return Err(ConfigError::ValidationFailed(format!(
                    "立绘模板缺少 {{key}} 占位符: {template}"
                )));
            }
        }

        for template in self.staging.exit.iter() {
            if template.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "退场模板不能为空".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// 使用命令行覆盖缩放系数
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// 使用命令行覆盖语言
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }
}
