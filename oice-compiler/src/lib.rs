//! # Oice Compiler
//!
//! 把视觉小说编辑器中的区块树编译为 KAG 风格的场景脚本。
//!
//! ## 架构概述
//!
//! `oice-compiler` 是纯编译核心：输入是只读的故事树，输出是每个剧集一份脚本。
//! 唯一的外部交互是图片尺寸探测，通过 [`ImageProbe`] 端口注入。
//!
//! ```text
//! StoryDocument (JSON)
//!   │ link()
//!   ▼
//! Story ──► ScriptCompiler ──► filename -> script
//!   │              │
//!   │              └── ImageProbe（道具居中）
//!   └── extract_dependencies()（角色 / 资源 / 宏）
//! ```
//!
//! ## 核心类型
//!
//! - [`ScriptCompiler`]：区块分派与剧集上下文传递
//! - [`Staging`]：左 / 中 / 右三个立绘槽位的状态机
//! - [`ExportConfig`]：缩放、画布尺寸与立绘指令模板
//! - [`ExportError`]：统一错误类型
//!
//! ## 使用示例
//!
//! ```ignore
//! use oice_compiler::{ExportConfig, IdentifyProbe, ScriptCompiler, StoryDocument};
//!
//! let linked = StoryDocument::from_json(&text)?.link()?;
//! let probe = IdentifyProbe::new();
//! let compiler = ScriptCompiler::new(ExportConfig::default(), &linked.characters, &probe);
//!
//! for (filename, script) in compiler.compile_story(&linked.story)? {
//!     std::fs::write(format!("{filename}.ks"), script)?;
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`model`]：故事树数据模型
//! - [`document`]：JSON 故事文档与链接
//! - [`resolver`]：属性值解析
//! - [`staging`]：立绘站位
//! - [`compiler`]：区块编译
//! - [`extract`]：依赖提取
//! - [`progress`]：阅读进度
//! - [`probe`]：图片尺寸探测
//! - [`config`]：导出配置
//! - [`error`]：错误类型定义

pub mod compiler;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod model;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod staging;

// 重导出核心类型
pub use compiler::{BlockOutput, EpisodeContext, MessageBlock, ScriptCompiler};
pub use config::{ExportConfig, PositionTemplates, StagingScripts};
pub use document::{LinkedStory, StoryDocument};
pub use error::{
    ConfigError, DocumentError, ExportError, ExportResult, ExternalToolError, FormatError,
    ValidationError,
};
pub use extract::{
    AssetExtractor, CharacterExtractor, DependencyExtractor, MacroExtractor, StoryDependencies,
    UsedMacro, extract_dependencies,
};
pub use model::{
    Asset, AssetType, Attribute, AttributeDefinition, Block, BlockKind, Character, Macro, Oice,
    Story,
};
pub use probe::{IdentifyProbe, ImageProbe, ImageSize};
pub use progress::{EpisodeAvailability, ReadProgress, next_episode_to_read, viewable_episodes};
pub use resolver::{LocalizedAttributes, resolve_attribute};
pub use staging::{CharacterScene, StageDirective, StagePosition, Staging};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        // 验证所有公共类型都可以正常使用
        let _kind = BlockKind::from_tagname("characterdialog");

        let _position = StagePosition::Middle;

        let _context = EpisodeContext::default();

        let config = ExportConfig::default();
        assert!(config.validate().is_ok());

        let probe = IdentifyProbe::new();
        let compiler = ScriptCompiler::new(config, &[], &probe);
        let story = Story {
            id: 1,
            language: "en".to_string(),
            oices: Vec::new(),
        };
        assert!(compiler.compile_story(&story).unwrap().is_empty());
    }
}
