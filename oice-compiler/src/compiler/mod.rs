//! # Compiler 模块
//!
//! 把区块树编译为播放引擎使用的场景脚本。
//!
//! ## 职责
//!
//! - 按区块类型分派到对应的处理函数（[`handlers`]）
//! - 驱动立绘站位状态机（[`crate::staging`]）
//! - 在区块之间传递剧集上下文（自动播放、上一位说话者、上一个消息区块）
//!
//! ## 上下文传递
//!
//! ```text
//! EpisodeContext::default()
//!     │
//!     ├── compile_block(block_1, ctx) ──► BlockOutput { script, context }
//!     ├── compile_block(block_2, ctx) ──► BlockOutput { script, context }
//!     └── ...
//! ```
//!
//! 上下文在每个剧集开始时新建，剧集结束后丢弃，不跨剧集、不跨调用保留。

mod handlers;
pub mod text;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::error::ExportResult;
use crate::model::{Block, BlockId, BlockKind, Character, CharacterId, Oice, Story};
use crate::probe::ImageProbe;
use crate::staging::Staging;

/// 最近一个消息类区块（对话 / 旁白）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageBlock {
    pub block_id: BlockId,
    pub kind: BlockKind,
}

/// 剧集编译上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeContext {
    /// 立绘站位
    pub staging: Staging,
    /// 自动播放模式
    pub autoplay: bool,
    /// 上一位说话的角色
    pub prev_character: Option<CharacterId>,
    /// 上一次输出的角色名
    pub prev_character_name: Option<String>,
    /// 上一个消息区块
    pub prev_message: Option<MessageBlock>,
}

/// 单个区块的编译结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutput {
    /// 区块产生的脚本
    pub script: String,
    /// 处理该区块之后的上下文
    pub context: EpisodeContext,
}

/// 场景脚本编译器
///
/// 每个实例只持有只读数据，可以为不同的故事同时创建多个实例。
pub struct ScriptCompiler<'a> {
    config: ExportConfig,
    characters: HashMap<CharacterId, &'a Character>,
    probe: &'a dyn ImageProbe,
}

impl<'a> ScriptCompiler<'a> {
    /// 创建编译器
    ///
    /// `characters` 是对话区块可以引用的角色表。
    pub fn new(config: ExportConfig, characters: &'a [Character], probe: &'a dyn ImageProbe) -> Self {
        Self {
            config,
            characters: characters.iter().map(|c| (c.id, c)).collect(),
            probe,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn character(&self, id: CharacterId) -> Option<&'a Character> {
        self.characters.get(&id).copied()
    }

    /// 编译单个区块
    ///
    /// 消费当前上下文，返回脚本和更新后的上下文。
    pub fn compile_block(
        &self,
        block: &Block,
        language: &str,
        context: EpisodeContext,
    ) -> ExportResult<BlockOutput> {
        let mut context = context;

        let script = match block.kind() {
            BlockKind::Default => self.default_block(block, language)?,
            BlockKind::Autoplay => self.autoplay_block(block, language, &mut context)?,
            BlockKind::CancelAutoplay => {
                self.cancel_autoplay_block(block, language, &mut context)?
            }
            BlockKind::Item => self.item_block(block, language)?,
            BlockKind::Label => self.label_block(block, language)?,
            BlockKind::Comment => self.comment_block(block, language),
            BlockKind::Option => self.option_block(block, language)?,
            BlockKind::CharacterDialog => {
                self.character_dialog_block(block, language, &mut context)
            }
            BlockKind::AddTalk => self.add_talk_block(block, language, &mut context),
            BlockKind::Aside => self.aside_block(block, language, &mut context),
            BlockKind::StageExit(position) => self.stage_exit_block(position, &mut context),
        };

        Ok(BlockOutput { script, context })
    }

    /// 编译一个剧集
    ///
    /// 每个区块前输出 `;#<id>` 标记。
    pub fn compile_oice(&self, oice: &Oice, language: &str) -> ExportResult<String> {
        let mut context = EpisodeContext::default();
        let mut script = String::new();

        for block in &oice.blocks {
            let output = self.compile_block(block, language, context)?;
            script.push_str(&format!(";#{}\n{}\n", block.id, output.script));
            context = output.context;
        }

        debug!(
            oice_id = oice.id,
            language,
            blocks = oice.blocks.len(),
            "剧集编译完成"
        );
        Ok(script)
    }

    /// 编译整个故事，返回 `filename -> script`
    ///
    /// 语言取配置中的 `default_language`，未配置时使用故事主语言。
    pub fn compile_story(&self, story: &Story) -> ExportResult<BTreeMap<String, String>> {
        let language = self
            .config
            .default_language
            .as_deref()
            .unwrap_or(&story.language);
        self.compile_story_in(story, language)
    }

    /// 以指定语言编译整个故事
    pub fn compile_story_in(
        &self,
        story: &Story,
        language: &str,
    ) -> ExportResult<BTreeMap<String, String>> {
        let scripts = story
            .oices
            .iter()
            .map(|oice| Ok((oice.filename.clone(), self.compile_oice(oice, language)?)))
            .collect::<ExportResult<BTreeMap<_, _>>>()?;

        info!(
            story_id = story.id,
            language,
            oices = scripts.len(),
            "故事编译完成"
        );
        Ok(scripts)
    }
}
