//! # Staging 模块
//!
//! 立绘站位状态机：左 / 中 / 右三个槽位及其明暗状态。
//!
//! ## 设计说明
//!
//! 播放引擎的脚本没有隐式层级，每个画面变化都必须是显式指令。
//! 状态机根据上一帧的站位决定需要哪些指令：
//!
//! ```text
//! 进入 left/right：
//!   middle 有人        -> Exit(middle)
//!   另一侧有人且明亮    -> ToDark(另一侧)
//!   同一角色且处于暗态  -> ToBright，否则 Show
//! 进入 middle：
//!   left/right 有人    -> Exit（不是变暗）
//!   总是 Show
//! ```
//!
//! [`Staging`] 是值类型，每次转换消费旧状态并返回新状态。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::StagingScripts;
use crate::model::{Asset, Character, CharacterId};

/// 站位槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagePosition {
    Left,
    Middle,
    Right,
}

impl StagePosition {
    /// 从字符串解析位置（便捷方法）
    pub fn parse(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }

    /// 两侧槽位的对侧；middle 没有对侧
    fn opposite(self) -> Option<Self> {
        match self {
            Self::Left => Some(Self::Right),
            Self::Right => Some(Self::Left),
            Self::Middle => None,
        }
    }
}

impl FromStr for StagePosition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "middle" => Ok(Self::Middle),
            "right" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个已上场的角色
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterScene {
    pub character_id: CharacterId,
    /// 角色的稳定立绘键
    pub key: String,
    /// 立绘资源的导出名
    pub fg: Option<String>,
    /// 左右翻转；`None` 时不输出该参数
    pub fliplr: Option<bool>,
    /// 是否处于暗态
    pub dark: bool,
}

impl CharacterScene {
    pub fn new(character: &Character, fg: Option<&Asset>, fliplr: Option<bool>) -> Self {
        Self {
            character_id: character.id,
            key: character.uuid.clone(),
            fg: fg.map(|a| a.export_token().to_string()),
            fliplr,
            dark: false,
        }
    }

    pub fn darkened(self) -> Self {
        Self { dark: true, ..self }
    }

    pub fn brightened(self) -> Self {
        Self {
            dark: false,
            ..self
        }
    }
}

/// 站位指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDirective {
    /// 显示立绘
    Show {
        position: StagePosition,
        scene: CharacterScene,
    },
    /// 变暗
    ToDark {
        position: StagePosition,
        scene: CharacterScene,
    },
    /// 恢复明亮
    ToBright {
        position: StagePosition,
        scene: CharacterScene,
    },
    /// 退场
    Exit { position: StagePosition },
}

impl StageDirective {
    pub fn position(&self) -> StagePosition {
        match self {
            Self::Show { position, .. }
            | Self::ToDark { position, .. }
            | Self::ToBright { position, .. }
            | Self::Exit { position } => *position,
        }
    }

    /// 按模板渲染为一行脚本（含换行）
    pub fn render(&self, scripts: &StagingScripts) -> String {
        let (template, scene) = match self {
            Self::Show { position, scene } => (scripts.show.get(*position), scene),
            Self::ToDark { position, scene } => (scripts.to_dark.get(*position), scene),
            Self::ToBright { position, scene } => (scripts.to_bright.get(*position), scene),
            Self::Exit { position } => return format!("{}\n", scripts.exit.get(*position)),
        };

        let mut line = template
            .replace("{key}", &scene.key)
            .replace("{fg}", scene.fg.as_deref().unwrap_or(""));
        if let Some(fliplr) = scene.fliplr {
            line.push_str(&format!(" fliplr=\"{}\"", u8::from(fliplr)));
        }
        line.push('\n');
        line
    }
}

/// 三个槽位的站位状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Staging {
    left: Option<CharacterScene>,
    middle: Option<CharacterScene>,
    right: Option<CharacterScene>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取槽位中的角色
    pub fn slot(&self, position: StagePosition) -> Option<&CharacterScene> {
        match position {
            StagePosition::Left => self.left.as_ref(),
            StagePosition::Middle => self.middle.as_ref(),
            StagePosition::Right => self.right.as_ref(),
        }
    }

    /// 所有槽位都为空
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.middle.is_none() && self.right.is_none()
    }

    fn with_slot(self, position: StagePosition, scene: Option<CharacterScene>) -> Self {
        match position {
            StagePosition::Left => Self { left: scene, ..self },
            StagePosition::Middle => Self {
                middle: scene,
                ..self
            },
            StagePosition::Right => Self {
                right: scene,
                ..self
            },
        }
    }

    /// 角色进入指定槽位
    ///
    /// 返回新的站位状态和按顺序执行的指令。
    pub fn enter(
        self,
        position: StagePosition,
        scene: CharacterScene,
    ) -> (Self, Vec<StageDirective>) {
        let mut staging = self;
        let mut directives = Vec::new();
        let mut to_bright = false;

        match position.opposite() {
            Some(other) => {
                if staging.middle.is_some() {
                    let (next, exit) = staging.exit(StagePosition::Middle);
                    staging = next;
                    directives.push(exit);
                }

                if let Some(occupant) = staging.slot(other)
                    && !occupant.dark
                {
                    let darkened = occupant.clone().darkened();
                    directives.push(StageDirective::ToDark {
                        position: other,
                        scene: darkened.clone(),
                    });
                    staging = staging.with_slot(other, Some(darkened));
                }

                to_bright = staging
                    .slot(position)
                    .is_some_and(|s| s.character_id == scene.character_id && s.dark);
            }
            None => {
                for side in [StagePosition::Left, StagePosition::Right] {
                    if staging.slot(side).is_some() {
                        let (next, exit) = staging.exit(side);
                        staging = next;
                        directives.push(exit);
                    }
                }
            }
        }

        let scene = scene.brightened();
        directives.push(if to_bright {
            StageDirective::ToBright {
                position,
                scene: scene.clone(),
            }
        } else {
            StageDirective::Show {
                position,
                scene: scene.clone(),
            }
        });

        (staging.with_slot(position, Some(scene)), directives)
    }

    /// 清空指定槽位
    ///
    /// 无论槽位是否有人都会产生退场指令，不影响其他槽位。
    pub fn exit(self, position: StagePosition) -> (Self, StageDirective) {
        (self.with_slot(position, None), StageDirective::Exit { position })
    }
}
