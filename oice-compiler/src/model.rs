//! # Model 模块
//!
//! 故事树的只读数据模型：`Story → Oice → Block → Attribute`。
//!
//! ## 设计说明
//!
//! 整棵树由外部编辑子系统构建（见 [`crate::document`]），编译器只读访问。
//! 宏、属性定义与资源通过 `Arc` 在区块之间共享，因此同一棵树可以被
//! 多个编译器实例并发读取。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::staging::StagePosition;

pub type BlockId = i64;
pub type OiceId = i64;
pub type MacroId = i64;
pub type AssetId = i64;
pub type CharacterId = i64;

/// 属性的资源类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// 普通字面值
    #[default]
    None,
    /// 引用一个资源
    Reference,
    /// 颜色值（`#RRGGBB`）
    Color,
}

/// 属性定义
///
/// 同一个宏的所有区块共享同一组定义。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// 属性名
    pub name: String,
    /// 资源类型
    #[serde(default)]
    pub asset_type: AssetType,
    /// 是否按语言本地化
    #[serde(default)]
    pub localizable: bool,
    /// 显示顺序
    #[serde(default)]
    pub order: i32,
}

/// 区块类型
///
/// 由宏的 tagname 唯一决定；无法识别的 tagname 归为 [`BlockKind::Default`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Default,
    Item,
    Label,
    Comment,
    Option,
    CharacterDialog,
    /// 同一角色的连续发言（不重新布置立绘）
    AddTalk,
    Aside,
    Autoplay,
    CancelAutoplay,
    /// 指定位置的立绘退场
    StageExit(StagePosition),
}

impl BlockKind {
    /// 从宏的 tagname 推导区块类型（大小写敏感）
    pub fn from_tagname(tagname: &str) -> Self {
        match tagname {
            "item" => Self::Item,
            "label" => Self::Label,
            "comment" => Self::Comment,
            "option" => Self::Option,
            "characterdialog" => Self::CharacterDialog,
            "addTalk" => Self::AddTalk,
            "aside" => Self::Aside,
            "autoplay" => Self::Autoplay,
            "Cancelautomode" => Self::CancelAutoplay,
            "fgExitLeft" => Self::StageExit(StagePosition::Left),
            "fgExitMiddle" => Self::StageExit(StagePosition::Middle),
            "fgExitRight" => Self::StageExit(StagePosition::Right),
            _ => Self::Default,
        }
    }
}

/// 宏：区块的类型与属性结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub id: MacroId,
    /// 显示名称
    pub name: String,
    /// 脚本中使用的标签名（`@tagname`）
    pub tagname: String,
    /// 按 order 排序的属性定义
    pub attribute_definitions: Vec<Arc<AttributeDefinition>>,
}

impl Macro {
    /// 区块类型
    pub fn kind(&self) -> BlockKind {
        BlockKind::from_tagname(&self.tagname)
    }

    /// 按名称查找属性定义
    pub fn definition(&self, name: &str) -> Option<&Arc<AttributeDefinition>> {
        self.attribute_definitions.iter().find(|d| d.name == name)
    }
}

/// 媒体资源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// 导出文件名（不含扩展名）
    pub export_filename: String,
    /// 扩展名（不含点）
    #[serde(default)]
    pub extension: Option<String>,
    /// 存储位置（用于探测图片尺寸）
    #[serde(default)]
    pub storage_url: String,
}

impl Asset {
    /// 脚本中引用该资源使用的名称
    pub fn export_token(&self) -> &str {
        &self.export_filename
    }

    /// 打包时使用的完整文件名
    pub fn export_filename_with_ext(&self) -> String {
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => format!("{}.{}", self.export_filename, ext),
            _ => self.export_filename.clone(),
        }
    }
}

/// 角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    /// 稳定的立绘键
    pub uuid: String,
    /// 默认显示名称
    pub name: String,
    /// 各语言的显示名称
    #[serde(default)]
    pub localized_names: BTreeMap<String, String>,
    /// 通用角色（名字可由区块覆盖）
    #[serde(default)]
    pub is_generic: bool,
}

impl Character {
    /// 获取指定语言的显示名称，缺失时回退到默认名称
    pub fn display_name(&self, language: &str) -> &str {
        self.localized_names
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// 区块上的一个属性值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub definition: Arc<AttributeDefinition>,
    /// 字面值
    pub value: Option<String>,
    /// 关联的资源（仅 reference 类型）
    pub asset: Option<Arc<Asset>>,
}

impl Attribute {
    /// 属性名
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn asset_type(&self) -> AssetType {
        self.definition.asset_type
    }
}

/// 区块：一条编辑指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    /// 所属剧集
    pub oice_id: OiceId,
    pub macro_def: Arc<Macro>,
    /// 按属性定义顺序排列
    pub attributes: Vec<Attribute>,
    /// 本地化属性：language -> name -> text
    pub localized: BTreeMap<String, BTreeMap<String, String>>,
}

impl Block {
    /// 区块类型
    pub fn kind(&self) -> BlockKind {
        self.macro_def.kind()
    }

    /// 宏标签名
    pub fn tagname(&self) -> &str {
        &self.macro_def.tagname
    }

    /// 查找指定语言的本地化文本
    pub fn localized_text(&self, language: &str, name: &str) -> Option<&str> {
        self.localized
            .get(language)
            .and_then(|attrs| attrs.get(name))
            .map(String::as_str)
    }
}

/// 剧集（Oice）：一段可播放的场景，编译为一份脚本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oice {
    pub id: OiceId,
    /// 导出文件名（脚本映射的键）
    pub filename: String,
    /// 在故事中的顺序（从 0 开始）
    pub order: usize,
    /// 是否已发布
    pub published: bool,
    pub blocks: Vec<Block>,
}

/// 故事：有序的剧集集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub id: i64,
    /// 主语言
    pub language: String,
    pub oices: Vec<Oice>,
}

impl Story {
    /// 已发布的剧集（保持原顺序）
    pub fn published_oices(&self) -> impl Iterator<Item = &Oice> {
        self.oices.iter().filter(|o| o.published)
    }

    /// 按 ID 查找剧集
    pub fn oice(&self, id: OiceId) -> Option<&Oice> {
        self.oices.iter().find(|o| o.id == id)
    }
}
