//! # Document 模块
//!
//! 故事文档：外部编辑子系统导出的 JSON，以及把它链接为只读故事树的过程。
//!
//! ## 格式
//!
//! ```json
//! {
//!   "story": { "id": 1, "language": "en" },
//!   "macros": [{ "id": 1, "tagname": "bg", "attribute_definitions": [...] }],
//!   "assets": [{ "id": 3, "export_filename": "bg_3", "extension": "jpg" }],
//!   "characters": [{ "id": 7, "uuid": "c7", "name": "Alice" }],
//!   "oices": [{ "id": 10, "filename": "ep1", "blocks": [...] }]
//! }
//! ```
//!
//! 区块通过 `macro_id` 引用宏，属性通过 `asset_id` 引用资源。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DocumentError;
use crate::model::{
    Asset, AssetId, Attribute, AttributeDefinition, Block, BlockId, Character, Macro, MacroId,
    Oice, OiceId, Story,
};

/// 故事元信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryMeta {
    pub id: i64,
    /// 主语言
    pub language: String,
}

/// 宏记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroRecord {
    pub id: MacroId,
    #[serde(default)]
    pub name: String,
    pub tagname: String,
    #[serde(default)]
    pub attribute_definitions: Vec<AttributeDefinition>,
}

/// 属性记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub asset_id: Option<AssetId>,
}

/// 区块记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: BlockId,
    pub macro_id: MacroId,
    #[serde(default)]
    pub attributes: Vec<AttributeRecord>,
    /// language -> name -> text
    #[serde(default)]
    pub localized: BTreeMap<String, BTreeMap<String, String>>,
}

/// 剧集记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OiceRecord {
    pub id: OiceId,
    pub filename: String,
    /// 缺省时使用在数组中的位置
    #[serde(default)]
    pub order: Option<usize>,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default)]
    pub blocks: Vec<BlockRecord>,
}

fn default_published() -> bool {
    true
}

/// 故事文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryDocument {
    pub story: StoryMeta,
    #[serde(default)]
    pub macros: Vec<MacroRecord>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub oices: Vec<OiceRecord>,
}

/// 链接后的故事及其角色表
#[derive(Debug, Clone)]
pub struct LinkedStory {
    pub story: Story,
    pub characters: Vec<Character>,
}

impl StoryDocument {
    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 链接为只读故事树
    ///
    /// 宏与资源只构建一次，所有区块共享同一份。
    /// 未知的资源 ID 视为未关联资源。
    pub fn link(self) -> Result<LinkedStory, DocumentError> {
        let macros: HashMap<MacroId, Arc<Macro>> = self
            .macros
            .into_iter()
            .map(|record| {
                let mut definitions = record.attribute_definitions;
                definitions.sort_by_key(|d| d.order);
                let macro_def = Macro {
                    id: record.id,
                    name: record.name,
                    tagname: record.tagname,
                    attribute_definitions: definitions.into_iter().map(Arc::new).collect(),
                };
                (record.id, Arc::new(macro_def))
            })
            .collect();

        let mut assets: HashMap<AssetId, Arc<Asset>> = HashMap::with_capacity(self.assets.len());
        for asset in self.assets {
            let asset_id = asset.id;
            if assets.insert(asset_id, Arc::new(asset)).is_some() {
                return Err(DocumentError::DuplicateAsset { asset_id });
            }
        }

        let oices = self
            .oices
            .into_iter()
            .enumerate()
            .map(|(index, record)| link_oice(record, index, &macros, &assets))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LinkedStory {
            story: Story {
                id: self.story.id,
                language: self.story.language,
                oices,
            },
            characters: self.characters,
        })
    }
}

fn link_oice(
    record: OiceRecord,
    index: usize,
    macros: &HashMap<MacroId, Arc<Macro>>,
    assets: &HashMap<AssetId, Arc<Asset>>,
) -> Result<Oice, DocumentError> {
    let oice_id = record.id;
    let blocks = record
        .blocks
        .into_iter()
        .map(|block| link_block(block, oice_id, macros, assets))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Oice {
        id: oice_id,
        filename: record.filename,
        order: record.order.unwrap_or(index),
        published: record.published,
        blocks,
    })
}

fn link_block(
    record: BlockRecord,
    oice_id: OiceId,
    macros: &HashMap<MacroId, Arc<Macro>>,
    assets: &HashMap<AssetId, Arc<Asset>>,
) -> Result<Block, DocumentError> {
    let macro_def = macros
        .get(&record.macro_id)
        .cloned()
        .ok_or(DocumentError::MacroNotFound {
            oice_id,
            block_id: record.id,
            macro_id: record.macro_id,
        })?;

    let mut attributes = record
        .attributes
        .into_iter()
        .map(|attr| {
            let definition = macro_def.definition(&attr.name).cloned().ok_or_else(|| {
                DocumentError::AttributeNotDefined {
                    block_id: record.id,
                    tagname: macro_def.tagname.clone(),
                    attribute: attr.name.clone(),
                }
            })?;

            let asset = attr.asset_id.and_then(|asset_id| {
                let asset = assets.get(&asset_id).cloned();
                if asset.is_none() {
                    warn!(block_id = record.id, asset_id, "资源不存在，视为未关联");
                }
                asset
            });

            Ok(Attribute {
                definition,
                value: attr.value,
                asset,
            })
        })
        .collect::<Result<Vec<_>, DocumentError>>()?;

    // 稳定排序，同 order 保持原顺序
    attributes.sort_by_key(|a| a.definition.order);

    Ok(Block {
        id: record.id,
        oice_id,
        macro_def,
        attributes,
        localized: record.localized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetType, BlockKind};

    const DOCUMENT: &str = r#"{
        "story": { "id": 1, "language": "en" },
        "macros": [
            {
                "id": 1,
                "name": "Background",
                "tagname": "bg",
                "attribute_definitions": [
                    { "name": "time", "order": 2 },
                    { "name": "storage", "asset_type": "reference", "order": 1 }
                ]
            },
            { "id": 2, "tagname": "label", "attribute_definitions": [
                { "name": "name", "localizable": true }
            ] }
        ],
        "assets": [
            { "id": 3, "export_filename": "bg_3", "extension": "jpg", "storage_url": "/a/3.jpg" }
        ],
        "characters": [ { "id": 7, "uuid": "c7", "name": "Alice" } ],
        "oices": [
            { "id": 10, "filename": "ep1", "blocks": [
                { "id": 100, "macro_id": 1, "attributes": [
                    { "name": "time", "value": "500" },
                    { "name": "storage", "asset_id": 3 }
                ] },
                { "id": 101, "macro_id": 2, "localized": { "en": { "name": "start" } } }
            ] },
            { "id": 11, "filename": "ep2", "published": false }
        ]
    }"#;

    #[test]
    fn test_link_document() {
        let linked = StoryDocument::from_json(DOCUMENT).unwrap().link().unwrap();
        let story = &linked.story;

        assert_eq!(story.language, "en");
        assert_eq!(story.oices.len(), 2);
        assert_eq!(story.oices[1].order, 1);
        assert!(!story.oices[1].published);
        assert_eq!(story.published_oices().count(), 1);
        assert_eq!(linked.characters[0].name, "Alice");

        let bg = &story.oices[0].blocks[0];
        assert_eq!(bg.kind(), BlockKind::Default);
        // 按定义 order 排序
        assert_eq!(bg.attributes[0].name(), "storage");
        assert_eq!(bg.attributes[0].asset_type(), AssetType::Reference);
        assert_eq!(bg.attributes[0].asset.as_ref().map(|a| a.id), Some(3));
        assert_eq!(bg.attributes[1].value.as_deref(), Some("500"));

        let label = &story.oices[0].blocks[1];
        assert_eq!(label.kind(), BlockKind::Label);
        assert_eq!(label.localized_text("en", "name"), Some("start"));
    }

    #[test]
    fn test_blocks_share_macro() {
        let mut document = StoryDocument::from_json(DOCUMENT).unwrap();
        let extra = document.oices[0].blocks[0].clone();
        document.oices[0].blocks.push(BlockRecord { id: 102, ..extra });

        let linked = document.link().unwrap();
        let blocks = &linked.story.oices[0].blocks;
        assert!(Arc::ptr_eq(&blocks[0].macro_def, &blocks[2].macro_def));
    }

    #[test]
    fn test_unknown_macro_is_error() {
        let mut document = StoryDocument::from_json(DOCUMENT).unwrap();
        document.oices[0].blocks[0].macro_id = 99;

        assert_eq!(
            document.link().unwrap_err(),
            DocumentError::MacroNotFound {
                oice_id: 10,
                block_id: 100,
                macro_id: 99
            }
        );
    }

    #[test]
    fn test_undefined_attribute_is_error() {
        let mut document = StoryDocument::from_json(DOCUMENT).unwrap();
        document.oices[0].blocks[0].attributes.push(AttributeRecord {
            name: "volume".to_string(),
            value: Some("1".to_string()),
            asset_id: None,
        });

        assert!(matches!(
            document.link(),
            Err(DocumentError::AttributeNotDefined { block_id: 100, .. })
        ));
    }

    #[test]
    fn test_unknown_asset_is_absent() {
        let mut document = StoryDocument::from_json(DOCUMENT).unwrap();
        document.oices[0].blocks[0].attributes[1].asset_id = Some(404);

        let linked = document.link().unwrap();
        let storage = &linked.story.oices[0].blocks[0].attributes[0];
        assert_eq!(storage.name(), "storage");
        assert!(storage.asset.is_none());
    }

    #[test]
    fn test_duplicate_asset_is_error() {
        let mut document = StoryDocument::from_json(DOCUMENT).unwrap();
        let asset = document.assets[0].clone();
        document.assets.push(asset);

        assert_eq!(
            document.link().unwrap_err(),
            DocumentError::DuplicateAsset { asset_id: 3 }
        );
    }
}
