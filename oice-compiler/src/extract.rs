//! # Extract 模块
//!
//! 依赖提取：统计故事引用的角色、资源和宏，供打包与署名计算使用。
//!
//! ## 设计原则
//!
//! - 只读遍历，不修改故事树，也不依赖编译器状态
//! - 三种提取器互相独立，可以以任意顺序或并发执行
//! - 每种提取器只定义区块规则，剧集和故事的聚合规则共用默认实现

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{Block, Macro, Oice, Story};

/// 依赖提取器
pub trait DependencyExtractor {
    /// 收集的元素
    type Item: Ord;

    /// 单个区块引用的元素
    fn visit_block(&self, block: &Block) -> BTreeSet<Self::Item>;

    /// 剧集内所有区块的并集
    fn visit_oice(&self, oice: &Oice) -> BTreeSet<Self::Item> {
        oice.blocks
            .iter()
            .flat_map(|block| self.visit_block(block))
            .collect()
    }

    /// 故事内所有剧集的并集
    fn visit_story(&self, story: &Story) -> BTreeSet<Self::Item> {
        story
            .oices
            .iter()
            .flat_map(|oice| self.visit_oice(oice))
            .collect()
    }
}

/// 角色提取：所有名为 `character` 的属性值
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterExtractor;

impl DependencyExtractor for CharacterExtractor {
    type Item = String;

    fn visit_block(&self, block: &Block) -> BTreeSet<String> {
        block
            .attributes
            .iter()
            .filter(|attr| attr.name() == "character")
            .filter_map(|attr| attr.value.clone())
            .collect()
    }
}

/// 资源提取：所有关联资源的完整导出文件名
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetExtractor;

impl DependencyExtractor for AssetExtractor {
    type Item = String;

    fn visit_block(&self, block: &Block) -> BTreeSet<String> {
        block
            .attributes
            .iter()
            .filter_map(|attr| attr.asset.as_deref())
            .map(|asset| asset.export_filename_with_ext())
            .collect()
    }
}

/// 按 ID 比较的宏引用
#[derive(Debug, Clone)]
pub struct UsedMacro(pub Arc<Macro>);

impl PartialEq for UsedMacro {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for UsedMacro {}

impl PartialOrd for UsedMacro {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UsedMacro {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

/// 宏提取：所有区块使用的不同宏
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroExtractor;

impl DependencyExtractor for MacroExtractor {
    type Item = UsedMacro;

    fn visit_block(&self, block: &Block) -> BTreeSet<UsedMacro> {
        BTreeSet::from([UsedMacro(block.macro_def.clone())])
    }
}

/// 故事的全部依赖
#[derive(Debug, Clone, Default)]
pub struct StoryDependencies {
    pub characters: BTreeSet<String>,
    pub assets: BTreeSet<String>,
    pub macros: BTreeSet<UsedMacro>,
}

/// 提取故事的全部依赖
///
/// 三个提取器并发执行，故事树在线程间只读共享。
pub fn extract_dependencies(story: &Story) -> StoryDependencies {
    std::thread::scope(|scope| {
        let characters = scope.spawn(|| CharacterExtractor.visit_story(story));
        let assets = scope.spawn(|| AssetExtractor.visit_story(story));
        let macros = MacroExtractor.visit_story(story);

        StoryDependencies {
            characters: characters
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e)),
            assets: assets.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
            macros,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Asset, AssetType, Attribute, AttributeDefinition};
    use std::collections::BTreeMap;

    fn macro_def(id: i64, tagname: &str) -> Arc<Macro> {
        Arc::new(Macro {
            id,
            name: tagname.to_string(),
            tagname: tagname.to_string(),
            attribute_definitions: Vec::new(),
        })
    }

    fn attribute(name: &str, value: Option<&str>, asset: Option<(i64, &str)>) -> Attribute {
        Attribute {
            definition: Arc::new(AttributeDefinition {
                name: name.to_string(),
                asset_type: if asset.is_some() {
                    AssetType::Reference
                } else {
                    AssetType::None
                },
                localizable: false,
                order: 0,
            }),
            value: value.map(String::from),
            asset: asset.map(|(id, filename)| {
                Arc::new(Asset {
                    id,
                    export_filename: filename.to_string(),
                    extension: Some("png".to_string()),
                    storage_url: String::new(),
                })
            }),
        }
    }

    fn block(id: i64, macro_def: Arc<Macro>, attributes: Vec<Attribute>) -> Block {
        Block {
            id,
            oice_id: 1,
            macro_def,
            attributes,
            localized: BTreeMap::new(),
        }
    }

    fn story() -> Story {
        let dialog = macro_def(1, "characterdialog");
        let bg = macro_def(2, "bg");

        let first = Oice {
            id: 1,
            filename: "ep1".to_string(),
            order: 0,
            published: true,
            blocks: vec![
                block(
                    1,
                    dialog.clone(),
                    vec![
                        attribute("character", Some("7"), None),
                        attribute("fg", None, Some((1, "alice_smile"))),
                    ],
                ),
                block(2, bg.clone(), vec![attribute("storage", None, Some((2, "room")))]),
            ],
        };
        let second = Oice {
            id: 2,
            filename: "ep2".to_string(),
            order: 1,
            published: true,
            blocks: vec![
                block(3, dialog, vec![attribute("character", Some("8"), None)]),
                block(4, bg, vec![attribute("storage", None, None)]),
            ],
        };

        Story {
            id: 1,
            language: "en".to_string(),
            oices: vec![first, second],
        }
    }

    #[test]
    fn test_character_extractor() {
        let story = story();
        assert_eq!(
            CharacterExtractor.visit_oice(&story.oices[0]),
            BTreeSet::from(["7".to_string()])
        );
        assert_eq!(
            CharacterExtractor.visit_story(&story),
            BTreeSet::from(["7".to_string(), "8".to_string()])
        );
    }

    #[test]
    fn test_asset_extractor_skips_absent() {
        let story = story();
        assert_eq!(
            AssetExtractor.visit_story(&story),
            BTreeSet::from(["alice_smile.png".to_string(), "room.png".to_string()])
        );
        assert!(AssetExtractor.visit_oice(&story.oices[1]).is_empty());
    }

    #[test]
    fn test_macro_extractor_distinct() {
        let story = story();
        let macros: Vec<_> = MacroExtractor
            .visit_story(&story)
            .into_iter()
            .map(|m| m.0.tagname.clone())
            .collect();
        assert_eq!(macros, vec!["characterdialog", "bg"]);
    }

    #[test]
    fn test_extract_dependencies() {
        let story = story();
        let deps = extract_dependencies(&story);
        assert_eq!(deps.characters.len(), 2);
        assert_eq!(deps.assets.len(), 2);
        assert_eq!(deps.macros.len(), 2);
    }
}
