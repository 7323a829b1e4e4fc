//! # Resolver 模块
//!
//! 计算区块属性在目标语言下的有效值。
//!
//! 规则按优先级：
//! - `reference`：关联资源的导出名，未关联资源视为缺失
//! - `color`：`#RRGGBB` 转为 `0xRRGGBB`
//! - 可本地化：从区块的本地化表中按语言查找
//! - 其他：字面值原样使用

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::FormatError;
use crate::model::{Asset, AssetType, Attribute, Block};

/// 解析属性值
///
/// 返回 `Ok(None)` 表示属性缺失，调用方应跳过该属性。
pub fn resolve_attribute<'a>(
    attribute: &'a Attribute,
    block: &'a Block,
    language: &str,
) -> Result<Option<Cow<'a, str>>, FormatError> {
    resolve_with_literal(attribute, block, language, attribute.value.as_deref())
}

/// 与 [`resolve_attribute`] 相同，但使用调用方提供的字面值（如缩放后的坐标）
pub fn resolve_with_literal<'a>(
    attribute: &'a Attribute,
    block: &'a Block,
    language: &str,
    literal: Option<&'a str>,
) -> Result<Option<Cow<'a, str>>, FormatError> {
    let definition = &attribute.definition;
    match definition.asset_type {
        AssetType::Reference => Ok(attribute
            .asset
            .as_deref()
            .map(|asset| Cow::Borrowed(asset.export_token()))),
        AssetType::Color => literal
            .map(|value| {
                color_literal(value).ok_or_else(|| FormatError::InvalidColor {
                    block_id: block.id,
                    attribute: definition.name.clone(),
                    value: value.to_string(),
                })
            })
            .transpose()
            .map(|v| v.map(Cow::Owned)),
        AssetType::None if definition.localizable => Ok(block
            .localized_text(language, &definition.name)
            .map(Cow::Borrowed)),
        AssetType::None => Ok(literal.map(Cow::Borrowed)),
    }
}

/// 渲染为脚本中的 `name="value"`
pub fn render_attribute(name: &str, value: &str) -> String {
    format!("{name}=\"{value}\"")
}

/// 颜色字面值转换：`#abc` / `#aabbcc` / `#aabbccdd` -> `0x...`
///
/// 已经是 `0x` 前缀的值原样返回。
fn color_literal(value: &str) -> Option<String> {
    let digits = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"))?;
    let valid = matches!(digits.len(), 3 | 4 | 6 | 8)
        && digits.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| format!("0x{digits}"))
}

/// 标志属性是否为真
///
/// 存在、非空且不是 `false` / `0`（不区分大小写）。
pub fn is_truthy(value: &str) -> bool {
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// 区块在某个语言下的属性视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue<'a> {
    Text(&'a str),
    Asset(&'a Asset),
}

/// 按名称访问的属性视图
///
/// 对应外部的本地化属性访问器：`(block, language) -> name -> value`。
#[derive(Debug, Clone, Default)]
pub struct LocalizedAttributes<'a> {
    values: BTreeMap<&'a str, AttributeValue<'a>>,
}

impl<'a> LocalizedAttributes<'a> {
    /// 构建区块在指定语言下的属性视图
    ///
    /// 本地化表中没有对应属性定义的条目同样可见。
    pub fn of(block: &'a Block, language: &str) -> Self {
        let mut values = BTreeMap::new();

        for attribute in &block.attributes {
            let name = attribute.name();
            let value = match attribute.asset_type() {
                AssetType::Reference => attribute.asset.as_deref().map(AttributeValue::Asset),
                _ if attribute.definition.localizable => {
                    block.localized_text(language, name).map(AttributeValue::Text)
                }
                _ => attribute.value.as_deref().map(AttributeValue::Text),
            };
            if let Some(value) = value {
                values.insert(name, value);
            }
        }

        if let Some(localized) = block.localized.get(language) {
            for (name, text) in localized {
                values
                    .entry(name.as_str())
                    .or_insert(AttributeValue::Text(text.as_str()));
            }
        }

        Self { values }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// 文本值；资源属性返回其导出名
    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).map(|value| match value {
            AttributeValue::Text(text) => *text,
            AttributeValue::Asset(asset) => (*asset).export_token(),
        })
    }

    /// 资源值
    pub fn asset(&self, name: &str) -> Option<&'a Asset> {
        match self.values.get(name) {
            Some(AttributeValue::Asset(asset)) => Some(*asset),
            _ => None,
        }
    }

    /// 标志值，缺失为 false
    pub fn flag(&self, name: &str) -> bool {
        self.text(name).is_some_and(is_truthy)
    }

    /// 可选标志：缺失为 `None`
    pub fn optional_flag(&self, name: &str) -> Option<bool> {
        self.text(name).map(is_truthy)
    }
}
