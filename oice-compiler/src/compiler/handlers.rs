//! 各区块类型的处理函数。

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use super::text::{dialog_directive, dialog_text, encode_answer_text, wait_click, wait_sound};
use super::{EpisodeContext, MessageBlock, ScriptCompiler};
use crate::error::{ExportResult, FormatError, ValidationError};
use crate::model::{AssetType, Attribute, Block, BlockKind, Character};
use crate::probe::ImageSize;
use crate::resolver::{LocalizedAttributes, render_attribute, resolve_with_literal};
use crate::staging::{CharacterScene, StageDirective, StagePosition};

/// 对话隐藏时的固定等待
const HIDDEN_DIALOG_WAIT: &str = "@wait time=300\n";

/// 选项的一个回答，键保持编辑器中的顺序
type OptionAnswer = Map<String, Value>;

/// 取出回答的跳转目标与显示文本
fn answer_fields(answer: &OptionAnswer) -> Option<(String, &str)> {
    let target = match answer.get("target")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let content = answer.get("content")?.as_str()?;
    Some((target, content))
}

/// 展示选项后发给宿主的动作负载
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowOptionsPayload<'a> {
    oice_id: i64,
    block_id: i64,
    question: &'a str,
    answers: &'a [OptionAnswer],
}

/// 宿主脚本引擎读取的 JSON 排版
///
/// 分隔符为 `", "` 与 `": "`，非 ASCII 字符按 UTF-16 码元写成 `\uXXXX`。
struct EngineJsonFormatter;

impl Formatter for EngineJsonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

fn engine_json(value: &impl Serialize) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, EngineJsonFormatter);
    value.serialize(&mut serializer)?;
    // 输出只含 ASCII
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// 脚本引擎的字符串字面值
///
/// 默认使用单引号；文本含单引号而不含双引号时改用双引号。
fn quoted_literal(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut literal = String::with_capacity(text.len() + 2);
    literal.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => literal.push_str("\\\\"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if c == quote => {
                literal.push('\\');
                literal.push(c);
            }
            c => literal.push(c),
        }
    }
    literal.push(quote);
    literal
}

/// `[o2_iscript]` 副作用动作
///
/// 动作写成 `{'type': ..., 'payload': ...}`，负载先编码为 JSON 文本。
fn post_oice_action(
    block: &Block,
    action_type: &str,
    payload: &impl Serialize,
) -> Result<String, FormatError> {
    let payload = engine_json(payload).map_err(|e| FormatError::ActionPayload {
        block_id: block.id,
        message: e.to_string(),
    })?;

    Ok(format!(
        "[o2_iscript]new Tag(\"postoiceaction\", {{'type': {}, 'payload': {}}}).run()[o2_endscript]\n",
        quoted_literal(action_type),
        quoted_literal(&payload),
    ))
}

impl ScriptCompiler<'_> {
    /// 解析属性并追加 ` name="value"`，缺失或为空时跳过
    fn push_attribute(
        &self,
        script: &mut String,
        attribute: &Attribute,
        block: &Block,
        language: &str,
        literal: Option<&str>,
    ) -> Result<(), FormatError> {
        let Some(value) = resolve_with_literal(attribute, block, language, literal)? else {
            return Ok(());
        };
        if value.is_empty() && attribute.asset_type() != AssetType::Reference {
            return Ok(());
        }

        script.push(' ');
        script.push_str(&render_attribute(attribute.name(), &value));
        Ok(())
    }

    /// 按缩放系数换算坐标（向零截断）
    fn scale_literal(&self, block: &Block, name: &str, value: &str) -> Result<i64, FormatError> {
        let number: f64 = value.trim().parse().map_err(|_| FormatError::InvalidNumber {
            block_id: block.id,
            attribute: name.to_string(),
            value: value.to_string(),
        })?;
        Ok((number * self.config.scale_factor) as i64)
    }

    /// 道具在画布上居中时的 (top, left)
    fn centered_offset(&self, size: ImageSize) -> (i64, i64) {
        let screen = f64::from(self.config.screen_size);
        let scale = self.config.scale_factor;
        let top = (scale * (screen - size.height) / 2.0) as i64;
        let left = (scale * (screen - size.width) / 2.0) as i64;
        (top, left)
    }

    fn render_directives(&self, directives: &[StageDirective]) -> String {
        directives
            .iter()
            .map(|d| d.render(&self.config.staging))
            .collect()
    }

    /// 默认处理：`@tagname name="value" ...`
    pub(super) fn default_block(&self, block: &Block, language: &str) -> ExportResult<String> {
        let mut script = format!("@{}", block.tagname());

        for attribute in &block.attributes {
            let name = attribute.name();
            if attribute.asset_type() == AssetType::Reference && name == "rule" {
                continue;
            }

            let scaled: String;
            let mut literal = attribute.value.as_deref().filter(|v| !v.is_empty());
            if self.config.scalable_attributes.contains(name)
                && let Some(value) = literal
            {
                let number = self.scale_literal(block, name, value)?;
                scaled = number.to_string();
                // 缩放结果为 0 时视为缺失
                literal = (number != 0).then_some(scaled.as_str());
            }

            self.push_attribute(&mut script, attribute, block, language, literal)?;
        }

        script.push('\n');
        Ok(script)
    }

    pub(super) fn autoplay_block(
        &self,
        block: &Block,
        language: &str,
        context: &mut EpisodeContext,
    ) -> ExportResult<String> {
        let script = self.default_block(block, language)?;
        context.autoplay = true;
        Ok(script)
    }

    /// 仅在自动播放开启时输出，然后总是关闭自动播放
    pub(super) fn cancel_autoplay_block(
        &self,
        block: &Block,
        language: &str,
        context: &mut EpisodeContext,
    ) -> ExportResult<String> {
        let script = if context.autoplay {
            self.default_block(block, language)?
        } else {
            String::new()
        };
        context.autoplay = false;
        Ok(script)
    }

    /// 道具：根据图片尺寸计算居中位置
    ///
    /// 注意输出末尾没有换行。
    pub(super) fn item_block(&self, block: &Block, language: &str) -> ExportResult<String> {
        let mut script = format!("@{}", block.tagname());

        for attribute in &block.attributes {
            // 居中坐标紧贴在 storage 之前，前面的属性保持原位
            if attribute.name() == "storage"
                && let Some(asset) = attribute.asset.as_deref()
            {
                let size = self.probe.dimensions(&asset.storage_url)?;
                let (top, left) = self.centered_offset(size);
                script.push_str(&format!(" top={top} left={left}"));
            }

            let literal = attribute.value.as_deref();
            self.push_attribute(&mut script, attribute, block, language, literal)?;
        }

        Ok(script)
    }

    /// 标签：`*name|caption` + `@optionclear`
    pub(super) fn label_block(&self, block: &Block, language: &str) -> ExportResult<String> {
        let attrs = LocalizedAttributes::of(block, language);

        let name = attrs
            .text("name")
            .ok_or_else(|| ValidationError::LabelNameNotFound {
                block_id: block.id,
                language: language.to_string(),
            })?;

        let mut script = format!("*{name}");
        if let Some(caption) = attrs.text("caption") {
            script.push('|');
            script.push_str(caption);
        }
        script.push_str("\n@optionclear");
        Ok(script)
    }

    pub(super) fn comment_block(&self, block: &Block, language: &str) -> String {
        let attrs = LocalizedAttributes::of(block, language);
        format!(";{}\n", attrs.text("text").unwrap_or(""))
    }

    /// 选项：问题、回答列表与展示动作
    pub(super) fn option_block(&self, block: &Block, language: &str) -> ExportResult<String> {
        let attrs = LocalizedAttributes::of(block, language);
        let question = attrs.text("question").unwrap_or("");

        let raw_answers =
            attrs
                .text("answers")
                .ok_or_else(|| ValidationError::OptionAnswersNotFound {
                    block_id: block.id,
                    language: language.to_string(),
                })?;
        let not_json = |message: String| ValidationError::OptionAnswersNotInJsonFormat {
            block_id: block.id,
            language: language.to_string(),
            message,
        };
        let answers: Vec<OptionAnswer> =
            serde_json::from_str(raw_answers).map_err(|e| not_json(e.to_string()))?;

        let mut script = format!("@optionstart\n{}\n", dialog_text(question));
        for (index, answer) in answers.iter().enumerate() {
            let (target, content) = answer_fields(answer)
                .ok_or_else(|| not_json(format!("回答 {index} 缺少 target 或 content")))?;
            script.push_str(&format!(
                "@optionanswer storage=\"{language}.ks\" target=\"{target}\" text=\"{}\" oiceid={} blockid={} index={index}\n",
                encode_answer_text(content),
                block.oice_id,
                block.id,
            ));
        }

        let payload = ShowOptionsPayload {
            oice_id: block.oice_id,
            block_id: block.id,
            question,
            answers: &answers,
        };
        script.push_str(&post_oice_action(block, "oice.didShowOptions", &payload)?);
        script.push_str("@optionend\n");
        Ok(script)
    }

    /// 查找对话区块引用的角色，找不到时返回 `None`
    fn lookup_character(&self, block: &Block, attrs: &LocalizedAttributes<'_>) -> Option<&Character> {
        let raw = attrs.text("character");
        let character = raw
            .and_then(|id| id.trim().parse().ok())
            .and_then(|id| self.character(id));

        if character.is_none() {
            warn!(block_id = block.id, character = ?raw, "角色不存在，跳过对话区块");
        }
        character
    }

    /// 角色对话
    ///
    /// 角色找不到时不输出任何内容，上下文保持不变。
    pub(super) fn character_dialog_block(
        &self,
        block: &Block,
        language: &str,
        context: &mut EpisodeContext,
    ) -> String {
        let attrs = LocalizedAttributes::of(block, language);
        let Some(character) = self.lookup_character(block, &attrs) else {
            return String::new();
        };

        let mut script = String::new();

        // 淡出旁白的消息层
        if context
            .prev_message
            .is_some_and(|m| m.kind == BlockKind::Aside)
        {
            script.push_str("@clearmessage\n");
        }

        let consecutive = context.prev_character == Some(character.id);
        if !consecutive {
            script.push_str("@cm\n");
        }

        let position = match attrs.text("position") {
            None => StagePosition::Left,
            Some(raw) => StagePosition::parse(raw).unwrap_or_else(|| {
                warn!(block_id = block.id, position = raw, "未知的站位，使用 left");
                StagePosition::Left
            }),
        };
        let scene = CharacterScene::new(
            character,
            attrs.asset("fg"),
            attrs.optional_flag("fliplr"),
        );
        let (staging, directives) = std::mem::take(&mut context.staging).enter(position, scene);
        context.staging = staging;
        script.push_str(&self.render_directives(&directives));

        if attrs.flag("hidedialog") {
            script.push_str(HIDDEN_DIALOG_WAIT);
        } else {
            let mut name = character.display_name(language);
            if character.is_generic
                && let Some(custom) = attrs.text("name").filter(|n| !n.is_empty())
            {
                name = custom;
            }

            if !name.is_empty()
                && (context.prev_character_name.as_deref() != Some(name) || !consecutive)
            {
                context.prev_character_name = Some(name.to_string());
                script.push_str(&format!("@charactername name=\"{name}\"\n"));
            }

            if let Some(dialog) = attrs.text("dialog") {
                script.push_str(&dialog_directive(dialog, false));
            }
            script.push_str(wait_click(context.autoplay));
        }

        script.push_str(&wait_sound(attrs.flag("waitse")));

        if attrs.flag("fgexit") {
            let (staging, exit) = std::mem::take(&mut context.staging).exit(position);
            context.staging = staging;
            script.push_str(&exit.render(&self.config.staging));
        }

        context.prev_character = Some(character.id);
        context.prev_message = Some(MessageBlock {
            block_id: block.id,
            kind: block.kind(),
        });
        script
    }

    /// 同一角色继续说话，不重新布置立绘
    pub(super) fn add_talk_block(
        &self,
        block: &Block,
        language: &str,
        context: &mut EpisodeContext,
    ) -> String {
        let attrs = LocalizedAttributes::of(block, language);
        let mut script = String::new();

        if let Some(talk) = attrs.text("talk") {
            script.push_str(&dialog_directive(talk, false));
        }
        script.push_str(wait_click(context.autoplay));
        script.push_str(&wait_sound(attrs.flag("waitse")));

        context.prev_message = Some(MessageBlock {
            block_id: block.id,
            kind: block.kind(),
        });
        script
    }

    /// 旁白
    pub(super) fn aside_block(
        &self,
        block: &Block,
        language: &str,
        context: &mut EpisodeContext,
    ) -> String {
        let attrs = LocalizedAttributes::of(block, language);
        let full_screen = attrs.flag("fullscreen");

        let mut script = String::from("@asideTalk\n");
        if let Some(text) = attrs.text("text") {
            script.push_str(&dialog_directive(text, full_screen));
        }
        script.push_str(wait_click(context.autoplay));
        script.push_str(&wait_sound(attrs.flag("waitse")));

        context.prev_character = None;
        context.prev_message = Some(MessageBlock {
            block_id: block.id,
            kind: block.kind(),
        });

        if full_screen {
            script.push_str("@oice_glyph\n");
        }
        script
    }

    /// 立绘退场
    pub(super) fn stage_exit_block(
        &self,
        position: StagePosition,
        context: &mut EpisodeContext,
    ) -> String {
        let (staging, exit) = std::mem::take(&mut context.staging).exit(position);
        context.staging = staging;
        exit.render(&self.config.staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_literal_picks_quote() {
        assert_eq!(quoted_literal("oice.didShowOptions"), "'oice.didShowOptions'");
        assert_eq!(quoted_literal("It's"), "\"It's\"");
        // 两种引号都有时用单引号并转义
        assert_eq!(quoted_literal(r#"It's "x""#), r#"'It\'s "x"'"#);
        assert_eq!(quoted_literal("a\\b\nc"), r"'a\\b\nc'");
    }

    #[test]
    fn test_engine_json_layout() {
        let answers: Vec<OptionAnswer> =
            serde_json::from_str(r#"[{"z":1,"a":[1,2],"t":"é\"😀"}]"#).unwrap();
        assert_eq!(
            engine_json(&answers).unwrap(),
            r#"[{"z": 1, "a": [1, 2], "t": "\u00e9\"\ud83d\ude00"}]"#
        );
        assert_eq!(engine_json(&Vec::<OptionAnswer>::new()).unwrap(), "[]");
    }
}
