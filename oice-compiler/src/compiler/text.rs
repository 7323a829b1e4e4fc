//! 脚本文本片段：对话、等待指令、选项文本编码。

/// 多行对话文本
///
/// 去掉首尾空白后按行拆分，相邻的非空行之间插入 `[r]` 换行标记；
/// 空行会打断换行标记。
pub fn dialog_text(text: &str) -> String {
    let normalized = text.trim().replace("\r\n", "\n");
    let mut script = String::new();
    let mut prev_filled = false;

    for line in normalized.split(['\n', '\r']) {
        if !line.is_empty() {
            if prev_filled {
                script.push_str("[r]\n");
            }
            script.push_str(line);
        }
        prev_filled = !line.is_empty();
    }

    script.push('\n');
    script
}

/// `@dialog` 指令及其文本
pub fn dialog_directive(text: &str, full_screen: bool) -> String {
    format!("@dialog fullscreen={full_screen}\n{}\n", dialog_text(text))
}

/// 点击等待；自动播放时改为自动等待
pub fn wait_click(autoplay: bool) -> &'static str {
    if autoplay { "@autowait\n" } else { "@l\n" }
}

/// 等待三个音轨的音效播放完毕
pub fn wait_sound(enabled: bool) -> String {
    if !enabled {
        return String::new();
    }
    (0..3)
        .map(|track| format!("@ws buf={track} canskip=\"true\"\n"))
        .collect()
}

/// 选项文本编码
///
/// URL 编码（保留字母数字、`_.-~/`），再把 `%` 替换为 `!`，
/// 避免与脚本引擎的 `%` 语法冲突。
pub fn encode_answer_text(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("!{byte:02X}")),
        }
    }
    encoded
}
