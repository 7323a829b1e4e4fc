//! # xtask - 开发辅助工具
//!
//! 本地门禁、覆盖率报告与故事文档检查，命令列表见 `cargo xtask help`。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use oice_compiler::{
    ExportConfig, ExternalToolError, ImageProbe, ImageSize, ScriptCompiler, StoryDocument,
    extract_dependencies,
};
use walkdir::WalkDir;

/// 执行一条 cargo 命令，非零退出即报错
fn cargo(args: &[&str]) -> anyhow::Result<()> {
    let line = format!("cargo {}", args.join(" "));
    eprintln!("\n==> {line}");

    let status = Command::new("cargo").args(args).status()?;
    anyhow::ensure!(status.success(), "`{line}` 退出状态 {status}");
    Ok(())
}

/// 门禁：格式、lint、测试依次执行，遇错即停
fn check_all() -> anyhow::Result<()> {
    const STEPS: [&[&str]; 3] = [
        &["fmt", "--all", "--", "--check"],
        &["clippy", "--workspace", "--all-targets"],
        &["test", "--workspace"],
    ];
    STEPS.iter().try_for_each(|step| cargo(step))
}

/// 生成 HTML 覆盖率报告，`scope` 为包选择参数
fn coverage(scope: &[&str]) -> anyhow::Result<()> {
    let available = Command::new("cargo")
        .args(["llvm-cov", "--version"])
        .status()
        .is_ok_and(|s| s.success());
    anyhow::ensure!(
        available,
        "找不到 cargo llvm-cov，安装方式：\n  \
         cargo install cargo-llvm-cov\n  \
         rustup component add llvm-tools-preview"
    );

    let mut args = vec!["llvm-cov"];
    args.extend_from_slice(scope);
    args.extend(["--all-features", "--html"]);
    cargo(&args)?;

    eprintln!("\n报告位置: target/llvm-cov/html/index.html");
    Ok(())
}

fn main() -> ExitCode {
    match dispatch(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("xtask: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: Vec<String>) -> anyhow::Result<()> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["check-all"] => check_all(),
        ["cov-compiler"] => coverage(&["-p", "oice-compiler"]),
        // 工具 crate 不计入覆盖率
        ["cov-workspace"] => coverage(&[
            "--workspace",
            "--exclude",
            "xtask",
            "--exclude",
            "ks-export",
        ]),
        ["story-check", rest @ ..] if rest.len() <= 1 => story_check(rest.first().copied()),
        [] | ["help" | "-h" | "--help"] => {
            print_help();
            Ok(())
        }
        other => anyhow::bail!("无法识别的参数: {}", other.join(" ")),
    }
}

fn print_help() {
    eprintln!(
        r#"cargo xtask <命令>

  check-all            fmt --check、clippy、test，任一失败即停止
  cov-compiler         oice-compiler 的 HTML 覆盖率
  cov-workspace        除工具 crate 外整个 workspace 的 HTML 覆盖率
  story-check [path]   链接并编译故事文档，检查角色与资源引用
                       path 可以是文件或目录，缺省为 assets/stories/

.cargo/config.toml 中的别名与命令同名，例如 `cargo story-check`。
"#
    );
}

//=============================================================================
// story-check 命令实现
//=============================================================================

/// 故事检查配置
struct StoryCheckConfig {
    /// 故事文档目录（相对于 workspace root）
    stories_dir: PathBuf,
    /// 导出资源目录（相对于 workspace root）
    assets_root: PathBuf,
}

impl Default for StoryCheckConfig {
    fn default() -> Self {
        Self {
            stories_dir: PathBuf::from("assets/stories"),
            assets_root: PathBuf::from("assets/export"),
        }
    }
}

/// 检查时不调用外部程序，道具按画布大小处理
struct CanvasProbe(f64);

impl ImageProbe for CanvasProbe {
    fn dimensions(&self, _path: &str) -> Result<ImageSize, ExternalToolError> {
        Ok(ImageSize {
            width: self.0,
            height: self.0,
        })
    }
}

/// 故事检查结果
#[derive(Default)]
struct StoryCheckResult {
    /// 检查的文档数量
    documents_checked: usize,
    /// 错误
    errors: Vec<String>,
    /// 警告
    warnings: Vec<String>,
}

/// 执行故事检查
fn story_check(path: Option<&str>) -> anyhow::Result<()> {
    let config = StoryCheckConfig::default();

    // 确定要检查的文件
    let files = match path {
        Some(p) => {
            let path = PathBuf::from(p);
            if path.is_file() {
                vec![path]
            } else if path.is_dir() {
                collect_story_files(&path)
            } else {
                anyhow::bail!("路径不存在: {}", p);
            }
        }
        None => {
            if !config.stories_dir.exists() {
                anyhow::bail!(
                    "默认故事目录不存在: {}\n请在 workspace 根目录运行，或指定文档路径",
                    config.stories_dir.display()
                );
            }
            collect_story_files(&config.stories_dir)
        }
    };

    if files.is_empty() {
        eprintln!("未找到故事文档（.json）");
        return Ok(());
    }

    eprintln!("==> 检查 {} 个故事文档...\n", files.len());

    let mut result = StoryCheckResult::default();
    for file in &files {
        check_story_file(file, &config, &mut result);
    }

    print_check_result(&result);

    if !result.errors.is_empty() {
        anyhow::bail!("故事检查发现错误");
    }

    Ok(())
}

/// 收集目录下的所有故事文档
fn collect_story_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// 检查单个故事文档
fn check_story_file(file: &Path, config: &StoryCheckConfig, result: &mut StoryCheckResult) {
    let story_id = file.display().to_string();
    result.documents_checked += 1;

    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            result.errors.push(format!("{story_id}: 无法读取文件 - {e}"));
            return;
        }
    };

    let linked = match StoryDocument::from_json(&content) {
        Ok(document) => match document.link() {
            Ok(linked) => linked,
            Err(e) => {
                result.errors.push(format!("{story_id}: {e}"));
                return;
            }
        },
        Err(e) => {
            result.errors.push(format!("{story_id}: JSON 格式错误 - {e}"));
            return;
        }
    };

    // 编译所有剧集
    let export = ExportConfig::default();
    let probe = CanvasProbe(f64::from(export.screen_size));
    let compiler = ScriptCompiler::new(export, &linked.characters, &probe);
    if let Err(e) = compiler.compile_story(&linked.story) {
        result.errors.push(format!("{story_id}: {e}"));
    }

    let deps = extract_dependencies(&linked.story);

    // 角色引用
    let known: BTreeSet<String> = linked.characters.iter().map(|c| c.id.to_string()).collect();
    for character in deps.characters.difference(&known) {
        result
            .warnings
            .push(format!("{story_id}: 角色不存在 {character}"));
    }

    // 资源文件
    for asset in &deps.assets {
        if !config.assets_root.join(asset).exists() {
            result
                .warnings
                .push(format!("{story_id}: 资源不存在 {asset}"));
        }
    }
}

/// 输出检查结果
fn print_check_result(result: &StoryCheckResult) {
    eprintln!("─────────────────────────────────────────────────────");
    eprintln!("检查完成: {} 个故事文档", result.documents_checked);
    eprintln!();

    for error in &result.errors {
        eprintln!("[ERROR] {error}");
    }
    for warning in &result.warnings {
        eprintln!("[WARN] {warning}");
    }

    let error_count = result.errors.len();
    let warn_count = result.warnings.len();

    eprintln!();
    if error_count > 0 {
        eprintln!("❌ {} 个错误, {} 个警告", error_count, warn_count);
    } else if warn_count > 0 {
        eprintln!("⚠️  0 个错误, {} 个警告", warn_count);
    } else {
        eprintln!("✅ 检查通过，无错误");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dispatch_rejects_unknown_arguments() {
        assert!(dispatch(args(&["help"])).is_ok());
        assert!(dispatch(args(&[])).is_ok());

        let err = dispatch(args(&["bogus"])).unwrap_err();
        assert!(err.to_string().contains("bogus"));
        // story-check 最多接受一个路径
        assert!(dispatch(args(&["story-check", "a.json", "b.json"])).is_err());
        assert!(dispatch(args(&["check-all", "--fix"])).is_err());
    }

    #[test]
    fn test_unreadable_story_is_reported() {
        let mut result = StoryCheckResult::default();
        check_story_file(
            Path::new("does-not-exist.json"),
            &StoryCheckConfig::default(),
            &mut result,
        );

        assert_eq!(result.documents_checked, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("无法读取文件"));
    }
}
