//! # KS Export
//!
//! 场景脚本导出工具 - 把故事文档（JSON）编译为每个剧集一份 `.ks` 脚本。
//!
//! ## 用法
//!
//! ```bash
//! # 在项目根目录使用 cargo 运行
//! cargo run -p ks-export -- build story.json
//! cargo run -p ks-export -- build story.json --out dist --language zh --scale 0.5
//! cargo run -p ks-export -- build stories/ --out dist
//! cargo run -p ks-export -- deps story.json --kind assets
//! cargo run -p ks-export -- progress story.json --finished 12,11
//!
//! # 日志级别
//! RUST_LOG=oice_compiler=debug ks-export build story.json
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use oice_compiler::{
    ExportConfig, IdentifyProbe, LinkedStory, ReadProgress, ScriptCompiler, StoryDocument,
    extract_dependencies, next_episode_to_read, viewable_episodes,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "ks-export")]
#[command(about = "场景脚本导出工具 - 把故事文档编译为 .ks 脚本")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件（默认：ks-export.json）
    #[arg(short, long, default_value = "ks-export.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// 编译故事文档
    ///
    /// 输入可以是单个文档，也可以是包含多个文档的目录。
    /// 不指定输出目录时打印到标准输出。
    Build {
        /// 故事文档或目录
        input: PathBuf,

        /// 编译语言（覆盖配置与故事主语言）
        #[arg(short, long)]
        language: Option<String>,

        /// 缩放系数（覆盖配置）
        #[arg(short, long)]
        scale: Option<f64>,

        /// 输出目录
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// 图片尺寸探测程序
        #[arg(long, default_value = "identify")]
        identify: String,
    },

    /// 列出故事依赖
    Deps {
        /// 故事文档
        input: PathBuf,

        /// 依赖类型（默认：全部）
        #[arg(short, long, value_enum)]
        kind: Option<DependencyKind>,
    },

    /// 计算下一集
    Progress {
        /// 故事文档
        input: PathBuf,

        /// 已读完的剧集 ID，最近读完的在前
        #[arg(short, long, value_delimiter = ',')]
        finished: Vec<i64>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum DependencyKind {
    Characters,
    Assets,
    Macros,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = real_main(cli) {
        eprintln!("❌ ks-export error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn real_main(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            input,
            language,
            scale,
            out,
            identify,
        } => {
            let config = load_config(&cli.config, language, scale)?;
            let probe = IdentifyProbe::with_program(identify);
            build(&input, out.as_deref(), &config, &probe)
        }
        Commands::Deps { input, kind } => print_dependencies(&input, kind),
        Commands::Progress { input, finished } => print_progress(&input, &finished),
    }
}

/// 加载配置：命令行参数 > 配置文件 > 默认值
fn load_config(
    path: &Path,
    language: Option<String>,
    scale: Option<f64>,
) -> anyhow::Result<ExportConfig> {
    let mut config = ExportConfig::load(path)?;
    if let Some(language) = language {
        config = config.with_language(language);
    }
    if let Some(scale) = scale {
        config = config.with_scale_factor(scale);
    }
    config.validate()?;
    Ok(config)
}

/// 读取并链接故事文档
fn load_story(path: &Path) -> anyhow::Result<LinkedStory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取故事文档: {}", path.display()))?;
    let document = StoryDocument::from_json(&text)
        .with_context(|| format!("故事文档格式错误: {}", path.display()))?;
    let linked = document
        .link()
        .with_context(|| format!("故事文档链接失败: {}", path.display()))?;
    Ok(linked)
}

/// 收集输入路径下的所有故事文档
fn collect_documents(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("路径不存在: {}", input.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn build(
    input: &Path,
    out: Option<&Path>,
    config: &ExportConfig,
    probe: &IdentifyProbe,
) -> anyhow::Result<()> {
    let documents = collect_documents(input)?;
    if documents.is_empty() {
        warn!(input = %input.display(), "未找到故事文档（.json）");
        return Ok(());
    }

    for document in &documents {
        let linked = load_story(document)?;
        let compiler = ScriptCompiler::new(config.clone(), &linked.characters, probe);
        let scripts = compiler
            .compile_story(&linked.story)
            .with_context(|| format!("编译失败: {}", document.display()))?;

        match out {
            Some(out) => {
                // 多个文档时按故事分目录，避免剧集文件名冲突
                let dir = if documents.len() > 1 {
                    out.join(format!("story_{}", linked.story.id))
                } else {
                    out.to_path_buf()
                };
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("无法创建输出目录: {}", dir.display()))?;

                for (filename, script) in &scripts {
                    let path = dir.join(format!("{filename}.ks"));
                    std::fs::write(&path, script)
                        .with_context(|| format!("无法写入脚本: {}", path.display()))?;
                }
                info!(
                    story_id = linked.story.id,
                    scripts = scripts.len(),
                    out = %dir.display(),
                    "脚本已写入"
                );
            }
            None => {
                for (filename, script) in &scripts {
                    println!(";; {filename}.ks");
                    println!("{script}");
                }
            }
        }
    }

    Ok(())
}

fn print_dependencies(input: &Path, kind: Option<DependencyKind>) -> anyhow::Result<()> {
    let linked = load_story(input)?;
    let deps = extract_dependencies(&linked.story);

    let macros: BTreeSet<String> = deps
        .macros
        .iter()
        .map(|m| format!("{} ({})", m.0.tagname, m.0.id))
        .collect();
    let sections = [
        (DependencyKind::Characters, "characters", &deps.characters),
        (DependencyKind::Assets, "assets", &deps.assets),
        (DependencyKind::Macros, "macros", &macros),
    ];

    for (section_kind, title, items) in sections {
        match kind {
            Some(kind) if kind != section_kind => continue,
            Some(_) => {}
            None => println!("[{title}]"),
        }
        for item in items {
            println!("{item}");
        }
    }

    Ok(())
}

fn print_progress(input: &Path, finished: &[i64]) -> anyhow::Result<()> {
    let linked = load_story(input)?;
    let story = &linked.story;

    let progress: Vec<ReadProgress> = finished
        .iter()
        .map(|&oice_id| ReadProgress {
            oice_id,
            is_finished: true,
        })
        .collect();

    match next_episode_to_read(story, &progress) {
        Some(oice) => println!("next: {} ({})", oice.id, oice.filename),
        None => println!("next: -"),
    }
    for availability in viewable_episodes(story, Some(&progress)) {
        let mark = if availability.viewable { "✓" } else { " " };
        println!("  [{mark}] {}", availability.oice_id);
    }

    Ok(())
}
