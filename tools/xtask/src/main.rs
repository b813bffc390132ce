//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `cov-runtime`: 运行 anim-runtime 覆盖率
//! - `cov-workspace`: 运行 workspace 覆盖率
//! - `scene-check`: 静态检查场景文件
//! - `scene-trace`: 逐帧回放状态切换并打印属性变化

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anim_runtime::{
    AnimationConfig, Animator, DiagnosticResult, JobEvent, JobId, ManualTime, Scene, SceneDesc,
    Value, analyze_json,
};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info};
use walkdir::WalkDir;
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "开发辅助工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行 fmt、clippy、test 门禁检查
    CheckAll,

    /// 运行 anim-runtime 覆盖率报告
    CovRuntime,

    /// 运行 workspace 覆盖率报告
    CovWorkspace,

    /// 检查场景文件
    ///
    /// 不带参数时检查 scenes/ 下所有 .json 文件。
    SceneCheck {
        /// 场景文件或目录
        path: Option<PathBuf>,
    },

    /// 逐帧回放状态切换
    ///
    /// 依次切换到给定状态，每个状态跑到所有动画结束，打印每帧变化的属性。
    SceneTrace {
        /// 场景文件
        file: PathBuf,

        /// 依次切换的状态（空字符串表示基础状态）
        states: Vec<String>,

        /// 帧间隔（毫秒）
        #[arg(long, default_value = "16")]
        frame_ms: i64,

        /// 每个状态最多回放的时长（毫秒）
        #[arg(long, default_value = "10000")]
        max_ms: i64,

        /// 只打印这些属性（`对象.属性`）
        #[arg(short, long)]
        watch: Vec<String>,

        /// 动画配置文件
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = real_main(cli.command) {
        eprintln!("xtask error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn real_main(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::CheckAll => {
            let sh = Shell::new()?;
            eprintln!("\n==> cargo fmt --all -- --check");
            cmd!(sh, "cargo fmt --all -- --check").run()?;
            eprintln!("\n==> cargo clippy --workspace --all-targets");
            cmd!(sh, "cargo clippy --workspace --all-targets").run()?;
            eprintln!("\n==> cargo test --workspace");
            cmd!(sh, "cargo test --workspace").run()?;
        }
        Commands::CovRuntime => {
            let sh = Shell::new()?;
            ensure_cargo_llvm_cov_available(&sh)?;
            cmd!(sh, "cargo llvm-cov -p anim-runtime --all-features --html").run()?;
            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        Commands::CovWorkspace => {
            let sh = Shell::new()?;
            ensure_cargo_llvm_cov_available(&sh)?;
            // 排除 xtask，避免稀释信号
            cmd!(
                sh,
                "cargo llvm-cov --workspace --exclude xtask --all-features --html"
            )
            .run()?;
            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        Commands::SceneCheck { path } => scene_check(path.as_deref())?,
        Commands::SceneTrace {
            file,
            states,
            frame_ms,
            max_ms,
            watch,
            config,
        } => {
            let options = TraceOptions {
                frame_ms,
                max_ms,
                watch,
            };
            scene_trace(&file, &states, config.as_deref(), &options)?;
        }
    }

    Ok(())
}

fn ensure_cargo_llvm_cov_available(sh: &Shell) -> anyhow::Result<()> {
    if cmd!(sh, "cargo llvm-cov --version").quiet().run().is_err() {
        anyhow::bail!(
            "cargo llvm-cov 不可用。\n\
请先安装：\n\
  - cargo install cargo-llvm-cov\n\
  - rustup component add llvm-tools-preview\n\
然后重试。"
        );
    }
    Ok(())
}

//=============================================================================
// scene-check 命令实现
//=============================================================================

/// 默认场景目录（相对于 workspace root）
const SCENES_DIR: &str = "scenes";

/// 执行场景检查
fn scene_check(path: Option<&Path>) -> anyhow::Result<()> {
    let files = match path {
        Some(path) if path.is_file() => vec![path.to_path_buf()],
        Some(path) if path.is_dir() => collect_scene_files(path),
        Some(path) => anyhow::bail!("路径不存在: {}", path.display()),
        None => {
            let dir = Path::new(SCENES_DIR);
            if !dir.exists() {
                anyhow::bail!(
                    "默认场景目录不存在: {}\n请在 workspace 根目录运行，或指定场景路径",
                    dir.display()
                );
            }
            collect_scene_files(dir)
        }
    };

    if files.is_empty() {
        eprintln!("未找到场景文件（.json）");
        return Ok(());
    }

    eprintln!("==> 检查 {} 个场景文件...\n", files.len());

    let mut result = DiagnosticResult::new();
    for file in &files {
        let scene_id = file.display().to_string();
        match std::fs::read_to_string(file) {
            Ok(text) => {
                debug!(file = %scene_id, "检查场景");
                result.merge(analyze_json(&scene_id, &text));
            }
            Err(e) => result.push(anim_runtime::Diagnostic::error(
                scene_id,
                format!("无法读取文件 - {e}"),
            )),
        }
    }

    print_check_result(files.len(), &result);

    if result.has_errors() {
        anyhow::bail!("场景检查发现错误");
    }
    Ok(())
}

/// 收集目录下的所有场景文件
fn collect_scene_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// 输出检查结果
fn print_check_result(checked: usize, result: &DiagnosticResult) {
    eprintln!("─────────────────────────────────────────────────────");
    eprintln!("检查完成: {} 个场景", checked);
    eprintln!();

    for diag in &result.diagnostics {
        eprintln!("{}", diag);
    }

    let error_count = result.error_count();
    let warn_count = result.warn_count();

    eprintln!();
    if error_count > 0 {
        eprintln!("❌ {} 个错误, {} 个警告", error_count, warn_count);
    } else if warn_count > 0 {
        eprintln!("⚠️  0 个错误, {} 个警告", warn_count);
    } else {
        eprintln!("✅ 检查通过，无错误");
    }
}

//=============================================================================
// scene-trace 命令实现
//=============================================================================

struct TraceOptions {
    frame_ms: i64,
    max_ms: i64,
    watch: Vec<String>,
}

type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

fn scene_trace(
    file: &Path,
    states: &[String],
    config: Option<&Path>,
    options: &TraceOptions,
) -> anyhow::Result<()> {
    if options.frame_ms <= 0 {
        anyhow::bail!("帧间隔必须大于 0，当前为 {}", options.frame_ms);
    }

    let config = config.map(AnimationConfig::load).unwrap_or_default();
    config.validate()?;

    let text = std::fs::read_to_string(file)?;
    let desc = SceneDesc::from_json(&text)?;
    let mut scene = Scene::from_desc_with_config(&desc, &config)?;
    let mut animator =
        Animator::with_time_source(config.clock.clone(), Box::new(ManualTime::new()));
    info!(scene = %scene.name(), "开始回放");

    let mut now = 0;
    let mut previous = scene.snapshot();
    log_events(now, animator.advance(now));

    for state in states {
        println!("==> t={now}ms 切换到状态 '{state}'");
        scene.set_state(&mut animator, state);
        // 并入待启动任务
        log_events(now, animator.advance(now));
        previous = print_changes(now, &previous, scene.snapshot(), &options.watch);

        let deadline = now + options.max_ms;
        while animator.needs_tick() && now < deadline {
            now += options.frame_ms;
            log_events(now, animator.advance(now));
            previous = print_changes(now, &previous, scene.snapshot(), &options.watch);
        }
        if animator.needs_tick() {
            println!("    (t={now}ms 仍有动画在运行，已截断)");
        }
    }

    println!("==> t={now}ms 结束于状态 '{}'", scene.group().state());
    Ok(())
}

fn log_events(now: i64, events: Vec<(JobId, JobEvent)>) {
    for (job, event) in events {
        debug!(t = now, job = %job, ?event, "任务事件");
    }
}

/// 打印与上一帧不同的属性，返回本帧快照
fn print_changes(now: i64, previous: &Snapshot, current: Snapshot, watch: &[String]) -> Snapshot {
    for (object, values) in &current {
        for (property, value) in values {
            let key = format!("{object}.{property}");
            if !watch.is_empty() && !watch.contains(&key) {
                continue;
            }
            let before = previous.get(object).and_then(|v| v.get(property));
            if before == Some(value) {
                continue;
            }
            let shown = serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"));
            println!("    t={now}ms {key} = {shown}");
        }
    }
    current
}
