use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

const BINARIES: [&str; 2] = ["dropshare-server", "dropshare"];

#[derive(Parser)]
#[command(name = "xtask", about = "Dropshare 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行服务器 (开发模式)
    Dev {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "debug")]
        log_level: String,
        /// 文件存储目录 (默认 target/dev-files)
        #[arg(short, long)]
        storage: Option<String>,
    },
    /// 安装到 /usr/local/bin
    Install,
    /// 从 /usr/local/bin 卸载
    Uninstall,
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Dev { log_level, storage } => dev(&sh, &log_level, storage)?,
        Commands::Install => install(&sh)?,
        Commands::Uninstall => uninstall(&sh)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(
        sh,
        "cargo build --release -p dropshare-server -p dropshare-cli"
    )
    .run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn dev(sh: &Shell, log_level: &str, storage: Option<String>) -> Result<()> {
    let storage = storage.unwrap_or_else(|| "target/dev-files".to_string());

    println!("🚀 启动开发模式服务器...");
    println!("   日志级别: {}", log_level);
    println!("   存储目录: {}", storage);

    let rust_log = format!("{level},dropshare_core={level}", level = log_level);
    let _env = sh.push_env("RUST_LOG", rust_log);
    cmd!(
        sh,
        "cargo run -p dropshare-server -- --bind 127.0.0.1:5000 --storage {storage}"
    )
    .run()?;
    Ok(())
}

fn install(sh: &Shell) -> Result<()> {
    println!("📦 安装 Dropshare...");

    build(sh)?;

    println!("📋 复制二进制文件...");
    for bin in BINARIES {
        cmd!(sh, "sudo cp target/release/{bin} /usr/local/bin/").run()?;
    }

    println!("✅ 安装完成");
    println!("   使用 'dropshare-server' 启动服务器");
    println!("   使用 'dropshare --help' 查看命令");
    Ok(())
}

fn uninstall(sh: &Shell) -> Result<()> {
    println!("🗑️  卸载 Dropshare...");

    for bin in BINARIES {
        let _ = cmd!(sh, "sudo rm /usr/local/bin/{bin}").run();
    }

    println!("✅ 卸载完成");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("dropshare-{}-linux-x86_64", version);

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    for bin in BINARIES {
        cmd!(sh, "cp target/release/{bin} dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages dropshare-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    cmd!(sh, "rm -rf dist").run()?;
    println!("✅ 清理完成");
    Ok(())
}
