//! VPST CLI 应用

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};
use vpst_executor::RunConfig;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "vpst")]
#[command(about = "OCI 卷供应器系统测试", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 部署卷供应器
    #[arg(long)]
    setup: bool,

    /// 不运行测试场景
    #[arg(long)]
    no_test: bool,

    /// 检查供应商侧的资源
    #[arg(long, requires = "setup")]
    check_oci: bool,

    /// 退出时拆除卷供应器
    #[arg(long)]
    teardown: bool,

    /// 测试套件 (block/fss/backup/all)
    #[arg(long, default_value = "block")]
    suite: String,

    /// 场景文件，替换内置套件中的场景
    #[arg(long)]
    scenarios: Option<String>,

    /// 测试 ID，默认随机生成
    #[arg(long)]
    test_id: Option<String>,

    /// 文件存储子网 OCID
    #[arg(long)]
    subnet_ocid: Option<String>,

    /// 不写出完成标记
    #[arg(long)]
    no_report: bool,
}

impl Cli {
    /// 加载配置并应用命令行覆盖
    fn load_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load_with_file(path)?,
            None => RunConfig::load()?,
        };

        if let Some(subnet) = &self.subnet_ocid {
            config.fss.subnet_ocid = Some(subnet.clone());
        }
        if self.no_report {
            config.report.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// 重置调试日志
fn reset_debug_log(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("创建日志目录失败: {}", dir.display()))?;
    }
    File::create(path).with_context(|| format!("重置调试日志失败: {}", path.display()))?;
    OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("打开调试日志失败: {}", path.display()))
}

/// 初始化日志：控制台按 `--log-level`（`RUST_LOG` 优先），调试日志文件记录 debug 及以上
fn init_logging(log_level: &str, debug_log: File) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(debug_log))
                .with_filter(LevelFilter::DEBUG),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("加载配置失败: {:#}", e);
            std::process::exit(1);
        }
    };

    match reset_debug_log(&config.report.debug_log) {
        Ok(file) => init_logging(&cli.log_level, file),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }

    info!("VPST 启动");

    let code = commands::run::execute(&cli, config).await;
    if code != 0 {
        error!("测试运行失败, 退出码: {}", code);
    }
    std::process::exit(code);
}
