//! 运行配置管理
//!
//! 支持从多个源加载运行配置:
//! - 命令行参数 (优先级最高，由 CLI 在加载后覆盖)
//! - 环境变量
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `VPST_CONFIG` 环境变量指定的路径
//! 2. `./vpst.toml` (当前目录)
//! 3. `./tests/config.toml` (tests 目录)
//! 4. `~/.config/vpst/config.toml` (用户配置目录)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================
// 核心配置结构
// ============================================

/// 运行配置 (顶层)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    /// canary 指标输出文件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_file: Option<PathBuf>,

    /// 轮询配置
    #[serde(default)]
    pub poll: PollConfig,

    /// 结果报告配置
    #[serde(default)]
    pub report: ReportConfig,

    /// 文件路径配置
    #[serde(default)]
    pub paths: PathsConfig,

    /// 凭证落地路径
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// 文件存储配置
    #[serde(default)]
    pub fss: FssConfig,
}

/// 轮询配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// 最大检测次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 检测间隔
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub interval: Duration,
}

/// 结果报告配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// 是否写出完成标记
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 结果目录
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,

    /// 完成标记文件名
    #[serde(default = "default_done_file")]
    pub done_file: String,

    /// 调试日志文件
    #[serde(default = "default_debug_log")]
    pub debug_log: PathBuf,
}

/// 文件路径配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// 资源描述模板目录
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// 供应器部署文件目录
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// terraform 配置目录
    #[serde(default = "default_terraform_dir")]
    pub terraform_dir: PathBuf,

    /// 生成的资源描述输出目录 (未设置时写在模板旁边)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

/// 凭证落地路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// 供应商配置 (由 OCICONFIG_VAR 解码)
    #[serde(default = "default_provider_config_path")]
    pub provider_config: PathBuf,

    /// 集群配置 (由 KUBECONFIG_VAR 解码)
    #[serde(default = "default_kubeconfig_path")]
    pub kubeconfig: PathBuf,

    /// API 私钥
    #[serde(default = "default_api_key_path")]
    pub api_key: PathBuf,

    /// 派生的 CLI 配置
    #[serde(default = "default_cli_config_path")]
    pub cli_config: PathBuf,
}

/// 文件存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FssConfig {
    /// 子网 OCID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_ocid: Option<String>,

    /// 挂载目标 OCID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_target_ocid: Option<String>,

    /// 可用域
    #[serde(default = "default_availability_domain")]
    pub availability_domain: String,
}

// ============================================
// 默认值函数
// ============================================

fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    600
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_report_dir() -> PathBuf {
    PathBuf::from("/tmp/results")
}
fn default_done_file() -> String {
    "done".to_string()
}
fn default_debug_log() -> PathBuf {
    PathBuf::from("runner.log")
}
fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}
fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}
fn default_terraform_dir() -> PathBuf {
    PathBuf::from("terraform")
}
fn default_provider_config_path() -> PathBuf {
    PathBuf::from("/tmp/ociconfig")
}
fn default_kubeconfig_path() -> PathBuf {
    PathBuf::from("/tmp/kubeconfig.conf")
}
fn default_api_key_path() -> PathBuf {
    PathBuf::from("/tmp/oci_api_key.pem")
}
fn default_cli_config_path() -> PathBuf {
    PathBuf::from("/tmp/oci_cli_config")
}
fn default_availability_domain() -> String {
    "NWuj:PHX-AD-2".to_string()
}

// ============================================
// Default 实现
// ============================================

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_poll_interval(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_report_dir(),
            done_file: default_done_file(),
            debug_log: default_debug_log(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            dist_dir: default_dist_dir(),
            terraform_dir: default_terraform_dir(),
            work_dir: None,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            provider_config: default_provider_config_path(),
            kubeconfig: default_kubeconfig_path(),
            api_key: default_api_key_path(),
            cli_config: default_cli_config_path(),
        }
    }
}

impl Default for FssConfig {
    fn default() -> Self {
        Self {
            subnet_ocid: None,
            mount_target_ocid: None,
            availability_domain: default_availability_domain(),
        }
    }
}

// ============================================
// 配置加载
// ============================================

impl RunConfig {
    /// 从多个源加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::debug!("加载配置文件: {:?}", path);
                Self::load_from_file(&path)?
            }
            None => {
                tracing::debug!("未找到配置文件，使用默认配置");
                Self::default()
            }
        };

        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载配置，再应用环境变量覆盖
    pub fn load_with_file(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let mut config = Self::load_from_file(Path::new(expanded.as_ref()))?;
        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        Ok(config)
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("VPST_CONFIG") {
            let p = PathBuf::from(shellexpand::tilde(&path).as_ref());
            if p.exists() {
                return Some(p);
            }
        }

        let paths = [
            PathBuf::from("./vpst.toml"),
            PathBuf::from("./tests/config.toml"),
        ];
        for path in &paths {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config/vpst/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// 从给定的变量来源覆盖配置
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(attempts) = lookup("VPST_MAX_ATTEMPTS") {
            self.poll.max_attempts = attempts
                .trim()
                .parse()
                .with_context(|| format!("VPST_MAX_ATTEMPTS 不是有效数字: {}", attempts))?;
        }
        if let Some(path) = lookup("METRICS_FILE") {
            if !path.is_empty() {
                self.metrics_file = Some(PathBuf::from(path));
            }
        }
        if let Some(ocid) = lookup("MNT_TARGET_OCID") {
            if !ocid.is_empty() {
                self.fss.mount_target_ocid = Some(ocid);
            }
        }
        if let Some(ocid) = lookup("SUBNET_OCID") {
            if !ocid.is_empty() {
                self.fss.subnet_ocid = Some(ocid);
            }
        }

        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.poll.max_attempts == 0 {
            anyhow::bail!("poll.max_attempts 必须大于 0");
        }

        if self.report.enabled {
            if self.report.dir.as_os_str().is_empty() {
                anyhow::bail!("启用结果报告时 report.dir 不能为空");
            }
            if self.report.done_file.is_empty() {
                anyhow::bail!("启用结果报告时 report.done_file 不能为空");
            }
        }

        Ok(())
    }

    /// 生成资源描述的输出目录
    pub fn work_dir(&self) -> Option<&Path> {
        self.paths.work_dir.as_deref()
    }
}
