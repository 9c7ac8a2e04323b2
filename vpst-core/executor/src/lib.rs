//! VPST 执行器
//!
//! 系统测试场景执行引擎：
//! - 收敛轮询（有界重试等待外部状态）
//! - 退出清理（注册的清理动作在任何退出路径上各执行一次）
//! - 资源描述模板、凭证落地、canary 指标
//! - 数据驱动的场景执行

pub mod context;
pub mod credentials;
pub mod finalizer;
pub mod metrics;
pub mod poller;
pub mod runner;
pub mod scenario;
pub mod template;
pub mod test_config;

pub use context::{RunContext, RunOptions, PROVISIONER_SECRET, PROVISIONER_SECRET_KEY};
pub use credentials::{CredentialSources, Credentials, ProviderAuth};
pub use finalizer::{CleanupSummary, ExitFinalizer};
pub use metrics::CanaryMetrics;
pub use poller::{PollOutcome, Poller};
pub use runner::{ExecutionReport, ScenarioRunner, StepReport, StepStatus, SuiteReport};
pub use scenario::{
    load_scenarios, RegionSource, Scenario, Step, Suite, SuiteKind, WorkloadSpec, WorkloadVolume,
};
pub use template::{render, render_file, TemplateValues};
pub use test_config::{
    CredentialsConfig, FssConfig, PathsConfig, PollConfig, ReportConfig, RunConfig,
};

use thiserror::Error;
use vpst_command_runner::RunnerError;
use vpst_inspector::InspectError;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("环境配置错误: {0}")]
    EnvironmentError(String),

    #[error("状态检查失败: {0}")]
    InspectError(#[from] InspectError),

    #[error("命令执行失败: {0}")]
    CommandError(#[from] RunnerError),

    #[error("场景加载失败: {0}")]
    ScenarioLoadFailed(String),

    #[error("步骤执行失败: {0}")]
    StepExecutionFailed(String),

    #[error("模板错误: {0}")]
    TemplateError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

impl ExecutorError {
    /// 是否需要中止整个测试运行
    ///
    /// 只有单个场景内的步骤失败可以继续执行后续场景；
    /// 响应格式错误、环境配置错误、外部命令失败都会中止运行。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExecutorError::StepExecutionFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
