//! 运行上下文
//!
//! 一次测试运行的全部共享状态：配置、外部工具客户端、轮询器、退出清理器和
//! canary 指标。启动时创建一次，显式传给场景执行器，不使用全局状态。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;
use vpst_command_runner::CommandExecutor;
use vpst_inspector::{Kubectl, OciCli, PodSelector, Terraform, PROVISIONER_NAMESPACE};

use crate::credentials::Credentials;
use crate::finalizer::ExitFinalizer;
use crate::metrics::CanaryMetrics;
use crate::poller::{PollOutcome, Poller};
use crate::scenario::Suite;
use crate::template::{render_file, TemplateValues};
use crate::test_config::RunConfig;
use crate::{ExecutorError, Result};

/// 供应器 secret 名称
pub const PROVISIONER_SECRET: &str = "oci-volume-provisioner";
/// 供应器 secret 中配置文件的键名
pub const PROVISIONER_SECRET_KEY: &str = "config.yaml";

/// 运行选项（来自命令行）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// 测试 ID，附加在所有资源名称后
    pub test_id: String,
    /// 是否检查供应商侧资源
    pub check_oci: bool,
}

impl RunOptions {
    /// 使用随机测试 ID（UUID 前 8 位）
    pub fn new(check_oci: bool) -> Self {
        let test_id = Uuid::new_v4().to_string()[..8].to_string();
        Self { test_id, check_oci }
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = test_id.into();
        self
    }
}

/// 运行上下文
pub struct RunContext {
    pub config: RunConfig,
    pub test_id: String,
    pub check_oci: bool,
    pub kubectl: Kubectl,
    pub oci: OciCli,
    pub terraform: Terraform,
    pub poller: Poller,
    pub finalizer: ExitFinalizer,
    pub metrics: CanaryMetrics,
    /// compartment ID（`--setup` 时从供应器 Pod 读取）
    pub compartment_id: Option<String>,
    /// 供应商配置文件，用于创建供应器 secret
    pub provider_config: Option<PathBuf>,
    region: Option<String>,
    teardown: Option<Vec<PathBuf>>,
}

impl RunContext {
    /// 创建运行上下文
    ///
    /// # Arguments
    /// * `config` - 运行配置
    /// * `options` - 运行选项
    /// * `runner` - 所有外部命令共用的执行器
    pub fn new(config: RunConfig, options: RunOptions, runner: Arc<dyn CommandExecutor>) -> Self {
        let kubectl = Kubectl::new(runner.clone());
        let oci = OciCli::new(runner.clone());
        let terraform = Terraform::new(runner, config.paths.terraform_dir.clone());
        let poller = Poller::from_config(&config.poll);
        let finalizer = ExitFinalizer::new(config.report.clone());
        let metrics = CanaryMetrics::new(config.metrics_file.clone());

        Self {
            config,
            test_id: options.test_id,
            check_oci: options.check_oci,
            kubectl,
            oci,
            terraform,
            poller,
            finalizer,
            metrics,
            compartment_id: None,
            provider_config: None,
            region: None,
            teardown: None,
        }
    }

    /// 使用落地后的凭证
    pub fn use_credentials(&mut self, credentials: &Credentials) {
        self.kubectl = self
            .kubectl
            .clone()
            .with_kubeconfig(credentials.kubeconfig.clone());
        self.oci = self.oci.clone().with_config_file(credentials.cli_config.clone());
        self.provider_config = credentials.provider_config.clone();
    }

    /// 模板文件路径
    pub fn template_path(&self, template: &Path) -> PathBuf {
        self.config.paths.templates_dir.join(template)
    }

    /// 部署文件路径
    pub fn dist_path(&self, resource: &Path) -> PathBuf {
        self.config.paths.dist_dir.join(resource)
    }

    /// 渲染模板目录中的模板
    pub fn render(&self, template: &Path, values: &TemplateValues) -> Result<PathBuf> {
        render_file(&self.template_path(template), values, self.config.work_dir())
    }

    /// 集群所在区域（首次查询后缓存）
    ///
    /// 集群中没有节点时无法确定区域，属于环境错误。
    pub async fn cluster_region(&mut self) -> Result<String> {
        if let Some(region) = &self.region {
            return Ok(region.clone());
        }
        let region = self.kubectl.region().await?.ok_or_else(|| {
            ExecutorError::EnvironmentError("集群中没有节点，无法确定区域".to_string())
        })?;
        self.region = Some(region.clone());
        Ok(region)
    }

    /// 部署卷供应器
    ///
    /// 先尽力删除残留资源，再创建 secret 和套件需要的集群资源，等待供应器 Pod
    /// 运行后读取 compartment ID。供应器 Pod 未能运行是致命错误。
    pub async fn setup(&mut self, suite: &Suite) -> Result<()> {
        self.cleanup_cluster(suite, false).await?;

        info!("部署卷供应器");
        match &self.provider_config {
            Some(path) => {
                if !self
                    .kubectl
                    .create_secret_from_file(
                        PROVISIONER_NAMESPACE,
                        PROVISIONER_SECRET,
                        PROVISIONER_SECRET_KEY,
                        path,
                    )
                    .await?
                {
                    warn!("创建 secret {} 失败", PROVISIONER_SECRET);
                }
            }
            None => warn!("没有供应商配置，跳过创建 secret {}", PROVISIONER_SECRET),
        }

        for resource in &suite.resources {
            let path = self.dist_path(resource);
            if !self.kubectl.try_create_file(&path).await? {
                warn!("创建集群资源失败: {}", path.display());
            }
        }

        let pod = self.wait_for_provisioner().await?;
        let compartment_id = self.kubectl.compartment_id(&pod).await?;
        self.compartment_id = Some(compartment_id);

        Ok(())
    }

    async fn wait_for_provisioner(&self) -> Result<String> {
        let kubectl = &self.kubectl;
        let selector = &PodSelector::provisioner();

        let outcome = self
            .poller
            .poll_until("供应器 Pod 进入 Running", || async move {
                let pods = kubectl.pods(selector, Some(PROVISIONER_NAMESPACE)).await?;
                for pod in &pods {
                    info!("    - pod: {}, status: {}, node: {}", pod.name, pod.status, pod.node);
                }
                Ok::<_, vpst_inspector::InspectError>(
                    pods.into_iter().find(|p| p.status == "Running").map(|p| p.name),
                )
            })
            .await?;

        match outcome {
            PollOutcome::Reached { value, .. } => {
                info!("供应器 Pod 已运行: {}", value);
                Ok(value)
            }
            PollOutcome::TimedOut { polls } => Err(ExecutorError::EnvironmentError(format!(
                "供应器 Pod 在 {} 次检测内未进入 Running 状态",
                polls
            ))),
        }
    }

    /// 删除卷供应器相关的集群资源（尽力而为）
    pub async fn cleanup_cluster(&self, suite: &Suite, display_errors: bool) -> Result<()> {
        let resources = self.resource_paths(suite);
        remove_cluster_resources(&self.kubectl, &resources, display_errors).await?;
        Ok(())
    }

    fn resource_paths(&self, suite: &Suite) -> Vec<PathBuf> {
        suite.resources.iter().map(|r| self.dist_path(r)).collect()
    }

    /// 退出时拆除卷供应器
    ///
    /// 拆除动作在 `finalize` 时才注册，排在所有场景清理动作之后。
    pub fn schedule_teardown(&mut self, suite: &Suite) {
        self.teardown = Some(self.resource_paths(suite));
    }

    fn register_teardown(&mut self) {
        let Some(resources) = self.teardown.take() else {
            return;
        };
        let kubectl = self.kubectl.clone();
        self.finalizer.register("拆除卷供应器", move || async move {
            info!("拆除卷供应器");
            remove_cluster_resources(&kubectl, &resources, true)
                .await
                .map_err(anyhow::Error::from)
        });
    }

    /// 结束运行：执行清理、写出完成标记和 canary 指标
    ///
    /// # Returns
    /// 进程退出码
    pub async fn finalize(&mut self, exit_code: i32) -> i32 {
        self.register_teardown();
        let code = self.finalizer.finalize(exit_code).await;
        if let Err(e) = self.metrics.finish() {
            warn!("写入 canary 指标失败: {}", e);
        }
        code
    }
}

async fn remove_cluster_resources(
    kubectl: &Kubectl,
    resources: &[PathBuf],
    display_errors: bool,
) -> vpst_inspector::Result<()> {
    for path in resources {
        kubectl.delete_file(path, display_errors).await?;
    }
    kubectl
        .delete_secret(PROVISIONER_NAMESPACE, PROVISIONER_SECRET, display_errors)
        .await
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("test_id", &self.test_id)
            .field("check_oci", &self.check_oci)
            .field("compartment_id", &self.compartment_id)
            .field("finalizer", &self.finalizer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_test_id() {
        let options = RunOptions::new(false);
        assert_eq!(options.test_id.len(), 8);
        assert!(options.test_id.chars().all(|c| c.is_ascii_hexdigit()));

        let options = options.with_test_id("fixed");
        assert_eq!(options.test_id, "fixed");
    }
}
