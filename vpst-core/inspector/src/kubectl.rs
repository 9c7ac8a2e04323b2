//! kubectl 客户端
//!
//! 所有集群操作都通过 `kubectl` 子进程完成

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vpst_command_runner::{CommandExecutor, CommandOutput, CommandSpec};

use crate::error::Result;
use crate::models::{PodInfo, PodSelector};
use crate::parser::{find_bound_volume, parse_compartment_id, parse_pods, parse_region};

/// 卷供应器所在命名空间
pub const PROVISIONER_NAMESPACE: &str = "kube-system";

/// 实例元数据服务地址（从 Pod 内访问）
const INSTANCE_METADATA_URL: &str = "http://169.254.169.254/opc/v1/instance/";

/// kubectl 客户端
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandExecutor>,
    kubeconfig: Option<PathBuf>,
    cwd: PathBuf,
}

impl Kubectl {
    /// 创建 kubectl 客户端
    ///
    /// # Arguments
    /// * `runner` - 命令执行器
    pub fn new(runner: Arc<dyn CommandExecutor>) -> Self {
        Self {
            runner,
            kubeconfig: None,
            cwd: PathBuf::from("."),
        }
    }

    /// 指定集群配置文件（通过 `KUBECONFIG` 传给子进程）
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// 指定工作目录
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new("kubectl").args(args).cwd(&self.cwd);
        if let Some(path) = &self.kubeconfig {
            spec = spec.env("KUBECONFIG", path.display().to_string());
        }
        spec
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        Ok(self.runner.execute(&spec).await?)
    }

    /// 提交资源描述文件，失败即报错
    pub async fn create_file(&self, path: &Path) -> Result<()> {
        self.run(self.command(["create", "-f"]).arg(path.display().to_string()))
            .await?;
        Ok(())
    }

    /// 提交资源描述文件，失败只记录日志
    ///
    /// # Returns
    /// 是否提交成功
    pub async fn try_create_file(&self, path: &Path) -> Result<bool> {
        let output = self
            .run(
                self.command(["create", "-f"])
                    .arg(path.display().to_string())
                    .best_effort(),
            )
            .await?;
        Ok(output.is_success())
    }

    /// 删除资源描述文件中的资源（尽力而为，资源不存在不是错误）
    pub async fn delete_file(&self, path: &Path, display_errors: bool) -> Result<()> {
        let mut spec = self
            .command(["delete", "-f"])
            .arg(path.display().to_string())
            .best_effort();
        if !display_errors {
            spec = spec.quiet();
        }
        self.run(spec).await?;
        Ok(())
    }

    /// 获取 PVC 表格
    pub async fn get_claims(&self) -> Result<String> {
        let output = self
            .run(self.command(["get", "PersistentVolumeClaim", "-o", "wide"]))
            .await?;
        Ok(output.stdout)
    }

    /// PVC 处于 Bound 状态时返回其卷名，否则返回 `None`
    pub async fn bound_volume(&self, claim_name: &str) -> Result<Option<String>> {
        let table = self.get_claims().await?;
        let volume = find_bound_volume(&table, claim_name, "Bound");
        debug!("PVC {} 绑定卷: {:?}", claim_name, volume);
        Ok(volume)
    }

    /// 获取 Pod 表格
    pub async fn get_pods(&self, namespace: Option<&str>) -> Result<String> {
        let mut args: Vec<&str> = Vec::new();
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["get", "pods", "-o", "wide"]);
        let output = self.run(self.command(args)).await?;
        Ok(output.stdout)
    }

    /// 列出选择器匹配的 Pod
    pub async fn pods(
        &self,
        selector: &PodSelector,
        namespace: Option<&str>,
    ) -> Result<Vec<PodInfo>> {
        let table = self.get_pods(namespace).await?;
        parse_pods(&table, selector)
    }

    /// 在默认命名空间的 Pod 中执行命令
    pub async fn exec(&self, pod: &str, command: &[&str]) -> Result<CommandOutput> {
        self.exec_in(None, pod, command).await
    }

    /// 在指定命名空间的 Pod 中执行命令
    pub async fn exec_in(
        &self,
        namespace: Option<&str>,
        pod: &str,
        command: &[&str],
    ) -> Result<CommandOutput> {
        let mut args: Vec<&str> = Vec::new();
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["exec", pod, "--"]);
        args.extend(command.iter().copied());
        self.run(self.command(args)).await
    }

    /// 列出 Pod 中的目录内容
    pub async fn list_directory(&self, pod: &str, dir: &str) -> Result<String> {
        let output = self.exec(pod, &["ls", dir]).await?;
        Ok(output.stdout)
    }

    /// 在 Pod 中创建空文件
    pub async fn touch(&self, pod: &str, path: &str) -> Result<()> {
        info!("在 Pod {} 中创建文件 {}", pod, path);
        self.exec(pod, &["touch", path]).await?;
        Ok(())
    }

    /// 获取节点列表 JSON
    pub async fn get_nodes_json(&self) -> Result<String> {
        let output = self.run(self.command(["get", "nodes", "-o", "json"])).await?;
        Ok(output.stdout)
    }

    /// 集群所在区域（第一个节点的区域标签）
    pub async fn region(&self) -> Result<Option<String>> {
        let nodes = self.get_nodes_json().await?;
        let region = parse_region(&nodes)?;
        if region.is_none() {
            warn!("集群中没有节点，无法确定区域");
        }
        Ok(region)
    }

    /// 通过供应器 Pod 访问实例元数据，获取 compartment ID
    pub async fn compartment_id(&self, pod: &str) -> Result<String> {
        let output = self
            .exec_in(
                Some(PROVISIONER_NAMESPACE),
                pod,
                &["curl", "-s", INSTANCE_METADATA_URL],
            )
            .await?;
        let compartment_id = parse_compartment_id(&output.stdout)?;
        info!("compartment ID: {}", compartment_id);
        Ok(compartment_id)
    }

    /// 从文件创建 generic secret（尽力而为）
    ///
    /// # Arguments
    /// * `namespace` - 命名空间
    /// * `name` - secret 名称
    /// * `key` - secret 中的键名
    /// * `path` - 文件路径
    pub async fn create_secret_from_file(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        path: &Path,
    ) -> Result<bool> {
        let from_file = format!("--from-file={}={}", key, path.display());
        let output = self
            .run(
                self.command(["-n", namespace, "create", "secret", "generic", name])
                    .arg(from_file)
                    .best_effort(),
            )
            .await?;
        Ok(output.is_success())
    }

    /// 删除 secret（尽力而为）
    pub async fn delete_secret(
        &self,
        namespace: &str,
        name: &str,
        display_errors: bool,
    ) -> Result<()> {
        let mut spec = self
            .command(["-n", namespace, "delete", "secret", name])
            .best_effort();
        if !display_errors {
            spec = spec.quiet();
        }
        self.run(spec).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Kubectl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kubectl")
            .field("kubeconfig", &self.kubeconfig)
            .field("cwd", &self.cwd)
            .finish()
    }
}
