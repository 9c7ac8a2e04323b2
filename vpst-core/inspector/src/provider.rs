//! 存储服务 CLI 客户端
//!
//! 通过 `oci` 命令行查询块存储卷、卷备份和文件系统

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use vpst_command_runner::{CommandExecutor, CommandSpec};

use crate::error::{InspectError, Result};
use crate::models::{BackupInfo, ProviderQuery, ProviderResource, ResourceKind};
use crate::parser::{parse_backup, parse_provider_resources};

/// 存储服务 CLI 客户端
#[derive(Clone)]
pub struct OciCli {
    runner: Arc<dyn CommandExecutor>,
    config_file: Option<PathBuf>,
}

impl OciCli {
    /// 创建客户端
    pub fn new(runner: Arc<dyn CommandExecutor>) -> Self {
        Self {
            runner,
            config_file: None,
        }
    }

    /// 指定 CLI 配置文件
    pub fn with_config_file(mut self, config_file: Option<PathBuf>) -> Self {
        self.config_file = config_file;
        self
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new("oci").args(args);
        if let Some(path) = &self.config_file {
            spec = spec.arg("--config-file").arg(path.display().to_string());
        }
        spec
    }

    /// 查询资源列表的命令
    fn list_command(&self, query: &ProviderQuery) -> Result<CommandSpec> {
        let kind = query.resource_kind();
        let spec = match kind {
            ResourceKind::Volume => self.command(["bv", "volume", "list"]),
            ResourceKind::VolumeBackup => self.command(["bv", "backup", "list"]),
            ResourceKind::FileSystem => {
                let ad = query.availability_domain.as_deref().ok_or_else(|| {
                    InspectError::InvalidQuery("文件系统查询需要指定可用域".to_string())
                })?;
                self.command(["fs", "file-system", "list"])
                    .args(["--availability-domain", ad])
            }
        };

        Ok(spec.args([
            "--compartment-id",
            query.compartment_id.as_str(),
            "--all",
            "--query",
            "data",
        ]))
    }

    /// 列出资源
    pub async fn list(&self, query: &ProviderQuery) -> Result<Vec<ProviderResource>> {
        let spec = self.list_command(query)?;
        let output = self.runner.execute(&spec).await?;
        let resources = parse_provider_resources(&output.stdout)?;
        debug!(
            "{} 列表: {} 条 (compartment: {})",
            query.resource_kind().display_name(),
            resources.len(),
            query.compartment_id
        );
        Ok(resources)
    }

    /// 是否存在 ID 以 `handle` 结尾且处于 `state` 状态的资源
    ///
    /// # Arguments
    /// * `query` - 查询参数
    /// * `handle` - 资源句柄（通常是卷名，即 OCID 的最后一段）
    /// * `state` - 期望的生命周期状态
    pub async fn resource_in_state(
        &self,
        query: &ProviderQuery,
        handle: &str,
        state: &str,
    ) -> Result<bool> {
        let resources = self.list(query).await?;
        Ok(resources.iter().any(|r| r.matches(handle, state)))
    }

    /// 为块存储卷创建备份
    pub async fn create_backup(&self, volume_id: &str, display_name: &str) -> Result<BackupInfo> {
        info!("创建卷备份: {} (卷: {})", display_name, volume_id);

        let spec = self.command(["bv", "backup", "create"]).args([
            "--volume-id",
            volume_id,
            "--display-name",
            display_name,
            "--query",
            "data",
        ]);
        let output = self.runner.execute(&spec).await?;
        let backup = parse_backup(&output.stdout)?;

        info!("卷备份已创建: {}", backup.id);
        Ok(backup)
    }

    /// 删除卷备份
    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        info!("删除卷备份: {}", backup_id);

        let spec = self
            .command(["bv", "backup", "delete"])
            .args(["--volume-backup-id", backup_id, "--force"]);
        self.runner.execute(&spec).await?;
        Ok(())
    }
}

impl std::fmt::Debug for OciCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciCli")
            .field("config_file", &self.config_file)
            .finish()
    }
}
