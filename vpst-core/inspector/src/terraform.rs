//! terraform 客户端
//!
//! 用于在“从备份创建卷”场景中准备源卷

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::info;
use vpst_command_runner::{CommandExecutor, CommandSpec};

use crate::error::Result;
use crate::parser::parse_terraform_output;

/// 源卷 OCID 输出变量
pub const VOLUME_OCID_VAR: &str = "volume_ocid";
/// 源卷可用域输出变量
pub const AVAILABILITY_DOMAIN_VAR: &str = "availability_domain";

/// terraform 客户端
#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandExecutor>,
    dir: PathBuf,
    test_id: String,
}

impl Terraform {
    /// 创建客户端，测试 ID 取当前时间戳
    ///
    /// # Arguments
    /// * `runner` - 命令执行器
    /// * `dir` - terraform 配置目录
    pub fn new(runner: Arc<dyn CommandExecutor>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
            test_id: Local::now().format("%Y%m%d%H%M%S%6f").to_string(),
        }
    }

    /// 指定测试 ID（`TF_VAR_test_id`）
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = test_id.into();
        self
    }

    /// 当前测试 ID
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// 执行 terraform 子命令，非零退出码返回错误
    async fn run(&self, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new("terraform")
            .args(args.iter().copied())
            .cwd(&self.dir)
            .env("TF_VAR_test_id", &self.test_id);
        let output = self.runner.execute(&spec).await?;
        Ok(output.stdout)
    }

    /// terraform init
    pub async fn init(&self) -> Result<()> {
        self.run(&["init", "-input=false"]).await?;
        Ok(())
    }

    /// terraform apply
    pub async fn apply(&self) -> Result<()> {
        info!("terraform apply (test_id: {})", self.test_id);
        self.run(&["apply", "-input=false", "-auto-approve"]).await?;
        Ok(())
    }

    /// terraform destroy
    pub async fn destroy(&self) -> Result<()> {
        info!("terraform destroy (test_id: {})", self.test_id);
        self.run(&["destroy", "-auto-approve"]).await?;
        Ok(())
    }

    /// 读取输出变量
    pub async fn output_var(&self, name: &str) -> Result<String> {
        let body = self.run(&["output", "-json"]).await?;
        parse_terraform_output(&body, name)
    }

    /// 源卷名称（OCID 的最后一段）
    pub async fn volume_name(&self) -> Result<String> {
        let ocid = self.output_var(VOLUME_OCID_VAR).await?;
        Ok(ocid.rsplit('.').next().unwrap_or_default().to_string())
    }
}

impl std::fmt::Debug for Terraform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terraform")
            .field("dir", &self.dir)
            .field("test_id", &self.test_id)
            .finish()
    }
}
