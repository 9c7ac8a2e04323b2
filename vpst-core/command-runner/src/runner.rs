//! 命令执行实现
//!
//! 使用 tokio::process 在本地执行外部命令

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, RunnerError};
use crate::spec::CommandSpec;

/// 命令执行输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 退出码（被信号终止时为 None）
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// 构造成功输出（测试桩常用）
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// 构造失败输出（测试桩常用）
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    /// 检查命令是否成功执行
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 获取合并的输出（stdout + stderr）
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// 命令执行器
///
/// 实现方只需提供 `spawn`；退出码检查和错误输出打印由 `execute` 统一处理。
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// 执行命令并返回原始输出，不检查退出码
    async fn spawn(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// 执行命令并按描述中的策略检查退出码
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.spawn(spec).await?;

        if !output.is_success() {
            if spec.display_errors {
                warn!("    stdout: {}", output.stdout);
                warn!("    stderr: {}", output.stderr);
                warn!("    result: {:?}", output.exit_code);
            }

            if spec.check {
                return Err(RunnerError::NonZeroExit {
                    command: spec.command_line(),
                    exit_code: output.exit_code,
                    output: output.combined_output(),
                });
            }
        }

        Ok(output)
    }
}

/// 本地命令执行器
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    /// 创建本地执行器
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for LocalRunner {
    async fn spawn(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let command_line = spec.command_line();
        info!("{}: {}", spec.cwd.display(), command_line);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| RunnerError::SpawnError {
            command: command_line.clone(),
            source: e,
        })?;

        // wait_with_output 并发读取 stdout 与 stderr
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RunnerError::WaitError {
                command: command_line.clone(),
                source: e,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            exit_code: output.status.code(),
        };

        for line in result.stdout.lines() {
            debug!("[stdout] {}", line);
        }
        for line in result.stderr.lines() {
            debug!("[stderr] {}", line);
        }

        debug!(
            "命令执行完成, 退出码: {:?}, stdout 长度: {}, stderr 长度: {}",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }
}
