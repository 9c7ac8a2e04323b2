//! 退出清理
//!
//! 清理动作在资源第一次确认存在时注册（先注册、再执行有风险的操作），
//! 运行结束时按注册顺序各执行一次。单个动作失败或 panic 只记录日志，
//! 不影响后续动作。

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::test_config::ReportConfig;

/// 清理动作返回的 future
pub type CleanupFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// 清理动作
pub type CleanupAction = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// 成功时写入调试日志的结束行
pub const SUITE_SUCCESS: &str = "Test Suite Success";
/// 失败时写入调试日志的结束行
pub const SUITE_FAILED: &str = "Test Suite Failed";

/// 清理执行汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// 已执行的动作数
    pub ran: usize,
    /// 失败的动作名称
    pub failed: Vec<String>,
}

impl CleanupSummary {
    /// 是否全部成功
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 退出清理器
///
/// 持有清理动作列表的唯一所有权；`run_cleanup` 取走整个列表，
/// 因此每个动作最多执行一次。
pub struct ExitFinalizer {
    actions: Vec<(String, CleanupAction)>,
    report: ReportConfig,
}

impl ExitFinalizer {
    /// 创建清理器
    ///
    /// # Arguments
    /// * `report` - 结果报告配置 (`enabled = false` 时不写完成标记)
    pub fn new(report: ReportConfig) -> Self {
        Self {
            actions: Vec::new(),
            report,
        }
    }

    /// 不写报告的清理器
    pub fn without_report() -> Self {
        Self::new(ReportConfig {
            enabled: false,
            ..ReportConfig::default()
        })
    }

    /// 注册清理动作（不去重）
    ///
    /// # Example
    /// ```ignore
    /// let kubectl = ctx.kubectl.clone();
    /// let descriptor = path.clone();
    /// ctx.finalizer.register("删除 PVC", move || async move {
    ///     kubectl.delete_file(&descriptor, false).await?;
    ///     Ok(())
    /// });
    /// ```
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        debug!("注册清理动作: {}", name);
        let boxed: CleanupAction = Box::new(move || Box::pin(action()) as CleanupFuture);
        self.actions.push((name, boxed));
    }

    /// 待执行的清理动作数
    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    /// 待执行的清理动作名称（按注册顺序）
    pub fn pending_names(&self) -> Vec<&str> {
        self.actions.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 按注册顺序执行所有清理动作
    ///
    /// 列表被取走，重复调用不会再次执行同一动作。
    pub async fn run_cleanup(&mut self) -> CleanupSummary {
        let actions = std::mem::take(&mut self.actions);
        let mut summary = CleanupSummary::default();

        if actions.is_empty() {
            return summary;
        }

        info!("执行 {} 个清理动作", actions.len());

        for (name, action) in actions {
            summary.ran += 1;
            info!("清理: {}", name);

            let result = AssertUnwindSafe(async move { action().await })
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => debug!("清理完成: {}", name),
                Ok(Err(e)) => {
                    error!("清理动作 {} 失败: {:#}", name, e);
                    summary.failed.push(name);
                }
                Err(_) => {
                    error!("清理动作 {} panic", name);
                    summary.failed.push(name);
                }
            }
        }

        if !summary.all_succeeded() {
            warn!(
                "{}/{} 个清理动作失败: {:?}",
                summary.failed.len(),
                summary.ran,
                summary.failed
            );
        }

        summary
    }

    /// 结束运行：执行清理，写出完成标记，返回退出码
    ///
    /// 进程退出由调用方完成（`std::process::exit`）。
    pub async fn finalize(&mut self, exit_code: i32) -> i32 {
        info!("结束运行, 退出码: {}", exit_code);

        self.run_cleanup().await;

        if self.report.enabled {
            match self.write_report(exit_code) {
                Ok(path) => info!("完成标记已写入: {}", path.display()),
                Err(e) => error!("写入完成标记失败: {}", e),
            }
        }

        exit_code
    }

    /// 写出完成标记
    ///
    /// 调试日志追加结束行后复制到结果目录，完成标记文件内容为日志副本的路径。
    ///
    /// # Returns
    /// 完成标记文件路径
    pub fn write_report(&self, exit_code: i32) -> std::io::Result<PathBuf> {
        let line = if exit_code == 0 {
            SUITE_SUCCESS
        } else {
            SUITE_FAILED
        };

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.report.debug_log)?;
        writeln!(log, "\n{}", line)?;
        drop(log);

        fs::create_dir_all(&self.report.dir)?;

        let log_name = self
            .report
            .debug_log
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("runner.log"));
        let log_copy = self.report.dir.join(log_name);
        fs::copy(&self.report.debug_log, &log_copy)?;

        let done = self.report.dir.join(&self.report.done_file);
        fs::write(&done, log_copy.display().to_string())?;

        Ok(done)
    }
}

impl std::fmt::Debug for ExitFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitFinalizer")
            .field("pending", &self.pending_names())
            .field("report", &self.report)
            .finish()
    }
}
