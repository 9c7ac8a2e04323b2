//! 命令执行错误定义

use thiserror::Error;

/// 命令执行结果类型
pub type Result<T> = std::result::Result<T, RunnerError>;

/// 命令执行错误类型
#[derive(Error, Debug)]
pub enum RunnerError {
    /// 进程启动失败（可执行文件不存在、权限不足等）
    #[error("启动进程失败: {command}: {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// 等待进程或读取输出失败
    #[error("等待进程失败: {command}: {source}")]
    WaitError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// 命令返回非零退出码
    #[error("命令执行失败 (退出码 {exit_code:?}): {command}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
}

impl RunnerError {
    /// 出错的命令行
    pub fn command(&self) -> &str {
        match self {
            RunnerError::SpawnError { command, .. }
            | RunnerError::WaitError { command, .. }
            | RunnerError::NonZeroExit { command, .. } => command,
        }
    }
}
