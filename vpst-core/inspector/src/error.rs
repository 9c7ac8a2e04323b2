//! 状态检查错误定义

use thiserror::Error;

/// 状态检查结果类型
pub type Result<T> = std::result::Result<T, InspectError>;

/// 状态检查错误类型
///
/// 注意：“条件尚未满足”不是错误，由调用方以 `false` / `None` 表达。
#[derive(Error, Debug)]
pub enum InspectError {
    /// 命令执行错误
    #[error("命令执行错误: {0}")]
    CommandError(#[from] vpst_command_runner::RunnerError),

    /// 响应格式错误（JSON 无法解析或缺少约定字段）
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    /// Pod 名称匹配模式无效
    #[error("无效的匹配模式: {0}")]
    InvalidPattern(String),

    /// 查询参数不完整
    #[error("查询参数错误: {0}")]
    InvalidQuery(String),
}
