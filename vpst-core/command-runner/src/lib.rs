//! VPST 命令执行器
//!
//! 为系统测试提供本地命令执行能力，支持：
//! - 指定工作目录和环境变量
//! - 同时捕获标准输出和标准错误（两个管道并发读取，避免死锁）
//! - 失败即报错 / 尽力而为 两种执行策略
//!
//! # 示例
//!
//! ```ignore
//! use vpst_command_runner::{CommandExecutor, CommandSpec, LocalRunner};
//!
//! let runner = LocalRunner::new();
//!
//! // 默认策略: 非零退出码返回错误
//! let output = runner
//!     .execute(&CommandSpec::new("kubectl").args(["get", "pods", "-o", "wide"]))
//!     .await?;
//! println!("{}", output.stdout);
//!
//! // 尽力而为: 删除可能不存在的资源
//! runner
//!     .execute(&CommandSpec::new("kubectl").args(["delete", "-f", "claim.yaml"]).best_effort())
//!     .await?;
//! ```

mod error;
mod runner;
mod spec;

pub use error::{Result, RunnerError};
pub use runner::{CommandExecutor, CommandOutput, LocalRunner};
pub use spec::CommandSpec;
