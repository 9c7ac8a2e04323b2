//! 命令描述

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 待执行命令的描述
///
/// 不经过 shell，参数原样传递给可执行文件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// 可执行文件
    pub program: String,
    /// 参数列表
    #[serde(default)]
    pub args: Vec<String>,
    /// 工作目录（默认当前目录）
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    /// 额外环境变量
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// 非零退出码是否视为错误
    #[serde(default = "default_true")]
    pub check: bool,
    /// 失败时是否打印输出
    #[serde(default = "default_true")]
    pub display_errors: bool,
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

impl CommandSpec {
    /// 创建命令描述
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: default_cwd(),
            env: Vec::new(),
            check: true,
            display_errors: true,
        }
    }

    /// 追加单个参数
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 追加多个参数
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 设置工作目录
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// 设置环境变量
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// 尽力而为: 非零退出码不视为错误
    pub fn best_effort(mut self) -> Self {
        self.check = false;
        self
    }

    /// 失败时不打印输出
    pub fn quiet(mut self) -> Self {
        self.display_errors = false;
        self
    }

    /// 用于日志的命令行字符串
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.env.len() + self.args.len() + 1);
        for (key, value) in &self.env {
            parts.push(format!("{}={}", key, quote(value)));
        }
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }

    /// 参数中是否包含给定的连续片段（测试桩按参数匹配命令时使用）
    pub fn has_args(&self, needle: &[&str]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.args
            .windows(needle.len())
            .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", s.replace('\'', "'\\''"))
    } else {
        s.to_string()
    }
}
