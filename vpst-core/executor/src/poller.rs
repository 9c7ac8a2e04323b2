//! 收敛轮询
//!
//! 反复检查外部状态直到条件满足，或检测次数用尽。
//! “尚未满足”不是错误；检查本身出错（命令失败、响应格式错误）立即中止，不重试。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::test_config::PollConfig;

/// 轮询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// 条件已满足
    Reached {
        /// 检查返回的值
        value: T,
        /// 已检测次数（含成功那一次）
        polls: u32,
    },
    /// 检测次数用尽
    TimedOut {
        /// 已检测次数
        polls: u32,
    },
}

impl<T> PollOutcome<T> {
    /// 条件是否已满足
    pub fn is_reached(&self) -> bool {
        matches!(self, PollOutcome::Reached { .. })
    }

    /// 已检测次数
    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Reached { polls, .. } | PollOutcome::TimedOut { polls } => *polls,
        }
    }

    /// 取出满足条件时的值
    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Reached { value, .. } => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

/// 收敛轮询器
///
/// 固定间隔、固定次数，不做退避。最坏等待时间为 `(max_attempts - 1) * interval`
/// 加上每次检查本身的耗时。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    max_attempts: u32,
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

impl Poller {
    /// 创建轮询器
    ///
    /// # Arguments
    /// * `max_attempts` - 最大检测次数
    /// * `interval` - 两次检测之间的间隔
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// 从配置创建轮询器
    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.max_attempts, config.interval)
    }

    /// 最大检测次数
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 检测间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 等待条件满足
    ///
    /// `check` 返回 `Ok(Some(v))` 表示已满足，`Ok(None)` 表示尚未满足，
    /// `Err` 会原样返回给调用方。
    ///
    /// # Arguments
    /// * `what` - 等待对象的描述，用于日志
    /// * `check` - 状态检查
    ///
    /// # Example
    /// ```ignore
    /// let outcome = poller
    ///     .poll_until("PVC demooci-1234 绑定", || kubectl.bound_volume("demooci-1234"))
    ///     .await?;
    /// ```
    pub async fn poll_until<T, E, F, Fut>(
        &self,
        what: &str,
        mut check: F,
    ) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        debug!(
            "等待 {} (最多 {} 次, 间隔 {:?})",
            what, self.max_attempts, self.interval
        );

        for i in 1..=self.max_attempts {
            if let Some(value) = check().await? {
                debug!("{} 已满足 (第 {}/{} 次检测)", what, i, self.max_attempts);
                return Ok(PollOutcome::Reached { value, polls: i });
            }

            info!("    等待 {} ({}/{})", what, i, self.max_attempts);

            if i < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!("{} 超时 (共检测 {} 次)", what, self.max_attempts);
        Ok(PollOutcome::TimedOut {
            polls: self.max_attempts,
        })
    }

    /// 等待布尔条件为真
    pub async fn poll_until_true<E, F, Fut>(
        &self,
        what: &str,
        mut check: F,
    ) -> Result<PollOutcome<()>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        self.poll_until(what, || {
            let fut = check();
            async move { fut.await.map(|ok| ok.then_some(())) }
        })
        .await
    }
}
