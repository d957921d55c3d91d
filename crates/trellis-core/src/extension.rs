//! 管线扩展契约与导航世代。
//!
//! # 教案式说明
//! - **意图（Why）**：视图装载、控制器装载以及用户自定义步骤共享同一个异步签名，管线可以按顺序逐个等待；
//!   同时每次导航都会推进全局世代号，落后的运行在修改文档或历史前自行放弃，保证最新一次导航赢得界面；
//! - **契约（What）**：
//!   - [`Extension::handle`] 通过 `&mut RoutingState` 读写同一份状态；
//!   - 返回 `Ok(StepStatus)` 描述步骤结果，`Err` 交由管线记录后继续下一个步骤；
//!   - [`RunContext::is_current`] 为 `false` 时，扩展不得再修改文档或浏览历史；
//! - **执行（How）**：[`NavigationEpoch`] 以 `Arc<AtomicU64>` 共享，克隆后的句柄观察同一计数。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::NavigationError;
use crate::state::RoutingState;

/// 单个步骤的完成状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// 步骤按预期执行完毕。
    Completed,
    /// 步骤无事可做（例如空视图、目标区域不存在），附带原因。
    Skipped(String),
    /// 运行已被更新的导航取代，步骤放弃了自身副作用。
    Superseded,
}

impl StepStatus {
    /// 构造跳过状态。
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// 导航世代计数器。
#[derive(Clone, Default)]
pub struct NavigationEpoch {
    counter: Arc<AtomicU64>,
}

impl fmt::Debug for NavigationEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationEpoch")
            .field("current", &self.current())
            .finish()
    }
}

impl NavigationEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一次新导航并返回其世代号。
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 最新世代号。
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// 为新导航创建运行上下文。
    pub fn begin(&self) -> RunContext {
        RunContext {
            generation: self.advance(),
            epoch: self.clone(),
        }
    }

    /// 在当前世代内运行而不推进计数，用于不应取代进行中导航的操作（如表单提交）。
    pub fn join(&self) -> RunContext {
        RunContext {
            generation: self.current(),
            epoch: self.clone(),
        }
    }
}

/// 一次管线运行的上下文。
#[derive(Clone, Debug)]
pub struct RunContext {
    generation: u64,
    epoch: NavigationEpoch,
}

impl RunContext {
    /// 构造不与任何其他导航竞争的上下文，常用于测试或独立运行某条管线。
    pub fn detached() -> Self {
        NavigationEpoch::new().begin()
    }

    /// 本次运行的世代号。
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 本次运行是否仍是最新导航。
    pub fn is_current(&self) -> bool {
        self.epoch.current() == self.generation
    }

    /// 共享的世代计数器。
    pub fn epoch(&self) -> &NavigationEpoch {
        &self.epoch
    }
}

/// 管线中的一个异步步骤。
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// 用于日志与报告的稳定名称。
    fn name(&self) -> &str;

    /// 处理路由状态。
    async fn handle(
        &self,
        state: &mut RoutingState,
        run: &RunContext,
    ) -> Result<StepStatus, NavigationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_navigation_supersedes_older_context() {
        let epoch = NavigationEpoch::new();
        let first = epoch.begin();
        assert!(first.is_current());
        assert_eq!(first.generation(), 1);

        let second = epoch.begin();
        assert!(!first.is_current(), "旧运行应感知到被取代");
        assert!(second.is_current());
        assert_eq!(epoch.current(), 2);
    }

    #[test]
    fn joining_does_not_supersede_in_flight_run() {
        let epoch = NavigationEpoch::new();
        let navigation = epoch.begin();
        let submit = epoch.join();
        assert!(navigation.is_current());
        assert!(submit.is_current());
        assert_eq!(submit.generation(), navigation.generation());
    }

    #[test]
    fn detached_context_is_current() {
        let run = RunContext::detached();
        assert!(run.is_current());
        assert_eq!(StepStatus::skipped("no view"), StepStatus::Skipped("no view".to_owned()));
    }
}
