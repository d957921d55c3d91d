//! 顺序执行、尽力而为的扩展管线。
//!
//! # 教案式说明
//! - **意图（Why）**：一个扩展失败不应阻断整次导航，但失败也不能被悄悄丢弃；
//!   每次运行都产出一份 [`PipelineReport`]，由外部观察者决定是否向用户呈现；
//! - **契约（What）**：
//!   - 扩展按添加顺序执行，第 N+1 个扩展在第 N 个完成之前绝不开始；
//!   - 同一份 `&mut RoutingState` 贯穿整条链；
//!   - 扩展返回 `Err` 时记录 `warn` 日志并写入报告，随后继续执行下一个扩展；
//!   - 运行结束后若配置了 [`ReportObserver`]，报告会先交给观察者再返回调用方；
//! - **风险提示（Trade-offs）**：管线没有超时与取消，挂起的扩展会让本次运行一直停在该步骤，
//!   但不影响其他导航的独立运行。

use std::fmt;
use std::sync::Arc;

use trellis_core::error::NavigationError;
use trellis_core::extension::{Extension, RunContext, StepStatus};
use trellis_core::state::RoutingState;

/// 单个步骤的执行结果。
#[derive(Debug)]
pub struct StepReport {
    /// 扩展名称。
    pub extension: String,
    /// 扩展返回值。
    pub result: Result<StepStatus, NavigationError>,
}

impl StepReport {
    /// 是否失败。
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// 一次管线运行的报告。
#[derive(Debug)]
pub struct PipelineReport {
    pipeline: String,
    generation: u64,
    steps: Vec<StepReport>,
}

impl PipelineReport {
    fn new(pipeline: &str, generation: u64, capacity: usize) -> Self {
        Self {
            pipeline: pipeline.to_owned(),
            generation,
            steps: Vec::with_capacity(capacity),
        }
    }

    /// 管线名称。
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// 运行所属的导航世代。
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 按执行顺序排列的步骤结果。
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// 所有步骤均未失败。
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|step| !step.is_failure())
    }

    /// 失败步骤及其错误。
    pub fn failures(&self) -> impl Iterator<Item = (&str, &NavigationError)> {
        self.steps.iter().filter_map(|step| match &step.result {
            Err(err) => Some((step.extension.as_str(), err)),
            Ok(_) => None,
        })
    }

    /// 按扩展名查询结果；同名扩展取第一个。
    pub fn step(&self, extension: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.extension == extension)
    }

    /// 取出指定扩展的失败，报告中对应步骤保留为 `Skipped`。
    pub fn take_failure(&mut self, extension: &str) -> Option<NavigationError> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.extension == extension && step.is_failure())?;
        let taken = std::mem::replace(&mut step.result, Ok(StepStatus::skipped("failure taken")));
        taken.err()
    }

    /// 是否有步骤因被新导航取代而放弃了副作用。
    pub fn is_superseded(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step.result, Ok(StepStatus::Superseded)))
    }
}

/// 报告观察者，例如把失败转发到界面提示或埋点。
pub trait ReportObserver: Send + Sync + 'static {
    fn observe(&self, report: &PipelineReport);
}

impl<F> ReportObserver for F
where
    F: Fn(&PipelineReport) + Send + Sync + 'static,
{
    fn observe(&self, report: &PipelineReport) {
        self(report)
    }
}

/// 扩展管线。
pub struct ExtensionPipeline {
    name: String,
    extensions: Vec<Arc<dyn Extension>>,
    observer: Option<Arc<dyn ReportObserver>>,
}

impl fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.extensions.iter().map(|ext| ext.name()).collect();
        f.debug_struct("ExtensionPipeline")
            .field("name", &self.name)
            .field("extensions", &names)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl ExtensionPipeline {
    /// 创建空管线。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            observer: None,
        }
    }

    /// 追加扩展。
    pub fn add(&mut self, extension: impl Extension) -> &mut Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// 追加已共享的扩展。
    pub fn add_shared(&mut self, extension: Arc<dyn Extension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    /// 设置报告观察者。
    pub fn set_observer(&mut self, observer: Arc<dyn ReportObserver>) {
        self.observer = Some(observer);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// 按顺序执行全部扩展。
    ///
    /// # 教案式注释
    /// - **前置条件**：`state` 已由分发器或解析器构造；
    /// - **后置条件**：每个扩展恰好执行一次，报告中的步骤顺序与添加顺序一致；
    /// - **执行（How）**：逐个 `await`，失败只记录不短路。
    pub async fn run(&self, state: &mut RoutingState, run: &RunContext) -> PipelineReport {
        let mut report = PipelineReport::new(&self.name, run.generation(), self.extensions.len());
        for extension in &self.extensions {
            let result = extension.handle(state, run).await;
            match &result {
                Ok(status) => tracing::debug!(
                    pipeline = %self.name,
                    extension = extension.name(),
                    generation = run.generation(),
                    ?status,
                    "extension finished"
                ),
                Err(err) => tracing::warn!(
                    pipeline = %self.name,
                    extension = extension.name(),
                    generation = run.generation(),
                    code = err.code(),
                    error = %err,
                    "extension failed; continuing with next step"
                ),
            }
            report.steps.push(StepReport {
                extension: extension.name().to_owned(),
                result,
            });
        }
        if let Some(observer) = &self.observer {
            observer.observe(&report);
        }
        report
    }
}
