//! 导航事件分发器。
//!
//! # 教案式说明
//! - **意图（Why）**：点击、表单提交、`popstate`、`hashchange` 与首次加载最终都归结为
//!   “构造路由状态 → 运行管线”；分发器决定每个事件是推入新历史、恢复旧状态还是忽略；
//! - **契约（What）**：
//!   - **点击**：`data-spa="false"` 与页内锚点不拦截；否则合并查询参数与元素载荷、写入仓储
//!     （视图键与 `last_view` 两处）、`push_state`、依次运行控制器管线与路由管线，并要求调用方阻止默认行为；
//!   - **hashchange**：距分发器上一次自身写入历史不超过回声窗口时视为回声并忽略；页内锚点忽略；
//!     其余情况按 `popstate` 处理；
//!   - **popstate**：以当前地址为准，仓储命中则原样复用，否则按配置默认值合成载荷为空的状态；
//!     运行管线前总是先 `replace_state`；
//!   - **首次加载**：依次尝试 `history.state()`、仓储、合成状态；
//!   - **表单提交**：只运行控制器管线，控制器装载扩展的失败（含没有当前控制器）返回给调用方；
//! - **世代（How）**：除表单提交外，每次导航推进 [`NavigationEpoch`]，较早的运行在修改文档与历史前自行放弃。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_core::config::DispatchConfig;
use trellis_core::error::NavigationError;
use trellis_core::extension::NavigationEpoch;
use trellis_core::host::History;
use trellis_core::state::RoutingState;
use trellis_core::store::{LAST_VIEW_KEY, StateStore, view_key};
use trellis_core::time::Clock;
use trellis_pipeline::{CONTROLLER_LOADER, ExtensionPipeline, PipelineReport};

use crate::resolver::{ResolvedRoute, RoutingResolver};
use crate::trigger::{FormTrigger, NavigationTrigger};

/// 两条导航管线。
#[derive(Debug)]
pub struct NavigationPipelines {
    /// 路由管线，控制器管线之后运行。
    pub route: ExtensionPipeline,
    /// 控制器管线：视图装载、控制器装载以及应用追加的扩展。
    pub controller: ExtensionPipeline,
}

/// 导航来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationKind {
    Initial,
    Click,
    PopState,
    HashChange,
    Submit,
}

/// 事件被忽略的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 元素声明了 `data-spa="false"`。
    SpaDisabled,
    /// 页内锚点。
    PlainAnchor,
    /// 触发元素没有地址。
    MissingTarget,
    /// 分发器自身写入历史所引起的回声。
    Echo,
}

/// 一次导航的执行结果。
#[derive(Debug)]
pub struct NavigationReport {
    pub kind: NavigationKind,
    /// 管线运行结束时的状态。
    pub state: RoutingState,
    pub generation: u64,
    pub controller: PipelineReport,
    /// 表单提交不运行路由管线。
    pub route: Option<PipelineReport>,
}

/// 分发结果。
#[derive(Debug)]
pub enum DispatchOutcome {
    Navigated(Box<NavigationReport>),
    Ignored(IgnoreReason),
}

impl DispatchOutcome {
    /// 调用方是否应阻止浏览器默认行为。
    pub fn prevent_default(&self) -> bool {
        matches!(self, DispatchOutcome::Navigated(_))
    }

    pub fn report(&self) -> Option<&NavigationReport> {
        match self {
            DispatchOutcome::Navigated(report) => Some(report.as_ref()),
            DispatchOutcome::Ignored(_) => None,
        }
    }

    pub fn ignored(&self) -> Option<IgnoreReason> {
        match self {
            DispatchOutcome::Ignored(reason) => Some(*reason),
            DispatchOutcome::Navigated(_) => None,
        }
    }
}

/// 导航事件分发器。
pub struct NavigationDispatcher {
    resolver: RoutingResolver,
    store: Arc<StateStore>,
    history: Arc<dyn History>,
    clock: Arc<dyn Clock>,
    pipelines: NavigationPipelines,
    epoch: NavigationEpoch,
    echo_window: Duration,
    last_history_write: Mutex<Option<u64>>,
}

impl fmt::Debug for NavigationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationDispatcher")
            .field("pipelines", &self.pipelines)
            .field("epoch", &self.epoch)
            .field("echo_window", &self.echo_window)
            .finish()
    }
}

impl NavigationDispatcher {
    pub fn new(
        resolver: RoutingResolver,
        store: Arc<StateStore>,
        history: Arc<dyn History>,
        clock: Arc<dyn Clock>,
        pipelines: NavigationPipelines,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            resolver,
            store,
            history,
            clock,
            pipelines,
            epoch: NavigationEpoch::new(),
            echo_window: config.echo_window(),
            last_history_write: Mutex::new(None),
        }
    }

    pub fn resolver(&self) -> &RoutingResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn epoch(&self) -> &NavigationEpoch {
        &self.epoch
    }

    pub fn pipelines(&self) -> &NavigationPipelines {
        &self.pipelines
    }

    /// 首次加载。
    pub async fn start(&self) -> DispatchOutcome {
        let mut resolved = self.resolver.resolve(&self.history.location_hash());
        if resolved.is_plain_hash {
            resolved = self.resolver.resolve("");
        }
        let state = self
            .history
            .state()
            .filter(|state| state.hash == resolved.hash)
            .or_else(|| self.store.get_state(&view_key(&resolved.hash)))
            .unwrap_or_else(|| self.fallback(resolved));
        tracing::debug!(hash = %state.hash, view = %state.view, "initial navigation");
        self.replace_history(&state);
        self.navigate(NavigationKind::Initial, state).await
    }

    /// 处理导航触发元素的点击。
    pub async fn click(&self, trigger: &NavigationTrigger) -> DispatchOutcome {
        if !trigger.spa() {
            return DispatchOutcome::Ignored(IgnoreReason::SpaDisabled);
        }
        let Some(target) = trigger.target() else {
            return DispatchOutcome::Ignored(IgnoreReason::MissingTarget);
        };
        let resolved = self.resolver.resolve(target);
        if resolved.is_plain_hash {
            return DispatchOutcome::Ignored(IgnoreReason::PlainAnchor);
        }

        let mut state = resolved.into_state(trigger.container());
        state.data.extend(trigger.data());
        state.timestamp = self.clock.now_millis();

        self.persist(&state);
        self.history.push_state(&state, &state.hash);
        *self.last_history_write.lock() = Some(state.timestamp);
        tracing::debug!(hash = %state.hash, view = %state.view, container = %state.container, "click navigation");
        self.navigate(NavigationKind::Click, state).await
    }

    /// 处理 `popstate`。
    pub async fn pop_state(&self) -> DispatchOutcome {
        self.restore(NavigationKind::PopState).await
    }

    /// 处理 `hashchange`。
    pub async fn hash_change(&self) -> DispatchOutcome {
        let now = self.clock.now_millis();
        let last_write = *self.last_history_write.lock();
        let echo = last_write
            .is_some_and(|at| Duration::from_millis(now.saturating_sub(at)) <= self.echo_window);
        if echo {
            tracing::trace!(now, ?last_write, "hashchange echo ignored");
            return DispatchOutcome::Ignored(IgnoreReason::Echo);
        }
        self.restore(NavigationKind::HashChange).await
    }

    /// 处理表单提交。
    ///
    /// # 教案式注释
    /// - **前置条件**：此前至少有一次脚本模式装载成功，否则返回 [`NavigationError::NoActiveController`]；
    /// - **后置条件**：提交不推进导航世代，不会取代进行中的视图装载；
    /// - **错误**：控制器装载扩展在表单模式下的任何失败都会返回给调用方，其他扩展的失败仍留在报告中。
    pub async fn submit(&self, form: FormTrigger) -> Result<DispatchOutcome, NavigationError> {
        if !form.spa() {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::SpaDisabled));
        }
        let submission = form.into_submission();
        let mut state = RoutingState {
            data: submission.data.clone(),
            form: Some(submission),
            spa: true,
            timestamp: self.clock.now_millis(),
            hash: self.history.location_hash(),
            ..RoutingState::default()
        };

        let run = self.epoch.join();
        let mut controller = self.pipelines.controller.run(&mut state, &run).await;
        if let Some(err) = controller.take_failure(CONTROLLER_LOADER) {
            return Err(err);
        }
        Ok(DispatchOutcome::Navigated(Box::new(NavigationReport {
            kind: NavigationKind::Submit,
            state,
            generation: run.generation(),
            controller,
            route: None,
        })))
    }

    async fn restore(&self, kind: NavigationKind) -> DispatchOutcome {
        let resolved = self.resolver.resolve(&self.history.location_hash());
        if resolved.is_plain_hash {
            return DispatchOutcome::Ignored(IgnoreReason::PlainAnchor);
        }
        let state = match self.store.get_state(&view_key(&resolved.hash)) {
            Some(stored) => stored,
            None => {
                tracing::debug!(hash = %resolved.hash, "no stored state; synthesizing fallback");
                self.fallback(resolved)
            }
        };
        self.replace_history(&state);
        self.navigate(kind, state).await
    }

    /// 按配置默认值合成的状态：根区域、载荷为空。
    fn fallback(&self, resolved: ResolvedRoute) -> RoutingState {
        let mut state = resolved.into_state("");
        state.data.clear();
        state.timestamp = self.clock.now_millis();
        state
    }

    fn replace_history(&self, state: &RoutingState) {
        self.history.replace_state(state, &state.hash);
        *self.last_history_write.lock() = Some(self.clock.now_millis());
    }

    fn persist(&self, state: &RoutingState) {
        let result = self
            .store
            .put_state(view_key(&state.hash), state)
            .and_then(|()| self.store.put_state(LAST_VIEW_KEY, state));
        if let Err(err) = result {
            tracing::warn!(hash = %state.hash, code = err.code(), error = %err, "failed to persist navigation state");
        }
    }

    async fn navigate(&self, kind: NavigationKind, mut state: RoutingState) -> DispatchOutcome {
        let run = self.epoch.begin();
        let controller = self.pipelines.controller.run(&mut state, &run).await;
        let route = self.pipelines.route.run(&mut state, &run).await;
        if controller.is_superseded() || route.is_superseded() {
            tracing::debug!(generation = run.generation(), view = %state.view, "navigation superseded");
        }
        DispatchOutcome::Navigated(Box::new(NavigationReport {
            kind,
            state,
            generation: run.generation(),
            controller,
            route: Some(route),
        }))
    }
}
