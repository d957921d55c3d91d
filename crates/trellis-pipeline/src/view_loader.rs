//! 视图装载扩展。
//!
//! # 教案式说明
//! - **意图（Why）**：控制器钩子可能引用视图中的元素，视图必须先于控制器可见，因此本扩展总是排在控制器管线首位；
//! - **契约（What）**：
//!   1. `view` 为空时直接跳过；
//!   2. 以文本方式获取片段（经由 [`HttpClient`]，因此会广播请求/响应事件）；
//!   3. 目标区域依次取 `state.container`、配置的默认区域、文档主体；目标不存在时静默跳过；
//!   4. 替换目标内容并广播 `onViewLoaded`；
//!   5. 仅当目标为根区域时更新浏览历史：地址与 `state.hash` 不同则 `push_state`，相同则 `replace_state`；
//! - **失败语义**：获取失败直接返回错误，此时既不修改文档也不更新历史；
//! - **世代保护**：获取完成后若本次运行已被新导航取代，放弃全部副作用并报告 `Superseded`。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use trellis_core::config::ViewConfig;
use trellis_core::error::NavigationError;
use trellis_core::events::{EventBus, LifecycleEvent, LifecycleEventKind};
use trellis_core::extension::{Extension, RunContext, StepStatus};
use trellis_core::fetch::HttpClient;
use trellis_core::host::{Document, ElementHandle, History};
use trellis_core::state::RoutingState;

/// 扩展名称。
pub const VIEW_LOADER: &str = "view-loader";

/// 视图装载扩展。
pub struct ViewLoader {
    client: HttpClient,
    document: Arc<dyn Document>,
    history: Arc<dyn History>,
    events: Arc<EventBus>,
    config: ViewConfig,
}

impl ViewLoader {
    pub fn new(
        client: HttpClient,
        document: Arc<dyn Document>,
        history: Arc<dyn History>,
        config: ViewConfig,
    ) -> Self {
        let events = Arc::clone(client.events());
        Self {
            client,
            document,
            history,
            events,
            config,
        }
    }

    /// 解析目标区域，返回元素与“是否根区域”。
    fn resolve_target(&self, state: &RoutingState) -> Option<(ElementHandle, bool)> {
        let default = self.config.default_container.as_str();
        if !state.container.is_empty() && state.container != default {
            return self
                .document
                .query(&state.container)
                .map(|element| (element, false));
        }
        let from_default = (!default.is_empty())
            .then(|| self.document.query(default))
            .flatten();
        from_default
            .or_else(|| self.document.query(&self.config.body_selector))
            .map(|element| (element, true))
    }
}

#[async_trait]
impl Extension for ViewLoader {
    fn name(&self) -> &str {
        VIEW_LOADER
    }

    async fn handle(
        &self,
        state: &mut RoutingState,
        run: &RunContext,
    ) -> Result<StepStatus, NavigationError> {
        if state.view.is_empty() {
            return Ok(StepStatus::skipped("no view to load"));
        }

        let markup = self.client.get_text(&state.view).await?;

        if !run.is_current() {
            tracing::debug!(
                view = %state.view,
                generation = run.generation(),
                "view load superseded by a newer navigation"
            );
            return Ok(StepStatus::Superseded);
        }

        let Some((target, is_root)) = self.resolve_target(state) else {
            tracing::debug!(view = %state.view, container = %state.container, "target region missing");
            return Ok(StepStatus::skipped(format!(
                "container `{}` not found",
                state.container
            )));
        };

        self.document.replace_content(&target, &markup);
        self.events.emit(LifecycleEvent::new(
            LifecycleEventKind::ViewLoaded,
            json!({ "view": state.view, "container": target.as_str() }),
        ));

        if is_root {
            if self.history.location_hash() == state.hash {
                self.history.replace_state(state, &state.hash);
            } else {
                self.history.push_state(state, &state.hash);
            }
        }
        tracing::info!(view = %state.view, container = %target, root = is_root, "view loaded");
        Ok(StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use trellis_core::extension::NavigationEpoch;
    use trellis_core::test_stubs::{
        HistoryOp, InMemoryDocument, RecordingHistory, RecordingListener, StaticFetcher,
    };

    struct Fixture {
        document: Arc<InMemoryDocument>,
        history: Arc<RecordingHistory>,
        listener: RecordingListener,
        loader: ViewLoader,
    }

    fn fixture(fetcher: StaticFetcher) -> Fixture {
        let document = Arc::new(InMemoryDocument::new().with_region("#app").with_region("#side"));
        let history = Arc::new(RecordingHistory::at("https://app.example/"));
        let events = Arc::new(EventBus::new());
        let listener = RecordingListener::attach(&events);
        let client = HttpClient::new(Arc::new(fetcher), events);
        let loader = ViewLoader::new(
            client,
            document.clone(),
            history.clone(),
            ViewConfig::default(),
        );
        Fixture {
            document,
            history,
            listener,
            loader,
        }
    }

    #[test]
    fn root_container_updates_the_address() {
        let fx = fixture(StaticFetcher::new().with_text("views/about.html", "<h1>about</h1>"));
        let mut state = RoutingState::new("views/about.html", "#!about");

        let status = block_on(fx.loader.handle(&mut state, &RunContext::detached()))
            .expect("装载应成功");

        assert_eq!(status, StepStatus::Completed);
        assert_eq!(fx.document.content("#app").as_deref(), Some("<h1>about</h1>"));
        assert_eq!(fx.history.location_hash(), "#!about");
        assert_eq!(fx.history.ops(), vec![HistoryOp::Push("#!about".to_owned())]);
        assert_eq!(
            fx.listener.kinds(),
            vec![
                LifecycleEventKind::DataRequested,
                LifecycleEventKind::DataReceived,
                LifecycleEventKind::ViewLoaded
            ]
        );
    }

    #[test]
    fn already_current_address_is_replaced_not_pushed() {
        let fx = fixture(StaticFetcher::new().with_text("views/about.html", "<h1>about</h1>"));
        let mut state = RoutingState::new("views/about.html", "#!about");
        fx.history.navigate_externally("#!about", None);

        block_on(fx.loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");
        assert_eq!(fx.history.ops(), vec![HistoryOp::Replace("#!about".to_owned())]);
    }

    #[test]
    fn non_root_container_leaves_the_address_alone() {
        let fx = fixture(StaticFetcher::new().with_text("views/menu.html", "<ul></ul>"));
        let mut state = RoutingState::new("views/menu.html", "#!menu").with_container("#side");

        block_on(fx.loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");

        assert_eq!(fx.document.content("#side").as_deref(), Some("<ul></ul>"));
        assert_eq!(fx.history.location_hash(), "");
        assert!(fx.history.ops().is_empty());
    }

    #[test]
    fn missing_container_is_a_quiet_skip() {
        let fx = fixture(StaticFetcher::new().with_text("views/menu.html", "<ul></ul>"));
        let mut state = RoutingState::new("views/menu.html", "#!menu").with_container("#nowhere");

        let status = block_on(fx.loader.handle(&mut state, &RunContext::detached()))
            .expect("缺失区域不是错误");
        assert!(matches!(status, StepStatus::Skipped(_)));
        assert!(fx.document.replacements().is_empty());
    }

    #[test]
    fn fetch_failure_mutates_nothing() {
        let fx = fixture(StaticFetcher::new());
        let mut state = RoutingState::new("views/missing.html", "#!missing");

        let err = block_on(fx.loader.handle(&mut state, &RunContext::detached()))
            .expect_err("404 应失败");
        assert_eq!(err.code(), trellis_core::error::codes::FETCH_STATUS);
        assert!(fx.document.replacements().is_empty());
        assert!(fx.history.ops().is_empty());
    }

    #[test]
    fn superseded_run_discards_its_effects() {
        let fx = fixture(StaticFetcher::new().with_text("views/old.html", "<p>old</p>"));
        let epoch = NavigationEpoch::new();
        let stale = epoch.begin();
        let _newer = epoch.begin();
        let mut state = RoutingState::new("views/old.html", "#!old");

        let status = block_on(fx.loader.handle(&mut state, &stale)).expect("过期运行不是错误");
        assert_eq!(status, StepStatus::Superseded);
        assert!(fx.document.replacements().is_empty());
        assert!(fx.history.ops().is_empty());
    }

    #[test]
    fn empty_view_is_skipped_without_fetching() {
        let fx = fixture(StaticFetcher::new());
        let mut state = RoutingState::default();
        let status = block_on(fx.loader.handle(&mut state, &RunContext::detached()))
            .expect("空视图应跳过");
        assert!(matches!(status, StepStatus::Skipped(_)));
        assert!(fx.listener.events().is_empty());
    }
}
