//! 导航器装配。
//!
//! # 教案式说明
//! - **意图（Why）**：把配置、宿主能力、控制器登记与应用扩展收拢到一个入口，浏览器适配层只需转交事件；
//! - **契约（What）**：[`NavigatorBuilder::build`] 产出的 [`Navigator`] 持有固定顺序的两条管线，
//!   并与分发器共享同一个控制器装载扩展，以便查询当前控制器；
//! - **执行（How）**：仓储按“注入实例 → 持久化后端 → 内存后端”的优先级打开，调用顺序不影响优先级。

use std::fmt;
use std::sync::Arc;

use trellis_core::config::NavigatorConfig;
use trellis_core::controller::{Controller, ControllerFactory};
use trellis_core::error::{ConfigError, NavigationError, StoreError};
use trellis_core::events::EventBus;
use trellis_core::extension::Extension;
use trellis_core::fetch::{Fetcher, HttpClient};
use trellis_core::host::{Document, History};
use trellis_core::store::{MemoryStorage, StateStore, StorageBackend};
use trellis_core::time::{Clock, SystemClock};
use trellis_pipeline::{
    ControllerLoader, ControllerRegistration, ControllerRegistry, ExtensionPipeline,
    ReportObserver, TriggerBinder, ViewLoader,
};
use trellis_router::{
    DispatchOutcome, FormTrigger, NavigationDispatcher, NavigationPipelines, NavigationTrigger,
    RoutingResolver,
};

type OpenStore = Box<dyn FnOnce(&str) -> Result<StateStore, StoreError> + Send>;

/// 尚未提供的宿主能力。
fn missing(field: &'static str) -> NavigationError {
    NavigationError::Config(ConfigError::Invalid {
        field,
        reason: "required host capability was not provided".to_owned(),
    })
}

/// `NavigatorBuilder` 聚合配置、宿主能力、控制器注册与自定义扩展的装配步骤。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 浏览器适配层只需提供文档、浏览历史与网络三项宿主能力，其余部件（仓储、事件总线、时钟、注册表）
///     都有合理默认值，避免应用层重复拼装管线；
/// - **关键流程 (How)**
///   1. `config`/`storage`/`document`/`history`/`fetcher` 等方法登记部件；
///   2. `register_controller` 与 `route_extension`/`controller_extension` 登记应用代码；
///   3. `build`：校验配置、打开仓储，按固定顺序组装两条管线并产出 [`Navigator`]。
/// - **契约说明 (What)**
///   - 控制器管线顺序固定为视图装载 → 控制器装载 → 应用扩展；路由管线为触发元素绑定 → 应用扩展；
///   - 缺少文档、浏览历史或网络层时 `build` 返回 [`ConfigError::Invalid`]；
///   - 仓储缺省为按配置存储键打开的内存后端。
/// - **风险提示 (Trade-offs)**
///   - 同一个报告观察者同时挂在两条管线上，观察者需按 [`trellis_pipeline::PipelineReport::pipeline`] 自行区分。
#[derive(Default)]
pub struct NavigatorBuilder {
    config: NavigatorConfig,
    storage: Option<OpenStore>,
    store: Option<Arc<StateStore>>,
    document: Option<Arc<dyn Document>>,
    history: Option<Arc<dyn History>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<EventBus>>,
    registry: Option<Arc<ControllerRegistry>>,
    controllers: Vec<ControllerRegistration>,
    route_extensions: Vec<Arc<dyn Extension>>,
    controller_extensions: Vec<Arc<dyn Extension>>,
    observer: Option<Arc<dyn ReportObserver>>,
}

impl fmt::Debug for NavigatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigatorBuilder")
            .field("config", &self.config)
            .field("document", &self.document.is_some())
            .field("history", &self.history.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .field("controllers", &self.controllers.len())
            .field("route_extensions", &self.route_extensions.len())
            .field("controller_extensions", &self.controller_extensions.len())
            .finish()
    }
}

impl NavigatorBuilder {
    /// 创建使用默认配置的 Builder。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: NavigatorConfig) -> Self {
        self.config = config;
        self
    }

    /// 以持久化后端打开仓储，存储键取自配置。
    pub fn storage(mut self, backend: impl StorageBackend) -> Self {
        self.storage = Some(Box::new(move |key| StateStore::open(backend, key)));
        self
    }

    /// 注入已打开的仓储；无论调用顺序，都优先于 [`Self::storage`]。
    pub fn store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn document(mut self, document: Arc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// 缺省为 [`SystemClock`]。
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 共享外部事件总线，便于在构建前订阅。
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// 使用外部控制器注册表，便于运行期热替换。
    pub fn registry(mut self, registry: Arc<ControllerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 登记控制器工厂；构建时写入注册表。
    pub fn register_controller(
        mut self,
        script: impl Into<String>,
        factory: impl ControllerFactory,
    ) -> Self {
        self.controllers
            .push(ControllerRegistration::new(script, factory));
        self
    }

    /// 追加到路由管线末尾。
    pub fn route_extension(mut self, extension: impl Extension) -> Self {
        self.route_extensions.push(Arc::new(extension));
        self
    }

    /// 追加到控制器管线末尾，位于控制器装载之后。
    pub fn controller_extension(mut self, extension: impl Extension) -> Self {
        self.controller_extensions.push(Arc::new(extension));
        self
    }

    pub fn report_observer(mut self, observer: impl ReportObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// 校验配置并组装导航器。
    ///
    /// - **前置条件**：文档、浏览历史与网络层均已提供；
    /// - **后置条件**：注册表包含全部登记的控制器，两条管线已按固定顺序组装；
    /// - **错误**：配置非法或缺少宿主能力返回 [`NavigationError::Config`]，仓储打开失败返回 [`NavigationError::Store`]。
    pub fn build(self) -> Result<Navigator, NavigationError> {
        let config = self.config;
        config.validate()?;

        let document = self.document.ok_or_else(|| missing("host.document"))?;
        let history = self.history.ok_or_else(|| missing("host.history"))?;
        let fetcher = self.fetcher.ok_or_else(|| missing("host.fetcher"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_default();
        let registry = self.registry.unwrap_or_default();

        let store = match (self.store, self.storage) {
            (Some(store), _) => store,
            (None, Some(open)) => Arc::new(open(&config.store.storage_key)?),
            (None, None) => Arc::new(StateStore::open(
                MemoryStorage::new(),
                config.store.storage_key.as_str(),
            )?),
        };

        for registration in self.controllers {
            registry.add(registration);
        }

        let loader = Arc::new(ControllerLoader::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            config.controllers.instance_policy,
        ));

        let mut controller = ExtensionPipeline::new("controller");
        controller
            .add(ViewLoader::new(
                HttpClient::new(fetcher, Arc::clone(&events)),
                Arc::clone(&document),
                Arc::clone(&history),
                config.view.clone(),
            ))
            .add_shared(loader.clone());
        for extension in self.controller_extensions {
            controller.add_shared(extension);
        }

        let mut route = ExtensionPipeline::new("route");
        route.add(TriggerBinder::new(
            document,
            config.dispatch.trigger_selector.clone(),
        ));
        for extension in self.route_extensions {
            route.add_shared(extension);
        }

        if let Some(observer) = self.observer {
            controller.set_observer(Arc::clone(&observer));
            route.set_observer(observer);
        }

        let dispatcher = NavigationDispatcher::new(
            RoutingResolver::new(config.routing.clone()),
            Arc::clone(&store),
            history,
            clock,
            NavigationPipelines { route, controller },
            &config.dispatch,
        );
        tracing::info!(
            storage_key = %store.storage_key(),
            controllers = registry.len(),
            "navigator assembled"
        );

        Ok(Navigator {
            config,
            dispatcher,
            store,
            registry,
            events,
            loader,
        })
    }
}

/// 装配完成的导航器，浏览器适配层把事件转交到这里。
pub struct Navigator {
    config: NavigatorConfig,
    dispatcher: NavigationDispatcher,
    store: Arc<StateStore>,
    registry: Arc<ControllerRegistry>,
    events: Arc<EventBus>,
    loader: Arc<ControllerLoader>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("dispatcher", &self.dispatcher)
            .field("store", &self.store)
            .field("loader", &self.loader)
            .finish()
    }
}

impl Navigator {
    pub fn builder() -> NavigatorBuilder {
        NavigatorBuilder::new()
    }

    /// 首次加载。
    pub async fn start(&self) -> DispatchOutcome {
        self.dispatcher.start().await
    }

    pub async fn click(&self, trigger: &NavigationTrigger) -> DispatchOutcome {
        self.dispatcher.click(trigger).await
    }

    /// 表单提交；控制器拒绝时返回错误。
    pub async fn submit(&self, form: FormTrigger) -> Result<DispatchOutcome, NavigationError> {
        self.dispatcher.submit(form).await
    }

    pub async fn pop_state(&self) -> DispatchOutcome {
        self.dispatcher.pop_state().await
    }

    pub async fn hash_change(&self) -> DispatchOutcome {
        self.dispatcher.hash_change().await
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &NavigationDispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// 最近一次装载成功的控制器。
    pub fn current_controller(&self) -> Option<Arc<dyn Controller>> {
        self.loader.current()
    }

    /// 当前控制器的唯一标识。
    pub fn current_controller_identifier(&self) -> Option<String> {
        self.loader.current_identifier()
    }
}
