//! 控制器装载扩展。
//!
//! # 教案式说明
//! - **意图（Why）**：视图可见后，为其关联的控制器构造实例、执行生命周期钩子，并把表单提交转交给当前控制器；
//! - **三种互斥模式（What）**：
//!   - **表单模式**（`state.form` 存在，优先于脚本模式）：调用当前控制器的 `on_submit`，广播 `onFormSubmitted`；
//!     没有当前控制器时返回 [`NavigationError::NoActiveController`]；
//!   - **脚本模式**（`controller_script` 存在）：
//!     1. 按注册表同样的规则规范化脚本路径（去掉开头的 `/` 与 `./`），以规范化路径推导确定性的唯一标识 [`unique_identifier`]，不同路径下同名控制器互不冲突；
//!     2. 每个脚本路径只从注册表物化一次定义，之后的导航复用该定义；
//!     3. 依据 [`InstancePolicy`] 新建或复用实例，执行 `on_init` 与 `on_load(data)`；
//!     4. 成功后按唯一标识缓存实例并设为当前控制器；
//!     5. `on_load` 返回后再次检查世代：被更新导航取代的运行既不写入缓存也不改动当前控制器，
//!        实例随运行一起丢弃，界面上的视图始终与当前控制器配对；
//!   - **空操作**：两者都不存在时跳过；
//! - **失败语义**：脚本模式的失败写入管线报告，不会阻断导航；表单模式的失败由分发器交还给提交者。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use trellis_core::config::InstancePolicy;
use trellis_core::controller::{Controller, ControllerFactory};
use trellis_core::error::NavigationError;
use trellis_core::events::{EventBus, LifecycleEvent, LifecycleEventKind};
use trellis_core::extension::{Extension, RunContext, StepStatus};
use trellis_core::state::RoutingState;

use crate::registry::{ControllerRegistry, normalize_script};

/// 扩展名称。
pub const CONTROLLER_LOADER: &str = "controller-loader";

/// 由脚本路径推导唯一标识：文件名主干加上路径的 FNV-1a 摘要。
pub fn unique_identifier(script: &str) -> String {
    let file = script.rsplit('/').next().unwrap_or(script);
    let stem = file.split('.').next().unwrap_or(file);
    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}_{:016x}", fnv1a(script.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

/// 已物化的控制器定义。
#[derive(Clone)]
struct ControllerDefinition {
    identifier: String,
    factory: Arc<dyn ControllerFactory>,
}

/// 当前控制器。
#[derive(Clone)]
struct ActiveController {
    identifier: String,
    instance: Arc<dyn Controller>,
}

/// 控制器装载扩展。
pub struct ControllerLoader {
    registry: Arc<ControllerRegistry>,
    events: Arc<EventBus>,
    policy: InstancePolicy,
    definitions: Mutex<HashMap<String, ControllerDefinition>>,
    instances: Mutex<HashMap<String, Arc<dyn Controller>>>,
    current: Mutex<Option<ActiveController>>,
}

impl fmt::Debug for ControllerLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerLoader")
            .field("policy", &self.policy)
            .field("definitions", &self.definition_count())
            .field("instances", &self.instances.lock().len())
            .field("current", &self.current_identifier())
            .finish()
    }
}

impl ControllerLoader {
    pub fn new(registry: Arc<ControllerRegistry>, events: Arc<EventBus>, policy: InstancePolicy) -> Self {
        Self {
            registry,
            events,
            policy,
            definitions: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    /// 已物化的定义数量，即不同脚本路径的数量。
    pub fn definition_count(&self) -> usize {
        self.definitions.lock().len()
    }

    /// 当前控制器的唯一标识。
    pub fn current_identifier(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|active| active.identifier.clone())
    }

    /// 当前控制器实例。
    pub fn current(&self) -> Option<Arc<dyn Controller>> {
        self.current
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.instance))
    }

    /// 按唯一标识读取缓存实例。
    pub fn cached(&self, identifier: &str) -> Option<Arc<dyn Controller>> {
        self.instances.lock().get(identifier).cloned()
    }

    /// 缓存实例数量。
    pub fn cached_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn definition_for(&self, script: &str) -> Result<ControllerDefinition, NavigationError> {
        let key = normalize_script(script);
        let mut definitions = self.definitions.lock();
        if let Some(definition) = definitions.get(&key) {
            return Ok(definition.clone());
        }
        let factory = self
            .registry
            .lookup(&key)
            .ok_or_else(|| NavigationError::ControllerNotRegistered {
                script: script.to_owned(),
            })?;
        let definition = ControllerDefinition {
            identifier: unique_identifier(&key),
            factory,
        };
        tracing::debug!(script = %key, identifier = %definition.identifier, "controller definition materialized");
        definitions.insert(key, definition.clone());
        Ok(definition)
    }

    async fn load_script(
        &self,
        script: &str,
        state: &RoutingState,
        run: &RunContext,
    ) -> Result<StepStatus, NavigationError> {
        let definition = self.definition_for(script)?;
        if !run.is_current() {
            return Ok(StepStatus::Superseded);
        }

        let reused = match self.policy {
            InstancePolicy::ReuseCached => self.cached(&definition.identifier),
            InstancePolicy::Fresh => None,
        };
        let instance = match reused {
            Some(instance) => instance,
            None => {
                let instance = definition.factory.create();
                instance.on_init();
                instance
            }
        };

        instance
            .on_load(&state.data)
            .await
            .map_err(|source| NavigationError::ControllerHook {
                controller: definition.identifier.clone(),
                hook: "on_load",
                source,
            })?;
        if !run.is_current() {
            tracing::debug!(
                script,
                generation = run.generation(),
                "controller load superseded after on_load"
            );
            return Ok(StepStatus::Superseded);
        }

        self.instances
            .lock()
            .insert(definition.identifier.clone(), Arc::clone(&instance));
        *self.current.lock() = Some(ActiveController {
            identifier: definition.identifier.clone(),
            instance,
        });
        tracing::info!(script, identifier = %definition.identifier, "controller loaded");
        Ok(StepStatus::Completed)
    }

    async fn submit(&self, state: &RoutingState) -> Result<StepStatus, NavigationError> {
        let Some(form) = state.form.as_ref() else {
            return Ok(StepStatus::skipped("no form"));
        };
        // 先克隆出当前控制器，避免在 await 期间持有锁。
        let active = self.current.lock().clone();
        let Some(active) = active else {
            tracing::warn!(action = %form.action, "form submitted without an active controller");
            return Err(NavigationError::NoActiveController);
        };

        active
            .instance
            .on_submit(form)
            .await
            .map_err(|source| NavigationError::ControllerHook {
                controller: active.identifier.clone(),
                hook: "on_submit",
                source,
            })?;

        self.events.emit(LifecycleEvent::new(
            LifecycleEventKind::FormSubmitted,
            json!({
                "controller": active.identifier,
                "action": form.action,
                "form": form.form.as_str(),
                "data": form.data,
            }),
        ));
        Ok(StepStatus::Completed)
    }
}

#[async_trait]
impl Extension for ControllerLoader {
    fn name(&self) -> &str {
        CONTROLLER_LOADER
    }

    async fn handle(
        &self,
        state: &mut RoutingState,
        run: &RunContext,
    ) -> Result<StepStatus, NavigationError> {
        if state.is_form_submission() {
            return self.submit(state).await;
        }
        match state.controller_script.clone() {
            Some(script) if !script.is_empty() => self.load_script(&script, state, run).await,
            _ => Ok(StepStatus::skipped("no controller")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trellis_core::extension::NavigationEpoch;
    use trellis_core::error::ControllerError;
    use trellis_core::host::ElementHandle;
    use trellis_core::state::{FormSubmission, StateData};
    use trellis_core::test_stubs::RecordingListener;

    #[derive(Default)]
    struct Tally {
        created: AtomicUsize,
        inits: AtomicUsize,
        loads: AtomicUsize,
        submits: AtomicUsize,
    }

    struct Tracked {
        tally: Arc<Tally>,
        fail_load: bool,
    }

    #[async_trait]
    impl Controller for Tracked {
        fn on_init(&self) {
            self.tally.inits.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_load(&self, _data: &StateData) -> Result<(), ControllerError> {
            self.tally.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(ControllerError::new("backend offline"));
            }
            Ok(())
        }

        async fn on_submit(&self, _form: &FormSubmission) -> Result<(), ControllerError> {
            self.tally.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn register(registry: &ControllerRegistry, script: &str, tally: &Arc<Tally>, fail_load: bool) {
        let tally = Arc::clone(tally);
        registry.register(script, move || {
            tally.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(Tracked {
                tally: Arc::clone(&tally),
                fail_load,
            }) as Arc<dyn Controller>
        });
    }

    fn script_state(script: &str) -> RoutingState {
        let mut state = RoutingState::new("views/x.html", "#!x");
        state.controller_script = Some(script.to_owned());
        state
    }

    fn loader(registry: Arc<ControllerRegistry>, policy: InstancePolicy) -> ControllerLoader {
        ControllerLoader::new(registry, Arc::new(EventBus::new()), policy)
    }

    #[test]
    fn same_script_is_defined_once_and_instantiated_fresh() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/reports/summary.js", &tally, false);
        let loader = loader(registry, InstancePolicy::Fresh);

        for _ in 0..2 {
            let mut state = script_state("controllers/reports/summary.js");
            let status = block_on(loader.handle(&mut state, &RunContext::detached()))
                .expect("装载应成功");
            assert_eq!(status, StepStatus::Completed);
        }

        assert_eq!(loader.definition_count(), 1, "同一路径只物化一次定义");
        assert_eq!(tally.created.load(Ordering::SeqCst), 2, "每次装载都从定义新建实例");
        assert_eq!(tally.inits.load(Ordering::SeqCst), 2);
        assert_eq!(loader.cached_count(), 1);
    }

    #[test]
    fn reuse_policy_keeps_the_cached_instance() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/home.js", &tally, false);
        let loader = loader(registry, InstancePolicy::ReuseCached);

        for _ in 0..3 {
            let mut state = script_state("controllers/home.js");
            block_on(loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");
        }
        assert_eq!(tally.created.load(Ordering::SeqCst), 1);
        assert_eq!(tally.inits.load(Ordering::SeqCst), 1);
        assert_eq!(tally.loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn same_name_at_two_paths_does_not_collide() {
        let registry = Arc::new(ControllerRegistry::new());
        let admin = Arc::new(Tally::default());
        let public = Arc::new(Tally::default());
        register(&registry, "controllers/admin/list.js", &admin, false);
        register(&registry, "controllers/public/list.js", &public, false);
        let loader = loader(registry, InstancePolicy::Fresh);

        let admin_id = unique_identifier("controllers/admin/list.js");
        let public_id = unique_identifier("controllers/public/list.js");
        assert_ne!(admin_id, public_id);
        assert!(admin_id.starts_with("list_"));

        for script in ["controllers/admin/list.js", "controllers/public/list.js"] {
            let mut state = script_state(script);
            block_on(loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");
        }

        assert_eq!(loader.definition_count(), 2);
        assert!(loader.cached(&admin_id).is_some());
        assert!(loader.cached(&public_id).is_some());
        assert_eq!(loader.current_identifier(), Some(public_id));
        assert_eq!(admin.loads.load(Ordering::SeqCst), 1);
        assert_eq!(public.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_failure_is_reported_and_not_cached() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/broken.js", &tally, true);
        let loader = loader(registry, InstancePolicy::Fresh);

        let mut state = script_state("controllers/broken.js");
        let err = block_on(loader.handle(&mut state, &RunContext::detached()))
            .expect_err("on_load 失败应返回错误");
        assert!(matches!(
            err,
            NavigationError::ControllerHook { hook: "on_load", .. }
        ));
        assert_eq!(loader.cached_count(), 0);
        assert!(loader.current().is_none());

        let mut unknown = script_state("controllers/unknown.js");
        let err = block_on(loader.handle(&mut unknown, &RunContext::detached()))
            .expect_err("未登记脚本应失败");
        assert!(matches!(err, NavigationError::ControllerNotRegistered { .. }));
    }

    #[test]
    fn form_mode_requires_an_active_controller() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/login.js", &tally, false);
        let events = Arc::new(EventBus::new());
        let listener = RecordingListener::attach(&events);
        let loader = ControllerLoader::new(registry, events, InstancePolicy::Fresh);

        let form = FormSubmission::new(ElementHandle::new("form#login"), "login", StateData::new());
        let mut submit = RoutingState {
            form: Some(form),
            ..RoutingState::default()
        };
        let err = block_on(loader.handle(&mut submit.clone(), &RunContext::detached()))
            .expect_err("没有当前控制器时应拒绝");
        assert!(matches!(err, NavigationError::NoActiveController));

        let mut state = script_state("controllers/login.js");
        block_on(loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");
        block_on(loader.handle(&mut submit, &RunContext::detached())).expect("提交应成功");

        assert_eq!(tally.submits.load(Ordering::SeqCst), 1);
        assert_eq!(listener.kinds(), vec![LifecycleEventKind::FormSubmitted]);
        assert_eq!(listener.events()[0].detail["action"], json!("login"));
    }

    #[test]
    fn slash_variants_share_one_definition() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/x.js", &tally, false);
        let loader = loader(registry, InstancePolicy::ReuseCached);

        for script in ["/controllers/x.js", "controllers/x.js", "./controllers/x.js"] {
            let mut state = script_state(script);
            block_on(loader.handle(&mut state, &RunContext::detached())).expect("装载应成功");
        }

        assert_eq!(loader.definition_count(), 1);
        assert_eq!(loader.cached_count(), 1);
        assert_eq!(tally.created.load(Ordering::SeqCst), 1);
        assert_eq!(
            loader.current_identifier(),
            Some(unique_identifier("controllers/x.js"))
        );
    }

    #[test]
    fn superseded_run_does_not_instantiate() {
        let registry = Arc::new(ControllerRegistry::new());
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/stale.js", &tally, false);
        let loader = loader(registry, InstancePolicy::Fresh);

        let epoch = NavigationEpoch::new();
        let stale = epoch.begin();
        let _newer = epoch.begin();
        let mut state = script_state("controllers/stale.js");
        let status = block_on(loader.handle(&mut state, &stale)).expect("被取代不是错误");

        assert_eq!(status, StepStatus::Superseded);
        assert_eq!(tally.created.load(Ordering::SeqCst), 0);
        assert!(loader.current().is_none());
    }

    /// `on_load` 挂起到闸门放行为止。
    struct Gated {
        gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    }

    #[async_trait]
    impl Controller for Gated {
        async fn on_load(&self, _data: &StateData) -> Result<(), ControllerError> {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(())
        }
    }

    #[test]
    fn slow_load_finishing_after_newer_navigation_stays_out_of_current() {
        let registry = Arc::new(ControllerRegistry::new());
        let (release, gate) = oneshot::channel();
        let gate = Arc::new(Mutex::new(Some(gate)));
        registry.register("controllers/slow.js", move || {
            Arc::new(Gated {
                gate: Arc::clone(&gate),
            }) as Arc<dyn Controller>
        });
        let tally = Arc::new(Tally::default());
        register(&registry, "controllers/fast.js", &tally, false);
        let loader = loader(registry, InstancePolicy::ReuseCached);
        let epoch = NavigationEpoch::new();

        let older = async {
            let run = epoch.begin();
            let mut state = script_state("controllers/slow.js");
            loader.handle(&mut state, &run).await
        };
        let newer = async {
            let run = epoch.begin();
            let mut state = script_state("controllers/fast.js");
            let status = loader.handle(&mut state, &run).await;
            let _ = release.send(());
            status
        };
        let (older, newer) = block_on(async { futures::join!(older, newer) });

        assert_eq!(older.expect("被取代不是错误"), StepStatus::Superseded);
        assert_eq!(newer.expect("装载应成功"), StepStatus::Completed);
        assert_eq!(epoch.current(), 2);
        assert_eq!(
            loader.current_identifier(),
            Some(unique_identifier("controllers/fast.js"))
        );
        assert!(loader.cached(&unique_identifier("controllers/slow.js")).is_none());
        assert_eq!(loader.cached_count(), 1);
    }

    #[test]
    fn identifier_is_deterministic() {
        assert_eq!(
            unique_identifier("controllers/reports/summary.js"),
            unique_identifier("controllers/reports/summary.js")
        );
    }
}
