//! 控制器注册表。
//!
//! # 教案式说明
//! - **意图（Why）**：控制器的具体类型在导航发生前未知；应用在启动阶段按解析后的脚本路径登记工厂，
//!   装载器查表构造实例，不再依赖源码拼接与动态求值；
//! - **契约（What）**：
//!   - 键为规范化后的脚本路径（去掉开头的 `/` 与 `./`），与解析器产出的 `controller_script` 对应；
//!   - [`ControllerRegistry::update`] 整表替换，[`ControllerRegistry::register`] 增量登记，二者都立即对后续查询可见；
//! - **执行（How）**：读路径只做一次 `ArcSwap::load`，写路径复制整表后 `store`，与热更新路由表相同的读多写少模式。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use trellis_core::controller::ControllerFactory;

/// 一条登记记录。
#[derive(Clone)]
pub struct ControllerRegistration {
    /// 控制器脚本路径。
    pub script: String,
    /// 实例工厂。
    pub factory: Arc<dyn ControllerFactory>,
}

impl ControllerRegistration {
    pub fn new(script: impl Into<String>, factory: impl ControllerFactory) -> Self {
        Self {
            script: script.into(),
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for ControllerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistration")
            .field("script", &self.script)
            .finish()
    }
}

#[derive(Clone, Default)]
struct RegistryTable {
    entries: HashMap<String, Arc<dyn ControllerFactory>>,
}

/// 以脚本路径为键的控制器工厂表。
pub struct ControllerRegistry {
    table: ArcSwap<RegistryTable>,
    revision: AtomicU64,
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("revision", &self.revision())
            .field("scripts", &self.scripts())
            .finish()
    }
}

impl ControllerRegistry {
    /// 构造空注册表。
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RegistryTable::default()),
            revision: AtomicU64::new(0),
        }
    }

    /// 登记单个控制器；同一路径重复登记时后者覆盖前者。
    pub fn register(&self, script: impl AsRef<str>, factory: impl ControllerFactory) {
        self.add(ControllerRegistration::new(script.as_ref(), factory));
    }

    /// 登记一条已构造的记录。
    pub fn add(&self, registration: ControllerRegistration) {
        let ControllerRegistration { script, factory } = registration;
        let key = normalize_script(&script);
        self.table.rcu(|current| {
            let mut next = RegistryTable::clone(current);
            next.entries.insert(key.clone(), Arc::clone(&factory));
            next
        });
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(script = %key, "controller registered");
    }

    /// 整表替换。
    ///
    /// # 教案级说明
    /// - **意图 (Why)**：应用热更新时一次性交付完整登记集合，避免逐条更新期间出现半新半旧的表；
    /// - **后置条件 (Contract)**：新表立即对后续查询可见；已被装载器物化的定义不受影响。
    pub fn update<I>(&self, revision: u64, entries: I)
    where
        I: IntoIterator<Item = ControllerRegistration>,
    {
        let entries = entries
            .into_iter()
            .map(|ControllerRegistration { script, factory }| (normalize_script(&script), factory))
            .collect();
        self.table.store(Arc::new(RegistryTable { entries }));
        self.revision.store(revision, Ordering::Release);
    }

    /// 按脚本路径查找工厂。
    pub fn lookup(&self, script: &str) -> Option<Arc<dyn ControllerFactory>> {
        self.table
            .load()
            .entries
            .get(normalize_script(script).as_str())
            .cloned()
    }

    pub fn contains(&self, script: &str) -> bool {
        self.lookup(script).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前修订号。
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// 已登记的脚本路径，按字典序排列。
    pub fn scripts(&self) -> Vec<String> {
        let mut scripts: Vec<String> = self.table.load().entries.keys().cloned().collect();
        scripts.sort();
        scripts
    }
}

/// 规范化脚本路径：去掉首尾空白以及开头任意个 `/` 与 `./`。
pub fn normalize_script(script: &str) -> String {
    let mut trimmed = script.trim();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trellis_core::controller::Controller;
    use trellis_core::error::ControllerError;
    use trellis_core::state::StateData;

    struct Noop;

    #[async_trait]
    impl Controller for Noop {
        async fn on_load(&self, _data: &StateData) -> Result<(), ControllerError> {
            Ok(())
        }
    }

    fn noop() -> Arc<dyn Controller> {
        Arc::new(Noop)
    }

    #[test]
    fn lookup_ignores_leading_slashes() {
        let registry = ControllerRegistry::new();
        registry.register("/controllers/reports/summary.js", noop);
        assert!(registry.contains("controllers/reports/summary.js"));
        assert!(registry.contains("./controllers/reports/summary.js"));
        assert!(!registry.contains("controllers/summary.js"));
        assert_eq!(registry.revision(), 1);
    }

    #[test]
    fn update_replaces_the_whole_table() {
        let registry = ControllerRegistry::new();
        registry.register("controllers/old.js", noop);
        registry.update(
            7,
            [
                ControllerRegistration::new("controllers/a.js", noop),
                ControllerRegistration::new("controllers/b.js", noop),
            ],
        );
        assert_eq!(
            registry.scripts(),
            vec!["controllers/a.js".to_owned(), "controllers/b.js".to_owned()]
        );
        assert_eq!(registry.revision(), 7);
        assert!(!registry.contains("controllers/old.js"));
    }
}
