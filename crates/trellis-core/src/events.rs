//! 生命周期事件总线。
//!
//! # 教案式说明
//! - **意图（Why）**：框架内部的失败大多被管线吸收，外部协作者（日志面板、加载指示器、埋点）只能通过
//!   生命周期事件观察导航进展；
//! - **契约（What）**：
//!   - 事件种类固定为五种，名称与浏览器端事件一致（`onDataRequested` 等）；
//!   - `detail` 为自由格式 JSON；
//!   - 监听器按订阅顺序同步调用，调用期间不持有总线锁，监听器内部可以再次订阅或发射事件；
//! - **风险提示（Trade-offs）**：监听器运行在导航链路上，耗时逻辑应自行移交到其他任务。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

/// 生命周期事件种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    /// 发起数据或视图请求之前。
    DataRequested,
    /// 收到响应之后。
    DataReceived,
    /// 视图片段已写入目标区域。
    ViewLoaded,
    /// 表单已交给当前控制器。
    FormSubmitted,
    /// 模板投影完成。
    DataSplashed,
}

impl LifecycleEventKind {
    /// 浏览器端使用的事件名。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataRequested => "onDataRequested",
            Self::DataReceived => "onDataReceived",
            Self::ViewLoaded => "onViewLoaded",
            Self::FormSubmitted => "onFormSubmitted",
            Self::DataSplashed => "onDataSplashed",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条生命周期事件。
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub detail: Value,
}

impl LifecycleEvent {
    /// 构造事件。
    pub fn new(kind: LifecycleEventKind, detail: Value) -> Self {
        Self { kind, detail }
    }
}

/// 监听器签名。
pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// 订阅句柄，用于退订。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 进程内的全局事件总线。
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus {
    /// 创建没有监听器的总线。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器。
    pub fn subscribe(&self, listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// 退订；句柄不存在时返回 `false`。
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// 同步广播事件。
    pub fn emit(&self, event: LifecycleEvent) {
        // 先复制监听器快照再调用，允许监听器在回调中修改订阅。
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        tracing::trace!(event = event.kind.as_str(), listeners = snapshot.len(), "lifecycle event");
        for listener in snapshot {
            listener(&event);
        }
    }

    /// 当前监听器数量。
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// 是否没有监听器。
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn listeners_run_in_subscription_order_and_can_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event| seen.lock().push(format!("a:{}", event.kind)))
        };
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event| seen.lock().push(format!("b:{}", event.kind)));
        }

        bus.emit(LifecycleEvent::new(
            LifecycleEventKind::ViewLoaded,
            json!({ "view": "views/index.html" }),
        ));
        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first), "重复退订应返回 false");
        bus.emit(LifecycleEvent::new(LifecycleEventKind::DataReceived, Value::Null));

        assert_eq!(
            seen.lock().as_slice(),
            ["a:onViewLoaded", "b:onViewLoaded", "b:onDataReceived"]
        );
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        {
            let inner = Arc::clone(&bus);
            bus.subscribe(move |_| {
                inner.subscribe(|_| {});
            });
        }
        bus.emit(LifecycleEvent::new(LifecycleEventKind::FormSubmitted, Value::Null));
        assert_eq!(bus.len(), 2);
    }
}
