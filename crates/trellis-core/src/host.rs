//! 宿主契约：文档、浏览历史与模板投影。
//!
//! # 教案式说明
//! - **意图（Why）**：导航状态机只依赖这些窄接口，浏览器实现（`web-sys`）与测试实现（[`crate::test_stubs`]）
//!   可以互换，状态机本身不触碰任何 DOM API；
//! - **契约（What）**：
//!   - [`Document`] 负责选择区域、替换内容以及为新插入的标记重新绑定导航拦截；
//!   - [`History`] 对应 `pushState`/`replaceState`/`location.hash` 三项能力；
//!   - [`Splash`] 是外部模板投影引擎的入口，框架只负责在投影后广播事件；
//! - **线程模型（How）**：接口要求 `Send + Sync`，浏览器实现在单线程上运行时同样满足约束。

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::events::{EventBus, LifecycleEvent, LifecycleEventKind};
use crate::state::RoutingState;

/// 文档中某个元素的不透明引用。
///
/// 浏览器实现通常以选择器或节点编号填充；框架只比较和打印它。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(Arc<str>);

impl ElementHandle {
    /// 以宿主给出的标识构造引用。
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// 读取标识。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementHandle").field(&self.as_str()).finish()
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文档操作契约。
pub trait Document: Send + Sync + 'static {
    /// 按选择器查找第一个匹配元素，未命中返回 `None`。
    fn query(&self, selector: &str) -> Option<ElementHandle>;

    /// 用给定标记替换元素内容。
    fn replace_content(&self, element: &ElementHandle, markup: &str);

    /// 为匹配 `selector` 的元素（重新）绑定点击/提交拦截，返回本次新绑定的元素数量。
    ///
    /// 默认实现不做任何事，适用于事件委托式的宿主。
    fn bind_triggers(&self, selector: &str) -> usize {
        let _ = selector;
        0
    }
}

/// 浏览历史契约。
pub trait History: Send + Sync + 'static {
    /// 追加历史记录并把地址栏改为 `url`。
    fn push_state(&self, state: &RoutingState, url: &str);

    /// 替换当前历史记录。
    fn replace_state(&self, state: &RoutingState, url: &str);

    /// 当前历史记录上携带的状态。
    fn state(&self) -> Option<RoutingState>;

    /// 当前地址的 hash 部分（含 `#`），没有时返回空串。
    fn location_hash(&self) -> String;
}

/// 外部模板投影引擎。
pub trait Splash: Send + Sync + 'static {
    /// 将数据投影到目标元素。
    fn splash(&self, target: &ElementHandle, data: &Value);
}

/// 调用投影引擎并广播 `onDataSplashed`。
pub fn splash_and_notify(
    splash: &dyn Splash,
    events: &EventBus,
    target: &ElementHandle,
    data: &Value,
) {
    splash.splash(target, data);
    events.emit(LifecycleEvent::new(
        LifecycleEventKind::DataSplashed,
        serde_json::json!({ "target": target.as_str(), "data": data }),
    ));
}
