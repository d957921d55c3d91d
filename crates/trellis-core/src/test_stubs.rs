//! 宿主契约的内存实现，供单元测试、集成测试与示例复用。
//!
//! # 设计定位（Why）
//! - 导航状态机依赖文档、浏览历史、网络与时钟四类宿主能力；各测试文件若各自手写桩对象，
//!   契约一旦调整就需要到处修改；
//! - 这里的实现都会记录收到的调用，测试可以直接断言副作用顺序。
//!
//! # 契约说明（What）
//! - [`InMemoryDocument`]：以选择器为键的区域表，`body` 总是存在；
//! - [`RecordingHistory`]：带游标的历史栈，支持 `back`/`forward` 模拟浏览器前进后退；
//! - [`StaticFetcher`]：URL 到响应的静态表，未登记的 URL 返回 404；
//! - [`ManualClock`]：手动推进的时钟；
//! - [`RecordingListener`]：记录事件总线上的全部事件。
//!
//! # 风险提示（Trade-offs）
//! - 选择器只做字面量匹配，不实现 CSS 语义；
//! - 这些类型公开为稳定测试 API，生产代码不应依赖。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::FetchError;
use crate::events::{EventBus, LifecycleEvent, LifecycleEventKind};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::host::{Document, ElementHandle, History};
use crate::state::RoutingState;
use crate::time::Clock;

/// 内存文档。
#[derive(Debug)]
pub struct InMemoryDocument {
    regions: Mutex<HashMap<String, String>>,
    replacements: Mutex<Vec<(String, String)>>,
    bind_calls: AtomicUsize,
}

impl Default for InMemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocument {
    /// 只包含 `body` 的文档。
    pub fn new() -> Self {
        let mut regions = HashMap::new();
        regions.insert("body".to_owned(), String::new());
        Self {
            regions: Mutex::new(regions),
            replacements: Mutex::new(Vec::new()),
            bind_calls: AtomicUsize::new(0),
        }
    }

    /// 追加一个可被选中的区域。
    pub fn with_region(self, selector: impl Into<String>) -> Self {
        self.regions.lock().insert(selector.into(), String::new());
        self
    }

    /// 读取区域当前内容。
    pub fn content(&self, selector: &str) -> Option<String> {
        self.regions.lock().get(selector).cloned()
    }

    /// 按时间顺序返回全部 `(选择器, 标记)` 替换记录。
    pub fn replacements(&self) -> Vec<(String, String)> {
        self.replacements.lock().clone()
    }

    /// `bind_triggers` 被调用的次数。
    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }
}

impl Document for InMemoryDocument {
    fn query(&self, selector: &str) -> Option<ElementHandle> {
        self.regions
            .lock()
            .contains_key(selector)
            .then(|| ElementHandle::new(selector))
    }

    fn replace_content(&self, element: &ElementHandle, markup: &str) {
        self.regions
            .lock()
            .insert(element.as_str().to_owned(), markup.to_owned());
        self.replacements
            .lock()
            .push((element.as_str().to_owned(), markup.to_owned()));
    }

    fn bind_triggers(&self, _selector: &str) -> usize {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        // 以锚点数量近似新绑定的触发元素。
        self.regions
            .lock()
            .values()
            .map(|markup| markup.matches("<a ").count() + markup.matches("data-link").count())
            .sum()
    }
}

/// 历史操作记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryOp {
    Push(String),
    Replace(String),
}

/// 历史栈中的一条记录。
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub state: Option<RoutingState>,
}

#[derive(Debug, Default)]
struct HistoryInner {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
    ops: Vec<HistoryOp>,
}

/// 记录型浏览历史。
#[derive(Debug, Default)]
pub struct RecordingHistory {
    inner: Mutex<HistoryInner>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定地址作为初始页面打开，不携带状态。
    pub fn at(url: impl Into<String>) -> Self {
        let history = Self::new();
        history.navigate_externally(url, None);
        history
    }

    /// 模拟用户在地址栏输入或外部脚本修改地址：追加一条记录但不计入操作日志。
    pub fn navigate_externally(&self, url: impl Into<String>, state: Option<RoutingState>) {
        let mut inner = self.inner.lock();
        let keep = inner.cursor.map_or(0, |cursor| cursor + 1);
        inner.entries.truncate(keep);
        inner.entries.push(HistoryEntry {
            url: url.into(),
            state,
        });
        inner.cursor = Some(inner.entries.len() - 1);
    }

    /// 后退一步；已在最早记录时返回 `false`。
    pub fn back(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.cursor {
            Some(cursor) if cursor > 0 => {
                inner.cursor = Some(cursor - 1);
                true
            }
            _ => false,
        }
    }

    /// 前进一步；已在最新记录时返回 `false`。
    pub fn forward(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.cursor {
            Some(cursor) if cursor + 1 < inner.entries.len() => {
                inner.cursor = Some(cursor + 1);
                true
            }
            _ => false,
        }
    }

    /// 框架发出的 `push_state`/`replace_state` 调用。
    pub fn ops(&self) -> Vec<HistoryOp> {
        self.inner.lock().ops.clone()
    }

    /// 历史栈全部记录。
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().entries.clone()
    }
}

impl History for RecordingHistory {
    fn push_state(&self, state: &RoutingState, url: &str) {
        self.navigate_externally(url, Some(state.clone()));
        self.inner.lock().ops.push(HistoryOp::Push(url.to_owned()));
    }

    fn replace_state(&self, state: &RoutingState, url: &str) {
        let mut inner = self.inner.lock();
        let entry = HistoryEntry {
            url: url.to_owned(),
            state: Some(state.clone()),
        };
        match inner.cursor {
            Some(cursor) => inner.entries[cursor] = entry,
            None => {
                inner.entries.push(entry);
                inner.cursor = Some(0);
            }
        }
        inner.ops.push(HistoryOp::Replace(url.to_owned()));
    }

    fn state(&self) -> Option<RoutingState> {
        let inner = self.inner.lock();
        inner
            .cursor
            .and_then(|cursor| inner.entries.get(cursor))
            .and_then(|entry| entry.state.clone())
    }

    fn location_hash(&self) -> String {
        let inner = self.inner.lock();
        inner
            .cursor
            .and_then(|cursor| inner.entries.get(cursor))
            .and_then(|entry| entry.url.find('#').map(|at| entry.url[at..].to_owned()))
            .unwrap_or_default()
    }
}

/// 静态响应表。
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, FetchResponse>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记 200 文本响应。
    pub fn with_text(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let response = FetchResponse::text(url.clone(), body);
        self.responses.lock().insert(url, response);
        self
    }

    /// 登记任意响应。
    pub fn with_response(self, response: FetchResponse) -> Self {
        self.responses.lock().insert(response.url.clone(), response);
        self
    }

    /// 令指定 URL 在网络层失败。
    pub fn with_transport_failure(self, url: impl Into<String>) -> Self {
        self.failing.lock().insert(url.into());
        self
    }

    /// 已收到的请求 URL，按时间顺序。
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    /// 已收到的完整请求。
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        if self.failing.lock().contains(&url) {
            return Err(FetchError::Transport {
                url,
                detail: "connection reset".to_owned(),
            });
        }
        Ok(self
            .responses
            .lock()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| FetchResponse::status(url, 404)))
    }
}

/// 手动推进的时钟。
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// 记录事件总线上出现的全部事件。
#[derive(Clone, Debug, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingListener {
    /// 订阅总线并返回记录器。
    pub fn attach(bus: &EventBus) -> Self {
        let listener = Self::default();
        let sink = Arc::clone(&listener.events);
        bus.subscribe(move |event| sink.lock().push(event.clone()));
        listener
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    /// 仅返回事件种类序列。
    pub fn kinds(&self) -> Vec<LifecycleEventKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_cursor_tracks_back_and_forward() {
        let history = RecordingHistory::at("https://app.example/");
        let first = RoutingState::new("views/index.html", "#!index");
        let second = RoutingState::new("views/about.html", "#!about");
        history.push_state(&first, "#!index");
        history.push_state(&second, "#!about");

        assert_eq!(history.location_hash(), "#!about");
        assert!(history.back());
        assert_eq!(history.location_hash(), "#!index");
        assert_eq!(history.state(), Some(first));
        assert!(history.forward());
        assert!(!history.forward());
        assert_eq!(
            history.ops(),
            vec![
                HistoryOp::Push("#!index".to_owned()),
                HistoryOp::Push("#!about".to_owned())
            ]
        );
    }

    #[test]
    fn unknown_url_yields_not_found() {
        let fetcher = StaticFetcher::new().with_text("views/index.html", "<h1>home</h1>");
        let response = futures::executor::block_on(fetcher.fetch(FetchRequest::get("views/x.html")))
            .expect("桩网络层不应失败");
        assert_eq!(response.status, 404);
        assert_eq!(fetcher.requested_urls(), vec!["views/x.html".to_owned()]);
    }
}
