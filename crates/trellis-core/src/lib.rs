#![deny(unsafe_code)]

//! # trellis-core
//!
//! ## 定位与职责（Why）
//! - 为单页导航框架提供与浏览器无关的核心契约：路由状态、宿主接口、网络契约、持久化仓储与扩展签名；
//! - `trellis-router`、`trellis-pipeline` 与 `trellis-hosting` 只依赖这里的类型相互协作，
//!   浏览器端适配层实现 [`host`]、[`fetch`]、[`store`] 中的接口即可接入。
//!
//! ## 架构嵌入（Where）
//! - [`state`]：导航意图 [`RoutingState`]；
//! - [`store`]：注入式的 [`StateStore`] 服务；
//! - [`extension`]：管线步骤契约与导航世代；
//! - [`controller`]：应用控制器与工厂契约；
//! - [`error`]：`thiserror` 错误与稳定错误码；
//! - [`test_stubs`]：宿主契约的内存实现。

/// 导航框架配置。
pub mod config;

/// 应用控制器契约。
///
/// - **意图说明 (Why)**：以注册表与工厂替代运行时求值源码；
/// - **契约定位 (What)**：`on_init` 同步、`on_load`/`on_submit` 异步。
pub mod controller;

/// 错误类型与稳定错误码。
pub mod error;

/// 生命周期事件总线。
pub mod events;

/// 管线扩展契约与导航世代。
pub mod extension;

/// 外部 HTTP 层的消费契约。
pub mod fetch;

/// 文档、浏览历史与模板投影的宿主契约。
pub mod host;

/// 路由状态模型。
pub mod state;

/// 导航状态仓储。
pub mod store;

/// 宿主契约的内存实现。
pub mod test_stubs;

/// 时间源。
pub mod time;

pub use config::{InstancePolicy, NavigatorConfig};
pub use controller::{Controller, ControllerFactory};
pub use error::{ControllerError, FetchError, NavigationError, Result, StoreError, codes};
pub use events::{EventBus, LifecycleEvent, LifecycleEventKind};
pub use extension::{Extension, NavigationEpoch, RunContext, StepStatus};
pub use fetch::{Fetcher, HttpClient};
pub use host::{Document, ElementHandle, History, Splash};
pub use state::{FormSubmission, RoutingState, StateData};
pub use store::{StateStore, StorageBackend};
pub use time::{Clock, SystemClock};
