#![deny(unsafe_code)]

//! # trellis-router
//!
//! ## 定位与职责（Why）
//! - [`resolver`]：把地址解析为视图片段与控制器脚本的纯函数；
//! - [`trigger`]：导航触发元素与表单的标记契约；
//! - [`dispatcher`]：把点击、提交、`popstate`、`hashchange` 与首次加载分发到两条管线。
//!
//! ## 依赖关系（Where）
//! - 只依赖 `trellis-core` 的契约与 `trellis-pipeline` 的执行器，浏览器事件由宿主适配层转交。

pub mod dispatcher;
pub mod resolver;
pub mod trigger;

pub use dispatcher::{
    DispatchOutcome, IgnoreReason, NavigationDispatcher, NavigationKind, NavigationPipelines,
    NavigationReport,
};
pub use resolver::{ResolvedRoute, RoutingResolver};
pub use trigger::{FormTrigger, NavigationTrigger};
