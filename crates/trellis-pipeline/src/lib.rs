#![deny(unsafe_code)]

//! # trellis-pipeline
//!
//! ## 定位与职责（Why）
//! - 提供两条导航管线共用的执行器 [`ExtensionPipeline`] 以及框架内置的扩展；
//! - 控制器管线固定为 [`ViewLoader`] → [`ControllerLoader`]，路由管线默认只含 [`TriggerBinder`]，
//!   应用可以在两条管线上追加自定义扩展。
//!
//! ## 契约（What）
//! - 扩展严格顺序执行，失败写入 [`PipelineReport`] 而不会短路；
//! - 所有修改文档或浏览历史的扩展都先检查 [`trellis_core::RunContext::is_current`]。

pub mod controller_loader;
pub mod pipeline;
pub mod registry;
pub mod trigger_binder;
pub mod view_loader;

pub use controller_loader::{CONTROLLER_LOADER, ControllerLoader, unique_identifier};
pub use pipeline::{ExtensionPipeline, PipelineReport, ReportObserver, StepReport};
pub use registry::{ControllerRegistration, ControllerRegistry, normalize_script};
pub use trigger_binder::{TRIGGER_BINDER, TriggerBinder};
pub use view_loader::{VIEW_LOADER, ViewLoader};
