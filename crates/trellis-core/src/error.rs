//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为导航链路中可能出现的网络、持久化、配置与控制器错误提供集中定义；
//! - 配合 [`codes`] 中的稳定错误码，使日志与管线报告可按错误码聚合，而不必解析自然语言描述。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架处理；
//! - 解析类问题（畸形 URL）不属于错误，一律由规范化规则吸收；
//! - DOM 目标缺失同样不是错误，由扩展以 `Skipped` 状态报告。

use thiserror::Error;

/// 框架内置的错误码常量集合，遵循 `<领域>.<语义>` 命名约定。
pub mod codes {
    /// 视图或数据请求返回 401。
    pub const FETCH_UNAUTHORIZED: &str = "navigation.fetch.unauthorized";
    /// 请求返回了非 200 状态码。
    pub const FETCH_STATUS: &str = "navigation.fetch.status";
    /// 宿主网络层失败（连接中断、DNS 等）。
    pub const FETCH_TRANSPORT: &str = "navigation.fetch.transport";
    /// 响应体无法按声明的内容类型解码。
    pub const FETCH_DECODE: &str = "navigation.fetch.decode";
    /// 持久化存储读写失败。
    pub const STORE_BACKEND: &str = "navigation.store.backend";
    /// 持久化内容无法序列化或反序列化。
    pub const STORE_SERDE: &str = "navigation.store.serde";
    /// 配置非法。
    pub const CONFIG_INVALID: &str = "navigation.config.invalid";
    /// 控制器脚本路径未在注册表中登记。
    pub const CONTROLLER_NOT_REGISTERED: &str = "navigation.controller.not_registered";
    /// 控制器生命周期钩子返回失败。
    pub const CONTROLLER_HOOK: &str = "navigation.controller.hook";
    /// 表单提交时没有活跃控制器。
    pub const NO_ACTIVE_CONTROLLER: &str = "navigation.controller.none_active";
    /// 用户扩展返回的自定义失败。
    pub const EXTENSION_FAILED: &str = "navigation.extension.failed";
}

/// 网络层错误，对应 fetch 契约中的三类结果。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// 服务端返回 401，携带触发该状态的 URL，便于上层跳转登录。
    #[error("request to `{url}` is unauthorized")]
    Unauthorized { url: String },

    /// 其余非 200 状态，不做细分。
    #[error("request to `{url}` failed with status {status}")]
    Status { url: String, status: u16 },

    /// 宿主网络层直接失败。
    #[error("request to `{url}` failed: {detail}")]
    Transport { url: String, detail: String },

    /// 响应体解码失败（例如声明为 JSON 但内容非法）。
    #[error("response from `{url}` could not be decoded: {detail}")]
    Decode { url: String, detail: String },
}

impl FetchError {
    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Unauthorized { .. } => codes::FETCH_UNAUTHORIZED,
            FetchError::Status { .. } => codes::FETCH_STATUS,
            FetchError::Transport { .. } => codes::FETCH_TRANSPORT,
            FetchError::Decode { .. } => codes::FETCH_DECODE,
        }
    }

    /// 是否为未授权错误。
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }
}

/// 状态存储错误。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 存储后端读写失败。
    #[error("storage backend failure for key `{key}`: {source}")]
    Backend {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// 持久化内容不是合法的 JSON 对象。
    #[error("persisted navigation state under `{key}` is malformed: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Backend { .. } => codes::STORE_BACKEND,
            StoreError::Serde { .. } => codes::STORE_SERDE,
        }
    }
}

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件无法读取。
    #[error("failed to read configuration `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 语法或字段类型错误。
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段取值非法。
    #[error("invalid configuration field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 控制器生命周期钩子返回的错误。
///
/// 控制器由应用编写，错误内容以自然语言描述即可；框架只负责记录与报告。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ControllerError {
    message: String,
}

impl ControllerError {
    /// 以描述构造控制器错误。
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 导航链路的顶层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：扩展步骤、分发器与宿主装配层共享同一错误类型，管线报告才能统一记录；
/// - **契约 (What)**：
///   - 各变体可通过 [`NavigationError::code`] 映射到 [`codes`] 中的稳定错误码；
///   - 只有表单提交时控制器装载扩展的失败（如 [`NavigationError::NoActiveController`]）会越过管线返回调用方，
///     其余错误在管线内被吸收并写入报告；
/// - **执行 (How)**：子错误通过 `#[from]` 自动转换，扩展实现可以直接使用 `?`。
#[derive(Debug, Error)]
pub enum NavigationError {
    /// 网络请求失败。
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// 状态存储失败。
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 配置非法。
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 路由解析出的控制器脚本未注册。
    #[error("no controller is registered for script `{script}`")]
    ControllerNotRegistered { script: String },

    /// 控制器生命周期钩子失败。
    #[error("controller `{controller}` failed during `{hook}`: {source}")]
    ControllerHook {
        controller: String,
        hook: &'static str,
        #[source]
        source: ControllerError,
    },

    /// 表单提交时没有当前控制器。
    #[error("form submission has no active controller to handle it")]
    NoActiveController,

    /// 用户扩展返回的失败。
    #[error("extension `{extension}` failed: {detail}")]
    Extension { extension: String, detail: String },
}

impl NavigationError {
    /// 构造用户扩展失败。
    pub fn extension(extension: impl Into<String>, detail: impl Into<String>) -> Self {
        NavigationError::Extension {
            extension: extension.into(),
            detail: detail.into(),
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            NavigationError::Fetch(err) => err.code(),
            NavigationError::Store(err) => err.code(),
            NavigationError::Config(_) => codes::CONFIG_INVALID,
            NavigationError::ControllerNotRegistered { .. } => codes::CONTROLLER_NOT_REGISTERED,
            NavigationError::ControllerHook { .. } => codes::CONTROLLER_HOOK,
            NavigationError::NoActiveController => codes::NO_ACTIVE_CONTROLLER,
            NavigationError::Extension { .. } => codes::EXTENSION_FAILED,
        }
    }
}

/// 框架统一的结果别名。
pub type Result<T, E = NavigationError> = core::result::Result<T, E>;
