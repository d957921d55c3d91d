//! 导航框架配置。
//!
//! # 教案式说明
//! - **意图（Why）**：视图根目录、控制器根目录、后缀、默认区域与回声窗口等常量分散在各组件中时难以统一调整，
//!   这里集中为一份可从 TOML 载入的配置；
//! - **契约（What）**：
//!   - 所有字段都有默认值，空配置文件即可运行；
//!   - [`NavigatorConfig::validate`] 在装配阶段执行，发现非法取值时返回 [`ConfigError::Invalid`]；
//! - **执行（How）**：`serde(default)` 负责缺省字段回填，`toml` 负责解析。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::DEFAULT_STORAGE_KEY;

/// 地址中表示框架路由的前缀。
pub const HASHBANG: &str = "#!";

/// 默认的导航触发元素选择器。
pub const DEFAULT_TRIGGER_SELECTOR: &str = "a[href], [data-link]";

/// 路由解析配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 视图根目录段。
    pub view_root: String,
    /// 控制器根目录段。
    pub controller_root: String,
    /// 视图片段后缀（含点）。
    pub view_suffix: String,
    /// 额外认可的视图后缀。
    pub view_extensions: Vec<String>,
    /// 控制器脚本后缀（含点）。
    pub script_suffix: String,
    /// 站点根路径，拼接在控制器脚本之前；缺省为空串。
    pub domain_root: String,
    /// 若设置，则所有导航都使用该控制器脚本。
    pub controller_override: Option<String>,
    /// 目录形式路径的默认片段名。
    pub index_name: String,
    /// 是否解析控制器。
    pub load_controllers: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            view_root: "views".to_owned(),
            controller_root: "controllers".to_owned(),
            view_suffix: ".html".to_owned(),
            view_extensions: vec![".htm".to_owned()],
            script_suffix: ".js".to_owned(),
            domain_root: String::new(),
            controller_override: None,
            index_name: "index".to_owned(),
            load_controllers: true,
        }
    }
}

impl RoutingConfig {
    /// 判断文件名是否已带有可识别的视图后缀。
    pub fn has_view_extension(&self, segment: &str) -> bool {
        let lower = segment.to_ascii_lowercase();
        std::iter::once(&self.view_suffix)
            .chain(self.view_extensions.iter())
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }
}

/// 视图装载配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// 状态未指定区域时使用的默认区域选择器；为空时退回 `body`。
    pub default_container: String,
    /// 文档主体选择器。
    pub body_selector: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_container: "#app".to_owned(),
            body_selector: "body".to_owned(),
        }
    }
}

/// 仓储配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 存储键。
    pub storage_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
        }
    }
}

/// 分发器配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 自身 `pushState` 之后多长时间内的 `hashchange` 视为回声（毫秒）。
    pub echo_window_ms: u64,
    /// 被拦截的触发元素选择器。
    pub trigger_selector: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            echo_window_ms: 100,
            trigger_selector: DEFAULT_TRIGGER_SELECTOR.to_owned(),
        }
    }
}

impl DispatchConfig {
    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }
}

/// 控制器实例策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePolicy {
    /// 每次脚本模式装载都从已定义的工厂新建实例并替换缓存。
    #[default]
    Fresh,
    /// 已缓存的实例被复用，只重新执行 `on_load`。
    ReuseCached,
}

/// 控制器装载配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub instance_policy: InstancePolicy,
}

/// 顶层配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub routing: RoutingConfig,
    pub view: ViewConfig,
    pub store: StoreConfig,
    pub dispatch: DispatchConfig,
    pub controllers: ControllerConfig,
}

impl NavigatorConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件载入并校验。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let routing = &self.routing;
        require_segment("routing.view_root", &routing.view_root)?;
        require_segment("routing.controller_root", &routing.controller_root)?;
        require_segment("routing.index_name", &routing.index_name)?;
        require_suffix("routing.view_suffix", &routing.view_suffix)?;
        require_suffix("routing.script_suffix", &routing.script_suffix)?;
        for extension in &routing.view_extensions {
            require_suffix("routing.view_extensions", extension)?;
        }
        if self.store.storage_key.trim().is_empty() {
            return Err(invalid("store.storage_key", "must not be empty"));
        }
        if self.dispatch.trigger_selector.trim().is_empty() {
            return Err(invalid("dispatch.trigger_selector", "must not be empty"));
        }
        Ok(())
    }
}

fn require_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.contains('/') || value.contains('#') {
        return Err(invalid(field, format!("`{value}` must be a single path segment")));
    }
    Ok(())
}

fn require_suffix(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.len() < 2 || !value.starts_with('.') || value[1..].contains('.') {
        return Err(invalid(field, format!("`{value}` must look like `.ext`")));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
