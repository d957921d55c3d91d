//! 导航意图的可序列化描述。
//!
//! # 教案式说明
//! - **意图（Why）**：一次导航的全部输入（视图、目标区域、控制器、载荷、标志位）集中在 [`RoutingState`] 中，
//!   管线中的每个扩展都只读写这一个对象，避免扩展之间约定隐式字段；
//! - **契约（What）**：
//!   - `view` 一旦解析即非空，末段总能落到唯一的片段文件名（目录形式默认为 `index`）；
//!   - `container` 为空表示根区域；
//!   - 每个被推入浏览历史的状态都必须同时写入 `StateStore`，键由 `hash` 推导；
//!   - `timestamp` 只用于极短窗口（约 100ms）内识别自身触发的 `hashchange` 回声；
//! - **序列化（How）**：字段以 camelCase 输出，与浏览器端持久化布局一致；`form` 为瞬态引用，不参与序列化。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::ElementHandle;

/// 导航携带的键值载荷。
pub type StateData = Map<String, Value>;

/// 一次导航的路由状态。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingState {
    /// 逻辑视图标识，即 HTML 片段的相对路径。
    pub view: String,
    /// 目标区域选择器，空字符串代表根区域。
    pub container: String,
    /// 控制器所在目录（不含文件名）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_path: Option<String>,
    /// 控制器脚本的完整路径。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_script: Option<String>,
    /// 由脚本路径推导出的控制器名称。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_name: Option<String>,
    /// 导航载荷：查询参数与调用方数据合并后的结果。
    pub data: StateData,
    /// 是否由客户端接管导航。
    pub spa: bool,
    /// 创建时刻（毫秒）。
    pub timestamp: u64,
    /// 规范化后的 `#!` 地址。
    pub hash: String,
    /// 是否为普通页内锚点。
    pub is_plain_hash: bool,
    /// 表单提交模式下的表单引用。
    #[serde(skip)]
    pub form: Option<FormSubmission>,
}

impl RoutingState {
    /// 以视图与地址构造最小状态，其余字段取默认值。
    pub fn new(view: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            hash: hash.into(),
            spa: true,
            ..Self::default()
        }
    }

    /// 指定目标区域。
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// 写入单个载荷字段，已存在的键被覆盖。
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// 是否指向根区域。
    pub fn targets_root(&self) -> bool {
        self.container.is_empty()
    }

    /// 是否携带控制器脚本。
    pub fn has_controller(&self) -> bool {
        self.controller_script
            .as_deref()
            .is_some_and(|script| !script.is_empty())
    }

    /// 是否处于表单提交模式。
    pub fn is_form_submission(&self) -> bool {
        self.form.is_some()
    }
}

/// 被拦截的表单提交。
#[derive(Clone, Debug, PartialEq)]
pub struct FormSubmission {
    /// 表单元素。
    pub form: ElementHandle,
    /// 表单 `action` 属性。
    pub action: String,
    /// 序列化后的字段；同名字段聚合为数组。
    pub data: StateData,
}

impl FormSubmission {
    /// 构造表单提交。
    pub fn new(form: ElementHandle, action: impl Into<String>, data: StateData) -> Self {
        Self {
            form,
            action: action.into(),
            data,
        }
    }
}
