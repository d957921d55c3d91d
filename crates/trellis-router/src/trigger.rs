//! 导航触发元素与表单的标记契约。
//!
//! # 教案式说明
//! - **意图（Why）**：浏览器适配层只需把被点击元素的属性、被提交表单的字段原样交给分发器，
//!   属性到载荷的转换规则集中在这里；
//! - **契约（What）**：
//!   - 地址取非空的 `data-link`，否则取 `href`；
//!   - `data-container` 指定目标区域；`data-spa="false"` 放弃拦截；
//!   - 其余 `data-*` 属性按浏览器 `dataset` 规则转为驼峰键写入载荷；
//!   - `data-data` 为合法 JSON 对象时，整体取代单独的 `data-*` 属性；
//!   - 表单字段按出现顺序序列化，同名字段聚合为数组。

use std::collections::BTreeMap;

use serde_json::Value;
use trellis_core::host::ElementHandle;
use trellis_core::state::{FormSubmission, StateData};

const RESERVED: [&str; 4] = ["data-link", "data-container", "data-spa", "data-data"];

/// 被点击的导航触发元素。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationTrigger {
    element: ElementHandle,
    attributes: BTreeMap<String, String>,
}

impl NavigationTrigger {
    pub fn new(element: ElementHandle) -> Self {
        Self {
            element,
            attributes: BTreeMap::new(),
        }
    }

    /// 以 `href` 构造锚点触发元素。
    pub fn link(href: impl Into<String>) -> Self {
        Self::new(ElementHandle::new("a")).with_attribute("href", href)
    }

    /// 追加属性；属性名不区分大小写。
    pub fn with_attribute(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn element(&self) -> &ElementHandle {
        &self.element
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// 导航地址。
    pub fn target(&self) -> Option<&str> {
        self.attribute("data-link")
            .filter(|link| !link.trim().is_empty())
            .or_else(|| self.attribute("href"))
    }

    /// 目标区域，缺省为根区域。
    pub fn container(&self) -> &str {
        self.attribute("data-container").unwrap_or_default()
    }

    /// 是否由客户端接管。
    pub fn spa(&self) -> bool {
        !self
            .attribute("data-spa")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("false"))
    }

    /// 元素声明的载荷。
    pub fn data(&self) -> StateData {
        if let Some(raw) = self.attribute("data-data") {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => return map,
                Ok(_) | Err(_) => {
                    tracing::warn!(element = %self.element, "ignoring data-data that is not a JSON object");
                }
            }
        }
        self.attributes
            .iter()
            .filter(|(name, _)| name.starts_with("data-") && !RESERVED.contains(&name.as_str()))
            .map(|(name, value)| (dataset_key(&name["data-".len()..]), Value::String(value.clone())))
            .collect()
    }
}

/// `user-id` → `userId`，与浏览器 `dataset` 一致。
fn dataset_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            key.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            key.push(c);
        }
    }
    key
}

/// 被拦截的表单提交。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormTrigger {
    form: ElementHandle,
    action: String,
    fields: Vec<(String, String)>,
    spa: bool,
}

impl FormTrigger {
    pub fn new(form: ElementHandle, action: impl Into<String>) -> Self {
        Self {
            form,
            action: action.into(),
            fields: Vec::new(),
            spa: true,
        }
    }

    /// 追加字段，顺序即表单中的出现顺序。
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// 对应 `data-spa="false"`。
    pub fn with_spa(mut self, spa: bool) -> Self {
        self.spa = spa;
        self
    }

    pub fn spa(&self) -> bool {
        self.spa
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// 序列化字段；同名字段聚合为数组。
    pub fn serialize(&self) -> StateData {
        let mut data = StateData::new();
        for (name, value) in &self.fields {
            let value = Value::String(value.clone());
            match data.get_mut(name) {
                None => {
                    data.insert(name.clone(), value);
                }
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        data
    }

    /// 转换为控制器可消费的表单提交。
    pub fn into_submission(self) -> FormSubmission {
        let data = self.serialize();
        FormSubmission::new(self.form, self.action, data)
    }
}
