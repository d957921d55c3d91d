//! 外部 HTTP 层的消费契约。
//!
//! # 教案式说明
//! - **意图（Why）**：视图片段与应用数据都经由同一个请求入口获取，入口负责统一的状态码语义与
//!   `onDataRequested`/`onDataReceived` 事件，扩展与控制器不必各自处理；
//! - **契约（What）**：
//!   - [`Fetcher`] 由宿主实现，只负责把请求送出并返回原始响应，不解释状态码；
//!   - [`FetchResponse::decode`] 按 `content-type` 选择 JSON / 文本 / 二进制解码；
//!   - 401 映射为 [`FetchError::Unauthorized`]，携带请求 URL；其余非 200 状态一律为 [`FetchError::Status`]；
//! - **执行（How）**：[`HttpClient`] 在请求前后各广播一次事件，事件 detail 中包含 URL 与方法。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::FetchError;
use crate::events::{EventBus, LifecycleEvent, LifecycleEventKind};

/// 请求方法。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Post,
}

impl FetchMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// 一次请求。
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl FetchRequest {
    /// 构造 GET 请求。
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: FetchMethod::Get,
            url: url.into(),
            headers: vec![("Accept".to_owned(), "*/*".to_owned())],
            body: None,
        }
    }

    /// 构造携带 JSON 体的 POST 请求。
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: FetchMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body: Some(body),
        }
    }

    /// 追加请求头。
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// 宿主返回的原始响应。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// 解码后的响应体。
#[derive(Clone, Debug, PartialEq)]
pub enum FetchBody {
    Json(Value),
    Text(String),
    Blob(Vec<u8>),
}

impl FetchResponse {
    /// 构造 200 文本响应，常用于测试与静态宿主。
    pub fn text(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_owned()),
            body: body.into().into_bytes(),
        }
    }

    /// 构造仅含状态码的响应。
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// 校验状态码。
    pub fn check_status(&self) -> Result<(), FetchError> {
        match self.status {
            200 => Ok(()),
            401 => Err(FetchError::Unauthorized {
                url: self.url.clone(),
            }),
            status => Err(FetchError::Status {
                url: self.url.clone(),
                status,
            }),
        }
    }

    /// 校验状态码后按内容类型解码。
    pub fn decode(self) -> Result<FetchBody, FetchError> {
        self.check_status()?;
        let mime = self
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if mime == "application/json" || mime.ends_with("+json") {
            return serde_json::from_slice(&self.body)
                .map(FetchBody::Json)
                .map_err(|err| FetchError::Decode {
                    url: self.url,
                    detail: err.to_string(),
                });
        }
        if mime.is_empty() || mime.starts_with("text/") || mime.ends_with("xml") {
            return String::from_utf8(self.body)
                .map(FetchBody::Text)
                .map_err(|err| FetchError::Decode {
                    url: self.url,
                    detail: err.to_string(),
                });
        }
        Ok(FetchBody::Blob(self.body))
    }

    /// 校验状态码后把响应体当作 UTF-8 文本读取，忽略内容类型。
    pub fn into_text(self) -> Result<String, FetchError> {
        self.check_status()?;
        String::from_utf8(self.body).map_err(|err| FetchError::Decode {
            url: self.url,
            detail: err.to_string(),
        })
    }
}

/// 宿主 HTTP 实现。
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// 发送请求；只有网络层失败才返回错误，状态码由调用方解释。
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// 带事件广播的请求入口。
#[derive(Clone)]
pub struct HttpClient {
    fetcher: Arc<dyn Fetcher>,
    events: Arc<EventBus>,
}

impl HttpClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, events: Arc<EventBus>) -> Self {
        Self { fetcher, events }
    }

    /// 发送请求并返回已通过状态码校验的响应。
    pub async fn send(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.clone();
        let method = request.method;
        self.events.emit(LifecycleEvent::new(
            LifecycleEventKind::DataRequested,
            json!({ "url": url, "method": method.as_str() }),
        ));

        let response = self.fetcher.fetch(request).await?;
        self.events.emit(LifecycleEvent::new(
            LifecycleEventKind::DataReceived,
            json!({ "url": url, "method": method.as_str(), "status": response.status }),
        ));

        if let Err(err) = response.check_status() {
            tracing::debug!(url = %url, status = response.status, "request rejected");
            return Err(err);
        }
        Ok(response)
    }

    /// GET 并读取文本。
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.send(FetchRequest::get(url)).await?.into_text()
    }

    /// 发送请求并按内容类型解码。
    pub async fn request(&self, request: FetchRequest) -> Result<FetchBody, FetchError> {
        self.send(request).await?.decode()
    }

    /// 访问事件总线。
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
