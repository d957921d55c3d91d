//! # StateStore：导航状态仓储
//!
//! ## 核心意图（Why）
//! - 浏览器刷新或 `popstate` 只带回地址 hash，hash 无法还原调用方附带的 `data` 与 `container`；
//!   仓储按视图键保存最近一次的 [`RoutingState`]，使恢复无需额外往返；
//! - 仓储是显式注入的服务对象（通常以 `Arc<StateStore>` 共享），而不是隐藏的模块级单例，测试可以各自构造实例。
//!
//! ## 行为契约（What）
//! - [`StateStore::open`] 在构造时一次性载入存储键下的全部条目；
//! - `add`/`remove`/`clear` 每次修改后同步写回整张表（最后写入者胜出，不做合并）；
//! - 条目永不自动过期；
//! - 持久化布局：单个存储键保存一个 JSON 对象，键为任意字符串（`view_<hash>`、`last_view`），值为任意可序列化载荷。
//!
//! ## 风险提示（Trade-offs）
//! - 整表写回在条目很多时代价线性增长；导航状态通常只有数十条，这一代价可以接受；
//! - 写回失败不会回滚内存中的修改，内存视图始终是最新的，下一次成功写回会补齐持久化内容。

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::state::RoutingState;

/// 保存最近一次视图的键。
pub const LAST_VIEW_KEY: &str = "last_view";

/// 默认存储键。
pub const DEFAULT_STORAGE_KEY: &str = "trellis.navigation";

/// 由规范化 hash 推导视图键。
pub fn view_key(hash: &str) -> String {
    format!("view_{hash}")
}

/// 持久化后端，语义与浏览器 `localStorage` 一致：按键存取整段字符串。
pub trait StorageBackend: Send + Sync + 'static {
    /// 读取键；不存在时返回 `Ok(None)`。
    fn load(&self, key: &str) -> io::Result<Option<String>>;

    /// 覆盖写入键。
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
}

/// 进程内后端，用于测试与无持久化需求的宿主。
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接读取原始内容，便于断言持久化布局。
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// 文件后端：每个存储键对应目录下的一个 JSON 文件。
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    /// 存储目录。
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // 先写临时文件再改名，避免崩溃时留下半截 JSON。
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(tmp, path)
    }
}

/// 导航状态仓储。
pub struct StateStore {
    backend: Box<dyn StorageBackend>,
    storage_key: String,
    entries: Mutex<Map<String, Value>>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("storage_key", &self.storage_key)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl StateStore {
    /// 打开仓储并载入全部条目。
    ///
    /// # 教案式注释
    /// - **前置条件**：`backend` 中 `storage_key` 对应的内容若存在，必须是 JSON 对象；
    /// - **后置条件**：返回的仓储内存视图与持久化内容一致；
    /// - **错误**：后端读取失败返回 [`StoreError::Backend`]，内容非法返回 [`StoreError::Serde`]。
    pub fn open(
        backend: impl StorageBackend,
        storage_key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let storage_key = storage_key.into();
        let raw = backend
            .load(&storage_key)
            .map_err(|source| StoreError::Backend {
                key: storage_key.clone(),
                source,
            })?;
        let entries = match raw {
            Some(text) if !text.trim().is_empty() => {
                serde_json::from_str::<Map<String, Value>>(&text).map_err(|source| {
                    StoreError::Serde {
                        key: storage_key.clone(),
                        source,
                    }
                })?
            }
            _ => Map::new(),
        };
        tracing::debug!(storage_key = %storage_key, entries = entries.len(), "state store opened");
        Ok(Self {
            backend: Box::new(backend),
            storage_key,
            entries: Mutex::new(entries),
        })
    }

    /// 打开一个纯内存仓储。
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryStorage::new()),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            entries: Mutex::new(Map::new()),
        }
    }

    /// 写入条目并持久化。
    pub fn add(&self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.into(), value);
        self.persist(&entries)
    }

    /// 读取条目。
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    /// 读取并反序列化条目；内容与目标类型不符时视为不存在。
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring malformed store entry");
                None
            }
        }
    }

    /// 序列化后写入条目。
    pub fn add_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), StoreError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serde {
            key: key.clone(),
            source,
        })?;
        self.add(key, value)
    }

    /// 保存路由状态。
    pub fn put_state(&self, key: impl Into<String>, state: &RoutingState) -> Result<(), StoreError> {
        self.add_as(key, state)
    }

    /// 读取路由状态。
    pub fn get_state(&self, key: &str) -> Option<RoutingState> {
        self.get_as(key)
    }

    /// 删除条目并持久化，返回被删除的值。
    pub fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries.lock();
        let removed = entries.remove(key);
        self.persist(&entries)?;
        Ok(removed)
    }

    /// 清空并持久化。
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries)
    }

    /// 是否包含键。
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// 条目数量。
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 存储键。
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let text = serde_json::to_string(entries).map_err(|source| StoreError::Serde {
            key: self.storage_key.clone(),
            source,
        })?;
        self.backend
            .save(&self.storage_key, &text)
            .map_err(|source| StoreError::Backend {
                key: self.storage_key.clone(),
                source,
            })
    }
}
