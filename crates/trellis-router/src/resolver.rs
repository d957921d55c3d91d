//! 地址到视图/控制器的纯函数解析。
//!
//! # 教案式说明
//! - **意图（Why）**：同一个逻辑地址无论来自点击、`popstate` 还是首次加载，都必须解析为同一组
//!   视图片段与控制器脚本；解析器不持有任何可变状态，相同输入永远得到相同输出；
//! - **算法（How）**：
//!   1. 剥离查询串，参数按字符串平铺进 `data`（同名取最后一个，不做数组聚合）；
//!   2. 含 `#` 但不是 `#!` 时视为页内锚点：`is_plain_hash = true`、`view` 为空，不再继续解析；
//!   3. 取 `#!` 之后的部分（没有时取去掉协议、主机与站点根后的地址）作为工作路径，按 `/` 切分；
//!   4. 首段不是视图根目录时在前面补上；
//!   5. 末段为空（目录形式）时替换为默认片段名；
//!   6. 末段没有可识别的视图后缀时补上后缀；
//!   7. 拼接为 `view`；
//!   8. 控制器脚本：把视图根替换为控制器根、把视图后缀换成脚本后缀，再加上站点根；配置了覆盖脚本时无条件使用覆盖值；
//!   9. 控制器名：脚本文件名去掉脚本后缀；
//! - **规范化（What）**：畸形输入一律由规则吸收而不是报错；`hash` 为规范化的 `#!<路径>`，空路径记为 `#!index`。

use trellis_core::config::{HASHBANG, RoutingConfig};
use trellis_core::state::{RoutingState, StateData};

/// 解析结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// 视图片段路径；页内锚点时为空。
    pub view: String,
    /// 控制器所在目录。
    pub controller_path: Option<String>,
    /// 控制器脚本完整路径。
    pub controller_script: Option<String>,
    /// 控制器名。
    pub controller_name: Option<String>,
    /// 规范化地址；页内锚点时为原始锚点。
    pub hash: String,
    /// 是否为页内锚点。
    pub is_plain_hash: bool,
    /// 查询参数。
    pub data: StateData,
}

impl ResolvedRoute {
    /// 转换为路由状态，`container` 为空表示根区域。
    pub fn into_state(self, container: impl Into<String>) -> RoutingState {
        RoutingState {
            view: self.view,
            container: container.into(),
            controller_path: self.controller_path,
            controller_script: self.controller_script,
            controller_name: self.controller_name,
            data: self.data,
            spa: true,
            timestamp: 0,
            hash: self.hash,
            is_plain_hash: self.is_plain_hash,
            form: None,
        }
    }
}

/// 路由解析器。
#[derive(Clone, Debug, Default)]
pub struct RoutingResolver {
    config: RoutingConfig,
}

impl RoutingResolver {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// 解析地址。
    pub fn resolve(&self, url: &str) -> ResolvedRoute {
        let (remainder, query) = split_query(url.trim());
        let data = parse_query(query);

        if let Some(at) = remainder.find('#') {
            let fragment = &remainder[at..];
            if !fragment.starts_with(HASHBANG) {
                return ResolvedRoute {
                    view: String::new(),
                    controller_path: None,
                    controller_script: None,
                    controller_name: None,
                    hash: fragment.to_owned(),
                    is_plain_hash: true,
                    data,
                };
            }
        }

        let path = self.working_path(&remainder);
        let hash = if path.is_empty() {
            format!("{HASHBANG}{}", self.config.index_name)
        } else {
            format!("{HASHBANG}{path}")
        };

        let segments = self.view_segments(&path);
        let view = segments.join("/");
        let (controller_path, controller_script, controller_name) = self.controller_for(&segments);

        ResolvedRoute {
            view,
            controller_path,
            controller_script,
            controller_name,
            hash,
            is_plain_hash: false,
            data,
        }
    }

    /// 取得去掉前导 `/` 的工作路径。
    fn working_path(&self, remainder: &str) -> String {
        let raw = match remainder.find(HASHBANG) {
            Some(at) => &remainder[at + HASHBANG.len()..],
            None => {
                let without_origin = strip_origin(remainder);
                let root = self.config.domain_root.trim_matches('/');
                let trimmed = without_origin.trim_start_matches('/');
                if root.is_empty() {
                    trimmed
                } else {
                    trimmed
                        .strip_prefix(root)
                        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
                        .unwrap_or(trimmed)
                }
            }
        };
        let mut path = raw.trim_start_matches('/');
        while let Some(rest) = path.strip_prefix("./") {
            path = rest;
        }
        path.to_owned()
    }

    fn view_segments(&self, path: &str) -> Vec<String> {
        let parts: Vec<&str> = path.split('/').collect();
        let last = parts.len() - 1;
        // 中间的空段（`a//b`）被折叠，末尾空段保留给目录形式。
        let mut segments: Vec<String> = parts
            .iter()
            .enumerate()
            .filter(|(index, part)| *index == last || !part.is_empty())
            .map(|(_, part)| (*part).to_owned())
            .collect();

        if segments.first().map(String::as_str) != Some(self.config.view_root.as_str()) {
            segments.insert(0, self.config.view_root.clone());
        }
        // 地址恰好只有视图根一段时按目录处理。
        if segments.len() == 1 {
            segments.push(String::new());
        }
        if let Some(tail) = segments.last_mut() {
            if tail.is_empty() {
                *tail = self.config.index_name.clone();
            }
            if !self.config.has_view_extension(tail) {
                tail.push_str(&self.config.view_suffix);
            }
        }
        segments
    }

    fn controller_for(
        &self,
        view_segments: &[String],
    ) -> (Option<String>, Option<String>, Option<String>) {
        if !self.config.load_controllers {
            return (None, None, None);
        }

        let script = match &self.config.controller_override {
            Some(script) => script.clone(),
            None => {
                let mut segments = view_segments.to_vec();
                segments[0] = self.config.controller_root.clone();
                if let Some(tail) = segments.last_mut() {
                    let script_file = format!(
                        "{}{}",
                        strip_view_extension(&self.config, tail),
                        self.config.script_suffix
                    );
                    *tail = script_file;
                }
                join_root(&self.config.domain_root, &segments.join("/"))
            }
        };

        let (directory, file) = match script.rfind('/') {
            Some(at) => (script[..at].to_owned(), &script[at + 1..]),
            None => (String::new(), script.as_str()),
        };
        let name = file
            .strip_suffix(self.config.script_suffix.as_str())
            .unwrap_or(file)
            .to_owned();
        (Some(directory), Some(script), Some(name))
    }
}

fn split_query(url: &str) -> (String, &str) {
    match url.split_once('?') {
        None => (url.to_owned(), ""),
        Some((before, after)) => match after.find('#') {
            // `page?x=1#frag`：锚点在查询串之后，拼回剩余部分。
            Some(at) => (format!("{before}{}", &after[at..]), &after[..at]),
            None => (before.to_owned(), after),
        },
    }
}

fn parse_query(query: &str) -> StateData {
    let mut data = StateData::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        data.insert(key.into_owned(), value.into_owned().into());
    }
    data
}

fn strip_origin(url: &str) -> &str {
    match url.find("://") {
        Some(at) => {
            let after_scheme = &url[at + 3..];
            after_scheme
                .find('/')
                .map_or("", |slash| &after_scheme[slash..])
        }
        None => url,
    }
}

fn strip_view_extension<'a>(config: &RoutingConfig, segment: &'a str) -> &'a str {
    let lower = segment.to_ascii_lowercase();
    std::iter::once(&config.view_suffix)
        .chain(config.view_extensions.iter())
        .find(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
        .map_or(segment, |suffix| &segment[..segment.len() - suffix.len()])
}

fn join_root(root: &str, path: &str) -> String {
    if root.is_empty() {
        path.to_owned()
    } else if root.ends_with('/') {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> RoutingResolver {
        RoutingResolver::default()
    }

    #[test]
    fn query_is_consumed_into_data() {
        let route = resolver().resolve("reports/summary?month=5&month=6&year=2024");
        assert_eq!(route.view, "views/reports/summary.html");
        assert_eq!(route.hash, "#!reports/summary");
        assert_eq!(route.data.get("month"), Some(&json!("6")), "同名参数取最后一个");
        assert_eq!(route.data.get("year"), Some(&json!("2024")));
        assert_eq!(
            route.controller_script.as_deref(),
            Some("controllers/reports/summary.js")
        );
        assert_eq!(route.controller_path.as_deref(), Some("controllers/reports"));
        assert_eq!(route.controller_name.as_deref(), Some("summary"));
    }

    #[test]
    fn plain_anchor_is_not_a_view_change() {
        let route = resolver().resolve("page.html?tab=2#details");
        assert!(route.is_plain_hash);
        assert!(route.view.is_empty());
        assert!(route.controller_script.is_none());
        assert_eq!(route.hash, "#details");
        assert_eq!(route.data.get("tab"), Some(&json!("2")));
    }

    #[test]
    fn hashbang_and_absolute_urls_resolve_alike() {
        let resolver = resolver();
        let from_hash = resolver.resolve("#!reports/summary");
        let from_url = resolver.resolve("https://app.example/#!reports/summary");
        let from_path = resolver.resolve("/reports/summary");
        assert_eq!(from_hash, from_url);
        assert_eq!(from_hash, from_path);
    }

    #[test]
    fn directory_paths_default_to_index() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("reports/").view, "views/reports/index.html");
        assert_eq!(resolver.resolve("").view, "views/index.html");
        assert_eq!(resolver.resolve("").hash, "#!index");
        assert_eq!(resolver.resolve("#!").view, "views/index.html");
        assert_eq!(resolver.resolve("views").view, "views/index.html");
    }

    #[test]
    fn existing_root_and_extension_are_kept() {
        let route = resolver().resolve("#!views/legacy/page.htm");
        assert_eq!(route.view, "views/legacy/page.htm");
        assert_eq!(
            route.controller_script.as_deref(),
            Some("controllers/legacy/page.js")
        );
    }

    #[test]
    fn domain_root_prefixes_scripts_and_is_stripped_from_urls() {
        let resolver = RoutingResolver::new(RoutingConfig {
            domain_root: "/app".to_owned(),
            ..RoutingConfig::default()
        });
        let route = resolver.resolve("https://host.example/app/reports/summary");
        assert_eq!(route.view, "views/reports/summary.html");
        assert_eq!(
            route.controller_script.as_deref(),
            Some("/app/controllers/reports/summary.js")
        );
        assert_eq!(route.controller_name.as_deref(), Some("summary"));
    }

    #[test]
    fn override_and_disabled_controllers() {
        let overriding = RoutingResolver::new(RoutingConfig {
            controller_override: Some("controllers/shell.js".to_owned()),
            ..RoutingConfig::default()
        });
        let route = overriding.resolve("#!anything/at/all");
        assert_eq!(route.controller_script.as_deref(), Some("controllers/shell.js"));
        assert_eq!(route.controller_name.as_deref(), Some("shell"));

        let disabled = RoutingResolver::new(RoutingConfig {
            load_controllers: false,
            ..RoutingConfig::default()
        });
        let route = disabled.resolve("#!reports/summary");
        assert_eq!(route.view, "views/reports/summary.html");
        assert!(route.controller_script.is_none());
        assert!(route.controller_name.is_none());
    }

    #[test]
    fn into_state_keeps_resolved_fields() {
        let state = resolver().resolve("reports/summary?month=5").into_state("");
        assert_eq!(state.view, "views/reports/summary.html");
        assert!(state.targets_root());
        assert!(state.spa);
        assert_eq!(state.data.get("month"), Some(&json!("5")));
    }
}
