//! 进程级 `tracing` 安装。
//!
//! # 教案式说明
//! - **意图（Why）**：框架各处只调用 `tracing` 宏，宿主进程（测试、命令行工具或嵌入式运行时）
//!   需要一个统一入口装配订阅者；
//! - **契约（What）**：[`install_tracing`] 在进程生命周期内至多成功一次，重复调用返回
//!   [`TracingInstallError::AlreadyInstalled`]；外部已设置全局订阅者时返回
//!   [`TracingInstallError::SubscriberAlreadySet`]；
//! - **执行（How）**：过滤规则取自 `RUST_LOG`，缺省为 `info`；输出层为 `tracing-subscriber` 的 fmt 层。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装过程中的错误。
#[derive(Debug, Error)]
pub enum TracingInstallError {
    /// `install_tracing` 被重复调用。
    #[error("tracing has already been installed by trellis")]
    AlreadyInstalled,
    /// 外部提前设置了全局订阅者。
    #[error("a global tracing subscriber was set elsewhere")]
    SubscriberAlreadySet,
    /// 注册全局订阅者失败。
    #[error("failed to set global subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装全局订阅者。
pub fn install_tracing() -> Result<(), TracingInstallError> {
    if INSTALLED.get().is_some() {
        return Err(TracingInstallError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TracingInstallError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(())
        .map_err(|()| TracingInstallError::AlreadyInstalled)?;
    tracing::debug!("trellis tracing installed");
    Ok(())
}

/// 过滤规则：`RUST_LOG` 优先，缺省 `info`。
pub fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_accepts_info() {
        let filter = build_env_filter();
        assert!(!filter.to_string().is_empty());
    }
}
