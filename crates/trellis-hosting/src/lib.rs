#![deny(unsafe_code)]
#![doc = "trellis-hosting: 为浏览器适配层提供导航器装配入口与 tracing 安装。"]

pub mod builder;
pub mod observability;

pub use builder::{Navigator, NavigatorBuilder};
pub use observability::{TracingInstallError, install_tracing};
