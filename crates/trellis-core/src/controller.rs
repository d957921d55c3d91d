//! 应用控制器契约。
//!
//! # 教案式说明
//! - **意图（Why）**：控制器具体类型直到导航发生时才确定；应用在启动时把 [`ControllerFactory`]
//!   登记到注册表，装载器按脚本路径查表构造，不再需要在运行时拼接或求值源码；
//! - **契约（What）**：
//!   - `on_init` 为同步钩子，在实例构造后立即调用一次；
//!   - `on_load` 接收导航载荷，异步完成；
//!   - `on_submit` 接收表单提交，失败会回传给发起提交的调用方；
//! - **线程模型（How）**：实例通过 `Arc<dyn Controller>` 缓存与共享，内部状态请自行使用锁或原子量。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ControllerError;
use crate::state::{FormSubmission, StateData};

/// 与视图关联的应用控制器。
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// 构造后立即执行的同步初始化。
    fn on_init(&self) {}

    /// 视图可见后执行的异步装载。
    async fn on_load(&self, data: &StateData) -> Result<(), ControllerError>;

    /// 处理被拦截的表单提交；默认忽略。
    async fn on_submit(&self, form: &FormSubmission) -> Result<(), ControllerError> {
        let _ = form;
        Ok(())
    }
}

/// 控制器工厂。
///
/// 注册表只保存工厂，每次需要实例时调用 [`ControllerFactory::create`]。
pub trait ControllerFactory: Send + Sync + 'static {
    /// 构造新的控制器实例。
    fn create(&self) -> Arc<dyn Controller>;
}

impl<F> ControllerFactory for F
where
    F: Fn() -> Arc<dyn Controller> + Send + Sync + 'static,
{
    fn create(&self) -> Arc<dyn Controller> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl Controller for Counting {
        async fn on_load(&self, _data: &StateData) -> Result<(), ControllerError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn closures_act_as_factories() {
        let factory = || {
            Arc::new(Counting {
                loads: AtomicUsize::new(0),
            }) as Arc<dyn Controller>
        };
        let first = ControllerFactory::create(&factory);
        let second = ControllerFactory::create(&factory);
        assert!(!Arc::ptr_eq(&first, &second), "每次调用都应产生新实例");

        futures::executor::block_on(first.on_load(&StateData::new())).expect("装载应成功");
        let form = FormSubmission::new(
            crate::host::ElementHandle::new("form#login"),
            "login",
            StateData::new(),
        );
        futures::executor::block_on(first.on_submit(&form)).expect("默认提交处理应成功");
    }
}
