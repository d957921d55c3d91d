//! 路由管线的默认步骤：为新插入的标记重新绑定导航拦截。

use std::sync::Arc;

use async_trait::async_trait;
use trellis_core::error::NavigationError;
use trellis_core::extension::{Extension, RunContext, StepStatus};
use trellis_core::host::Document;
use trellis_core::state::RoutingState;

/// 扩展名称。
pub const TRIGGER_BINDER: &str = "trigger-binder";

/// 在视图装载后调用 [`Document::bind_triggers`]。
pub struct TriggerBinder {
    document: Arc<dyn Document>,
    selector: String,
}

impl TriggerBinder {
    pub fn new(document: Arc<dyn Document>, selector: impl Into<String>) -> Self {
        Self {
            document,
            selector: selector.into(),
        }
    }
}

#[async_trait]
impl Extension for TriggerBinder {
    fn name(&self) -> &str {
        TRIGGER_BINDER
    }

    async fn handle(
        &self,
        state: &mut RoutingState,
        run: &RunContext,
    ) -> Result<StepStatus, NavigationError> {
        if !run.is_current() {
            return Ok(StepStatus::Superseded);
        }
        let bound = self.document.bind_triggers(&self.selector);
        tracing::debug!(view = %state.view, selector = %self.selector, bound, "navigation triggers bound");
        Ok(StepStatus::Completed)
    }
}
