//! 时间源抽象。
//!
//! 回声窗口判定与 `RoutingState::timestamp` 都读取 [`Clock`]，测试使用
//! [`crate::test_stubs::ManualClock`] 精确控制时间。

use std::time::{SystemTime, UNIX_EPOCH};

/// 毫秒级时间源。
pub trait Clock: Send + Sync + 'static {
    /// 自 Unix 纪元起的毫秒数。
    fn now_millis(&self) -> u64;
}

/// 读取系统时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // 系统时钟早于纪元时按 0 处理。
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_epoch() {
        assert!(SystemClock.now_millis() > 0);
    }
}
