//! 集成测试公共辅助
#![allow(dead_code)] // 各测试二进制只用到部分辅助函数

use canlink_can::MockController;
use canlink_driver::{CanLink, LinkConfig};
use std::time::{Duration, Instant};

/// 初始化测试日志（重复调用安全）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// 构建挂在 mock 控制器上的传输层，返回 (link, mock 句柄)
pub fn mock_link(config: LinkConfig) -> (CanLink<MockController>, MockController) {
    let mock = MockController::new();
    let link = CanLink::new(mock.clone(), config).expect("link init failed");
    (link, mock)
}

/// 轮询等待条件成立，超时返回 false
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
