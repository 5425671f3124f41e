//! 环回自检集成测试
//!
//! 重点是两条不变式：往返时间非负，以及自收标志在任何结果下都
//! 恢复为自检前的值。

mod common;

use canlink_driver::{LinkBuilder, LinkConfig, LinkError};
use common::{init_tracing, mock_link};

#[test]
fn test_round_trip_returns_non_negative_duration() {
    init_tracing();
    let (link, _mock) = mock_link(LinkConfig::default());

    let round_trip = link.measure_round_trip_time(1000).unwrap();
    assert!(round_trip >= 0);
}

#[test]
fn test_round_trip_restores_self_rx_after_success() {
    init_tracing();
    let (link, _mock) = mock_link(LinkConfig::default());
    assert!(!link.config().self_rx);

    link.measure_round_trip_time(1000).unwrap();
    assert!(!link.config().self_rx, "self_rx must be restored after the test");
}

#[test]
fn test_round_trip_preserves_enabled_self_rx() {
    init_tracing();
    let mock = canlink_can::MockController::new();
    let link = LinkBuilder::new().self_rx(true).build(mock).unwrap();

    link.measure_round_trip_time(1000).unwrap();
    assert!(link.config().self_rx, "a previously enabled self_rx must stay enabled");
}

#[test]
fn test_round_trip_restores_self_rx_after_send_failure() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());

    mock.fail_all_transmits(true);
    let err = link.measure_round_trip_time(1000).unwrap_err();
    assert_eq!(err, LinkError::Transmit);
    assert!(!link.config().self_rx, "self_rx must not leak out of a failed test");
}

#[test]
fn test_round_trip_rejects_short_reply() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());

    // 先塞一帧过短的流量：自检会把它当成回包读到，长度不足 8 字节
    mock.push_rx(canlink_can::BusFrame {
        id: 0x55,
        data: [1, 2, 0, 0, 0, 0, 0, 0],
        dlc: 2,
        extended: true,
        self_rx: false,
    });

    let err = link.measure_round_trip_time(1000).unwrap_err();
    assert_eq!(err, LinkError::Receive);
    assert!(!link.config().self_rx);
}

#[test]
fn test_round_trip_does_not_touch_pipeline_metrics() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());

    // 自检走的是同步路径，不经过流水线：延迟统计保持为空
    link.measure_round_trip_time(100).unwrap();
    assert_eq!(link.latency_metrics().samples, 0);
    assert_eq!(mock.transmitted().len(), 1);
}
