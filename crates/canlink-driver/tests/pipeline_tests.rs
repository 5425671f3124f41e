//! 异步发送流水线集成测试
//!
//! 覆盖重试上限、退避间隔、队首插队、优先级自适应、碰撞率与
//! 背压语义，全部跑在 mock 控制器上。

mod common;

use canlink_driver::{
    BASELINE_PRIORITY, HIGH_PRIORITY, LinkBuilder, LinkConfig, LinkError, LinkFrame, LinkHook,
    MAX_RETRANSMISSIONS,
};
use common::{init_tracing, mock_link, wait_until};
use rand::RngCore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ResultHook {
    results: Mutex<Vec<(u32, Result<(), LinkError>)>>,
}

impl ResultHook {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(Vec::new()),
        })
    }

    fn results(&self) -> Vec<(u32, Result<(), LinkError>)> {
        self.results.lock().unwrap().clone()
    }
}

impl LinkHook for ResultHook {
    fn on_transmit_complete(&self, frame: &LinkFrame, result: Result<(), LinkError>) {
        self.results.lock().unwrap().push((frame.id, result));
    }
}

#[test]
fn test_failing_frame_attempted_exactly_four_times() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    let hook = ResultHook::new();
    link.add_hook(hook.clone());

    mock.fail_all_transmits(true);
    link.enqueue(LinkFrame::new(0x77, &[1]), false).unwrap();

    // 1 次首发 + 3 次重发，之后上报失败并丢帧
    assert!(wait_until(Duration::from_secs(3), || !hook.results().is_empty()));
    assert_eq!(hook.results(), vec![(0x77, Err(LinkError::Transmit))]);

    assert_eq!(mock.transmit_attempts(), 1 + MAX_RETRANSMISSIONS as usize);
    assert_eq!(link.transmission_attempts(), 4);
    assert_eq!(link.retransmission_count(), 3);
    assert_eq!(link.collision_count(), 3);
}

#[test]
fn test_retry_attempts_are_separated_by_backoff() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    let hook = ResultHook::new();
    link.add_hook(hook.clone());

    mock.fail_all_transmits(true);
    link.enqueue(LinkFrame::new(0x78, &[1]), false).unwrap();
    assert!(wait_until(Duration::from_secs(3), || !hook.results().is_empty()));

    let instants = mock.transmit_instants();
    assert_eq!(instants.len(), 4);
    for pair in instants.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= Duration::from_millis(50),
            "retry gap {:?} is below the 50 ms backoff",
            gap
        );
    }
}

#[test]
fn test_successful_transmissions_update_latency_metrics() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    mock.set_transmit_delay(Duration::from_millis(5));

    for i in 0..3 {
        link.enqueue(LinkFrame::new(0x100 + i, &[i as u8]), false).unwrap();
    }
    assert!(wait_until(Duration::from_secs(3), || {
        link.latency_metrics().samples == 3
    }));

    let metrics = link.latency_metrics();
    // 注入了 5 ms 发送耗时，单帧延迟不可能低于它
    assert!(metrics.min_latency_us >= 5_000);
    let mean = metrics.mean_us();
    assert!(metrics.min_latency_us <= mean && mean <= metrics.max_latency_us);
    assert_eq!(link.transmission_attempts(), 3);
    assert_eq!(link.retransmission_count(), 0);
}

#[test]
fn test_collision_rate_scenario() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    let hook = ResultHook::new();
    link.add_hook(hook.clone());

    // 第一帧失败两次后成功（3 次尝试、2 次碰撞），再加 7 帧干净发送
    // → 共 10 次尝试、2 次碰撞 → 碰撞率 20%
    mock.fail_next_transmits(2);
    link.enqueue(LinkFrame::new(0x1, &[1]), false).unwrap();
    assert!(wait_until(Duration::from_secs(3), || {
        link.transmission_attempts() == 3
    }));

    for i in 0..7 {
        link.enqueue(LinkFrame::new(0x10 + i, &[i as u8]), false).unwrap();
    }
    assert!(wait_until(Duration::from_secs(3), || {
        link.transmission_attempts() == 10 && link.queue_status().waiting == 0
    }));

    assert_eq!(link.collision_count(), 2);
    assert_eq!(link.collision_rate(), 20);
    assert_eq!(hook.results().iter().filter(|(_, r)| r.is_ok()).count(), 8);
}

#[test]
fn test_high_priority_enqueue_preempts_normal_traffic() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    mock.set_transmit_delay(Duration::from_millis(50));

    // A 先被消费任务取走；B、C 在 A 发送期间入队，C 插队到 B 前面
    link.enqueue(LinkFrame::new(0xA, &[]), false).unwrap();
    std::thread::sleep(Duration::from_millis(10));
    link.enqueue(LinkFrame::new(0xB, &[]), false).unwrap();
    link.enqueue(LinkFrame::new(0xC, &[]), true).unwrap();

    assert!(wait_until(Duration::from_secs(3), || mock.transmitted().len() == 3));

    let order: Vec<u32> = mock.transmitted().iter().map(|f| f.id).collect();
    let pos_b = order.iter().position(|&id| id == 0xB).unwrap();
    let pos_c = order.iter().position(|&id| id == 0xC).unwrap();
    assert!(pos_c < pos_b, "high-priority frame must be served first: {:?}", order);
}

#[test]
fn test_retry_preempts_fresh_traffic() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());

    // A 首发失败一次；重试插队到队首，应先于 B 成功
    mock.fail_next_transmits(1);
    link.enqueue(LinkFrame::new(0xA, &[]), false).unwrap();
    link.enqueue(LinkFrame::new(0xB, &[]), false).unwrap();

    assert!(wait_until(Duration::from_secs(3), || mock.transmitted().len() == 2));
    let order: Vec<u32> = mock.transmitted().iter().map(|f| f.id).collect();
    assert_eq!(order, vec![0xA, 0xB]);
    assert_eq!(link.retransmission_count(), 1);
}

#[test]
fn test_priority_adaptation_raises_and_restores() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    assert_eq!(link.tx_task_priority(), BASELINE_PRIORITY);

    // 拖慢消费任务，把队列灌到 80% 阈值之上
    mock.set_transmit_delay(Duration::from_millis(30));
    for i in 0..30 {
        link.enqueue(LinkFrame::new(0x200 + i, &[]), false).unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(3), || link.tx_task_priority() == HIGH_PRIORITY),
        "queue pressure should raise the TX task priority"
    );

    // 排空后回落到基线
    assert!(wait_until(Duration::from_secs(5), || {
        link.queue_status().waiting == 0
    }));
    assert!(
        wait_until(Duration::from_secs(2), || {
            link.tx_task_priority() == BASELINE_PRIORITY
        }),
        "drained queue should restore the baseline priority"
    );
}

#[test]
fn test_unsendable_frame_is_dropped_without_retry() {
    init_tracing();
    let mock = canlink_can::MockController::new();
    let link = LinkBuilder::new().use_checksum(true).build(mock.clone()).unwrap();
    let hook = ResultHook::new();
    link.add_hook(hook.clone());

    // 8 字节满载帧启用校验后没有校验字节空间：不重试、不计入尝试
    link.enqueue(LinkFrame::new(0x30, &[0u8; 8]), false).unwrap();

    assert!(wait_until(Duration::from_secs(2), || !hook.results().is_empty()));
    assert_eq!(
        hook.results(),
        vec![(0x30, Err(LinkError::InvalidLength { length: 8 }))]
    );
    assert_eq!(mock.transmit_attempts(), 0);
    assert_eq!(link.transmission_attempts(), 0);
}

#[test]
fn test_full_queue_applies_backpressure_without_losing_frames() {
    init_tracing();
    let (link, mock) = mock_link(LinkConfig::default());
    mock.set_transmit_delay(Duration::from_millis(1));

    // 两个生产者合计灌入 100 帧（远超容量 32）：enqueue 在队满时阻塞，
    // 最终一帧不丢
    let mut payload = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut payload);

    std::thread::scope(|scope| {
        for worker in 0..2u32 {
            let link = &link;
            scope.spawn(move || {
                for i in 0..50u32 {
                    let id = (worker << 8) | i;
                    link.enqueue(LinkFrame::new(id, &payload), false).unwrap();
                }
            });
        }
    });

    assert!(wait_until(Duration::from_secs(10), || {
        mock.transmitted().len() == 100
    }));
    assert_eq!(link.transmission_attempts(), 100);
    assert_eq!(link.queue_status().waiting, 0);
}

#[test]
fn test_queue_status_reports_capacity() {
    init_tracing();
    let (link, _mock) = mock_link(LinkConfig::default());
    let status = link.queue_status();
    assert_eq!(status.capacity, canlink_driver::TX_QUEUE_CAPACITY);
    assert_eq!(status.waiting, 0);
}
