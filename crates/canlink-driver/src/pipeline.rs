//! 异步发送流水线
//!
//! 一个专职消费任务排空有界发送队列：出队 → 转线缆格式 → 阻塞发送，
//! 失败时按固定退避重试（重试插队到队首，优先于新流量），每处理完
//! 一帧后根据队列压力调整自身调度优先级。
//!
//! 每帧的状态机：
//!
//! ```text
//! Queued → Transmitting → { Done | Retrying → Queued | Failed }
//! ```
//!
//! 重试上限与退避都是固定值；碰撞计数完全来自重试事件的代理
//! （控制器没有独立的碰撞信号）。

use crate::error::LinkError;
use crate::link::LinkShared;
use canlink_can::{BusController, BusFrame};
use canlink_protocol::{LinkFrame, MAX_DATA_LENGTH, xor_checksum};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

/// 单帧最大重发次数
pub const MAX_RETRANSMISSIONS: u8 = 3;
/// 重试前的固定退避（非指数）
pub const BACKOFF: Duration = Duration::from_millis(50);
/// 发送队列容量
pub const TX_QUEUE_CAPACITY: usize = 32;
/// 消费任务的基线优先级
pub const BASELINE_PRIORITY: u8 = 10;
/// 队列高压时的提升优先级
pub const HIGH_PRIORITY: u8 = 15;
/// 触发优先级提升的队列占用阈值（容量百分比）
pub const QUEUE_PRESSURE_PERCENT: usize = 80;
/// `process_once` 与接收任务使用的轮询超时（毫秒）
pub const PROCESS_POLL_TIMEOUT_MS: u64 = 10;

/// 发送队列条目：帧 + 显式重试计数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxEntry {
    pub frame: LinkFrame,
    pub retry_count: u8,
}

/// 流水线中一帧的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// 在队列中等待
    Queued,
    /// 消费任务正在发送
    Transmitting,
    /// 发送失败，退避后重新入队
    Retrying,
    /// 重试耗尽，帧被丢弃并上报回调
    Failed,
    /// 发送成功
    Done,
}

impl TxState {
    /// 发送失败后的状态转移：未达上限则重试，否则判定失败
    ///
    /// 纯函数，使尝试次数上限（1 + [`MAX_RETRANSMISSIONS`]）可审计。
    pub fn after_failure(retry_count: u8) -> Self {
        if retry_count < MAX_RETRANSMISSIONS {
            Self::Retrying
        } else {
            Self::Failed
        }
    }
}

/// 应用层帧 → 控制器线缆帧
///
/// 扩展帧标志恒置位；自收标志取自当前配置。启用校验时在有效数据后
/// 追加 XOR 校验字节，8 字节满载帧没有追加空间，返回 `InvalidLength`。
pub(crate) fn wire_frame(
    frame: &LinkFrame,
    use_checksum: bool,
    self_rx: bool,
) -> Result<BusFrame, LinkError> {
    let len = frame.len.min(MAX_DATA_LENGTH as u8) as usize;
    let mut data = frame.data;
    let dlc = if use_checksum {
        if len >= MAX_DATA_LENGTH {
            return Err(LinkError::InvalidLength { length: len });
        }
        data[len] = xor_checksum(&frame.data[..len]);
        (len + 1) as u8
    } else {
        len as u8
    };

    Ok(BusFrame {
        id: frame.id,
        data,
        dlc,
        extended: true,
        self_rx,
    })
}

/// 队列压力对应的优先级调整决策
///
/// 占用 >= 阈值且当前低于 HIGH → 提升；占用 < 阈值且当前高于
/// BASELINE → 回落；其余情况不动作。两级控制，无滞回。
pub fn adapted_priority(waiting: usize, capacity: usize, current: u8) -> Option<u8> {
    let threshold = capacity * QUEUE_PRESSURE_PERCENT / 100;
    if waiting >= threshold && current < HIGH_PRIORITY {
        Some(HIGH_PRIORITY)
    } else if waiting < threshold && current > BASELINE_PRIORITY {
        Some(BASELINE_PRIORITY)
    } else {
        None
    }
}

/// 把逻辑优先级落到当前线程
///
/// OS 层设置失败（缺少权限等）只告警，不影响流水线运行；
/// 逻辑优先级始终记录在 `LinkShared::tx_priority` 中。
fn apply_task_priority(level: u8) {
    use thread_priority::{ThreadPriority, ThreadPriorityValue, set_current_thread_priority};

    match ThreadPriorityValue::try_from(level) {
        Ok(value) => {
            if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
                warn!(
                    "Failed to set TX task priority to {}: {:?}. \
                     On Linux this may require CAP_SYS_NICE.",
                    level, e
                );
            }
        },
        Err(_) => warn!("Invalid TX task priority value: {}", level),
    }
}

/// 按队列压力调整消费任务优先级（每排空一帧评估一次，不走定时器）
pub(crate) fn adapt_task_priority<C: BusController>(shared: &LinkShared<C>) {
    let waiting = shared.tx_queue.len();
    let capacity = shared.tx_queue.capacity();
    let current = shared.tx_priority.load(Ordering::Relaxed);

    if let Some(level) = adapted_priority(waiting, capacity, current) {
        if level > current {
            info!(
                "TX queue under pressure ({} waiting), raising task priority to {}",
                waiting, level
            );
        } else {
            info!(
                "TX queue below threshold ({} waiting), restoring task priority to {}",
                waiting, level
            );
        }
        apply_task_priority(level);
        shared.tx_priority.store(level, Ordering::Relaxed);
    }
}

/// 消费任务主循环
///
/// 队列关闭（停机）后排空残余条目并退出；除此之外终生运行。
pub(crate) fn tx_loop<C: BusController>(shared: Arc<LinkShared<C>>) {
    apply_task_priority(BASELINE_PRIORITY);
    shared.tx_priority.store(BASELINE_PRIORITY, Ordering::Relaxed);
    trace!("TX task started");

    while let Some(mut entry) = shared.tx_queue.pop() {
        // 复制配置快照后立即释放锁，不跨阻塞调用持锁
        let (use_checksum, self_rx, timeout, debug_level) = {
            let cfg = shared.config.lock();
            (
                cfg.use_checksum,
                cfg.self_rx,
                cfg.transmit_timeout(),
                cfg.debug_level,
            )
        };

        let bus_frame = match wire_frame(&entry.frame, use_checksum, self_rx) {
            Ok(frame) => frame,
            Err(e) => {
                // 校验类错误不进入重试路径
                error!(
                    "Dropping unsendable frame (ID: 0x{:08X}): {}",
                    entry.frame.id, e
                );
                shared.notify_transmit(&entry.frame, Err(e));
                continue;
            },
        };

        shared.metrics.record_attempt();
        let attempt_start = Instant::now();

        match shared.controller.transmit(&bus_frame, timeout) {
            Err(e) => {
                error!("Failed to transmit frame (ID: 0x{:08X}): {}", entry.frame.id, e);
                if TxState::after_failure(entry.retry_count) == TxState::Retrying {
                    entry.retry_count += 1;
                    shared.metrics.record_retry();
                    spin_sleep::sleep(BACKOFF);
                    trace!(
                        "Re-enqueueing frame (ID: 0x{:08X}) for retry {}/{}",
                        entry.frame.id, entry.retry_count, MAX_RETRANSMISSIONS
                    );
                    // 重试插队到队首，优先于新流量；队列关闭说明正在停机
                    if shared.tx_queue.push_front(entry).is_err() {
                        break;
                    }
                } else {
                    error!(
                        "Frame (ID: 0x{:08X}) dropped after {} retransmissions",
                        entry.frame.id, MAX_RETRANSMISSIONS
                    );
                    shared.notify_transmit(&entry.frame, Err(LinkError::Transmit));
                }
            },
            Ok(()) => {
                let latency_us = attempt_start.elapsed().as_micros() as i64;
                shared.metrics.record_success(latency_us);
                if debug_level >= 2 {
                    info!(
                        "Frame (ID: 0x{:08X}) transmitted in {} us",
                        entry.frame.id, latency_us
                    );
                }
                shared.notify_transmit(&entry.frame, Ok(()));
            },
        }

        adapt_task_priority(&shared);
    }

    trace!("TX task: queue closed, exiting");
}

/// 接收任务主循环
///
/// 短超时轮询接收并分发回调；运行标志清除后退出。
pub(crate) fn rx_loop<C: BusController>(shared: Arc<LinkShared<C>>) {
    trace!("RX task started");

    while shared.rx_running.load(Ordering::Acquire) {
        match shared.receive_frame(PROCESS_POLL_TIMEOUT_MS) {
            Ok(frame) => {
                if shared.config.lock().debug_level >= 2 {
                    info!("Frame received - ID: 0x{:08X}, length: {}", frame.id, frame.len);
                }
                shared.notify_received(&frame);
            },
            // 超时属正常轮询；校验失败已在 receive_frame 里记过日志
            Err(_) => {},
        }
    }

    trace!("RX task: loop exited");
}
