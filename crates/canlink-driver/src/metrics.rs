//! 诊断与指标存储
//!
//! 延迟统计在互斥锁保护下更新（每次成功发送一个临界区）；
//! 重发/碰撞/尝试计数器只由消费任务单写，使用原子量即可。
//! 总线占用率的读取是 best-effort 的瞬时值——它是监控量，不是控制输入。

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Instant;

/// 发送延迟统计（微秒）
///
/// `min` 初始为 `i64::MAX`、`max` 为 0：没有样本时快照保持初始值，
/// 调用方应先检查 `samples`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatencyMetrics {
    /// 样本数
    pub samples: u32,
    /// 累计延迟（微秒）
    pub total_latency_us: i64,
    /// 最小延迟（微秒）
    pub min_latency_us: i64,
    /// 最大延迟（微秒）
    pub max_latency_us: i64,
}

impl LatencyMetrics {
    pub const fn new() -> Self {
        Self {
            samples: 0,
            total_latency_us: 0,
            min_latency_us: i64::MAX,
            max_latency_us: 0,
        }
    }

    /// 记录一个延迟样本
    pub fn record(&mut self, latency_us: i64) {
        self.samples += 1;
        self.total_latency_us += latency_us;
        if latency_us < self.min_latency_us {
            self.min_latency_us = latency_us;
        }
        if latency_us > self.max_latency_us {
            self.max_latency_us = latency_us;
        }
    }

    /// 平均延迟（微秒），无样本时为 0
    pub fn mean_us(&self) -> i64 {
        if self.samples == 0 {
            0
        } else {
            self.total_latency_us / i64::from(self.samples)
        }
    }
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 发送队列状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueStatus {
    /// 当前排队帧数
    pub waiting: usize,
    /// 队列容量
    pub capacity: usize,
}

/// 总线占用率（百分比）
///
/// `busy_us * 100 / elapsed_us`，`elapsed_us <= 0` 时为 0。
pub fn bus_load_percent(busy_us: i64, elapsed_us: i64) -> u32 {
    if elapsed_us <= 0 {
        return 0;
    }
    ((busy_us * 100) / elapsed_us) as u32
}

/// 碰撞率（百分比）
///
/// `collisions * 100 / attempts`，没有发送尝试时为 0。
pub fn collision_rate_percent(collisions: u32, attempts: u32) -> u32 {
    if attempts == 0 {
        return 0;
    }
    ((u64::from(collisions) * 100) / u64::from(attempts)) as u32
}

/// 传输层指标存储
///
/// 进程级单例语义：随 `CanLink` 创建，生存期覆盖整个传输层。
pub(crate) struct LinkMetrics {
    latency: Mutex<LatencyMetrics>,
    retransmissions: AtomicU32,
    collisions: AtomicU32,
    attempts: AtomicU32,
    /// 累计发送占用时间（微秒），用于总线占用率
    busy_time_us: AtomicI64,
    /// 初始化时刻，占用率与自检时间戳的共同基准
    epoch: Instant,
}

impl LinkMetrics {
    pub(crate) fn new() -> Self {
        Self {
            latency: Mutex::new(LatencyMetrics::new()),
            retransmissions: AtomicU32::new(0),
            collisions: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            busy_time_us: AtomicI64::new(0),
            epoch: Instant::now(),
        }
    }

    /// 自 epoch 起经过的微秒数（单调时钟）
    pub(crate) fn epoch_elapsed_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    /// 记录一次发送尝试（成功与否都计入）
    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次重试：重发计数与碰撞计数同时 +1
    ///
    /// 碰撞完全是重试事件的代理——控制器没有独立的碰撞信号。
    pub(crate) fn record_retry(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次成功发送：更新延迟统计并累加占用时间
    pub(crate) fn record_success(&self, latency_us: i64) {
        {
            let mut latency = self.latency.lock();
            latency.record(latency_us);
        }
        self.busy_time_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// 延迟统计的加锁快照
    pub(crate) fn latency_snapshot(&self) -> LatencyMetrics {
        *self.latency.lock()
    }

    pub(crate) fn retransmission_count(&self) -> u32 {
        self.retransmissions.load(Ordering::Relaxed)
    }

    pub(crate) fn collision_count(&self) -> u32 {
        self.collisions.load(Ordering::Relaxed)
    }

    pub(crate) fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn collision_rate(&self) -> u32 {
        collision_rate_percent(self.collision_count(), self.attempt_count())
    }

    pub(crate) fn bus_load(&self) -> u32 {
        bus_load_percent(self.busy_time_us.load(Ordering::Relaxed), self.epoch_elapsed_us())
    }
}
