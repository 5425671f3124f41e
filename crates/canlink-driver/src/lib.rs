//! # CanLink 驱动层
//!
//! 分布式 ECU 总线的传输核心，在共享仲裁总线上搬运定长帧：
//!
//! - 同步收发路径（带超时与校验字节处理）
//! - 异步发送流水线（有界优先级队列 + 专职消费任务 +
//!   固定退避重试 + 按队列压力的优先级自适应）
//! - 诊断与指标（延迟统计、总线占用率、重发/碰撞计数）
//! - 环回自检（端到端往返时间测量）
//! - 动态配置管理（整体替换与部分更新）
//!
//! 底层控制器通过 [`canlink_can::BusController`] trait 注入；
//! 标识符编码与校验和在 [`canlink_protocol`] 中定义。

pub mod builder;
pub mod config;
mod error;
pub mod hooks;
pub mod link;
pub mod metrics;
pub mod pipeline;
mod queue;

pub use builder::LinkBuilder;
pub use config::LinkConfig;
pub use error::LinkError;
pub use hooks::{ChannelHook, HookRegistry, LinkHook};
pub use link::CanLink;
pub use metrics::{LatencyMetrics, QueueStatus, bus_load_percent, collision_rate_percent};
pub use pipeline::{
    BACKOFF, BASELINE_PRIORITY, HIGH_PRIORITY, MAX_RETRANSMISSIONS, PROCESS_POLL_TIMEOUT_MS,
    TX_QUEUE_CAPACITY, TxState,
};

// 重新导出下层常用类型
pub use canlink_can::{
    BitTiming, BusController, BusFrame, ControllerMode, ControllerStatus, FilterConfig,
    GeneralConfig,
};
pub use canlink_protocol::{LinkFrame, MAX_DATA_LENGTH, MessageId, SELF_TEST_ID, xor_checksum};
