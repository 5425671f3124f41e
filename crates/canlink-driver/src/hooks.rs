//! 回调（Hook）系统
//!
//! 接收帧与发送完成事件的运行时回调管理，替代全局函数指针：
//! 回调以 trait object 形式注入，注册表由 `CanLink` 的读写锁保护。
//!
//! # 性能要求
//!
//! 回调在 IO 路径上同步执行，实现必须快速返回且不得阻塞
//! （禁止锁、I/O、无界分配）。需要做重活的场景用 [`ChannelHook`]
//! 把帧转发到通道，由调用方线程自行消费。

use crate::error::LinkError;
use canlink_protocol::LinkFrame;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;

/// 传输层事件回调
///
/// 两个方法都有空默认实现，按需覆盖其一即可。
pub trait LinkHook: Send + Sync {
    /// 收到一帧时调用（同步路径的 `process_once` 或接收任务触发）
    fn on_frame_received(&self, frame: &LinkFrame) {
        let _ = frame;
    }

    /// 一帧发送结束时调用
    ///
    /// 同步路径在每次发送后触发；流水线只在成功或重试耗尽时触发——
    /// 中间的重试不上报。
    fn on_transmit_complete(&self, frame: &LinkFrame, result: Result<(), LinkError>) {
        let _ = (frame, result);
    }
}

/// 回调注册表
///
/// 本身不做同步，由持有方放在读写锁内（见 `CanLink`）。
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn LinkHook>>,
}

impl HookRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// 注册回调
    pub fn add(&mut self, hook: Arc<dyn LinkHook>) {
        self.hooks.push(hook);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// 触发所有接收回调
    pub fn notify_received(&self, frame: &LinkFrame) {
        for hook in &self.hooks {
            hook.on_frame_received(frame);
        }
    }

    /// 触发所有发送完成回调
    pub fn notify_transmit(&self, frame: &LinkFrame, result: Result<(), LinkError>) {
        for hook in &self.hooks {
            hook.on_transmit_complete(frame, result.clone());
        }
    }
}

/// 通道回调：把收到的帧经有界通道转发给调用方
///
/// IO 路径上只做 `try_send`——通道满时丢弃并不阻塞，消费慢的
/// 调用方丢的是自己的帧，不拖累总线收发。
///
/// # 示例
///
/// ```rust
/// use canlink_driver::hooks::{ChannelHook, LinkHook};
/// use canlink_protocol::LinkFrame;
/// use std::sync::Arc;
///
/// let (hook, rx) = ChannelHook::new(64);
/// let hook: Arc<dyn LinkHook> = Arc::new(hook);
///
/// hook.on_frame_received(&LinkFrame::new(0x123, &[1, 2]));
/// assert_eq!(rx.try_recv().unwrap().id, 0x123);
/// ```
pub struct ChannelHook {
    tx: Sender<LinkFrame>,
}

impl ChannelHook {
    /// 创建通道回调，返回 (hook, 接收端)
    pub fn new(capacity: usize) -> (Self, Receiver<LinkFrame>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl LinkHook for ChannelHook {
    fn on_frame_received(&self, frame: &LinkFrame) {
        // 非阻塞；通道满则丢弃
        let _ = self.tx.try_send(*frame);
    }
}
