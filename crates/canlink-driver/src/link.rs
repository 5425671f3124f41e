//! 传输层对外句柄
//!
//! [`CanLink`] 封装总线控制器、配置管理、同步收发路径、异步发送
//! 流水线与诊断接口。配置、指标和发送队列收拢在一个由调用方持有的
//! 显式上下文对象（`LinkShared`）里，按引用共享给各任务。

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::hooks::{HookRegistry, LinkHook};
use crate::metrics::{LatencyMetrics, LinkMetrics, QueueStatus};
use crate::pipeline::{self, PROCESS_POLL_TIMEOUT_MS, TX_QUEUE_CAPACITY, TxEntry, wire_frame};
use crate::queue::TxQueue;
use canlink_can::{BusController, ControllerStatus, FilterConfig};
use canlink_protocol::{LinkFrame, MAX_DATA_LENGTH, SELF_TEST_ID, xor_checksum};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, trace};

/// 各任务共享的传输层上下文
pub(crate) struct LinkShared<C: BusController> {
    pub(crate) controller: C,
    pub(crate) config: Mutex<LinkConfig>,
    pub(crate) metrics: LinkMetrics,
    pub(crate) tx_queue: TxQueue,
    pub(crate) hooks: RwLock<HookRegistry>,
    /// 消费任务的逻辑优先级（诊断与测试可读）
    pub(crate) tx_priority: AtomicU8,
    /// 接收任务运行标志
    pub(crate) rx_running: AtomicBool,
}

impl<C: BusController> LinkShared<C> {
    pub(crate) fn notify_transmit(&self, frame: &LinkFrame, result: Result<(), LinkError>) {
        self.hooks.read().notify_transmit(frame, result);
    }

    pub(crate) fn notify_received(&self, frame: &LinkFrame) {
        self.hooks.read().notify_received(frame);
    }

    /// 阻塞接收一帧并应用校验策略
    ///
    /// 控制器超时或错误统一折叠为 [`LinkError::Timeout`]；启用校验时
    /// 验证并剥除尾部校验字节（长度 >= 1 的检查先于递减，空帧不会
    /// 下溢）。
    pub(crate) fn receive_frame(&self, timeout_ms: u64) -> Result<LinkFrame, LinkError> {
        let bus_frame = match self.controller.receive(Duration::from_millis(timeout_ms)) {
            Ok(frame) => frame,
            Err(e) => {
                trace!("Timeout or error receiving frame: {}", e);
                return Err(LinkError::Timeout);
            },
        };

        let mut frame = LinkFrame {
            id: bus_frame.id,
            data: bus_frame.data,
            len: bus_frame.dlc.min(MAX_DATA_LENGTH as u8),
        };

        if self.config.lock().use_checksum {
            if frame.len < 1 {
                error!("Received frame without checksum byte (ID: 0x{:08X})", frame.id);
                return Err(LinkError::Receive);
            }
            let payload_len = (frame.len - 1) as usize;
            let expected = xor_checksum(&frame.data[..payload_len]);
            if expected != frame.data[payload_len] {
                error!("Checksum mismatch on received frame (ID: 0x{:08X})", frame.id);
                return Err(LinkError::Receive);
            }
            frame.len -= 1;
        }

        Ok(frame)
    }
}

/// 临时强制开启自收模式的 RAII guard
///
/// 自检期间置位 `self_rx` 并保存原值；无论自检在哪条路径上返回
/// （发送失败、接收超时、回复过短、成功），drop 都会恢复原值——
/// 自收状态绝不泄漏出一次失败的自检。
struct SelfRxGuard<'a> {
    config: &'a Mutex<LinkConfig>,
    previous: bool,
}

impl<'a> SelfRxGuard<'a> {
    fn engage(config: &'a Mutex<LinkConfig>) -> Self {
        let mut cfg = config.lock();
        let previous = cfg.self_rx;
        cfg.self_rx = true;
        Self { config, previous }
    }
}

impl Drop for SelfRxGuard<'_> {
    fn drop(&mut self) {
        self.config.lock().self_rx = self.previous;
    }
}

fn install_and_start<C: BusController>(
    controller: &C,
    config: &LinkConfig,
) -> Result<(), LinkError> {
    let timing = config.effective_timing();
    controller
        .install(&config.general(), &timing, &config.filter)
        .map_err(|e| {
            error!("Bus controller install failed: {}", e);
            LinkError::DriverInstall(e.to_string())
        })?;
    controller.start().map_err(|e| {
        error!("Bus controller start failed: {}", e);
        LinkError::DriverStart(e.to_string())
    })?;
    info!("CAN bus started with dynamic configuration");
    Ok(())
}

/// ECU 总线传输层句柄
///
/// - 同步路径：[`send`](Self::send) / [`receive`](Self::receive) /
///   [`process_once`](Self::process_once)
/// - 异步流水线：[`enqueue`](Self::enqueue)（专职消费任务在后台排空）
/// - 诊断：延迟统计、队列状态、总线占用率、碰撞/重发计数、
///   环回自检
///
/// 任意数量的调用线程可以并发使用 `send` / `enqueue` 与各诊断接口；
/// 消费任务在构造时启动，随句柄 drop 排空退出。
pub struct CanLink<C: BusController + 'static> {
    shared: Arc<LinkShared<C>>,
    tx_thread: Option<JoinHandle<()>>,
    rx_thread: Option<JoinHandle<()>>,
}

impl<C: BusController + 'static> std::fmt::Debug for CanLink<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanLink")
            .field("tx_thread", &self.tx_thread)
            .field("rx_thread", &self.rx_thread)
            .finish_non_exhaustive()
    }
}

impl<C: BusController + 'static> CanLink<C> {
    /// 用给定配置初始化传输层
    ///
    /// 推导位时序（未提供自定义时序时按波特率取预置值），安装并启动
    /// 控制器，创建发送队列并启动消费任务。控制器失败映射为
    /// [`LinkError::DriverInstall`] / [`LinkError::DriverStart`]。
    pub fn new(controller: C, config: LinkConfig) -> Result<Self, LinkError> {
        install_and_start(&controller, &config)?;

        let shared = Arc::new(LinkShared {
            controller,
            config: Mutex::new(config),
            metrics: LinkMetrics::new(),
            tx_queue: TxQueue::new(TX_QUEUE_CAPACITY),
            hooks: RwLock::new(HookRegistry::new()),
            tx_priority: AtomicU8::new(pipeline::BASELINE_PRIORITY),
            rx_running: AtomicBool::new(false),
        });

        let tx_shared = shared.clone();
        let tx_thread = thread::Builder::new()
            .name("canlink-tx".into())
            .spawn(move || pipeline::tx_loop(tx_shared))
            .map_err(|e| LinkError::Unknown(format!("failed to spawn TX task: {e}")))?;

        Ok(Self {
            shared,
            tx_thread: Some(tx_thread),
            rx_thread: None,
        })
    }

    // ========================================================================
    // 同步收发路径
    // ========================================================================

    /// 同步发送一帧（阻塞到控制器接受或超时）
    ///
    /// 扩展帧标志恒置位；自收标志取自当前配置；启用校验时追加校验
    /// 字节（8 字节满载帧返回 [`LinkError::InvalidLength`]）。控制器
    /// 失败时先触发发送回调再返回 [`LinkError::Transmit`]。
    pub fn send(&self, id: u32, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > MAX_DATA_LENGTH {
            error!("Invalid data length {} (max {} bytes)", data.len(), MAX_DATA_LENGTH);
            return Err(LinkError::InvalidLength { length: data.len() });
        }
        let frame = LinkFrame::new(id, data);

        let (use_checksum, self_rx, timeout) = {
            let cfg = self.shared.config.lock();
            (cfg.use_checksum, cfg.self_rx, cfg.transmit_timeout())
        };
        let bus_frame = wire_frame(&frame, use_checksum, self_rx)?;

        match self.shared.controller.transmit(&bus_frame, timeout) {
            Err(e) => {
                error!("Failed to transmit frame (ID: 0x{:08X}): {}", id, e);
                self.shared.notify_transmit(&frame, Err(LinkError::Transmit));
                Err(LinkError::Transmit)
            },
            Ok(()) => {
                self.shared.notify_transmit(&frame, Ok(()));
                Ok(())
            },
        }
    }

    /// 同步接收一帧，最多等待 `timeout_ms` 毫秒
    ///
    /// 控制器超时或错误统一返回 [`LinkError::Timeout`]；校验失败返回
    /// [`LinkError::Receive`]（成功时长度已剥除校验字节）。
    pub fn receive(&self, timeout_ms: u64) -> Result<LinkFrame, LinkError> {
        self.shared.receive_frame(timeout_ms)
    }

    /// 轮询一次接收并分发接收回调
    ///
    /// 以固定 10 ms 超时接收；超时静默返回。由调用方自己的轮询循环
    /// 驱动，本身不是任务——需要常驻接收线程时用
    /// [`start_receive_task`](Self::start_receive_task)。
    pub fn process_once(&self) {
        if let Ok(frame) = self.shared.receive_frame(PROCESS_POLL_TIMEOUT_MS) {
            if self.shared.config.lock().debug_level >= 2 {
                info!("Frame received - ID: 0x{:08X}, length: {}", frame.id, frame.len);
            }
            self.shared.notify_received(&frame);
        }
    }

    /// 启动常驻接收任务（幂等）
    ///
    /// 任务以短超时轮询接收并分发回调，句柄 drop 时退出。
    pub fn start_receive_task(&mut self) -> Result<(), LinkError> {
        if self.rx_thread.is_some() {
            return Ok(());
        }
        self.shared.rx_running.store(true, Ordering::Release);
        let rx_shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("canlink-rx".into())
            .spawn(move || pipeline::rx_loop(rx_shared))
            .map_err(|e| LinkError::Unknown(format!("failed to spawn RX task: {e}")))?;
        self.rx_thread = Some(handle);
        Ok(())
    }

    // ========================================================================
    // 异步发送流水线
    // ========================================================================

    /// 入队一帧交给消费任务发送
    ///
    /// 重试计数清零后入队：`high_priority` 插到队首，否则排到队尾。
    /// 队满时阻塞调用方（背压——生产侧绝不静默丢帧）。
    pub fn enqueue(&self, frame: LinkFrame, high_priority: bool) -> Result<(), LinkError> {
        let entry = TxEntry {
            frame,
            retry_count: 0,
        };
        let result = if high_priority {
            self.shared.tx_queue.push_front(entry)
        } else {
            self.shared.tx_queue.push_back(entry)
        };
        result.map_err(|_| LinkError::Unknown("transmit queue is closed".into()))
    }

    // ========================================================================
    // 回调注册
    // ========================================================================

    /// 注册回调
    pub fn add_hook(&self, hook: Arc<dyn LinkHook>) {
        self.shared.hooks.write().add(hook);
    }

    /// 移除所有回调
    pub fn clear_hooks(&self) {
        self.shared.hooks.write().clear();
    }

    // ========================================================================
    // 诊断与指标
    // ========================================================================

    /// 控制器错误计数与 bus-off 状态（直通，无本地计算）
    pub fn diagnostics(&self) -> Result<ControllerStatus, LinkError> {
        self.shared
            .controller
            .status()
            .map_err(|e| LinkError::Unknown(e.to_string()))
    }

    /// 延迟统计的加锁快照
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.shared.metrics.latency_snapshot()
    }

    /// 发送队列状态
    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            waiting: self.shared.tx_queue.len(),
            capacity: self.shared.tx_queue.capacity(),
        }
    }

    /// 总线占用率（百分比，自初始化起的累计值）
    pub fn bus_load(&self) -> u32 {
        self.shared.metrics.bus_load()
    }

    /// 累计碰撞计数（重试事件的代理）
    pub fn collision_count(&self) -> u32 {
        self.shared.metrics.collision_count()
    }

    /// 碰撞率（百分比）
    pub fn collision_rate(&self) -> u32 {
        self.shared.metrics.collision_rate()
    }

    /// 累计重发次数
    pub fn retransmission_count(&self) -> u32 {
        self.shared.metrics.retransmission_count()
    }

    /// 累计发送尝试次数（首发 + 重发）
    pub fn transmission_attempts(&self) -> u32 {
        self.shared.metrics.attempt_count()
    }

    /// 消费任务当前的逻辑优先级
    pub fn tx_task_priority(&self) -> u8 {
        self.shared.tx_priority.load(Ordering::Relaxed)
    }

    /// 当前配置的快照
    pub fn config(&self) -> LinkConfig {
        self.shared.config.lock().clone()
    }

    // ========================================================================
    // 环回自检
    // ========================================================================

    /// 环回自检：测量端到端往返时间（微秒）
    ///
    /// 把当前单调时钟写入 8 字节载荷，临时强制开启自收模式，经同步
    /// 路径以保留标识符 [`SELF_TEST_ID`] 发送，再在 `timeout_ms` 内
    /// 等待回收。往返时间按本地时钟计算。自收标志在任何返回路径上
    /// 都恢复为自检前的值。
    pub fn measure_round_trip_time(&self, timeout_ms: u64) -> Result<i64, LinkError> {
        let send_timestamp_us = self.shared.metrics.epoch_elapsed_us();
        let payload = send_timestamp_us.to_le_bytes();

        let _guard = SelfRxGuard::engage(&self.shared.config);

        self.send(SELF_TEST_ID, &payload)?;
        let reply = self.receive(timeout_ms)?;
        if (reply.len as usize) < payload.len() {
            error!("Self-test reply too short: {} bytes", reply.len);
            return Err(LinkError::Receive);
        }

        let mut echoed = [0u8; 8];
        echoed.copy_from_slice(&reply.data[..8]);
        trace!("Self-test echoed timestamp: {} us", i64::from_le_bytes(echoed));

        let round_trip = self.shared.metrics.epoch_elapsed_us() - send_timestamp_us;
        info!("Self-test round-trip time: {} us", round_trip);
        Ok(round_trip)
    }

    // ========================================================================
    // 配置管理
    // ========================================================================

    /// 整体替换配置：停止并卸载控制器，换入新配置后重新安装启动
    ///
    /// 对在途发送不原子：发送队列与消费任务不会先被排空，重配置
    /// 期间的发送可能失败并进入重试路径。
    pub fn update_config(&self, config: LinkConfig) -> Result<(), LinkError> {
        self.teardown_controller()?;
        *self.shared.config.lock() = config;
        let snapshot = self.shared.config.lock().clone();
        install_and_start(&self.shared.controller, &snapshot)
    }

    /// 更新验收过滤配置
    ///
    /// 控制器运行中无法改写过滤器，因此走完整的卸载-重装路径。
    pub fn set_filter(&self, filter: FilterConfig) -> Result<(), LinkError> {
        self.shared.config.lock().filter = filter;
        info!("New acceptance filter staged, reinitializing controller");
        self.teardown_controller()?;
        let snapshot = self.shared.config.lock().clone();
        install_and_start(&self.shared.controller, &snapshot)
    }

    /// 更新收发超时（纯配置修改，不触碰控制器）
    pub fn set_timeouts(&self, tx_timeout_ms: u64, rx_timeout_ms: u64) {
        let mut cfg = self.shared.config.lock();
        cfg.transmit_timeout_ms = tx_timeout_ms;
        cfg.receive_timeout_ms = rx_timeout_ms;
        info!("Timeouts updated: tx = {} ms, rx = {} ms", tx_timeout_ms, rx_timeout_ms);
    }

    /// 停止并卸载控制器
    ///
    /// 消费任务与队列保持运行，后续发送会失败并进入重试路径，直到
    /// [`update_config`](Self::update_config) 重新启动控制器。
    pub fn deinit(&self) -> Result<(), LinkError> {
        self.teardown_controller()
    }

    fn teardown_controller(&self) -> Result<(), LinkError> {
        self.shared.controller.stop().map_err(|e| {
            error!("Failed to stop CAN bus: {}", e);
            LinkError::DriverStop(e.to_string())
        })?;
        self.shared.controller.uninstall().map_err(|e| {
            error!("Failed to uninstall bus controller: {}", e);
            LinkError::DriverUninstall(e.to_string())
        })?;
        info!("CAN bus deinitialized");
        Ok(())
    }
}

impl<C: BusController + 'static> Drop for CanLink<C> {
    fn drop(&mut self) {
        // 先让两个任务退出，再停控制器：顺序反过来会让仍在发送的
        // 消费任务把停机期间的失败灌进重试路径
        self.shared.rx_running.store(false, Ordering::Release);
        self.shared.tx_queue.close();

        if let Some(handle) = self.tx_thread.take() {
            if handle.join().is_err() {
                error!("TX task panicked during shutdown");
            }
        }
        if let Some(handle) = self.rx_thread.take() {
            if handle.join().is_err() {
                error!("RX task panicked during shutdown");
            }
        }

        // 控制器可能已被显式 deinit 过；停机路径的失败只能记录
        if self.shared.controller.stop().is_ok() {
            let _ = self.shared.controller.uninstall();
        }
    }
}
