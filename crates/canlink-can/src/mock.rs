//! Mock 总线控制器
//!
//! 无硬件依赖的 [`BusController`] 实现，用于驱动层的测试和示例：
//!
//! - 发送的帧被记录下来供断言（连同每次尝试的时刻，用于验证退避间隔）
//! - 可注入发送失败（接下来 N 次 / 全部）和发送耗时
//! - 置位 `self_rx` 的帧会被回送到接收队列，模拟硬件自收模式
//! - `receive` 在队列为空时真实阻塞（条件变量 + 超时）
//!
//! `MockController` 是句柄：`clone` 共享同一份内部状态，一份交给
//! 驱动层持有，另一份留在测试里做注入与断言。

use crate::{BitTiming, BusController, BusError, BusFrame, ControllerStatus, FilterConfig, GeneralConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    installed: bool,
    running: bool,
    install_count: u32,
    start_count: u32,
    stop_count: u32,
    uninstall_count: u32,
    last_timing: Option<BitTiming>,
    last_filter: Option<FilterConfig>,
    rx_queue: VecDeque<BusFrame>,
    transmitted: Vec<BusFrame>,
    transmit_instants: Vec<Instant>,
    fail_next_transmits: u32,
    fail_all_transmits: bool,
    fail_install: bool,
    fail_start: bool,
    transmit_delay: Duration,
    status: ControllerStatus,
}

struct Shared {
    inner: Mutex<Inner>,
    rx_ready: Condvar,
}

/// 可脚本化的 mock 控制器（可克隆句柄）
#[derive(Clone)]
pub struct MockController {
    shared: Arc<Shared>,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                rx_ready: Condvar::new(),
            }),
        }
    }

    /// 向接收队列注入一帧（模拟总线上到达的流量）
    pub fn push_rx(&self, frame: BusFrame) {
        let mut inner = self.shared.inner.lock();
        inner.rx_queue.push_back(frame);
        self.shared.rx_ready.notify_all();
    }

    /// 已成功发送的帧
    pub fn transmitted(&self) -> Vec<BusFrame> {
        self.shared.inner.lock().transmitted.clone()
    }

    /// 每次 `transmit` 调用（含失败）的时刻
    pub fn transmit_instants(&self) -> Vec<Instant> {
        self.shared.inner.lock().transmit_instants.clone()
    }

    /// `transmit` 被调用的总次数（含失败）
    pub fn transmit_attempts(&self) -> usize {
        self.shared.inner.lock().transmit_instants.len()
    }

    /// 注入：接下来 `n` 次 `transmit` 返回错误
    pub fn fail_next_transmits(&self, n: u32) {
        self.shared.inner.lock().fail_next_transmits = n;
    }

    /// 注入：所有 `transmit` 返回错误
    pub fn fail_all_transmits(&self, fail: bool) {
        self.shared.inner.lock().fail_all_transmits = fail;
    }

    /// 注入：下一次 `install` 失败
    pub fn fail_install(&self, fail: bool) {
        self.shared.inner.lock().fail_install = fail;
    }

    /// 注入：下一次 `start` 失败
    pub fn fail_start(&self, fail: bool) {
        self.shared.inner.lock().fail_start = fail;
    }

    /// 注入：每次成功发送耗时 `delay`（模拟慢总线，用于占用率/背压测试）
    pub fn set_transmit_delay(&self, delay: Duration) {
        self.shared.inner.lock().transmit_delay = delay;
    }

    /// 设定 `status()` 返回的诊断值
    pub fn set_status(&self, status: ControllerStatus) {
        self.shared.inner.lock().status = status;
    }

    pub fn install_count(&self) -> u32 {
        self.shared.inner.lock().install_count
    }

    pub fn is_running(&self) -> bool {
        self.shared.inner.lock().running
    }

    /// 最近一次 `install` 收到的过滤配置
    pub fn last_filter(&self) -> Option<FilterConfig> {
        self.shared.inner.lock().last_filter
    }

    /// 最近一次 `install` 收到的时序配置
    pub fn last_timing(&self) -> Option<BitTiming> {
        self.shared.inner.lock().last_timing
    }
}

impl BusController for MockController {
    fn install(
        &self,
        _general: &GeneralConfig,
        timing: &BitTiming,
        filter: &FilterConfig,
    ) -> Result<(), BusError> {
        let mut inner = self.shared.inner.lock();
        if inner.fail_install {
            return Err(BusError::Controller("injected install failure".into()));
        }
        if inner.installed {
            return Err(BusError::Controller("already installed".into()));
        }
        inner.installed = true;
        inner.install_count += 1;
        inner.last_timing = Some(*timing);
        inner.last_filter = Some(*filter);
        Ok(())
    }

    fn start(&self) -> Result<(), BusError> {
        let mut inner = self.shared.inner.lock();
        if inner.fail_start {
            return Err(BusError::Controller("injected start failure".into()));
        }
        if !inner.installed {
            return Err(BusError::Controller("not installed".into()));
        }
        inner.running = true;
        inner.start_count += 1;
        Ok(())
    }

    fn stop(&self) -> Result<(), BusError> {
        let mut inner = self.shared.inner.lock();
        if !inner.running {
            return Err(BusError::NotRunning);
        }
        inner.running = false;
        inner.stop_count += 1;
        // 唤醒阻塞在 receive 上的线程，让它们看到停止状态
        self.shared.rx_ready.notify_all();
        Ok(())
    }

    fn uninstall(&self) -> Result<(), BusError> {
        let mut inner = self.shared.inner.lock();
        if !inner.installed {
            return Err(BusError::Controller("not installed".into()));
        }
        if inner.running {
            return Err(BusError::Controller("still running".into()));
        }
        inner.installed = false;
        inner.uninstall_count += 1;
        Ok(())
    }

    fn transmit(&self, frame: &BusFrame, _timeout: Duration) -> Result<(), BusError> {
        let delay;
        {
            let mut inner = self.shared.inner.lock();
            if !inner.running {
                return Err(BusError::NotRunning);
            }
            inner.transmit_instants.push(Instant::now());
            if inner.fail_all_transmits || inner.fail_next_transmits > 0 {
                if inner.fail_next_transmits > 0 {
                    inner.fail_next_transmits -= 1;
                }
                return Err(BusError::Controller("injected transmit failure".into()));
            }
            delay = inner.transmit_delay;
        }
        // 在锁外模拟发送耗时，避免卡住并发的 receive/注入调用
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut inner = self.shared.inner.lock();
        inner.transmitted.push(*frame);
        if frame.self_rx {
            inner.rx_queue.push_back(*frame);
            self.shared.rx_ready.notify_all();
        }
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<BusFrame, BusError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if !inner.running {
                return Err(BusError::NotRunning);
            }
            if let Some(frame) = inner.rx_queue.pop_front() {
                return Ok(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BusError::Timeout);
            }
            self.shared.rx_ready.wait_for(&mut inner, deadline - now);
        }
    }

    fn status(&self) -> Result<ControllerStatus, BusError> {
        Ok(self.shared.inner.lock().status)
    }
}
