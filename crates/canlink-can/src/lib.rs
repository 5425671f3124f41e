//! # CanLink 总线控制器抽象层
//!
//! 定义传输层与底层 CAN 控制器之间的统一接口。
//!
//! 驱动层（`canlink-driver`）只依赖 [`BusController`] trait，不关心背后
//! 是片上控制器、USB 转接盒还是测试用的 [`mock::MockController`]。
//!
//! ## 线程模型
//!
//! 控制器被同步发送路径、发送流水线任务以及可选的接收任务并发使用，
//! 因此所有方法都接收 `&self`，实现内部自行做同步（硬件驱动通常本身
//! 就是线程安全的）。上层绝不会在持有自己的锁时调用阻塞的控制器方法。

use std::time::Duration;
use thiserror::Error;

pub mod config;
pub use config::{BitTiming, ControllerMode, FilterConfig, GeneralConfig};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::MockController;

/// 控制器层的线缆帧
///
/// 对应硬件发送/接收寄存器中的一帧：标识符、DLC、数据，外加两个
/// 发送侧标志位。与应用层帧（`canlink-protocol::LinkFrame`）的转换
/// 由驱动层完成（追加校验字节、设置自收标志等）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusFrame {
    /// 标识符（标准帧 11 bit / 扩展帧 29 bit）
    pub id: u32,
    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],
    /// 数据长度码 (0-8)
    pub dlc: u8,
    /// 是否为扩展帧
    pub extended: bool,
    /// 自收标志：置位时控制器将该帧回送到自己的接收队列
    pub self_rx: bool,
}

impl BusFrame {
    /// 有效数据切片
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.dlc.min(8) as usize]
    }
}

/// 控制器错误计数与总线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerStatus {
    /// 发送错误计数器
    pub tx_error_counter: u32,
    /// 接收错误计数器
    pub rx_error_counter: u32,
    /// 是否处于 bus-off 状态（错误过多，节点自行脱离总线）
    pub bus_off: bool,
}

/// 控制器层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller rejected operation: {0}")]
    Controller(String),
    #[error("operation timed out")]
    Timeout,
    #[error("controller is bus-off")]
    BusOff,
    #[error("controller not running")]
    NotRunning,
}

/// 总线控制器接口
///
/// 生命周期：`install` → `start` → (`transmit`/`receive`/`status`)* →
/// `stop` → `uninstall`。所有阻塞方法都带显式超时。
pub trait BusController: Send + Sync {
    /// 安装控制器（分配硬件资源，写入时序与过滤配置）
    fn install(
        &self,
        general: &GeneralConfig,
        timing: &BitTiming,
        filter: &FilterConfig,
    ) -> Result<(), BusError>;

    /// 启动控制器，使其参与总线通信
    fn start(&self) -> Result<(), BusError>;

    /// 停止控制器（保留配置，可再次 `start`）
    fn stop(&self) -> Result<(), BusError>;

    /// 卸载控制器，释放硬件资源
    fn uninstall(&self) -> Result<(), BusError>;

    /// 阻塞发送一帧，最多等待 `timeout`
    fn transmit(&self, frame: &BusFrame, timeout: Duration) -> Result<(), BusError>;

    /// 阻塞接收一帧，最多等待 `timeout`
    fn receive(&self, timeout: Duration) -> Result<BusFrame, BusError>;

    /// 读取错误计数器与 bus-off 状态
    fn status(&self) -> Result<ControllerStatus, BusError>;
}
