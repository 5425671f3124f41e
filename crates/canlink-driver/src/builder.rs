//! 传输层构建器
//!
//! 在 [`LinkConfig::default`] 之上做链式修改，最后连同控制器一起
//! 构建出 [`CanLink`]。

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::CanLink;
use canlink_can::{BitTiming, BusController, ControllerMode, FilterConfig};

/// [`CanLink`] 构建器
///
/// # 示例
///
/// ```rust,no_run
/// # use canlink_driver::LinkBuilder;
/// # use canlink_can::MockController;
/// let link = LinkBuilder::new()
///     .bitrate(500_000)
///     .use_checksum(true)
///     .build(MockController::new())
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkBuilder {
    config: LinkConfig,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 总线波特率 (bit/s)
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.config.bitrate = bitrate;
        self
    }

    /// TX/RX 引脚
    pub fn pins(mut self, tx_pin: u8, rx_pin: u8) -> Self {
        self.config.tx_pin = tx_pin;
        self.config.rx_pin = rx_pin;
        self
    }

    /// 收发超时（毫秒）
    pub fn timeouts_ms(mut self, tx_timeout_ms: u64, rx_timeout_ms: u64) -> Self {
        self.config.transmit_timeout_ms = tx_timeout_ms;
        self.config.receive_timeout_ms = rx_timeout_ms;
        self
    }

    /// 验收过滤配置
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    /// 控制器工作模式
    pub fn mode(mut self, mode: ControllerMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// 自定义位时序（覆盖按波特率推导的预置值）
    pub fn custom_timing(mut self, timing: BitTiming) -> Self {
        self.config.custom_timing = Some(timing);
        self
    }

    /// 控制器硬件级自动重发
    pub fn auto_retransmit(mut self, enabled: bool) -> Self {
        self.config.auto_retransmit = enabled;
        self
    }

    /// 调试输出等级
    pub fn debug_level(mut self, level: u8) -> Self {
        self.config.debug_level = level;
        self
    }

    /// 自收模式
    pub fn self_rx(mut self, enabled: bool) -> Self {
        self.config.self_rx = enabled;
        self
    }

    /// XOR 校验字节
    pub fn use_checksum(mut self, enabled: bool) -> Self {
        self.config.use_checksum = enabled;
        self
    }

    /// 当前累积的配置
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// 用累积的配置初始化传输层
    pub fn build<C: BusController + 'static>(self, controller: C) -> Result<CanLink<C>, LinkError> {
        CanLink::new(controller, self.config)
    }
}
