//! 传输层动态配置
//!
//! [`LinkConfig`] 是所有组件共同消费的配置记录，由 `CanLink` 持有并用
//! 互斥锁保护：读方复制出一致的快照，写方通过 `update_config` /
//! `set_filter` / `set_timeouts` 修改。任何组件都不会在持锁状态下调用
//! 阻塞的控制器方法。

use canlink_can::{BitTiming, ControllerMode, FilterConfig, GeneralConfig};
use std::time::Duration;

/// 默认 TX 引脚
pub const DEFAULT_TX_PIN: u8 = 5;
/// 默认 RX 引脚
pub const DEFAULT_RX_PIN: u8 = 4;
/// 默认波特率 (1 Mbit/s)
pub const DEFAULT_BITRATE: u32 = 1_000_000;
/// 默认发送超时（毫秒）
pub const DEFAULT_TRANSMIT_TIMEOUT_MS: u64 = 1000;
/// 默认接收超时（毫秒）
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1000;

/// 传输层配置记录
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkConfig {
    /// 总线波特率 (bit/s)
    pub bitrate: u32,
    /// TX 引脚号
    pub tx_pin: u8,
    /// RX 引脚号
    pub rx_pin: u8,
    /// 同步发送与流水线发送共用的发送超时（毫秒）
    pub transmit_timeout_ms: u64,
    /// 默认接收超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 验收过滤配置
    pub filter: FilterConfig,
    /// 控制器工作模式
    pub mode: ControllerMode,
    /// 自定义位时序；`None` 时按 `bitrate` 取预置时序
    pub custom_timing: Option<BitTiming>,
    /// 控制器硬件级自动重发
    pub auto_retransmit: bool,
    /// 调试输出等级（>= 2 时打印逐帧日志）
    pub debug_level: u8,
    /// 自收模式：发出的帧回送到自己的接收队列（环回自检依赖此项）
    pub self_rx: bool,
    /// 是否启用 XOR 校验字节
    pub use_checksum: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            tx_pin: DEFAULT_TX_PIN,
            rx_pin: DEFAULT_RX_PIN,
            transmit_timeout_ms: DEFAULT_TRANSMIT_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            filter: FilterConfig::accept_all(),
            mode: ControllerMode::NoAck,
            custom_timing: None,
            auto_retransmit: true,
            debug_level: 2,
            self_rx: false,
            use_checksum: false,
        }
    }
}

impl LinkConfig {
    /// 生效的位时序：自定义时序优先，否则按波特率推导
    pub fn effective_timing(&self) -> BitTiming {
        self.custom_timing
            .unwrap_or_else(|| BitTiming::for_bitrate(self.bitrate))
    }

    /// 控制器通用配置
    pub fn general(&self) -> GeneralConfig {
        GeneralConfig {
            tx_pin: self.tx_pin,
            rx_pin: self.rx_pin,
            mode: self.mode,
        }
    }

    /// 发送超时
    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }

    /// 接收超时
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.bitrate, 1_000_000);
        assert_eq!(cfg.transmit_timeout_ms, 1000);
        assert_eq!(cfg.receive_timeout_ms, 1000);
        assert_eq!(cfg.mode, ControllerMode::NoAck);
        assert!(cfg.auto_retransmit);
        assert!(!cfg.self_rx);
        assert!(!cfg.use_checksum);
        assert!(cfg.custom_timing.is_none());
    }

    #[test]
    fn test_effective_timing_prefers_custom() {
        let custom = BitTiming {
            brp: 10,
            tseg1: 12,
            tseg2: 3,
            sjw: 2,
            triple_sampling: true,
        };
        let cfg = LinkConfig {
            custom_timing: Some(custom),
            ..Default::default()
        };
        assert_eq!(cfg.effective_timing(), custom);
    }

    #[test]
    fn test_effective_timing_derives_from_bitrate() {
        let cfg = LinkConfig {
            bitrate: 500_000,
            ..Default::default()
        };
        assert_eq!(cfg.effective_timing(), BitTiming::for_bitrate(500_000));
    }
}
