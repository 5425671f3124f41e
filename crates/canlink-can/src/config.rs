//! 控制器侧配置类型
//!
//! 这些结构体在 `install` 时一次性写入控制器。运行期间不可变更——
//! 过滤器等配置的修改需要走驱动层的完整重初始化路径。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::warn;

/// 控制器工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControllerMode {
    /// 正常模式：参与仲裁并应答
    Normal = 0,
    /// 不应答模式：发送后不要求 ACK（单节点调试常用）
    #[default]
    NoAck = 1,
    /// 只听模式：不发送任何显性位
    ListenOnly = 2,
}

/// 控制器通用配置（引脚与模式）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneralConfig {
    /// TX 引脚号
    pub tx_pin: u8,
    /// RX 引脚号
    pub rx_pin: u8,
    /// 工作模式
    pub mode: ControllerMode,
}

/// 位时序配置
///
/// 常用波特率直接使用 [`BitTiming::for_bitrate`] 的预置值；
/// 特殊晶振/波特率组合可手工构造后通过驱动层的 `custom_timing` 下发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitTiming {
    /// 波特率预分频
    pub brp: u16,
    /// 时间段 1（采样点前）
    pub tseg1: u8,
    /// 时间段 2（采样点后）
    pub tseg2: u8,
    /// 同步跳转宽度
    pub sjw: u8,
    /// 是否三重采样
    pub triple_sampling: bool,
}

impl BitTiming {
    const fn preset(brp: u16) -> Self {
        Self {
            brp,
            tseg1: 15,
            tseg2: 4,
            sjw: 3,
            triple_sampling: false,
        }
    }

    /// 按波特率返回预置时序
    ///
    /// 支持 1 M / 800 k / 500 k / 250 k / 125 k；未知波特率回退到
    /// 1 Mbit/s 并打印警告。
    pub fn for_bitrate(bitrate: u32) -> Self {
        match bitrate {
            1_000_000 => Self::preset(4),
            800_000 => Self {
                brp: 4,
                tseg1: 16,
                tseg2: 8,
                sjw: 3,
                triple_sampling: false,
            },
            500_000 => Self::preset(8),
            250_000 => Self::preset(16),
            125_000 => Self::preset(32),
            other => {
                warn!("Unsupported bitrate {} bps, falling back to 1 Mbit/s", other);
                Self::preset(4)
            },
        }
    }
}

/// 验收过滤配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterConfig {
    /// 验收码
    pub acceptance_code: u32,
    /// 验收掩码（置 1 的位不参与比较）
    pub acceptance_mask: u32,
    /// 是否使用单过滤器模式
    pub single_filter: bool,
}

impl FilterConfig {
    /// 接收所有帧
    pub const fn accept_all() -> Self {
        Self {
            acceptance_code: 0,
            acceptance_mask: u32::MAX,
            single_filter: true,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::accept_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_mode_u8_roundtrip() {
        assert_eq!(u8::from(ControllerMode::Normal), 0);
        assert_eq!(u8::from(ControllerMode::NoAck), 1);
        assert_eq!(u8::from(ControllerMode::ListenOnly), 2);
        assert_eq!(ControllerMode::try_from(2u8), Ok(ControllerMode::ListenOnly));
        assert!(ControllerMode::try_from(3u8).is_err());
    }

    #[test]
    fn test_for_bitrate_presets() {
        assert_eq!(BitTiming::for_bitrate(1_000_000).brp, 4);
        assert_eq!(BitTiming::for_bitrate(500_000).brp, 8);
        assert_eq!(BitTiming::for_bitrate(250_000).brp, 16);
        assert_eq!(BitTiming::for_bitrate(125_000).brp, 32);
    }

    #[test]
    fn test_for_bitrate_unknown_falls_back_to_1m() {
        assert_eq!(
            BitTiming::for_bitrate(33_333),
            BitTiming::for_bitrate(1_000_000)
        );
    }

    #[test]
    fn test_accept_all_mask() {
        let filter = FilterConfig::accept_all();
        assert_eq!(filter.acceptance_mask, u32::MAX);
        assert!(filter.single_filter);
    }
}
