//! 29-bit 标识符的编码/解码
//!
//! 标识符由三个字段打包而成：
//!
//! - `priority`: 3 bit（0-7，数值越大越紧急，占据最高位以参与总线仲裁）
//! - `module`: 10 bit（0-1023，目标/源 ECU 模块号）
//! - `command`: 16 bit（命令或信号编号）
//!
//! 超出字段宽度的输入位会被静默截断（与既有 ECU 固件保持一致，
//! 调用方如需校验应在上层进行）。

/// priority 字段宽度掩码
pub const PRIORITY_MASK: u32 = 0x07;
/// module 字段宽度掩码
pub const MODULE_MASK: u32 = 0x03FF;
/// command 字段宽度掩码
pub const COMMAND_MASK: u32 = 0xFFFF;

/// priority 字段在标识符中的位偏移
pub const PRIORITY_SHIFT: u32 = 26;
/// module 字段在标识符中的位偏移
pub const MODULE_SHIFT: u32 = 16;

/// 环回自检使用的保留标识符
pub const SELF_TEST_ID: u32 = 0x0F00_0001;

/// 三字段消息标识符
///
/// `encode`/`decode` 互为逆运算：对于掩码范围内的字段值，
/// `MessageId::decode(id.encode()) == id` 恒成立。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageId {
    /// 仲裁优先级 (0-7)
    pub priority: u8,
    /// ECU 模块号 (0-1023)
    pub module: u16,
    /// 命令编号 (0-65535)
    pub command: u16,
}

impl MessageId {
    /// 创建标识符（字段值在 `encode` 时截断到各自宽度）
    pub fn new(priority: u8, module: u16, command: u16) -> Self {
        Self {
            priority,
            module,
            command,
        }
    }

    /// 打包为 29-bit 线缆标识符
    pub fn encode(&self) -> u32 {
        ((u32::from(self.priority) & PRIORITY_MASK) << PRIORITY_SHIFT)
            | ((u32::from(self.module) & MODULE_MASK) << MODULE_SHIFT)
            | (u32::from(self.command) & COMMAND_MASK)
    }

    /// 从线缆标识符解包
    pub fn decode(id: u32) -> Self {
        Self {
            priority: ((id >> PRIORITY_SHIFT) & PRIORITY_MASK) as u8,
            module: ((id >> MODULE_SHIFT) & MODULE_MASK) as u16,
            command: (id & COMMAND_MASK) as u16,
        }
    }
}
