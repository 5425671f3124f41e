//! # CanLink Protocol
//!
//! ECU 总线传输层的线缆格式定义（无硬件依赖）。
//!
//! ## 模块
//!
//! - `ids`: 29-bit 标识符的编码/解码（优先级 / 模块 / 命令三字段）
//! - `checksum`: 可选的 XOR 校验和
//!
//! ## 标识符布局
//!
//! 扩展帧标识符共 29 bit，按高位到低位依次为：
//!
//! ```text
//! | priority (3 bit) | module (10 bit) | command (16 bit) |
//! ```

pub mod checksum;
pub mod ids;

pub use checksum::xor_checksum;
pub use ids::{MessageId, SELF_TEST_ID};

/// 单帧最大数据长度（CAN 2.0 经典帧）
pub const MAX_DATA_LENGTH: usize = 8;

/// 应用层 CAN 帧的统一抽象
///
/// # 设计目的
///
/// `LinkFrame` 是应用层和硬件层之间的中间抽象：
/// - **层次解耦**：上层不依赖具体总线控制器的帧表示
/// - **Copy trait**：零成本复制，适合高频发送场景
/// - **固定 8 字节**：避免堆分配
///
/// 重试计数不属于帧本身——它由发送流水线的队列条目持有，
/// 帧在队列槽、消费任务和调用方之间整体移动，不跨线程共享。
///
/// # 示例
///
/// ```rust
/// use canlink_protocol::LinkFrame;
///
/// let frame = LinkFrame::new(0x0C01_0042, &[1, 2, 3, 4]);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
/// assert_eq!(frame.len, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkFrame {
    /// 29-bit 扩展标识符（见 [`ids`]）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; MAX_DATA_LENGTH],

    /// 有效数据长度 (0-8)
    pub len: u8,
}

impl LinkFrame {
    /// 创建新帧，超过 8 字节的数据会被截断
    pub fn new(id: u32, data: &[u8]) -> Self {
        let mut fixed = [0u8; MAX_DATA_LENGTH];
        let len = data.len().min(MAX_DATA_LENGTH);
        fixed[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed,
            len: len as u8,
        }
    }

    /// 按三字段标识符创建帧
    pub fn with_message_id(id: MessageId, data: &[u8]) -> Self {
        Self::new(id.encode(), data)
    }

    /// 获取有效数据切片
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 解出三字段标识符
    pub fn message_id(&self) -> MessageId {
        MessageId::decode(self.id)
    }
}
