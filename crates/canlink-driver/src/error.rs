//! 传输层错误类型定义

use thiserror::Error;

/// 传输层错误类型
///
/// 校验类错误（[`InvalidLength`](LinkError::InvalidLength)）在调用边界
/// 直接返回，绝不重试；发送失败在流水线内部按固定上限重试，只有重试
/// 耗尽才通过发送回调上报；控制器生命周期错误对发起操作是致命的，
/// 由调用方决定是否重新初始化。没有任何错误会升级为进程级中止。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// 数据长度非法（超过 8 字节，或启用校验时没有校验字节的空间）
    #[error("invalid data length: {length} (max 8 bytes including checksum)")]
    InvalidLength { length: usize },

    /// 控制器发送失败（含发送超时）
    #[error("failed to transmit frame")]
    Transmit,

    /// 接收失败（含校验和不匹配）
    #[error("failed to receive frame or checksum mismatch")]
    Receive,

    /// 控制器安装失败
    #[error("bus controller install failed: {0}")]
    DriverInstall(String),

    /// 控制器启动失败
    #[error("bus controller start failed: {0}")]
    DriverStart(String),

    /// 控制器停止失败
    #[error("bus controller stop failed: {0}")]
    DriverStop(String),

    /// 控制器卸载失败
    #[error("bus controller uninstall failed: {0}")]
    DriverUninstall(String),

    /// 接收超时（含控制器接收错误）
    #[error("operation timed out")]
    Timeout,

    /// 资源创建或其他未分类失败
    #[error("unknown error: {0}")]
    Unknown(String),
}
