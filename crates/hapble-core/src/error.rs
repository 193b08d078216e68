//! 错误类型
//!
//! `TransportError` 来自 GATT 传输层，是唯一可重试的错误；
//! 其余 `HapError` 变体均为解码/校验失败，对当前操作是致命的。

use crate::protocol::StatusCode;
use uuid::Uuid;

/// GATT 传输层错误
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No Bluetooth adapters found")]
    NoAdapter,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Descriptor {descriptor} not found on characteristic {characteristic}")]
    DescriptorNotFound { characteristic: Uuid, descriptor: Uuid },

    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

/// HAP-BLE 协议错误
#[derive(Debug, thiserror::Error)]
pub enum HapError {
    #[error("Malformed PDU header: {0}")]
    MalformedHeader(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid transaction ID {actual}, expected {expected}")]
    TransactionMismatch { expected: u8, actual: u8 },

    #[error("Invalid body length {actual}, expected {declared}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Accessory returned status {0}")]
    ProtocolStatus(StatusCode),

    #[error("TLV chunk of {len} bytes does not fit in a {budget} byte fragment")]
    FragmentTooLarge { len: usize, budget: usize },

    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    #[error("Pairing error: {0}")]
    PairingProtocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl HapError {
    /// 是否为可通过重连恢复的传输错误
    pub fn is_transport(&self) -> bool {
        matches!(self, HapError::Transport(_))
    }
}
