//! HAP-BLE PDU 协议层
//!
//! PDU 格式:
//! - 请求: `control | opcode | tid | iid(2) | body_len(2) | TLV...`
//! - 续传请求: `control | tid | body_len(2) | TLV...`
//! - 响应: `control | tid | status | [body_len(2) | TLV...]`

pub mod format;
pub mod fragment;
pub mod header;
pub mod ktlv;
pub mod params;
pub mod tlv;

use serde::Serialize;
use std::fmt;

pub use format::{HapFormat, HapUnit, HapValue, PresentationFormat};
pub use fragment::{Fragment, fragment_request};
pub use header::{
    ControlField, DecodedRequest, FragmentPosition, InstanceId, RequestHeader, ResponseHeader,
};
pub use ktlv::{KtlvMap, KtlvType};
pub use params::{Parameter, ParamType};

/// 单次 GATT 写入的最大字节数
pub const MAX_PDU_LEN: usize = 512;

/// HAP 操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum OpCode {
    CharacteristicSignatureRead = 0x01,
    CharacteristicWrite = 0x02,
    CharacteristicRead = 0x03,
    CharacteristicTimedWrite = 0x04,
    CharacteristicExecuteWrite = 0x05,
    ServiceSignatureRead = 0x06,
    CharacteristicConfiguration = 0x07,
    ProtocolConfiguration = 0x08,
}

impl OpCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => OpCode::CharacteristicSignatureRead,
            0x02 => OpCode::CharacteristicWrite,
            0x03 => OpCode::CharacteristicRead,
            0x04 => OpCode::CharacteristicTimedWrite,
            0x05 => OpCode::CharacteristicExecuteWrite,
            0x06 => OpCode::ServiceSignatureRead,
            0x07 => OpCode::CharacteristicConfiguration,
            0x08 => OpCode::ProtocolConfiguration,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// 响应头中的 HAP 状态码
///
/// 配件可能返回本枚举未列出的错误码，保存在 `Other` 中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusCode {
    Success,
    UnsupportedPdu,
    MaxProcedures,
    InsufficientAuthorization,
    InvalidInstanceId,
    InsufficientAuthentication,
    InvalidRequest,
    Other(u8),
}

impl StatusCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => StatusCode::Success,
            0x01 => StatusCode::UnsupportedPdu,
            0x02 => StatusCode::MaxProcedures,
            0x03 => StatusCode::InsufficientAuthorization,
            0x04 => StatusCode::InvalidInstanceId,
            0x05 => StatusCode::InsufficientAuthentication,
            0x06 => StatusCode::InvalidRequest,
            other => StatusCode::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            StatusCode::Success => 0x00,
            StatusCode::UnsupportedPdu => 0x01,
            StatusCode::MaxProcedures => 0x02,
            StatusCode::InsufficientAuthorization => 0x03,
            StatusCode::InvalidInstanceId => 0x04,
            StatusCode::InsufficientAuthentication => 0x05,
            StatusCode::InvalidRequest => 0x06,
            StatusCode::Other(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::UnsupportedPdu => "Unsupported-PDU",
            StatusCode::MaxProcedures => "Max-Procedures",
            StatusCode::InsufficientAuthorization => "Insufficient-Authorization",
            StatusCode::InvalidInstanceId => "Invalid-Instance-ID",
            StatusCode::InsufficientAuthentication => "Insufficient-Authentication",
            StatusCode::InvalidRequest => "Invalid-Request",
            StatusCode::Other(_) => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_codes() {
        for code in 0x01..=0x08u8 {
            assert_eq!(OpCode::from_u8(code).unwrap().code(), code);
        }
        assert!(OpCode::from_u8(0x00).is_none());
        assert!(OpCode::from_u8(0x09).is_none());
    }

    #[test]
    fn test_status_display() {
        let status = StatusCode::from_u8(0x04);
        assert_eq!(status, StatusCode::InvalidInstanceId);
        assert_eq!(status.to_string(), "Invalid-Instance-ID (0x04)");
        assert_eq!(StatusCode::from_u8(0x42), StatusCode::Other(0x42));
        assert_eq!(StatusCode::Other(0x42).code(), 0x42);
    }
}
