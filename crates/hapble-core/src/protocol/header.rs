//! PDU 头部编解码
//!
//! Control Field 位布局:
//! - bit 7: continuation (续传分片)
//! - bit 1: response (响应)
//! - 其余位保留，必须为 0

use crate::error::HapError;
use crate::protocol::{OpCode, StatusCode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use std::fmt;

const CONTINUATION_BIT: u8 = 0b1000_0000;
const RESPONSE_BIT: u8 = 0b0000_0010;
const RESERVED_MASK: u8 = !(CONTINUATION_BIT | RESPONSE_BIT);

/// 控制字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlField {
    pub continuation: bool,
    pub response: bool,
}

impl ControlField {
    pub fn new(continuation: bool, response: bool) -> Self {
        Self {
            continuation,
            response,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = 0;
        if self.continuation {
            byte |= CONTINUATION_BIT;
        }
        if self.response {
            byte |= RESPONSE_BIT;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Result<Self, HapError> {
        if byte & RESERVED_MASK != 0 {
            return Err(HapError::MalformedHeader(format!(
                "reserved control field bits set: {:08b}",
                byte
            )));
        }
        Ok(Self {
            continuation: byte & CONTINUATION_BIT != 0,
            response: byte & RESPONSE_BIT != 0,
        })
    }
}

/// 特征/服务实例 ID (CID/SID)，线上为 2 字节小端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceId(pub u16);

impl InstanceId {
    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// 从实例 ID 描述符的原始值解析
    pub fn from_descriptor(data: &[u8]) -> Result<Self, HapError> {
        let bytes: [u8; 2] = data.try_into().map_err(|_| {
            HapError::InvalidResponse(format!(
                "instance id descriptor must be 2 bytes, got {}",
                data.len()
            ))
        })?;
        Ok(Self(u16::from_le_bytes(bytes)))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// 请求分片的位置
///
/// 头部本身不可变，continuation 标志由分片器按分片逐个给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentPosition {
    First,
    Continuation,
}

/// HAP-BLE 请求头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub op_code: OpCode,
    pub instance_id: InstanceId,
    pub transaction_id: u8,
}

impl RequestHeader {
    /// 创建请求头，事务 ID 由系统 CSPRNG 随机生成
    pub fn new(op_code: OpCode, instance_id: InstanceId) -> Self {
        let mut tid = [0u8; 1];
        OsRng.fill_bytes(&mut tid);
        Self::with_transaction_id(op_code, instance_id, tid[0])
    }

    pub fn with_transaction_id(op_code: OpCode, instance_id: InstanceId, transaction_id: u8) -> Self {
        Self {
            op_code,
            instance_id,
            transaction_id,
        }
    }

    /// 编码为线上字节；续传分片只携带 control 与 tid
    pub fn encode(&self, position: FragmentPosition) -> Vec<u8> {
        match position {
            FragmentPosition::First => {
                let control = ControlField::new(false, false).to_byte();
                let [lo, hi] = self.instance_id.to_le_bytes();
                vec![control, self.op_code.code(), self.transaction_id, lo, hi]
            }
            FragmentPosition::Continuation => {
                let control = ControlField::new(true, false).to_byte();
                vec![control, self.transaction_id]
            }
        }
    }

    pub fn encoded_len(position: FragmentPosition) -> usize {
        match position {
            FragmentPosition::First => 5,
            FragmentPosition::Continuation => 2,
        }
    }
}

impl fmt::Display for RequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op_code: {:?}, transaction_id: {}, iid: {}",
            self.op_code, self.transaction_id, self.instance_id
        )
    }
}

/// 解码后的请求头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRequest {
    First(RequestHeader),
    Continuation { transaction_id: u8 },
}

impl DecodedRequest {
    pub fn parse(data: &[u8]) -> Result<Self, HapError> {
        let control = ControlField::from_byte(
            *data
                .first()
                .ok_or_else(|| HapError::MalformedHeader("empty request".into()))?,
        )?;
        if control.response {
            return Err(HapError::MalformedHeader(
                "response bit set on a request".into(),
            ));
        }

        if control.continuation {
            let transaction_id = *data
                .get(1)
                .ok_or_else(|| HapError::MalformedHeader("truncated continuation header".into()))?;
            return Ok(DecodedRequest::Continuation { transaction_id });
        }

        if data.len() < 5 {
            return Err(HapError::MalformedHeader(format!(
                "request header needs 5 bytes, got {}",
                data.len()
            )));
        }
        let op_code = OpCode::from_u8(data[1])
            .ok_or_else(|| HapError::MalformedHeader(format!("unknown op code 0x{:02X}", data[1])))?;
        Ok(DecodedRequest::First(RequestHeader {
            op_code,
            transaction_id: data[2],
            instance_id: InstanceId(u16::from_le_bytes([data[3], data[4]])),
        }))
    }
}

/// HAP-BLE 响应头 (固定 3 字节)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub control: ControlField,
    pub transaction_id: u8,
    pub status: StatusCode,
}

impl ResponseHeader {
    pub const LEN: usize = 3;

    pub fn new(transaction_id: u8, status: StatusCode) -> Self {
        Self {
            control: ControlField::new(false, true),
            transaction_id,
            status,
        }
    }

    /// 从响应负载的前 3 字节解析
    pub fn parse(data: &[u8]) -> Result<Self, HapError> {
        if data.len() < Self::LEN {
            return Err(HapError::MalformedHeader(format!(
                "response header needs 3 bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            control: ControlField::from_byte(data[0])?,
            transaction_id: data[1],
            status: StatusCode::from_u8(data[2]),
        })
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.control.to_byte(), self.transaction_id, self.status.code()]
    }
}

impl fmt::Display for ResponseHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "continuation: {}, response: {}, status: {}, transaction_id: {}",
            self.control.continuation, self.control.response, self.status, self.transaction_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_field_roundtrip() {
        for continuation in [false, true] {
            for response in [false, true] {
                let field = ControlField::new(continuation, response);
                assert_eq!(ControlField::from_byte(field.to_byte()).unwrap(), field);
            }
        }
        assert_eq!(ControlField::new(true, true).to_byte(), 0b1000_0010);
    }

    #[test]
    fn test_control_field_reserved_bits() {
        for bit in [0u8, 2, 3, 4, 5, 6] {
            let err = ControlField::from_byte(1 << bit).unwrap_err();
            assert!(matches!(err, HapError::MalformedHeader(_)), "bit {}", bit);
        }
    }

    #[test]
    fn test_request_header_roundtrip() {
        let header =
            RequestHeader::with_transaction_id(OpCode::CharacteristicRead, InstanceId(0x1234), 0x6B);
        let bytes = header.encode(FragmentPosition::First);
        assert_eq!(bytes, vec![0x00, 0x03, 0x6B, 0x34, 0x12]);
        assert_eq!(DecodedRequest::parse(&bytes).unwrap(), DecodedRequest::First(header));
    }

    #[test]
    fn test_continuation_header() {
        let header = RequestHeader::with_transaction_id(OpCode::CharacteristicWrite, InstanceId(7), 9);
        let bytes = header.encode(FragmentPosition::Continuation);
        assert_eq!(bytes, vec![0x80, 9]);
        assert_eq!(
            DecodedRequest::parse(&bytes).unwrap(),
            DecodedRequest::Continuation { transaction_id: 9 }
        );
    }

    #[test]
    fn test_response_header_parse() {
        let header = ResponseHeader::parse(&[0x02, 0x11, 0x00, 0x00, 0x00]).unwrap();
        assert!(header.control.response);
        assert!(!header.control.continuation);
        assert_eq!(header.transaction_id, 0x11);
        assert_eq!(header.status, StatusCode::Success);
        assert_eq!(header.to_bytes(), [0x02, 0x11, 0x00]);

        assert!(matches!(
            ResponseHeader::parse(&[0x02, 0x11]),
            Err(HapError::MalformedHeader(_))
        ));
        assert!(matches!(
            ResponseHeader::parse(&[0x03, 0x11, 0x00]),
            Err(HapError::MalformedHeader(_))
        ));
    }
}
