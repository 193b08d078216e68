//! 配对数据 kTLV 编解码
//!
//! kTLV 流作为外层 HAP-Param-Value 的值传输，本身也是 TLV8 格式。

use crate::error::HapError;
use crate::protocol::tlv::{decode_tlv_stream, encode_tlv};
use std::collections::BTreeMap;

/// 配对 kTLV 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KtlvType {
    Method,
    Identifier,
    Salt,
    PublicKey,
    Proof,
    EncryptedData,
    State,
    Error,
    RetryDelay,
    Certificate,
    Signature,
    Permissions,
    FragmentData,
    FragmentLast,
    Flags,
    Separator,
    Other(u8),
}

impl KtlvType {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0x00 => KtlvType::Method,
            0x01 => KtlvType::Identifier,
            0x02 => KtlvType::Salt,
            0x03 => KtlvType::PublicKey,
            0x04 => KtlvType::Proof,
            0x05 => KtlvType::EncryptedData,
            0x06 => KtlvType::State,
            0x07 => KtlvType::Error,
            0x08 => KtlvType::RetryDelay,
            0x09 => KtlvType::Certificate,
            0x0A => KtlvType::Signature,
            0x0B => KtlvType::Permissions,
            0x0C => KtlvType::FragmentData,
            0x0D => KtlvType::FragmentLast,
            0x13 => KtlvType::Flags,
            0xFF => KtlvType::Separator,
            other => KtlvType::Other(other),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            KtlvType::Method => 0x00,
            KtlvType::Identifier => 0x01,
            KtlvType::Salt => 0x02,
            KtlvType::PublicKey => 0x03,
            KtlvType::Proof => 0x04,
            KtlvType::EncryptedData => 0x05,
            KtlvType::State => 0x06,
            KtlvType::Error => 0x07,
            KtlvType::RetryDelay => 0x08,
            KtlvType::Certificate => 0x09,
            KtlvType::Signature => 0x0A,
            KtlvType::Permissions => 0x0B,
            KtlvType::FragmentData => 0x0C,
            KtlvType::FragmentLast => 0x0D,
            KtlvType::Flags => 0x13,
            KtlvType::Separator => 0xFF,
            KtlvType::Other(tag) => *tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KtlvType::Method => "kTLVType_Method",
            KtlvType::Identifier => "kTLVType_Identifier",
            KtlvType::Salt => "kTLVType_Salt",
            KtlvType::PublicKey => "kTLVType_PublicKey",
            KtlvType::Proof => "kTLVType_Proof",
            KtlvType::EncryptedData => "kTLVType_EncryptedData",
            KtlvType::State => "kTLVType_State",
            KtlvType::Error => "kTLVType_Error",
            KtlvType::RetryDelay => "kTLVType_RetryDelay",
            KtlvType::Certificate => "kTLVType_Certificate",
            KtlvType::Signature => "kTLVType_Signature",
            KtlvType::Permissions => "kTLVType_Permissions",
            KtlvType::FragmentData => "kTLVType_FragmentData",
            KtlvType::FragmentLast => "kTLVType_FragmentLast",
            KtlvType::Flags => "kTLVType_Flags",
            KtlvType::Separator => "kTLVType_Separator",
            KtlvType::Other(_) => "kTLVType_Unknown",
        }
    }
}

/// 解析后的 kTLV，同类型重复项已按顺序拼接
pub type KtlvMap = BTreeMap<KtlvType, Vec<u8>>;

pub fn encode_ktlvs(ktlvs: &[(KtlvType, Vec<u8>)]) -> Vec<u8> {
    ktlvs
        .iter()
        .flat_map(|(ty, value)| encode_tlv(ty.tag(), value))
        .flatten()
        .collect()
}

pub fn parse_ktlvs(data: &[u8]) -> Result<KtlvMap, HapError> {
    let mut map = KtlvMap::new();
    for chunk in decode_tlv_stream(data) {
        let chunk = chunk.map_err(|e| HapError::PairingProtocol(format!("malformed kTLV: {}", e)))?;
        map.entry(KtlvType::from_u8(chunk.tag))
            .or_default()
            .extend_from_slice(chunk.value);
    }
    Ok(map)
}
