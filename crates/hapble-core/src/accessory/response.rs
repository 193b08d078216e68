//! 响应校验与 body 解析
//!
//! 校验顺序固定：response 位 → 事务 ID → 状态码 → body 长度。

use crate::error::HapError;
use crate::protocol::format::decode_with;
use crate::protocol::params::Decoding;
use crate::protocol::tlv::decode_tlv_stream;
use crate::protocol::{
    HapFormat, HapValue, ParamType, PresentationFormat, RequestHeader, ResponseHeader, StatusCode,
};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

pub const HAP_FORMAT: &str = "hap_format";
pub const HAP_FORMAT_CONVERTER: &str = "hap_format_converter";
pub const HAP_UNIT: &str = "hap_unit";
pub const MIN_VALUE: &str = "min_value";
pub const MAX_VALUE: &str = "max_value";

/// 一次响应解析出的属性 (名称 → 值)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, HapValue>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&HapValue> {
        self.0.get(name)
    }

    /// `value` 属性
    pub fn value(&self) -> Option<&HapValue> {
        self.get(ParamType::Value.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HapValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, name: &str, value: HapValue) {
        debug!("TLV found in response. {}: {:?}", name, value);
        self.0.insert(name.to_string(), value);
    }

    /// 用新值覆盖同名属性
    pub(crate) fn merge(&mut self, other: &AttributeMap) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }
}

/// 校验响应并返回 body (可能为空)
pub fn validate_response<'a>(
    request: &RequestHeader,
    response: &'a [u8],
) -> Result<(ResponseHeader, &'a [u8]), HapError> {
    let header = ResponseHeader::parse(response)?;

    if !header.control.response {
        return Err(HapError::InvalidResponse(format!(
            "control field 0x{:02X} is not a response",
            header.control.to_byte()
        )));
    }
    if header.transaction_id != request.transaction_id {
        return Err(HapError::TransactionMismatch {
            expected: request.transaction_id,
            actual: header.transaction_id,
        });
    }
    if header.status != StatusCode::Success {
        return Err(HapError::ProtocolStatus(header.status));
    }

    let rest = &response[ResponseHeader::LEN..];
    if rest.is_empty() {
        return Ok((header, rest));
    }
    if rest.len() < 2 {
        return Err(HapError::LengthMismatch {
            declared: 2,
            actual: rest.len(),
        });
    }
    let declared = u16::from_le_bytes([rest[0], rest[1]]) as usize;
    let body = &rest[2..];
    if body.len() != declared {
        return Err(HapError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok((header, body))
}

/// 解析结果：属性表与解析后生效的格式
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody {
    pub attributes: AttributeMap,
    pub format: Option<HapFormat>,
}

/// 解析响应 body
///
/// 同一 tag 的多个分块先按顺序拼接原始字节，遍历结束后按首次出现的顺序统一解码。
/// Presentation Format 只影响排在它之后的 value/范围。
pub fn parse_body(body: &[u8], format: Option<HapFormat>) -> Result<ParsedBody, HapError> {
    let mut pending: Vec<(ParamType, Vec<u8>)> = Vec::new();

    for chunk in decode_tlv_stream(body) {
        let chunk = chunk?;
        let param = ParamType::from_u8(chunk.tag).ok_or_else(|| {
            HapError::InvalidResponse(format!("unknown parameter type 0x{:02X}", chunk.tag))
        })?;
        match pending.iter_mut().find(|(p, _)| *p == param) {
            Some((_, bytes)) => {
                debug!("Duplicate TLV Param Type found: {}. Appending.", param.name());
                bytes.extend_from_slice(chunk.value);
            }
            None => pending.push((param, chunk.value.to_vec())),
        }
    }

    let mut attributes = AttributeMap::new();
    let mut format = format;

    for (param, bytes) in &pending {
        match param.decoding() {
            Decoding::PresentationFormat => {
                let descriptor = PresentationFormat::parse(bytes)?;
                let new_format = descriptor.format()?;
                attributes.insert(HAP_FORMAT, HapValue::String(new_format.name().to_string()));
                attributes.insert(HAP_FORMAT_CONVERTER, HapValue::Format(new_format));
                attributes.insert(HAP_UNIT, HapValue::String(descriptor.unit()?.name().to_string()));
                format = Some(new_format);
            }
            Decoding::ActiveFormat => attributes.insert(param.name(), decode_with(format, bytes)?),
            Decoding::ValidRange => {
                let (low, high) = bytes.split_at(bytes.len() / 2);
                attributes.insert(MIN_VALUE, decode_with(format, low)?);
                attributes.insert(MAX_VALUE, decode_with(format, high)?);
            }
            Decoding::Fixed(decode) => attributes.insert(param.name(), decode(bytes)?),
        }
    }

    Ok(ParsedBody { attributes, format })
}
