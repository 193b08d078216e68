//! HAP-Param 参数类型与参数列表编码

use crate::error::HapError;
use crate::protocol::format::{HapValue, utf8};
use crate::protocol::tlv::encode_tlv;
use uuid::Uuid;

/// HAP-Param 类型 (PDU body 中的 TLV tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ParamType {
    Value = 0x01,
    AdditionalAuthorizationData = 0x02,
    Origin = 0x03,
    CharacteristicType = 0x04,
    CharacteristicInstanceId = 0x05,
    ServiceType = 0x06,
    ServiceInstanceId = 0x07,
    Ttl = 0x08,
    ReturnResponse = 0x09,
    HapCharacteristicPropertiesDescriptor = 0x0A,
    GattUserDescriptionDescriptor = 0x0B,
    GattPresentationFormatDescriptor = 0x0C,
    GattValidRange = 0x0D,
    HapStepValueDescriptor = 0x0E,
    HapServiceProperties = 0x0F,
    HapLinkedServices = 0x10,
    HapValidValuesDescriptor = 0x11,
    HapValidValuesRangeDescriptor = 0x12,
}

/// 参数值的解码方式
#[derive(Debug, Clone, Copy)]
pub enum Decoding {
    /// 使用特征当前的格式 (由 Presentation Format 确定)
    ActiveFormat,
    /// 展开为 hap_format / hap_format_converter / hap_unit
    PresentationFormat,
    /// 对半拆分为 min_value / max_value，各自按当前格式解码
    ValidRange,
    /// 协议固定的解码函数
    Fixed(fn(&[u8]) -> Result<HapValue, HapError>),
}

impl ParamType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use ParamType::*;
        Some(match tag {
            0x01 => Value,
            0x02 => AdditionalAuthorizationData,
            0x03 => Origin,
            0x04 => CharacteristicType,
            0x05 => CharacteristicInstanceId,
            0x06 => ServiceType,
            0x07 => ServiceInstanceId,
            0x08 => Ttl,
            0x09 => ReturnResponse,
            0x0A => HapCharacteristicPropertiesDescriptor,
            0x0B => GattUserDescriptionDescriptor,
            0x0C => GattPresentationFormatDescriptor,
            0x0D => GattValidRange,
            0x0E => HapStepValueDescriptor,
            0x0F => HapServiceProperties,
            0x10 => HapLinkedServices,
            0x11 => HapValidValuesDescriptor,
            0x12 => HapValidValuesRangeDescriptor,
            _ => return None,
        })
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// 属性表中的名称
    pub fn name(&self) -> &'static str {
        use ParamType::*;
        match self {
            Value => "value",
            AdditionalAuthorizationData => "additional_authorization_data",
            Origin => "origin",
            CharacteristicType => "characteristic_type",
            CharacteristicInstanceId => "characteristic_instance_id",
            ServiceType => "service_type",
            ServiceInstanceId => "service_instance_id",
            Ttl => "ttl",
            ReturnResponse => "return_response",
            HapCharacteristicPropertiesDescriptor => "hap_characteristic_properties_descriptor",
            GattUserDescriptionDescriptor => "gatt_user_description_descriptor",
            GattPresentationFormatDescriptor => "gatt_presentation_format_descriptor",
            GattValidRange => "gatt_valid_range",
            HapStepValueDescriptor => "hap_step_value_descriptor",
            HapServiceProperties => "hap_service_properties",
            HapLinkedServices => "hap_linked_services",
            HapValidValuesDescriptor => "hap_valid_values_descriptor",
            HapValidValuesRangeDescriptor => "hap_valid_values_range_descriptor",
        }
    }

    pub fn decoding(&self) -> Decoding {
        use ParamType::*;
        match self {
            Value | HapStepValueDescriptor => Decoding::ActiveFormat,
            GattPresentationFormatDescriptor => Decoding::PresentationFormat,
            GattValidRange => Decoding::ValidRange,
            CharacteristicType | ServiceType => Decoding::Fixed(decode_uuid),
            CharacteristicInstanceId
            | ServiceInstanceId
            | HapCharacteristicPropertiesDescriptor
            | HapServiceProperties => Decoding::Fixed(decode_u16),
            Origin | Ttl | ReturnResponse => Decoding::Fixed(decode_u8),
            GattUserDescriptionDescriptor => Decoding::Fixed(decode_string),
            HapLinkedServices => Decoding::Fixed(decode_u16_list),
            AdditionalAuthorizationData | HapValidValuesDescriptor | HapValidValuesRangeDescriptor => {
                Decoding::Fixed(decode_bytes)
            }
        }
    }
}

fn decode_bytes(data: &[u8]) -> Result<HapValue, HapError> {
    Ok(HapValue::Bytes(data.to_vec()))
}

fn decode_u8(data: &[u8]) -> Result<HapValue, HapError> {
    match data {
        [v] => Ok(HapValue::UInt(*v as u64)),
        _ => Err(width_error(1, data)),
    }
}

fn decode_u16(data: &[u8]) -> Result<HapValue, HapError> {
    match data {
        [lo, hi] => Ok(HapValue::UInt(u16::from_le_bytes([*lo, *hi]) as u64)),
        _ => Err(width_error(2, data)),
    }
}

fn decode_u16_list(data: &[u8]) -> Result<HapValue, HapError> {
    if data.len() % 2 != 0 {
        return Err(HapError::InvalidResponse(format!(
            "odd length {} for instance id list",
            data.len()
        )));
    }
    Ok(HapValue::InstanceIds(
        data.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect(),
    ))
}

fn decode_string(data: &[u8]) -> Result<HapValue, HapError> {
    utf8(data).map(HapValue::String)
}

/// 128 位 UUID，线上为小端字节序
fn decode_uuid(data: &[u8]) -> Result<HapValue, HapError> {
    let mut bytes: [u8; 16] = data.try_into().map_err(|_| width_error(16, data))?;
    bytes.reverse();
    Ok(HapValue::Uuid(Uuid::from_bytes(bytes)))
}

fn width_error(expected: usize, data: &[u8]) -> HapError {
    HapError::InvalidResponse(format!("expected {} bytes, got {}", expected, data.len()))
}

/// 请求 body 中的一个参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub tag: u8,
    pub value: Vec<u8>,
}

impl Parameter {
    pub fn new(param: ParamType, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: param.tag(),
            value: value.into(),
        }
    }

    /// HAP-Param-Return-Response = 1
    pub fn return_response() -> Self {
        Self::new(ParamType::ReturnResponse, [1u8])
    }
}

/// 将参数列表编码为 TLV 分块序列 (分片器以分块为最小单位)
pub fn encode_parameters(params: &[Parameter]) -> Vec<Vec<u8>> {
    params
        .iter()
        .flat_map(|p| encode_tlv(p.tag, &p.value))
        .collect()
}
