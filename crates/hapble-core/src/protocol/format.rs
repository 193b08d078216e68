//! 特征值格式与解码
//!
//! GATT Presentation Format Descriptor 决定了特征 `value`、
//! 有效范围和步进值的解码方式。

use crate::error::HapError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// 解码后的属性值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HapValue {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f32),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    InstanceIds(Vec<u16>),
    Format(HapFormat),
}

/// HAP 特征格式 (Presentation Format 的 format 字段)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HapFormat {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int32,
    Float,
    String,
    Data,
}

impl HapFormat {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => HapFormat::Bool,
            0x04 => HapFormat::UInt8,
            0x06 => HapFormat::UInt16,
            0x08 => HapFormat::UInt32,
            0x0A => HapFormat::UInt64,
            0x10 => HapFormat::Int32,
            0x14 => HapFormat::Float,
            0x19 => HapFormat::String,
            0x1B => HapFormat::Data,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            HapFormat::Bool => 0x01,
            HapFormat::UInt8 => 0x04,
            HapFormat::UInt16 => 0x06,
            HapFormat::UInt32 => 0x08,
            HapFormat::UInt64 => 0x0A,
            HapFormat::Int32 => 0x10,
            HapFormat::Float => 0x14,
            HapFormat::String => 0x19,
            HapFormat::Data => 0x1B,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HapFormat::Bool => "bool",
            HapFormat::UInt8 => "uint8",
            HapFormat::UInt16 => "uint16",
            HapFormat::UInt32 => "uint32",
            HapFormat::UInt64 => "uint64",
            HapFormat::Int32 => "int",
            HapFormat::Float => "float",
            HapFormat::String => "string",
            HapFormat::Data => "data",
        }
    }

    /// 按本格式解码小端字节
    pub fn decode(&self, data: &[u8]) -> Result<HapValue, HapError> {
        Ok(match self {
            HapFormat::Bool => HapValue::Bool(fixed::<1>(self, data)?[0] != 0),
            HapFormat::UInt8 => HapValue::UInt(fixed::<1>(self, data)?[0] as u64),
            HapFormat::UInt16 => HapValue::UInt(u16::from_le_bytes(fixed(self, data)?) as u64),
            HapFormat::UInt32 => HapValue::UInt(u32::from_le_bytes(fixed(self, data)?) as u64),
            HapFormat::UInt64 => HapValue::UInt(u64::from_le_bytes(fixed(self, data)?)),
            HapFormat::Int32 => HapValue::Int(i32::from_le_bytes(fixed(self, data)?) as i64),
            HapFormat::Float => HapValue::Float(f32::from_le_bytes(fixed(self, data)?)),
            HapFormat::String => HapValue::String(utf8(data)?),
            HapFormat::Data => HapValue::Bytes(data.to_vec()),
        })
    }
}

impl fmt::Display for HapFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 尚未收到 Presentation Format 时使用原始字节
pub fn decode_with(format: Option<HapFormat>, data: &[u8]) -> Result<HapValue, HapError> {
    match format {
        Some(format) => format.decode(data),
        None => Ok(HapValue::Bytes(data.to_vec())),
    }
}

fn fixed<const N: usize>(format: &HapFormat, data: &[u8]) -> Result<[u8; N], HapError> {
    data.try_into().map_err(|_| {
        HapError::InvalidResponse(format!(
            "{} value needs {} bytes, got {}",
            format,
            N,
            data.len()
        ))
    })
}

pub(crate) fn utf8(data: &[u8]) -> Result<String, HapError> {
    String::from_utf8(data.to_vec())
        .map_err(|e| HapError::InvalidResponse(format!("invalid UTF-8: {}", e)))
}

/// HAP 单位 (Presentation Format 的 unit 字段)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HapUnit {
    Celsius,
    ArcDegrees,
    Percentage,
    Unitless,
    Lux,
    Seconds,
}

impl HapUnit {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x272F => HapUnit::Celsius,
            0x2763 => HapUnit::ArcDegrees,
            0x27AD => HapUnit::Percentage,
            0x2700 => HapUnit::Unitless,
            0x2731 => HapUnit::Lux,
            0x2703 => HapUnit::Seconds,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HapUnit::Celsius => "celsius",
            HapUnit::ArcDegrees => "arcdegrees",
            HapUnit::Percentage => "percentage",
            HapUnit::Unitless => "unitless",
            HapUnit::Lux => "lux",
            HapUnit::Seconds => "seconds",
        }
    }
}

/// GATT Presentation Format Descriptor (7 字节)
///
/// `format(1) | exponent(1) | unit(2) | namespace(1) | description(2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationFormat {
    pub format_code: u8,
    pub unit_code: u16,
}

impl PresentationFormat {
    pub const LEN: usize = 7;

    pub fn parse(data: &[u8]) -> Result<Self, HapError> {
        if data.len() != Self::LEN {
            return Err(HapError::InvalidResponse(format!(
                "presentation format descriptor needs {} bytes, got {}",
                Self::LEN,
                data.len()
            )));
        }
        Ok(Self {
            format_code: data[0],
            unit_code: u16::from_le_bytes([data[2], data[3]]),
        })
    }

    pub fn format(&self) -> Result<HapFormat, HapError> {
        HapFormat::from_code(self.format_code).ok_or_else(|| {
            HapError::InvalidResponse(format!("unknown format code 0x{:02X}", self.format_code))
        })
    }

    pub fn unit(&self) -> Result<HapUnit, HapError> {
        HapUnit::from_code(self.unit_code).ok_or_else(|| {
            HapError::InvalidResponse(format!("unknown unit code 0x{:04X}", self.unit_code))
        })
    }
}
