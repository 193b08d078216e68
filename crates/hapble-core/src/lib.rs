//! HAP-BLE Core Library
//!
//! HomeKit Accessory Protocol 蓝牙传输层的控制器端实现
//!
//! # 模块
//!
//! - **protocol**: PDU 头部、TLV/kTLV 编解码、请求分片
//! - **accessory**: 配件与特征驱动 (签名读取、读写、配对数据交换)
//! - **ble**: GATT 传输抽象、btleplug 实现、扫描、重试策略
//! - **config**: 控制器设置
//!
//! # 使用示例
//!
//! ```ignore
//! use hapble_core::{BtleplugTransport, HapAccessory, AddressType};
//!
//! // 1. 连接配件
//! let transport = Arc::new(BtleplugTransport::new().await?);
//! let mut accessory = HapAccessory::new(transport, "AA:BB:CC:DD:EE:FF", AddressType::Public);
//! accessory.connect().await?;
//!
//! // 2. 读取特征签名和值
//! let lock_state = accessory.characteristic(LOCK_CURRENT_STATE_UUID).await?;
//! let signature = lock_state.signature().await?;
//! let value = lock_state.read_value().await?;
//! ```

pub mod accessory;
pub mod ble;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;

// Accessory re-exports
pub use accessory::{AttributeMap, HapAccessory, HapCharacteristic};

// BLE re-exports
pub use ble::{
    AddressType, BtleplugTransport, CHARACTERISTIC_ID_DESCRIPTOR_UUID, Connection,
    DiscoveredAccessory, GattTransport, HapScanner, RetryPolicy,
};

pub use config::{ControllerSettings, RetrySettings};
pub use error::{HapError, TransportError};
pub use logging::LogLevel;

// Protocol re-exports
pub use protocol::{
    HapFormat, HapUnit, HapValue, InstanceId, KtlvMap, KtlvType, OpCode, ParamType, Parameter,
    RequestHeader, ResponseHeader, StatusCode,
};
