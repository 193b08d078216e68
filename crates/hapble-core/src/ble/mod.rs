pub mod client;
pub mod retry;
pub mod scanner;

pub use client::BtleplugTransport;
pub use retry::{RetryPolicy, with_retry};
pub use scanner::{DiscoveredAccessory, HapAdvertisement, HapScanner};

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// HAP Characteristic Instance ID 描述符
pub const CHARACTERISTIC_ID_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0xdc46f0fe_81d2_4616_b5d9_6abdd796939a);

/// HAP Pairing 服务下的特征
pub const PAIR_SETUP_CHAR_UUID: Uuid = Uuid::from_u128(0x0000004c_0000_1000_8000_0026bb765291);
pub const PAIR_VERIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000004e_0000_1000_8000_0026bb765291);
pub const PAIRING_FEATURES_CHAR_UUID: Uuid =
    Uuid::from_u128(0x0000004f_0000_1000_8000_0026bb765291);
pub const PAIRING_PAIRINGS_CHAR_UUID: Uuid =
    Uuid::from_u128(0x00000050_0000_1000_8000_0026bb765291);

/// BLE 地址类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

impl std::str::FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" | "static" => Ok(AddressType::Public),
            "random" => Ok(AddressType::Random),
            other => Err(format!("unknown address type '{}'", other)),
        }
    }
}

/// 配件侧 GATT 传输能力
///
/// 连接建立、服务发现和原始字节读写都由实现者负责，
/// 协议层只通过这几个操作访问配件。
#[async_trait::async_trait]
pub trait GattTransport: Send + Sync {
    async fn connect(&self, address: &str, address_type: AddressType) -> Result<(), TransportError>;

    /// 按 UUID 定位 GATT 特征
    async fn resolve_characteristic(&self, uuid: Uuid) -> Result<(), TransportError>;

    async fn write(&self, uuid: Uuid, data: &[u8], require_ack: bool) -> Result<(), TransportError>;

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError>;

    async fn read_descriptor(&self, uuid: Uuid, descriptor: Uuid) -> Result<Vec<u8>, TransportError>;
}

/// 到单个配件的连接：传输层 + 重连所需的地址
#[derive(Clone)]
pub struct Connection {
    pub transport: Arc<dyn GattTransport>,
    pub address: String,
    pub address_type: AddressType,
}

impl Connection {
    pub fn new(transport: Arc<dyn GattTransport>, address: impl Into<String>, address_type: AddressType) -> Self {
        Self {
            transport,
            address: address.into(),
            address_type,
        }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect(&self.address, self.address_type).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("address_type", &self.address_type)
            .finish()
    }
}
