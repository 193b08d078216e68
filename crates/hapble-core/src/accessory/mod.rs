//! HAP 配件
//!
//! 持有到配件的连接，并按 UUID 惰性创建、缓存特征句柄。

pub mod characteristic;
pub mod response;

pub use characteristic::HapCharacteristic;
pub use response::AttributeMap;

use crate::ble::{AddressType, Connection, GattTransport, RetryPolicy, with_retry};
use crate::error::{HapError, TransportError};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct HapAccessory {
    connection: Connection,
    retry: Option<RetryPolicy>,
    characteristics: HashMap<Uuid, HapCharacteristic>,
}

impl HapAccessory {
    pub fn new(
        transport: Arc<dyn GattTransport>,
        address: impl Into<String>,
        address_type: AddressType,
    ) -> Self {
        Self {
            connection: Connection::new(transport, address, address_type),
            retry: None,
            characteristics: HashMap::new(),
        }
    }

    /// 之后创建的特征句柄使用该重试策略
    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn connect(&self) -> Result<(), HapError> {
        info!("Connecting to HAP accessory {}", self.connection.address);
        self.connection.connect().await?;
        Ok(())
    }

    /// 获取特征句柄，首次访问时在 GATT 层定位该特征
    pub async fn characteristic(&mut self, uuid: Uuid) -> Result<&mut HapCharacteristic, HapError> {
        if !self.characteristics.contains_key(&uuid) {
            let transport = &self.connection.transport;
            with_retry(
                self.retry.as_ref(),
                "resolve characteristic",
                &self.connection,
                move || transport.resolve_characteristic(uuid),
            )
            .await?;

            self.characteristics.insert(
                uuid,
                HapCharacteristic::new(self.connection.clone(), uuid, self.retry),
            );
        }

        self.characteristics
            .get_mut(&uuid)
            .ok_or(HapError::Transport(TransportError::CharacteristicNotFound(uuid)))
    }

    /// 已缓存的特征数量
    pub fn cached_characteristics(&self) -> usize {
        self.characteristics.len()
    }
}
