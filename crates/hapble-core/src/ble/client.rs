//! btleplug GATT 传输
//!
//! 流程:
//! 1. 在适配器上按 MAC 地址查找配件 (必要时短暂扫描)
//! 2. 连接并发现服务
//! 3. 按 UUID 读写特征与描述符

use crate::ble::{AddressType, GattTransport};
use crate::error::TransportError;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use log::{debug, info};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;
use uuid::Uuid;

/// 设备未缓存时的扫描时长
const DISCOVERY_WINDOW: Duration = Duration::from_secs(3);

pub struct BtleplugTransport {
    adapter: Adapter,
    peripheral: Mutex<Option<PlatformPeripheral>>,
}

impl BtleplugTransport {
    pub async fn new() -> Result<Self, TransportError> {
        Self::with_adapter(0).await
    }

    pub async fn with_adapter(index: usize) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(TransportError::NoAdapter)?;

        Ok(Self {
            adapter,
            peripheral: Mutex::new(None),
        })
    }

    async fn find_device(&self, address: &str) -> Result<PlatformPeripheral, TransportError> {
        if let Some(peripheral) = self.lookup(address).await? {
            return Ok(peripheral);
        }

        debug!("{} not cached, scanning for {:?}", address, DISCOVERY_WINDOW);
        self.adapter.start_scan(ScanFilter::default()).await?;
        time::sleep(DISCOVERY_WINDOW).await;
        self.adapter.stop_scan().await?;

        self.lookup(address)
            .await?
            .ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))
    }

    async fn lookup(&self, address: &str) -> Result<Option<PlatformPeripheral>, TransportError> {
        for peripheral in self.adapter.peripherals().await? {
            if let Some(props) = peripheral.properties().await? {
                if props.address.to_string().eq_ignore_ascii_case(address) {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    async fn connected(&self) -> Result<PlatformPeripheral, TransportError> {
        self.peripheral
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    fn find_characteristic(
        peripheral: &PlatformPeripheral,
        uuid: Uuid,
    ) -> Result<Characteristic, TransportError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

#[async_trait::async_trait]
impl GattTransport for BtleplugTransport {
    async fn connect(&self, address: &str, address_type: AddressType) -> Result<(), TransportError> {
        // btleplug 根据扫描结果自行确定地址类型
        debug!("Connecting to {} ({:?} address)", address, address_type);
        let peripheral = self.find_device(address).await?;

        if !peripheral.is_connected().await? {
            info!("Connecting to {}", address);
            peripheral.connect().await?;
        }

        info!("Discovering services...");
        peripheral.discover_services().await?;

        *self.peripheral.lock().await = Some(peripheral);
        Ok(())
    }

    async fn resolve_characteristic(&self, uuid: Uuid) -> Result<(), TransportError> {
        let peripheral = self.connected().await?;
        Self::find_characteristic(&peripheral, uuid).map(|_| ())
    }

    async fn write(&self, uuid: Uuid, data: &[u8], require_ack: bool) -> Result<(), TransportError> {
        let peripheral = self.connected().await?;
        let characteristic = Self::find_characteristic(&peripheral, uuid)?;
        let write_type = if require_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&characteristic, data, write_type).await?;
        Ok(())
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.connected().await?;
        let characteristic = Self::find_characteristic(&peripheral, uuid)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn read_descriptor(&self, uuid: Uuid, descriptor: Uuid) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.connected().await?;
        let characteristic = Self::find_characteristic(&peripheral, uuid)?;
        let target = characteristic
            .descriptors
            .iter()
            .find(|d| d.uuid == descriptor)
            .ok_or(TransportError::DescriptorNotFound {
                characteristic: uuid,
                descriptor,
            })?;
        Ok(peripheral.read_descriptor(target).await?)
    }
}
