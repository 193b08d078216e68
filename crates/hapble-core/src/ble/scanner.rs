//! BLE Scanner - 发现 HAP-BLE 配件
//!
//! 扫描器通过 Apple 厂商数据识别 HAP 配件：
//! - Company ID: `0x004C`
//! - 广播类型: `0x06`
//!
//! # 广播负载 (去掉 Company ID 后)
//!
//! `type | STL | SF | device_id(6) | ACID(2) | GSN(2) | CN | CV | [setup_hash(4)]`

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use futures_util::StreamExt;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::TransportError;

const APPLE_COMPANY_ID: u16 = 0x004C;
const HAP_ADV_TYPE: u8 = 0x06;
const HAP_ADV_MIN_LEN: usize = 15;

/// 广播中的 HAP 信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HapAdvertisement {
    /// SF bit 0: 配件尚未配对
    pub unpaired: bool,
    pub device_id: String,
    pub category: u16,
    pub global_state_number: u16,
    pub config_number: u8,
    pub compatible_version: u8,
}

impl HapAdvertisement {
    /// 解析厂商数据 (不含 Company ID)
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HAP_ADV_MIN_LEN || data[0] != HAP_ADV_TYPE {
            return None;
        }
        let device_id = data[3..9]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        Some(Self {
            unpaired: data[2] & 0x01 != 0,
            device_id,
            category: u16::from_le_bytes([data[9], data[10]]),
            global_state_number: u16::from_le_bytes([data[11], data[12]]),
            config_number: data[13],
            compatible_version: data[14],
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredAccessory {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub advertisement: HapAdvertisement,
}

pub struct HapScanner {
    adapter: Adapter,
}

impl HapScanner {
    pub async fn new(adapter_index: usize) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(adapter_index)
            .ok_or(TransportError::NoAdapter)?;
        Ok(Self { adapter })
    }

    pub async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredAccessory>, TransportError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!("Starting BLE scan for {} seconds", timeout.as_secs());

        let mut discovered: HashMap<String, DiscoveredAccessory> = HashMap::new();

        let timeout_fut = tokio::time::sleep(timeout);
        tokio::pin!(timeout_fut);

        loop {
            tokio::select! {
                _ = &mut timeout_fut => break,
                event = events.next() => {
                    let id = match event {
                        Some(CentralEvent::DeviceDiscovered(id))
                        | Some(CentralEvent::ManufacturerDataAdvertisement { id, .. }) => id,
                        Some(_) => continue,
                        None => break,
                    };
                    let peripheral = self.adapter.peripheral(&id).await?;
                    let Some(props) = peripheral.properties().await? else {
                        continue;
                    };
                    let Some(advertisement) = props
                        .manufacturer_data
                        .get(&APPLE_COMPANY_ID)
                        .and_then(|data| HapAdvertisement::parse(data))
                    else {
                        continue;
                    };

                    let address = props.address.to_string();
                    if !discovered.contains_key(&address) {
                        debug!(
                            "HAP accessory found: addr={}, device_id={}, category={}",
                            address, advertisement.device_id, advertisement.category
                        );
                    }
                    discovered.insert(
                        address.clone(),
                        DiscoveredAccessory {
                            name: props.local_name.unwrap_or_else(|| "<unknown>".to_string()),
                            address,
                            rssi: props.rssi,
                            advertisement,
                        },
                    );
                }
            }
        }

        self.adapter.stop_scan().await?;
        info!("Scan complete: found {} HAP accessory(ies)", discovered.len());
        Ok(discovered.into_values().collect())
    }
}
