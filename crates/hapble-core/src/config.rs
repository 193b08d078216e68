//! 控制器配置和持久化
//!
//! 提供适配器、地址类型、重试策略等设置的存储和读取。

use crate::ble::{AddressType, RetryPolicy};
use crate::logging::LogLevel;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// 传输失败重试设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// 是否在传输失败时重连并重试
    pub enabled: bool,
    /// 总尝试次数
    pub max_attempts: u32,
    /// 两次尝试之间的等待秒数
    pub wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            wait_secs: 2,
        }
    }
}

impl RetrySettings {
    /// 未启用时返回 None
    pub fn policy(&self) -> Option<RetryPolicy> {
        self.enabled
            .then(|| RetryPolicy::new(self.max_attempts, Duration::from_secs(self.wait_secs)))
    }
}

/// 控制器设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// 蓝牙适配器序号
    pub adapter_index: usize,
    /// 配件地址类型
    pub address_type: AddressType,
    /// 扫描时长 (秒)
    pub scan_timeout_secs: u64,
    pub retry: RetrySettings,
    pub log_level: LogLevel,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            address_type: AddressType::Public,
            scan_timeout_secs: 5,
            retry: RetrySettings::default(),
            log_level: LogLevel::Info,
        }
    }
}

impl ControllerSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hapble");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}
