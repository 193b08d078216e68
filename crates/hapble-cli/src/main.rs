//! HAP-BLE CLI
//!
//! 命令行控制器：扫描配件、读取特征签名、读写特征值、交换配对数据

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use hapble_core::ble::{
    PAIR_SETUP_CHAR_UUID, PAIR_VERIFY_CHAR_UUID, PAIRING_FEATURES_CHAR_UUID,
    PAIRING_PAIRINGS_CHAR_UUID,
};
use hapble_core::{
    BtleplugTransport, ControllerSettings, HapAccessory, HapScanner, KtlvType, LogLevel, OpCode,
    RequestHeader, RetrySettings,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hapble", version, about = "HAP-BLE 控制器")]
struct Cli {
    /// 日志级别 (error/warn/info/debug/trace)
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// 传输失败时的总尝试次数 (大于 1 时启用重连重试)
    #[arg(long, global = true)]
    retry: Option<u32>,

    /// 重试间隔 (秒)
    #[arg(long, global = true)]
    retry_wait: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描附近的 HAP 配件
    Scan {
        /// 扫描超时时间 (秒)
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// 读取特征签名
    Signature {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        uuid: Uuid,
    },
    /// 读取特征值
    Read {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        uuid: Uuid,
    },
    /// 写入特征值 (十六进制)
    Write {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        uuid: Uuid,
        #[arg(long = "hex")]
        value_hex: String,
    },
    /// 写入配对数据 kTLV，格式 TYPE=HEX (TYPE 为十进制或 0x 前缀的 tag)
    PairData {
        #[arg(short, long)]
        address: String,
        /// 目标特征，未指定时使用 --pairing 选择的配对特征
        #[arg(short, long, conflicts_with = "pairing")]
        uuid: Option<Uuid>,
        #[arg(long, value_enum, default_value_t = PairingTarget::Setup)]
        pairing: PairingTarget,
        #[arg(long = "ktlv", required = true)]
        ktlvs: Vec<String>,
    },
    /// 显示当前生效的设置
    Config {
        /// 将设置 (含命令行覆盖) 写入配置文件
        #[arg(long)]
        save: bool,
    },
}

/// Pairing 服务下的特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PairingTarget {
    Setup,
    Verify,
    Features,
    Pairings,
}

impl PairingTarget {
    fn uuid(self) -> Uuid {
        match self {
            PairingTarget::Setup => PAIR_SETUP_CHAR_UUID,
            PairingTarget::Verify => PAIR_VERIFY_CHAR_UUID,
            PairingTarget::Features => PAIRING_FEATURES_CHAR_UUID,
            PairingTarget::Pairings => PAIRING_PAIRINGS_CHAR_UUID,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = ControllerSettings::load();
    apply_overrides(&mut settings, &cli);
    init_logging(settings.log_level);

    match cli.command {
        Commands::Scan { timeout } => {
            let timeout = Duration::from_secs(timeout.unwrap_or(settings.scan_timeout_secs));
            let scanner = HapScanner::new(settings.adapter_index).await?;
            let accessories = scanner.scan(timeout).await?;
            println!("{}", serde_json::to_string_pretty(&accessories)?);
        }
        Commands::Signature { address, uuid } => {
            let mut accessory = open(&settings, &address).await?;
            let characteristic = accessory.characteristic(uuid).await?;
            let signature = characteristic.signature().await?;
            println!("{}", serde_json::to_string_pretty(signature)?);
        }
        Commands::Read { address, uuid } => {
            let mut accessory = open(&settings, &address).await?;
            let characteristic = accessory.characteristic(uuid).await?;
            let value = characteristic.read_value().await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Write {
            address,
            uuid,
            value_hex,
        } => {
            let value = hex::decode(value_hex.trim()).context("invalid hex value")?;
            let mut accessory = open(&settings, &address).await?;
            let characteristic = accessory.characteristic(uuid).await?;
            let response = characteristic.write_value(&value).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::PairData {
            address,
            uuid,
            pairing,
            ktlvs,
        } => {
            let uuid = uuid.unwrap_or_else(|| pairing.uuid());
            let ktlvs = ktlvs
                .iter()
                .map(|arg| parse_ktlv(arg))
                .collect::<Result<Vec<_>>>()?;
            let mut accessory = open(&settings, &address).await?;
            let characteristic = accessory.characteristic(uuid).await?;
            let header = RequestHeader::new(OpCode::CharacteristicWrite, characteristic.cid().await?);
            let response = characteristic.write_ktlvs(&header, ktlvs).await?;
            let printable: BTreeMap<&str, String> = response
                .iter()
                .map(|(ty, value)| (ty.name(), hex::encode(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&printable)?);
        }
        Commands::Config { save } => {
            if save {
                settings.save().with_context(|| {
                    format!(
                        "failed to save settings to {}",
                        ControllerSettings::config_path().display()
                    )
                })?;
                tracing::info!("Settings saved to {:?}", ControllerSettings::config_path());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

fn apply_overrides(settings: &mut ControllerSettings, cli: &Cli) {
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    if let Some(attempts) = cli.retry {
        settings.retry = RetrySettings {
            enabled: attempts > 1,
            max_attempts: attempts,
            ..settings.retry
        };
    }
    if let Some(wait) = cli.retry_wait {
        settings.retry.wait_secs = wait;
    }
}

fn init_logging(level: LogLevel) {
    // 桥接 log crate（hapble-core 使用）到 tracing
    let _ = tracing_log::LogTracer::builder()
        .with_max_level(level.to_level_filter())
        .init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.filter_directive())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn open(settings: &ControllerSettings, address: &str) -> Result<HapAccessory> {
    let transport = Arc::new(BtleplugTransport::with_adapter(settings.adapter_index).await?);
    let accessory = HapAccessory::new(transport, address, settings.address_type)
        .with_retry(settings.retry.policy());
    accessory.connect().await?;
    tracing::info!("Connected to {}", address);
    Ok(accessory)
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
        .map_err(|_| format!("invalid log level '{}'", s))
}

fn parse_ktlv(arg: &str) -> Result<(KtlvType, Vec<u8>)> {
    let (tag, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected TYPE=HEX, got '{}'", arg))?;
    let tag = match tag.strip_prefix("0x") {
        Some(hex_tag) => u8::from_str_radix(hex_tag, 16),
        None => tag.parse::<u8>(),
    }
    .with_context(|| format!("invalid kTLV type '{}'", tag))?;
    let value = hex::decode(value).with_context(|| format!("invalid kTLV value '{}'", value))?;
    Ok((KtlvType::from_u8(tag), value))
}
