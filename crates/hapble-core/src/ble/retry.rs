//! 传输失败重试
//!
//! 仅重试 `TransportError`；每次重试前等待固定间隔并重新连接配件。
//! 重连失败只记录日志，最终只有重试次数耗尽才返回错误。

use crate::ble::Connection;
use crate::error::{HapError, TransportError};
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数 (含第一次)
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub async fn run<R, F, Fut>(&self, what: &str, connection: &Connection, mut op: F) -> Result<R, HapError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.delay).await;

                    debug!("Attempting to reconnect to {}", connection.address);
                    if let Err(e) = connection.connect().await {
                        warn!("Error while attempting to reconnect to device: {}", e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// 在调用点装饰一次传输操作；未配置策略时直接调用
pub async fn with_retry<R, F, Fut>(
    policy: Option<&RetryPolicy>,
    what: &str,
    connection: &Connection,
    mut op: F,
) -> Result<R, HapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, TransportError>>,
{
    match policy {
        Some(policy) => policy.run(what, connection, op).await,
        None => op().await.map_err(HapError::from),
    }
}
