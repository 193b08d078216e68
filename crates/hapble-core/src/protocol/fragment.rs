//! 请求 PDU 分片
//!
//! 超过 512 字节的 PDU 按整块 TLV 贪心装入多个分片，
//! 每个分片为 `header | body_len(2) | chunks...`。
//! 首片使用完整 5 字节头部，后续分片使用 2 字节续传头部，事务 ID 不变。

use crate::error::HapError;
use crate::protocol::MAX_PDU_LEN;
use crate::protocol::header::{FragmentPosition, RequestHeader};
use crate::protocol::params::{Parameter, encode_parameters};
use log::debug;

/// 一次 GATT 写入的数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub position: FragmentPosition,
    pub data: Vec<u8>,
}

impl Fragment {
    /// 去掉头部与长度字段后的 TLV 字节
    pub fn body(&self) -> &[u8] {
        let start = RequestHeader::encoded_len(self.position) + 2;
        self.data.get(start..).unwrap_or(&[])
    }
}

/// 将请求头与参数列表拆分为若干次 GATT 写入
pub fn fragment_request(header: &RequestHeader, params: &[Parameter]) -> Result<Vec<Fragment>, HapError> {
    let chunks = encode_parameters(params);

    // 无 body 时只发送头部
    if chunks.is_empty() {
        return Ok(vec![Fragment {
            position: FragmentPosition::First,
            data: header.encode(FragmentPosition::First),
        }]);
    }

    let body_len: usize = chunks.iter().map(Vec::len).sum();
    let header_len = RequestHeader::encoded_len(FragmentPosition::First);
    if header_len + 2 + body_len <= MAX_PDU_LEN {
        debug!("No fragmentation necessary ({} body bytes)", body_len);
        let body = chunks.concat();
        return Ok(vec![build(header, FragmentPosition::First, &body)]);
    }

    debug!("Fragmentation necessary, total body length {}", body_len);
    pack_chunks(header, &chunks)
}

fn pack_chunks(header: &RequestHeader, chunks: &[Vec<u8>]) -> Result<Vec<Fragment>, HapError> {
    let mut fragments = Vec::new();
    let mut position = FragmentPosition::First;
    let mut remaining = chunks.iter().peekable();

    while remaining.peek().is_some() {
        let budget = MAX_PDU_LEN - RequestHeader::encoded_len(position) - 2;
        let mut body = Vec::with_capacity(budget);

        while let Some(chunk) = remaining.next_if(|c| body.len() + c.len() <= budget) {
            body.extend_from_slice(chunk);
        }

        if body.is_empty() {
            let len = remaining.peek().map(|c| c.len()).unwrap_or_default();
            return Err(HapError::FragmentTooLarge { len, budget });
        }

        debug!("Fragment {} ({:?}): {} body bytes", fragments.len(), position, body.len());
        fragments.push(build(header, position, &body));
        position = FragmentPosition::Continuation;
    }

    Ok(fragments)
}

fn build(header: &RequestHeader, position: FragmentPosition, body: &[u8]) -> Fragment {
    let mut data = header.encode(position);
    data.extend_from_slice(&(body.len() as u16).to_le_bytes());
    data.extend_from_slice(body);
    Fragment { position, data }
}
