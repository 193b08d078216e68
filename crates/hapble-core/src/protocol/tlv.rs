//! TLV8 字节编解码
//!
//! 每个分块为 `[tag, len, bytes...]`，单块最多 255 字节；
//! 更长的值拆分为多个同 tag 的连续分块。

use crate::error::HapError;

pub const MAX_CHUNK_VALUE: usize = 255;

/// 将一个值编码为若干 TLV 分块，空值编码为单个零长度分块
pub fn encode_tlv(tag: u8, value: &[u8]) -> Vec<Vec<u8>> {
    if value.is_empty() {
        return vec![vec![tag, 0]];
    }
    value
        .chunks(MAX_CHUNK_VALUE)
        .map(|chunk| {
            let mut out = Vec::with_capacity(chunk.len() + 2);
            out.push(tag);
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
            out
        })
        .collect()
}

/// 解码出的单个分块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvChunk<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// 惰性遍历 TLV 字节流
pub fn decode_tlv_stream(data: &[u8]) -> TlvIter<'_> {
    TlvIter { data, pos: 0 }
}

pub struct TlvIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<TlvChunk<'a>, HapError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < 2 {
            self.pos = self.data.len();
            return Some(Err(HapError::LengthMismatch {
                declared: 2,
                actual: rest.len(),
            }));
        }

        let tag = rest[0];
        let len = rest[1] as usize;
        let available = rest.len() - 2;
        if available < len {
            // 截断的分块终止遍历
            self.pos = self.data.len();
            return Some(Err(HapError::LengthMismatch {
                declared: len,
                actual: available,
            }));
        }

        self.pos += 2 + len;
        Some(Ok(TlvChunk {
            tag,
            value: &rest[2..2 + len],
        }))
    }
}
