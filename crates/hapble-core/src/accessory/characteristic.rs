//! HAP 特征驱动
//!
//! 一次操作的流程:
//! 1. 分片写入请求 (每片需要确认)
//! 2. 读取一次特征值作为响应
//! 3. 校验响应头并解析 body

use crate::accessory::response::{AttributeMap, parse_body, validate_response};
use crate::ble::{CHARACTERISTIC_ID_DESCRIPTOR_UUID, Connection, RetryPolicy, with_retry};
use crate::error::{HapError, TransportError};
use crate::protocol::ktlv::{encode_ktlvs, parse_ktlvs};
use crate::protocol::{
    HapFormat, HapValue, InstanceId, KtlvMap, KtlvType, OpCode, ParamType, Parameter,
    RequestHeader, fragment_request,
};
use log::debug;
use uuid::Uuid;

/// 一个 HAP 特征
///
/// 实例 ID 与签名在首次使用时读取并缓存，生命周期内不再失效。
/// 同一句柄同一时间只应有一个操作在执行。
#[derive(Debug)]
pub struct HapCharacteristic {
    uuid: Uuid,
    connection: Connection,
    retry: Option<RetryPolicy>,
    cid: Option<InstanceId>,
    signature: Option<AttributeMap>,
    format: Option<HapFormat>,
    attributes: AttributeMap,
}

impl HapCharacteristic {
    pub fn new(connection: Connection, uuid: Uuid, retry: Option<RetryPolicy>) -> Self {
        Self {
            uuid,
            connection,
            retry,
            cid: None,
            signature: None,
            format: None,
            attributes: AttributeMap::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// 当前生效的值格式 (未读取签名前为 None，按原始字节处理)
    pub fn format(&self) -> Option<HapFormat> {
        self.format
    }

    /// 历次响应解析出的全部属性
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Characteristic Instance ID，首次调用时从描述符读取
    pub async fn cid(&mut self) -> Result<InstanceId, HapError> {
        if let Some(cid) = self.cid {
            return Ok(cid);
        }

        debug!("Read characteristic ID descriptor.");
        let transport = &self.connection.transport;
        let uuid = self.uuid;
        let raw = with_retry(
            self.retry.as_ref(),
            "read characteristic ID descriptor",
            &self.connection,
            move || transport.read_descriptor(uuid, CHARACTERISTIC_ID_DESCRIPTOR_UUID),
        )
        .await?;

        let cid = InstanceId::from_descriptor(&raw)?;
        self.cid = Some(cid);
        Ok(cid)
    }

    /// Characteristic Signature Read，结果缓存
    pub async fn signature(&mut self) -> Result<&AttributeMap, HapError> {
        if self.signature.is_none() {
            let header = RequestHeader::new(OpCode::CharacteristicSignatureRead, self.cid().await?);
            let signature = self.read(&header).await?;
            self.signature = Some(signature);
        }
        Ok(self.signature.get_or_insert_with(AttributeMap::new))
    }

    /// 读取特征值，必要时先读取签名以确定格式
    pub async fn read_value(&mut self) -> Result<HapValue, HapError> {
        self.signature().await?;
        let header = RequestHeader::new(OpCode::CharacteristicRead, self.cid().await?);
        let response = self.read(&header).await?;
        response
            .value()
            .cloned()
            .ok_or_else(|| HapError::InvalidResponse("read response carries no value".into()))
    }

    /// 写入特征值 (原始字节)
    pub async fn write_value(&mut self, value: &[u8]) -> Result<AttributeMap, HapError> {
        let header = RequestHeader::new(OpCode::CharacteristicWrite, self.cid().await?);
        self.write(&header, &[Parameter::new(ParamType::Value, value)])
            .await
    }

    async fn request(&self, header: &RequestHeader, params: &[Parameter]) -> Result<(), HapError> {
        debug!("HAP read/write request.");
        let fragments = fragment_request(header, params)?;

        let transport = &self.connection.transport;
        let uuid = self.uuid;
        let fragments = &fragments;
        with_retry(self.retry.as_ref(), "write request", &self.connection, move || async move {
            for fragment in fragments {
                debug!("Writing to characteristic: {:02X?}", fragment.data);
                transport.write(uuid, &fragment.data, true).await?;
            }
            Ok::<(), TransportError>(())
        })
        .await
    }

    async fn read_response(&self) -> Result<Vec<u8>, HapError> {
        debug!("Reading characteristic value.");
        let transport = &self.connection.transport;
        let uuid = self.uuid;
        with_retry(self.retry.as_ref(), "read value", &self.connection, move || {
            transport.read(uuid)
        })
        .await
    }

    /// HAP 特征写操作：发送请求、读取并校验响应、解析属性
    pub async fn write(
        &mut self,
        header: &RequestHeader,
        params: &[Parameter],
    ) -> Result<AttributeMap, HapError> {
        debug!("HAP read/write with OpCode: {:?}.", header.op_code);

        self.request(header, params).await?;

        let response = self.read_response().await?;
        debug!("Response data: {:02X?}", response);

        let (response_header, body) = validate_response(header, &response)?;
        debug!("Response header: {}", response_header);

        if response_header.control.continuation {
            return Err(HapError::NotSupported("fragmented read"));
        }

        debug!("Parse read response.");
        let parsed = parse_body(body, self.format)?;
        self.format = parsed.format;
        self.attributes.merge(&parsed.attributes);
        Ok(parsed.attributes)
    }

    /// HAP 特征读操作 (无 body 的写)
    pub async fn read(&mut self, header: &RequestHeader) -> Result<AttributeMap, HapError> {
        self.write(header, &[]).await
    }

    /// 配对数据交换
    ///
    /// 配件可将较长的 kTLV 响应拆成多轮：`FragmentData` 表示还有后续，
    /// 控制器以空 `FragmentData` 请求下一段，直到收到 `FragmentLast`。
    pub async fn write_ktlvs(
        &mut self,
        header: &RequestHeader,
        ktlvs: Vec<(KtlvType, Vec<u8>)>,
    ) -> Result<KtlvMap, HapError> {
        debug!("HAP write pairing with OpCode: {:?}.", header.op_code);

        let mut assembled: Vec<u8> = Vec::new();
        let mut request = ktlvs;

        loop {
            debug!("Preparing message with kTLVs: {:?}", request);
            let params = [
                Parameter::return_response(),
                Parameter::new(ParamType::Value, encode_ktlvs(&request)),
            ];

            let response = self.write(header, &params).await?;
            let value = match response.value() {
                Some(HapValue::Bytes(bytes)) => bytes,
                Some(other) => {
                    return Err(HapError::PairingProtocol(format!(
                        "kTLV value is not opaque data: {:?}",
                        other
                    )));
                }
                None => return Err(HapError::PairingProtocol("No ktlvs received".into())),
            };

            let mut parsed = parse_ktlvs(value)?;

            if let Some(fragment) = parsed.remove(&KtlvType::FragmentData) {
                debug!("Found kTLV FragmentData - appending");
                assembled.extend_from_slice(&fragment);
                request = vec![(KtlvType::FragmentData, Vec::new())];
            } else if let Some(last) = parsed.remove(&KtlvType::FragmentLast) {
                debug!("Found kTLV FragmentLast - appending final fragment");
                assembled.extend_from_slice(&last);
                return Ok(KtlvMap::from([(KtlvType::FragmentData, assembled)]));
            } else {
                debug!("Unfragmented kTLVs - returning parsed data.");
                return Ok(parsed);
            }
        }
    }
}
