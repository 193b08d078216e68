//! 集成测试 - 特征驱动与 GATT 传输
//!
//! 使用内存中的传输替身模拟配件，验证请求分片、响应校验、
//! 属性解析、kTLV 多轮交换与重试策略。

use hapble_core::ble::{AddressType, Connection, GattTransport, RetryPolicy};
use hapble_core::protocol::ktlv::encode_ktlvs;
use hapble_core::protocol::{DecodedRequest, MAX_PDU_LEN};
use hapble_core::{
    HapAccessory, HapCharacteristic, HapError, HapFormat, HapValue, InstanceId, KtlvType, OpCode,
    ParamType, Parameter, RequestHeader, StatusCode, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const LOCK_STATE_UUID: Uuid = Uuid::from_u128(0x0000001d_0000_1000_8000_0026bb765291);
const TID: u8 = 0x5A;

/// 脚本化的配件响应
enum Scripted {
    /// 原样返回
    Raw(Vec<u8>),
    /// 以最近一次请求的事务 ID 构造成功响应
    Body(Vec<u8>),
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Scripted>,
    writes: Vec<Vec<u8>>,
    cid: Vec<u8>,
    fail_reads: u32,
    fail_writes: u32,
    fail_descriptor_reads: u32,
    fail_resolves: u32,
    reads: u32,
    connects: u32,
    descriptor_reads: u32,
    resolves: u32,
}

#[derive(Default)]
struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        let mock = Self::default();
        mock.state.lock().unwrap().cid = vec![0x21, 0x00];
        Arc::new(mock)
    }

    fn push(&self, response: Scripted) {
        self.state.lock().unwrap().responses.push_back(response);
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl GattTransport for MockTransport {
    async fn connect(&self, _address: &str, _address_type: AddressType) -> Result<(), TransportError> {
        self.with(|s| s.connects += 1);
        Ok(())
    }

    async fn resolve_characteristic(&self, _uuid: Uuid) -> Result<(), TransportError> {
        self.with(|s| {
            s.resolves += 1;
            if s.fail_resolves > 0 {
                s.fail_resolves -= 1;
                return Err(TransportError::NotConnected);
            }
            Ok(())
        })
    }

    async fn write(&self, _uuid: Uuid, data: &[u8], require_ack: bool) -> Result<(), TransportError> {
        assert!(require_ack, "HAP requests must be acknowledged");
        self.with(|s| {
            if s.fail_writes > 0 {
                s.fail_writes -= 1;
                return Err(TransportError::NotConnected);
            }
            s.writes.push(data.to_vec());
            Ok(())
        })
    }

    async fn read(&self, _uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        self.with(|s| {
            s.reads += 1;
            if s.fail_reads > 0 {
                s.fail_reads -= 1;
                return Err(TransportError::NotConnected);
            }
            let tid = match s.writes.last().map(|w| DecodedRequest::parse(w)) {
                Some(Ok(DecodedRequest::First(header))) => header.transaction_id,
                Some(Ok(DecodedRequest::Continuation { transaction_id })) => transaction_id,
                _ => 0,
            };
            Ok(match s.responses.pop_front().expect("no scripted response") {
                Scripted::Raw(data) => data,
                Scripted::Body(body) => response(tid, StatusCode::Success, &body),
            })
        })
    }

    async fn read_descriptor(&self, _uuid: Uuid, _descriptor: Uuid) -> Result<Vec<u8>, TransportError> {
        self.with(|s| {
            s.descriptor_reads += 1;
            if s.fail_descriptor_reads > 0 {
                s.fail_descriptor_reads -= 1;
                return Err(TransportError::NotConnected);
            }
            Ok(s.cid.clone())
        })
    }
}

fn response(tid: u8, status: StatusCode, body: &[u8]) -> Vec<u8> {
    let mut data = vec![0x02, tid, status.code()];
    if !body.is_empty() {
        data.extend_from_slice(&(body.len() as u16).to_le_bytes());
        data.extend_from_slice(body);
    }
    data
}

fn characteristic(mock: &Arc<MockTransport>, retry: Option<RetryPolicy>) -> HapCharacteristic {
    let connection = Connection::new(mock.clone(), "AA:BB:CC:DD:EE:FF", AddressType::Public);
    HapCharacteristic::new(connection, LOCK_STATE_UUID, retry)
}

fn read_header() -> RequestHeader {
    RequestHeader::with_transaction_id(OpCode::CharacteristicRead, InstanceId(0x21), TID)
}

fn fast_retry(max_attempts: u32) -> Option<RetryPolicy> {
    Some(RetryPolicy::new(max_attempts, Duration::from_millis(1)))
}

#[tokio::test]
async fn test_read_sends_bare_header_and_concatenates_values() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(response(
        TID,
        StatusCode::Success,
        &[0x01, 0x02, 0xDE, 0xAD, 0x01, 0x02, 0xBE, 0xEF],
    )));

    let mut chr = characteristic(&mock, None);
    let attrs = chr.read(&read_header()).await.unwrap();

    assert_eq!(attrs.value(), Some(&HapValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])));
    assert_eq!(chr.attributes().value(), attrs.value());
    mock.with(|s| {
        assert_eq!(s.writes, vec![vec![0x00, 0x03, TID, 0x21, 0x00]]);
        assert_eq!(s.reads, 1);
    });
}

#[tokio::test]
async fn test_transaction_mismatch_reported_before_status() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(response(TID ^ 0xFF, StatusCode::InvalidRequest, &[])));

    let err = characteristic(&mock, None).read(&read_header()).await.unwrap_err();
    assert!(matches!(err, HapError::TransactionMismatch { expected: TID, .. }));
}

#[tokio::test]
async fn test_status_error_reported_before_length() {
    let mock = MockTransport::new();
    let mut data = vec![0x02, TID, StatusCode::InsufficientAuthorization.code()];
    data.extend_from_slice(&[0x10, 0x00, 0x01]);
    mock.push(Scripted::Raw(data));

    let err = characteristic(&mock, None).read(&read_header()).await.unwrap_err();
    assert!(matches!(
        err,
        HapError::ProtocolStatus(StatusCode::InsufficientAuthorization)
    ));
}

#[tokio::test]
async fn test_length_mismatch() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(vec![0x02, TID, 0x00, 0x05, 0x00, 0x01, 0x01]));

    let err = characteristic(&mock, None).read(&read_header()).await.unwrap_err();
    assert!(matches!(err, HapError::LengthMismatch { declared: 5, actual: 2 }));
}

#[tokio::test]
async fn test_fragmented_response_not_supported() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(vec![0x82, TID, 0x00]));

    let err = characteristic(&mock, None).read(&read_header()).await.unwrap_err();
    assert!(matches!(err, HapError::NotSupported(_)));
}

#[tokio::test]
async fn test_large_write_is_fragmented() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(response(TID, StatusCode::Success, &[])));

    let value: Vec<u8> = (0..1200u32).map(|i| i as u8).collect();
    let header = RequestHeader::with_transaction_id(OpCode::CharacteristicWrite, InstanceId(0x21), TID);
    let params = [Parameter::new(ParamType::Value, value)];
    let attrs = characteristic(&mock, None).write(&header, &params).await.unwrap();
    assert!(attrs.is_empty());

    mock.with(|s| {
        assert!(s.writes.len() >= 3);
        for (i, write) in s.writes.iter().enumerate() {
            assert!(write.len() <= MAX_PDU_LEN);
            if i == 0 {
                assert_eq!(&write[..3], &[0x00, 0x02, TID]);
            } else {
                assert_eq!(&write[..2], &[0x80, TID]);
            }
        }
        assert_eq!(s.reads, 1);
    });
}

#[tokio::test]
async fn test_signature_establishes_format_for_value() {
    let mock = MockTransport::new();
    // 签名: uint8, percentage, 范围 0..100
    mock.push(Scripted::Body(vec![
        0x0C, 0x07, 0x04, 0x00, 0xAD, 0x27, 0x01, 0x00, 0x00, 0x0D, 0x02, 0x00, 0x64,
    ]));
    mock.push(Scripted::Body(vec![0x01, 0x01, 0x2A]));

    let mut chr = characteristic(&mock, None);
    let value = chr.read_value().await.unwrap();
    assert_eq!(value, HapValue::UInt(42));
    assert_eq!(chr.format(), Some(HapFormat::UInt8));
    assert_eq!(chr.attributes().get("max_value"), Some(&HapValue::UInt(100)));

    // 签名与实例 ID 均已缓存
    let signature = chr.signature().await.unwrap().clone();
    assert_eq!(signature.get("hap_unit"), Some(&HapValue::String("percentage".into())));
    let json = serde_json::to_value(&signature).unwrap();
    assert_eq!(json["hap_format"], "uint8");
    assert_eq!(json["min_value"], 0);
    mock.with(|s| {
        assert_eq!(s.descriptor_reads, 1);
        assert_eq!(s.reads, 2);
        let first = DecodedRequest::parse(&s.writes[0]).unwrap();
        assert!(matches!(
            first,
            DecodedRequest::First(RequestHeader {
                op_code: OpCode::CharacteristicSignatureRead,
                instance_id: InstanceId(0x21),
                ..
            })
        ));
    });
}

fn ktlv_body(ktlvs: &[(KtlvType, Vec<u8>)]) -> Vec<u8> {
    let value = encode_ktlvs(ktlvs);
    let mut body = vec![ParamType::Value.tag(), value.len() as u8];
    body.extend_from_slice(&value);
    body
}

#[tokio::test]
async fn test_ktlv_fragments_are_reassembled() {
    let mock = MockTransport::new();
    mock.push(Scripted::Body(ktlv_body(&[(KtlvType::FragmentData, b"XX".to_vec())])));
    mock.push(Scripted::Body(ktlv_body(&[(KtlvType::FragmentData, b"YY".to_vec())])));
    mock.push(Scripted::Body(ktlv_body(&[(KtlvType::FragmentLast, b"Z".to_vec())])));

    let header = RequestHeader::with_transaction_id(OpCode::CharacteristicWrite, InstanceId(0x21), TID);
    let result = characteristic(&mock, None)
        .write_ktlvs(&header, vec![(KtlvType::State, vec![1]), (KtlvType::Method, vec![0])])
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[&KtlvType::FragmentData], b"XXYYZ".to_vec());

    mock.with(|s| {
        assert_eq!(s.writes.len(), 3);
        // 首轮携带原始 kTLV
        assert_eq!(
            &s.writes[0][7..],
            &[0x09, 0x01, 0x01, 0x01, 0x06, 0x06, 0x01, 0x01, 0x00, 0x01, 0x00]
        );
        // 后续轮次发送空 FragmentData
        for write in &s.writes[1..] {
            assert_eq!(&write[7..], &[0x09, 0x01, 0x01, 0x01, 0x02, 0x0C, 0x00]);
        }
    });
}

#[tokio::test]
async fn test_unfragmented_ktlv_response() {
    let mock = MockTransport::new();
    mock.push(Scripted::Body(ktlv_body(&[
        (KtlvType::State, vec![2]),
        (KtlvType::PublicKey, vec![0xAB; 16]),
    ])));

    let header = RequestHeader::with_transaction_id(OpCode::CharacteristicWrite, InstanceId(0x21), TID);
    let result = characteristic(&mock, None)
        .write_ktlvs(&header, vec![(KtlvType::State, vec![1])])
        .await
        .unwrap();

    assert_eq!(result[&KtlvType::State], vec![2]);
    assert_eq!(result[&KtlvType::PublicKey], vec![0xAB; 16]);
}

#[tokio::test]
async fn test_ktlv_without_value_is_pairing_error() {
    let mock = MockTransport::new();
    mock.push(Scripted::Body(vec![]));

    let header = RequestHeader::with_transaction_id(OpCode::CharacteristicWrite, InstanceId(0x21), TID);
    let err = characteristic(&mock, None)
        .write_ktlvs(&header, vec![(KtlvType::State, vec![1])])
        .await
        .unwrap_err();
    assert!(matches!(err, HapError::PairingProtocol(_)));
}

#[tokio::test]
async fn test_retry_reconnects_before_each_retry() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_reads = 2);
    mock.push(Scripted::Body(vec![0x01, 0x01, 0x07]));

    let attrs = characteristic(&mock, fast_retry(3)).read(&read_header()).await.unwrap();
    assert_eq!(attrs.value(), Some(&HapValue::Bytes(vec![0x07])));
    mock.with(|s| {
        assert_eq!(s.connects, 2);
        assert_eq!(s.reads, 3);
        // 请求只发送一次
        assert_eq!(s.writes.len(), 1);
    });
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_writes = 5);

    let err = characteristic(&mock, fast_retry(2)).read(&read_header()).await.unwrap_err();
    assert!(err.is_transport());
    mock.with(|s| {
        assert_eq!(s.connects, 1);
        assert_eq!(s.fail_writes, 3);
        assert_eq!(s.reads, 0);
    });
}

#[tokio::test]
async fn test_no_retry_without_policy() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_reads = 1);

    let err = characteristic(&mock, None).read(&read_header()).await.unwrap_err();
    assert!(matches!(err, HapError::Transport(TransportError::NotConnected)));
    mock.with(|s| assert_eq!(s.connects, 0));
}

#[tokio::test]
async fn test_validation_errors_are_not_retried() {
    let mock = MockTransport::new();
    mock.push(Scripted::Raw(response(TID.wrapping_add(1), StatusCode::Success, &[])));

    let err = characteristic(&mock, fast_retry(5)).read(&read_header()).await.unwrap_err();
    assert!(matches!(err, HapError::TransactionMismatch { .. }));
    mock.with(|s| {
        assert_eq!(s.connects, 0);
        assert_eq!(s.reads, 1);
    });
}

#[tokio::test]
async fn test_accessory_caches_characteristic_handles() {
    let mock = MockTransport::new();
    mock.push(Scripted::Body(vec![0x01, 0x01, 0x01]));

    let mut accessory = HapAccessory::new(mock.clone(), "AA:BB:CC:DD:EE:FF", AddressType::Random)
        .with_retry(fast_retry(2));
    accessory.connect().await.unwrap();

    let cid = accessory.characteristic(LOCK_STATE_UUID).await.unwrap().cid().await.unwrap();
    assert_eq!(cid, InstanceId(0x21));

    let chr = accessory.characteristic(LOCK_STATE_UUID).await.unwrap();
    // 第二次访问复用同一句柄，实例 ID 不再读取
    assert_eq!(chr.cid().await.unwrap(), InstanceId(0x21));
    let header = RequestHeader::with_transaction_id(OpCode::CharacteristicRead, InstanceId(0x21), TID);
    chr.read(&header).await.unwrap();

    assert_eq!(accessory.cached_characteristics(), 1);
    mock.with(|s| {
        assert_eq!(s.resolves, 1);
        assert_eq!(s.descriptor_reads, 1);
        assert_eq!(s.connects, 1);
    });
}

#[tokio::test]
async fn test_retry_instance_id_lookup() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_descriptor_reads = 2);

    let mut chr = characteristic(&mock, fast_retry(3));
    assert_eq!(chr.cid().await.unwrap(), InstanceId(0x21));
    assert_eq!(chr.cid().await.unwrap(), InstanceId(0x21));
    mock.with(|s| {
        assert_eq!(s.connects, 2);
        assert_eq!(s.descriptor_reads, 3);
    });
}

#[tokio::test]
async fn test_retry_characteristic_resolution() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_resolves = 2);

    let mut accessory = HapAccessory::new(mock.clone(), "AA:BB:CC:DD:EE:FF", AddressType::Public)
        .with_retry(fast_retry(3));
    accessory.characteristic(LOCK_STATE_UUID).await.unwrap();
    accessory.characteristic(LOCK_STATE_UUID).await.unwrap();

    assert_eq!(accessory.cached_characteristics(), 1);
    mock.with(|s| {
        assert_eq!(s.connects, 2);
        assert_eq!(s.resolves, 3);
    });
}

#[tokio::test]
async fn test_resolution_failure_is_not_cached() {
    let mock = MockTransport::new();
    mock.with(|s| s.fail_resolves = 1);

    let mut accessory = HapAccessory::new(mock.clone(), "AA:BB:CC:DD:EE:FF", AddressType::Public);
    let err = accessory.characteristic(LOCK_STATE_UUID).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(accessory.cached_characteristics(), 0);
}
