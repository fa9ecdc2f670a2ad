use std::time::{Duration, Instant};

use helm_bms::exchange::{exchange, read_basic_info};
use helm_bms::frame::{self, BasicInfo, CMD_BASIC_INFO, STATUS_OK};
use helm_bms::{BatteryMonitor, BmsConfig, BmsError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const WINDOW: Duration = Duration::from_millis(100);

fn basic_payload(rsoc: u8) -> Vec<u8> {
    let mut p = vec![0u8; 23];
    p[BasicInfo::RSOC_OFFSET] = rsoc;
    p
}

/// Answers a single request with `reply`, then keeps the line open.
fn answer_once(mut dev: DuplexStream, reply: Vec<u8>) -> tokio::task::JoinHandle<DuplexStream> {
    tokio::spawn(async move {
        let mut req = [0u8; frame::REQUEST_LEN];
        dev.read_exact(&mut req).await.unwrap();
        assert_eq!(frame::decode_request(&req).unwrap(), CMD_BASIC_INFO);
        dev.write_all(&reply).await.unwrap();
        dev
    })
}

#[tokio::test]
async fn reads_rsoc_from_valid_response() {
    let (mut host, dev) = tokio::io::duplex(256);
    let reply = frame::encode_response(CMD_BASIC_INFO, STATUS_OK, &basic_payload(42)).to_vec();
    let device = answer_once(dev, reply);

    let info = read_basic_info(&mut host, WINDOW).await.unwrap();
    assert_eq!(info.rsoc, 42);
    device.await.unwrap();
}

#[tokio::test]
async fn stale_bytes_are_discarded_before_request() {
    let (mut host, mut dev) = tokio::io::duplex(256);
    // leftovers of some earlier exchange, ending in a terminator
    dev.write_all(&[0x01, 0x02, 0x77]).await.unwrap();

    let reply = frame::encode_response(CMD_BASIC_INFO, STATUS_OK, &basic_payload(90)).to_vec();
    let device = answer_once(dev, reply);

    let info = read_basic_info(&mut host, WINDOW).await.unwrap();
    assert_eq!(info.rsoc, 90);
    device.await.unwrap();
}

#[tokio::test]
async fn silent_device_times_out() {
    let (mut host, _dev) = tokio::io::duplex(256);
    let err = exchange(&mut host, CMD_BASIC_INFO, WINDOW).await.unwrap_err();
    assert!(matches!(err, BmsError::Timeout));
}

#[tokio::test]
async fn unterminated_response_is_timeout_not_malformed() {
    let (mut host, dev) = tokio::io::duplex(256);
    let full = frame::encode_response(CMD_BASIC_INFO, STATUS_OK, &basic_payload(42));
    let device = answer_once(dev, full[..12].to_vec());

    let err = read_basic_info(&mut host, WINDOW).await.unwrap_err();
    assert!(matches!(err, BmsError::Timeout), "got {:?}", err);
    drop(device);
}

#[tokio::test]
async fn reply_split_on_payload_terminator_byte_is_reassembled() {
    let (mut host, mut dev) = tokio::io::duplex(256);
    let mut payload = basic_payload(64);
    // 52.07 V, low byte equals the end marker
    payload[0..2].copy_from_slice(&0x1477u16.to_be_bytes());
    let reply = frame::encode_response(CMD_BASIC_INFO, STATUS_OK, &payload).to_vec();
    assert_eq!(reply[5], frame::END);

    let device = tokio::spawn(async move {
        let mut req = [0u8; frame::REQUEST_LEN];
        dev.read_exact(&mut req).await.unwrap();
        dev.write_all(&reply[..6]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        dev.write_all(&reply[6..]).await.unwrap();
        dev
    });

    let info = read_basic_info(&mut host, WINDOW).await.unwrap();
    assert_eq!(info.rsoc, 64);
    assert!((info.total_voltage_v - 52.07).abs() < 1e-3);
    device.await.unwrap();
}

#[tokio::test]
async fn device_status_is_propagated() {
    let (mut host, dev) = tokio::io::duplex(256);
    let reply = frame::encode_response(CMD_BASIC_INFO, 0x81, &[]).to_vec();
    let device = answer_once(dev, reply);

    let err = read_basic_info(&mut host, WINDOW).await.unwrap_err();
    assert!(matches!(err, BmsError::DeviceError(0x81)));
    device.await.unwrap();
}

#[tokio::test]
async fn monitor_treats_timeout_as_low_battery() {
    let (mut host, dev) = tokio::io::duplex(256);
    let reply = frame::encode_response(CMD_BASIC_INFO, STATUS_OK, &basic_payload(75)).to_vec();
    let device = answer_once(dev, reply);

    let mut monitor = BatteryMonitor::new(&BmsConfig { response_timeout_ms: Some(100), ..Default::default() });
    let st = monitor.poll(&mut host, Instant::now()).await;
    assert_eq!(st.percent, Some(75));
    assert!(!st.low);

    // device answered once and now stays silent
    let _dev = device.await.unwrap();
    let st = monitor.poll(&mut host, Instant::now()).await;
    assert_eq!(st.percent, Some(75));
    assert!(st.low);
}
