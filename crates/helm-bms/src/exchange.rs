use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::BmsError;
use crate::frame::{self, BasicInfo};

pub fn open_serial(dev: &str, baud: u32) -> Result<SerialStream> {
    tokio_serial::new(dev, baud)
        .open_native_async()
        .with_context(|| format!("open bms serial device {}", dev))
}

/// Drops whatever an earlier exchange left in the receive buffer.
/// Only bytes that are ready right now are consumed.
pub async fn discard_input<P>(port: &mut P) -> Result<usize, BmsError>
where
    P: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 64];
    let mut dropped = 0;
    loop {
        match tokio::time::timeout(Duration::ZERO, port.read(&mut scratch)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => dropped += n,
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    Ok(dropped)
}

async fn read_until_terminated<P>(port: &mut P, buf: &mut BytesMut) -> Result<(), BmsError>
where
    P: AsyncRead + Unpin,
{
    while !frame::is_terminated(buf) {
        let n = port.read_buf(buf).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
    }
    Ok(())
}

/// One request/response round trip. The returned bytes are not validated.
pub async fn exchange<P>(port: &mut P, command: u8, window: Duration) -> Result<BytesMut, BmsError>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    let stale = discard_input(port).await?;
    if stale > 0 {
        debug!("bms: discarded {} stale bytes", stale);
    }

    let request = frame::encode_request(command);
    port.write_all(&request).await?;
    port.flush().await?;
    debug!("bms: tx {}", hex::encode(request));

    let mut buf = BytesMut::with_capacity(64);
    let outcome = tokio::time::timeout(window, read_until_terminated(port, &mut buf)).await;
    match outcome {
        Ok(res) => res?,
        Err(_) => {
            debug!("bms: timeout with {} bytes buffered: {}", buf.len(), hex::encode(&buf));
            return Err(BmsError::Timeout);
        }
    }
    debug!("bms: rx {}", hex::encode(&buf));
    Ok(buf)
}

pub async fn read_basic_info<P>(port: &mut P, window: Duration) -> Result<BasicInfo, BmsError>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    let raw = exchange(port, frame::CMD_BASIC_INFO, window).await?;
    let payload = frame::parse_response(frame::CMD_BASIC_INFO, &raw)?;
    BasicInfo::from_payload(payload)
}
