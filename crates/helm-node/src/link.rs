use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use helm_proto::WireMessage;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hal::{deliver, DatagramSink, InboundTx};

/// Largest datagram read; anything longer is truncated and then fails to
/// decode as either message.
const RECV_BUF: usize = 64;

/// Datagram link to exactly one peer over UDP.
#[derive(Clone)]
pub struct UdpLink {
    sock: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpLink {
    pub async fn open(bind: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let sock = UdpSocket::bind(bind)
            .await
            .with_context(|| format!("bind udp {}", bind))?;
        info!("link: bound {} -> peer {}", sock.local_addr()?, peer);
        Ok(Self { sock: Arc::new(sock), peer })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    /// Spawns the receive context. It only decodes and hands the record
    /// over; it never touches loop state.
    pub fn spawn_receiver<M>(&self, tx: InboundTx<M>) -> JoinHandle<()>
    where
        M: WireMessage + Send + Sync + 'static,
    {
        let sock = self.sock.clone();
        let peer = self.peer;
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUF];
            loop {
                let (n, from) = match sock.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(e) => {
                        // ICMP unreachable from a peer that is not up yet lands here
                        debug!("link: recv error: {}", e);
                        continue;
                    }
                };
                if from != peer {
                    debug!("link: ignoring {} bytes from {}", n, from);
                    continue;
                }
                if let Err(e) = deliver::<M>(&buf[..n], Instant::now(), &tx) {
                    warn!("link: dropped datagram: {}", e);
                }
                if tx.is_closed() {
                    break;
                }
            }
        })
    }
}

impl DatagramSink for UdpLink {
    fn send_datagram(&mut self, bytes: &[u8]) -> Result<()> {
        // non-blocking; a full socket buffer just loses this copy of the state
        self.sock
            .try_send_to(bytes, self.peer)
            .with_context(|| format!("send to {}", self.peer))?;
        Ok(())
    }
}
