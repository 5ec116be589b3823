//! Datagram transport abstractions.
//!
//! A transport owns two endpoints: the group endpoint, where join
//! announcements are multicast, and the point-to-point endpoint, where
//! hellos and application messages arrive. Each endpoint has its own
//! blocking receive so the engine can run one listener per endpoint.

use crate::error::{Result, SdkError};
use async_trait::async_trait;
use parking_lot::RwLock;
use stablecast_core::{codec, Envelope, MAX_DATAGRAM_SIZE};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Which of the two endpoints to receive from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Group,
    Direct,
}

/// Abstract datagram transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address of the point-to-point endpoint, as advertised to peers.
    fn local_addr(&self) -> SocketAddr;

    /// Unicast one envelope.
    async fn send_to(&self, envelope: &Envelope, addr: SocketAddr) -> Result<()>;

    /// Multicast one envelope to the group endpoint of every process.
    async fn send_group(&self, envelope: &Envelope) -> Result<()>;

    /// Wait for the next envelope on `endpoint`.
    ///
    /// Undecodable datagrams surface as a malformed-message error; any
    /// other error means the endpoint is unusable.
    async fn recv(&self, endpoint: Endpoint) -> Result<Envelope>;
}

/// Encode an envelope, refusing anything that cannot fit one datagram.
pub fn encode_datagram(envelope: &Envelope) -> Result<Vec<u8>> {
    let bytes = codec::encode(envelope)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(SdkError::Transport(format!(
            "{} envelope of {} bytes exceeds the {} byte datagram limit",
            envelope.kind(),
            bytes.len(),
            MAX_DATAGRAM_SIZE
        )));
    }
    Ok(bytes)
}

type Inbox = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Default)]
struct Hub {
    direct: HashMap<SocketAddr, Inbox>,
    group: HashMap<SocketAddr, Inbox>,
    next_port: u16,
}

/// In-process datagram network for testing and simulation.
///
/// Behaves like a lossless LAN: unicast to an unknown address is silently
/// dropped and multicast loops back to the sender.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<RwLock<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a transport at `addr`.
    pub fn attach(&self, addr: SocketAddr) -> MemoryTransport {
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (group_tx, group_rx) = mpsc::unbounded_channel();
        {
            let mut hub = self.hub.write();
            hub.direct.insert(addr, direct_tx);
            hub.group.insert(addr, group_tx);
        }
        MemoryTransport {
            local_addr: addr,
            network: self.clone(),
            direct_rx: Mutex::new(direct_rx),
            group_rx: Mutex::new(group_rx),
        }
    }

    /// Attach a transport at the next free loopback port.
    pub fn attach_next(&self) -> MemoryTransport {
        let port = {
            let mut hub = self.hub.write();
            hub.next_port += 1;
            10_000 + hub.next_port
        };
        self.attach(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Close one endpoint of the transport at `addr`.
    ///
    /// Datagrams already queued are still received; after that `recv` on
    /// the endpoint fails with a transport error.
    pub fn close(&self, addr: SocketAddr, endpoint: Endpoint) {
        let mut hub = self.hub.write();
        match endpoint {
            Endpoint::Group => hub.group.remove(&addr),
            Endpoint::Direct => hub.direct.remove(&addr),
        };
    }

    /// Close both endpoints of the transport at `addr`.
    pub fn detach(&self, addr: SocketAddr) {
        self.close(addr, Endpoint::Group);
        self.close(addr, Endpoint::Direct);
    }

    /// Deliver raw bytes to the point-to-point endpoint at `to`.
    pub fn send_raw(&self, to: SocketAddr, bytes: Vec<u8>) {
        let inbox = self.hub.read().direct.get(&to).cloned();
        match inbox {
            Some(inbox) => {
                let _ = inbox.send(bytes);
            }
            None => debug!(%to, "no endpoint at address, datagram dropped"),
        }
    }

    fn multicast(&self, bytes: Vec<u8>) {
        let inboxes: Vec<Inbox> = self.hub.read().group.values().cloned().collect();
        for inbox in inboxes {
            let _ = inbox.send(bytes.clone());
        }
    }
}

/// One process's view of a [`MemoryNetwork`].
pub struct MemoryTransport {
    local_addr: SocketAddr,
    network: MemoryNetwork,
    direct_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    group_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, envelope: &Envelope, addr: SocketAddr) -> Result<()> {
        let bytes = encode_datagram(envelope)?;
        self.network.send_raw(addr, bytes);
        Ok(())
    }

    async fn send_group(&self, envelope: &Envelope) -> Result<()> {
        let bytes = encode_datagram(envelope)?;
        self.network.multicast(bytes);
        Ok(())
    }

    async fn recv(&self, endpoint: Endpoint) -> Result<Envelope> {
        let rx = match endpoint {
            Endpoint::Group => &self.group_rx,
            Endpoint::Direct => &self.direct_rx,
        };
        let bytes = rx.lock().await.recv().await.ok_or_else(|| {
            SdkError::Transport(format!("{:?} endpoint of {} closed", endpoint, self.local_addr))
        })?;
        Ok(codec::decode(&bytes)?)
    }
}
