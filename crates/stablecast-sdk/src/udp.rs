//! UDP transport.
//!
//! The group endpoint is bound to `0.0.0.0:<group_port>` with
//! `SO_REUSEADDR` (and `SO_REUSEPORT` on unix) so several processes on one
//! host can all listen for join announcements. The point-to-point endpoint
//! is bound to the configured address and is the one advertised to peers.

use crate::config::GroupConfig;
use crate::error::Result;
use crate::transport::{encode_datagram, Endpoint, Transport};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use stablecast_core::{codec, Envelope, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info};

pub struct UdpTransport {
    group: UdpSocket,
    direct: UdpSocket,
    group_endpoint: SocketAddrV4,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Open both endpoints described by `config`.
    pub async fn bind(config: &GroupConfig) -> Result<Self> {
        let direct = UdpSocket::bind(config.bind_addr).await?;
        let local_addr = direct.local_addr()?;
        let group = open_group_socket(config.group_addr, config.group_port)?;
        info!(
            %local_addr,
            group = %config.group_endpoint(),
            "udp endpoints bound"
        );

        Ok(Self {
            group,
            direct,
            group_endpoint: config.group_endpoint(),
            local_addr,
        })
    }

    fn socket(&self, endpoint: Endpoint) -> &UdpSocket {
        match endpoint {
            Endpoint::Group => &self.group,
            Endpoint::Direct => &self.direct,
        }
    }
}

fn open_group_socket(group: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;

    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_nonblocking(true)?;
    debug!(%group, port, "joined multicast group");

    UdpSocket::from_std(socket.into())
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, envelope: &Envelope, addr: SocketAddr) -> Result<()> {
        let bytes = encode_datagram(envelope)?;
        self.direct.send_to(&bytes, addr).await?;
        Ok(())
    }

    async fn send_group(&self, envelope: &Envelope) -> Result<()> {
        let bytes = encode_datagram(envelope)?;
        self.group
            .send_to(&bytes, SocketAddr::V4(self.group_endpoint))
            .await?;
        Ok(())
    }

    async fn recv(&self, endpoint: Endpoint) -> Result<Envelope> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self.socket(endpoint).recv_from(&mut buf).await?;
        debug!(?endpoint, %from, len, "datagram received");
        Ok(codec::decode(&buf[..len])?)
    }
}
