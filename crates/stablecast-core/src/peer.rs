//! Group member descriptors.
//!
//! A [`PeerInfo`] is pure data: it travels inside envelopes and never
//! carries the delivery callback of the process it describes. Ids are
//! `-1` until the join handshake assigns one; code that indexes the
//! timestamp matrix only ever sees a [`MemberId`], which cannot be
//! unassigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Wire value of an id that has not been assigned yet.
pub const UNASSIGNED_ID: i32 = -1;

/// An assigned member id (registry position).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub usize);

impl MemberId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One group member as seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Display name.
    pub name: String,
    /// Assigned id, or [`UNASSIGNED_ID`].
    pub id: i32,
    /// Address of the member's point-to-point endpoint.
    pub address: IpAddr,
    /// Port of the member's point-to-point endpoint.
    pub port: u16,
}

impl PeerInfo {
    /// Describe a member that has not joined yet.
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        PeerInfo {
            name: name.into(),
            id: UNASSIGNED_ID,
            address: addr.ip(),
            port: addr.port(),
        }
    }

    /// The assigned id, if any.
    pub fn member_id(&self) -> Option<MemberId> {
        usize::try_from(self.id).ok().map(MemberId)
    }

    pub fn assign(&mut self, id: MemberId) {
        self.id = id.0 as i32;
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
