//! Membership registry.
//!
//! An append-only, ordered list of group members. A member's position is
//! its id. The registry never grows past the group capacity, which is also
//! the dimension of the timestamp matrix.

use crate::error::{CoreError, Result};
use crate::peer::{MemberId, PeerInfo};
use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct Membership {
    peers: Vec<PeerInfo>,
    capacity: usize,
}

impl Membership {
    pub fn new(capacity: usize) -> Self {
        Membership {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Append a newcomer, assigning it the next id.
    pub fn admit(&mut self, mut peer: PeerInfo) -> Result<MemberId> {
        if self.peers.len() >= self.capacity {
            return Err(CoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let id = MemberId(self.peers.len());
        peer.assign(id);
        self.peers.push(peer);
        Ok(id)
    }

    /// Replace the registry with a snapshot received in a `Hello`.
    ///
    /// Every entry must carry the id matching its position.
    pub fn adopt_snapshot(&mut self, snapshot: Vec<PeerInfo>) -> Result<()> {
        if snapshot.len() > self.capacity {
            return Err(CoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        for (position, peer) in snapshot.iter().enumerate() {
            if peer.member_id() != Some(MemberId(position)) {
                return Err(CoreError::ProtocolViolation(format!(
                    "snapshot entry '{}' at position {} carries id {}",
                    peer.name, position, peer.id
                )));
            }
        }
        self.peers = snapshot;
        Ok(())
    }

    pub fn get(&self, id: MemberId) -> Option<&PeerInfo> {
        self.peers.get(id.index())
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&PeerInfo> {
        self.peers.iter().find(|p| p.socket_addr() == addr)
    }

    pub fn names(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.iter()
    }

    pub fn to_vec(&self) -> Vec<PeerInfo> {
        self.peers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, port: u16) -> PeerInfo {
        PeerInfo::new(name, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn test_admit_assigns_positions() {
        let mut reg = Membership::new(3);
        assert_eq!(reg.admit(peer("a", 1)).unwrap(), MemberId(0));
        assert_eq!(reg.admit(peer("b", 2)).unwrap(), MemberId(1));
        assert_eq!(reg.get(MemberId(1)).unwrap().id, 1);
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_admit_past_capacity_fails() {
        let mut reg = Membership::new(1);
        reg.admit(peer("a", 1)).unwrap();
        assert_eq!(
            reg.admit(peer("b", 2)),
            Err(CoreError::CapacityExceeded { capacity: 1 })
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_find_by_addr() {
        let mut reg = Membership::new(3);
        reg.admit(peer("a", 1)).unwrap();
        reg.admit(peer("b", 2)).unwrap();
        let found = reg.find_by_addr(SocketAddr::from(([127, 0, 0, 1], 2))).unwrap();
        assert_eq!(found.name, "b");
        assert!(reg.find_by_addr(SocketAddr::from(([127, 0, 0, 1], 9))).is_none());
    }

    #[test]
    fn test_snapshot_must_be_position_indexed() {
        let mut reg = Membership::new(3);
        let mut a = peer("a", 1);
        a.assign(MemberId(1));
        assert!(matches!(
            reg.adopt_snapshot(vec![a]),
            Err(CoreError::ProtocolViolation(_))
        ));

        let mut a = peer("a", 1);
        a.assign(MemberId(0));
        reg.adopt_snapshot(vec![a]).unwrap();
        assert_eq!(reg.len(), 1);
    }
}
