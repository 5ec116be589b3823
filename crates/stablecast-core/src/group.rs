//! Group protocol state machine.
//!
//! [`GroupState`] owns the membership registry, the timestamp matrix and
//! the stability buffer of one process and applies inbound envelopes to
//! them. It performs no I/O: every handler returns an [`Outcome`] listing
//! the notices to hand to the application and the replies to transmit, so
//! the caller can perform them after releasing whatever lock guards the
//! state.
//!
//! ```text
//! Unjoined --begin_join--> Joining --first Hello / found_group--> Member
//! ```
//!
//! Handlers validate before they mutate. An envelope that is rejected
//! leaves the state exactly as it was.

use crate::envelope::{Body, Envelope};
use crate::error::{CoreError, Result};
use crate::matrix::TimestampMatrix;
use crate::membership::Membership;
use crate::peer::{MemberId, PeerInfo};
use crate::stability::{BufferedMessage, StabilityBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

/// Join progress of the local process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinState {
    Unjoined,
    Joining,
    Member(MemberId),
}

/// Notable state changes, for observers of a running group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupEvent {
    /// The local process completed the handshake.
    Joined { id: MemberId, members: usize },
    /// A newcomer was appended to the local registry.
    MemberAdded { id: MemberId, name: String },
    /// A message was handed to the application.
    Delivered { from: MemberId, text: String },
    /// A buffered message became stable and was discarded.
    Evicted { from: MemberId, text: String },
}

/// Side effects produced by a state transition.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    /// Text for the local delivery callback, in order.
    pub deliveries: Vec<String>,
    /// Envelopes to unicast, with their destination.
    pub replies: Vec<(Envelope, SocketAddr)>,
    pub events: Vec<GroupEvent>,
}

/// Read-only copy of the bookkeeping state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    pub buffer: Vec<BufferedMessage>,
    pub matrix: Vec<Vec<i32>>,
}

impl fmt::Display for StateDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buffer ({} pending):", self.buffer.len())?;
        for entry in &self.buffer {
            writeln!(f, "  {}: {} {:?}", entry.sender_name, entry.text, entry.timestamp)?;
        }
        writeln!(f, "Timestamp matrix:")?;
        for row in &self.matrix {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>3}", c)).collect();
            writeln!(f, "  [{}]", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Membership, matrix and buffer of one process.
#[derive(Clone, Debug)]
pub struct GroupState {
    local: PeerInfo,
    join: JoinState,
    members: Membership,
    matrix: TimestampMatrix,
    buffer: StabilityBuffer,
}

impl GroupState {
    pub fn new(local: PeerInfo, capacity: usize) -> Self {
        GroupState {
            local,
            join: JoinState::Unjoined,
            members: Membership::new(capacity),
            matrix: TimestampMatrix::new(capacity),
            buffer: StabilityBuffer::new(),
        }
    }

    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    pub fn join_state(&self) -> JoinState {
        self.join
    }

    pub fn self_id(&self) -> Option<MemberId> {
        match self.join {
            JoinState::Member(id) => Some(id),
            _ => None,
        }
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    pub fn matrix(&self) -> &TimestampMatrix {
        &self.matrix
    }

    pub fn buffer(&self) -> &StabilityBuffer {
        &self.buffer
    }

    pub fn dump(&self) -> StateDump {
        StateDump {
            buffer: self.buffer.entries().to_vec(),
            matrix: self.matrix.rows(),
        }
    }

    /// Move to `Joining` and build the announcement to multicast.
    pub fn begin_join(&mut self) -> Envelope {
        if self.join == JoinState::Unjoined {
            self.join = JoinState::Joining;
        }
        Envelope::join(self.local.clone())
    }

    /// Become the first member of a group nobody answered for.
    ///
    /// A no-op once the process is already a member.
    pub fn found_group(&mut self) -> Result<Outcome> {
        if self.self_id().is_some() {
            return Ok(Outcome::default());
        }
        let mut registry = Membership::new(self.members.capacity());
        let id = registry.admit(self.local.clone())?;
        self.matrix.init_self(id)?;
        self.members = registry;
        self.local.assign(id);
        self.join = JoinState::Member(id);

        Ok(Outcome {
            events: vec![GroupEvent::Joined { id, members: 1 }],
            ..Outcome::default()
        })
    }

    /// Apply one inbound envelope.
    pub fn handle(&mut self, envelope: Envelope) -> Result<Outcome> {
        match envelope.body {
            Body::Join => self.on_join(envelope.sender),
            Body::Hello { members } => self.on_hello(envelope.sender, members),
            Body::Msg { .. } => self.on_msg(envelope),
        }
    }

    fn on_join(&mut self, joiner: PeerInfo) -> Result<Outcome> {
        let addr = joiner.socket_addr();
        if addr == self.local.socket_addr() {
            debug!(name = %joiner.name, "ignoring our own join announcement");
            return Ok(Outcome::default());
        }
        if self.self_id().is_none() {
            debug!(name = %joiner.name, "ignoring join while not yet a member");
            return Ok(Outcome::default());
        }

        let mut outcome = Outcome::default();
        if self.members.find_by_addr(addr).is_some() {
            debug!(name = %joiner.name, %addr, "repeated join, resending snapshot");
        } else {
            let name = joiner.name.clone();
            let id = self.members.admit(joiner)?;
            outcome
                .deliveries
                .push(format!("Welcome {} to the group!", name));
            outcome.events.push(GroupEvent::MemberAdded { id, name });
        }

        let hello = Envelope::hello(self.local.clone(), self.members.to_vec());
        outcome.replies.push((hello, addr));
        Ok(outcome)
    }

    fn on_hello(&mut self, responder: PeerInfo, snapshot: Vec<PeerInfo>) -> Result<Outcome> {
        // A fresh joiner is the last entry; a process rejoining from an
        // address the group already knows keeps its earlier position.
        let (position, ours) = snapshot
            .iter()
            .enumerate()
            .find(|(_, p)| p.socket_addr() == self.local.socket_addr())
            .ok_or_else(|| {
                CoreError::ProtocolViolation(format!(
                    "hello from '{}' does not list the local process",
                    responder.name
                ))
            })?;
        let offered = MemberId(position);
        if ours.member_id() != Some(offered) {
            return Err(CoreError::ProtocolViolation(format!(
                "hello from '{}' lists us with id {} at position {}",
                responder.name,
                ours.id,
                offered.index()
            )));
        }

        if let JoinState::Member(current) = self.join {
            if current == offered {
                debug!(from = %responder.name, "duplicate hello ignored");
                return Ok(Outcome::default());
            }
            return Err(CoreError::ProtocolViolation(format!(
                "hello from '{}' offers id {} but we already hold {}",
                responder.name, offered, current
            )));
        }

        if offered.index() >= self.matrix.capacity() {
            return Err(CoreError::CapacityExceeded {
                capacity: self.matrix.capacity(),
            });
        }
        let members = snapshot.len();
        self.members.adopt_snapshot(snapshot)?;
        self.matrix.init_self(offered)?;
        self.local.assign(offered);
        self.join = JoinState::Member(offered);

        Ok(Outcome {
            events: vec![GroupEvent::Joined {
                id: offered,
                members,
            }],
            ..Outcome::default()
        })
    }

    fn on_msg(&mut self, envelope: Envelope) -> Result<Outcome> {
        let me = self.self_id().ok_or(CoreError::NotJoined)?;
        let sender = envelope.sender.member_id().ok_or_else(|| {
            CoreError::ProtocolViolation(format!(
                "msg from '{}' has no member id",
                envelope.sender.name
            ))
        })?;
        let known = self.members.get(sender).ok_or_else(|| {
            CoreError::ProtocolViolation(format!(
                "msg from unregistered member {} ('{}')",
                sender, envelope.sender.name
            ))
        })?;
        let from_self = sender == me;
        if from_self && envelope.sender.socket_addr() != self.local.socket_addr() {
            return Err(CoreError::ProtocolViolation(format!(
                "'{}' claims our id {}",
                envelope.sender.name, me
            )));
        }
        if known.socket_addr() != envelope.sender.socket_addr() {
            return Err(CoreError::ProtocolViolation(format!(
                "msg from '{}' does not match registry entry {} ('{}')",
                envelope.sender.name, sender, known.name
            )));
        }
        let Body::Msg { timestamp, text } = &envelope.body else {
            return Err(CoreError::ProtocolViolation(format!(
                "expected msg envelope, got {}",
                envelope.kind()
            )));
        };
        let text = text.clone();
        if timestamp.len() != self.matrix.capacity() {
            return Err(CoreError::ProtocolViolation(format!(
                "timestamp of length {} does not match group capacity {}",
                timestamp.len(),
                self.matrix.capacity()
            )));
        }

        self.buffer.record_delivered(&envelope)?;
        if !from_self {
            self.matrix.adopt_remote_row(sender, timestamp)?;
            self.matrix.record_direct_receipt(me, sender)?;
        }

        let mut outcome = Outcome {
            deliveries: vec![text.clone()],
            events: vec![GroupEvent::Delivered { from: sender, text }],
            ..Outcome::default()
        };
        for entry in self.buffer.evict_stable(&self.matrix) {
            debug!(from = %entry.sender_name, text = %entry.text, "message stable, removed from buffer");
            outcome.events.push(GroupEvent::Evicted {
                from: entry.sender,
                text: entry.text,
            });
        }
        Ok(outcome)
    }

    /// Count a local send and stamp a new message with our row.
    pub fn stamp_message(&mut self, text: impl Into<String>) -> Result<Envelope> {
        let me = self.self_id().ok_or(CoreError::NotJoined)?;
        self.matrix.record_send(me)?;
        let stamp = self.matrix.stamp_row(me)?;
        Ok(Envelope::msg(self.local.clone(), stamp, text))
    }
}
