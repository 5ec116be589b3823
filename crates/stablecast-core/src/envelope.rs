//! The protocol message envelope.
//!
//! Commands form a closed enum, so every field that only makes sense for
//! one kind lives inside that variant and cannot be present elsewhere.

use crate::peer::PeerInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire tag of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Join,
    Hello,
    Msg,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Join => write!(f, "join"),
            Kind::Hello => write!(f, "hello"),
            Kind::Msg => write!(f, "msg"),
        }
    }
}

/// Kind-specific content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// Announce a new process to the group.
    Join,
    /// Reply to a joiner with the full membership snapshot.
    Hello { members: Vec<PeerInfo> },
    /// Application message stamped with the sender's matrix row.
    Msg { timestamp: Vec<i32>, text: String },
}

/// A single protocol exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub sender: PeerInfo,
    pub body: Body,
}

impl Envelope {
    pub fn join(sender: PeerInfo) -> Self {
        Envelope {
            sender,
            body: Body::Join,
        }
    }

    pub fn hello(sender: PeerInfo, members: Vec<PeerInfo>) -> Self {
        Envelope {
            sender,
            body: Body::Hello { members },
        }
    }

    pub fn msg(sender: PeerInfo, timestamp: Vec<i32>, text: impl Into<String>) -> Self {
        Envelope {
            sender,
            body: Body::Msg {
                timestamp,
                text: text.into(),
            },
        }
    }

    pub fn kind(&self) -> Kind {
        match self.body {
            Body::Join => Kind::Join,
            Body::Hello { .. } => Kind::Hello,
            Body::Msg { .. } => Kind::Msg,
        }
    }

    /// Payload text; empty for `Join` and `Hello`.
    pub fn text(&self) -> &str {
        match &self.body {
            Body::Msg { text, .. } => text,
            _ => "",
        }
    }

    /// Carried vector timestamp, present only for `Msg`.
    pub fn timestamp(&self) -> Option<&[i32]> {
        match &self.body {
            Body::Msg { timestamp, .. } => Some(timestamp),
            _ => None,
        }
    }

    /// Carried membership snapshot, present only for `Hello`.
    pub fn members(&self) -> Option<&[PeerInfo]> {
        match &self.body {
            Body::Hello { members } => Some(members),
            _ => None,
        }
    }
}
