//! Envelope wire codec.
//!
//! Envelopes travel as a flat JSON record mirroring the logical schema:
//!
//! ```text
//! { "kind": "join" | "hello" | "msg",
//!   "timestamp": [i32, ...],          // msg only
//!   "text": "...",                    // empty unless msg
//!   "sender": { name, id, address, port },
//!   "members": [ { ... }, ... ] }     // hello only
//! ```
//!
//! Decoding checks that optional fields are present exactly for the kinds
//! that carry them; anything else is a [`CoreError::MalformedMessage`].

use crate::envelope::{Body, Envelope, Kind};
use crate::error::{CoreError, Result};
use crate::peer::{PeerInfo, UNASSIGNED_ID};
use serde::{Deserialize, Serialize};

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Serialize)]
struct WireRef<'a> {
    kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a [i32]>,
    text: &'a str,
    sender: &'a PeerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    members: Option<&'a [PeerInfo]>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireEnvelope {
    kind: Kind,
    #[serde(default)]
    timestamp: Option<Vec<i32>>,
    #[serde(default)]
    text: String,
    sender: PeerInfo,
    #[serde(default)]
    members: Option<Vec<PeerInfo>>,
}

/// Serialize an envelope into datagram bytes.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let wire = WireRef {
        kind: envelope.kind(),
        timestamp: envelope.timestamp(),
        text: envelope.text(),
        sender: &envelope.sender,
        members: envelope.members(),
    };
    Ok(serde_json::to_vec(&wire)?)
}

/// Parse datagram bytes into an envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let wire: WireEnvelope = serde_json::from_slice(bytes)?;
    wire.try_into()
}

fn malformed(kind: Kind, what: &str) -> CoreError {
    CoreError::MalformedMessage(format!("{} envelope {}", kind, what))
}

fn check_peer(peer: &PeerInfo) -> Result<()> {
    if peer.id < UNASSIGNED_ID {
        return Err(CoreError::MalformedMessage(format!(
            "peer '{}' has invalid id {}",
            peer.name, peer.id
        )));
    }
    Ok(())
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = CoreError;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        check_peer(&wire.sender)?;
        let kind = wire.kind;

        let body = match kind {
            Kind::Join | Kind::Hello if wire.timestamp.is_some() => {
                return Err(malformed(kind, "must not carry a timestamp"));
            }
            Kind::Join | Kind::Hello if !wire.text.is_empty() => {
                return Err(malformed(kind, "must not carry text"));
            }
            Kind::Join => {
                if wire.members.is_some() {
                    return Err(malformed(kind, "must not carry a member list"));
                }
                Body::Join
            }
            Kind::Hello => {
                let members = wire
                    .members
                    .ok_or_else(|| malformed(kind, "is missing its member list"))?;
                for peer in &members {
                    check_peer(peer)?;
                }
                Body::Hello { members }
            }
            Kind::Msg => {
                if wire.members.is_some() {
                    return Err(malformed(kind, "must not carry a member list"));
                }
                let timestamp = wire
                    .timestamp
                    .ok_or_else(|| malformed(kind, "is missing its timestamp"))?;
                Body::Msg {
                    timestamp,
                    text: wire.text,
                }
            }
        };

        Ok(Envelope {
            sender: wire.sender,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::MemberId;

    fn alice() -> PeerInfo {
        let mut peer = PeerInfo::new("alice", "127.0.0.1:6001".parse().unwrap());
        peer.assign(MemberId(0));
        peer
    }

    #[test]
    fn test_msg_roundtrip() {
        let env = Envelope::msg(alice(), vec![1, -1, -1], "hi");
        let bytes = encode(&env).unwrap();
        assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn test_hello_roundtrip_keeps_member_order() {
        let bob = PeerInfo::new("bob", "127.0.0.1:6002".parse().unwrap());
        let env = Envelope::hello(alice(), vec![alice(), bob]);
        let decoded = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(decoded.members().unwrap()[1].name, "bob");
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_join_wire_has_no_optional_fields() {
        let bytes = encode(&Envelope::join(alice())).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"kind\":\"join\""));
        assert!(!text.contains("timestamp"));
        assert!(!text.contains("members"));
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let raw = br#"{"kind":"leave","text":"","sender":{"name":"a","id":0,"address":"127.0.0.1","port":1}}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedMessage(_))));
    }

    #[test]
    fn test_join_with_members_is_malformed() {
        let raw = br#"{"kind":"join","text":"","sender":{"name":"a","id":-1,"address":"127.0.0.1","port":1},"members":[]}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedMessage(_))));
    }

    #[test]
    fn test_msg_without_timestamp_is_malformed() {
        let raw = br#"{"kind":"msg","text":"x","sender":{"name":"a","id":0,"address":"127.0.0.1","port":1}}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedMessage(_))));
    }

    #[test]
    fn test_hello_with_text_is_malformed() {
        let raw = br#"{"kind":"hello","text":"x","sender":{"name":"a","id":0,"address":"127.0.0.1","port":1},"members":[]}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedMessage(_))));
    }

    #[test]
    fn test_truncated_bytes_are_malformed() {
        let bytes = encode(&Envelope::msg(alice(), vec![0, 0, 0], "hello")).unwrap();
        let cut = &bytes[..bytes.len() / 2];
        assert!(matches!(decode(cut), Err(CoreError::MalformedMessage(_))));
    }

    #[test]
    fn test_invalid_sender_id_is_malformed() {
        let raw = br#"{"kind":"join","text":"","sender":{"name":"a","id":-7,"address":"127.0.0.1","port":1}}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedMessage(_))));
    }
}
