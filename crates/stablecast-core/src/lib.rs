//! # stablecast-core
//!
//! Protocol core of the stablecast stable-multicast middleware.
//!
//! This crate provides:
//! - Envelope: the closed set of protocol messages (`Join`, `Hello`, `Msg`)
//! - Codec: the datagram encoding of envelopes
//! - Timestamp matrix: one vector clock per member, gossiped in messages
//! - Membership registry: ordered, capacity-bounded member list
//! - Stability buffer: delivered messages not yet seen by everyone
//! - Group state: the join/hello/msg state machine tying them together
//!
//! Nothing here performs I/O. The `stablecast-sdk` crate drives a
//! [`GroupState`] from network receive loops.
//!
//! ## Stability
//!
//! A message from member `s` stamped with sequence `t = timestamp[s]` is
//! stable once `t <= min_i MC[i][s]`: every row of the matrix agrees that
//! `s` has progressed at least that far.
//!
//! ```rust
//! use stablecast_core::{GroupState, PeerInfo};
//!
//! let me = PeerInfo::new("alice", "127.0.0.1:6001".parse().unwrap());
//! let mut state = GroupState::new(me, 3);
//! state.begin_join();
//! state.found_group().unwrap();
//!
//! let msg = state.stamp_message("hello").unwrap();
//! assert_eq!(msg.timestamp().unwrap(), &[1, -1, -1]);
//! ```

pub mod codec;
pub mod envelope;
pub mod error;
pub mod group;
pub mod matrix;
pub mod membership;
pub mod peer;
pub mod stability;

pub use codec::{decode, encode, MAX_DATAGRAM_SIZE};
pub use envelope::{Body, Envelope, Kind};
pub use error::{CoreError, Result};
pub use group::{GroupEvent, GroupState, JoinState, Outcome, StateDump};
pub use matrix::{TimestampMatrix, UNKNOWN};
pub use membership::Membership;
pub use peer::{MemberId, PeerInfo, UNASSIGNED_ID};
pub use stability::{BufferedMessage, StabilityBuffer};
