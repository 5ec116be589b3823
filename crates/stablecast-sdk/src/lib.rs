//! stablecast SDK - async stable multicast for small process groups
//!
//! This SDK runs the stablecast group protocol over real sockets (or an
//! in-process network for tests): processes discover each other by
//! multicasting a join announcement, are admitted with a registry
//! snapshot, and then exchange messages stamped with their row of a
//! matrix clock. Every member keeps delivered messages until the matrix
//! shows that all members have seen them.
//!
//! # Quick Start
//!
//! ```rust
//! use stablecast_sdk::{GroupConfigBuilder, MemoryNetwork, StableMulticast};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> stablecast_sdk::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let config = GroupConfigBuilder::new()
//!         .user_name("alice")
//!         .join_timeout(None)
//!         .build()?;
//!
//!     let alice = StableMulticast::new(
//!         config,
//!         Arc::new(network.attach_next()),
//!         |text: &str| println!("delivered: {text}"),
//!     )?;
//!     alice.start().await?;
//!     alice.found_group().await?;
//!
//!     alice.send("hello, group").await?;
//!     println!("{}", alice.dump_state());
//!     alice.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`config`] - Group address, capacity, join timeout
//! - [`transport`] - Transport trait and the in-memory network
//! - [`udp`] - Multicast + unicast UDP transport
//! - [`engine`] - Receive loops, join handshake, send paths
//! - [`deliver`] - Application delivery callbacks
//! - [`error`] - Error types

pub mod config;
pub mod deliver;
pub mod engine;
pub mod error;
pub mod transport;
pub mod udp;

// Re-exports for convenience
pub use config::{
    GroupConfig, GroupConfigBuilder, DEFAULT_CAPACITY, DEFAULT_GROUP_ADDR, DEFAULT_GROUP_PORT,
};
pub use deliver::{ChannelDeliver, Deliver};
pub use engine::{StableMulticast, Targets};
pub use error::{Result, SdkError};
pub use transport::{Endpoint, MemoryNetwork, MemoryTransport, Transport};
pub use udp::UdpTransport;

// Re-export commonly used types from stablecast-core
pub use stablecast_core::{
    BufferedMessage, CoreError, Envelope, GroupEvent, JoinState, MemberId, PeerInfo, StateDump,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::GroupConfig;
    pub use crate::deliver::{ChannelDeliver, Deliver};
    pub use crate::engine::{StableMulticast, Targets};
    pub use crate::error::SdkError;
    pub use crate::transport::{MemoryNetwork, Transport};
    pub use crate::udp::UdpTransport;
    pub use stablecast_core::{GroupEvent, MemberId};
}
