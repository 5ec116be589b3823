//! Group configuration.

use crate::error::{Result, SdkError};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Well-known multicast group joined by every member.
pub const DEFAULT_GROUP_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 5, 1);
pub const DEFAULT_GROUP_PORT: u16 = 1236;
/// Default group capacity (matrix dimension).
pub const DEFAULT_CAPACITY: usize = 3;

/// Configuration for one group member.
#[derive(Clone, Debug)]
pub struct GroupConfig {
    /// Display name announced to the group.
    pub user_name: String,
    /// Address of the point-to-point endpoint. Must be a concrete address,
    /// since it is what peers reply to.
    pub bind_addr: SocketAddr,
    /// Multicast group used for join announcements.
    pub group_addr: Ipv4Addr,
    pub group_port: u16,
    /// Maximum number of members, fixed for the lifetime of the group.
    pub capacity: usize,
    /// Found a new group if no `Hello` arrives within this long.
    /// `None` waits forever.
    pub join_timeout: Option<Duration>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            user_name: "Anonymous".to_string(),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            group_addr: DEFAULT_GROUP_ADDR,
            group_port: DEFAULT_GROUP_PORT,
            capacity: DEFAULT_CAPACITY,
            join_timeout: Some(Duration::from_secs(1)),
        }
    }
}

impl GroupConfig {
    pub fn group_endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group_addr, self.group_port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SdkError::Config("capacity must be at least 1".into()));
        }
        if i32::try_from(self.capacity).is_err() {
            return Err(SdkError::Config(format!(
                "capacity {} does not fit a wire id",
                self.capacity
            )));
        }
        if !self.group_addr.is_multicast() {
            return Err(SdkError::Config(format!(
                "{} is not a multicast address",
                self.group_addr
            )));
        }
        if self.bind_addr.ip().is_unspecified() {
            return Err(SdkError::Config(format!(
                "bind address {} is not reachable by peers",
                self.bind_addr
            )));
        }
        Ok(())
    }
}

/// Builder for group configuration.
pub struct GroupConfigBuilder {
    config: GroupConfig,
}

impl GroupConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GroupConfig::default(),
        }
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn group(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.config.group_addr = addr;
        self.config.group_port = port;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn join_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<GroupConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GroupConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
