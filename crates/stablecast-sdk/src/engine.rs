//! The stable multicast engine.
//!
//! [`StableMulticast`] drives a [`GroupState`] from two receive loops, one
//! per transport endpoint. Both loops and the send path take the same
//! `parking_lot::Mutex`, hold it only for the synchronous state transition,
//! and perform deliveries and network sends after releasing it. A reader
//! therefore never sees a message half-applied (row adopted but receipt not
//! yet counted), and a slow application callback never stalls the other
//! listener.

use crate::config::GroupConfig;
use crate::deliver::Deliver;
use crate::error::{Result, SdkError};
use crate::transport::{Endpoint, Transport};
use crate::udp::UdpTransport;
use parking_lot::Mutex;
use stablecast_core::{
    Envelope, GroupEvent, GroupState, JoinState, MemberId, Outcome, PeerInfo, StateDump,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Recipients of an outgoing message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Targets {
    /// Every registered member, including ourselves.
    #[default]
    All,
    /// A chosen subset of the membership.
    Members(Vec<MemberId>),
}

struct Shared<T: Transport> {
    config: GroupConfig,
    transport: Arc<T>,
    state: Mutex<GroupState>,
    deliver: Arc<dyn Deliver>,
    event_tx: broadcast::Sender<GroupEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A group member: join handshake, replicated sends, stability bookkeeping.
pub struct StableMulticast<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for StableMulticast<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl StableMulticast<UdpTransport> {
    /// Bind UDP endpoints for `config` and build an engine on them.
    pub async fn bind(config: GroupConfig, deliver: impl Deliver) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(UdpTransport::bind(&config).await?);
        Self::new(config, transport, deliver)
    }
}

impl<T: Transport> StableMulticast<T> {
    /// Create an engine. Nothing is sent until [`start`](Self::start).
    pub fn new(config: GroupConfig, transport: Arc<T>, deliver: impl Deliver) -> Result<Self> {
        config.validate()?;
        let local = PeerInfo::new(config.user_name.clone(), transport.local_addr());
        let state = GroupState::new(local, config.capacity);
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                state: Mutex::new(state),
                deliver: Arc::new(deliver),
                event_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &GroupConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    /// Spawn both listeners and multicast our `Join`.
    ///
    /// If `join_timeout` is set and nobody answers in time, the engine
    /// founds a new group with itself as member 0.
    pub async fn start(&self) -> Result<()> {
        {
            let mut tasks = self.shared.tasks.lock();
            if !tasks.is_empty() {
                return Err(SdkError::Config("engine already started".into()));
            }
            for endpoint in [Endpoint::Group, Endpoint::Direct] {
                let engine = self.clone();
                tasks.push(tokio::spawn(engine.listen(endpoint)));
            }
        }

        let join = self.shared.state.lock().begin_join();
        info!(name = %join.sender.name, addr = %join.sender.socket_addr(), "announcing join");
        self.shared.transport.send_group(&join).await?;

        if let Some(timeout) = self.shared.config.join_timeout {
            let engine = self.clone();
            let founder = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if engine.self_id().is_none() {
                    info!(?timeout, "no hello received, founding a new group");
                    if let Err(e) = engine.found_group().await {
                        warn!(error = %e, "could not found group");
                    }
                }
            });
            self.shared.tasks.lock().push(founder);
        }
        Ok(())
    }

    /// Stop the listeners. Pending receives are abandoned.
    pub fn shutdown(&self) {
        for task in self.shared.tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn listen(self, endpoint: Endpoint) {
        loop {
            match self.shared.transport.recv(endpoint).await {
                Ok(envelope) => {
                    debug!(
                        ?endpoint,
                        kind = %envelope.kind(),
                        from = %envelope.sender.name,
                        "envelope received"
                    );
                    if let Err(e) = self.process(envelope).await {
                        warn!(?endpoint, error = %e, "envelope rejected");
                    }
                }
                Err(e) if e.is_malformed() => {
                    warn!(?endpoint, error = %e, "dropping malformed datagram");
                }
                Err(e) => {
                    error!(?endpoint, error = %e, "listener stopped");
                    break;
                }
            }
        }
    }

    /// Apply one inbound envelope and carry out its side effects.
    pub async fn process(&self, envelope: Envelope) -> Result<()> {
        let outcome = self.shared.state.lock().handle(envelope)?;
        self.apply(outcome).await
    }

    /// Become member 0 of a new group, unless already a member.
    pub async fn found_group(&self) -> Result<()> {
        let outcome = self.shared.state.lock().found_group()?;
        self.apply(outcome).await
    }

    async fn apply(&self, outcome: Outcome) -> Result<()> {
        for text in &outcome.deliveries {
            self.shared.deliver.deliver(text);
        }
        for event in outcome.events {
            match &event {
                GroupEvent::Joined { id, members } => {
                    info!(%id, members, "joined group")
                }
                GroupEvent::MemberAdded { id, name } => info!(%id, %name, "member added"),
                GroupEvent::Delivered { .. } => {}
                GroupEvent::Evicted { from, text } => {
                    debug!(%from, %text, "stable message evicted")
                }
            }
            let _ = self.shared.event_tx.send(event);
        }

        let mut failure = None;
        for (envelope, addr) in &outcome.replies {
            if let Err(e) = self.shared.transport.send_to(envelope, *addr).await {
                warn!(%addr, kind = %envelope.kind(), error = %e, "reply not sent");
                failure = Some(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    fn resolve(state: &GroupState, targets: &Targets) -> Result<Vec<SocketAddr>> {
        match targets {
            Targets::All => Ok(state.members().iter().map(PeerInfo::socket_addr).collect()),
            Targets::Members(ids) => ids
                .iter()
                .map(|id| {
                    state
                        .members()
                        .get(*id)
                        .map(PeerInfo::socket_addr)
                        .ok_or(SdkError::UnknownMember(*id))
                })
                .collect(),
        }
    }

    /// Multicast `text` to every member. Returns the number of copies sent.
    pub async fn send(&self, text: impl Into<String>) -> Result<usize> {
        self.send_to(text, &Targets::All).await
    }

    /// Stamp `text` once and unicast it to each target.
    ///
    /// Targets are checked before stamping, so a rejected send does not
    /// advance our clock.
    pub async fn send_to(&self, text: impl Into<String>, targets: &Targets) -> Result<usize> {
        let (envelope, addrs) = {
            let mut state = self.shared.state.lock();
            let addrs = Self::resolve(&state, targets)?;
            (state.stamp_message(text)?, addrs)
        };

        let mut sent = 0;
        let mut failure = None;
        for addr in addrs {
            match self.shared.transport.send_to(&envelope, addr).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(%addr, error = %e, "copy not sent");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) if sent == 0 => Err(e),
            _ => Ok(sent),
        }
    }

    /// Stamp `text` without sending it.
    ///
    /// Together with [`transmit`](Self::transmit) this lets a front end ask
    /// for confirmation per recipient without holding the state lock.
    pub fn stamp(&self, text: impl Into<String>) -> Result<Envelope> {
        Ok(self.shared.state.lock().stamp_message(text)?)
    }

    /// Unicast an already stamped envelope to one member.
    pub async fn transmit(&self, envelope: &Envelope, target: MemberId) -> Result<()> {
        let addr = self
            .shared
            .state
            .lock()
            .members()
            .get(target)
            .map(PeerInfo::socket_addr)
            .ok_or(SdkError::UnknownMember(target))?;
        self.shared.transport.send_to(envelope, addr).await
    }

    /// Names of all registered members, in id order.
    pub fn list_members(&self) -> Vec<String> {
        self.shared.state.lock().members().names()
    }

    pub fn members(&self) -> Vec<PeerInfo> {
        self.shared.state.lock().members().to_vec()
    }

    pub fn local(&self) -> PeerInfo {
        self.shared.state.lock().local().clone()
    }

    pub fn self_id(&self) -> Option<MemberId> {
        self.shared.state.lock().self_id()
    }

    pub fn join_state(&self) -> JoinState {
        self.shared.state.lock().join_state()
    }

    /// Snapshot of the stability buffer and timestamp matrix.
    pub fn dump_state(&self) -> StateDump {
        self.shared.state.lock().dump()
    }

    /// Subscribe to group events.
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.shared.event_tx.subscribe()
    }
}
