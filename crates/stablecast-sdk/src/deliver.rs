//! Application delivery callback.
//!
//! The callback is a capability of the local process only. Peer records on
//! the wire never reference it.

use tokio::sync::mpsc;

/// Receives every message and membership notice for the application.
///
/// Called outside the engine's state lock; implementations must not block.
pub trait Deliver: Send + Sync + 'static {
    fn deliver(&self, text: &str);
}

impl<F> Deliver for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn deliver(&self, text: &str) {
        self(text)
    }
}

/// Forwards deliveries into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelDeliver(pub mpsc::UnboundedSender<String>);

impl ChannelDeliver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelDeliver(tx), rx)
    }
}

impl Deliver for ChannelDeliver {
    fn deliver(&self, text: &str) {
        // A closed receiver means the application is gone.
        let _ = self.0.send(text.to_string());
    }
}
