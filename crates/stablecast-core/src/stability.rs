//! Stability buffer.
//!
//! Every delivered message is kept here until the timestamp matrix shows
//! that all members have observed it. Delivery to the application never
//! waits on this buffer; it only bounds local history.

use crate::envelope::{Body, Envelope};
use crate::error::{CoreError, Result};
use crate::matrix::TimestampMatrix;
use crate::peer::MemberId;
use serde::{Deserialize, Serialize};

/// A delivered message awaiting stability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub sender: MemberId,
    pub sender_name: String,
    pub timestamp: Vec<i32>,
    pub text: String,
}

impl BufferedMessage {
    /// The sender's own counter at the time it stamped this message.
    pub fn sequence(&self) -> i32 {
        self.timestamp
            .get(self.sender.index())
            .copied()
            .unwrap_or(i32::MAX)
    }

    /// True once every row of the matrix has reached this message.
    pub fn is_stable(&self, matrix: &TimestampMatrix) -> bool {
        matrix
            .min_across_rows(self.sender)
            .map(|min| self.sequence() <= min)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StabilityBuffer {
    entries: Vec<BufferedMessage>,
}

impl StabilityBuffer {
    pub fn new() -> Self {
        StabilityBuffer {
            entries: Vec::new(),
        }
    }

    /// Append a delivered `Msg`.
    pub fn record_delivered(&mut self, envelope: &Envelope) -> Result<()> {
        let Body::Msg { timestamp, text } = &envelope.body else {
            return Err(CoreError::ProtocolViolation(format!(
                "only msg envelopes are buffered, got {}",
                envelope.kind()
            )));
        };
        let sender = envelope.sender.member_id().ok_or_else(|| {
            CoreError::ProtocolViolation(format!(
                "msg from '{}' carries no member id",
                envelope.sender.name
            ))
        })?;
        self.entries.push(BufferedMessage {
            sender,
            sender_name: envelope.sender.name.clone(),
            timestamp: timestamp.clone(),
            text: text.clone(),
        });
        Ok(())
    }

    /// Remove and return every entry that is now stable.
    pub fn evict_stable(&mut self, matrix: &TimestampMatrix) -> Vec<BufferedMessage> {
        let (stable, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.is_stable(matrix));
        self.entries = pending;
        stable
    }

    pub fn entries(&self) -> &[BufferedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
