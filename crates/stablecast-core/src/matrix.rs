//! Vector timestamp matrix.
//!
//! An N×N table where `cells[i][j]` is the number of messages from member
//! `j` that member `i` is known (by this process) to have observed. Row
//! `self` is our own vector clock; the other rows are the latest vectors
//! gossiped by each peer in its messages. The minimum of a column over all
//! rows is how far every member has provably progressed for that sender.

use crate::error::{CoreError, Result};
use crate::peer::MemberId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell value for "nothing known yet".
pub const UNKNOWN: i32 = -1;

/// Fixed-capacity matrix of per-member vector clocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMatrix {
    cells: Vec<Vec<i32>>,
}

impl TimestampMatrix {
    /// Create a capacity×capacity matrix with every cell unknown.
    pub fn new(capacity: usize) -> Self {
        TimestampMatrix {
            cells: vec![vec![UNKNOWN; capacity]; capacity],
        }
    }

    /// Group capacity N.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn check(&self, id: MemberId) -> Result<usize> {
        if id.index() < self.capacity() {
            Ok(id.index())
        } else {
            Err(CoreError::ProtocolViolation(format!(
                "member {} outside group capacity {}",
                id,
                self.capacity()
            )))
        }
    }

    /// Read one cell.
    pub fn get(&self, row: MemberId, column: MemberId) -> Option<i32> {
        self.cells.get(row.index())?.get(column.index()).copied()
    }

    /// Start our own clock at zero once our id is known.
    pub fn init_self(&mut self, me: MemberId) -> Result<()> {
        let i = self.check(me)?;
        let cell = &mut self.cells[i][i];
        if *cell == UNKNOWN {
            *cell = 0;
        }
        Ok(())
    }

    /// Count one more message sent by us and return the new value.
    pub fn record_send(&mut self, me: MemberId) -> Result<i32> {
        let i = self.check(me)?;
        let cell = &mut self.cells[i][i];
        *cell = (*cell).max(0) + 1;
        Ok(*cell)
    }

    /// Snapshot of row `me`, suitable for stamping an outgoing message.
    pub fn stamp_row(&self, me: MemberId) -> Result<Vec<i32>> {
        let i = self.check(me)?;
        Ok(self.cells[i].clone())
    }

    /// Count one message received directly from `sender`.
    ///
    /// An unknown cell counts from zero, so the first receipt yields 1.
    pub fn record_direct_receipt(&mut self, me: MemberId, sender: MemberId) -> Result<i32> {
        let i = self.check(me)?;
        let j = self.check(sender)?;
        let cell = &mut self.cells[i][j];
        *cell = (*cell).max(0) + 1;
        Ok(*cell)
    }

    /// Replace row `sender` with the vector carried in its latest message.
    pub fn adopt_remote_row(&mut self, sender: MemberId, vector: &[i32]) -> Result<()> {
        let i = self.check(sender)?;
        if vector.len() != self.capacity() {
            return Err(CoreError::ProtocolViolation(format!(
                "timestamp of length {} does not match group capacity {}",
                vector.len(),
                self.capacity()
            )));
        }
        self.cells[i].copy_from_slice(vector);
        Ok(())
    }

    /// Minimum of `column` across every row. Unknown rows pin it at -1.
    pub fn min_across_rows(&self, column: MemberId) -> Result<i32> {
        let j = self.check(column)?;
        Ok(self
            .cells
            .iter()
            .map(|row| row[j])
            .min()
            .unwrap_or(UNKNOWN))
    }

    /// Copy of the whole table.
    pub fn rows(&self) -> Vec<Vec<i32>> {
        self.cells.clone()
    }
}

impl fmt::Display for TimestampMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.cells {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>3}", c)).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}
