//! Receive buffer filled by the reception loop.
//!
//! The buffer has one slot per expected datagram, indexed by arrival order.
//! A slot is either empty (a drop) or holds the stamped [`PacketRecord`]; the
//! payload's own sequence number is kept for display but never used to place
//! a record.

use crate::udp_packet::PacketRecord;
use crate::Result;

/// Fixed-capacity, arrival-ordered store of received packet records.
///
/// Storage for every slot is reserved up front and never grows; slots at or
/// past [`filled`](Self::filled) are the empty ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveBuffer {
    records: Vec<PacketRecord>,
    capacity: usize,
}

impl ReceiveBuffer {
    /// Creates a buffer of `capacity` empty slots. Allocation failure aborts;
    /// use [`try_new`](Self::try_new) where `capacity` comes from the operator.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Reserves `capacity` slots, reporting allocation failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`](crate::Error::Alloc) if the memory cannot be
    /// reserved.
    pub fn try_new(capacity: usize) -> Result<Self> {
        let mut records = Vec::new();
        records.try_reserve_exact(capacity)?;
        Ok(Self { records, capacity })
    }

    /// Number of expected packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled slots.
    pub fn filled(&self) -> usize {
        self.records.len()
    }

    /// Number of slots never filled.
    pub fn dropped(&self) -> usize {
        self.capacity - self.filled()
    }

    pub fn is_full(&self) -> bool {
        self.filled() == self.capacity
    }

    /// Stores `record` in the next free slot and returns its index, or `None`
    /// once every slot is taken.
    pub fn push(&mut self, record: PacketRecord) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.records.push(record);
        Some(self.records.len() - 1)
    }

    /// Record in slot `index`, if that slot was filled.
    pub fn get(&self, index: usize) -> Option<&PacketRecord> {
        self.records.get(index)
    }

    /// All slots in index order.
    pub fn slots(&self) -> impl Iterator<Item = Option<&PacketRecord>> {
        (0..self.capacity).map(move |i| self.records.get(i))
    }

    /// Filled slots in index order, with their index.
    pub fn records(&self) -> impl Iterator<Item = (usize, &PacketRecord)> {
        self.records.iter().enumerate()
    }

    /// Lowest-index filled slot.
    pub fn first_filled(&self) -> Option<(usize, &PacketRecord)> {
        self.records.first().map(|r| (0, r))
    }

    /// Highest-index filled slot.
    pub fn last_filled(&self) -> Option<(usize, &PacketRecord)> {
        self.records.last().map(|r| (self.records.len() - 1, r))
    }
}
