//! Sequence-fenced display panels
//!
//! Every request that will update a panel takes a [`Ticket`] first. Issuing a
//! ticket and committing a result happen under the same lock, so only the
//! newest ticket can ever write; responses for older tickets are dropped
//! regardless of arrival order.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Proof of a request issued against a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
struct Slot<T> {
    issued: u64,
    value: T,
}

/// A displayed value plus the sequence fence guarding it
#[derive(Debug)]
pub struct Panel<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> Panel<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(Slot { issued: 0, value: initial }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new ticket, superseding all earlier ones. `pending`, when
    /// given, is displayed until the ticket resolves.
    pub fn issue(&self, pending: Option<T>) -> Ticket {
        let mut slot = self.lock();
        slot.issued += 1;
        if let Some(value) = pending {
            slot.value = value;
        }
        Ticket(slot.issued)
    }

    /// Write `value` if `ticket` is still the newest. Returns whether it was
    /// written.
    pub fn commit(&self, ticket: Ticket, value: T) -> bool {
        let mut slot = self.lock();
        if slot.issued != ticket.0 {
            return false;
        }
        slot.value = value;
        true
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.lock().issued == ticket.0
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }
}

impl<T: Clone + Default> Default for Panel<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
