//! Slot Registry — the sole shared mutable structure.
//!
//! One keyed map carries all per-key side state: the live draft slot, the
//! monotonic supersede ticket, and any guidance text captured before the
//! slot was triggered. Keeping these in one structure (instead of parallel
//! per-flag maps keyed separately) removes a whole class of key-sync bugs.
//! Independent keys never block or interfere with one another.

use std::collections::HashMap;

use crate::errors::DraftError;
use crate::slot::{DraftSlot, SlotKey};

#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<SlotKey, DraftSlot>,
    /// Monotonic per-key generation counter. Survives slot replacement so a
    /// superseded call can never match again.
    tickets: HashMap<SlotKey, u64>,
    /// Guidance text captured before the first trigger for a key.
    guidance: HashMap<SlotKey, String>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SlotKey) -> Option<&DraftSlot> {
        self.slots.get(&key)
    }

    pub fn upsert(&mut self, slot: DraftSlot) {
        self.slots.insert(slot.key, slot);
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<DraftSlot> {
        self.slots.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bumps the key's ticket and installs a fresh Generating slot under it,
    /// replacing (and thereby superseding) any previous instance wholesale.
    /// Returns the new ticket; the caller tags its transport call with it.
    pub fn begin_generation(&mut self, key: SlotKey) -> u64 {
        let ticket = self.bump_ticket(key);
        self.slots.insert(key, DraftSlot::generating(key, ticket));
        ticket
    }

    /// Advances the ticket without installing a new slot. Used by cancel:
    /// anything still in flight for the key becomes stale.
    pub fn bump_ticket(&mut self, key: SlotKey) -> u64 {
        let ticket = self.tickets.entry(key).or_insert(0);
        *ticket += 1;
        *ticket
    }

    pub fn current_ticket(&self, key: SlotKey) -> u64 {
        self.tickets.get(&key).copied().unwrap_or(0)
    }

    /// Applies `f` to the live slot only if `ticket` is still current for
    /// the key. Stale callers get `DraftError::Stale` and mutate nothing —
    /// this check is what serializes all mutation from in-flight streams.
    pub fn with_live<R>(
        &mut self,
        key: SlotKey,
        ticket: u64,
        f: impl FnOnce(&mut DraftSlot) -> Result<R, DraftError>,
    ) -> Result<R, DraftError> {
        if self.current_ticket(key) != ticket {
            return Err(DraftError::Stale { key });
        }
        let slot = self.slots.get_mut(&key).ok_or(DraftError::SlotNotFound(key))?;
        if slot.ticket() != ticket {
            return Err(DraftError::Stale { key });
        }
        f(slot)
    }

    /// Applies `f` to whatever slot is currently live, regardless of ticket.
    /// Used for user-initiated operations (edit, accept, discard) which
    /// always address the visible slot.
    pub fn modify<R>(
        &mut self,
        key: SlotKey,
        f: impl FnOnce(&mut DraftSlot) -> Result<R, DraftError>,
    ) -> Result<R, DraftError> {
        let slot = self.slots.get_mut(&key).ok_or(DraftError::SlotNotFound(key))?;
        f(slot)
    }

    // ── Guidance ────────────────────────────────────────────────────────

    pub fn set_guidance(&mut self, key: SlotKey, text: String) {
        self.guidance.insert(key, text);
    }

    pub fn guidance(&self, key: SlotKey) -> Option<&str> {
        self.guidance.get(&key).map(String::as_str)
    }

    pub fn take_guidance(&mut self, key: SlotKey) -> Option<String> {
        self.guidance.remove(&key)
    }
}
