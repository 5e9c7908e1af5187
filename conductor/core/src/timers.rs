//! Epoch-Guarded Timer Wheel
//!
//! Every timed concern in the session (auto-revert, idle, blink, pacing) is a
//! slot in one [`TimerWheel`]. Each slot holds at most one live deadline.
//!
//! Scheduling or cancelling a slot bumps its epoch. Heap entries carry the
//! epoch they were scheduled under, so an entry that surfaces after its slot
//! moved on is stale and is dropped without firing.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use tokio::time::Instant;

use crate::streaming::StreamKind;

/// Timer slots owned by the session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Return to the previous expression
    AutoRevert,
    /// Fall asleep after inactivity
    Idle,
    /// Wait between periodic blinks
    BlinkInterval,
    /// Advance the blink animation one phase
    BlinkPhase,
    /// Reveal the next characters of a stream channel
    Pacer(StreamKind),
}

/// A timer that came due and was still current
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expired<K> {
    /// Which slot fired
    pub kind: K,
    /// Deadline it was scheduled for
    pub deadline: Instant,
    /// Epoch it was scheduled under
    pub epoch: u64,
}

#[derive(Debug)]
struct Entry<K> {
    deadline: Instant,
    seq: u64,
    epoch: u64,
    kind: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    // Reversed: BinaryHeap is a max-heap, we want the earliest deadline on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    epoch: u64,
    deadline: Option<Instant>,
}

/// Single-owner timer set with per-slot generation counters
#[derive(Debug)]
pub struct TimerWheel<K> {
    heap: BinaryHeap<Entry<K>>,
    slots: HashMap<K, Slot>,
    seq: u64,
    stale_dropped: u64,
}

impl<K: Copy + Eq + Hash> Default for TimerWheel<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> TimerWheel<K> {
    /// Create an empty wheel
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            seq: 0,
            stale_dropped: 0,
        }
    }

    /// Schedule `kind` to fire at `deadline`, superseding any earlier deadline
    ///
    /// Returns the epoch of the new schedule.
    pub fn schedule(&mut self, kind: K, deadline: Instant) -> u64 {
        let slot = self.slots.entry(kind).or_default();
        slot.epoch += 1;
        slot.deadline = Some(deadline);
        let epoch = slot.epoch;

        self.seq += 1;
        self.heap.push(Entry {
            deadline,
            seq: self.seq,
            epoch,
            kind,
        });
        epoch
    }

    /// Cancel `kind`; returns whether it was armed
    pub fn cancel(&mut self, kind: K) -> bool {
        match self.slots.get_mut(&kind) {
            Some(slot) => {
                slot.epoch += 1;
                slot.deadline.take().is_some()
            }
            None => false,
        }
    }

    /// Whether `kind` has a live deadline
    #[must_use]
    pub fn is_armed(&self, kind: K) -> bool {
        self.deadline_of(kind).is_some()
    }

    /// Live deadline of `kind`
    #[must_use]
    pub fn deadline_of(&self, kind: K) -> Option<Instant> {
        self.slots.get(&kind).and_then(|slot| slot.deadline)
    }

    /// Whether `epoch` is still the live schedule of `kind`
    #[must_use]
    pub fn is_current(&self, kind: K, epoch: u64) -> bool {
        self.slots
            .get(&kind)
            .is_some_and(|slot| slot.epoch == epoch && slot.deadline.is_some())
    }

    /// Earliest live deadline, discarding stale entries on the way
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale_head();
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Pop the earliest live timer due at `now`
    ///
    /// With `inclusive = false` only deadlines strictly before `now` count,
    /// which lets callers order inputs ahead of timers due at the same
    /// instant.
    pub fn pop_due(&mut self, now: Instant, inclusive: bool) -> Option<Expired<K>> {
        self.discard_stale_head();
        let entry = self.heap.peek()?;
        let due = if inclusive {
            entry.deadline <= now
        } else {
            entry.deadline < now
        };
        if !due {
            return None;
        }

        let entry = self.heap.pop()?;
        if let Some(slot) = self.slots.get_mut(&entry.kind) {
            slot.deadline = None;
        }
        Some(Expired {
            kind: entry.kind,
            deadline: entry.deadline,
            epoch: entry.epoch,
        })
    }

    /// Number of stale entries dropped so far
    #[must_use]
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Number of live timers
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.slots.values().filter(|s| s.deadline.is_some()).count()
    }

    fn discard_stale_head(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.is_current(entry.kind, entry.epoch) {
                break;
            }
            self.heap.pop();
            self.stale_dropped += 1;
        }
    }
}
