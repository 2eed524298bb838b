//! Fixed table of worker slots.
//!
//! Each slot is either free or holds the metadata of the task running in it.
//! Completion looks the task up by slot index, so nothing about the task has
//! to travel with the spawned runner future.

use std::time::Instant;

/// A task that currently occupies a worker slot.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Command template as it was queued (before substitution).
    pub template: String,
    /// Command actually handed to the runner.
    pub command: String,
    pub started_at: Instant,
}

#[derive(Debug)]
pub struct WorkerSlots {
    slots: Vec<Option<InFlight>>,
}

impl WorkerSlots {
    /// Create `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn busy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_busy(&self, worker_id: usize) -> bool {
        matches!(self.slots.get(worker_id), Some(Some(_)))
    }

    /// Smallest free slot index, if any.
    pub fn lowest_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Place `task` into the lowest free slot and return its index.
    pub fn claim(&mut self, task: InFlight) -> Option<usize> {
        let worker_id = self.lowest_free()?;
        self.slots[worker_id] = Some(task);
        Some(worker_id)
    }

    /// Free a slot, handing back what was running in it.
    pub fn release(&mut self, worker_id: usize) -> Option<InFlight> {
        self.slots.get_mut(worker_id).and_then(Option::take)
    }

    pub fn get(&self, worker_id: usize) -> Option<&InFlight> {
        self.slots.get(worker_id).and_then(Option::as_ref)
    }
}
