//! In-memory priority queue of scheduling entries.
//!
//! An array-backed binary min-heap ordered by due time, then priority rank,
//! then insertion order. A position map from job id to heap slot is kept in
//! step with every swap so an entry can be found or replaced by id.

use chrono::{DateTime, Utc};
use jobcast_core::{Job, JobId, JobStatus, Priority};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;

/// Transient projection of a job used for ordering and dispatch.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub id: JobId,
    pub due: DateTime<Utc>,
    /// Smaller rank dispatches first among equally due entries.
    pub rank: u8,
    pub attempts: u32,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    seq: u64,
}

impl ScheduleEntry {
    pub fn new(
        id: JobId,
        due: DateTime<Utc>,
        priority: Priority,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            due,
            rank: priority.rank(),
            attempts: 0,
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            seq: 0,
        }
    }

    /// Project a stored job into a scheduling entry.
    ///
    /// Returns `None` for jobs already in a terminal state. An unrecognised
    /// priority is scheduled at the lowest urgency so it never outranks
    /// `high`.
    pub fn from_job(job: &Job) -> Option<Self> {
        let status = match job.status() {
            Ok(status) if status.is_terminal() => return None,
            Ok(status) => status,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Unrecognised job status, treating as pending");
                JobStatus::Pending
            }
        };

        let rank = match job.priority() {
            Ok(priority) => priority.rank(),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Unrecognised priority, scheduling as low");
                Priority::Low.rank()
            }
        };

        Some(Self {
            id: job.id,
            due: job.run_at,
            rank,
            attempts: u32::try_from(job.attempts).unwrap_or(0),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            status,
            seq: 0,
        })
    }

    fn order_key(&self) -> (DateTime<Utc>, u8, u64) {
        (self.due, self.rank, self.seq)
    }

    /// Total order used by the queue: due time, then rank, then insertion.
    pub fn precedes(&self, other: &Self) -> bool {
        self.order_key().cmp(&other.order_key()) == Ordering::Less
    }
}

/// Min-heap of scheduling entries. Not synchronised; the scheduler owns it
/// behind its lock.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: Vec<ScheduleEntry>,
    positions: HashMap<JobId, usize>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.positions.contains_key(id)
    }

    /// Insert an entry. An entry already queued under the same job id is
    /// replaced, so a job is never queued twice.
    pub fn insert(&mut self, mut entry: ScheduleEntry) {
        if self.contains(&entry.id) {
            self.remove(&entry.id);
        }

        entry.seq = self.next_seq;
        self.next_seq += 1;

        let idx = self.heap.len();
        self.positions.insert(entry.id, idx);
        self.heap.push(entry);
        self.sift_up(idx);
    }

    /// The entry that dispatches next, if any.
    pub fn peek_earliest(&self) -> Option<&ScheduleEntry> {
        self.heap.first()
    }

    pub fn pop_earliest(&mut self) -> Option<ScheduleEntry> {
        self.remove_at(0)
    }

    /// Remove the entry queued for a job.
    pub fn remove(&mut self, id: &JobId) -> Option<ScheduleEntry> {
        let idx = *self.positions.get(id)?;
        self.remove_at(idx)
    }

    fn remove_at(&mut self, idx: usize) -> Option<ScheduleEntry> {
        if idx >= self.heap.len() {
            return None;
        }

        let last = self.heap.len() - 1;
        self.swap(idx, last);
        let entry = self.heap.pop()?;
        self.positions.remove(&entry.id);

        if idx < self.heap.len() {
            // The moved element may belong above or below its new slot.
            self.sift_down(idx);
            self.sift_up(idx);
        }

        Some(entry)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.heap[idx].precedes(&self.heap[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && self.heap[left].precedes(&self.heap[smallest]) {
                smallest = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].id, a);
        self.positions.insert(self.heap[b].id, b);
    }
}
