//! Bounded double-ended buffer of records awaiting delivery.
//!
//! Producers append at the back; the delivery worker takes from the front and
//! pushes a record back to the front when its transmission fails. Offers never
//! block: when the queue is full the record is handed back to the caller so
//! the drop can be reported.

use std::{collections::VecDeque, time::Duration};

use parking_lot::{Condvar, Mutex};

use super::cancel::{CancelToken, Cancelled};
use crate::log_record::LogdocRecord;

/// Upper bound on how long a blocked take goes without re-checking the token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RecordQueue {
    items: Mutex<VecDeque<LogdocRecord>>,
    available: Condvar,
    capacity: usize,
}

impl RecordQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append a record, returning it when the queue is full.
    pub fn offer_last(&self, record: LogdocRecord) -> Result<(), LogdocRecord> {
        self.offer(record, VecDeque::push_back)
    }

    /// Put a record back at the front, returning it when the queue is full.
    pub fn offer_first(&self, record: LogdocRecord) -> Result<(), LogdocRecord> {
        self.offer(record, VecDeque::push_front)
    }

    fn offer(
        &self,
        record: LogdocRecord,
        insert: fn(&mut VecDeque<LogdocRecord>, LogdocRecord),
    ) -> Result<(), LogdocRecord> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(record);
        }
        insert(&mut items, record);
        drop(items);
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest record, blocking until one arrives or `cancel` fires.
    pub fn take_first(&self, cancel: &CancelToken) -> Result<LogdocRecord, Cancelled> {
        let mut items = self.items.lock();
        loop {
            cancel.check()?;
            if let Some(record) = items.pop_front() {
                return Ok(record);
            }
            self.available.wait_for(&mut items, CANCEL_POLL_INTERVAL);
        }
    }

    /// Peek at the oldest record without removing it.
    pub fn front(&self) -> Option<LogdocRecord> {
        self.items.lock().front().cloned()
    }

    /// Wake every blocked taker so it re-checks its cancellation token.
    pub fn wake_all(&self) {
        let _guard = self.items.lock();
        self.available.notify_all();
    }
}

impl std::fmt::Debug for RecordQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
