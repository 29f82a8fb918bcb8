//! Bounded FIFO cache of recently seen request ids.
//!
//! A subplebbit node consults this cache before doing any work for a
//! `CHALLENGEREQUEST`, so a request re-sent by a publisher (or echoed
//! by the pubsub mesh) is processed at most once. `HashSet` gives O(1)
//! lookup and `VecDeque` tracks insertion order for eviction.

use std::collections::{HashSet, VecDeque};

use plebwire_types::{PlebwireError, RequestId, Result};

/// Remembers the last `capacity` request ids.
pub struct RequestCache {
    seen: HashSet<RequestId>,
    order: VecDeque<RequestId>,
    capacity: usize,
}

impl RequestCache {
    /// Creates a cache holding at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            capacity: cap,
        }
    }

    /// Records `id`, evicting the oldest entry when full.
    ///
    /// # Errors
    ///
    /// `ProtocolError` if `id` is already cached.
    pub fn check_and_insert(&mut self, id: &RequestId) -> Result<()> {
        if self.seen.contains(id) {
            return Err(PlebwireError::ProtocolError {
                reason: format!("duplicate challenge request {id}"),
            });
        }

        if self.seen.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(id.clone());
        self.order.push_back(id.clone());
        Ok(())
    }

    /// Whether `id` is cached.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
