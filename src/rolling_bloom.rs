//! Size-bounded Bloom filter that rebuilds itself from the most-recently
//! inserted IDs when it overflows, giving a deterministic memory bound
//! regardless of traffic rate. Replaces the time-window variant the original
//! protocol used for exactly that reason.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::bloom::BloomFilter;
use crate::error::Result;
use crate::ids::MessageId;

#[derive(Debug)]
pub struct RollingBloomFilter {
    filter: BloomFilter,
    capacity: u64,
    error_rate: f64,
    min_capacity: u64,
    max_capacity: u64,
    inserted: VecDeque<MessageId>,
    members: HashSet<MessageId>,
}

impl RollingBloomFilter {
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self> {
        let min_capacity = ((capacity as f64) * 0.8).floor().max(1.0) as u64;
        let max_capacity = ((capacity as f64) * 1.2).ceil() as u64;
        let filter = BloomFilter::new(capacity, error_rate)?;
        Ok(Self {
            filter,
            capacity,
            error_rate,
            min_capacity,
            max_capacity,
            inserted: VecDeque::new(),
            members: HashSet::new(),
        })
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.filter.contains(id.as_bytes())
    }

    pub(crate) fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    /// Idempotent: re-inserting an already-known id is a no-op, so repeated
    /// delivery of a duplicate frame doesn't grow the insertion-ordered list
    /// (and doesn't trigger spurious rebuilds).
    pub fn insert(&mut self, id: MessageId) {
        if self.members.contains(&id) {
            return;
        }
        self.filter.insert(id.as_bytes());
        self.members.insert(id.clone());
        self.inserted.push_back(id);
        if self.inserted.len() as u64 > self.max_capacity {
            if let Err(e) = self.clean() {
                tracing::warn!(error = %e, "rolling bloom rebuild failed, retaining prior filter");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inserted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
    }

    /// Rebuilds the underlying filter from the most-recent `min_capacity`
    /// IDs and swaps it in atomically. Never fails mid-swap: if the fresh
    /// filter can't be built, the prior state is left untouched and the
    /// caller is told so it can report a non-fatal internal error via the
    /// event sink.
    pub fn clean(&mut self) -> Result<()> {
        let keep_from = self.inserted.len().saturating_sub(self.min_capacity as usize);
        let retained: Vec<MessageId> = self.inserted.iter().skip(keep_from).cloned().collect();

        let mut fresh = BloomFilter::new(self.max_capacity, self.error_rate)?;
        for id in &retained {
            fresh.insert(id.as_bytes());
        }

        debug!(
            kept = retained.len(),
            dropped = self.inserted.len() - retained.len(),
            "rolling bloom rebuilt"
        );

        self.members = retained.iter().cloned().collect();
        self.filter = fresh;
        self.inserted = retained.into();
        Ok(())
    }

    pub fn clean_if_over_capacity(&mut self) -> Result<bool> {
        if self.inserted.len() as u64 > self.max_capacity {
            self.clean()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        self.filter = BloomFilter::new(self.capacity, self.error_rate)?;
        self.inserted.clear();
        self.members.clear();
        Ok(())
    }

    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }
}
