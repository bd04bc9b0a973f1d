//! The Reliability Manager: the state machine tying the Lamport clock,
//! causal history, rolling Bloom filter and inbound/outbound buffers
//! together behind a single per-instance lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::codec::{self, HistoryEntry, WireMessage};
use crate::config::{ManagerConfig, MAX_MESSAGE_SIZE};
use crate::error::{ManagerError, Result};
use crate::event_sink::EventSink;
use crate::ids::{ChannelId, MessageId};
use crate::rolling_bloom::RollingBloomFilter;
use crate::time::{SystemTimeProvider, TimeProvider};

#[derive(Debug, Clone)]
struct OutgoingEntry {
    message: WireMessage,
    #[allow(dead_code)]
    first_send_time: Instant,
    last_send_time: Instant,
    resend_attempts: u32,
}

#[derive(Debug, Clone)]
struct IncomingEntry {
    message: WireMessage,
    missing_deps: HashSet<MessageId>,
}

struct State<S: EventSink> {
    channel_id: ChannelId,
    config: ManagerConfig,
    lamport_timestamp: i64,
    delivered_history: VecDeque<MessageId>,
    delivered_set: HashSet<MessageId>,
    outgoing_buffer: Vec<OutgoingEntry>,
    incoming_buffer: HashMap<MessageId, IncomingEntry>,
    rolling_bloom: RollingBloomFilter,
    sink: S,
}

impl<S: EventSink> State<S> {
    fn push_delivered(&mut self, id: MessageId) {
        self.delivered_set.insert(id.clone());
        self.delivered_history.push_back(id);
        while self.delivered_history.len() > self.config.max_message_history {
            if let Some(old) = self.delivered_history.pop_front() {
                self.delivered_set.remove(&old);
            }
        }
    }

    /// Repeatedly drains the lowest `(lamport, messageId)` entry whose
    /// dependencies are all satisfied, so simultaneously-ready messages
    /// surface in a reproducible order across implementations.
    fn process_incoming_buffer(&mut self) {
        loop {
            let next_id = self
                .incoming_buffer
                .iter()
                .filter(|(_, e)| e.missing_deps.is_empty())
                .min_by(|(id_a, e_a), (id_b, e_b)| {
                    (e_a.message.lamport_timestamp, id_a.as_bytes())
                        .cmp(&(e_b.message.lamport_timestamp, id_b.as_bytes()))
                })
                .map(|(id, _)| id.clone());

            let Some(id) = next_id else { break };
            let entry = self.incoming_buffer.remove(&id).expect("just matched");
            self.push_delivered(id.clone());
            trace!(?id, "message ready");
            self.sink.message_ready(&id);
            for other in self.incoming_buffer.values_mut() {
                other.missing_deps.remove(&id);
            }
            let _ = entry;
        }
    }

    /// Drops any outgoing entries the incoming message acknowledges, either
    /// because its causal history names them or its attached Bloom filter
    /// claims to have seen them.
    fn review_acks(&mut self, incoming: &WireMessage) {
        let acked_by_history: HashSet<&[u8]> = incoming
            .causal_history
            .iter()
            .map(|h| h.message_id.as_bytes())
            .collect();

        let bloom = if incoming.bloom_filter.is_empty() {
            None
        } else {
            match codec::decode_bloom(&incoming.bloom_filter) {
                Ok(f) => Some(f),
                Err(e) => {
                    debug!(error = %e, "ignoring unparseable bloom filter on incoming message");
                    None
                }
            }
        };

        let mut acked_indices = Vec::new();
        for (idx, entry) in self.outgoing_buffer.iter().enumerate() {
            let id_bytes = entry.message.message_id.as_bytes();
            let acked = acked_by_history.contains(id_bytes)
                || bloom
                    .as_ref()
                    .is_some_and(|f| f.contains(id_bytes));
            if acked {
                acked_indices.push(idx);
            }
        }

        let acked_ids: Vec<MessageId> = acked_indices
            .iter()
            .map(|&idx| self.outgoing_buffer[idx].message.message_id.clone())
            .collect();
        for &idx in acked_indices.iter().rev() {
            self.outgoing_buffer.remove(idx);
        }
        for id in acked_ids {
            self.sink.message_sent(&id);
        }
    }
}

/// The core, transport-agnostic reliability state machine described in this
/// crate. One instance serializes all access behind a single
/// [`parking_lot::Mutex`]; cloning a `ReliabilityManager` shares the same
/// underlying state (it is an `Arc` handle), which is what lets the
/// [`crate::scheduler`] hold one alongside callers.
pub struct ReliabilityManager<S: EventSink> {
    state: Arc<Mutex<State<S>>>,
    time: Arc<dyn TimeProvider>,
}

impl<S: EventSink> Clone for ReliabilityManager<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            time: self.time.clone(),
        }
    }
}

impl<S: EventSink> ReliabilityManager<S> {
    pub fn new(channel_id: ChannelId, config: ManagerConfig, sink: S) -> Result<Self> {
        Self::with_time_provider(channel_id, config, sink, Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(
        channel_id: ChannelId,
        config: ManagerConfig,
        sink: S,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        if channel_id.is_empty() {
            return Err(ManagerError::InvalidArgument("channelId must be non-empty".into()));
        }
        let config = config.validate()?;
        let rolling_bloom =
            RollingBloomFilter::new(config.bloom_filter_capacity as u64, config.bloom_filter_error_rate)?;

        let state = State {
            channel_id,
            config,
            lamport_timestamp: 0,
            delivered_history: VecDeque::new(),
            delivered_set: HashSet::new(),
            outgoing_buffer: Vec::new(),
            incoming_buffer: HashMap::new(),
            rolling_bloom,
            sink,
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            time,
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.state.lock().channel_id.clone()
    }

    /// Replaces the event sink, returning the previous one. Distinct from
    /// construction so an embedder can rewire callbacks after
    /// `startPeriodicTasks` is already running, without tearing the Manager
    /// down.
    pub fn set_event_sink(&self, sink: S) -> S {
        std::mem::replace(&mut self.state.lock().sink, sink)
    }

    /// Attaches causal-delivery metadata to `payload` and records it in the
    /// outgoing buffer for retry-aging.
    pub fn wrap_outgoing(&self, payload: &[u8], message_id: MessageId) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(ManagerError::InvalidArgument("payload must be non-empty".into()));
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ManagerError::MessageTooLarge {
                len: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        if message_id.is_empty() {
            return Err(ManagerError::InvalidArgument("messageId must be non-empty".into()));
        }

        let mut state = self.state.lock();
        let wall = self.time.now_unix_seconds();
        state.lamport_timestamp = state.lamport_timestamp.max(wall) + 1;

        let take = state.config.max_causal_history.min(state.delivered_history.len());
        let causal_history: Vec<HistoryEntry> = state
            .delivered_history
            .iter()
            .skip(state.delivered_history.len() - take)
            .map(|id| HistoryEntry {
                message_id: id.clone(),
                retrieval_hint: Vec::new(),
            })
            .collect();

        let bloom_filter = codec::encode_bloom(state.rolling_bloom.filter());

        let wire_msg = WireMessage {
            message_id: message_id.clone(),
            lamport_timestamp: state.lamport_timestamp,
            causal_history,
            channel_id: state.channel_id.clone(),
            content: payload.to_vec(),
            bloom_filter,
        };

        let now = self.time.now_instant();
        state.outgoing_buffer.push(OutgoingEntry {
            message: wire_msg.clone(),
            first_send_time: now,
            last_send_time: now,
            resend_attempts: 0,
        });

        state.rolling_bloom.insert(message_id.clone());
        state.push_delivered(message_id);

        Ok(codec::encode_message(&wire_msg))
    }

    /// Decodes `frame`, updates the clock and buffers, and returns the
    /// payload plus the IDs of any still-missing causal predecessors.
    pub fn unwrap_incoming(&self, frame: &[u8]) -> Result<(Vec<u8>, Vec<MessageId>)> {
        let decoded = codec::decode_message(frame)?;
        let mut state = self.state.lock();

        if state.delivered_set.contains(&decoded.message_id) {
            state.rolling_bloom.insert(decoded.message_id.clone());
            return Ok((decoded.content, Vec::new()));
        }

        state.rolling_bloom.insert(decoded.message_id.clone());
        state.lamport_timestamp = state.lamport_timestamp.max(decoded.lamport_timestamp) + 1;

        state.review_acks(&decoded);

        // A causal predecessor counts as satisfied only once it has actually
        // been delivered locally; a bloom hit alone isn't enough if we still
        // have it sitting in our own incoming buffer as PENDING.
        let missing_deps: Vec<MessageId> = decoded
            .causal_history
            .iter()
            .filter(|h| !state.delivered_set.contains(&h.message_id))
            .filter(|h| {
                !state.rolling_bloom.contains(&h.message_id)
                    || state.incoming_buffer.contains_key(&h.message_id)
            })
            .map(|h| h.message_id.clone())
            .collect();

        if missing_deps.is_empty() {
            state.push_delivered(decoded.message_id.clone());
            state.sink.message_ready(&decoded.message_id);
            state.process_incoming_buffer();
        } else {
            state.sink.missing_dependencies(&decoded.message_id, &missing_deps);
            state.incoming_buffer.insert(
                decoded.message_id.clone(),
                IncomingEntry {
                    message: decoded.clone(),
                    missing_deps: missing_deps.iter().cloned().collect(),
                },
            );
        }

        Ok((decoded.content, missing_deps))
    }

    /// Marks `ids` as satisfied (inserting any not already known to the
    /// rolling bloom) and drains any now-ready pending entries.
    pub fn mark_dependencies_met(&self, ids: &[MessageId]) -> Result<()> {
        let mut state = self.state.lock();
        for id in ids {
            if !state.rolling_bloom.contains(id) {
                state.rolling_bloom.insert(id.clone());
            }
            for entry in state.incoming_buffer.values_mut() {
                entry.missing_deps.remove(id);
            }
        }
        state.process_incoming_buffer();
        Ok(())
    }

    /// Returns state to the post-creation configuration.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.delivered_history.clear();
        state.delivered_set.clear();
        state.outgoing_buffer.clear();
        state.incoming_buffer.clear();
        state.rolling_bloom.reset()?;
        state.lamport_timestamp = 0;
        Ok(())
    }

    /// Retry-ages the outgoing buffer and rebuilds the rolling bloom if it's
    /// over capacity. Called by the sweep task in [`crate::scheduler`].
    pub fn sweep(&self) -> Result<()> {
        let mut state = self.state.lock();
        let now = self.time.now_instant();
        let max_attempts = state.config.max_resend_attempts;
        let resend_interval = state.config.resend_interval;

        let mut give_up = Vec::new();
        for (idx, entry) in state.outgoing_buffer.iter_mut().enumerate() {
            if entry.resend_attempts >= max_attempts {
                give_up.push(idx);
            } else if now.duration_since(entry.last_send_time) >= resend_interval {
                entry.last_send_time = now;
                entry.resend_attempts += 1;
            }
        }

        let given_up_ids: Vec<MessageId> = give_up
            .iter()
            .map(|&idx| state.outgoing_buffer[idx].message.message_id.clone())
            .collect();
        for &idx in give_up.iter().rev() {
            state.outgoing_buffer.remove(idx);
        }
        for id in &given_up_ids {
            debug!(?id, "giving up on outgoing message after max resend attempts");
            state.sink.message_sent(id);
        }

        state.rolling_bloom.clean_if_over_capacity()?;
        Ok(())
    }

    /// Fires the advisory sync tick. Called by the sync task in
    /// [`crate::scheduler`].
    pub fn fire_periodic_sync(&self) {
        self.state.lock().sink.periodic_sync();
    }

    pub fn lamport_timestamp(&self) -> i64 {
        self.state.lock().lamport_timestamp
    }

    pub fn delivered_history_len(&self) -> usize {
        self.state.lock().delivered_history.len()
    }

    pub fn outgoing_buffer_len(&self) -> usize {
        self.state.lock().outgoing_buffer.len()
    }

    pub fn outgoing_resend_attempts(&self, id: &MessageId) -> Option<u32> {
        self.state
            .lock()
            .outgoing_buffer
            .iter()
            .find(|e| &e.message.message_id == id)
            .map(|e| e.resend_attempts)
    }

    pub fn incoming_buffer_len(&self) -> usize {
        self.state.lock().incoming_buffer.len()
    }

    pub fn buffer_sweep_interval(&self) -> std::time::Duration {
        self.state.lock().config.buffer_sweep_interval
    }

    pub fn sync_message_interval(&self) -> std::time::Duration {
        self.state.lock().config.sync_message_interval
    }
}
