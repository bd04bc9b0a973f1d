//! Causal-delivery reliability core for group messaging over a lossy,
//! unordered, best-effort gossip transport.
//!
//! This crate owns the duplicate/ack detection, causal dependency buffering
//! and retry-aging logic; it has no opinion on the transport itself, which
//! is handed opaque wire frames in and gets opaque wire frames out.
//!
//! ## Architecture
//!
//! - **Bloom filter** ([`bloom`]): fixed-parameter approximate-membership set.
//! - **Rolling bloom** ([`rolling_bloom`]): size-bounded, rebuild-on-overflow.
//! - **Wire codec** ([`codec`]): tagged, length-prefixed, unknown-field-tolerant.
//! - **Reliability Manager** ([`manager`]): the state machine tying it together.
//! - **Scheduler** ([`scheduler`]): sweep/sync background tasks.
//! - **Event sink** ([`event_sink`]): callback surface for state transitions.

pub mod bloom;
pub mod codec;
pub mod config;
pub mod error;
pub mod event_sink;
pub mod ids;
pub mod manager;
pub mod rolling_bloom;
pub mod scheduler;
pub mod time;

pub use codec::{HistoryEntry, WireMessage};
pub use config::{ManagerConfig, MAX_MESSAGE_SIZE};
pub use error::{ManagerError, Result};
pub use event_sink::{EventSink, NullEventSink, RecordedEvent, RecordingEventSink, SharedRecordingSink};
pub use ids::{ChannelId, MessageId};
pub use manager::ReliabilityManager;
pub use scheduler::{start_periodic_tasks, SchedulerHandle};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
