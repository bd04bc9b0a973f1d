use std::sync::Arc;
use std::time::{Duration, Instant};

use gossip_reliability::{ChannelId, ManagerConfig, MessageId, ManualTimeProvider, ReliabilityManager, RecordingEventSink};

fn manager() -> ReliabilityManager<RecordingEventSink> {
    ReliabilityManager::new(
        ChannelId::from(b"c".as_slice()),
        ManagerConfig::default(),
        RecordingEventSink::default(),
    )
    .unwrap()
}

#[test]
fn s1_round_trip() {
    let m = manager();
    let frame = m.wrap_outgoing(&[1, 2, 3], MessageId::from(b"m1".as_slice())).unwrap();

    let peer = manager();
    let (payload, missing) = peer.unwrap_incoming(&frame).unwrap();
    assert_eq!(payload, vec![1, 2, 3]);
    assert!(missing.is_empty());
}

#[test]
fn s2_dependency_detection_then_resolution() {
    let a = manager();
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    let f2 = a.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    let b = manager();
    let (payload2, missing2) = b.unwrap_incoming(&f2).unwrap();
    assert_eq!(payload2, vec![2]);
    assert_eq!(missing2, vec![MessageId::from(b"m1".as_slice())]);
    assert_eq!(b.incoming_buffer_len(), 1);

    let (payload1, missing1) = b.unwrap_incoming(&f1).unwrap();
    assert_eq!(payload1, vec![1]);
    assert!(missing1.is_empty());
    assert_eq!(b.incoming_buffer_len(), 0);
    assert_eq!(b.delivered_history_len(), 2);
}

#[test]
fn s3_resolution_via_mark_dependencies_met() {
    let a = manager();
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    let f2 = a.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    let b = manager();
    let (_, missing2) = b.unwrap_incoming(&f2).unwrap();
    assert_eq!(missing2, vec![MessageId::from(b"m1".as_slice())]);

    b.mark_dependencies_met(&[MessageId::from(b"m1".as_slice())]).unwrap();
    assert_eq!(b.incoming_buffer_len(), 0);
    assert_eq!(b.delivered_history_len(), 1);

    // m1 itself was never delivered as a distinct message, only presumed
    // satisfied; a later arrival of F1 still delivers m1's own payload.
    let (payload1, missing1) = b.unwrap_incoming(&f1).unwrap();
    assert_eq!(payload1, vec![1]);
    assert!(missing1.is_empty());
}

#[test]
fn s4_acknowledgment_via_causal_history() {
    let a = manager();
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    assert_eq!(a.outgoing_buffer_len(), 1);

    let b = manager();
    b.unwrap_incoming(&f1).unwrap();
    let f2 = b.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    a.unwrap_incoming(&f2).unwrap();
    assert_eq!(a.outgoing_buffer_len(), 0);
}

#[test]
fn s5_acknowledgment_via_bloom_only() {
    let a = manager();
    let f0 = a.wrap_outgoing(&[0], MessageId::from(b"m0".as_slice())).unwrap();
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    let _ = f0; // deliberately never relayed to b
    assert_eq!(a.outgoing_buffer_len(), 2);

    // b is only handed m1's frame, whose own causal history names m0 as an
    // unsatisfied dependency, so m1 is buffered rather than delivered.
    // `unwrap_incoming` registers a processed message's id into the rolling
    // bloom unconditionally, before the missing-deps branch runs, so m1
    // ends up known to b only through the bloom filter, never through
    // delivered history or causal history.
    let b = manager();
    let (_, missing) = b.unwrap_incoming(&f1).unwrap();
    assert_eq!(missing, vec![MessageId::from(b"m0".as_slice())]);
    assert_eq!(b.delivered_history_len(), 0);

    // b's own outgoing message now carries an empty causal history (nothing
    // delivered yet) but a bloom filter that has seen m1.
    let f2 = b.wrap_outgoing(&[9], MessageId::from(b"m2".as_slice())).unwrap();
    let decoded_f2 = gossip_reliability::codec::decode_message(&f2).unwrap();
    assert!(decoded_f2.causal_history.is_empty());

    a.unwrap_incoming(&f2).unwrap();
    // m1 is acknowledged via the bloom hit; m0 is named by neither the
    // causal history nor the bloom filter and remains outstanding.
    assert_eq!(a.outgoing_buffer_len(), 1);
    assert_eq!(a.outgoing_resend_attempts(&MessageId::from(b"m0".as_slice())), Some(0));
    assert!(a
        .outgoing_resend_attempts(&MessageId::from(b"m1".as_slice()))
        .is_none());
}

#[test]
fn s6_retry_aging_and_give_up() {
    let time = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
    let mut config = ManagerConfig::default();
    config.resend_interval = Duration::from_secs(1);
    config.max_resend_attempts = 2;

    let m = ReliabilityManager::with_time_provider(
        ChannelId::from(b"c".as_slice()),
        config,
        RecordingEventSink::default(),
        time.clone(),
    )
    .unwrap();

    let id = MessageId::from(b"m1".as_slice());
    m.wrap_outgoing(&[1], id.clone()).unwrap();

    time.advance(Duration::from_secs(1));
    m.sweep().unwrap();
    assert_eq!(m.outgoing_resend_attempts(&id), Some(1));

    time.advance(Duration::from_secs(1));
    m.sweep().unwrap();
    assert_eq!(m.outgoing_resend_attempts(&id), Some(2));

    time.advance(Duration::from_secs(1));
    m.sweep().unwrap();
    assert_eq!(m.outgoing_resend_attempts(&id), None);
    assert_eq!(m.outgoing_buffer_len(), 0);
}

#[test]
fn s7_duplicate_suppression() {
    let a = manager();
    let f1 = a.wrap_outgoing(&[1, 2, 3], MessageId::from(b"m1".as_slice())).unwrap();

    let b = manager();
    let (payload1, missing1) = b.unwrap_incoming(&f1).unwrap();
    assert_eq!(payload1, vec![1, 2, 3]);
    assert!(missing1.is_empty());
    assert_eq!(b.delivered_history_len(), 1);

    let (payload2, missing2) = b.unwrap_incoming(&f1).unwrap();
    assert_eq!(payload2, vec![1, 2, 3]);
    assert!(missing2.is_empty());
    assert_eq!(b.delivered_history_len(), 1);
}
