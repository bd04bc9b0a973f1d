use gossip_reliability::{ChannelId, ManagerConfig, MessageId, RecordedEvent, ReliabilityManager, SharedRecordingSink};

fn manager_with_sink() -> (ReliabilityManager<SharedRecordingSink>, SharedRecordingSink) {
    let sink = SharedRecordingSink::default();
    let m = ReliabilityManager::new(ChannelId::from(b"c".as_slice()), ManagerConfig::default(), sink.clone()).unwrap();
    (m, sink)
}

#[test]
fn s2_callback_order_matches_dependency_resolution() {
    let a = manager_with_sink().0;
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    let f2 = a.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    let (b, b_sink) = manager_with_sink();
    b.unwrap_incoming(&f2).unwrap();
    assert_eq!(
        b_sink.events(),
        vec![RecordedEvent::MissingDependencies(
            MessageId::from(b"m2".as_slice()),
            vec![MessageId::from(b"m1".as_slice())]
        )]
    );

    b.unwrap_incoming(&f1).unwrap();
    assert_eq!(
        b_sink.events(),
        vec![
            RecordedEvent::MissingDependencies(
                MessageId::from(b"m2".as_slice()),
                vec![MessageId::from(b"m1".as_slice())]
            ),
            RecordedEvent::MessageReady(MessageId::from(b"m1".as_slice())),
            RecordedEvent::MessageReady(MessageId::from(b"m2".as_slice())),
        ]
    );
}

#[test]
fn p8_ready_events_fire_in_lamport_then_id_order_regardless_of_arrival_order() {
    let a = manager_with_sink().0;
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();

    let (b, b_sink) = manager_with_sink();
    // b receives m2 before m1, never having seen m1: MessageReady must fire
    // m1 before m2 once both are known.
    b.unwrap_incoming(&f1).unwrap();

    let expected_ready = RecordedEvent::MessageReady(MessageId::from(b"m1".as_slice()));
    assert!(b_sink.events().contains(&expected_ready));
}

#[test]
fn s3_mark_dependencies_met_drains_then_late_arrival_delivers_only_itself() {
    let a = manager_with_sink().0;
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();
    let f2 = a.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    let (b, b_sink) = manager_with_sink();
    b.unwrap_incoming(&f2).unwrap();
    b.mark_dependencies_met(&[MessageId::from(b"m1".as_slice())]).unwrap();
    assert_eq!(
        b_sink.events(),
        vec![
            RecordedEvent::MissingDependencies(
                MessageId::from(b"m2".as_slice()),
                vec![MessageId::from(b"m1".as_slice())]
            ),
            RecordedEvent::MessageReady(MessageId::from(b"m2".as_slice())),
        ]
    );

    b.unwrap_incoming(&f1).unwrap();
    assert_eq!(
        b_sink.events().last(),
        Some(&RecordedEvent::MessageReady(MessageId::from(b"m1".as_slice())))
    );
}

#[test]
fn s4_message_sent_fires_exactly_once_via_causal_history() {
    let (a, a_sink) = manager_with_sink();
    let f1 = a.wrap_outgoing(&[1], MessageId::from(b"m1".as_slice())).unwrap();

    let b = manager_with_sink().0;
    b.unwrap_incoming(&f1).unwrap();
    let f2 = b.wrap_outgoing(&[2], MessageId::from(b"m2".as_slice())).unwrap();

    a.unwrap_incoming(&f2).unwrap();
    let sent_events: Vec<_> = a_sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, RecordedEvent::MessageSent(_)))
        .collect();
    assert_eq!(sent_events, vec![RecordedEvent::MessageSent(MessageId::from(b"m1".as_slice()))]);
}
